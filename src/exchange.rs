use std::collections::BTreeMap;

use hostconnect_xml::Verdict;
use reqwest::header::HeaderMap;
use serde::Serialize;

/// One request/response round trip, kept whole so it can be printed or handed to the API vendor.
#[derive(Serialize, Clone, Debug)]
pub struct Exchange {
    pub label: String,
    pub request: RecordedRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<RecordedResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<TransportFailure>,
    /// Present whenever a response was received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

#[derive(Serialize, Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Credentials are masked
    pub body: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct RecordedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub elapsed_ms: u64,
}

/// The request never produced an HTTP response.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportFailure {
    Timeout { elapsed_ms: u64 },
    Connect { message: String },
    Other { message: String },
}

impl TransportFailure {
    pub fn from_reqwest(err: &reqwest::Error, elapsed_ms: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { elapsed_ms }
        } else if err.is_connect() {
            Self::Connect {
                message: error_chain(err),
            }
        } else {
            Self::Other {
                message: error_chain(err),
            }
        }
    }
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { elapsed_ms } => {
                write!(f, "timed out after {elapsed_ms}ms (this might indicate IP blocking)")
            }
            Self::Connect { message } => write!(f, "connection error: {message}"),
            Self::Other { message } => write!(f, "request failed: {message}"),
        }
    }
}

impl Exchange {
    pub fn succeeded(&self) -> bool {
        self.verdict.as_ref().is_some_and(Verdict::is_success)
    }

    pub fn indicates_ip_block(&self) -> bool {
        self.verdict.as_ref().is_some_and(Verdict::indicates_ip_block)
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.failure, Some(TransportFailure::Timeout { .. }))
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        match (&self.response, &self.failure) {
            (Some(response), _) => Some(response.elapsed_ms),
            (None, Some(TransportFailure::Timeout { elapsed_ms })) => Some(*elapsed_ms),
            _ => None,
        }
    }
}

pub(crate) fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// `Display` of an error followed by each of its sources.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
