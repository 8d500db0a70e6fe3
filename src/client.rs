use std::{collections::BTreeMap, net::IpAddr};

use hostconnect_xml::{
    classify, reply::mask_elements, Credentials, HostConnectRequest, SoapSearch,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    env_config::EnvConfig,
    exchange::{error_chain, header_map, Exchange, RecordedRequest, RecordedResponse, TransportFailure},
    ProbeError,
};

pub const XML_CONTENT_TYPE: &str = "application/xml";
pub const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

const MASK: &str = "********";

/// HTTP client for the HostConnect XML API and the SOAP search service.
#[derive(Clone)]
pub struct HostConnectClient {
    http: reqwest::Client,
    api_url: String,
    soap_url: String,
    credentials: Credentials,
}

/// Outcome of a plain GET against the API URL.
#[derive(Serialize, Clone, Debug)]
pub struct Reachability {
    pub url: String,
    pub status: Option<u16>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl Reachability {
    /// Any HTTP answer counts, including error statuses.
    pub fn reachable(&self) -> bool {
        self.status.is_some()
    }
}

/// A payload ready to be posted.
pub struct RawRequest<'a> {
    pub label: &'a str,
    pub url: &'a str,
    pub body: String,
    pub content_type: &'a str,
    pub soap_action: Option<&'a str>,
    /// Marker element of a successful reply
    pub expected_reply: &'a str,
}

impl HostConnectClient {
    pub fn new(http: reqwest::Client, config: &EnvConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            soap_url: config.soap_url.clone(),
            credentials: config.credentials(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn soap_url(&self) -> &str {
        &self.soap_url
    }

    pub fn agent_id(&self) -> &str {
        &self.credentials.agent_id
    }

    pub async fn send(&self, request: &HostConnectRequest) -> Exchange {
        self.post_raw(RawRequest {
            label: request.request_tag(),
            url: &self.api_url,
            body: request.to_xml(&self.credentials),
            content_type: XML_CONTENT_TYPE,
            soap_action: None,
            expected_reply: request.reply_tag(),
        })
        .await
    }

    /// Post a `SearchTours` envelope, to `url` or the configured SOAP endpoint.
    pub async fn send_soap(&self, search: &SoapSearch, url: Option<&str>) -> Exchange {
        self.post_raw(RawRequest {
            label: "SearchTours",
            url: url.unwrap_or(&self.soap_url),
            body: search.to_envelope(&self.credentials),
            content_type: SOAP_CONTENT_TYPE,
            soap_action: Some(""),
            expected_reply: search.reply_tag(),
        })
        .await
    }

    pub async fn post_raw(&self, raw: RawRequest<'_>) -> Exchange {
        let mut headers = BTreeMap::from([
            (CONTENT_TYPE.as_str().to_string(), raw.content_type.to_string()),
            (ACCEPT.as_str().to_string(), XML_CONTENT_TYPE.to_string()),
        ]);
        if let Some(action) = raw.soap_action {
            headers.insert("soapaction".to_string(), action.to_string());
        }

        let mut builder = self.http.post(raw.url).body(raw.body.clone());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let request = RecordedRequest {
            method: "POST".to_string(),
            url: raw.url.to_string(),
            headers,
            body: mask_elements(&raw.body, "Password", MASK),
        };

        let start = Instant::now();
        let result = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = header_map(response.headers());
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, headers, body))
        }
        .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok((status, headers, body)) => {
                let verdict = classify(status, &body, raw.expected_reply);
                info!(label = raw.label, status, elapsed_ms, %verdict, "response");

                Exchange {
                    label: raw.label.to_string(),
                    request,
                    response: Some(RecordedResponse {
                        status,
                        headers,
                        body,
                        elapsed_ms,
                    }),
                    failure: None,
                    verdict: Some(verdict),
                }
            }
            Err(err) => {
                let failure = TransportFailure::from_reqwest(&err, elapsed_ms);
                warn!(label = raw.label, %failure, "no response");

                Exchange {
                    label: raw.label.to_string(),
                    request,
                    response: None,
                    failure: Some(failure),
                    verdict: None,
                }
            }
        }
    }

    /// Plain GET of the API URL. Any status proves the route to the host works.
    pub async fn reachability(&self) -> Reachability {
        let start = Instant::now();
        let result = self.http.get(&self.api_url).send().await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => Reachability {
                url: self.api_url.clone(),
                status: Some(response.status().as_u16()),
                elapsed_ms,
                error: None,
            },
            Err(err) => Reachability {
                url: self.api_url.clone(),
                status: None,
                elapsed_ms,
                error: Some(error_chain(&err)),
            },
        }
    }

    /// Addresses the API host name resolves to.
    pub async fn resolve_host(&self) -> Result<Vec<IpAddr>, ProbeError> {
        let url = url::Url::parse(&self.api_url)
            .map_err(|_| ProbeError::InvalidUrl(self.api_url.clone()))?;
        let host = url
            .host_str()
            .ok_or_else(|| ProbeError::InvalidUrl(self.api_url.clone()))?;
        let port = url.port_or_known_default().unwrap_or(443);

        let mut addrs: Vec<IpAddr> = tokio::net::lookup_host((host, port))
            .await?
            .map(|addr| addr.ip())
            .collect();
        addrs.sort();
        addrs.dedup();

        info!(host, ?addrs, "resolved");
        Ok(addrs)
    }
}
