//! Discovery of the public (exit) address through "what is my IP" services.

use std::{collections::BTreeSet, net::IpAddr, time::Duration};

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ProbeError;

/// The address one source reported.
#[derive(Serialize, Clone, Debug)]
pub struct IpObservation {
    pub ip: IpAddr,
    pub source: String,
    pub elapsed_ms: u64,
}

#[derive(Serialize, Clone, Debug)]
pub struct SourceResult {
    pub source: String,
    pub ip: Option<IpAddr>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Serialize, Clone, Debug)]
pub struct Survey {
    pub results: Vec<SourceResult>,
    pub distinct: Vec<IpAddr>,
}

impl Survey {
    /// All sources that answered agree on one address.
    pub fn consistent(&self) -> bool {
        self.distinct.len() == 1
    }

    /// The address of the first source, in configured order, that answered.
    pub fn first_ip(&self) -> Option<IpAddr> {
        self.results.iter().find_map(|result| result.ip)
    }
}

#[derive(Error, Debug)]
enum SourceError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("unparseable body: {0:?}")]
    Unparseable(String),
}

/// Ask each source in turn and return the first usable address.
pub async fn lookup(
    client: &reqwest::Client,
    sources: &[String],
    timeout: Duration,
) -> Result<IpObservation, ProbeError> {
    for source in sources {
        let start = Instant::now();
        match query(client, source, timeout).await {
            Ok(ip) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                info!(%ip, %source, elapsed_ms, "public ip");
                return Ok(IpObservation {
                    ip,
                    source: source.clone(),
                    elapsed_ms,
                });
            }
            Err(err) => warn!(%source, %err, "ip source failed"),
        }
    }

    Err(ProbeError::NoPublicIp {
        tried: sources.len(),
    })
}

/// Ask every source. Disagreement between sources points at split routing around the VPN.
pub async fn survey(client: &reqwest::Client, sources: &[String], timeout: Duration) -> Survey {
    let mut results = Vec::with_capacity(sources.len());
    let mut distinct = BTreeSet::new();

    for source in sources {
        let start = Instant::now();
        let outcome = query(client, source, timeout).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        results.push(match outcome {
            Ok(ip) => {
                distinct.insert(ip);
                SourceResult {
                    source: source.clone(),
                    ip: Some(ip),
                    error: None,
                    elapsed_ms,
                }
            }
            Err(err) => SourceResult {
                source: source.clone(),
                ip: None,
                error: Some(err.to_string()),
                elapsed_ms,
            },
        });
    }

    Survey {
        results,
        distinct: distinct.into_iter().collect(),
    }
}

async fn query(
    client: &reqwest::Client,
    source: &str,
    timeout: Duration,
) -> Result<IpAddr, SourceError> {
    let body = client
        .get(source)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    debug!(%source, body = body.trim(), "ip source body");

    parse_body(&body).ok_or(SourceError::Unparseable(body))
}

/// Plain text (`1.2.3.4\n`) or JSON with an `origin` (httpbin) or `ip` (ipify) field.
/// httpbin reports every hop in `origin` as a comma separated list; the first one is the client.
pub fn parse_body(body: &str) -> Option<IpAddr> {
    let body = body.trim();

    let text = if body.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        value
            .get("origin")
            .or_else(|| value.get("ip"))?
            .as_str()?
            .to_string()
    } else {
        body.to_string()
    };

    text.split(',').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats() {
        let ip: IpAddr = "84.46.231.251".parse().unwrap();

        assert_eq!(parse_body("84.46.231.251\n"), Some(ip));
        assert_eq!(parse_body(r#"{"origin": "84.46.231.251"}"#), Some(ip));
        assert_eq!(
            parse_body(r#"{"origin": "84.46.231.251, 10.0.0.1"}"#),
            Some(ip)
        );
        assert_eq!(parse_body(r#"{"ip":"84.46.231.251"}"#), Some(ip));
        assert_eq!(
            parse_body("2001:db8::1"),
            Some("2001:db8::1".parse().unwrap())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_body("<html>rate limited</html>"), None);
        assert_eq!(parse_body(r#"{"address": "1.2.3.4"}"#), None);
        assert_eq!(parse_body(""), None);
    }
}
