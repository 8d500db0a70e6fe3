use std::net::IpAddr;

use serde::Serialize;

use crate::{client::Reachability, exchange::Exchange};

/// How the current exit address relates to the allowlisted one.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IpStatus {
    Match,
    /// The known non-VPN address; the VPN is most likely down
    LocalAddress,
    Mismatch,
    /// No expected address configured
    Unverified,
    /// The current address could not be determined
    Unknown,
}

impl IpStatus {
    pub fn evaluate(current: Option<IpAddr>, expected: Option<IpAddr>, local: Option<IpAddr>) -> Self {
        let Some(current) = current else {
            return Self::Unknown;
        };

        if local == Some(current) && expected != Some(current) {
            return Self::LocalAddress;
        }

        match expected {
            Some(expected) if expected == current => Self::Match,
            Some(_) => Self::Mismatch,
            None => Self::Unverified,
        }
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Diagnosis {
    Whitelisted,
    NotWhitelisted,
    Unreachable,
    Inconclusive,
}

impl Diagnosis {
    pub fn evaluate(ip_status: IpStatus, reachability: &Reachability, auth: Option<&Exchange>) -> Self {
        if !reachability.reachable() {
            return Self::Unreachable;
        }

        let Some(auth) = auth else {
            return Self::Inconclusive;
        };

        if auth.succeeded() {
            Self::Whitelisted
        } else if auth.indicates_ip_block() {
            Self::NotWhitelisted
        } else if auth.timed_out() && matches!(ip_status, IpStatus::Mismatch | IpStatus::LocalAddress) {
            Self::NotWhitelisted
        } else if auth.response.is_none() && !auth.timed_out() {
            Self::Unreachable
        } else {
            Self::Inconclusive
        }
    }

    /// `ready` only when authentication works from the address that is supposed to be used.
    pub fn status(self, ip_status: IpStatus) -> &'static str {
        match (self, ip_status) {
            (Self::Whitelisted, IpStatus::Match | IpStatus::Unverified) => "ready",
            _ => "needs_attention",
        }
    }
}

/// Human readable next steps.
pub fn recommendations(
    diagnosis: Diagnosis,
    ip_status: IpStatus,
    current: Option<IpAddr>,
    expected: Option<IpAddr>,
) -> Vec<String> {
    let mut out = vec![];
    let current_text = current.map_or_else(|| "unknown".to_string(), |ip| ip.to_string());

    match ip_status {
        IpStatus::LocalAddress => {
            out.push("Connect the VPN: the request left from the local (non-VPN) address".to_string());
        }
        IpStatus::Mismatch => {
            if let Some(expected) = expected {
                out.push(format!(
                    "Exit address {current_text} differs from the allowlisted {expected}; check the VPN server selection"
                ));
            }
        }
        IpStatus::Unknown => {
            out.push("Could not determine the public address; check internet connectivity".to_string());
        }
        IpStatus::Match | IpStatus::Unverified => {}
    }

    match diagnosis {
        Diagnosis::Whitelisted => {
            if ip_status == IpStatus::Unverified {
                out.push(format!(
                    "Authentication works from {current_text}; set HCPROBE_EXPECTED_IP to pin it"
                ));
            }
        }
        Diagnosis::NotWhitelisted => {
            out.push(format!("Contact Tourplan to whitelist {current_text}"));
            out.push("Attach the JSON report (run with --report) to the support request".to_string());
        }
        Diagnosis::Unreachable => {
            out.push("The API host is not reachable; check DNS and the VPN connection".to_string());
        }
        Diagnosis::Inconclusive => {
            out.push("Inspect the raw response (run with --verbose); credentials or request format may be wrong".to_string());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{RecordedRequest, TransportFailure};

    fn ip(text: &str) -> Option<IpAddr> {
        Some(text.parse().unwrap())
    }

    #[test]
    fn ip_status() {
        let vpn = ip("84.46.231.251");
        let home = ip("110.175.119.93");

        assert_eq!(IpStatus::evaluate(vpn, vpn, home), IpStatus::Match);
        assert_eq!(IpStatus::evaluate(home, vpn, home), IpStatus::LocalAddress);
        assert_eq!(IpStatus::evaluate(ip("1.1.1.1"), vpn, home), IpStatus::Mismatch);
        assert_eq!(IpStatus::evaluate(vpn, None, None), IpStatus::Unverified);
        assert_eq!(IpStatus::evaluate(None, vpn, home), IpStatus::Unknown);
    }

    #[test]
    fn unreachable_wins() {
        let reachability = Reachability {
            url: "https://example".to_string(),
            status: None,
            elapsed_ms: 5,
            error: Some("dns error".to_string()),
        };
        assert_eq!(
            Diagnosis::evaluate(IpStatus::Match, &reachability, None),
            Diagnosis::Unreachable
        );
    }

    fn reached() -> Reachability {
        Reachability {
            url: "https://example".to_string(),
            status: Some(200),
            elapsed_ms: 5,
            error: None,
        }
    }

    fn auth_failed_with(failure: TransportFailure) -> Exchange {
        Exchange {
            label: "AgentInfoRequest".to_string(),
            request: RecordedRequest {
                method: "POST".to_string(),
                url: "https://example".to_string(),
                headers: Default::default(),
                body: String::new(),
            },
            response: None,
            failure: Some(failure),
            verdict: None,
        }
    }

    #[test]
    fn auth_timeout_depends_on_ip_status() {
        let auth = auth_failed_with(TransportFailure::Timeout { elapsed_ms: 30_000 });

        for ip_status in [IpStatus::Mismatch, IpStatus::LocalAddress] {
            assert_eq!(
                Diagnosis::evaluate(ip_status, &reached(), Some(&auth)),
                Diagnosis::NotWhitelisted
            );
        }
        for ip_status in [IpStatus::Match, IpStatus::Unverified, IpStatus::Unknown] {
            assert_eq!(
                Diagnosis::evaluate(ip_status, &reached(), Some(&auth)),
                Diagnosis::Inconclusive
            );
        }
    }

    #[test]
    fn auth_connect_failure_is_unreachable() {
        let auth = auth_failed_with(TransportFailure::Connect {
            message: "connection refused".to_string(),
        });
        assert_eq!(
            Diagnosis::evaluate(IpStatus::Match, &reached(), Some(&auth)),
            Diagnosis::Unreachable
        );
    }

    #[test]
    fn status_requires_expected_address() {
        assert_eq!(Diagnosis::Whitelisted.status(IpStatus::Match), "ready");
        assert_eq!(Diagnosis::Whitelisted.status(IpStatus::Unverified), "ready");
        assert_eq!(Diagnosis::Whitelisted.status(IpStatus::Mismatch), "needs_attention");
        assert_eq!(Diagnosis::NotWhitelisted.status(IpStatus::Match), "needs_attention");
    }

    #[test]
    fn recommendations_name_the_address() {
        let recs = recommendations(
            Diagnosis::NotWhitelisted,
            IpStatus::Mismatch,
            ip("1.1.1.1"),
            ip("84.46.231.251"),
        );
        assert!(recs[0].contains("1.1.1.1") && recs[0].contains("84.46.231.251"));
        assert!(recs.iter().any(|rec| rec == "Contact Tourplan to whitelist 1.1.1.1"));
    }
}
