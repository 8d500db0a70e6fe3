use std::net::IpAddr;

use hostconnect_xml::{HostConnectRequest, OptionInfoQuery};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    client::Reachability,
    diagnosis::{recommendations, Diagnosis, IpStatus},
    CurrentIp, Exchange, Probe,
};

/// Result of the full allowlist check.
#[derive(Serialize, Clone, Debug)]
pub struct WhitelistReport {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub endpoint: String,
    pub agent_id: String,
    pub current_ip: CurrentIp,
    pub expected_ip: Option<IpAddr>,
    pub ip_status: IpStatus,
    pub reachability: Reachability,
    pub auth: Option<Exchange>,
    pub search: Option<Exchange>,
    pub diagnosis: Diagnosis,
    pub status: &'static str,
    pub recommendations: Vec<String>,
}

impl WhitelistReport {
    pub fn ready(&self) -> bool {
        self.status == "ready"
    }
}

/// Default search step, from configuration.
pub fn default_search(probe: &Probe) -> OptionInfoQuery {
    OptionInfoQuery::new(&probe.config.search_button, &probe.config.search_info)
        .destination(&probe.config.search_destination)
}

/// Address, reachability, authentication, then (only if authentication worked) a search.
pub async fn run(probe: &Probe, search: OptionInfoQuery) -> WhitelistReport {
    let started_at = OffsetDateTime::now_utc();
    let config = &probe.config;

    let current_ip = probe.current_ip().await;
    let ip_status = IpStatus::evaluate(current_ip.ip(), config.expected_ip, config.local_ip);
    info!(?ip_status, "ip status");

    let reachability = probe.client.reachability().await;

    let (auth, search) = if reachability.reachable() {
        let auth = probe
            .client
            .send(&HostConnectRequest::AgentInfo {
                return_account_info: true,
            })
            .await;

        let search = if auth.succeeded() {
            Some(probe.client.send(&HostConnectRequest::OptionInfo(search)).await)
        } else {
            None
        };

        (Some(auth), search)
    } else {
        warn!(error = ?reachability.error, "api not reachable");
        (None, None)
    };

    let diagnosis = Diagnosis::evaluate(ip_status, &reachability, auth.as_ref());
    let recommendations = recommendations(diagnosis, ip_status, current_ip.ip(), config.expected_ip);

    WhitelistReport {
        started_at,
        endpoint: probe.client.api_url().to_string(),
        agent_id: probe.client.agent_id().to_string(),
        expected_ip: config.expected_ip,
        current_ip,
        ip_status,
        reachability,
        auth,
        search,
        status: diagnosis.status(ip_status),
        diagnosis,
        recommendations,
    }
}
