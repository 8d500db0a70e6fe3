use std::net::IpAddr;

use cloud::Ec2Info;
use serde::Serialize;
use tracing::info;

pub use client::HostConnectClient;
pub use env_config::EnvConfig;
pub use error::ProbeError;
pub use exchange::Exchange;
pub use public_ip::IpObservation;

pub mod client;
pub mod cloud;
pub mod console;
pub mod diagnosis;
pub mod env_config;
pub mod exchange;
pub mod monitor;
pub mod public_ip;
pub mod report;
pub mod whitelist;

mod error;

#[cfg(test)]
mod tests;

/// Common context for a diagnostic run
pub struct Probe {
    pub config: EnvConfig,
    /// Shared by the IP lookups and the API client
    pub http: reqwest::Client,
    pub client: HostConnectClient,
}

/// Best knowledge of this host's public address.
#[derive(Serialize, Clone, Debug, Default)]
pub struct CurrentIp {
    pub observation: Option<IpObservation>,
    pub ec2: Option<Ec2Info>,
    pub error: Option<String>,
}

impl CurrentIp {
    /// The instance metadata address is authoritative when present.
    pub fn ip(&self) -> Option<IpAddr> {
        self.ec2
            .as_ref()
            .map(|ec2| ec2.public_ip)
            .or_else(|| self.observation.as_ref().map(|observation| observation.ip))
    }
}

impl Probe {
    pub fn new(config: EnvConfig) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout())
            .build()?;
        let client = HostConnectClient::new(http.clone(), &config);

        Ok(Self {
            config,
            http,
            client,
        })
    }

    pub async fn current_ip(&self) -> CurrentIp {
        let mut current = CurrentIp::default();

        match public_ip::lookup(&self.http, &self.config.ip_sources, self.config.ip_timeout()).await
        {
            Ok(observation) => current.observation = Some(observation),
            Err(err) => current.error = Some(err.to_string()),
        }

        if self.config.ec2_metadata {
            current.ec2 = cloud::ec2_metadata(&self.http, &self.config.metadata_url).await;
            if let Some(ec2) = &current.ec2 {
                info!(ip = %ec2.public_ip, instance = %ec2.instance_id, "running on EC2");
            }
        }

        current
    }
}
