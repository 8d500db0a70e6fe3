use std::{net::IpAddr, time::Duration};

use serde::Serialize;
use tracing::debug;

const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

/// What the EC2 instance metadata service says about this host.
#[derive(Serialize, Clone, Debug)]
pub struct Ec2Info {
    pub public_ip: IpAddr,
    pub instance_id: String,
    pub region: String,
    pub availability_zone: String,
}

/// `None` when not running on EC2 (or the metadata service is unreachable).
pub async fn ec2_metadata(client: &reqwest::Client, base_url: &str) -> Option<Ec2Info> {
    let base_url = base_url.trim_end_matches('/');

    let public_ip = match fetch(client, &format!("{base_url}/public-ipv4")).await {
        Some(text) => text.parse::<IpAddr>().ok()?,
        None => {
            debug!("instance metadata not reachable");
            return None;
        }
    };

    let field = |path: &'static str| {
        let url = format!("{base_url}/{path}");
        async move {
            fetch(client, &url)
                .await
                .unwrap_or_else(|| "unknown".to_string())
        }
    };

    Some(Ec2Info {
        public_ip,
        instance_id: field("instance-id").await,
        region: field("placement/region").await,
        availability_zone: field("placement/availability-zone").await,
    })
}

async fn fetch(client: &reqwest::Client, url: &str) -> Option<String> {
    let response = client
        .get(url)
        .timeout(METADATA_TIMEOUT)
        .send()
        .await
        .ok()?
        .error_for_status()
        .ok()?;

    Some(response.text().await.ok()?.trim().to_string())
}
