use std::{collections::BTreeSet, net::IpAddr, time::Duration};

use hostconnect_xml::HostConnectRequest;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{public_ip, Exchange, Probe};

#[derive(Clone, Copy, Debug)]
pub struct MonitorOptions {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct Attempt {
    pub number: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub ip: Option<IpAddr>,
    pub ip_error: Option<String>,
    pub ping: Option<Exchange>,
    pub auth: Option<Exchange>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MonitorSummary {
    pub attempts: u32,
    pub distinct_ips: Vec<IpAddr>,
    /// At most one exit address was seen
    pub stable: bool,
    pub ping_ok: u32,
    pub auth_ok: u32,
    pub ip_blocked: u32,
}

#[derive(Serialize, Clone, Debug)]
pub struct MonitorReport {
    pub attempts: Vec<Attempt>,
    pub summary: MonitorSummary,
}

/// Repeat address lookup, ping and authentication `attempts` times, sleeping `interval` in between.
/// `on_attempt` is called as each round completes.
pub async fn run(
    probe: &Probe,
    options: MonitorOptions,
    mut on_attempt: impl FnMut(&Attempt),
) -> MonitorReport {
    let mut attempts = Vec::with_capacity(options.attempts as usize);

    for number in 1..=options.attempts {
        let attempt = run_attempt(probe, number).await;
        on_attempt(&attempt);
        let skipped = attempt.ip.is_none();
        attempts.push(attempt);

        // a skipped round also skips its wait
        if !skipped && number < options.attempts {
            tokio::time::sleep(options.interval).await;
        }
    }

    let summary = summarize(&attempts);
    info!(?summary, "monitor finished");

    MonitorReport { attempts, summary }
}

async fn run_attempt(probe: &Probe, number: u32) -> Attempt {
    let mut attempt = Attempt {
        number,
        at: OffsetDateTime::now_utc(),
        ip: None,
        ip_error: None,
        ping: None,
        auth: None,
    };

    match public_ip::lookup(&probe.http, &probe.config.ip_sources, probe.config.ip_timeout()).await {
        Ok(observation) => attempt.ip = Some(observation.ip),
        Err(err) => {
            // without an address the API results can't be attributed to anything
            warn!(number, %err, "ip lookup failed; skipping attempt");
            attempt.ip_error = Some(err.to_string());
            return attempt;
        }
    }

    attempt.ping = Some(probe.client.send(&HostConnectRequest::Ping).await);
    attempt.auth = Some(
        probe
            .client
            .send(&HostConnectRequest::AgentInfo {
                return_account_info: false,
            })
            .await,
    );

    attempt
}

pub fn summarize(attempts: &[Attempt]) -> MonitorSummary {
    let distinct: BTreeSet<IpAddr> = attempts.iter().filter_map(|attempt| attempt.ip).collect();
    let pings = || attempts.iter().filter_map(|attempt| attempt.ping.as_ref());
    let auths = || attempts.iter().filter_map(|attempt| attempt.auth.as_ref());

    MonitorSummary {
        attempts: attempts.len() as u32,
        stable: distinct.len() <= 1,
        distinct_ips: distinct.into_iter().collect(),
        ping_ok: pings().filter(|ping| ping.succeeded()).count() as u32,
        auth_ok: auths().filter(|auth| auth.succeeded()).count() as u32,
        ip_blocked: auths().filter(|auth| auth.indicates_ip_block()).count() as u32,
    }
}
