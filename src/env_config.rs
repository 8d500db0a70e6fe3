use std::{net::IpAddr, path::PathBuf, time::Duration};

use figment::{
    providers::{Env, Serialized},
    Figment,
};
use hostconnect_xml::Credentials;
use serde::{Deserialize, Serialize};

use crate::ProbeError;

const ENV_PREFIX: &str = "HCPROBE_";

/// Keys read verbatim from the environment, since figment would parse `0123` as a number.
const VERBATIM_KEYS: [&str; 2] = ["agent_id", "password"];

pub const DEFAULT_IP_SOURCES: [&str; 4] = [
    "https://api.ipify.org",
    "https://httpbin.org/ip",
    "https://icanhazip.com",
    "https://ipinfo.io/ip",
];

#[derive(Serialize, Deserialize, Clone)]
pub struct EnvConfig {
    /// HostConnect XML endpoint
    pub api_url: String,

    /// SOAP search service endpoint
    pub soap_url: String,

    pub agent_id: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    /// The address the remote side has allowlisted (the VPN exit)
    pub expected_ip: Option<IpAddr>,

    /// The address seen when the VPN is off
    pub local_ip: Option<IpAddr>,

    /// "What is my IP" services, tried in order
    pub ip_sources: Vec<String>,

    pub ip_timeout_secs: u64,
    pub request_timeout_secs: u64,

    pub user_agent: String,

    /// Directory JSON reports are written into
    pub report_dir: PathBuf,

    /// Whether to consult the EC2 instance metadata service for the public IP
    pub ec2_metadata: bool,
    pub metadata_url: String,

    /// Defaults for the OptionInfo search step of `check`
    pub search_button: String,
    pub search_info: String,
    pub search_destination: String,
}

impl EnvConfig {
    /// Defaults, then `HCPROBE_*` environment variables, then explicit overrides.
    pub fn load(overrides: impl Serialize) -> Result<Self, ProbeError> {
        Self::figment(overrides)
            .extract()
            .map_err(|err| ProbeError::Config(Box::new(err)))
    }

    fn figment(overrides: impl Serialize) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&VERBATIM_KEYS))
            .merge(Serialized::defaults(VerbatimEnv::read()))
            .merge(Serialized::defaults(overrides))
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.agent_id, &self.password)
    }

    pub fn ip_timeout(&self) -> Duration {
        Duration::from_secs(self.ip_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            api_url: "https://pa-thisis.nx.tourplan.net/hostconnect_test/api/hostConnectApi"
                .to_string(),
            soap_url: "https://pa-thisis.nx.tourplan.net/soap/search".to_string(),
            agent_id: String::new(),
            password: String::new(),

            expected_ip: None,
            local_ip: None,
            ip_sources: DEFAULT_IP_SOURCES.iter().map(ToString::to_string).collect(),

            ip_timeout_secs: 10,
            request_timeout_secs: 30,

            user_agent: format!("hcprobe/{}", env!("CARGO_PKG_VERSION")),
            report_dir: PathBuf::from("."),

            ec2_metadata: false,
            metadata_url: "http://169.254.169.254/latest/meta-data".to_string(),

            search_button: "Day Tours".to_string(),
            search_info: "GS".to_string(),
            search_destination: "Cape Town".to_string(),
        }
    }
}

#[derive(Serialize, Default)]
struct VerbatimEnv {
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

impl VerbatimEnv {
    fn read() -> Self {
        let var = |key: &str| std::env::var(format!("{ENV_PREFIX}{}", key.to_uppercase())).ok();
        Self {
            agent_id: var(VERBATIM_KEYS[0]),
            password: var(VERBATIM_KEYS[1]),
        }
    }
}

/// Command line values layered over the environment. Unset fields are left out of the merge.
#[derive(Serialize, Default, Debug)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soap_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_ip: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ec2_metadata: Option<bool>,
}
