use std::{net::IpAddr, path::PathBuf};

use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{EnvConfig, Probe};


const AGENT_ID: &str = "SAMAGT";
const PASSWORD: &str = "S@MAgt01";
const VPN_IP: &str = "84.46.231.251";

const PING_REPLY: &str = r#"<?xml version="1.0"?>
<!DOCTYPE Reply SYSTEM "hostConnect_5_05_000.dtd">
<Reply><PingReply><Version>5.05.000</Version></PingReply></Reply>"#;

const AGENT_INFO_REPLY: &str = r#"<?xml version="1.0"?>
<!DOCTYPE Reply SYSTEM "hostConnect_5_05_000.dtd">
<Reply>
  <AgentInfoReply>
    <AgentName>Sample Agent</AgentName>
    <Currency>ZAR</Currency>
  </AgentInfoReply>
</Reply>"#;

const OPTION_INFO_REPLY: &str = r#"<?xml version="1.0"?>
<Reply><OptionInfoReply><Option><Opt>CPTDTTOUR001</Opt></Option></OptionInfoReply></Reply>"#;

const NOT_WHITELISTED_REPLY: &str = r#"<?xml version="1.0"?>
<Reply><ErrorReply><Error>2050 SCN Request denied</Error></ErrorReply></Reply>"#;

fn vpn_ip() -> IpAddr {
    VPN_IP.parse().unwrap()
}

/// Configuration with every endpoint pointing at the mock server.
fn mock_config(server: &MockServer) -> EnvConfig {
    let uri = server.uri();
    EnvConfig {
        api_url: format!("{uri}/hostconnect"),
        soap_url: format!("{uri}/soap/search"),
        agent_id: AGENT_ID.to_string(),
        password: PASSWORD.to_string(),
        expected_ip: Some(vpn_ip()),
        ip_sources: vec![format!("{uri}/ip")],
        ip_timeout_secs: 5,
        request_timeout_secs: 5,
        report_dir: PathBuf::from("unused"),
        metadata_url: format!("{uri}/latest/meta-data"),
        ..Default::default()
    }
}

fn mock_probe(server: &MockServer) -> Probe {
    Probe::new(mock_config(server)).unwrap()
}

async fn mount_ip(server: &MockServer, ip: &str) {
    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{ip}\n")))
        .mount(server)
        .await;
}

/// Answer requests whose body contains `marker` with `reply`.
async fn mount_hostconnect(server: &MockServer, marker: &str, status: u16, reply: &str) {
    Mock::given(method("POST"))
        .and(path("/hostconnect"))
        .and(body_string_contains(marker))
        .respond_with(ResponseTemplate::new(status).set_body_string(reply))
        .mount(server)
        .await;
}
