use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::{element, Credentials, HOSTCONNECT_DTD};

/// A HostConnect request document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum HostConnectRequest {
    /// Unauthenticated liveness request. Answered even when the caller's IP is not allowlisted.
    Ping,
    /// Agent lookup. The cheapest authenticated request, and so the allowlist check.
    AgentInfo { return_account_info: bool },
    OptionInfo(OptionInfoQuery),
}

/// Product search parameters for an `OptionInfoRequest`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OptionInfoQuery {
    /// Product category, e.g. `Day Tours`, `Accommodation`, `SEARCH`
    pub button_name: String,
    pub destination: Option<String>,
    /// Product code or code pattern
    pub opt: Option<String>,
    /// Requested information level, e.g. `GS` or `AVAIL`
    pub info: String,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    /// Number of adults in a single room configuration
    pub adults: Option<u32>,
}

impl OptionInfoQuery {
    pub fn new(button_name: impl Into<String>, info: impl Into<String>) -> Self {
        Self {
            button_name: button_name.into(),
            info: info.into(),
            ..Default::default()
        }
    }

    pub fn destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

impl HostConnectRequest {
    pub fn request_tag(&self) -> &'static str {
        match self {
            Self::Ping => "PingRequest",
            Self::AgentInfo { .. } => "AgentInfoRequest",
            Self::OptionInfo(_) => "OptionInfoRequest",
        }
    }

    /// The element a successful reply to this request contains.
    pub fn reply_tag(&self) -> &'static str {
        match self {
            Self::Ping => "PingReply",
            Self::AgentInfo { .. } => "AgentInfoReply",
            Self::OptionInfo(_) => "OptionInfoReply",
        }
    }

    pub fn to_xml(&self, credentials: &Credentials) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\"?>\n");
        let _ = writeln!(out, "<!DOCTYPE Request SYSTEM \"{HOSTCONNECT_DTD}\">");
        out.push_str("<Request>\n");

        let tag = self.request_tag();
        match self {
            Self::Ping => {
                let _ = writeln!(out, "    <{tag}/>");
            }
            Self::AgentInfo {
                return_account_info,
            } => {
                let _ = writeln!(out, "    <{tag}>");
                credentials_elements(&mut out, credentials);
                element(
                    &mut out,
                    8,
                    "ReturnAccountInfo",
                    if *return_account_info { "Y" } else { "N" },
                );
                let _ = writeln!(out, "    </{tag}>");
            }
            Self::OptionInfo(query) => {
                let _ = writeln!(out, "    <{tag}>");
                credentials_elements(&mut out, credentials);
                if let Some(opt) = &query.opt {
                    element(&mut out, 8, "Opt", opt);
                }
                element(&mut out, 8, "ButtonName", &query.button_name);
                if let Some(destination) = &query.destination {
                    element(&mut out, 8, "DestinationName", destination);
                }
                element(&mut out, 8, "Info", &query.info);
                if let Some(date_from) = &query.date_from {
                    element(&mut out, 8, "DateFrom", date_from);
                }
                if let Some(date_to) = &query.date_to {
                    element(&mut out, 8, "DateTo", date_to);
                }
                if let Some(adults) = query.adults {
                    out.push_str("        <RoomConfigs>\n");
                    out.push_str("            <RoomConfig>\n");
                    element(&mut out, 16, "Adults", &adults.to_string());
                    out.push_str("            </RoomConfig>\n");
                    out.push_str("        </RoomConfigs>\n");
                }
                let _ = writeln!(out, "    </{tag}>");
            }
        }

        out.push_str("</Request>");
        out
    }
}

/// Guess the success marker for a hand written document: `FooRequest` answers with `FooReply`,
/// and the first element of a SOAP body answers with `<name>Response`.
pub fn infer_reply_tag(document: &str) -> Option<String> {
    if let Some(body_start) = document.find(":Body>") {
        let name = element_names(&document[body_start + ":Body>".len()..]).next()?;
        let local = name.rsplit(':').next().unwrap_or(name);
        return Some(format!("{local}Response"));
    }

    element_names(document)
        .find_map(|name| name.strip_suffix("Request").filter(|stem| !stem.is_empty()))
        .map(|stem| format!("{stem}Reply"))
}

/// Names of opening tags, skipping declarations and closing tags.
fn element_names(document: &str) -> impl Iterator<Item = &str> {
    document.split('<').skip(1).filter_map(|rest| {
        if rest.starts_with(['?', '!', '/']) {
            return None;
        }
        let end = rest
            .find(|ch: char| ch.is_whitespace() || ch == '>' || ch == '/')
            .unwrap_or(rest.len());
        Some(&rest[..end]).filter(|name| !name.is_empty())
    })
}

fn credentials_elements(out: &mut String, credentials: &Credentials) {
    element(out, 8, "AgentID", &credentials.agent_id);
    element(out, 8, "Password", &credentials.password);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("SAMAGT", "S@MAgt01")
    }

    #[test]
    fn ping_has_no_credentials() {
        let xml = HostConnectRequest::Ping.to_xml(&creds());
        assert_eq!(
            xml,
            "<?xml version=\"1.0\"?>\n\
             <!DOCTYPE Request SYSTEM \"hostConnect_5_05_000.dtd\">\n\
             <Request>\n    <PingRequest/>\n</Request>"
        );
        assert!(!xml.contains("SAMAGT"));
    }

    #[test]
    fn agent_info_request() {
        let xml = HostConnectRequest::AgentInfo {
            return_account_info: true,
        }
        .to_xml(&creds());

        assert!(xml.contains("<AgentInfoRequest>"));
        assert!(xml.contains("        <AgentID>SAMAGT</AgentID>\n"));
        assert!(xml.contains("<Password>S@MAgt01</Password>"));
        assert!(xml.contains("<ReturnAccountInfo>Y</ReturnAccountInfo>"));
        assert!(xml.ends_with("    </AgentInfoRequest>\n</Request>"));
    }

    #[test]
    fn option_info_escapes_values_and_skips_missing_fields() {
        let query = OptionInfoQuery::new("Day Tours", "GS").destination("Cape Town & Winelands");
        let xml = HostConnectRequest::OptionInfo(query).to_xml(&creds());

        assert!(xml.contains("<ButtonName>Day Tours</ButtonName>"));
        assert!(xml.contains("<DestinationName>Cape Town &amp; Winelands</DestinationName>"));
        assert!(xml.contains("<Info>GS</Info>"));
        assert!(!xml.contains("<Opt>"));
        assert!(!xml.contains("<DateFrom>"));
        assert!(!xml.contains("<RoomConfigs>"));
    }

    #[test]
    fn option_info_with_dates_and_room() {
        let query = OptionInfoQuery {
            opt: Some("CPTACCZAM???????".to_string()),
            date_from: Some("2025-09-01".to_string()),
            date_to: Some("2025-09-03".to_string()),
            adults: Some(2),
            ..OptionInfoQuery::new("Accommodation", "GS")
        };
        let xml = HostConnectRequest::OptionInfo(query).to_xml(&creds());

        let opt = xml.find("<Opt>").unwrap();
        let button = xml.find("<ButtonName>").unwrap();
        assert!(opt < button);
        assert!(xml.contains("<DateFrom>2025-09-01</DateFrom>"));
        assert!(xml.contains("<DateTo>2025-09-03</DateTo>"));
        assert!(xml.contains("<RoomConfig>\n                <Adults>2</Adults>\n"));
    }

    #[test]
    fn infers_reply_tags() {
        let xml = HostConnectRequest::AgentInfo {
            return_account_info: false,
        }
        .to_xml(&creds());
        assert_eq!(infer_reply_tag(&xml).as_deref(), Some("AgentInfoReply"));

        let envelope = crate::SoapSearch::new("South Africa", "Cape Town").to_envelope(&creds());
        assert_eq!(
            infer_reply_tag(&envelope).as_deref(),
            Some("SearchToursResponse")
        );

        assert_eq!(infer_reply_tag("<Request><Foo/></Request>"), None);
    }

    #[test]
    fn reply_tags() {
        assert_eq!(HostConnectRequest::Ping.reply_tag(), "PingReply");
        assert_eq!(
            HostConnectRequest::OptionInfo(OptionInfoQuery::default()).reply_tag(),
            "OptionInfoReply"
        );
    }
}
