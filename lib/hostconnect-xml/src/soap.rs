use serde::{Deserialize, Serialize};

use crate::{element, Credentials};

pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// A `SearchTours` call against the SOAP search service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoapSearch {
    pub country: String,
    pub destination: String,
    pub include_cancellation_deadlines: bool,
}

impl SoapSearch {
    pub fn new(country: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            destination: destination.into(),
            include_cancellation_deadlines: true,
        }
    }

    /// The body element a successful reply carries.
    pub fn reply_tag(&self) -> &'static str {
        "SearchToursResponse"
    }

    pub fn to_envelope(&self, credentials: &Credentials) -> String {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str(&format!("<soap:Envelope xmlns:soap=\"{SOAP_ENVELOPE_NS}\">\n"));
        out.push_str("  <soap:Header>\n");
        out.push_str("    <Authentication>\n");
        element(&mut out, 6, "Username", &credentials.agent_id);
        element(&mut out, 6, "Password", &credentials.password);
        element(&mut out, 6, "AgentId", &credentials.agent_id);
        out.push_str("    </Authentication>\n");
        out.push_str("  </soap:Header>\n");
        out.push_str("  <soap:Body>\n");
        out.push_str("    <SearchTours>\n");
        element(&mut out, 6, "Country", &self.country);
        element(&mut out, 6, "Destination", &self.destination);
        element(
            &mut out,
            6,
            "IncludeCancellationDeadlines",
            if self.include_cancellation_deadlines {
                "true"
            } else {
                "false"
            },
        );
        out.push_str("    </SearchTours>\n");
        out.push_str("  </soap:Body>\n");
        out.push_str("</soap:Envelope>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_layout() {
        let envelope = SoapSearch::new("South Africa", "Cape Town")
            .to_envelope(&Credentials::new("SAMAGT", "pw<1>"));

        assert!(envelope.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<soap:Envelope"));
        assert!(envelope.contains("<Username>SAMAGT</Username>"));
        assert!(envelope.contains("<AgentId>SAMAGT</AgentId>"));
        assert!(envelope.contains("<Password>pw&lt;1&gt;</Password>"));
        assert!(envelope.contains("<Country>South Africa</Country>"));
        assert!(envelope.contains("<IncludeCancellationDeadlines>true</IncludeCancellationDeadlines>"));

        let header = envelope.find("<soap:Header>").unwrap();
        let body = envelope.find("<soap:Body>").unwrap();
        assert!(header < body);
    }
}
