//! Payload builders and reply classification for the Tourplan HostConnect API.
//!
//! Nothing in here performs IO: requests are rendered to strings and replies are
//! classified from a status code and a body.

use std::fmt::Write;

pub mod reply;
pub mod request;
pub mod soap;

pub use reply::{classify, Verdict};
pub use request::{infer_reply_tag, HostConnectRequest, OptionInfoQuery};
pub use soap::SoapSearch;

/// The DTD every HostConnect request document declares.
pub const HOSTCONNECT_DTD: &str = "hostConnect_5_05_000.dtd";

/// Agent credentials sent inside every request.
#[derive(Clone)]
pub struct Credentials {
    pub agent_id: String,
    pub password: String,
}

impl Credentials {
    pub fn new(agent_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("agent_id", &self.agent_id)
            .field("password", &"********")
            .finish()
    }
}

/// Escape text for use as XML element content.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Write `<tag>escaped value</tag>` on its own line.
fn element(out: &mut String, indent: usize, tag: &str, value: &str) {
    let _ = writeln!(
        out,
        "{:indent$}<{tag}>{value}</{tag}>",
        "",
        value = escape(value)
    );
}
