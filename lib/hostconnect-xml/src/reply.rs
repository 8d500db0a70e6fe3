use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// HostConnect's error number for a request from an address outside the allowlist.
pub const IP_NOT_WHITELISTED_CODE: &str = "2050";

const PREVIEW_CHARS: usize = 200;

/// Classification of a single HTTP response from HostConnect or the SOAP search service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// The expected reply element was present
    Success {
        reply: String,
        agent_name: Option<String>,
        currency: Option<String>,
    },
    /// An `ErrorReply` that points at the caller's address
    IpNotWhitelisted {
        code: Option<String>,
        message: String,
    },
    /// Any other `ErrorReply`
    ApiError {
        code: Option<String>,
        message: String,
    },
    SoapFault {
        fault: String,
    },
    /// HTTP 403
    AccessDenied,
    /// HTTP 401
    Unauthorized,
    /// HTTP 404
    EndpointNotFound,
    ServerError {
        status: u16,
    },
    HttpError {
        status: u16,
    },
    Unexpected {
        preview: String,
    },
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Whether the response is evidence of the caller's IP being blocked.
    pub fn indicates_ip_block(&self) -> bool {
        matches!(self, Self::IpNotWhitelisted { .. } | Self::AccessDenied)
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success {
                reply, agent_name, ..
            } => match agent_name {
                Some(name) => write!(f, "{reply} received (agent: {name})"),
                None => write!(f, "{reply} received"),
            },
            Self::IpNotWhitelisted { code, message } => match code {
                Some(code) => write!(f, "IP not whitelisted (error {code}): {message}"),
                None => write!(f, "IP not whitelisted: {message}"),
            },
            Self::ApiError { code, message } => match code {
                Some(code) => write!(f, "API error {code}: {message}"),
                None => write!(f, "API error: {message}"),
            },
            Self::SoapFault { fault } => write!(f, "SOAP fault: {fault}"),
            Self::AccessDenied => write!(f, "access denied (403)"),
            Self::Unauthorized => write!(f, "authentication failed (401)"),
            Self::EndpointNotFound => write!(f, "endpoint not found (404)"),
            Self::ServerError { status } => write!(f, "server error ({status})"),
            Self::HttpError { status } => write!(f, "unexpected HTTP status {status}"),
            Self::Unexpected { preview } => write!(f, "unexpected response: {preview}"),
        }
    }
}

/// Classify a response by status code first, then by marker elements in the body.
pub fn classify(status: u16, body: &str, expected_reply: &str) -> Verdict {
    match status {
        403 => return Verdict::AccessDenied,
        401 => return Verdict::Unauthorized,
        404 => return Verdict::EndpointNotFound,
        500..=599 => return Verdict::ServerError { status },
        200..=299 => {}
        _ => return Verdict::HttpError { status },
    }

    if contains_element(body, expected_reply) {
        return Verdict::Success {
            reply: expected_reply.to_string(),
            agent_name: extract_tag(body, "AgentName")
                .or_else(|| extract_tag(body, "Name"))
                .map(str::to_string),
            currency: extract_tag(body, "Currency").map(str::to_string),
        };
    }

    if body.contains("soap:Fault") || contains_element(body, "Fault") {
        let fault = extract_tag(body, "faultstring").unwrap_or("Unknown fault");
        return Verdict::SoapFault {
            fault: fault.to_string(),
        };
    }

    if contains_element(body, "ErrorReply") {
        let message = extract_tag(body, "Error")
            .unwrap_or("Unknown error")
            .to_string();
        let code = error_code(&message);

        let ip_related =
            code.as_deref() == Some(IP_NOT_WHITELISTED_CODE) || mentions_ip_restriction(&message);

        return if ip_related {
            Verdict::IpNotWhitelisted { code, message }
        } else {
            Verdict::ApiError { code, message }
        };
    }

    Verdict::Unexpected {
        preview: preview(body),
    }
}

/// Inner text of the first `tag` element, trimmed. Attributes on the opening tag are allowed,
/// and a self-closing element yields an empty string.
pub fn extract_tag<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    extract_from(body, tag).map(|(inner, _)| inner)
}

/// Inner text of every `tag` element, in document order.
pub fn extract_all<'a>(body: &'a str, tag: &str) -> Vec<&'a str> {
    let mut found = vec![];
    let mut rest = body;
    while let Some((inner, consumed)) = extract_from(rest, tag) {
        found.push(inner);
        rest = &rest[consumed..];
    }
    found
}

/// Replaces the inner text of every `tag` element with `mask`.
///
/// An element left unterminated is masked to the end of the document.
pub fn mask_elements(body: &str, tag: &str, mask: &str) -> String {
    let close = format!("</{tag}>");
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(open) = find_open_tag(rest, tag) {
        let after_name = open + 1 + tag.len();
        let Some(open_len) = rest[after_name..].find('>') else {
            break;
        };
        let content_start = after_name + open_len + 1;
        out.push_str(&rest[..content_start]);

        if rest[..content_start - 1].ends_with('/') {
            rest = &rest[content_start..];
            continue;
        }

        out.push_str(mask);
        match rest[content_start..].find(&close) {
            Some(content_len) => rest = &rest[content_start + content_len..],
            None => {
                rest = "";
                break;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Returns the inner text and the number of bytes consumed up to the end of the element.
fn extract_from<'a>(body: &'a str, tag: &str) -> Option<(&'a str, usize)> {
    let open = find_open_tag(body, tag)?;
    let after_name = open + 1 + tag.len();
    let open_end = after_name + body[after_name..].find('>')?;

    if body[..open_end].ends_with('/') {
        return Some(("", open_end + 1));
    }

    let content_start = open_end + 1;
    let close = format!("</{tag}>");
    let content_len = body[content_start..].find(&close)?;
    let content_end = content_start + content_len;

    Some((
        body[content_start..content_end].trim(),
        content_end + close.len(),
    ))
}

/// Byte offset of `<tag` where the name is followed by `>`, `/` or whitespace.
fn find_open_tag(body: &str, tag: &str) -> Option<usize> {
    let needle = format!("<{tag}");
    let mut offset = 0;
    while let Some(pos) = body[offset..].find(&needle) {
        let start = offset + pos;
        let next = body[start + needle.len()..].chars().next();
        match next {
            Some('>') | Some('/') => return Some(start),
            Some(ch) if ch.is_whitespace() => return Some(start),
            _ => offset = start + needle.len(),
        }
    }
    None
}

fn contains_element(body: &str, tag: &str) -> bool {
    !tag.is_empty() && find_open_tag(body, tag).is_some()
}

/// The first purely numeric word of an error message, e.g. `2050` in `2050 SCN Request denied`.
fn error_code(message: &str) -> Option<String> {
    message
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .find(|word| !word.is_empty() && word.chars().all(|ch| ch.is_ascii_digit()))
        .map(str::to_string)
}

fn mentions_ip_restriction(message: &str) -> bool {
    let upper = message.to_uppercase();

    upper
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .any(|word| word == "IP")
        || ["WHITELIST", "ALLOWLIST", "ACCESS", "UNAUTHORIZED", "UNAUTHORISED"]
            .iter()
            .any(|marker| upper.contains(marker))
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT_REPLY: &str = r#"<?xml version="1.0"?>
<!DOCTYPE Reply SYSTEM "hostConnect_5_05_000.dtd">
<Reply>
  <AgentInfoReply>
    <AgentName>Sample Agent</AgentName>
    <Currency>AUD</Currency>
  </AgentInfoReply>
</Reply>"#;

    fn error_reply(message: &str) -> String {
        format!("<Reply><ErrorReply><Error>{message}</Error></ErrorReply></Reply>")
    }

    #[test]
    fn extract_handles_attributes_and_self_closing() {
        let body = r#"<a><Error code="1">  boom </Error><PingReply/><Errors>x</Errors></a>"#;
        assert_eq!(extract_tag(body, "Error"), Some("boom"));
        assert_eq!(extract_tag(body, "PingReply"), Some(""));
        assert_eq!(extract_tag(body, "Errors"), Some("x"));
        assert_eq!(extract_tag(body, "Missing"), None);
    }

    #[test]
    fn extract_all_in_order() {
        let body = "<Opt>A</Opt><OptGeneral/><Opt>B</Opt>";
        assert_eq!(extract_all(body, "Opt"), vec!["A", "B"]);
    }

    #[test]
    fn unterminated_element_is_none() {
        assert_eq!(extract_tag("<Error>never closed", "Error"), None);
    }

    #[test]
    fn status_codes_take_precedence() {
        assert_eq!(classify(403, AGENT_REPLY, "AgentInfoReply"), Verdict::AccessDenied);
        assert_eq!(classify(401, "", "AgentInfoReply"), Verdict::Unauthorized);
        assert_eq!(classify(404, "", "AgentInfoReply"), Verdict::EndpointNotFound);
        assert_eq!(
            classify(502, "", "AgentInfoReply"),
            Verdict::ServerError { status: 502 }
        );
        assert_eq!(
            classify(302, "", "AgentInfoReply"),
            Verdict::HttpError { status: 302 }
        );
    }

    #[test]
    fn agent_info_success_captures_details() {
        let verdict = classify(200, AGENT_REPLY, "AgentInfoReply");
        assert_eq!(
            verdict,
            Verdict::Success {
                reply: "AgentInfoReply".to_string(),
                agent_name: Some("Sample Agent".to_string()),
                currency: Some("AUD".to_string()),
            }
        );
        assert!(verdict.is_success());
        assert!(!verdict.indicates_ip_block());
    }

    #[test]
    fn error_2050_is_an_ip_block() {
        let verdict = classify(200, &error_reply("2050 SCN Request denied"), "AgentInfoReply");
        assert_eq!(
            verdict,
            Verdict::IpNotWhitelisted {
                code: Some("2050".to_string()),
                message: "2050 SCN Request denied".to_string(),
            }
        );
        assert!(verdict.indicates_ip_block());
    }

    #[test]
    fn ip_wording_is_an_ip_block() {
        for message in [
            "Request from IP 1.2.3.4 rejected",
            "Access denied",
            "Host not on whitelist",
            "Agent unauthorised",
        ] {
            assert!(
                classify(200, &error_reply(message), "AgentInfoReply").indicates_ip_block(),
                "{message}"
            );
        }
    }

    #[test]
    fn ip_must_be_a_whole_word() {
        let verdict = classify(200, &error_reply("1001 Invalid DESCRIPTION"), "AgentInfoReply");
        assert_eq!(
            verdict,
            Verdict::ApiError {
                code: Some("1001".to_string()),
                message: "1001 Invalid DESCRIPTION".to_string(),
            }
        );
    }

    #[test]
    fn code_2050_inside_other_numbers_is_not_an_ip_block() {
        let message = "1010 Invalid date 20501231";
        let verdict = classify(200, &error_reply(message), "OptionInfoReply");
        assert_eq!(
            verdict,
            Verdict::ApiError {
                code: Some("1010".to_string()),
                message: message.to_string(),
            }
        );
    }

    #[test]
    fn mask_every_element() {
        let body = "<A><Password>one</Password><PasswordHint>h</PasswordHint>\
                    <Password type=\"x\">two</Password><Password/></A>";
        assert_eq!(
            mask_elements(body, "Password", "***"),
            "<A><Password>***</Password><PasswordHint>h</PasswordHint>\
             <Password type=\"x\">***</Password><Password/></A>"
        );
    }

    #[test]
    fn mask_unterminated_element_to_the_end() {
        assert_eq!(
            mask_elements("<Password>leak", "Password", "***"),
            "<Password>***"
        );
        assert_eq!(mask_elements("no secrets", "Password", "***"), "no secrets");
    }

    #[test]
    fn error_reply_without_message() {
        let verdict = classify(200, "<ErrorReply></ErrorReply>", "OptionInfoReply");
        assert_eq!(
            verdict,
            Verdict::ApiError {
                code: None,
                message: "Unknown error".to_string(),
            }
        );
    }

    #[test]
    fn soap_fault() {
        let body = r#"<soap:Envelope><soap:Body><soap:Fault><faultcode>soap:Client</faultcode><faultstring>Bad request</faultstring></soap:Fault></soap:Body></soap:Envelope>"#;
        assert_eq!(
            classify(200, body, "SearchToursResponse"),
            Verdict::SoapFault {
                fault: "Bad request".to_string()
            }
        );
    }

    #[test]
    fn empty_and_unknown_bodies_are_unexpected() {
        assert_eq!(
            classify(200, "", "PingReply"),
            Verdict::Unexpected {
                preview: String::new()
            }
        );

        let long = "x".repeat(500);
        match classify(200, &long, "PingReply") {
            Verdict::Unexpected { preview } => {
                assert_eq!(preview.len(), PREVIEW_CHARS + 3);
                assert!(preview.ends_with("..."));
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn reply_marker_must_be_an_element() {
        // the text "PingReply" alone is not a reply element
        let verdict = classify(200, "<Reply>PingReply</Reply>", "PingReply");
        assert!(!verdict.is_success());
    }

    #[test]
    fn verdict_serializes_with_tag() {
        let json = serde_json::to_value(Verdict::ServerError { status: 503 }).unwrap();
        assert_eq!(json, serde_json::json!({ "verdict": "server_error", "status": 503 }));

        let json = serde_json::to_value(Verdict::AccessDenied).unwrap();
        assert_eq!(json, serde_json::json!({ "verdict": "access_denied" }));
    }
}
