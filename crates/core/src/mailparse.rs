//! Gmail MIME body extraction and newsletter filtering (SPEC_FULL.md
//! §10, supplemented from `tools/gmail/initial_sync.py`). Not part of
//! spec.md's distillation, but there is no way to produce
//! `EmailInput.body` without it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default)]
pub struct MimePart {
    pub mime_type: String,
    pub body_data: Option<String>,
    pub parts: Vec<MimePart>,
}

fn safe_b64_decode(data: &str) -> String {
    if data.is_empty() {
        return String::new();
    }
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Strips tags, collapsing whitespace; good enough for commitment
/// extraction, which only needs plain-text content.
fn html_to_text(html: &str) -> String {
    fn tag_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        #[allow(clippy::unwrap_used)]
        RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
    }
    fn whitespace_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        #[allow(clippy::unwrap_used)]
        RE.get_or_init(|| Regex::new(r"\s+").unwrap())
    }

    let stripped = tag_re().replace_all(html, " ");
    whitespace_re().replace_all(&stripped, " ").trim().to_string()
}

/// Recursive multipart walk: prefers `text/plain`, falls back to
/// `text/html` with tags stripped, recurses into nested parts
/// depth-first, first non-empty result wins.
pub fn extract_email_text(payload: &MimePart) -> String {
    let mime_type = payload.mime_type.to_lowercase();

    if mime_type == "text/plain" {
        if let Some(data) = &payload.body_data {
            return safe_b64_decode(data);
        }
    }
    if mime_type == "text/html" {
        if let Some(data) = &payload.body_data {
            return html_to_text(&safe_b64_decode(data));
        }
    }

    for part in &payload.parts {
        let text = extract_email_text(part);
        if !text.is_empty() {
            return text;
        }
    }

    String::new()
}

const SKIP_SENDER_PATTERNS: &[&str] = &[
    r"no-?reply@",
    r"noreply@",
    r"newsletter@",
    r"news@",
    r"do-not-reply@",
    r"bounce@",
];

const SKIP_SUBJECT_PATTERNS: &[&str] = &[
    r"receipt",
    r"order confirmation",
    r"unsubscribe",
    r"invoice",
    r"your receipt",
];

const SKIP_HEADERS: &[&str] = &["List-Unsubscribe", "Precedence", "Auto-Submitted"];

/// `is_likely_newsletter` (spec.md §4.8): INBOX-only filter applied
/// before extraction during backfill.
pub fn is_likely_newsletter(headers: &HashMap<String, String>, sender_email: &str, subject: &str) -> bool {
    for pat in SKIP_SENDER_PATTERNS {
        #[allow(clippy::unwrap_used)]
        if Regex::new(&format!("(?i){pat}")).unwrap().is_match(sender_email) {
            return true;
        }
    }
    for pat in SKIP_SUBJECT_PATTERNS {
        #[allow(clippy::unwrap_used)]
        if Regex::new(&format!("(?i){pat}")).unwrap().is_match(subject) {
            return true;
        }
    }
    for hdr in SKIP_HEADERS {
        if headers.contains_key(*hdr) {
            return true;
        }
    }
    false
}

/// Extracts the bare address from a header like `"John Doe <john@x.com>"`.
pub fn extract_email_address(header_value: &str) -> String {
    fn addr_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        #[allow(clippy::unwrap_used)]
        RE.get_or_init(|| Regex::new(r"<([^<>]+)>").unwrap())
    }
    match addr_re().captures(header_value) {
        Some(caps) => caps[1].trim().to_string(),
        None => header_value.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_text_body() {
        let payload = MimePart {
            mime_type: "text/plain".into(),
            body_data: Some(URL_SAFE_NO_PAD.encode("hello world")),
            parts: vec![],
        };
        assert_eq!(extract_email_text(&payload), "hello world");
    }

    #[test]
    fn falls_back_to_html_with_tags_stripped() {
        let payload = MimePart {
            mime_type: "text/html".into(),
            body_data: Some(URL_SAFE_NO_PAD.encode("<p>hello <b>world</b></p>")),
            parts: vec![],
        };
        assert_eq!(extract_email_text(&payload), "hello world");
    }

    #[test]
    fn recurses_into_nested_multipart() {
        let payload = MimePart {
            mime_type: "multipart/mixed".into(),
            body_data: None,
            parts: vec![MimePart {
                mime_type: "text/plain".into(),
                body_data: Some(URL_SAFE_NO_PAD.encode("nested body")),
                parts: vec![],
            }],
        };
        assert_eq!(extract_email_text(&payload), "nested body");
    }

    #[test]
    fn newsletter_sender_pattern_matches() {
        let headers = HashMap::new();
        assert!(is_likely_newsletter(&headers, "noreply@example.com", "hi"));
        assert!(is_likely_newsletter(&headers, "news@example.com", "hi"));
        assert!(!is_likely_newsletter(&headers, "sarah@sequoia.com", "hi"));
    }

    #[test]
    fn newsletter_subject_pattern_matches() {
        let headers = HashMap::new();
        assert!(is_likely_newsletter(&headers, "a@b.com", "Your receipt from Acme"));
        assert!(is_likely_newsletter(&headers, "a@b.com", "Please unsubscribe info"));
    }

    #[test]
    fn newsletter_header_presence_matches() {
        let mut headers = HashMap::new();
        headers.insert("List-Unsubscribe".to_string(), "<mailto:x>".to_string());
        assert!(is_likely_newsletter(&headers, "a@b.com", "hi"));
    }

    #[test]
    fn extract_email_address_from_display_name_header() {
        assert_eq!(extract_email_address("John Doe <john@example.com>"), "john@example.com");
        assert_eq!(extract_email_address("bare@example.com"), "bare@example.com");
    }
}
