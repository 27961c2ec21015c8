//! Service-specific error details parsed from an error response body.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

/// Longest error body text kept as a fallback message.
const MAX_FALLBACK_MESSAGE: usize = 1024;

/// Structured extended error info returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedErrorInfo {
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_details: BTreeMap<String, String>,
}

impl ExtendedErrorInfo {
    /// Fields present in `other` win; details are unioned.
    pub(crate) fn merge(mut self, other: ExtendedErrorInfo) -> Self {
        if other.error_code.is_some() {
            self.error_code = other.error_code;
        }
        if other.error_message.is_some() {
            self.error_message = other.error_message;
        }
        self.additional_details.extend(other.additional_details);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.error_code.is_none() && self.error_message.is_none() && self.additional_details.is_empty()
    }
}

/// Default error-body parser.
///
/// Understands `{"error": {"code", "message"}}`, `{"odata.error": {"code",
/// "message": {"value"}}}` and a flat `{"code", "message"}`. Any other
/// non-empty body becomes the error message verbatim (truncated).
pub fn parse_json_error(body: &mut dyn Read) -> Option<ExtendedErrorInfo> {
    let mut text = String::new();
    if body.read_to_string(&mut text).is_err() {
        return None;
    }
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        let obj = value
            .get("error")
            .or_else(|| value.get("odata.error"))
            .unwrap_or(&value);
        let code = obj.get("code").and_then(|c| c.as_str()).map(str::to_string);
        let message = obj.get("message").and_then(|m| {
            m.as_str()
                .map(str::to_string)
                .or_else(|| m.get("value").and_then(|v| v.as_str()).map(str::to_string))
        });
        let mut details = BTreeMap::new();
        if let Some(map) = obj.as_object() {
            for (k, v) in map {
                if k == "code" || k == "message" {
                    continue;
                }
                if let Some(s) = v.as_str() {
                    details.insert(k.clone(), s.to_string());
                }
            }
        }
        let info = ExtendedErrorInfo {
            error_code: code,
            error_message: message,
            additional_details: details,
        };
        if !info.is_empty() {
            return Some(info);
        }
    }

    let mut message = text.to_string();
    if message.len() > MAX_FALLBACK_MESSAGE {
        let mut cut = MAX_FALLBACK_MESSAGE;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    Some(ExtendedErrorInfo {
        error_message: Some(message),
        ..ExtendedErrorInfo::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Option<ExtendedErrorInfo> {
        parse_json_error(&mut s.as_bytes())
    }

    #[test]
    fn nested_error_object() {
        let info = parse(r#"{"error":{"code":"ContainerNotFound","message":"nope","Reason":"gone"}}"#)
            .unwrap();
        assert_eq!(info.error_code.as_deref(), Some("ContainerNotFound"));
        assert_eq!(info.error_message.as_deref(), Some("nope"));
        assert_eq!(info.additional_details.get("Reason").map(String::as_str), Some("gone"));
    }

    #[test]
    fn odata_error_with_value_message() {
        let info = parse(r#"{"odata.error":{"code":"TableNotFound","message":{"lang":"en-US","value":"missing"}}}"#)
            .unwrap();
        assert_eq!(info.error_code.as_deref(), Some("TableNotFound"));
        assert_eq!(info.error_message.as_deref(), Some("missing"));
    }

    #[test]
    fn plain_text_becomes_message() {
        let info = parse("<Error><Code>X</Code></Error>").unwrap();
        assert!(info.error_code.is_none());
        assert!(info.error_message.unwrap().contains("<Code>X</Code>"));
    }

    #[test]
    fn empty_body_yields_none() {
        assert!(parse("   ").is_none());
    }
}
