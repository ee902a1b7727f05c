//! Header redaction and size-bounded body capture

use http::HeaderMap;

/// Marker appended to any stored body that was cut at the size bound
pub const TRUNCATION_MARKER: &str = "[truncated]";

/// Headers never persisted, regardless of configuration
const BUILTIN_DENY: &[&str] = &["authorization", "cookie", "set-cookie", "proxy-authorization"];

/// Capture headers as a JSON map, dropping the deny-list (case-insensitive)
pub fn redact_headers(headers: &HeaderMap, extra_deny: &[String]) -> serde_json::Value {
    let mut map = serde_json::Map::new();

    for (name, value) in headers {
        let name_lower = name.as_str().to_ascii_lowercase();
        if BUILTIN_DENY.contains(&name_lower.as_str()) {
            continue;
        }
        if extra_deny
            .iter()
            .any(|deny| deny.eq_ignore_ascii_case(&name_lower))
        {
            continue;
        }
        let value = value.to_str().unwrap_or("<binary>").to_string();
        // Repeated headers collapse into a comma-joined value
        match map.entry(name_lower) {
            serde_json::map::Entry::Occupied(mut entry) => {
                if let serde_json::Value::String(existing) = entry.get_mut() {
                    existing.push_str(", ");
                    existing.push_str(&value);
                }
            }
            serde_json::map::Entry::Vacant(entry) => {
                entry.insert(serde_json::Value::String(value));
            }
        }
    }

    serde_json::Value::Object(map)
}

/// Truncate a string at `cap` bytes on a char boundary, appending the marker
pub fn truncate_with_marker(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        return text.to_string();
    }
    let mut end = cap;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATION_MARKER)
}

/// Capture a body for storage: parsed JSON when the content type allows and
/// the payload fits the bound, otherwise a bounded raw string
pub fn body_value(bytes: &[u8], content_type: Option<&str>, cap: usize) -> serde_json::Value {
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }

    let is_json = content_type
        .map(|ct| ct.contains("application/json") || ct.contains("+json"))
        .unwrap_or(false);

    if is_json && bytes.len() <= cap {
        if let Ok(value) = serde_json::from_slice(bytes) {
            return value;
        }
    }

    let text = String::from_utf8_lossy(bytes);
    serde_json::Value::String(truncate_with_marker(&text, cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_builtin_deny_list_dropped() {
        let captured = redact_headers(
            &headers(&[
                ("Authorization", "Bearer secret"),
                ("Cookie", "session=abc"),
                ("Content-Type", "application/json"),
            ]),
            &[],
        );
        let map = captured.as_object().unwrap();
        assert!(map.get("authorization").is_none());
        assert!(map.get("cookie").is_none());
        assert_eq!(map["content-type"], "application/json");
    }

    #[test]
    fn test_configured_deny_is_case_insensitive() {
        let captured = redact_headers(
            &headers(&[("X-Api-Key", "k"), ("x-request-id", "r1")]),
            &["X-API-KEY".to_string()],
        );
        let map = captured.as_object().unwrap();
        assert!(map.get("x-api-key").is_none());
        assert_eq!(map["x-request-id"], "r1");
    }

    #[test]
    fn test_repeated_headers_collapse() {
        let captured = redact_headers(
            &headers(&[("Accept", "text/html"), ("Accept", "application/json")]),
            &[],
        );
        assert_eq!(
            captured.as_object().unwrap()["accept"],
            "text/html, application/json"
        );
    }

    #[test]
    fn test_truncation_appends_marker() {
        let text = "a".repeat(100);
        let truncated = truncate_with_marker(&text, 10);
        assert!(truncated.starts_with("aaaaaaaaaa"));
        assert!(truncated.ends_with(TRUNCATION_MARKER));

        assert_eq!(truncate_with_marker("short", 10), "short");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let text = "héllo wörld";
        let truncated = truncate_with_marker(text, 2);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
        // Never panics mid-codepoint
        assert!(truncated.starts_with('h'));
    }

    #[test]
    fn test_json_body_parsed() {
        let value = body_value(
            br#"{"name": "Alice"}"#,
            Some("application/json; charset=utf-8"),
            1024,
        );
        assert_eq!(value["name"], "Alice");
    }

    #[test]
    fn test_non_json_body_stored_raw() {
        let value = body_value(b"plain text", Some("text/plain"), 1024);
        assert_eq!(value, serde_json::json!("plain text"));
    }

    #[test]
    fn test_oversized_json_stored_truncated() {
        let body = format!(r#"{{"blob": "{}"}}"#, "x".repeat(100));
        let value = body_value(body.as_bytes(), Some("application/json"), 20);
        let text = value.as_str().unwrap();
        assert!(text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_empty_body_is_null() {
        assert_eq!(body_value(b"", Some("application/json"), 10), serde_json::Value::Null);
    }
}
