//! Log hygiene for request / response previews
//!
//! Image payloads travel as base64 inside JSON, so a raw body preview would
//! dump megabytes into the log. Bearer tokens must never be logged either.

/// Truncate to at most `max_chars` characters on a char boundary
pub fn safe_truncate(s: &str, max_chars: usize) -> &str {
    if s.chars().count() <= max_chars {
        return s;
    }
    s.char_indices()
        .nth(max_chars)
        .map(|(idx, _)| &s[..idx])
        .unwrap_or(s)
}

/// Elide embedded image data and tokens, then truncate
pub fn redact_for_log(input: &str, max_chars: usize) -> String {
    let s = redact_bearer_tokens(input);
    let s = elide_base64_payloads(&s);
    let truncated = safe_truncate(&s, max_chars);
    if truncated.len() < s.len() {
        format!("{}…", truncated)
    } else {
        s
    }
}

fn redact_bearer_tokens(input: &str) -> String {
    let prefix = "Bearer ";
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find(prefix) {
        out.push_str(&rest[..pos + prefix.len()]);
        rest = &rest[pos + prefix.len()..];
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
            .unwrap_or(rest.len());
        if end > 0 {
            out.push_str("[REDACTED]");
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

fn elide_base64_payloads(input: &str) -> String {
    let marker = ";base64,";
    let mut out = String::with_capacity(input.len().min(4096));
    let mut rest = input;
    while let Some(pos) = rest.find(marker) {
        out.push_str(&rest[..pos + marker.len()]);
        rest = &rest[pos + marker.len()..];
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='))
            .unwrap_or(rest.len());
        out.push_str(&format!("[{} chars elided]", end));
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elides_data_url_body() {
        let body = format!(r#"{{"image":"data:image/jpeg;base64,{}"}}"#, "A".repeat(5000));
        let out = redact_for_log(&body, 500);
        assert_eq!(out, r#"{"image":"data:image/jpeg;base64,[5000 chars elided]"}"#);
    }

    #[test]
    fn redacts_bearer_token() {
        let out = redact_for_log("Authorization: Bearer abc.def-123 ok", 200);
        assert_eq!(out, "Authorization: Bearer [REDACTED] ok");
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(safe_truncate("猫猫猫猫", 2), "猫猫");
        assert_eq!(safe_truncate("cat", 10), "cat");
        assert!(redact_for_log(&"x".repeat(50), 10).ends_with('…'));
    }
}
