// SPDX-License-Identifier: PMPL-1.0-or-later

//! Blocking HTTP helpers shared by the model client, embedder and sink

use std::time::Duration;

/// Agent with one overall timeout per request.
pub fn agent(timeout_secs: u64) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("autoharden/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Render a transport or status error with any JSON error detail the
/// server sent back.
pub fn describe_error(err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            format_http_error(code, &body)
        }
        other => other.to_string(),
    }
}

fn format_http_error(code: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("HTTP {code}");
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return format!("HTTP {code}: {body}");
    };

    // Gemini nests {"error": {"message": ..}}; flat {"error": ".."} is also common.
    let detail = value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .or_else(|| value.get("error"))
        .and_then(|v| v.as_str());

    match detail {
        Some(detail) => format!("HTTP {code}: {detail}"),
        None => format!("HTTP {code}: {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_http_error() {
        assert_eq!(format_http_error(500, ""), "HTTP 500");
        assert_eq!(format_http_error(502, "bad gateway"), "HTTP 502: bad gateway");
        assert_eq!(
            format_http_error(400, r#"{"error": {"message": "API key not valid"}}"#),
            "HTTP 400: API key not valid"
        );
        assert_eq!(
            format_http_error(404, r#"{"error": "not_found"}"#),
            "HTTP 404: not_found"
        );
    }
}
