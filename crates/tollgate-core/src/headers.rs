pub type Headers = Vec<(String, String)>;

pub fn header_get<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

pub fn header_set(headers: &mut Headers, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    let value = value.into();
    if let Some((_, existing)) = headers
        .iter_mut()
        .find(|(key, _)| key.eq_ignore_ascii_case(&name))
    {
        *existing = value;
        return;
    }
    headers.push((name, value));
}

/// Builds the outbound header set for an upstream call: hop-by-hop and
/// framing headers go away (the HTTP client sets its own), caller credentials
/// and proxy-added routing headers are never forwarded, and the service
/// credential is injected.
pub fn sanitize_forward_headers(inbound: &Headers, service_api_key: &str) -> Headers {
    let mut out: Headers = inbound
        .iter()
        .filter(|(name, _)| !is_stripped_header(name))
        .cloned()
        .collect();
    header_set(&mut out, "authorization", format!("Bearer {service_api_key}"));
    out
}

fn is_stripped_header(name: &str) -> bool {
    is_hop_by_hop_or_framing_header(name)
        || is_caller_auth_header(name)
        || is_proxy_routing_header(name)
}

pub fn is_hop_by_hop_or_framing_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-length")
        || name.eq_ignore_ascii_case("transfer-encoding")
        || name.eq_ignore_ascii_case("connection")
        || name.eq_ignore_ascii_case("keep-alive")
        || name.eq_ignore_ascii_case("proxy-authenticate")
        || name.eq_ignore_ascii_case("proxy-authorization")
        || name.eq_ignore_ascii_case("te")
        || name.eq_ignore_ascii_case("trailer")
        || name.eq_ignore_ascii_case("upgrade")
        || name.eq_ignore_ascii_case("host")
}

fn is_caller_auth_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("authorization")
        || name.eq_ignore_ascii_case("x-api-key")
        || name.eq_ignore_ascii_case("cookie")
}

fn is_proxy_routing_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("x-forwarded-")
        || lower == "x-real-ip"
        || lower == "forwarded"
        || lower == "cf-connecting-ip"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound() -> Headers {
        vec![
            ("Host".to_string(), "proxy.example.com".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), "Bearer sk-caller".to_string()),
            ("X-Forwarded-For".to_string(), "10.0.0.1".to_string()),
            ("Cookie".to_string(), "session=abc".to_string()),
            ("Accept".to_string(), "text/event-stream".to_string()),
            ("Connection".to_string(), "keep-alive".to_string()),
        ]
    }

    #[test]
    fn strips_caller_credentials_and_hop_by_hop() {
        let out = sanitize_forward_headers(&inbound(), "svc-key");
        assert!(header_get(&out, "cookie").is_none());
        assert!(header_get(&out, "host").is_none());
        assert!(header_get(&out, "x-forwarded-for").is_none());
        assert!(header_get(&out, "connection").is_none());
        assert_eq!(header_get(&out, "content-type"), Some("application/json"));
        assert_eq!(header_get(&out, "accept"), Some("text/event-stream"));
    }

    #[test]
    fn injects_service_credential() {
        let out = sanitize_forward_headers(&inbound(), "svc-key");
        assert_eq!(header_get(&out, "authorization"), Some("Bearer svc-key"));
    }

    #[test]
    fn header_set_replaces_case_insensitively() {
        let mut headers = vec![("X-Test".to_string(), "a".to_string())];
        header_set(&mut headers, "x-test", "b");
        assert_eq!(headers.len(), 1);
        assert_eq!(header_get(&headers, "X-TEST"), Some("b"));
    }
}
