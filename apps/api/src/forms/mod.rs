// Marketing-site forms: contact and demo requests.
// Flow: validate -> reCAPTCHA -> notify sales + confirm to submitter -> persist.

pub mod handlers;
pub mod recaptcha;
pub mod store;
pub mod validation;

use axum::http::HeaderMap;

/// Client address as reported by the edge proxy (first `X-Forwarded-For` hop).
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
        })
}

/// "Mary Ann Smith" -> ("Mary", "Ann Smith"). Single-word names get an empty
/// last name.
pub fn split_name(name: &str) -> (String, String) {
    let name = name.trim();
    match name.split_once(char::is_whitespace) {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_client_ip_missing() {
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name("Mary Ann Smith"),
            ("Mary".to_string(), "Ann Smith".to_string())
        );
        assert_eq!(split_name("Cher"), ("Cher".to_string(), String::new()));
    }
}
