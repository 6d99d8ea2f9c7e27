//! Origin allow-list consulted at nonce issuance
//!
//! Browser traffic must come from a configured origin: exact matches plus a
//! wildcard-suffix rule for domains like development tunnels. Requests with
//! no origin value (native and game clients) are not subject to the check.
//! Suffix matches are accepted over https only.

use shared::AuthConfig;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct OriginPolicy {
    exact: Vec<String>,
    suffixes: Vec<String>,
}

impl OriginPolicy {
    pub fn new(exact: Vec<String>, suffixes: Vec<String>) -> Self {
        let exact = exact
            .into_iter()
            .map(|o| o.trim().to_lowercase())
            .filter(|o| {
                let valid = o.starts_with("http://") || o.starts_with("https://");
                if !o.is_empty() && !valid {
                    warn!(origin = %o, "Ignoring allow-list origin without http(s) scheme");
                }
                valid
            })
            .collect();

        let suffixes = suffixes
            .into_iter()
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Self { exact, suffixes }
    }

    pub fn from_config(auth: &AuthConfig) -> Self {
        Self::new(
            auth.allowed_origins.clone(),
            auth.allowed_origin_suffixes.clone(),
        )
    }

    /// Whether a request carrying this origin may be issued a nonce.
    /// `None` means the caller sent no origin at all.
    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        let Some(origin) = origin else {
            return true;
        };

        let origin = origin.trim().to_lowercase();
        if !origin.starts_with("http://") && !origin.starts_with("https://") {
            return false;
        }

        if self.exact.iter().any(|o| *o == origin) {
            return true;
        }

        if let Some(host) = origin.strip_prefix("https://") {
            let host = host.split([':', '/']).next().unwrap_or(host);
            return self
                .suffixes
                .iter()
                .any(|s| host == s || host.ends_with(&format!(".{}", s)));
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> OriginPolicy {
        OriginPolicy::new(
            vec![
                "https://app.example.com".to_string(),
                "http://localhost:3000".to_string(),
            ],
            vec!["trycloudflare.com".to_string()],
        )
    }

    #[test]
    fn test_exact_match_allowed() {
        assert!(policy().is_allowed(Some("https://app.example.com")));
        assert!(policy().is_allowed(Some("http://localhost:3000")));
    }

    #[test]
    fn test_exact_match_case_insensitive() {
        assert!(policy().is_allowed(Some("https://App.Example.COM")));
    }

    #[test]
    fn test_unlisted_origin_rejected() {
        assert!(!policy().is_allowed(Some("https://evil.example.net")));
    }

    #[test]
    fn test_absent_origin_allowed() {
        assert!(policy().is_allowed(None));
    }

    #[test]
    fn test_suffix_match_allows_subdomains() {
        assert!(policy().is_allowed(Some("https://purple-otter-42.trycloudflare.com")));
        assert!(policy().is_allowed(Some("https://trycloudflare.com")));
    }

    #[test]
    fn test_suffix_match_requires_https() {
        assert!(!policy().is_allowed(Some("http://purple-otter-42.trycloudflare.com")));
    }

    #[test]
    fn test_suffix_must_be_a_label_boundary() {
        // "eviltrycloudflare.com" must not satisfy the "trycloudflare.com"
        // suffix rule
        assert!(!policy().is_allowed(Some("https://eviltrycloudflare.com.attacker.net")));
        assert!(!policy().is_allowed(Some("https://eviltrycloudflare.com")));
    }

    #[test]
    fn test_suffix_match_ignores_port_and_path() {
        assert!(policy().is_allowed(Some("https://dev.trycloudflare.com:8443")));
    }

    #[test]
    fn test_non_url_origin_rejected() {
        assert!(!policy().is_allowed(Some("file:///etc/passwd")));
        assert!(!policy().is_allowed(Some("app.example.com")));
    }

    #[test]
    fn test_empty_policy_rejects_browser_origins() {
        let empty = OriginPolicy::new(vec![], vec![]);
        assert!(!empty.is_allowed(Some("https://app.example.com")));
        assert!(empty.is_allowed(None));
    }

    #[test]
    fn test_leading_dot_suffix_normalized() {
        let p = OriginPolicy::new(vec![], vec![".ngrok.app".to_string()]);
        assert!(p.is_allowed(Some("https://demo.ngrok.app")));
    }
}
