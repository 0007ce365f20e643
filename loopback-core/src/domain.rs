use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Only `http://` and `https://` authorities are recognized. The captured
/// host keeps any port or userinfo verbatim.
static HOST_EXTRACTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://([^/]+)").expect("host extractor pattern is valid"));

/// Extract the host part of an `http`/`https` URL.
///
/// Returns `None` for any other scheme or a malformed URL.
pub fn extract_host(url: &str) -> Option<&str> {
    HOST_EXTRACTOR
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Check whether `host` equals `domain` or is a subdomain of it.
///
/// The suffix must sit on a label boundary: `ads.example.com` is under
/// `example.com`, `badexample.com` is not.
pub fn host_has_suffix(host: &str, domain: &str) -> bool {
    if !host.ends_with(domain) {
        return false;
    }
    if host.len() == domain.len() {
        return true;
    }
    host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

/// Check the domain of a URL against a domain list.
///
/// Logic:
/// 1. If the host cannot be extracted, return false (regardless of polarity).
/// 2. If any entry matches, return `is_match_list`.
/// 3. Otherwise return `!is_match_list`.
pub fn domain_matches<S: AsRef<str>>(url: &str, domains: &[S], is_match_list: bool) -> bool {
    let Some(host) = extract_host(url) else {
        return false;
    };

    for domain in domains {
        if host_has_suffix(host, domain.as_ref()) {
            return is_match_list;
        }
    }

    !is_match_list
}

/// Domain scope attached to an interception rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainScope {
    /// Domain suffixes, e.g. `example.com`
    pub domains: Vec<String>,
    /// `true`: apply only on these domains. `false`: apply everywhere except these.
    #[serde(default = "default_is_match_list")]
    pub is_match_list: bool,
}

fn default_is_match_list() -> bool {
    true
}

impl DomainScope {
    /// Scope that applies only on the listed domains
    pub fn only<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
            is_match_list: true,
        }
    }

    /// Scope that applies everywhere except the listed domains
    pub fn except<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
            is_match_list: false,
        }
    }

    /// Check whether a page URL falls inside this scope
    pub fn matches(&self, page_url: &str) -> bool {
        domain_matches(page_url, &self.domains, self.is_match_list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_host_extraction() {
        assert_eq!(extract_host("https://example.com/path"), Some("example.com"));
        assert_eq!(extract_host("http://a.b.example.com"), Some("a.b.example.com"));
        assert_eq!(extract_host("https://example.com:8443/x"), Some("example.com:8443"));
        assert_eq!(extract_host("ftp://example.com/"), None);
        assert_eq!(extract_host("example.com"), None);
        assert_eq!(extract_host("https:///nohost"), None);
        assert_eq!(extract_host(""), None);
    }

    #[test]
    fn test_suffix_matching() {
        // Test 1: exact and subdomain
        assert!(domain_matches("https://example.com/", &["example.com"], true));
        assert!(domain_matches("https://ads.example.com/", &["example.com"], true));

        // Test 2: no label boundary
        assert!(!domain_matches("https://badexample.com/", &["example.com"], true));

        // Test 3: exclusion list
        assert!(!domain_matches("https://ads.example.com/", &["example.com"], false));
        assert!(domain_matches("https://other.org/", &["example.com"], false));

        // Test 4: first hit decides
        let list = ["nothing.net", "example.com"];
        assert!(domain_matches("http://www.example.com/a", &list, true));
    }

    #[test]
    fn test_empty_lists() {
        let empty: [&str; 0] = [];
        assert!(!domain_matches("https://example.com/", &empty, true));
        assert!(domain_matches("https://example.com/", &empty, false));
        assert!(!domain_matches("not a url", &empty, false));
    }

    #[test]
    fn test_unknown_owner_never_matches() {
        assert!(!domain_matches("", &["example.com"], true));
        assert!(!domain_matches("", &["example.com"], false));
        assert!(!domain_matches("chrome://newtab/", &["newtab"], false));
    }

    #[test]
    fn test_scope_helpers() {
        let scope = DomainScope::only(["ads.example.com"]);
        assert!(scope.matches("https://ads.example.com/page"));
        assert!(!scope.matches("https://other.com/page"));

        let scope = DomainScope::except(["example.com"]);
        assert!(!scope.matches("https://www.example.com/"));
        assert!(scope.matches("https://other.com/"));
    }

    #[test]
    fn test_scope_deserialize_default_polarity() {
        let scope: DomainScope = serde_json::from_str(r#"{"domains":["a.com"]}"#).unwrap();
        assert!(scope.is_match_list);
    }

    fn label() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}"
    }

    fn host() -> impl Strategy<Value = String> {
        prop::collection::vec(label(), 1..4).prop_map(|labels| labels.join("."))
    }

    proptest! {
        #[test]
        fn suffix_match_iff_equal_or_dot_suffix(h in host(), d in host(), scheme in prop::sample::select(vec!["http", "https"])) {
            let url = format!("{}://{}", scheme, h);
            let expected = h == d || h.ends_with(&format!(".{}", d));
            prop_assert_eq!(domain_matches(&url, &[d.as_str()], true), expected);
        }

        #[test]
        fn subdomain_always_matches(sub in label(), d in host()) {
            let url = format!("https://{}.{}/path", sub, d);
            prop_assert!(domain_matches(&url, &[d.as_str()], true));
            prop_assert!(!domain_matches(&url, &[d.as_str()], false));
        }

        #[test]
        fn unparseable_is_false_for_both_polarities(h in host(), scheme in prop::sample::select(vec!["ftp", "ws", "chrome-extension", ""]), is_match in any::<bool>()) {
            let url = if scheme.is_empty() { h.clone() } else { format!("{}://{}/", scheme, h) };
            prop_assert!(!domain_matches(&url, &[h.as_str()], is_match));
        }

        #[test]
        fn empty_list_polarity(h in host()) {
            let url = format!("https://{}/", h);
            let empty: [&str; 0] = [];
            prop_assert!(!domain_matches(&url, &empty, true));
            prop_assert!(domain_matches(&url, &empty, false));
        }
    }
}
