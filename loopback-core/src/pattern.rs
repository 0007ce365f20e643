//! URL match patterns and request resource types
//!
//! Patterns follow the browser's request filter syntax:
//! `<all_urls>`, or `scheme://host/path` where the scheme may be `*`,
//! the host may be `*` or start with `*.`, and the path is a `*` glob.
//! Anything that does not parse that way is matched as a glob over the
//! whole URL, so registration never fails on pattern syntax.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use wildmatch::WildMatch;

const ALL_URLS: &str = "<all_urls>";
const ALL_URLS_SCHEMES: &[&str] = &["http", "https", "ws", "wss", "ftp", "file"];
const WILDCARD_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

/// Compiled URL pattern
#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    AllUrls,
    Structured {
        scheme: SchemeMatch,
        host: HostMatch,
        path: WildMatch,
    },
    Glob(WildMatch),
}

#[derive(Debug, Clone)]
enum SchemeMatch {
    Wildcard,
    Exact(String),
}

#[derive(Debug, Clone)]
enum HostMatch {
    Any,
    /// `*.example.com`: the domain itself or any subdomain
    Subdomains(String),
    Exact(String),
}

impl UrlPattern {
    /// Compile a pattern. Never fails; see the module docs.
    pub fn new(pattern: &str) -> Self {
        let kind = if pattern == ALL_URLS {
            PatternKind::AllUrls
        } else {
            parse_structured(pattern).unwrap_or_else(|| PatternKind::Glob(WildMatch::new(pattern)))
        };
        Self {
            source: pattern.to_string(),
            kind,
        }
    }

    /// The pattern as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check whether a request URL matches this pattern
    pub fn matches(&self, url: &str) -> bool {
        match &self.kind {
            PatternKind::AllUrls => split_url(url)
                .map(|(scheme, _, _)| ALL_URLS_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()))
                .unwrap_or(false),
            PatternKind::Glob(glob) => glob.matches(url),
            PatternKind::Structured { scheme, host, path } => {
                let Some((url_scheme, url_host, url_path)) = split_url(url) else {
                    return false;
                };
                let url_scheme = url_scheme.to_ascii_lowercase();
                let scheme_ok = match scheme {
                    SchemeMatch::Wildcard => WILDCARD_SCHEMES.contains(&url_scheme.as_str()),
                    SchemeMatch::Exact(s) => *s == url_scheme,
                };
                if !scheme_ok {
                    return false;
                }
                let url_host = strip_port(strip_userinfo(url_host)).to_ascii_lowercase();
                let host_ok = match host {
                    HostMatch::Any => true,
                    HostMatch::Exact(h) => *h == url_host,
                    HostMatch::Subdomains(d) => crate::domain::host_has_suffix(&url_host, d),
                };
                host_ok && path.matches(&normalize_path(url_path))
            }
        }
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl From<&str> for UrlPattern {
    fn from(pattern: &str) -> Self {
        UrlPattern::new(pattern)
    }
}

impl From<String> for UrlPattern {
    fn from(pattern: String) -> Self {
        UrlPattern::new(&pattern)
    }
}

fn parse_structured(pattern: &str) -> Option<PatternKind> {
    let (scheme, rest) = pattern.split_once("://")?;
    let scheme = match scheme {
        "*" => SchemeMatch::Wildcard,
        s if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) => {
            SchemeMatch::Exact(s.to_ascii_lowercase())
        }
        _ => return None,
    };
    let slash = rest.find('/')?;
    let (host, path) = rest.split_at(slash);
    let host = match host {
        "*" => HostMatch::Any,
        h if h.starts_with("*.") && !h[2..].contains('*') && !h[2..].is_empty() => {
            HostMatch::Subdomains(h[2..].to_ascii_lowercase())
        }
        h if !h.contains('*') && !(h.is_empty() && scheme_requires_host(&scheme)) => {
            HostMatch::Exact(h.to_ascii_lowercase())
        }
        _ => return None,
    };
    Some(PatternKind::Structured {
        scheme,
        host,
        path: WildMatch::new(path),
    })
}

fn scheme_requires_host(scheme: &SchemeMatch) -> bool {
    !matches!(scheme, SchemeMatch::Exact(s) if s == "file")
}

/// Split a URL into scheme, authority and path-with-query (fragment dropped)
fn split_url(url: &str) -> Option<(&str, &str, &str)> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme.is_empty() {
        return None;
    }
    let rest = rest.split('#').next().unwrap_or(rest);
    let end = rest.find(|c: char| c == '/' || c == '?').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(end);
    Some((scheme, authority, path))
}

/// Browsers always give a URL a path: `https://a.com?x` is `https://a.com/?x`
fn normalize_path(path: &str) -> Cow<'_, str> {
    if path.is_empty() {
        Cow::Borrowed("/")
    } else if path.starts_with('?') {
        Cow::Owned(format!("/{}", path))
    } else {
        Cow::Borrowed(path)
    }
}

fn strip_userinfo(authority: &str) -> &str {
    authority.rsplit_once('@').map(|(_, host)| host).unwrap_or(authority)
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal
        return host.split_once(']').map(|(h, _)| &host[..h.len() + 1]).unwrap_or(host);
    }
    host.rsplit_once(':')
        .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
        .map(|(h, _)| h)
        .unwrap_or(host)
}

/// Request type tags reported by the browser network layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    #[serde(rename = "xmlhttprequest")]
    XmlHttpRequest,
    Ping,
    CspReport,
    Media,
    Websocket,
    #[serde(other)]
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::MainFrame => "main_frame",
            ResourceType::SubFrame => "sub_frame",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Script => "script",
            ResourceType::Image => "image",
            ResourceType::Font => "font",
            ResourceType::Object => "object",
            ResourceType::XmlHttpRequest => "xmlhttprequest",
            ResourceType::Ping => "ping",
            ResourceType::CspReport => "csp_report",
            ResourceType::Media => "media",
            ResourceType::Websocket => "websocket",
            ResourceType::Other => "other",
        }
    }

    /// Parse a type tag; unknown tags map to [`ResourceType::Other`]
    pub fn parse(tag: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(tag.to_string())).unwrap_or(ResourceType::Other)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request filter of a rule: URL patterns plus resource types
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub urls: Vec<UrlPattern>,
    /// Empty means every type
    pub types: Vec<ResourceType>,
}

impl RequestFilter {
    pub fn new<I, S>(urls: I, types: Vec<ResourceType>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<UrlPattern>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            types,
        }
    }

    pub fn matches(&self, url: &str, resource_type: ResourceType) -> bool {
        let type_ok = self.types.is_empty() || self.types.contains(&resource_type);
        type_ok && self.urls.iter().any(|p| p.matches(url))
    }
}
