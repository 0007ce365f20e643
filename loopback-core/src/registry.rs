//! Interception registry and dispatcher
//!
//! Rules are registered once at startup and never removed. Every outgoing
//! request is run through [`InterceptionRegistry::dispatch`], a plain
//! synchronous call: the network layer holds the request until it returns.

use crate::admin::Metrics;
use crate::domain::DomainScope;
use crate::error::HandlerError;
use crate::frames::{FrameId, FrameKey, FrameOriginCache, TabId};
use crate::pattern::{RequestFilter, ResourceType, UrlPattern};
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Details of an outgoing request, as reported by the network layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetails {
    pub request_id: String,
    pub tab_id: TabId,
    #[serde(default)]
    pub frame_id: FrameId,
    pub url: String,
    #[serde(rename = "type", default = "default_resource_type")]
    pub resource_type: ResourceType,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_resource_type() -> ResourceType {
    ResourceType::Other
}

fn default_method() -> String {
    "GET".to_string()
}

impl RequestDetails {
    pub fn new(
        request_id: impl Into<String>,
        tab_id: TabId,
        frame_id: FrameId,
        url: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            tab_id,
            frame_id,
            url: url.into(),
            resource_type,
            method: default_method(),
        }
    }

    pub fn frame_key(&self) -> FrameKey {
        FrameKey::new(self.tab_id, self.frame_id)
    }
}

/// Answer returned to the network layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// No interception, the request proceeds unmodified
    Proceed,
    /// Serve the resource from this URL instead
    Redirect { redirect_url: String },
    /// Drop the request
    Cancel,
}

impl Decision {
    pub fn redirect(url: impl Into<String>) -> Self {
        Decision::Redirect {
            redirect_url: url.into(),
        }
    }

    pub fn is_intercepted(&self) -> bool {
        !matches!(self, Decision::Proceed)
    }
}

/// Programmable handler consulted for every matching request
pub trait RequestHandler: Send + Sync {
    /// Decide the response. Returning [`Decision::Proceed`] declines the
    /// request so later rules may still apply.
    fn handle(
        &self,
        details: &RequestDetails,
        frames: &FrameOriginCache,
    ) -> Result<Decision, HandlerError>;
}

impl<F> RequestHandler for F
where
    F: Fn(&RequestDetails, &FrameOriginCache) -> Result<Decision, HandlerError> + Send + Sync,
{
    fn handle(
        &self,
        details: &RequestDetails,
        frames: &FrameOriginCache,
    ) -> Result<Decision, HandlerError> {
        self(details, frames)
    }
}

/// What a rule does once it applies
#[derive(Clone)]
pub enum RuleAction {
    FixedPayload(Payload),
    Handler(Arc<dyn RequestHandler>),
}

impl fmt::Debug for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::FixedPayload(payload) => f.debug_tuple("FixedPayload").field(payload).finish(),
            RuleAction::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// A registered interception rule. Immutable once registered.
#[derive(Debug, Clone)]
pub struct InterceptionRule {
    pub id: String,
    pub filter: RequestFilter,
    /// `None` applies on every page
    pub scope: Option<DomainScope>,
    pub action: RuleAction,
}

impl InterceptionRule {
    pub fn new(filter: RequestFilter, action: RuleAction, scope: Option<DomainScope>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filter,
            scope,
            action,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// The set of installed rules plus the dispatch entry point
#[derive(Debug, Default)]
pub struct InterceptionRegistry {
    rules: Vec<InterceptionRule>,
    metrics: Arc<Metrics>,
}

impl InterceptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[InterceptionRule] {
        &self.rules
    }

    /// Install a rule. Returns its id.
    pub fn register(&mut self, rule: InterceptionRule) -> String {
        info!(
            "Registered rule {} ({} patterns, scope: {})",
            rule.id,
            rule.filter.urls.len(),
            describe_scope(rule.scope.as_ref())
        );
        let id = rule.id.clone();
        self.rules.push(rule);
        id
    }

    /// Serve a fixed payload for matching requests.
    ///
    /// `domains` restricts the rule to pages on (or, with
    /// `is_match_list = false`, off) those domains; `None` applies everywhere.
    pub fn register_static_rule<I, S>(
        &mut self,
        urls: I,
        types: Vec<ResourceType>,
        payload: Payload,
        domains: Option<Vec<String>>,
        is_match_list: bool,
    ) -> String
    where
        I: IntoIterator<Item = S>,
        S: Into<UrlPattern>,
    {
        self.register(InterceptionRule::new(
            RequestFilter::new(urls, types),
            RuleAction::FixedPayload(payload),
            make_scope(domains, is_match_list),
        ))
    }

    /// Let a handler decide the response for matching requests
    pub fn register_dynamic_rule<I, S, H>(
        &mut self,
        urls: I,
        types: Vec<ResourceType>,
        handler: H,
        domains: Option<Vec<String>>,
        is_match_list: bool,
    ) -> String
    where
        I: IntoIterator<Item = S>,
        S: Into<UrlPattern>,
        H: RequestHandler + 'static,
    {
        self.register(InterceptionRule::new(
            RequestFilter::new(urls, types),
            RuleAction::Handler(Arc::new(handler)),
            make_scope(domains, is_match_list),
        ))
    }

    /// Decide what happens to an outgoing request.
    ///
    /// Rules are tried in registration order and the first one that
    /// intercepts wins. Domain-scoped rules are skipped when the owning page
    /// is unknown. Handler faults never escape: the request proceeds.
    pub fn dispatch(&self, frames: &FrameOriginCache, details: &RequestDetails) -> Decision {
        self.metrics.requests_dispatched.fetch_add(1, Ordering::Relaxed);

        // Resolved at most once, and only if a scoped rule needs it
        let mut owner: Option<&str> = None;

        for rule in &self.rules {
            if !rule.filter.matches(&details.url, details.resource_type) {
                continue;
            }

            if let Some(scope) = &rule.scope {
                let page_url =
                    *owner.get_or_insert_with(|| frames.resolve_ref(details.tab_id, details.frame_id));
                if !scope.matches(page_url) {
                    debug!(
                        "Rule {} out of scope for request [{}] (owner: {:?})",
                        rule.id, details.request_id, page_url
                    );
                    self.metrics.scope_skips.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            }

            match &rule.action {
                RuleAction::FixedPayload(payload) => {
                    info!(
                        "Request [{}] {} served by rule {}",
                        details.request_id, details.url, rule.id
                    );
                    self.metrics.static_interceptions.fetch_add(1, Ordering::Relaxed);
                    return Decision::redirect(payload.data_url());
                }
                RuleAction::Handler(handler) => match invoke_handler(handler.as_ref(), details, frames) {
                    Ok(Decision::Proceed) => {
                        debug!(
                            "Rule {} declined request [{}]",
                            rule.id, details.request_id
                        );
                        self.metrics.handler_declines.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(decision) => {
                        info!(
                            "Request [{}] {} handled by rule {}",
                            details.request_id, details.url, rule.id
                        );
                        self.metrics.dynamic_interceptions.fetch_add(1, Ordering::Relaxed);
                        return decision;
                    }
                    Err(e) => {
                        warn!(
                            "Rule {} failed on request [{}]: {}. Letting the request through.",
                            rule.id, details.request_id, e
                        );
                        self.metrics.handler_faults.fetch_add(1, Ordering::Relaxed);
                        return Decision::Proceed;
                    }
                },
            }
        }

        Decision::Proceed
    }
}

fn invoke_handler(
    handler: &dyn RequestHandler,
    details: &RequestDetails,
    frames: &FrameOriginCache,
) -> Result<Decision, HandlerError> {
    match catch_unwind(AssertUnwindSafe(|| handler.handle(details, frames))) {
        Ok(result) => result,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(HandlerError::Panicked(msg))
        }
    }
}

fn make_scope(domains: Option<Vec<String>>, is_match_list: bool) -> Option<DomainScope> {
    domains.map(|domains| DomainScope {
        domains,
        is_match_list,
    })
}

fn describe_scope(scope: Option<&DomainScope>) -> String {
    match scope {
        None => "all pages".to_string(),
        Some(s) if s.is_match_list => format!("only {}", s.domains.join(", ")),
        Some(s) => format!("except {}", s.domains.join(", ")),
    }
}
