//! Loopback Core Library
//!
//! This library provides the request interception core: a frame origin
//! cache tracking which page owns every frame, a registry of interception
//! rules, and the dispatcher that decides the fate of each outgoing request.

/// Domain suffix matching
pub mod domain;
pub mod frames;
pub mod pattern;
pub mod payload;
pub mod registry;

/// Sequential event loop owning all interception state
pub mod actor;
pub mod commands;

pub mod admin;

/// Configuration types and utilities
pub mod config;

/// Error types for interceptor operations
pub mod error;

pub use actor::{BrowserEvent, InterceptorActor, InterceptorHandle, WeakInterceptorHandle};
pub use admin::{start_admin_server, Metrics, MetricsSnapshot};
pub use commands::{parse_command, HostAction, HostCommand, MessageSender, XhrDetails};
pub use config::{AdminConfig, InterceptorConfig, RelayConfig};
pub use domain::{domain_matches, DomainScope};
pub use error::{HandlerError, InterceptorError};
pub use frames::{CacheSnapshot, FrameEntry, FrameId, FrameKey, FrameOriginCache, TabId, TAB_ID_NONE, TOP_FRAME};
pub use pattern::{RequestFilter, ResourceType, UrlPattern};
pub use payload::Payload;
/// Re-export commonly used types
pub use registry::{Decision, InterceptionRegistry, InterceptionRule, RequestDetails, RequestHandler, RuleAction};

/// Result type alias for interceptor operations
pub type Result<T> = std::result::Result<T, InterceptorError>;
