//! JSON rule catalog
//!
//! ```json
//! [
//!   {
//!     "id": "moat-freewheel",
//!     "urls": ["https://*.moatads.com/*/MoatFreeWheelJSPEM.js*"],
//!     "types": ["script"],
//!     "payload": "data:text/javascript;base64,...",
//!     "domains": ["example.com"],
//!     "is_match_list": true
//!   },
//!   { "urls": ["*/ads/script.js"], "types": [], "payload": { "file": "noop.js" } }
//! ]
//! ```
//!
//! Payload files are resolved relative to the catalog file.

use loopback_core::payload::SCRIPT_MIME;
use loopback_core::{
    DomainScope, InterceptionRegistry, InterceptionRule, InterceptorError, Payload, RequestFilter,
    ResourceType, Result, RuleAction,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub urls: Vec<String>,
    #[serde(default)]
    pub types: Vec<ResourceType>,
    pub payload: PayloadSource,
    #[serde(default)]
    pub domains: Option<Vec<String>>,
    #[serde(default = "default_is_match_list")]
    pub is_match_list: bool,
}

fn default_is_match_list() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PayloadSource {
    DataUrl(String),
    File {
        #[serde(default = "default_mime")]
        mime_type: String,
        file: PathBuf,
    },
}

fn default_mime() -> String {
    SCRIPT_MIME.to_string()
}

impl PayloadSource {
    fn load(&self, base_dir: &Path) -> Result<Payload> {
        match self {
            PayloadSource::DataUrl(url) => Payload::from_data_url(url),
            PayloadSource::File { mime_type, file } => {
                let path = base_dir.join(file);
                let bytes = std::fs::read(&path).map_err(|e| {
                    InterceptorError::Catalog(format!("Failed to read payload {}: {}", path.display(), e))
                })?;
                Ok(Payload::new(mime_type.clone(), bytes))
            }
        }
    }
}

/// Parse catalog JSON into rules
pub fn parse_catalog(json: &str, base_dir: &Path) -> Result<Vec<InterceptionRule>> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(json)
        .map_err(|e| InterceptorError::Catalog(format!("Invalid catalog: {}", e)))?;

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let id = entry.id.unwrap_or_else(|| Uuid::new_v4().to_string());
            if entry.urls.is_empty() {
                return Err(InterceptorError::Catalog(format!(
                    "Rule {} (entry {}) has no URL patterns",
                    id, index
                )));
            }
            let payload = entry
                .payload
                .load(base_dir)
                .map_err(|e| InterceptorError::Catalog(format!("Rule {} (entry {}): {}", id, index, e)))?;
            let scope = entry.domains.map(|domains| DomainScope {
                domains,
                is_match_list: entry.is_match_list,
            });

            Ok(InterceptionRule::new(
                RequestFilter::new(entry.urls, entry.types),
                RuleAction::FixedPayload(payload),
                scope,
            )
            .with_id(id))
        })
        .collect()
}

/// Read a catalog file and install its rules, in file order
pub fn load_catalog(path: &Path, registry: &mut InterceptionRegistry) -> Result<usize> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        InterceptorError::Catalog(format!("Failed to read catalog {}: {}", path.display(), e))
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let rules = parse_catalog(&json, base_dir)?;
    let count = rules.len();
    for rule in rules {
        registry.register(rule);
    }
    info!("Loaded {} rules from {}", count, path.display());
    Ok(count)
}
