//! Capability directory: resolves capability identifiers to dispatch URLs.
//!
//! Explicitly constructed and injectable, with its own cache state scoped to
//! the owning client. Not a process-wide static.

use dashmap::DashMap;
use reqwest::Url;

use super::DispatchKind;
use crate::error::{EngineError, Result};

/// Maps capability identifiers to URLs. Absolute identifiers pass through;
/// relative ones are joined onto the base URL. Explicit registrations win
/// over both.
#[derive(Debug)]
pub struct CapabilityDirectory {
    base_url: Url,
    /// Explicit registrations plus resolution cache.
    entries: DashMap<String, Url>,
}

impl CapabilityDirectory {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            EngineError::Configuration(format!("Invalid base URL '{base_url}': {e}"))
        })?;
        Ok(Self {
            base_url,
            entries: DashMap::new(),
        })
    }

    /// Pin a capability to an explicit URL.
    pub fn register(&self, capability: &str, url: &str) -> Result<()> {
        let url = Url::parse(url).map_err(|e| {
            EngineError::Configuration(format!("Invalid URL '{url}' for '{capability}': {e}"))
        })?;
        self.entries.insert(capability.to_string(), url);
        Ok(())
    }

    /// Resolve a capability identifier to its dispatch URL.
    pub fn resolve(&self, capability: &str) -> Result<Url> {
        if let Some(entry) = self.entries.get(capability) {
            return Ok(entry.value().clone());
        }

        let url = if capability.starts_with("http://") || capability.starts_with("https://") {
            Url::parse(capability).map_err(|e| {
                EngineError::Configuration(format!("Invalid capability URL '{capability}': {e}"))
            })?
        } else {
            self.base_url
                .join(capability.trim_start_matches('/'))
                .map_err(|e| {
                    EngineError::Configuration(format!(
                        "Cannot resolve capability '{capability}': {e}"
                    ))
                })?
        };

        self.entries.insert(capability.to_string(), url.clone());
        Ok(url)
    }

    /// Status endpoint URL for a dispatched id, by kind:
    /// `/v1/{agents|jobs|runs}/{id}/status`.
    pub fn status_url(&self, kind: DispatchKind, id: &str) -> Result<Url> {
        self.base_url
            .join(&format!("v1/{}/{}/status", kind.status_segment(), id))
            .map_err(|e| {
                EngineError::Configuration(format!("Cannot build status URL for '{id}': {e}"))
            })
    }
}
