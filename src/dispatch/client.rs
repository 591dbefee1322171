//! HTTP dispatch client for remote capabilities.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::directory::CapabilityDirectory;
use super::extraction::ExtractionStrategy;
use super::{DispatchKind, DispatchOutcome, DispatchRequest, Dispatcher, RemoteStatus};
use crate::config::DispatchConfig;
use crate::error::{EngineError, Result};
use crate::stores::{JobRecord, JobStore, JobUpdate};

/// Reqwest-backed dispatcher.
///
/// Worker triggers follow store-before-dispatch ordering: the queued job
/// record is persisted before the HTTP call leaves the process, so a crash
/// between trigger and store write can never produce an untracked job.
pub struct HttpDispatchClient {
    client: Client,
    directory: CapabilityDirectory,
    extraction: ExtractionStrategy,
    job_store: Arc<dyn JobStore>,
}

impl std::fmt::Debug for HttpDispatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDispatchClient")
            .field("directory", &self.directory)
            .field("extraction", &self.extraction)
            .finish()
    }
}

impl HttpDispatchClient {
    pub fn new(config: &DispatchConfig, job_store: Arc<dyn JobStore>) -> Result<Self> {
        Self::with_extraction(config, job_store, ExtractionStrategy::default())
    }

    pub fn with_extraction(
        config: &DispatchConfig,
        job_store: Arc<dyn JobStore>,
        extraction: ExtractionStrategy,
    ) -> Result<Self> {
        let directory = CapabilityDirectory::new(&config.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(format!("stepflow-core/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                EngineError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        info!(
            base_url = %config.base_url,
            timeout_ms = config.timeout_ms,
            "Created HttpDispatchClient"
        );

        Ok(Self {
            client,
            directory,
            extraction,
            job_store,
        })
    }

    /// The directory is exposed so embedders can pin capabilities to
    /// explicit URLs before execution starts.
    pub fn directory(&self) -> &CapabilityDirectory {
        &self.directory
    }

    async fn post(
        &self,
        capability: &str,
        url: reqwest::Url,
        body: &JsonValue,
    ) -> Result<JsonValue> {
        debug!(capability = %capability, url = %url, "dispatching capability call");

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::Dispatch {
                capability: capability.to_string(),
                reason: format!("request failed: {e}"),
                http_status: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::Dispatch {
                capability: capability.to_string(),
                reason: format!("HTTP {status}: {detail}"),
                http_status: Some(status.as_u16()),
            });
        }

        response.json().await.map_err(|e| EngineError::Dispatch {
            capability: capability.to_string(),
            reason: format!("failed to parse response: {e}"),
            http_status: Some(status.as_u16()),
        })
    }

    async fn dispatch_agent(&self, request: &DispatchRequest) -> Result<DispatchOutcome> {
        let url = self.directory.resolve(&request.capability)?;
        let mut body = json!({ "input": request.input });
        if let Some(messages) = &request.messages {
            body["messages"] = serde_json::to_value(messages)?;
        }

        let response = self.post(&request.capability, url, &body).await?;

        if request.awaited {
            let payload = self.extraction.extract(&response).unwrap_or_else(|| {
                debug!(
                    capability = %request.capability,
                    "no extraction rule matched; surfacing raw response"
                );
                response.clone()
            });
            return Ok(DispatchOutcome::Completed(payload));
        }

        Ok(DispatchOutcome::Accepted {
            id: accepted_id(&response).unwrap_or_else(|| Uuid::new_v4().to_string()),
            status: accepted_status(&response),
        })
    }

    async fn dispatch_worker(&self, request: &DispatchRequest) -> Result<DispatchOutcome> {
        let job_id = request
            .job_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Store before dispatch: an untracked in-flight job is worse than a
        // tracked job that never ran.
        self.job_store
            .set_job(JobRecord::queued(
                job_id.clone(),
                request.capability.clone(),
                request.input.clone(),
            ))
            .await?;

        let url = self.directory.resolve(&request.capability)?;
        let body = json!({ "jobId": job_id, "input": request.input });

        match self.post(&request.capability, url, &body).await {
            Ok(_) => {
                info!(
                    job_id = %job_id,
                    worker = %request.capability,
                    "🚀 worker job dispatched"
                );
                Ok(DispatchOutcome::Accepted {
                    id: job_id,
                    status: "queued".to_string(),
                })
            }
            Err(e) => {
                // Best effort: mark the stored job failed so it is not
                // mistaken for one still in flight.
                if let Err(store_err) = self
                    .job_store
                    .update_job(&job_id, JobUpdate::failed(e.to_string()))
                    .await
                {
                    warn!(job_id = %job_id, error = %store_err, "failed to mark job failed");
                }
                Err(e)
            }
        }
    }

    async fn dispatch_workflow(&self, request: &DispatchRequest) -> Result<DispatchOutcome> {
        let url = self.directory.resolve(&request.capability)?;
        let body = json!({ "input": request.input });
        let response = self.post(&request.capability, url, &body).await?;

        Ok(DispatchOutcome::Accepted {
            id: accepted_id(&response).unwrap_or_else(|| Uuid::new_v4().to_string()),
            status: accepted_status(&response),
        })
    }
}

fn accepted_id(response: &JsonValue) -> Option<String> {
    ["runId", "jobId", "id"]
        .iter()
        .find_map(|key| response.get(key).and_then(JsonValue::as_str))
        .map(str::to_string)
}

fn accepted_status(response: &JsonValue) -> String {
    response
        .get("status")
        .and_then(JsonValue::as_str)
        .unwrap_or("running")
        .to_string()
}

#[async_trait]
impl Dispatcher for HttpDispatchClient {
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome> {
        match request.kind {
            DispatchKind::Agent => self.dispatch_agent(&request).await,
            DispatchKind::Worker => self.dispatch_worker(&request).await,
            DispatchKind::Workflow => self.dispatch_workflow(&request).await,
        }
    }

    async fn probe(&self, kind: DispatchKind, id: &str) -> Result<RemoteStatus> {
        let url = self.directory.status_url(kind, id)?;
        debug!(kind = %kind, id = %id, url = %url, "probing remote status");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::Dispatch {
                capability: format!("{kind}:{id}"),
                reason: format!("status request failed: {e}"),
                http_status: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Dispatch {
                capability: format!("{kind}:{id}"),
                reason: format!("status endpoint returned HTTP {status}"),
                http_status: Some(status.as_u16()),
            });
        }

        response.json().await.map_err(|e| EngineError::Dispatch {
            capability: format!("{kind}:{id}"),
            reason: format!("failed to parse status response: {e}"),
            http_status: Some(status.as_u16()),
        })
    }
}
