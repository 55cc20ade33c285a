//! REST client for the director's dynamic-service endpoints.
//!
//! Wraps `GET /dynamic_services` and `DELETE /dynamic_services/{uuid}` using
//! [`reqwest`] and exposes them through the [`Orchestrator`] trait.

use std::time::Duration;

use async_trait::async_trait;
use keeper_core::orchestrator::{Orchestrator, OrchestratorError, RunningService, ServiceState};
use keeper_core::types::{NodeId, ProjectId, UserId};
use serde::Deserialize;

/// Saving a large service state can take a long time.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(3600);

/// Timeout of every other request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Errors from the director REST layer.
#[derive(Debug, thiserror::Error)]
pub enum DirectorApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The director returned a non-2xx status code.
    #[error("Director API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl DirectorApiError {
    /// Map onto the orchestrator taxonomy for the service `service_uuid`.
    ///
    /// 404 means the service is already gone; 403 and 409 are refusals
    /// (e.g. a service waiting for manual intervention); everything else,
    /// including transport failures, is an outage.
    pub fn into_orchestrator_error(self, service_uuid: Option<NodeId>) -> OrchestratorError {
        match self {
            DirectorApiError::ApiError { status: 404, body } => match service_uuid {
                Some(id) => OrchestratorError::NotFound(id),
                None => OrchestratorError::Unavailable(body),
            },
            DirectorApiError::ApiError {
                status: 403 | 409,
                body,
            } => OrchestratorError::Forbidden(body),
            other => OrchestratorError::Unavailable(other.to_string()),
        }
    }
}

/// A service entry as returned by `GET /dynamic_services`.
///
/// The director reports `user_id` as a string for legacy services and as a
/// number for newer ones. A missing state reads as unknown.
#[derive(Debug, Deserialize)]
struct ServiceDto {
    service_uuid: NodeId,
    #[serde(default)]
    service_host: String,
    #[serde(default = "unknown_state")]
    service_state: ServiceState,
    #[serde(default)]
    user_id: Option<UserIdDto>,
    project_id: ProjectId,
}

fn unknown_state() -> ServiceState {
    ServiceState::Unknown
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserIdDto {
    Number(UserId),
    Text(String),
}

impl From<ServiceDto> for RunningService {
    fn from(dto: ServiceDto) -> Self {
        let user_id = match dto.user_id {
            Some(UserIdDto::Number(id)) => Some(id),
            Some(UserIdDto::Text(s)) => s.trim().parse().ok(),
            None => None,
        };
        RunningService {
            service_uuid: dto.service_uuid,
            service_host: dto.service_host,
            service_state: dto.service_state,
            user_id,
            project_id: dto.project_id,
        }
    }
}

/// Decode a service listing entry by entry, skipping malformed entries so
/// one bad service does not hide the others.
fn decode_services(entries: Vec<serde_json::Value>) -> Vec<RunningService> {
    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<ServiceDto>(entry) {
            Ok(dto) => Some(RunningService::from(dto)),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed service entry");
                None
            }
        })
        .collect()
}

/// HTTP client for the director.
pub struct DirectorClient {
    client: reqwest::Client,
    api_url: String,
    stop_timeout: Duration,
}

impl DirectorClient {
    /// Create a client for the director at `api_url`
    /// (e.g. `http://director-v2:8000/v2`).
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// List dynamic services, optionally restricted to one project.
    pub async fn get_services(
        &self,
        project_id: Option<ProjectId>,
    ) -> Result<Vec<RunningService>, DirectorApiError> {
        let mut request = self
            .client
            .get(format!("{}/dynamic_services", self.api_url))
            .timeout(REQUEST_TIMEOUT);
        if let Some(project_id) = project_id {
            request = request.query(&[("project_id", project_id.to_string())]);
        }
        let response = request.send().await?;

        let entries: Vec<serde_json::Value> = Self::parse_response(response).await?;
        Ok(decode_services(entries))
    }

    /// Stop one service. Sends `DELETE /dynamic_services/{uuid}?save_state=`.
    pub async fn delete_service(
        &self,
        service_uuid: NodeId,
        save_state: bool,
    ) -> Result<(), DirectorApiError> {
        let response = self
            .client
            .delete(format!("{}/dynamic_services/{}", self.api_url, service_uuid))
            .query(&[("save_state", if save_state { "true" } else { "false" })])
            .timeout(self.stop_timeout)
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, DirectorApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(DirectorApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DirectorApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), DirectorApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Orchestrator for DirectorClient {
    async fn list_running_services(&self) -> Result<Vec<RunningService>, OrchestratorError> {
        self.get_services(None)
            .await
            .map_err(|e| e.into_orchestrator_error(None))
    }

    async fn list_project_services(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<RunningService>, OrchestratorError> {
        self.get_services(Some(project_id))
            .await
            .map_err(|e| e.into_orchestrator_error(None))
    }

    async fn stop_service(
        &self,
        service_uuid: NodeId,
        save_state: bool,
    ) -> Result<(), OrchestratorError> {
        tracing::debug!(%service_uuid, save_state, "Stopping dynamic service");
        self.delete_service(service_uuid, save_state)
            .await
            .map_err(|e| e.into_orchestrator_error(Some(service_uuid)))
    }
}
