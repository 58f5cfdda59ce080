use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::job::JobKind;
use crate::params::JobForm;
use crate::snapshot::ProgressSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid server url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{path} answered {status}")]
    Status { path: String, status: StatusCode },

    #[error("{0}")]
    Rejected(String),

    #[error("unexpected response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Answer of a start endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    /// Prediction jobs point at their results page.
    #[serde(default)]
    pub redirect_url: Option<String>,
}

/// A CSV file available for training.
///
/// Endpoint: `/api/archivos_datos`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub name: String,
    #[serde(default)]
    pub rows: u64,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified: Option<String>,
}

impl DataFile {
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / 1024.0 / 1024.0
    }

    /// More than a year of daily rows.
    pub fn is_recommended(&self) -> bool {
        self.rows > 365
    }
}

#[derive(Debug, Deserialize)]
struct FilesResponse {
    #[serde(default)]
    files: Vec<DataFile>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    modelos: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TrainedResponse {
    #[serde(default)]
    available: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// The two calls the poller makes. Implemented over HTTP by [`BackendClient`].
pub trait JobBackend {
    fn start_job(
        &self,
        kind: JobKind,
        form: &JobForm,
    ) -> impl Future<Output = Result<StartResponse, ApiError>>;

    fn fetch_progress(
        &self,
        kind: JobKind,
    ) -> impl Future<Output = Result<ProgressSnapshot, ApiError>>;
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base: Url,
}

impl BackendClient {
    pub fn new(
        base_url: &str,
        session_cookie: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let invalid = |reason: String| ApiError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let base = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("not a base url".to_string()));
        }

        let mut headers = HeaderMap::new();
        if let Some(cookie) = session_cookie.filter(|c| !c.trim().is_empty()) {
            let value = HeaderValue::from_str(cookie.trim())
                .map_err(|e| invalid(format!("session cookie: {e}")))?;
            headers.insert(COOKIE, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport {
                path: base_url.to_string(),
                source: e,
            })?;

        Ok(Self { client, base })
    }

    /// Absolute URL of a server page, for navigation.
    pub fn page_url(&self, path: &str) -> String {
        self.url(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.base.as_str().trim_end_matches('/'), path))
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base.join(path).map_err(|e| ApiError::InvalidUrl {
            url: path.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path)?;
        log::debug!("GET {url}");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                path: path.to_string(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                path: path.to_string(),
                status,
            });
        }
        resp.json::<T>().await.map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }

    pub async fn list_data_files(&self) -> Result<Vec<DataFile>, ApiError> {
        Ok(self
            .get_json::<FilesResponse>("/api/archivos_datos")
            .await?
            .files)
    }

    pub async fn available_models(&self) -> Result<Vec<String>, ApiError> {
        Ok(self
            .get_json::<ModelsResponse>("/api/modelos_disponibles")
            .await?
            .modelos)
    }

    pub async fn trained_models(&self) -> Result<Vec<String>, ApiError> {
        Ok(self
            .get_json::<TrainedResponse>("/api/check_trained_models")
            .await?
            .available)
    }
}

impl JobBackend for BackendClient {
    async fn start_job(&self, kind: JobKind, form: &JobForm) -> Result<StartResponse, ApiError> {
        let path = kind.start_path();
        let url = self.url(path)?;
        log::info!("POST {url} ({} fields)", form.0.len());

        let resp = self
            .client
            .post(url)
            .form(&form.0)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                path: path.to_string(),
                source,
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })?;

        if !status.is_success() {
            // Rejections carry `{ "error": "..." }`.
            let reason = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error);
            return Err(match reason {
                Some(reason) => ApiError::Rejected(reason),
                None => ApiError::Status {
                    path: path.to_string(),
                    status,
                },
            });
        }

        let parsed: StartResponse = serde_json::from_str(&body).map_err(|e| {
            ApiError::Rejected(format!("unexpected response from {path}: {e}"))
        })?;
        if !parsed.success {
            return Err(ApiError::Rejected(parsed.error.unwrap_or_else(|| {
                format!("the server refused to start the {kind}")
            })));
        }
        Ok(parsed)
    }

    async fn fetch_progress(&self, kind: JobKind) -> Result<ProgressSnapshot, ApiError> {
        self.get_json(kind.progress_path()).await
    }
}
