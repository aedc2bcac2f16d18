use crate::config::types::IngestorConfig;
use crate::ingest::bucket::{origin_id, BucketResolver};
use crate::ingest::line::AccessLine;
use crate::ingest::writer::{BucketWriter, WriteError};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Handler dependencies, built once at startup.
pub struct IngestState {
    pub resolver: BucketResolver,
    pub writer: BucketWriter,
    pub max_body_bytes: usize,
}

impl IngestState {
    pub fn from_config(config: &IngestorConfig) -> Self {
        Self {
            resolver: BucketResolver::from_config(config),
            writer: BucketWriter::new(config.fsync),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// Buckets every timestamped line of `log` and appends it. Returns the
    /// number of lines written.
    pub async fn ingest(&self, host: &str, origin: &str, log: &str) -> Result<usize, WriteError> {
        let mut order: Vec<PathBuf> = Vec::new();
        let mut groups: HashMap<PathBuf, Vec<&str>> = HashMap::new();
        let mut dropped = 0usize;

        for raw in log.lines() {
            if raw.is_empty() {
                continue;
            }
            let line = match AccessLine::parse(raw) {
                Ok(line) => line,
                Err(e) => {
                    dropped += 1;
                    tracing::warn!(origin, error = %e, line = raw, "Dropping line");
                    continue;
                }
            };

            if line.json_fragment().is_some() {
                tracing::trace!(origin, "Line carries a JSON fragment");
            }

            let path = self.resolver.resolve(host, &line.timestamp, origin);
            groups
                .entry(path)
                .or_insert_with_key(|path| {
                    order.push(path.clone());
                    Vec::new()
                })
                .push(raw);
        }

        let mut accepted = 0;
        for path in &order {
            if let Some(lines) = groups.get(path) {
                self.writer.append(path, lines).await?;
                accepted += lines.len();
            }
        }

        tracing::info!(host, origin, accepted, dropped, buckets = order.len(), "Batch ingested");
        Ok(accepted)
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
}

/// POST /upload
pub async fn upload(
    State(state): State<Arc<IngestState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<String, ApiError> {
    if !is_json(&headers) {
        return Err(ApiError::BadRequest(
            "Invalid content-type, expected JSON".to_string(),
        ));
    }
    let request: UploadRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Invalid content-type, expected JSON".to_string()))?;

    let log = request.log.filter(|l| !l.is_empty());
    let host = request
        .host
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty());
    let (Some(log), Some(host)) = (log, host) else {
        return Err(ApiError::BadRequest("Missing data".to_string()));
    };

    if !is_safe_host(&host) {
        return Err(ApiError::BadRequest(format!("Invalid host '{host}'")));
    }

    let origin = origin_id(peer.ip());
    let accepted = state
        .ingest(&host, &origin, &log)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, host = %host, origin = %origin, "Append failed");
            ApiError::InternalError(e.to_string())
        })?;

    Ok(format!("OK - {accepted} lines"))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

/// The host names a directory under the base dir and must stay inside it.
fn is_safe_host(host: &str) -> bool {
    host != "." && host != ".." && !host.contains(['/', '\\', '\0'])
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
        }
    }
}
