use async_trait::async_trait;
use reqwest::header::HeaderName;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use custody_ledger::{
    BatchRecord, Commit, CommitReceipt, CustodyStore, LedgerEntry, StoreError, StoreResult,
};
use custody_types::{BatchId, IdempotencyKey};

use crate::config::LedgerClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::wire::{CommitRequest, ConflictBody, Confirmation};

const IDEMPOTENCY_KEY: HeaderName = HeaderName::from_static("idempotency-key");

/// [`CustodyStore`] backed by the external notarization ledger over HTTP.
///
/// The client never retries. Every failure is classified so that a commit
/// whose outcome cannot be known is reported as [`StoreError::Ambiguous`].
pub struct LedgerClient {
    http: reqwest::Client,
    base: Url,
    config: LedgerClientConfig,
}

impl LedgerClient {
    pub fn new(config: LedgerClientConfig) -> ClientResult<Self> {
        let invalid = |reason: String| ClientError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason,
        };
        let base = Url::parse(&config.endpoint).map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
        }
        if base.cannot_be_a_base() {
            return Err(invalid("not a base URL".into()));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(concat!("custody/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self { http, base, config })
    }

    pub fn config(&self) -> &LedgerClientConfig {
        &self.config
    }

    fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Malformed("ledger endpoint cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.config.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// GET a JSON resource. `404` is `None`.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> StoreResult<Option<T>> {
        tracing::debug!(%url, "ledger read");
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| self.read_failure(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = error_text(response).await;
            return Err(read_status_error(status, message));
        }

        let body = response.bytes().await.map_err(|e| self.read_failure(e))?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn read_failure(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.config.request_timeout())
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl CustodyStore for LedgerClient {
    fn backend(&self) -> &'static str {
        "ledger"
    }

    async fn commit(&self, commit: &Commit) -> StoreResult<CommitReceipt> {
        let url = self.url(&["v1", "commits"])?;
        let body = CommitRequest {
            batch_id: &commit.batch_id,
            expected_seq: commit.expected_seq,
            initiator: &commit.initiator,
            operation: &commit.operation,
        };

        let mut request = self.request(Method::POST, url).json(&body);
        if let Some(key) = &commit.idempotency_key {
            request = request.header(IDEMPOTENCY_KEY, key.as_str());
        }

        tracing::debug!(
            batch_id = %commit.batch_id,
            expected_seq = commit.expected_seq,
            kind = %commit.operation.kind(),
            "submitting commit"
        );
        let response = request.send().await.map_err(commit_send_failure)?;
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await.map_err(|e| {
                StoreError::Ambiguous(format!("confirmation body lost: {e}"))
            })?;
            let confirmation: Confirmation = serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::Ambiguous(format!("undecodable confirmation: {e}"))
            })?;
            return Ok(confirmation.into_receipt(&commit.batch_id));
        }

        match status {
            StatusCode::CONFLICT => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| StoreError::Malformed(e.to_string()))?;
                let conflict: ConflictBody = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Malformed(format!("conflict body: {e}")))?;
                Err(StoreError::Conflict {
                    batch_id: commit.batch_id.clone(),
                    expected: commit.expected_seq,
                    actual: conflict.actual_seq,
                })
            }
            StatusCode::UNPROCESSABLE_ENTITY if commit.idempotency_key.is_some() => {
                Err(StoreError::IdempotencyMismatch {
                    batch_id: commit.batch_id.clone(),
                    key: commit
                        .idempotency_key
                        .as_ref()
                        .map(|k| k.to_string())
                        .unwrap_or_default(),
                })
            }
            StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE => Err(StoreError::Unavailable(format!(
                "ledger declined commit with {status}"
            ))),
            s if s.is_server_error() => {
                let message = error_text(response).await;
                Err(StoreError::Ambiguous(format!("ledger answered {s}: {message}")))
            }
            s => Err(StoreError::Refused {
                status: s.as_u16(),
                message: error_text(response).await,
            }),
        }
    }

    async fn query(&self, batch_id: &BatchId) -> StoreResult<Option<BatchRecord>> {
        let url = self.url(&["v1", "batches", batch_id.as_str()])?;
        self.get_json(url).await
    }

    async fn history(&self, batch_id: &BatchId) -> StoreResult<Vec<LedgerEntry>> {
        let url = self.url(&["v1", "batches", batch_id.as_str(), "entries"])?;
        Ok(self.get_json(url).await?.unwrap_or_default())
    }

    async fn find_receipt(
        &self,
        batch_id: &BatchId,
        key: &IdempotencyKey,
    ) -> StoreResult<Option<CommitReceipt>> {
        let url = self.url(&["v1", "batches", batch_id.as_str(), "receipts", key.as_str()])?;
        let confirmation: Option<Confirmation> = self.get_json(url).await?;
        Ok(confirmation.map(|c| c.into_receipt(batch_id)))
    }
}

impl std::fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("config", &self.config)
            .finish()
    }
}

/// A commit that failed to connect was never dispatched. Anything later
/// may have reached the ledger.
fn commit_send_failure(err: reqwest::Error) -> StoreError {
    if err.is_connect() {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Ambiguous(err.to_string())
    }
}

fn read_status_error(status: StatusCode, message: String) -> StoreError {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Unavailable(format!("ledger answered {status}"))
        }
        s if s.is_server_error() => StoreError::Unavailable(format!("ledger answered {s}: {message}")),
        s => StoreError::Refused {
            status: s.as_u16(),
            message,
        },
    }
}

async fn error_text(response: Response) -> String {
    response.text().await.unwrap_or_default()
}
