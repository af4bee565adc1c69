//! slskd HTTP client

use std::fmt;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use soulbridge_shared_config::SlskdConfig;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{SlskdError, SlskdResult};
use crate::models::{
    DownloadRequest, SearchRequest, SearchResponse, SearchState, Transfer, UserTransfers,
};

/// Maximum error body size kept in error messages
const MAX_ERROR_BODY_SIZE: usize = 500;

/// Interval between search status checks
const SEARCH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Extra time allowed past slskd's own search timeout before giving up
const SEARCH_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Maximum search text length accepted by the client
const MAX_QUERY_LENGTH: usize = 512;

/// slskd API client
#[derive(Clone)]
pub struct SlskdClient {
    http_client: Client,
    config: SlskdConfig,
}

impl fmt::Debug for SlskdClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlskdClient")
            .field("url", &self.config.url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl SlskdClient {
    /// Create a new slskd client from configuration
    pub fn new(config: &SlskdConfig) -> SlskdResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(SlskdError::InvalidInput("API key cannot be empty".to_string()));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("Soulbridge/0.1")
            .build()?;

        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &SlskdConfig {
        &self.config
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("X-API-Key", &self.config.api_key)
    }

    /// Send a request, mapping transport failures and error statuses
    async fn send(&self, builder: RequestBuilder, what: &str) -> SlskdResult<Response> {
        let response = self.authorized(builder).send().await.map_err(|e| {
            if e.is_connect() {
                SlskdError::ConnectionRefused(self.config.url.clone())
            } else if e.is_timeout() {
                SlskdError::Timeout
            } else {
                SlskdError::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SlskdError::Unauthorized),
            StatusCode::NOT_FOUND => Err(SlskdError::NotFound(what.to_string())),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(SlskdError::Api {
                    status: status.as_u16(),
                    message: truncate(body),
                })
            }
        }
    }

    /// Search the Soulseek network and return every peer response
    ///
    /// Starts a search, waits until slskd marks it complete (or its timeout
    /// plus a grace period passes) and then fetches the responses.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> SlskdResult<Vec<SearchResponse>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SlskdError::InvalidInput("search text cannot be empty".to_string()));
        }
        if query.len() > MAX_QUERY_LENGTH {
            return Err(SlskdError::InvalidInput(format!(
                "search text too long (max {} characters)",
                MAX_QUERY_LENGTH
            )));
        }

        let search_timeout = Duration::from_secs(self.config.search_timeout_secs);
        let request = SearchRequest {
            id: Uuid::new_v4().to_string(),
            search_text: query.to_string(),
            search_timeout: search_timeout.as_millis() as u64,
            filter_responses: true,
        };

        let search: SearchState = self
            .send(
                self.http_client
                    .post(self.config.api_url("searches"))
                    .json(&request),
                "search",
            )
            .await?
            .json()
            .await?;

        debug!(search_id = %search.id, "Search started");

        let deadline = tokio::time::Instant::now() + search_timeout + SEARCH_GRACE_PERIOD;
        let mut state = search;
        while !state.is_complete && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(SEARCH_POLL_INTERVAL).await;
            state = self.search_state(&state.id).await?;
        }

        let responses: Vec<SearchResponse> = self
            .send(
                self.http_client
                    .get(self.config.api_url(&format!("searches/{}/responses", state.id))),
                "search responses",
            )
            .await?
            .json()
            .await?;

        debug!(
            search_id = %state.id,
            complete = state.is_complete,
            response_count = responses.len(),
            "Search finished"
        );

        Ok(responses)
    }

    /// Get the status of a search
    pub async fn search_state(&self, search_id: &str) -> SlskdResult<SearchState> {
        let state = self
            .send(
                self.http_client
                    .get(self.config.api_url(&format!("searches/{}", search_id))),
                "search",
            )
            .await?
            .json()
            .await?;
        Ok(state)
    }

    /// Enqueue a download from a peer and return the new transfer id
    #[instrument(skip(self))]
    pub async fn enqueue_download(
        &self,
        username: &str,
        filename: &str,
        size: u64,
    ) -> SlskdResult<String> {
        if username.trim().is_empty() || filename.trim().is_empty() {
            return Err(SlskdError::InvalidInput(
                "username and filename are required".to_string(),
            ));
        }

        let path = format!("transfers/downloads/{}", username);
        self.send(
            self.http_client
                .post(self.config.api_url(&path))
                .json(&[DownloadRequest { filename, size }]),
            "peer",
        )
        .await?;

        let transfers: UserTransfers = self
            .send(self.http_client.get(self.config.api_url(&path)), "transfers")
            .await?
            .json()
            .await?;

        let transfer = transfers
            .directories
            .into_iter()
            .flat_map(|dir| dir.files)
            .find(|t| t.filename == filename)
            .ok_or_else(|| SlskdError::NotFound(format!("transfer for {}", filename)))?;

        debug!(transfer_id = %transfer.id, "Download enqueued");
        Ok(transfer.id)
    }

    /// Get a single transfer
    pub async fn transfer(&self, username: &str, transfer_id: &str) -> SlskdResult<Transfer> {
        let transfer = self
            .send(
                self.http_client.get(self.config.api_url(&format!(
                    "transfers/downloads/{}/{}",
                    username, transfer_id
                ))),
                "transfer",
            )
            .await?
            .json()
            .await?;
        Ok(transfer)
    }

    /// Cancel a transfer, leaving any partial file in place
    #[instrument(skip(self))]
    pub async fn cancel_download(&self, username: &str, transfer_id: &str) -> SlskdResult<()> {
        let result = self
            .send(
                self.http_client.delete(self.config.api_url(&format!(
                    "transfers/downloads/{}/{}",
                    username, transfer_id
                ))),
                "transfer",
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            // Already gone counts as cancelled
            Err(SlskdError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Truncate an error body on a UTF-8 boundary
fn truncate(body: String) -> String {
    if body.len() <= MAX_ERROR_BODY_SIZE {
        return body;
    }
    let cut = body
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|i| *i <= MAX_ERROR_BODY_SIZE)
        .last()
        .unwrap_or(0);
    format!("{}... (truncated)", &body[..cut])
}
