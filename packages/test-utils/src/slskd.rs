//! Mock slskd server for testing search and download flows
//!
//! Provides a [`MockSlskdServer`] that simulates the slskd `api/v0` endpoints
//! used by the download worker.

use serde_json::json;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Search id returned by every mocked search
pub const MOCK_SEARCH_ID: &str = "00000000-0000-0000-0000-00000000cafe";

/// Mock slskd server
///
/// Wraps a [`wiremock::MockServer`] with helpers for the search, enqueue,
/// transfer polling and cancellation endpoints.
///
/// # Example
///
/// ```rust,ignore
/// let server = MockSlskdServer::start().await;
/// server.mock_enqueue_download("peer", "Music\\song.flac", "t-1").await;
/// server
///     .mock_transfer_progress("peer", "t-1", &["InProgress", "Completed, Succeeded"])
///     .await;
/// ```
pub struct MockSlskdServer {
    server: MockServer,
    api_key: String,
}

impl MockSlskdServer {
    /// Start a new mock slskd server with default API key
    pub async fn start() -> Self {
        Self::start_with_api_key("test-api-key").await
    }

    /// Start a new mock slskd server with custom API key
    pub async fn start_with_api_key(api_key: &str) -> Self {
        Self {
            server: MockServer::start().await,
            api_key: api_key.to_string(),
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get the API key
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Number of requests the server has received so far
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Number of requests received whose path matches `prefix`
    pub async fn request_count_for(&self, http_method: &str, prefix: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| {
                r.method.to_string().eq_ignore_ascii_case(http_method)
                    && r.url.path().starts_with(prefix)
            })
            .count()
    }

    /// Mount a completed search returning the given peer responses
    pub async fn mock_search(&self, peers: Vec<SlskdPeerFixture>) {
        let responses: Vec<serde_json::Value> = peers.iter().map(|p| p.to_json()).collect();

        Mock::given(method("POST"))
            .and(path("/api/v0/searches"))
            .and(header("X-API-Key", self.api_key.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": MOCK_SEARCH_ID,
                "isComplete": true,
                "responseCount": responses.len(),
                "state": "Completed, TimedOut"
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("/api/v0/searches/{}/responses", MOCK_SEARCH_ID)))
            .and(header("X-API-Key", self.api_key.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(responses))
            .mount(&self.server)
            .await;
    }

    /// Mount a search endpoint that fails with the given status
    pub async fn mock_search_failure(&self, status_code: u16) {
        Mock::given(method("POST"))
            .and(path("/api/v0/searches"))
            .respond_with(ResponseTemplate::new(status_code).set_body_json(json!({
                "error": "search failed"
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount the enqueue endpoint and the transfer listing that reveals its id
    pub async fn mock_enqueue_download(&self, username: &str, filename: &str, transfer_id: &str) {
        let user_path = format!("/api/v0/transfers/downloads/{}", username);

        Mock::given(method("POST"))
            .and(path(user_path.as_str()))
            .and(header("X-API-Key", self.api_key.as_str()))
            .respond_with(ResponseTemplate::new(201))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path(user_path.as_str()))
            .and(header("X-API-Key", self.api_key.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "username": username,
                "directories": [{
                    "directory": "",
                    "files": [transfer_json(username, filename, transfer_id, "Queued, Locally", 0.0)]
                }]
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a sequence of transfer states; the last one repeats forever
    pub async fn mock_transfer_progress(&self, username: &str, transfer_id: &str, states: &[&str]) {
        let transfer_path = format!("/api/v0/transfers/downloads/{}/{}", username, transfer_id);
        let last = states.len().saturating_sub(1);

        for (i, state) in states.iter().enumerate() {
            let percent = if state.contains("Succeeded") {
                100.0
            } else {
                (i as f64 / states.len() as f64) * 100.0
            };
            let mock = Mock::given(method("GET"))
                .and(path(transfer_path.as_str()))
                .and(header("X-API-Key", self.api_key.as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(transfer_json(
                    username,
                    "file",
                    transfer_id,
                    state,
                    percent,
                )));
            let mock = if i < last { mock.up_to_n_times(1) } else { mock };
            mock.mount(&self.server).await;
        }
    }

    /// Mount the transfer cancellation endpoint
    pub async fn mock_cancel(&self, username: &str, transfer_id: &str) {
        Mock::given(method("DELETE"))
            .and(path(format!(
                "/api/v0/transfers/downloads/{}/{}",
                username, transfer_id
            )))
            .respond_with(ResponseTemplate::new(204))
            .mount(&self.server)
            .await;
    }

    /// Mount a 401 for every endpoint
    pub async fn mock_unauthorized(&self) {
        Mock::given(path_regex("/api/v0/.*"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&self.server)
            .await;
    }

    /// Mount a 503 for every endpoint
    pub async fn mock_unavailable(&self) {
        Mock::given(path_regex("/api/v0/.*"))
            .respond_with(ResponseTemplate::new(503).set_body_string("slskd is starting"))
            .mount(&self.server)
            .await;
    }
}

fn transfer_json(
    username: &str,
    filename: &str,
    transfer_id: &str,
    state: &str,
    percent: f64,
) -> serde_json::Value {
    json!({
        "id": transfer_id,
        "username": username,
        "filename": filename,
        "state": state,
        "size": 1000,
        "bytesTransferred": (percent * 10.0) as u64,
        "percentComplete": percent
    })
}

/// Fixture for one peer's search response
#[derive(Debug, Clone)]
pub struct SlskdPeerFixture {
    pub username: String,
    pub has_free_upload_slot: bool,
    pub queue_length: u32,
    pub upload_speed: u64,
    pub files: Vec<SlskdFileFixture>,
}

impl SlskdPeerFixture {
    /// A responsive peer with a free slot and no files yet
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            has_free_upload_slot: true,
            queue_length: 0,
            upload_speed: 1_000_000,
            files: Vec::new(),
        }
    }

    /// A peer with no free slot and a long queue
    pub fn busy(username: &str) -> Self {
        Self {
            has_free_upload_slot: false,
            queue_length: 50,
            upload_speed: 50_000,
            ..Self::new(username)
        }
    }

    /// Add a file to the response
    pub fn with_file(mut self, file: SlskdFileFixture) -> Self {
        self.files.push(file);
        self
    }

    /// Convert to slskd JSON
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "username": self.username,
            "hasFreeUploadSlot": self.has_free_upload_slot,
            "queueLength": self.queue_length,
            "uploadSpeed": self.upload_speed,
            "fileCount": self.files.len(),
            "files": self.files.iter().map(|f| f.to_json()).collect::<Vec<_>>()
        })
    }
}

/// Fixture for a shared file
#[derive(Debug, Clone)]
pub struct SlskdFileFixture {
    pub filename: String,
    pub size: u64,
    pub bit_rate: Option<u32>,
    pub length: Option<u32>,
    pub extension: String,
}

impl SlskdFileFixture {
    /// A lossless file of the given length in seconds
    pub fn flac(filename: &str, length_secs: u32) -> Self {
        Self {
            filename: filename.to_string(),
            size: u64::from(length_secs) * 110_000,
            bit_rate: None,
            length: Some(length_secs),
            extension: "flac".to_string(),
        }
    }

    /// An MP3 at the given bitrate and length in seconds
    pub fn mp3(filename: &str, bit_rate: u32, length_secs: u32) -> Self {
        Self {
            filename: filename.to_string(),
            size: u64::from(length_secs) * u64::from(bit_rate) * 125,
            bit_rate: Some(bit_rate),
            length: Some(length_secs),
            extension: "mp3".to_string(),
        }
    }

    /// Convert to slskd JSON
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "filename": self.filename,
            "size": self.size,
            "bitRate": self.bit_rate,
            "length": self.length,
            "extension": self.extension
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_search_responds() {
        let server = MockSlskdServer::start().await;
        server
            .mock_search(vec![SlskdPeerFixture::new("peer")
                .with_file(SlskdFileFixture::mp3("Music\\a.mp3", 320, 200))])
            .await;

        let client = reqwest::Client::new();
        let response: serde_json::Value = client
            .get(format!(
                "{}/api/v0/searches/{}/responses",
                server.url(),
                MOCK_SEARCH_ID
            ))
            .header("X-API-Key", server.api_key())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(response[0]["username"], "peer");
        assert_eq!(response[0]["files"][0]["bitRate"], 320);
    }

    #[tokio::test]
    async fn test_transfer_progress_sequence() {
        let server = MockSlskdServer::start().await;
        server
            .mock_transfer_progress("peer", "t-1", &["InProgress", "Completed, Succeeded"])
            .await;

        let client = reqwest::Client::new();
        let url = format!("{}/api/v0/transfers/downloads/peer/t-1", server.url());
        let mut states = Vec::new();
        for _ in 0..3 {
            let body: serde_json::Value = client
                .get(&url)
                .header("X-API-Key", server.api_key())
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            states.push(body["state"].as_str().unwrap().to_string());
        }

        assert_eq!(
            states,
            vec!["InProgress", "Completed, Succeeded", "Completed, Succeeded"]
        );
    }
}
