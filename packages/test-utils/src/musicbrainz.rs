//! Mock MusicBrainz web service for testing metadata lookups

use serde_json::json;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock MusicBrainz server
///
/// Serves `GET /ws/2/recording/{mbid}` the way the real web service does for
/// `fmt=json`.
pub struct MockMusicBrainzServer {
    server: MockServer,
}

impl MockMusicBrainzServer {
    /// Start a new mock MusicBrainz server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Number of requests the server has received so far
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Mount a successful recording lookup
    pub async fn mock_recording(&self, recording: &RecordingFixture) {
        Mock::given(method("GET"))
            .and(path(format!("/ws/2/recording/{}", recording.id)))
            .and(query_param("fmt", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(recording.to_json()))
            .mount(&self.server)
            .await;
    }

    /// Mount a 404 for a recording id
    pub async fn mock_recording_not_found(&self, mbid: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/ws/2/recording/{}", mbid)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": "Not Found",
                "help": "For usage, please see: https://musicbrainz.org/development/mmd"
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a 503 (MusicBrainz rate limiting) for every recording lookup
    pub async fn mock_rate_limited(&self) {
        Mock::given(method("GET"))
            .and(path_regex("/ws/2/recording/.*"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({
                "error": "Your requests are exceeding the allowable rate limit."
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a 500 for every recording lookup
    pub async fn mock_server_error(&self) {
        Mock::given(method("GET"))
            .and(path_regex("/ws/2/recording/.*"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&self.server)
            .await;
    }
}

/// Fixture for a MusicBrainz recording
#[derive(Debug, Clone)]
pub struct RecordingFixture {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub artist_id: String,
    pub length_ms: Option<u64>,
    pub release_title: Option<String>,
    pub release_date: Option<String>,
    pub isrcs: Vec<String>,
}

impl RecordingFixture {
    /// A recording with a random MBID
    pub fn new(artist: &str, title: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            artist_id: uuid::Uuid::new_v4().to_string(),
            length_ms: Some(215_000),
            release_title: None,
            release_date: None,
            isrcs: Vec::new(),
        }
    }

    /// Set the recording MBID
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Attach a release
    pub fn with_release(mut self, title: &str, date: &str) -> Self {
        self.release_title = Some(title.to_string());
        self.release_date = Some(date.to_string());
        self
    }

    /// Add an ISRC
    pub fn with_isrc(mut self, isrc: &str) -> Self {
        self.isrcs.push(isrc.to_string());
        self
    }

    /// Convert to MusicBrainz JSON
    pub fn to_json(&self) -> serde_json::Value {
        let releases: Vec<serde_json::Value> = self
            .release_title
            .iter()
            .map(|title| {
                json!({
                    "id": uuid::Uuid::new_v4().to_string(),
                    "title": title,
                    "date": self.release_date,
                    "status": "Official"
                })
            })
            .collect();

        json!({
            "id": self.id,
            "title": self.title,
            "length": self.length_ms,
            "video": false,
            "artist-credit": [{
                "name": self.artist,
                "joinphrase": "",
                "artist": {
                    "id": self.artist_id,
                    "name": self.artist,
                    "sort-name": self.artist
                }
            }],
            "releases": releases,
            "isrcs": self.isrcs
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_recording() {
        let server = MockMusicBrainzServer::start().await;
        let recording = RecordingFixture::new("Boards of Canada", "Roygbiv")
            .with_release("Music Has the Right to Children", "1998-04-20");
        server.mock_recording(&recording).await;

        let body: serde_json::Value = reqwest::Client::new()
            .get(format!("{}/ws/2/recording/{}", server.url(), recording.id))
            .query(&[("fmt", "json")])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["title"], "Roygbiv");
        assert_eq!(body["artist-credit"][0]["name"], "Boards of Canada");
        assert_eq!(body["releases"][0]["date"], "1998-04-20");
    }

    #[tokio::test]
    async fn test_mock_not_found() {
        let server = MockMusicBrainzServer::start().await;
        server.mock_recording_not_found("missing").await;

        let status = reqwest::get(format!("{}/ws/2/recording/missing", server.url()))
            .await
            .unwrap()
            .status();
        assert_eq!(status.as_u16(), 404);
    }
}
