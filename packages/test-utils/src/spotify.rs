//! Mock Spotify Web API for testing track lookups and playlist sync

use serde_json::json;
use wiremock::matchers::{header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock Spotify Web API server
pub struct MockSpotifyServer {
    server: MockServer,
    access_token: String,
}

impl MockSpotifyServer {
    /// Start a new mock Spotify server with default access token
    pub async fn start() -> Self {
        Self::start_with_token("test-access-token").await
    }

    /// Start a new mock Spotify server with custom access token
    pub async fn start_with_token(access_token: &str) -> Self {
        Self {
            server: MockServer::start().await,
            access_token: access_token.to_string(),
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get the access token
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Mount a successful track lookup
    pub async fn mock_track(&self, track: &SpotifyTrackFixture) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/tracks/{}", track.id)))
            .and(header("Authorization", self.bearer().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(track.to_json()))
            .mount(&self.server)
            .await;
    }

    /// Mount a 404 for a track id
    pub async fn mock_track_not_found(&self, track_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/tracks/{}", track_id)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "status": 404, "message": "Non existing id" }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a playlist's tracks split into pages of `page_size`
    pub async fn mock_playlist(
        &self,
        playlist_id: &str,
        tracks: &[SpotifyTrackFixture],
        page_size: usize,
    ) {
        let page_size = page_size.max(1);
        let total = tracks.len();
        let pages: Vec<&[SpotifyTrackFixture]> = if tracks.is_empty() {
            vec![tracks]
        } else {
            tracks.chunks(page_size).collect()
        };

        for (index, page) in pages.iter().enumerate() {
            let offset = index * page_size;
            let next = if offset + page.len() < total {
                json!(format!(
                    "{}/v1/playlists/{}/tracks?offset={}&limit={}",
                    self.server.uri(),
                    playlist_id,
                    offset + page_size,
                    page_size
                ))
            } else {
                serde_json::Value::Null
            };

            Mock::given(method("GET"))
                .and(path(format!("/v1/playlists/{}/tracks", playlist_id)))
                .and(query_param("offset", offset.to_string().as_str()))
                .and(header("Authorization", self.bearer().as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "items": page
                        .iter()
                        .map(|t| json!({ "track": t.to_json() }))
                        .collect::<Vec<_>>(),
                    "offset": offset,
                    "limit": page_size,
                    "total": total,
                    "next": next
                })))
                .mount(&self.server)
                .await;
        }
    }

    /// Mount a 404 for a playlist
    pub async fn mock_playlist_not_found(&self, playlist_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/playlists/{}/tracks", playlist_id)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "status": 404, "message": "Not found." }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a 401 for every endpoint
    pub async fn mock_unauthorized(&self) {
        Mock::given(path_regex("/v1/.*"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "status": 401, "message": "The access token expired" }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a 429 with `Retry-After` for every endpoint
    pub async fn mock_rate_limited(&self, retry_after_secs: u64) {
        Mock::given(path_regex("/v1/.*"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", retry_after_secs.to_string().as_str())
                    .set_body_json(json!({
                        "error": { "status": 429, "message": "API rate limit exceeded" }
                    })),
            )
            .mount(&self.server)
            .await;
    }

    /// Mount a 502 for every endpoint
    pub async fn mock_server_error(&self) {
        Mock::given(path_regex("/v1/.*"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&self.server)
            .await;
    }
}

/// Fixture for a Spotify track object
#[derive(Debug, Clone)]
pub struct SpotifyTrackFixture {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub duration_ms: u64,
    pub release_date: String,
    pub isrc: Option<String>,
}

impl SpotifyTrackFixture {
    /// A track with a generated base62-like id
    pub fn new(id: &str, artist: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            artist: artist.to_string(),
            album: format!("{} (Album)", name),
            duration_ms: 215_000,
            release_date: "2001-05-14".to_string(),
            isrc: None,
        }
    }

    /// Set the album name
    pub fn with_album(mut self, album: &str) -> Self {
        self.album = album.to_string();
        self
    }

    /// Set the duration
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Set the ISRC
    pub fn with_isrc(mut self, isrc: &str) -> Self {
        self.isrc = Some(isrc.to_string());
        self
    }

    /// Convert to Spotify JSON
    pub fn to_json(&self) -> serde_json::Value {
        let external_ids = match &self.isrc {
            Some(isrc) => json!({ "isrc": isrc }),
            None => json!({}),
        };
        json!({
            "id": self.id,
            "name": self.name,
            "duration_ms": self.duration_ms,
            "artists": [{ "id": format!("artist-{}", self.id), "name": self.artist }],
            "album": {
                "id": format!("album-{}", self.id),
                "name": self.album,
                "release_date": self.release_date
            },
            "external_ids": external_ids
        })
    }
}
