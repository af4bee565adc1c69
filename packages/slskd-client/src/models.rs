//! slskd API request and response models

use serde::{Deserialize, Serialize};

/// Body of `POST /searches`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchRequest {
    pub id: String,
    pub search_text: String,
    /// Milliseconds slskd keeps the search open
    pub search_timeout: u64,
    pub filter_responses: bool,
}

/// Search status as returned by `GET /searches/{id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchState {
    pub id: String,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub response_count: u32,
    #[serde(default)]
    pub state: String,
}

/// One peer's answer to a search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Peer username
    pub username: String,
    /// Whether the peer has an upload slot free right now
    #[serde(default)]
    pub has_free_upload_slot: bool,
    /// Number of uploads queued at the peer
    #[serde(default)]
    pub queue_length: u32,
    /// Advertised upload speed in bytes per second
    #[serde(default)]
    pub upload_speed: u64,
    /// Matching files shared by the peer
    #[serde(default)]
    pub files: Vec<SearchFile>,
}

/// A file offered in a search response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFile {
    /// Full remote path, backslash separated
    pub filename: String,
    /// Size in bytes
    pub size: u64,
    /// Bitrate in kbps, when known
    #[serde(default)]
    pub bit_rate: Option<u32>,
    /// Duration in seconds, when known
    #[serde(default)]
    pub length: Option<u32>,
    /// File extension without the dot, may be empty
    #[serde(default)]
    pub extension: Option<String>,
}

impl SearchFile {
    /// File extension, taken from the reported extension or the filename
    pub fn format(&self) -> Option<String> {
        self.extension
            .as_deref()
            .filter(|ext| !ext.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.filename
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_string())
            })
            .map(|ext| ext.to_lowercase())
    }

    /// Last path component of the remote filename
    pub fn basename(&self) -> &str {
        self.filename
            .rsplit(|c: char| c == '\\' || c == '/')
            .next()
            .unwrap_or(&self.filename)
    }
}

/// Body item of `POST /transfers/downloads/{username}`
#[derive(Debug, Serialize)]
pub(crate) struct DownloadRequest<'a> {
    pub filename: &'a str,
    pub size: u64,
}

/// `GET /transfers/downloads/{username}` response
#[derive(Debug, Deserialize)]
pub(crate) struct UserTransfers {
    #[serde(default)]
    pub directories: Vec<TransferDirectory>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransferDirectory {
    #[serde(default)]
    pub files: Vec<Transfer>,
}

/// A single download transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id: String,
    pub username: String,
    pub filename: String,
    /// Raw slskd state, e.g. `"Completed, Succeeded"`
    pub state: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub bytes_transferred: u64,
    #[serde(default)]
    pub percent_complete: f64,
}

impl Transfer {
    /// Interpret the raw slskd state string
    pub fn state_kind(&self) -> TransferState {
        TransferState::parse(&self.state)
    }
}

/// Coarse transfer state derived from slskd's flag-style state string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

impl TransferState {
    /// Parse slskd's comma-separated state flags
    pub fn parse(raw: &str) -> Self {
        let flags: Vec<&str> = raw.split(',').map(str::trim).collect();
        let has = |flag: &str| flags.iter().any(|f| f.eq_ignore_ascii_case(flag));

        if has("Completed") {
            if has("Succeeded") {
                Self::Succeeded
            } else if has("Cancelled") {
                Self::Cancelled
            } else {
                Self::Failed
            }
        } else if has("Queued") || has("Requested") || has("None") {
            Self::Queued
        } else {
            Self::InProgress
        }
    }

    /// Whether the transfer will not change state again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_state_parsing() {
        assert_eq!(TransferState::parse("Completed, Succeeded"), TransferState::Succeeded);
        assert_eq!(TransferState::parse("Completed, Errored"), TransferState::Failed);
        assert_eq!(TransferState::parse("Completed, Rejected"), TransferState::Failed);
        assert_eq!(TransferState::parse("Completed, Cancelled"), TransferState::Cancelled);
        assert_eq!(TransferState::parse("Queued, Remotely"), TransferState::Queued);
        assert_eq!(TransferState::parse("InProgress"), TransferState::InProgress);
        assert_eq!(TransferState::parse("Initializing"), TransferState::InProgress);
    }

    #[test]
    fn test_search_file_format_and_basename() {
        let file = SearchFile {
            filename: "@@music\\Artist\\Album\\01 - Track.FLAC".to_string(),
            size: 1024,
            bit_rate: None,
            length: Some(200),
            extension: Some(String::new()),
        };
        assert_eq!(file.format().as_deref(), Some("flac"));
        assert_eq!(file.basename(), "01 - Track.FLAC");
    }

    #[test]
    fn test_search_response_deserializes_with_missing_fields() {
        let json = r#"{"username":"peer","files":[{"filename":"a\\b.mp3","size":10}]}"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.username, "peer");
        assert!(!response.has_free_upload_slot);
        assert_eq!(response.files[0].format().as_deref(), Some("mp3"));
    }
}
