//! Spotify Web API response models

use serde::{Deserialize, Serialize};

/// A Spotify track reduced to what downloads and tagging need
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpotifyTrack {
    /// Spotify track id
    pub id: String,
    /// Track name
    pub name: String,
    /// Artist names in credit order
    pub artists: Vec<String>,
    /// Album name
    pub album: Option<String>,
    /// Album release date
    pub release_date: Option<String>,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// ISRC, when Spotify has one
    pub isrc: Option<String>,
}

impl SpotifyTrack {
    /// Primary artist, or all artists joined with ", "
    pub fn artist_name(&self) -> String {
        self.artists.join(", ")
    }
}

// Internal response types for deserialization

#[derive(Debug, Deserialize)]
pub(crate) struct RawTrack {
    /// Local files have no id
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<RawArtist>,
    pub album: Option<RawAlbum>,
    #[serde(default)]
    pub external_ids: RawExternalIds,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawArtist {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAlbum {
    pub name: String,
    #[serde(default)]
    pub release_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawExternalIds {
    #[serde(default)]
    pub isrc: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaylistTracksPage {
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
    #[serde(default)]
    pub total: u32,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlaylistItem {
    /// Null for removed or unavailable tracks
    pub track: Option<RawTrack>,
}

impl RawTrack {
    /// Convert to a [`SpotifyTrack`], dropping tracks without an id
    pub(crate) fn into_track(self) -> Option<SpotifyTrack> {
        let id = self.id?;
        Some(SpotifyTrack {
            id,
            name: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            release_date: self.album.as_ref().and_then(|a| a.release_date.clone()),
            album: self.album.map(|a| a.name),
            duration_ms: self.duration_ms,
            isrc: self.external_ids.isrc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playlist_page_skips_unavailable_items() {
        let json = r#"{
            "items": [
                {"track": {"id": "t1", "name": "One", "duration_ms": 1000,
                           "artists": [{"name": "A"}, {"name": "B"}],
                           "album": {"name": "Album", "release_date": "2001"},
                           "external_ids": {"isrc": "USX"}}},
                {"track": null},
                {"track": {"id": null, "name": "Local file", "artists": []}}
            ],
            "total": 3,
            "next": null
        }"#;
        let page: PlaylistTracksPage = serde_json::from_str(json).unwrap();
        let tracks: Vec<SpotifyTrack> = page
            .items
            .into_iter()
            .filter_map(|item| item.track.and_then(RawTrack::into_track))
            .collect();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].artist_name(), "A, B");
        assert_eq!(tracks[0].album.as_deref(), Some("Album"));
        assert_eq!(tracks[0].isrc.as_deref(), Some("USX"));
    }
}
