//! MusicBrainz response models

use serde::{Deserialize, Serialize};

/// A MusicBrainz recording with its artists and releases
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recording {
    /// Recording MBID
    pub id: String,
    /// Recording title
    pub title: String,
    /// Length in milliseconds
    pub length_ms: Option<u64>,
    /// Credited artists in credit order
    pub artists: Vec<ArtistCredit>,
    /// Releases the recording appears on
    pub releases: Vec<ReleaseSummary>,
    /// ISRC codes
    pub isrcs: Vec<String>,
}

impl Recording {
    /// Joined artist credit, e.g. `"A feat. B"`
    pub fn artist_name(&self) -> String {
        self.artists
            .iter()
            .map(|credit| format!("{}{}", credit.name, credit.join_phrase))
            .collect::<String>()
    }

    /// Earliest dated release, if any
    pub fn first_release(&self) -> Option<&ReleaseSummary> {
        self.releases
            .iter()
            .filter(|r| r.date.is_some())
            .min_by(|a, b| a.date.cmp(&b.date))
            .or_else(|| self.releases.first())
    }
}

/// An artist credited on a recording
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtistCredit {
    /// Artist MBID
    pub id: String,
    /// Name as credited
    pub name: String,
    /// Text joining this credit to the next one
    pub join_phrase: String,
}

/// A release a recording appears on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseSummary {
    /// Release MBID
    pub id: String,
    /// Release title
    pub title: String,
    /// Release date as given by MusicBrainz (YYYY, YYYY-MM or YYYY-MM-DD)
    pub date: Option<String>,
}

// Internal response types for deserialization

#[derive(Debug, Deserialize)]
pub(crate) struct RawRecording {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<RawArtistCredit>,
    #[serde(default)]
    pub releases: Vec<RawRelease>,
    #[serde(default)]
    pub isrcs: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawArtistCredit {
    pub name: String,
    #[serde(default)]
    pub joinphrase: String,
    pub artist: RawArtist,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawArtist {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawRelease {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub date: Option<String>,
}

impl From<RawRecording> for Recording {
    fn from(raw: RawRecording) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            length_ms: raw.length,
            artists: raw
                .artist_credit
                .into_iter()
                .map(|credit| ArtistCredit {
                    id: credit.artist.id,
                    name: credit.name,
                    join_phrase: credit.joinphrase,
                })
                .collect(),
            releases: raw
                .releases
                .into_iter()
                .map(|release| ReleaseSummary {
                    id: release.id,
                    title: release.title,
                    // MusicBrainz sends "" for unknown dates
                    date: release.date.filter(|d| !d.is_empty()),
                })
                .collect(),
            isrcs: raw.isrcs,
        }
    }
}
