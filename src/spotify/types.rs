use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VendorError;
use crate::pagination::Page;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `None` when Spotify reports the visibility as unknown.
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub collaborative: bool,
    #[serde(default)]
    pub owner: UserRef,
    #[serde(default)]
    pub snapshot_id: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub tracks: PlaylistTracks,
}

/// Track summary of a playlist; `items` is only filled by `get_playlist`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistTracks {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub added_at: Option<String>,
    #[serde(default)]
    pub track: Option<Track>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Local files have no Spotify id.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub explicit: bool,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album: Option<AlbumRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRef {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedTrack {
    pub added_at: String,
    pub track: Track,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayHistory {
    pub played_at: String,
    pub track: Track,
    #[serde(default)]
    pub context: Option<PlayContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayContext {
    #[serde(rename = "type")]
    pub kind: String,
    pub uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_private_session: bool,
    #[serde(default)]
    pub is_restricted: bool,
    #[serde(default)]
    pub volume_percent: Option<u32>,
    #[serde(default)]
    pub supports_volume: bool,
}

/// Spotify's offset/cursor paging envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

impl<T> Paging<T> {
    pub fn into_page(self) -> Page<T> {
        Page::new(self.items, self.next)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceList {
    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrackSearch {
    pub tracks: Paging<Track>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistOptions {
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub collaborative: bool,
    #[serde(default)]
    pub description: String,
}

/// Which playlists `list_playlists` keeps. A playlist passes if any enabled
/// flag matches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityFilter {
    pub include_public: bool,
    pub include_private: bool,
    pub include_collaborative: bool,
}

impl Default for VisibilityFilter {
    fn default() -> Self {
        Self {
            include_public: true,
            include_private: true,
            include_collaborative: true,
        }
    }
}

impl VisibilityFilter {
    pub fn any(&self) -> bool {
        self.include_public || self.include_private || self.include_collaborative
    }

    pub fn admits(&self, playlist: &Playlist) -> bool {
        let public = playlist.public.unwrap_or(false);
        (public && self.include_public)
            || (!public && self.include_private)
            || (playlist.collaborative && self.include_collaborative)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    /// About the last four weeks.
    ShortTerm,
    #[default]
    MediumTerm,
    LongTerm,
}

impl TimeRange {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShortTerm => "short_term",
            Self::MediumTerm => "medium_term",
            Self::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = VendorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "short_term" => Ok(Self::ShortTerm),
            "medium_term" => Ok(Self::MediumTerm),
            "long_term" => Ok(Self::LongTerm),
            other => Err(VendorError::validation(format!(
                "time range must be short_term, medium_term or long_term, got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn playlist(public: Option<bool>, collaborative: bool) -> Playlist {
        Playlist {
            id: "p".into(),
            name: "p".into(),
            public,
            collaborative,
            ..Playlist::default()
        }
    }

    #[test]
    fn visibility_filter_matches_any_enabled_flag() {
        let only_public = VisibilityFilter {
            include_public: true,
            include_private: false,
            include_collaborative: false,
        };
        assert!(only_public.admits(&playlist(Some(true), false)));
        assert!(!only_public.admits(&playlist(Some(false), false)));
        assert!(!only_public.admits(&playlist(None, false)));

        let only_collab = VisibilityFilter {
            include_public: false,
            include_private: false,
            include_collaborative: true,
        };
        assert!(only_collab.admits(&playlist(Some(false), true)));
        assert!(!only_collab.admits(&playlist(Some(true), false)));

        let none = VisibilityFilter {
            include_public: false,
            include_private: false,
            include_collaborative: false,
        };
        assert!(!none.any());
    }

    #[test]
    fn time_range_parses_known_values_only() {
        assert_eq!("short_term".parse::<TimeRange>().ok(), Some(TimeRange::ShortTerm));
        assert_eq!(TimeRange::LongTerm.to_string(), "long_term");
        assert!(matches!(
            "forever".parse::<TimeRange>(),
            Err(VendorError::Validation(_))
        ));
        assert!(serde_json::from_value::<TimeRange>(json!("yearly")).is_err());
    }

    #[test]
    fn playlist_decodes_listing_shape() {
        let playlist: Playlist = serde_json::from_value(json!({
            "id": "37i9",
            "name": "Focus",
            "public": null,
            "collaborative": false,
            "owner": {"id": "me", "display_name": "Me"},
            "snapshot_id": "snap",
            "uri": "spotify:playlist:37i9",
            "tracks": {"href": "https://api.spotify.com/v1/playlists/37i9/tracks", "total": 12},
            "images": []
        }))
        .expect("decodes");

        assert_eq!(playlist.public, None);
        assert_eq!(playlist.tracks.total, 12);
        assert!(playlist.tracks.items.is_empty());
    }

    #[test]
    fn null_track_in_playlist_item_is_tolerated() {
        let item: PlaylistItem =
            serde_json::from_value(json!({"added_at": "2024-01-01T00:00:00Z", "track": null}))
                .expect("decodes");
        assert!(item.track.is_none());
    }
}
