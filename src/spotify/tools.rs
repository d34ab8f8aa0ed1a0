use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{SchemaError, ToolError};
use crate::spotify::{PlaylistOptions, SpotifyClient, TimeRange, VisibilityFilter};
use crate::tools::{ToolOutcome, ToolSpec, parse_args};

const CLIENT: &str = "SpotifyClient";

/// Spotify tools; each expects a [`SpotifyClient`] in the dependency map.
pub fn all_tools() -> Result<Vec<ToolSpec>, SchemaError> {
    Ok(vec![
        list_playlists_tool()?,
        get_playlist_tool()?,
        create_playlist_tool()?,
        add_tracks_tool()?,
        replace_tracks_tool()?,
        remove_tracks_tool()?,
        liked_tracks_tool()?,
        save_tracks_tool()?,
        top_tracks_tool()?,
        recently_played_tool()?,
        devices_tool()?,
        play_tool()?,
        pause_tool()?,
        next_track_tool()?,
        previous_track_tool()?,
        seek_tool()?,
        set_volume_tool()?,
        search_track_tool()?,
    ])
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ListPlaylistsArgs {
    #[serde(default = "default_playlist_limit")]
    limit: usize,
    #[serde(default = "default_true")]
    include_public: bool,
    #[serde(default = "default_true")]
    include_private: bool,
    #[serde(default = "default_true")]
    include_collaborative: bool,
}

fn default_playlist_limit() -> usize {
    50
}

pub fn list_playlists_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new(
        "list_playlists",
        "List the user's playlists, filtered by visibility. At least one include flag must be true.",
    )
    .with_schema(schema(
        json!({
            "limit": {"type": "integer"},
            "include_public": {"type": "boolean"},
            "include_private": {"type": "boolean"},
            "include_collaborative": {"type": "boolean"}
        }),
        &[],
    ))?
    .with_handler(|args, deps| {
        let args = parse_args::<ListPlaylistsArgs>("list_playlists", args);
        let client = deps.require::<SpotifyClient>(CLIENT);

        async move {
            let args = args?;
            let filter = VisibilityFilter {
                include_public: args.include_public,
                include_private: args.include_private,
                include_collaborative: args.include_collaborative,
            };
            let playlists = client?.list_playlists(args.limit, filter).await?;
            ToolOutcome::json(&playlists)
        }
    }))
}

#[derive(Debug, Deserialize)]
struct PlaylistIdArgs {
    playlist_id: String,
}

pub fn get_playlist_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("get_playlist", "Fetch a playlist with its owner and tracks.")
        .with_schema(schema(json!({"playlist_id": {"type": "string"}}), &["playlist_id"]))?
        .with_handler(|args, deps| {
            let args = parse_args::<PlaylistIdArgs>("get_playlist", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                let playlist = client?.get_playlist(&args?.playlist_id).await?;
                ToolOutcome::json(&playlist)
            }
        }))
}

#[derive(Debug, Deserialize)]
struct CreatePlaylistArgs {
    name: String,
    #[serde(flatten)]
    options: PlaylistOptions,
}

pub fn create_playlist_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("create_playlist", "Create a playlist for the current user.")
        .with_schema(schema(
            json!({
                "name": {"type": "string"},
                "public": {"type": "boolean"},
                "collaborative": {"type": "boolean"},
                "description": {"type": "string"}
            }),
            &["name"],
        ))?
        .with_handler(|args, deps| {
            let args = parse_args::<CreatePlaylistArgs>("create_playlist", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                let args = args?;
                let playlist = client?.create_playlist(&args.name, &args.options).await?;
                ToolOutcome::json(&playlist)
            }
        }))
}

#[derive(Debug, Deserialize)]
struct PlaylistTracksArgs {
    playlist_id: String,
    track_uris: Vec<String>,
}

fn playlist_tracks_schema() -> Value {
    schema(
        json!({
            "playlist_id": {"type": "string"},
            "track_uris": {"type": "array", "items": {"type": "string"}}
        }),
        &["playlist_id", "track_uris"],
    )
}

pub fn add_tracks_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("add_tracks", "Append tracks (spotify:track URIs) to a playlist.")
        .with_schema(playlist_tracks_schema())?
        .with_handler(|args, deps| {
            let args = parse_args::<PlaylistTracksArgs>("add_tracks", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                let args = args?;
                client?.add_tracks(&args.playlist_id, &args.track_uris).await?;
                Ok::<_, ToolError>(ToolOutcome::Empty)
            }
        }))
}

pub fn replace_tracks_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new(
        "replace_tracks",
        "Replace a playlist's contents with the given tracks. An empty list clears it.",
    )
    .with_schema(playlist_tracks_schema())?
    .with_handler(|args, deps| {
        let args = parse_args::<PlaylistTracksArgs>("replace_tracks", args);
        let client = deps.require::<SpotifyClient>(CLIENT);

        async move {
            let args = args?;
            client?
                .replace_tracks(&args.playlist_id, &args.track_uris)
                .await?;
            Ok::<_, ToolError>(ToolOutcome::Empty)
        }
    }))
}

pub fn remove_tracks_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("remove_tracks", "Remove every occurrence of the given tracks from a playlist.")
        .with_schema(playlist_tracks_schema())?
        .with_handler(|args, deps| {
            let args = parse_args::<PlaylistTracksArgs>("remove_tracks", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                let args = args?;
                client?
                    .remove_tracks(&args.playlist_id, &args.track_uris)
                    .await?;
                Ok::<_, ToolError>(ToolOutcome::Empty)
            }
        }))
}

#[derive(Debug, Deserialize)]
struct LimitArgs {
    #[serde(default = "default_playlist_limit")]
    limit: usize,
}

pub fn liked_tracks_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("liked_tracks", "List the user's Liked Songs, newest first.")
        .with_schema(schema(json!({"limit": {"type": "integer"}}), &[]))?
        .with_handler(|args, deps| {
            let args = parse_args::<LimitArgs>("liked_tracks", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                let tracks = client?.liked_tracks(args?.limit).await?;
                ToolOutcome::json(&tracks)
            }
        }))
}

#[derive(Debug, Deserialize)]
struct TrackUrisArgs {
    track_uris: Vec<String>,
}

pub fn save_tracks_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("save_tracks", "Save tracks to the user's Liked Songs.")
        .with_schema(schema(
            json!({"track_uris": {"type": "array", "items": {"type": "string"}}}),
            &["track_uris"],
        ))?
        .with_handler(|args, deps| {
            let args = parse_args::<TrackUrisArgs>("save_tracks", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                client?.save_tracks(&args?.track_uris).await?;
                Ok::<_, ToolError>(ToolOutcome::Empty)
            }
        }))
}

#[derive(Debug, Deserialize)]
struct TopTracksArgs {
    #[serde(default = "default_top_limit")]
    limit: usize,
    #[serde(default)]
    time_range: TimeRange,
}

fn default_top_limit() -> usize {
    20
}

pub fn top_tracks_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new(
        "top_tracks",
        "The user's most played tracks over short_term (4 weeks), medium_term (6 months) or long_term.",
    )
    .with_schema(schema(
        json!({
            "limit": {"type": "integer"},
            "time_range": {"type": "string", "enum": ["short_term", "medium_term", "long_term"]}
        }),
        &[],
    ))?
    .with_handler(|args, deps| {
        let args = parse_args::<TopTracksArgs>("top_tracks", args);
        let client = deps.require::<SpotifyClient>(CLIENT);

        async move {
            let args = args?;
            let tracks = client?.top_tracks(args.limit, args.time_range).await?;
            ToolOutcome::json(&tracks)
        }
    }))
}

pub fn recently_played_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("recently_played", "The user's last played tracks (at most 50).")
        .with_schema(schema(json!({"limit": {"type": "integer"}}), &[]))?
        .with_handler(|args, deps| {
            let args = parse_args::<LimitArgs>("recently_played", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                let history = client?.recently_played(args?.limit).await?;
                ToolOutcome::json(&history)
            }
        }))
}

pub fn devices_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("devices", "List the user's available Spotify Connect devices.")
        .with_schema(schema(json!({}), &[]))?
        .with_handler(|_args, deps| {
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                let devices = client?.devices().await?;
                ToolOutcome::json(&devices)
            }
        }))
}

#[derive(Debug, Deserialize)]
struct PlayArgs {
    #[serde(default)]
    uris: Vec<String>,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    position_ms: Option<u64>,
}

pub fn play_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new(
        "play",
        "Start or resume playback, optionally of specific track URIs on a specific device.",
    )
    .with_schema(schema(
        json!({
            "uris": {"type": "array", "items": {"type": "string"}},
            "device_id": {"type": "string"},
            "position_ms": {"type": "integer"}
        }),
        &[],
    ))?
    .with_handler(|args, deps| {
        let args = parse_args::<PlayArgs>("play", args);
        let client = deps.require::<SpotifyClient>(CLIENT);

        async move {
            let args = args?;
            client?
                .play(&args.uris, args.device_id.as_deref(), args.position_ms)
                .await?;
            Ok::<_, ToolError>(ToolOutcome::Empty)
        }
    }))
}

#[derive(Debug, Deserialize)]
struct DeviceArgs {
    #[serde(default)]
    device_id: Option<String>,
}

fn device_schema() -> Value {
    schema(json!({"device_id": {"type": "string"}}), &[])
}

pub fn pause_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("pause", "Pause playback.")
        .with_schema(device_schema())?
        .with_handler(|args, deps| {
            let args = parse_args::<DeviceArgs>("pause", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                client?.pause(args?.device_id.as_deref()).await?;
                Ok::<_, ToolError>(ToolOutcome::Empty)
            }
        }))
}

pub fn next_track_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("next_track", "Skip to the next track.")
        .with_schema(device_schema())?
        .with_handler(|args, deps| {
            let args = parse_args::<DeviceArgs>("next_track", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                client?.next(args?.device_id.as_deref()).await?;
                Ok::<_, ToolError>(ToolOutcome::Empty)
            }
        }))
}

pub fn previous_track_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("previous_track", "Go back to the previous track.")
        .with_schema(device_schema())?
        .with_handler(|args, deps| {
            let args = parse_args::<DeviceArgs>("previous_track", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                client?.previous(args?.device_id.as_deref()).await?;
                Ok::<_, ToolError>(ToolOutcome::Empty)
            }
        }))
}

#[derive(Debug, Deserialize)]
struct SeekArgs {
    position_ms: u64,
    #[serde(default)]
    device_id: Option<String>,
}

pub fn seek_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("seek", "Seek to a position (milliseconds) in the current track.")
        .with_schema(schema(
            json!({
                "position_ms": {"type": "integer"},
                "device_id": {"type": "string"}
            }),
            &["position_ms"],
        ))?
        .with_handler(|args, deps| {
            let args = parse_args::<SeekArgs>("seek", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                let args = args?;
                client?
                    .seek(args.position_ms, args.device_id.as_deref())
                    .await?;
                Ok::<_, ToolError>(ToolOutcome::Empty)
            }
        }))
}

#[derive(Debug, Deserialize)]
struct SetVolumeArgs {
    volume_percent: u32,
    #[serde(default)]
    device_id: Option<String>,
}

pub fn set_volume_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("set_volume", "Set playback volume, 0-100.")
        .with_schema(schema(
            json!({
                "volume_percent": {"type": "integer"},
                "device_id": {"type": "string"}
            }),
            &["volume_percent"],
        ))?
        .with_handler(|args, deps| {
            let args = parse_args::<SetVolumeArgs>("set_volume", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                let args = args?;
                client?
                    .set_volume(args.volume_percent, args.device_id.as_deref())
                    .await?;
                Ok::<_, ToolError>(ToolOutcome::Empty)
            }
        }))
}

#[derive(Debug, Deserialize)]
struct SearchTrackArgs {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    10
}

pub fn search_track_tool() -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new("search_track", "Search the Spotify catalog for tracks.")
        .with_schema(schema(
            json!({
                "query": {"type": "string"},
                "limit": {"type": "integer"}
            }),
            &["query"],
        ))?
        .with_handler(|args, deps| {
            let args = parse_args::<SearchTrackArgs>("search_track", args);
            let client = deps.require::<SpotifyClient>(CLIENT);

            async move {
                let args = args?;
                let tracks = client?.search_track(&args.query, args.limit).await?;
                ToolOutcome::json(&tracks)
            }
        }))
}
