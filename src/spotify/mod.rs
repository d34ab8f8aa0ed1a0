//! Spotify Web API client for the signed-in user.

mod tools;
mod types;


use std::path::PathBuf;
use std::sync::Arc;

use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::auth::{CredentialProvider, DEFAULT_TOKEN_DIR, OAuthClientConfig, OAuthEndpoint, TokenFile};
use crate::error::{ConfigError, VendorError};
use crate::pagination::{Page, PageRequest, collect, collect_where};
use crate::session::{Session, read_empty, read_json};

pub use tools::all_tools;
pub use types::{
    AlbumRef, ArtistRef, Device, PlayContext, PlayHistory, Playlist, PlaylistItem,
    PlaylistOptions, PlaylistTracks, SavedTrack, TimeRange, Track, UserProfile, UserRef,
    VisibilityFilter,
};

use types::{DeviceList, Paging, TrackSearch};

const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

const MAX_PAGE_SIZE: usize = 50;
const MAX_PLAYLIST_URIS: usize = 100;
const MAX_LIBRARY_IDS: usize = 50;

pub const SPOTIFY_SCOPES: &[&str] = &[
    "user-read-private",
    "user-read-email",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-public",
    "playlist-modify-private",
    "user-library-read",
    "user-library-modify",
    "user-top-read",
    "user-read-recently-played",
    "user-read-playback-position",
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
];

#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub token_dir: PathBuf,
    pub token_suffix: String,
    pub api_base_url: Option<String>,
    pub auth_url: String,
    pub token_url: String,
}

impl SpotifyConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: SPOTIFY_SCOPES.iter().map(|scope| scope.to_string()).collect(),
            token_dir: PathBuf::from(DEFAULT_TOKEN_DIR),
            token_suffix: String::new(),
            api_base_url: None,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// Reads `SPOTIPY_CLIENT_ID`, `SPOTIPY_CLIENT_SECRET` and
    /// `SPOTIPY_REDIRECT_URI`, loading a `.env` file first if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let var = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        };

        Ok(Self::new(
            var("SPOTIPY_CLIENT_ID")?,
            var("SPOTIPY_CLIENT_SECRET")?,
            var("SPOTIPY_REDIRECT_URI")?,
        ))
    }

    pub fn oauth(&self) -> OAuthClientConfig {
        OAuthClientConfig::new(
            self.client_id.clone(),
            Some(self.client_secret.clone()),
            self.auth_url.clone(),
            self.token_url.clone(),
            self.redirect_uri.clone(),
        )
    }

    pub fn token_file(&self) -> TokenFile {
        TokenFile::for_api(&self.token_dir, "spotify", "v1", &self.token_suffix)
    }

    fn base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }
}

#[derive(Debug)]
pub struct SpotifyClient {
    session: Session,
}

impl SpotifyClient {
    pub async fn connect(config: SpotifyConfig) -> Result<Self, VendorError> {
        let endpoint = OAuthEndpoint::new(config.oauth())?;
        let provider =
            CredentialProvider::new(Arc::new(endpoint), config.token_file(), config.scopes.clone());
        let client = Self::with_credentials(&config, provider).await?;

        let user = client.current_user().await?;
        info!(
            user = user.display_name.as_deref().unwrap_or(user.id.as_str()),
            email = user.email.as_deref().unwrap_or_default(),
            "logged in to spotify"
        );
        Ok(client)
    }

    pub async fn with_credentials(
        config: &SpotifyConfig,
        credentials: CredentialProvider,
    ) -> Result<Self, VendorError> {
        let http = Client::builder()
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;
        let session = Session::open(credentials, http, config.base_url()).await?;
        Ok(Self { session })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn current_user(&self) -> Result<UserProfile, VendorError> {
        self.fetch("current_user", "me", &[]).await
    }

    /// The user's playlists in Spotify's order, keeping only those `filter`
    /// admits. `limit` counts kept playlists.
    pub async fn list_playlists(
        &self,
        limit: usize,
        filter: VisibilityFilter,
    ) -> Result<Vec<Playlist>, VendorError> {
        if !filter.any() {
            return Err(VendorError::validation(
                "at least one of include_public, include_private or include_collaborative must be set",
            ));
        }

        let collected = collect_where(
            limit,
            MAX_PAGE_SIZE,
            |request| self.offset_page::<Playlist>("list_playlists", "me/playlists", request, &[]),
            |playlist| filter.admits(playlist),
        )
        .await?;
        Ok(collected.items)
    }

    pub async fn get_playlist(&self, playlist_id: &str) -> Result<Playlist, VendorError> {
        let path = playlist_path(playlist_id)?;
        self.fetch("get_playlist", &path, &[]).await
    }

    /// Creates a playlist owned by the signed-in user.
    pub async fn create_playlist(
        &self,
        name: &str,
        options: &PlaylistOptions,
    ) -> Result<Playlist, VendorError> {
        if name.trim().is_empty() {
            return Err(VendorError::validation("playlist name must not be empty"));
        }

        let owner = self.current_user().await?;
        let body = json!({
            "name": name,
            "public": options.public,
            "collaborative": options.collaborative,
            "description": options.description,
        });
        let path = format!("users/{}/playlists", owner.id);
        let playlist: Playlist = self
            .send_json("create_playlist", Method::POST, &path, &body)
            .await?;
        info!(id = %playlist.id, name, "playlist created");
        Ok(playlist)
    }

    /// Appends tracks, 100 URIs per request.
    pub async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<(), VendorError> {
        if uris.is_empty() {
            return Err(VendorError::validation("track uris must not be empty"));
        }
        let path = format!("{}/tracks", playlist_path(playlist_id)?);

        for chunk in uris.chunks(MAX_PLAYLIST_URIS) {
            let body = json!({ "uris": chunk });
            self.command("add_tracks", Method::POST, &path, &[], Some(&body))
                .await?;
        }
        Ok(())
    }

    /// Replaces the playlist's contents; an empty list clears it.
    pub async fn replace_tracks(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), VendorError> {
        let path = format!("{}/tracks", playlist_path(playlist_id)?);
        let mut chunks = uris.chunks(MAX_PLAYLIST_URIS);

        let first = chunks.next().unwrap_or_default();
        let body = json!({ "uris": first });
        self.command("replace_tracks", Method::PUT, &path, &[], Some(&body))
            .await?;

        for chunk in chunks {
            let body = json!({ "uris": chunk });
            self.command("replace_tracks", Method::POST, &path, &[], Some(&body))
                .await?;
        }
        Ok(())
    }

    /// Removes every occurrence of the given tracks.
    pub async fn remove_tracks(
        &self,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), VendorError> {
        if uris.is_empty() {
            return Err(VendorError::validation("track uris must not be empty"));
        }
        let path = format!("{}/tracks", playlist_path(playlist_id)?);

        for chunk in uris.chunks(MAX_PLAYLIST_URIS) {
            let tracks = chunk
                .iter()
                .map(|uri| json!({ "uri": uri }))
                .collect::<Vec<_>>();
            let body = json!({ "tracks": tracks });
            self.command("remove_tracks", Method::DELETE, &path, &[], Some(&body))
                .await?;
        }
        Ok(())
    }

    /// The user's "Liked Songs", most recently saved first.
    pub async fn liked_tracks(&self, limit: usize) -> Result<Vec<SavedTrack>, VendorError> {
        let collected = collect(limit, MAX_PAGE_SIZE, |request| {
            self.offset_page::<SavedTrack>("liked_tracks", "me/tracks", request, &[])
        })
        .await?;
        Ok(collected.items)
    }

    /// Adds tracks to "Liked Songs". Accepts `spotify:track:` URIs or bare ids.
    pub async fn save_tracks(&self, uris: &[String]) -> Result<(), VendorError> {
        if uris.is_empty() {
            return Err(VendorError::validation("track uris must not be empty"));
        }

        let ids = uris.iter().map(|uri| track_id(uri)).collect::<Vec<_>>();
        for chunk in ids.chunks(MAX_LIBRARY_IDS) {
            let body = json!({ "ids": chunk });
            self.command("save_tracks", Method::PUT, "me/tracks", &[], Some(&body))
                .await?;
        }
        Ok(())
    }

    pub async fn top_tracks(
        &self,
        limit: usize,
        time_range: TimeRange,
    ) -> Result<Vec<Track>, VendorError> {
        let extra = [("time_range", time_range.as_str().to_string())];
        let collected = collect(limit, MAX_PAGE_SIZE, |request| {
            self.offset_page::<Track>("top_tracks", "me/top/tracks", request, &extra)
        })
        .await?;
        Ok(collected.items)
    }

    /// Spotify only keeps the last 50 plays, so this is a single request.
    pub async fn recently_played(&self, limit: usize) -> Result<Vec<PlayHistory>, VendorError> {
        let collected = collect(limit.min(MAX_PAGE_SIZE), MAX_PAGE_SIZE, |request| async move {
            let paging: Paging<PlayHistory> = self
                .fetch(
                    "recently_played",
                    "me/player/recently-played",
                    &[("limit", request.size.to_string())],
                )
                .await?;
            Ok::<_, VendorError>(Page::last(paging.items))
        })
        .await?;
        Ok(collected.items)
    }

    pub async fn devices(&self) -> Result<Vec<Device>, VendorError> {
        let list: DeviceList = self.fetch("devices", "me/player/devices", &[]).await?;
        Ok(list.devices)
    }

    /// Starts or resumes playback, optionally of specific tracks.
    pub async fn play(
        &self,
        uris: &[String],
        device_id: Option<&str>,
        position_ms: Option<u64>,
    ) -> Result<(), VendorError> {
        let mut body = serde_json::Map::new();
        if !uris.is_empty() {
            body.insert("uris".to_string(), json!(uris));
        }
        if let Some(position_ms) = position_ms {
            body.insert("position_ms".to_string(), json!(position_ms));
        }
        let body = (!body.is_empty()).then_some(Value::Object(body));

        self.command(
            "play",
            Method::PUT,
            "me/player/play",
            &device_query(device_id),
            body.as_ref(),
        )
        .await
    }

    pub async fn pause(&self, device_id: Option<&str>) -> Result<(), VendorError> {
        self.command(
            "pause",
            Method::PUT,
            "me/player/pause",
            &device_query(device_id),
            None,
        )
        .await
    }

    pub async fn next(&self, device_id: Option<&str>) -> Result<(), VendorError> {
        self.command(
            "next_track",
            Method::POST,
            "me/player/next",
            &device_query(device_id),
            None,
        )
        .await
    }

    pub async fn previous(&self, device_id: Option<&str>) -> Result<(), VendorError> {
        self.command(
            "previous_track",
            Method::POST,
            "me/player/previous",
            &device_query(device_id),
            None,
        )
        .await
    }

    pub async fn seek(&self, position_ms: u64, device_id: Option<&str>) -> Result<(), VendorError> {
        let mut query = vec![("position_ms", position_ms.to_string())];
        query.extend(device_query(device_id));
        self.command("seek", Method::PUT, "me/player/seek", &query, None)
            .await
    }

    /// Sets the playback volume; anything above 100 is rejected locally.
    pub async fn set_volume(
        &self,
        volume_percent: u32,
        device_id: Option<&str>,
    ) -> Result<(), VendorError> {
        if volume_percent > 100 {
            return Err(VendorError::validation(format!(
                "volume_percent must be 0-100, got {volume_percent}"
            )));
        }

        let mut query = vec![("volume_percent", volume_percent.to_string())];
        query.extend(device_query(device_id));
        self.command("set_volume", Method::PUT, "me/player/volume", &query, None)
            .await
    }

    pub async fn search_track(&self, query: &str, limit: usize) -> Result<Vec<Track>, VendorError> {
        if query.trim().is_empty() {
            return Err(VendorError::validation("search query must not be empty"));
        }

        let collected = collect(limit, MAX_PAGE_SIZE, |request: PageRequest| async move {
            let params = [
                ("q", query.to_string()),
                ("type", "track".to_string()),
                ("limit", request.size.to_string()),
                ("offset", request.offset.to_string()),
            ];
            let found: TrackSearch = self.fetch("search_track", "search", &params).await?;
            Ok::<_, VendorError>(found.tracks.into_page())
        })
        .await?;
        Ok(collected.items)
    }

    async fn offset_page<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        request: PageRequest,
        extra: &[(&str, String)],
    ) -> Result<Page<T>, VendorError> {
        let mut params = vec![
            ("limit", request.size.to_string()),
            ("offset", request.offset.to_string()),
        ];
        params.extend(extra.iter().cloned());

        let paging: Paging<T> = self.fetch(operation, path, &params).await?;
        debug!(operation, offset = request.offset, items = paging.items.len(), "fetched page");
        Ok(paging.into_page())
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, VendorError> {
        self.session
            .execute(operation, |handle| async move {
                read_json(handle.request(Method::GET, path).query(query)).await
            })
            .await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<T, VendorError> {
        self.session
            .execute(operation, |handle| {
                let method = method.clone();
                async move { read_json(handle.request(method, path).json(body)).await }
            })
            .await
    }

    /// A call whose response body carries nothing the caller needs.
    async fn command(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<(), VendorError> {
        self.session
            .execute(operation, |handle| {
                let method = method.clone();
                async move {
                    let request = handle.request(method, path).query(query);
                    let request = match body {
                        Some(body) => request.json(body),
                        None => request.header(CONTENT_LENGTH, 0),
                    };
                    read_empty(request).await
                }
            })
            .await
    }
}

fn playlist_path(playlist_id: &str) -> Result<String, VendorError> {
    let id = playlist_id.trim();
    if id.is_empty() {
        return Err(VendorError::validation("playlist id must not be empty"));
    }
    Ok(format!("playlists/{id}"))
}

fn track_id(uri: &str) -> &str {
    uri.strip_prefix("spotify:track:").unwrap_or(uri)
}

fn device_query(device_id: Option<&str>) -> Vec<(&'static str, String)> {
    device_id
        .map(|id| vec![("device_id", id.to_string())])
        .unwrap_or_default()
}
