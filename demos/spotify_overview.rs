use std::error::Error;

use agent_tools_rs::{SpotifyClient, SpotifyConfig, TimeRange, VisibilityFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_tools_rs=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let spotify = SpotifyClient::connect(SpotifyConfig::from_env()?).await?;

    println!("Playlists:");
    for playlist in spotify.list_playlists(5, VisibilityFilter::default()).await? {
        println!("  {} ({} tracks)", playlist.name, playlist.tracks.total);
    }

    println!("\nLiked songs:");
    for saved in spotify.liked_tracks(5).await? {
        println!("  {} - {}", saved.track.name, artists(&saved.track.artists));
    }

    println!("\nTop tracks, last four weeks:");
    for (rank, track) in spotify
        .top_tracks(10, TimeRange::ShortTerm)
        .await?
        .iter()
        .enumerate()
    {
        println!("  {:>2}. {} - {}", rank + 1, track.name, artists(&track.artists));
    }

    Ok(())
}

fn artists(artists: &[agent_tools_rs::spotify::ArtistRef]) -> String {
    artists
        .iter()
        .map(|artist| artist.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
