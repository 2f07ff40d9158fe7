//! Remote media catalog.
//!
//! Search results arrive as [`CatalogItem`]s, already split into tracks and
//! albums. Albums are expanded with [`expand`] before anything reaches a
//! room queue, so queues only ever hold [`TrackRef`]s.

pub mod jellyfin;
pub mod models;

pub use jellyfin::JellyfinClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::protocol::tracks::{AlbumRef, TrackRef};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog answered {status} for {endpoint}")]
    Status { status: u16, endpoint: String },
    #[error("nothing in the catalog matches {0:?}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogItem {
    Track(TrackRef),
    Album(AlbumRef),
}

impl CatalogItem {
    pub fn id(&self) -> &str {
        match self {
            Self::Track(track) => &track.id,
            Self::Album(album) => &album.id,
        }
    }

    /// `Track: Artist - Title` / `Album: Artist - Title`.
    pub fn display(&self, artist_limit: usize) -> String {
        match self {
            Self::Track(track) => format!("Track: {}", track.display(artist_limit)),
            Self::Album(album) => format!("Album: {}", album.display(artist_limit)),
        }
    }
}

/// Which item kinds a search returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemFilter {
    Track,
    Album,
    #[default]
    Any,
}

impl ItemFilter {
    /// Value of Jellyfin's `includeItemTypes`.
    pub fn include_item_types(&self) -> &'static str {
        match self {
            Self::Track => "Audio",
            Self::Album => models::ALBUM_ITEM_TYPE,
            Self::Any => "Audio,MusicAlbum",
        }
    }
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn search(
        &self,
        term: &str,
        limit: usize,
        filter: ItemFilter,
    ) -> Result<Vec<CatalogItem>, CatalogError>;

    async fn lookup_by_ids(&self, ids: &[String]) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Album tracks ordered by disc, then track number.
    async fn album_tracks(&self, album_id: &str) -> Result<Vec<TrackRef>, CatalogError>;

    /// Playable locator constrained to 48 kHz stereo Opus at `bitrate_kbps`.
    fn stream_url(&self, track_id: &str, bitrate_kbps: u32) -> String;
}

/// Tracks to enqueue for one resolved item.
pub async fn expand(catalog: &dyn Catalog, item: CatalogItem) -> Result<Vec<TrackRef>, CatalogError> {
    match item {
        CatalogItem::Track(track) => Ok(vec![track]),
        CatalogItem::Album(album) => {
            let tracks = catalog.album_tracks(&album.id).await?;
            if tracks.is_empty() {
                return Err(CatalogError::NotFound(format!("tracks of album {}", album.id)));
            }
            Ok(tracks)
        }
    }
}
