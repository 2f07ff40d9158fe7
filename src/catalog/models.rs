//! Wire shapes of the Jellyfin `/Items` endpoint, only the fields used.

use serde::Deserialize;

use crate::protocol::tracks::{AlbumRef, TrackRef};

use super::CatalogItem;

/// `RunTimeTicks` are 100 ns units.
pub const TICKS_PER_SECOND: u64 = 10_000_000;

pub const ALBUM_ITEM_TYPE: &str = "MusicAlbum";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<BaseItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BaseItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub item_type: String,
    #[serde(default)]
    pub artists: Vec<String>,
    pub run_time_ticks: Option<u64>,
}

impl BaseItem {
    pub fn is_album(&self) -> bool {
        self.item_type == ALBUM_ITEM_TYPE
    }

    pub fn into_track(self) -> TrackRef {
        TrackRef {
            id: self.id,
            title: self.name,
            artists: self.artists,
            duration_secs: self.run_time_ticks.unwrap_or(0) / TICKS_PER_SECOND,
        }
    }
}

impl From<BaseItem> for CatalogItem {
    fn from(item: BaseItem) -> Self {
        if item.is_album() {
            CatalogItem::Album(AlbumRef {
                id: item.id,
                title: item.name,
                artists: item.artists,
            })
        } else {
            CatalogItem::Track(item.into_track())
        }
    }
}
