use serde::{Deserialize, Serialize};

use crate::{
    catalog::{CatalogItem, ItemFilter},
    common::types::ChannelId,
    protocol::tracks::{QueuePosition, TrackRef},
};

/// `GET /v1/search` query string.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub term: String,
    #[serde(rename = "type", default)]
    pub filter: ItemFilter,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub item: CatalogItem,
    /// `Track: Artist - Title`, ready for display.
    pub display: String,
}

/// `POST /v1/rooms/{room}/play` body. Either `id` or `query` must be set;
/// `id` wins when both are.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub query: Option<String>,
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub filter: ItemFilter,
    #[serde(default)]
    pub when: QueuePosition,
    /// Voice channel the caller sits in.
    pub channel: Option<ChannelId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResponse {
    pub item: CatalogItem,
    pub display: String,
    pub queued: usize,
    pub started: bool,
}

/// `POST /v1/rooms/{room}/start` body.
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    pub channel: Option<ChannelId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub track: Option<TrackRef>,
    pub paused: bool,
}

#[derive(Debug, Serialize)]
pub struct Skipped {
    pub skipped: TrackRef,
}
