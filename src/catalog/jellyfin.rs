use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{
    Catalog, CatalogError, CatalogItem, ItemFilter,
    models::{BaseItem, ItemsResponse},
};
use crate::{
    audio::constants::{TARGET_CHANNELS, TARGET_SAMPLE_RATE},
    common::types::AnyResult,
    configs::JellyfinConfig,
    protocol::tracks::TrackRef,
};

pub struct JellyfinClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl JellyfinClient {
    pub fn new(config: &JellyfinConfig) -> AnyResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("jellywave/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self::with_client(client, &config.url, &config.api_key))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `path?ApiKey=…&k=v…` with every value percent-encoded.
    fn url_with_query(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = self.endpoint(path);
        url.push_str("?ApiKey=");
        url.push_str(&urlencoding::encode(&self.api_key));
        for (key, value) in params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    async fn get_items(&self, params: &[(&str, String)]) -> Result<Vec<BaseItem>, CatalogError> {
        let url = self.url_with_query("/Items", params);
        debug!("Jellyfin GET /Items {:?}", params);

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(CatalogError::Status {
                status: resp.status().as_u16(),
                endpoint: "/Items".to_string(),
            });
        }

        let body: ItemsResponse = resp.json().await?;
        Ok(body.items)
    }
}

#[async_trait]
impl Catalog for JellyfinClient {
    async fn search(
        &self,
        term: &str,
        limit: usize,
        filter: ItemFilter,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        let items = self
            .get_items(&[
                ("searchTerm", term.to_string()),
                ("recursive", "true".to_string()),
                ("limit", limit.to_string()),
                ("includeItemTypes", filter.include_item_types().to_string()),
            ])
            .await?;

        Ok(items.into_iter().map(CatalogItem::from).collect())
    }

    async fn lookup_by_ids(&self, ids: &[String]) -> Result<Vec<CatalogItem>, CatalogError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let items = self.get_items(&[("ids", ids.join(","))]).await?;
        Ok(items.into_iter().map(CatalogItem::from).collect())
    }

    async fn album_tracks(&self, album_id: &str) -> Result<Vec<TrackRef>, CatalogError> {
        let items = self
            .get_items(&[
                ("parentId", album_id.to_string()),
                ("sortBy", "ParentIndexNumber,IndexNumber".to_string()),
            ])
            .await?;

        Ok(items
            .into_iter()
            .filter(|item| !item.is_album())
            .map(BaseItem::into_track)
            .collect())
    }

    fn stream_url(&self, track_id: &str, bitrate_kbps: u32) -> String {
        // HLS with fMP4 segments, Opus copied through when the library file
        // already is Opus.
        self.url_with_query(
            &format!("/Audio/{}/main.m3u8", urlencoding::encode(track_id)),
            &[
                ("segmentContainer", "mp4".to_string()),
                ("audioCodec", "opus".to_string()),
                ("allowAudioStreamCopy", "true".to_string()),
                ("maxAudioBitDepth", "16".to_string()),
                ("audioSampleRate", TARGET_SAMPLE_RATE.to_string()),
                ("audioChannels", TARGET_CHANNELS.to_string()),
                ("audioBitRate", (bitrate_kbps as u64 * 1000).to_string()),
            ],
        )
    }
}
