use serde::{Deserialize, Serialize};

/// One playable catalog track. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRef {
    /// Catalog item id.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    pub duration_secs: u64,
}

impl TrackRef {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artists: Vec::new(),
            duration_secs: 0,
        }
    }

    pub fn with_artists(mut self, artists: Vec<String>) -> Self {
        self.artists = artists;
        self
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// `Artist - Title`, or `Various Artists - Title` past `artist_limit`.
    pub fn display(&self, artist_limit: usize) -> String {
        display_line(&self.artists, &self.title, artist_limit)
    }
}

impl std::fmt::Display for TrackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display(1))
    }
}

/// A catalog album; expanded into its tracks before anything is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumRef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
}

impl AlbumRef {
    pub fn display(&self, artist_limit: usize) -> String {
        display_line(&self.artists, &self.title, artist_limit)
    }
}

pub(crate) fn display_line(artists: &[String], title: &str, artist_limit: usize) -> String {
    if artists.is_empty() {
        return title.to_string();
    }
    if artists.len() > artist_limit {
        return format!("Various Artists - {}", title);
    }
    format!("{} - {}", artists.join(","), title)
}

/// Where an enqueued track lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePosition {
    /// Queue head, preempting the current track.
    Now,
    /// Queue head.
    Next,
    #[default]
    Last,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_respects_artist_limit() {
        let track = TrackRef::new("1", "Song").with_artists(vec!["A".into(), "B".into()]);
        assert_eq!(track.display(1), "Various Artists - Song");
        assert_eq!(track.display(2), "A,B - Song");
        assert_eq!(TrackRef::new("2", "Solo").display(1), "Solo");
    }

    #[test]
    fn position_is_lowercase_on_the_wire() {
        let when: QueuePosition = serde_json::from_str("\"now\"").unwrap();
        assert_eq!(when, QueuePosition::Now);
        assert_eq!(serde_json::to_string(&QueuePosition::Last).unwrap(), "\"last\"");
    }
}
