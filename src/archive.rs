use std::sync::Arc;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::app::Extraction;
use crate::formats::ChapterLabel;
use crate::kv_store::{KeyValueStore, SAVED_CONTENT_KEY};

pub const DEFAULT_ARCHIVE_CAPACITY: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedContent {
    pub url: String,
    pub title: String,
    pub chapter: ChapterLabel,
    pub content: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

impl SavedContent {
    pub fn from_extraction(extraction: &Extraction) -> Self {
        let title = match extraction.chapter {
            ChapterLabel::Known(n) => format!("Chapter {n}"),
            ChapterLabel::Unknown => "Extracted Page".to_string(),
        };
        Self {
            url: extraction.url.clone(),
            title,
            chapter: extraction.chapter,
            content: extraction.text.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Extracted texts, newest first, kept under [`SAVED_CONTENT_KEY`].
///
/// Unlike history this is append-only: re-extracting a URL saves another
/// record. The oldest records fall off past `capacity`.
pub struct ContentArchive {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
}

impl ContentArchive {
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    pub async fn list(&self) -> anyhow::Result<Vec<SavedContent>> {
        let Some(raw) = self.store.get(SAVED_CONTENT_KEY).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(saved) => Ok(saved),
            Err(err) => {
                tracing::warn!(?err, "saved content is malformed; starting empty");
                Ok(Vec::new())
            }
        }
    }

    pub async fn record(&self, extraction: &Extraction) -> anyhow::Result<()> {
        let mut saved = self.list().await.context("load saved content")?;
        saved.insert(0, SavedContent::from_extraction(extraction));
        saved.truncate(self.capacity);

        let json = serde_json::to_string(&saved).context("serialize saved content")?;
        self.store
            .set(SAVED_CONTENT_KEY, &json)
            .await
            .context("save content")
    }
}
