use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::formats::ChapterLabel;
use crate::kv_store::{HISTORY_KEY, KeyValueStore};

pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub url: String,
    pub chapter: ChapterLabel,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

/// Visited URLs, most recent first, unique by URL and capped at `capacity`.
///
/// The in-memory list is authoritative for the session; every mutation is
/// written through to the store under [`HISTORY_KEY`].
pub struct HistoryCache {
    entries: Vec<HistoryEntry>,
    capacity: usize,
    store: Arc<dyn KeyValueStore>,
}

impl HistoryCache {
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
            store,
        }
    }

    /// Restores the persisted history. Unreadable data starts an empty cache.
    pub async fn load(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        let mut cache = Self::new(Arc::clone(&store), capacity);

        let raw = match store.get(HISTORY_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return cache,
            Err(err) => {
                tracing::warn!(?err, "load history failed; starting empty");
                return cache;
            }
        };
        let stored: Vec<HistoryEntry> = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(?err, "stored history is malformed; starting empty");
                return cache;
            }
        };

        let mut seen = HashSet::new();
        cache.entries = stored
            .into_iter()
            .filter(|entry| seen.insert(entry.url.clone()))
            .take(cache.capacity)
            .collect();
        tracing::debug!(entries = cache.entries.len(), "loaded history");
        cache
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.iter().any(|entry| entry.url == url)
    }

    /// Moves `url` to the front, inserting it if new, then evicts from the
    /// tail down to capacity.
    pub async fn add(&mut self, url: &str, chapter: ChapterLabel) -> anyhow::Result<()> {
        let mut chapter = chapter;
        if let Some(pos) = self.entries.iter().position(|entry| entry.url == url) {
            let existing = self.entries.remove(pos);
            if chapter == ChapterLabel::Unknown {
                chapter = existing.chapter;
            }
        }

        self.entries.insert(
            0,
            HistoryEntry {
                url: url.to_owned(),
                chapter,
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        );
        self.entries.truncate(self.capacity);

        self.persist().await
    }

    pub async fn clear(&mut self) -> anyhow::Result<()> {
        self.entries.clear();
        self.persist().await
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string(&self.entries).context("serialize history")?;
        self.store
            .set(HISTORY_KEY, &json)
            .await
            .context("save history")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::MemoryKeyValueStore;

    fn urls(cache: &HistoryCache) -> Vec<&str> {
        cache.list().iter().map(|e| e.url.as_str()).collect()
    }

    #[tokio::test]
    async fn adding_same_url_twice_keeps_one_entry() -> anyhow::Result<()> {
        let mut cache = HistoryCache::new(Arc::new(MemoryKeyValueStore::new()), 10);
        cache.add("https://a.example/1", ChapterLabel::Known(1)).await?;
        cache.add("https://a.example/1", ChapterLabel::Known(1)).await?;
        assert_eq!(cache.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn re_adding_moves_entry_to_front() -> anyhow::Result<()> {
        let mut cache = HistoryCache::new(Arc::new(MemoryKeyValueStore::new()), 10);
        cache.add("https://a.example/1", ChapterLabel::Known(1)).await?;
        cache.add("https://a.example/2", ChapterLabel::Known(2)).await?;
        cache.add("https://a.example/1", ChapterLabel::Unknown).await?;

        assert_eq!(urls(&cache), vec!["https://a.example/1", "https://a.example/2"]);
        // An unknown chapter does not erase what was known about the URL.
        assert_eq!(cache.list()[0].chapter, ChapterLabel::Known(1));
        Ok(())
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() -> anyhow::Result<()> {
        let mut cache = HistoryCache::new(Arc::new(MemoryKeyValueStore::new()), 3);
        for i in 1..=4 {
            cache
                .add(&format!("https://a.example/{i}"), ChapterLabel::Known(i))
                .await?;
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(
            urls(&cache),
            vec![
                "https://a.example/4",
                "https://a.example/3",
                "https://a.example/2"
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn default_capacity_keeps_ten() -> anyhow::Result<()> {
        let mut cache = HistoryCache::new(
            Arc::new(MemoryKeyValueStore::new()),
            DEFAULT_HISTORY_CAPACITY,
        );
        for i in 0..=DEFAULT_HISTORY_CAPACITY as u64 {
            cache
                .add(&format!("https://a.example/{i}"), ChapterLabel::Unknown)
                .await?;
        }
        assert_eq!(cache.len(), DEFAULT_HISTORY_CAPACITY);
        assert!(!cache.contains("https://a.example/0"));
        Ok(())
    }

    #[tokio::test]
    async fn mutations_are_written_through_and_reloaded() -> anyhow::Result<()> {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let mut cache = HistoryCache::new(Arc::clone(&store), 10);
        cache.add("https://a.example/1", ChapterLabel::Known(1)).await?;
        cache.add("https://a.example/2", ChapterLabel::Unknown).await?;

        let reloaded = HistoryCache::load(Arc::clone(&store), 10).await;
        assert_eq!(reloaded.list(), cache.list());

        cache.clear().await?;
        assert!(cache.is_empty());
        let reloaded = HistoryCache::load(store, 10).await;
        assert!(reloaded.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn load_dedups_and_truncates_stored_list() -> anyhow::Result<()> {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let stored = serde_json::json!([
            {"url": "https://a.example/3", "chapter": 3, "timestamp": "t3"},
            {"url": "https://a.example/2", "chapter": "unknown", "timestamp": "t2"},
            {"url": "https://a.example/3", "chapter": 3, "timestamp": "t1"},
            {"url": "https://a.example/1", "chapter": 1, "timestamp": "t0"},
        ]);
        store.set(HISTORY_KEY, &stored.to_string()).await?;

        let cache = HistoryCache::load(store, 2).await;
        assert_eq!(urls(&cache), vec!["https://a.example/3", "https://a.example/2"]);
        assert_eq!(cache.list()[1].chapter, ChapterLabel::Unknown);
        Ok(())
    }

    #[tokio::test]
    async fn load_ignores_malformed_data() -> anyhow::Result<()> {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        store.set(HISTORY_KEY, "not json").await?;
        let cache = HistoryCache::load(store, 10).await;
        assert!(cache.is_empty());
        Ok(())
    }
}
