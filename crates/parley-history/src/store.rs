// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The on-disk history store: per-key NDJSON live logs plus immutable
//! archive segments produced by threshold-triggered compaction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use parley_core::ParleyError;

use crate::entry::HistoryEntry;
use crate::search::SearchQuery;

/// Append-only per-conversation history with bounded live-log growth.
///
/// One `HistoryStore` serves every conversation key under a single root
/// directory. Same-key operations that touch the live log are serialized by
/// a per-key async mutex; a concurrent compaction attempt for the same key
/// therefore waits for the one in progress instead of racing it.
pub struct HistoryStore {
    root: PathBuf,
    archive_threshold: usize,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl HistoryStore {
    /// Creates a store rooted at `root` (created lazily on first append).
    ///
    /// `archive_threshold` is the live-log entry count at which compaction
    /// moves the oldest half into an archive segment.
    pub fn new(root: impl Into<PathBuf>, archive_threshold: usize) -> Self {
        Self {
            root: root.into(),
            archive_threshold,
            locks: DashMap::new(),
        }
    }

    /// Appends one entry to the conversation's live log, then runs the
    /// compaction check.
    pub async fn append(&self, entry: &HistoryEntry) -> Result<(), ParleyError> {
        let key = entry.conversation_key.clone();
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(ParleyError::storage)?;

        let mut line = serde_json::to_string(entry).map_err(ParleyError::storage)?;
        line.push('\n');

        let live = self.live_path(&key);
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&live)
            .await
            .map_err(ParleyError::storage)?;
        file.write_all(line.as_bytes())
            .await
            .map_err(ParleyError::storage)?;
        file.flush().await.map_err(ParleyError::storage)?;
        drop(file);

        debug!(conversation_key = key.as_str(), role = %entry.role, "history entry appended");

        self.check_and_archive(&key).await
    }

    /// Returns the most recent `limit` entries in chronological order,
    /// reading backward from the live log into archive segments
    /// (most-recent-segment-first) until satisfied or exhausted.
    pub async fn load_recent(
        &self,
        key: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, ParleyError> {
        let mut entries = self.read_entries(&self.live_path(key)).await?;

        if entries.len() < limit {
            let mut indices = self.archive_indices(key).await?;
            indices.reverse();
            for index in indices {
                let mut segment = self.read_entries(&self.archive_path(key, index)).await?;
                segment.append(&mut entries);
                entries = segment;
                if entries.len() >= limit {
                    break;
                }
            }
        }

        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }
        Ok(entries)
    }

    /// Searches the full history for the key (all archive segments oldest
    /// first, then the live log) with the query's filters.
    pub async fn search(
        &self,
        key: &str,
        query: &SearchQuery,
    ) -> Result<Vec<HistoryEntry>, ParleyError> {
        let mut all = Vec::new();
        for index in self.archive_indices(key).await? {
            all.extend(self.read_entries(&self.archive_path(key, index)).await?);
        }
        all.extend(self.read_entries(&self.live_path(key)).await?);
        Ok(query.apply(all))
    }

    /// Entry counts as `(live, archived)`, for introspection.
    pub async fn entry_counts(&self, key: &str) -> Result<(usize, usize), ParleyError> {
        let live = self.read_entries(&self.live_path(key)).await?.len();
        let mut archived = 0;
        for index in self.archive_indices(key).await? {
            archived += self.read_entries(&self.archive_path(key, index)).await?.len();
        }
        Ok((live, archived))
    }

    /// Sorted archive segment indices for the key.
    pub async fn archive_indices(&self, key: &str) -> Result<Vec<u64>, ParleyError> {
        let dir = self.root.join("archive");
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ParleyError::storage(e)),
        };

        let prefix = format!("{}.", sanitize(key));
        let mut indices = Vec::new();
        while let Some(dirent) = read_dir.next_entry().await.map_err(ParleyError::storage)? {
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(rest) = name.strip_prefix(&prefix)
                && let Some(middle) = rest.strip_suffix(".jsonl")
                && let Ok(index) = middle.parse::<u64>()
            {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    /// Moves the oldest half of an over-threshold live log into the next
    /// archive segment and rewrites the live log with the newer half.
    ///
    /// Callers must hold the per-key lock.
    async fn check_and_archive(&self, key: &str) -> Result<(), ParleyError> {
        let live = self.live_path(key);
        let entries = self.read_entries(&live).await?;
        if entries.len() < self.archive_threshold {
            return Ok(());
        }

        let moved = entries.len() / 2;
        let (oldest, remaining) = entries.split_at(moved);

        let index = self
            .archive_indices(key)
            .await?
            .last()
            .map_or(0, |last| last + 1);
        let segment_path = self.archive_path(key, index);

        tokio::fs::create_dir_all(self.root.join("archive"))
            .await
            .map_err(ParleyError::storage)?;

        // Archive segments are written once in full and never touched again;
        // create_new guards the immutability.
        let mut segment = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&segment_path)
            .await
            .map_err(ParleyError::storage)?;
        segment
            .write_all(render_lines(oldest)?.as_bytes())
            .await
            .map_err(ParleyError::storage)?;
        segment.sync_all().await.map_err(ParleyError::storage)?;
        drop(segment);

        // Rewrite the live log via temp file + rename so a crash mid-rewrite
        // leaves either the old or the new log, never a torn one.
        let tmp = live.with_extension("jsonl.tmp");
        let mut tmp_file = tokio::fs::File::create(&tmp)
            .await
            .map_err(ParleyError::storage)?;
        tmp_file
            .write_all(render_lines(remaining)?.as_bytes())
            .await
            .map_err(ParleyError::storage)?;
        tmp_file.sync_all().await.map_err(ParleyError::storage)?;
        drop(tmp_file);
        tokio::fs::rename(&tmp, &live)
            .await
            .map_err(ParleyError::storage)?;

        info!(
            conversation_key = key,
            archived = moved,
            remaining = remaining.len(),
            segment_index = index,
            "history compacted into archive segment"
        );
        Ok(())
    }

    /// Reads every parseable entry from an NDJSON file. Malformed lines are
    /// skipped with a warning; a missing file reads as empty.
    async fn read_entries(&self, path: &Path) -> Result<Vec<HistoryEntry>, ParleyError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ParleyError::storage(e)),
        };

        let mut entries = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %e,
                        "skipping malformed history line"
                    );
                }
            }
        }
        Ok(entries)
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn live_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.jsonl", sanitize(key)))
    }

    fn archive_path(&self, key: &str, index: u64) -> PathBuf {
        self.root
            .join("archive")
            .join(format!("{}.{index:05}.jsonl", sanitize(key)))
    }
}

fn render_lines(entries: &[HistoryEntry]) -> Result<String, ParleyError> {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&serde_json::to_string(entry).map_err(ParleyError::storage)?);
        out.push('\n');
    }
    Ok(out)
}

/// Replaces path-hostile bytes in a conversation key, `%XX`-escaping
/// everything outside `[A-Za-z0-9._-]` (and `.`/`..` wholesale).
fn sanitize(component: &str) -> String {
    if component == "." || component == ".." {
        return component.bytes().map(|b| format!("%{b:02X}")).collect();
    }
    let mut out = String::with_capacity(component.len());
    for b in component.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Role;
    use tempfile::tempdir;

    const KEY: &str = "telegram:42";

    async fn fill(store: &HistoryStore, n: usize, offset: usize) {
        for i in offset..offset + n {
            store
                .append(&HistoryEntry::user(KEY, format!("turn {i}")))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn append_then_load_recent_preserves_order() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 1000);

        fill(&store, 5, 0).await;
        let recent = store.load_recent(KEY, 5).await.unwrap();
        assert_eq!(recent.len(), 5);
        for (i, entry) in recent.iter().enumerate() {
            assert_eq!(entry.text, format!("turn {i}"));
        }
    }

    #[tokio::test]
    async fn load_recent_returns_tail_when_limit_smaller() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 1000);

        fill(&store, 10, 0).await;
        let recent = store.load_recent(KEY, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].text, "turn 7");
        assert_eq!(recent[2].text, "turn 9");
    }

    #[tokio::test]
    async fn compaction_triggers_once_at_threshold() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 10);

        fill(&store, 10, 0).await;

        let indices = store.archive_indices(KEY).await.unwrap();
        assert_eq!(indices, vec![0], "exactly one segment expected");

        let (live, archived) = store.entry_counts(KEY).await.unwrap();
        assert_eq!(archived, 5, "oldest half archived");
        assert_eq!(live, 5, "newer half stays live");

        // The archived prefix is the oldest entries.
        let segment = store
            .read_entries(&store.archive_path(KEY, 0))
            .await
            .unwrap();
        assert_eq!(segment[0].text, "turn 0");
        assert_eq!(segment[4].text, "turn 4");
    }

    #[tokio::test]
    async fn second_threshold_crossing_produces_next_segment() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 10);

        fill(&store, 10, 0).await; // segment 0, live=5
        fill(&store, 5, 10).await; // live reaches 10 again -> segment 1
        let indices = store.archive_indices(KEY).await.unwrap();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn load_recent_spans_archive_segments() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 4);

        fill(&store, 9, 0).await;
        let recent = store.load_recent(KEY, 9).await.unwrap();
        assert_eq!(recent.len(), 9);
        for (i, entry) in recent.iter().enumerate() {
            assert_eq!(entry.text, format!("turn {i}"), "order across segments");
        }
    }

    #[tokio::test]
    async fn search_set_unchanged_by_compaction() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 1000);

        fill(&store, 999, 0).await;
        let before: Vec<String> = store
            .search(KEY, &SearchQuery { limit: 2000, ..Default::default() })
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect();

        // The 1000th append crosses the threshold and compacts.
        fill(&store, 1, 999).await;
        assert_eq!(store.archive_indices(KEY).await.unwrap().len(), 1);

        let after: Vec<String> = store
            .search(KEY, &SearchQuery { limit: 2000, ..Default::default() })
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect();

        let mut expected = before;
        expected.push("turn 999".to_string());
        assert_eq!(after, expected, "content equal across live + archives");
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 1000);

        fill(&store, 2, 0).await;
        // Corrupt the live log with a torn line.
        let live = store.live_path(KEY);
        let mut content = std::fs::read_to_string(&live).unwrap();
        content.push_str("{\"role\":\"user\",\"tex\n");
        std::fs::write(&live, content).unwrap();

        store
            .append(&HistoryEntry::user(KEY, "turn 2"))
            .await
            .unwrap();

        let recent = store.load_recent(KEY, 10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[2].text, "turn 2");
    }

    #[tokio::test]
    async fn different_keys_append_concurrently() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(HistoryStore::new(dir.path(), 1000));

        let mut handles = Vec::new();
        for k in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("chan:{k}");
                for i in 0..20 {
                    store
                        .append(&HistoryEntry::user(&key, format!("k{k} turn {i}")))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for k in 0..8 {
            let key = format!("chan:{k}");
            let entries = store.load_recent(&key, 100).await.unwrap();
            assert_eq!(entries.len(), 20);
            assert_eq!(entries[0].text, format!("k{k} turn 0"));
        }
    }

    #[tokio::test]
    async fn roles_survive_round_trip() {
        let dir = tempdir().unwrap();
        let store = HistoryStore::new(dir.path(), 1000);

        store.append(&HistoryEntry::user(KEY, "q")).await.unwrap();
        store
            .append(&HistoryEntry::assistant(KEY, "a"))
            .await
            .unwrap();
        store
            .append(&HistoryEntry::system(KEY, "agent invocation failed"))
            .await
            .unwrap();

        let recent = store.load_recent(KEY, 3).await.unwrap();
        assert_eq!(recent[0].role, Role::User);
        assert_eq!(recent[1].role, Role::Assistant);
        assert_eq!(recent[2].role, Role::System);
    }
}
