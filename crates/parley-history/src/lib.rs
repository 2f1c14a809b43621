// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable, ordered, append-only conversation history for the Parley runtime.
//!
//! Each conversation key owns one newline-delimited JSON live log. When the
//! live log crosses a configured entry-count threshold, the oldest half is
//! moved into an immutable, sequentially-indexed archive segment and the
//! live log is rewritten with the newer half. Concatenating all segments in
//! index order followed by the live log reconstructs full history order.
//!
//! Same-key writers are serialized by a per-key lock (callers are usually
//! already serialized by the lane scheduler, but the store does not rely on
//! it); different keys write independently with no cross-key locking.

pub mod entry;
pub mod search;
pub mod store;

pub use entry::{HistoryEntry, Role};
pub use search::SearchQuery;
pub use store::HistoryStore;
