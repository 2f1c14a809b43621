// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley status` - on-disk runtime state at a glance.

use std::path::Path;

use colored::Colorize;

use parley_config::ParleyConfig;
use parley_core::ParleyError;

/// Prints claim, history, and archive counts under the configured data dir.
pub async fn run_status(config: &ParleyConfig) -> Result<(), ParleyError> {
    let data_dir = Path::new(&config.storage.data_dir);

    println!("{} {}", "data dir:".bold(), data_dir.display());

    let claims = count_files_recursive(&data_dir.join("claims"), "json").await?;
    println!("  {:<20} {claims}", "claim markers");

    let history_dir = data_dir.join("history");
    let segments = count_files_recursive(&history_dir.join("archive"), "jsonl").await?;
    let conversations = count_files_recursive(&history_dir, "jsonl").await? - segments;
    println!("  {:<20} {conversations}", "live conversations");
    println!("  {:<20} {segments}", "archive segments");

    if claims == 0 && conversations == 0 {
        println!("{}", "no runtime state recorded yet".dimmed());
    }
    Ok(())
}

/// Counts files with the given extension under `dir`, recursively.
/// A missing directory counts as zero.
async fn count_files_recursive(dir: &Path, extension: &str) -> Result<usize, ParleyError> {
    let mut count = 0;
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let mut read_dir = match tokio::fs::read_dir(&current).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(ParleyError::storage(e)),
        };
        while let Some(dirent) = read_dir.next_entry().await.map_err(ParleyError::storage)? {
            let path = dirent.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
                count += 1;
            }
        }
    }
    Ok(count)
}
