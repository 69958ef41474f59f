//! Utility functions for logging hygiene, model-reply cleanup, and file
//! system checks.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…(+{} bytes)", &s[..max], s.len() - max)
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When a model reply is cut off (e.g. due to token limits), the resulting
/// JSON fails to parse with an EOF error. That case is worth one re-ask;
/// other parse errors are not.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|csv)?\s*(.*?)\s*```").unwrap());

/// Strip a Markdown code fence from a model reply, if present.
///
/// Hosted endpoints frequently wrap structured replies in ```` ```json ````
/// fences even when told not to. Returns the fenced content, or the
/// trimmed reply when there is no fence.
pub fn strip_code_fence(reply: &str) -> &str {
    match CODE_FENCE.captures(reply) {
        Some(captures) => captures.get(1).map(|m| m.as_str()).unwrap_or(reply),
        None => reply.trim(),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test
/// by creating and immediately deleting a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(path).await {
        return Err(Box::new(e));
    }
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}
