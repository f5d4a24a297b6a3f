//! JSON run summaries for the presentation layer.
//!
//! # Output Structure
//!
//! One file per run, grouped by UTC date:
//! ```text
//! summary_dir/
//! └── 2025-05-06/
//!     ├── run_081502.json
//!     └── run_173010.json
//! ```

use crate::models::RunSummary;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

/// Path the summary of a run started at `summary.started_at` is written to.
pub fn summary_path(summary: &RunSummary, summary_dir: &str) -> PathBuf {
    let started = summary.started_at;
    PathBuf::from(summary_dir)
        .join(started.format("%Y-%m-%d").to_string())
        .join(format!("run_{}.json", started.format("%H%M%S")))
}

/// Serialize `summary` to `{summary_dir}/{date}/run_{time}.json`.
///
/// Returns the path written.
#[instrument(level = "info", skip_all, fields(summary_dir = %summary_dir))]
pub async fn write_summary(summary: &RunSummary, summary_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(summary)?;
    let path = summary_path(summary, summary_dir);

    if let Some(dir) = path.parent() {
        info!(dir = %dir.display(), "Ensuring summary directory exists");
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create summary dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote run summary");
    Ok(path)
}
