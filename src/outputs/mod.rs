//! Output files written at the end of a run.
//!
//! # Submodules
//!
//! - [`json`]: Writes the [`crate::models::RunSummary`] for the presentation layer
//! - [`markdown`]: Renders each enhanced article for reading
//!
//! # Output Structure
//!
//! ```text
//! summary_dir/
//! └── 2025-05-06/
//!     └── run_081502.json
//!
//! markdown_dir/
//! ├── why-chatbots-fail.md
//! └── live-chat-vs-email.md
//! ```

pub mod json;
pub mod markdown;
