//! yt-batch library
//!
//! Batch orchestration of yt-dlp and ffmpeg downloads.

pub mod core;
pub mod error;
pub mod storage;
pub mod types;
pub mod ui;
pub mod utils;
