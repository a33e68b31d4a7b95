//! Filtered mirrors of podcast feeds.
//!
//! A run downloads a source feed, drops the episodes that fail a set of
//! keyword rules, and writes a rebuilt, player-compatible feed containing
//! the rest. [`dispatch`] runs any number of such jobs side by side.

pub mod config;
pub mod dispatch;
pub mod feed;
pub mod logging;
pub mod pipeline;
pub mod util;
