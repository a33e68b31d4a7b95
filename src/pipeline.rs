//! A single filter run: fetch, parse, filter, build, serialize, write.
//!
//! [`transform`] is the pure in-memory core and never touches the network
//! or the filesystem. [`run_job`] wraps it with the download and the atomic
//! output write, and guarantees that the raw download is removed and that
//! the output path holds either a complete document or whatever it held
//! before the run.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

use crate::config::FilterJob;
use crate::feed::{
    build_at, fetch_to_file, parse_feed, render, retain, ArtworkTally, FetchError, FetchPolicy,
    ParseError, Rules,
};
use crate::util::{write_atomic, TempArtifact, WriteError};

/// Why a run produced no output.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to download feed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Failed to parse feed: {0}")]
    Parse(ParseError),

    #[error("Feed has no <channel> element")]
    Structure,

    #[error("Failed to render feed: {0}")]
    Render(#[from] quick_xml::Error),

    #[error("Failed to save filtered feed: {0}")]
    Write(#[from] WriteError),
}

impl From<ParseError> for RunError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MissingChannel => RunError::Structure,
            other => RunError::Parse(other),
        }
    }
}

/// Result of [`transform`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub xml: String,
    /// Episodes in the source feed.
    pub total: usize,
    /// Episodes written to the output.
    pub retained: usize,
    pub episode_artwork: ArtworkTally,
}

impl Transformed {
    pub fn removed(&self) -> usize {
        self.total - self.retained
    }
}

/// What a successful [`run_job`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub total: usize,
    pub retained: usize,
    pub episode_artwork: ArtworkTally,
}

/// Parses `feed`, keeps the episodes admitted by `rules`, and renders the
/// rebuilt document stamped with `built_at`.
///
/// The same input always yields byte-identical output for the same
/// `built_at`.
pub fn transform(feed: &[u8], rules: &Rules, built_at: DateTime<Utc>) -> Result<Transformed, RunError> {
    let parsed = parse_feed(feed)?;
    let total = parsed.episodes.len();

    let kept = retain(parsed.episodes, rules);
    let retained = kept.len();

    let document = build_at(&parsed.channel, &kept, &parsed.extension_namespace, built_at);
    let xml = render(&document.root)?;

    Ok(Transformed {
        xml,
        total,
        retained,
        episode_artwork: document.episode_artwork,
    })
}

/// Runs one filter job end to end.
///
/// The download goes to a `.download` file beside the output, which is
/// deleted whether the run succeeds or fails. The output is only replaced
/// once the new document has been fully rendered.
pub async fn run_job(
    client: &reqwest::Client,
    job: &FilterJob,
    policy: &FetchPolicy,
) -> Result<RunSummary, RunError> {
    if let Some(parent) = job.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| WriteError {
                action: "create directory",
                path: parent.to_path_buf(),
                source,
            })?;
    }
    let artifact = TempArtifact::beside(&job.output_path);

    tracing::info!(url = %job.source_url, "Downloading feed");
    let bytes_written = fetch_to_file(client, &job.source_url, artifact.path(), policy).await?;
    tracing::info!(bytes = bytes_written, "Download successful");

    let raw = tokio::fs::read(artifact.path())
        .await
        .map_err(FetchError::Io)?;

    let transformed = transform(&raw, &job.rules, Utc::now())?;
    tracing::info!(
        total = transformed.total,
        retained = transformed.retained,
        removed = transformed.removed(),
        "Filtering complete"
    );

    tracing::info!(path = %job.output_path.display(), "Saving filtered feed");
    write_atomic(&job.output_path, transformed.xml.as_bytes())?;
    tracing::info!(path = %job.output_path.display(), "File saved successfully");

    Ok(RunSummary {
        output_path: job.output_path.clone(),
        total: transformed.total,
        retained: transformed.retained,
        episode_artwork: transformed.episode_artwork,
    })
}
