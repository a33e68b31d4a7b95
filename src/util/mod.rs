//! Utility functions shared by the configuration and pipeline layers.
//!
//! - **URL validation**: source feed URLs must be absolute `http`/`https` URLs
//! - **Filesystem**: atomic output writes and self-removing download artifacts

mod fs;
mod url_validator;

pub use fs::{write_atomic, TempArtifact, WriteError};
pub use url_validator::{validate_source_url, UrlValidationError};
