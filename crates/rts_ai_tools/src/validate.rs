//! Tuning file validation.

use std::path::{Path, PathBuf};

use rts_ai::config::AiTuning;
use rts_ai::error::AiError;
use thiserror::Error;

/// Why a tuning file was rejected.
#[derive(Debug, Error)]
pub enum ValidateError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file parsed but holds bad values, or did not parse.
    #[error(transparent)]
    Tuning(#[from] AiError),
}

/// Load and check a RON tuning file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse, or holds
/// values the machines cannot run with.
pub fn validate_tuning_file(path: &Path) -> Result<AiTuning, ValidateError> {
    let source = std::fs::read_to_string(path).map_err(|source| ValidateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let tuning = AiTuning::from_ron_str(&source, &path.display().to_string())?;
    tracing::debug!(path = %path.display(), "tuning file accepted");
    Ok(tuning)
}
