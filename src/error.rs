//! Error taxonomy shared by every pipeline stage.

use std::fmt::Display;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid settings; fatal at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every video provider failed for this cycle
    #[error("generation failed: {0}")]
    Generation(String),

    /// Narration synthesis or muxing failed
    #[error("processing failed: {0}")]
    Processing(String),

    /// Concatenation of queued clips failed
    #[error("compilation failed: {0}")]
    Compilation(String),

    /// Upload to a single hosting account failed
    #[error("upload to {account} failed: {message}")]
    Upload { account: String, message: String },

    /// Local filesystem failure (disk full, permissions)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn configuration(msg: impl Display) -> Self {
        Error::Configuration(msg.to_string())
    }

    pub fn generation(err: impl Display) -> Self {
        Error::Generation(format!("{:#}", err))
    }

    pub fn processing(err: impl Display) -> Self {
        Error::Processing(format!("{:#}", err))
    }

    pub fn compilation(err: impl Display) -> Self {
        Error::Compilation(format!("{:#}", err))
    }

    pub fn upload(account: impl Into<String>, err: impl Display) -> Self {
        Error::Upload {
            account: account.into(),
            message: format!("{:#}", err),
        }
    }

    /// Recoverable errors skip the current cycle; the rest end the process.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Generation(_) | Error::Processing(_) | Error::Compilation(_) | Error::Upload { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_splits_fatal_from_recoverable() {
        assert!(!Error::configuration("VIDEO_PROVIDERS is empty").is_recoverable());
        assert!(!Error::Io(std::io::Error::other("disk full")).is_recoverable());
        assert!(Error::generation("fal: HTTP 429").is_recoverable());
        assert!(Error::processing("ffmpeg exited 1").is_recoverable());
        assert!(Error::compilation("codec mismatch").is_recoverable());
        assert!(Error::upload("account_2", "quota exceeded").is_recoverable());
    }

    #[test]
    fn upload_error_names_the_account() {
        let err = Error::upload("account_3", anyhow::anyhow!("HTTP 401"));
        assert_eq!(err.to_string(), "upload to account_3 failed: HTTP 401");
    }
}
