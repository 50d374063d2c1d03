use thiserror::Error;

/// Errors that may occur while fetching, storing or configuring the feed.
///
/// Parse and validation problems are not errors: they are reported per
/// record as [`crate::calendar::SkipReason`] and [`crate::calendar::Violation`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("upstream request could not complete: {0}")]
    Transport(String),

    #[error("upstream answered with status {status}")]
    FetchFailed { status: u16 },

    #[error("invalid feed url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid time '{0}'")]
    InvalidTime(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Fetch failures the engine recovers from with cached data.
    pub const fn is_upstream(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::FetchFailed { .. })
    }
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(status, _) => Self::FetchFailed { status },
            ureq::Error::Transport(transport) => Self::Transport(transport.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
