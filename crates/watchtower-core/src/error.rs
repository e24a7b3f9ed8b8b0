//! Error taxonomy shared by every Watchtower crate.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, WatchtowerError>;

/// Everything that can go wrong while observing, recording or notifying.
///
/// `Fetch` and `Extraction` end up as `error` runs in the history; they never
/// reach the scheduler driver. `Persistence` aborts the current run only.
/// `Notification` is per channel and only affects the run's notified flag.
#[derive(Debug, thiserror::Error)]
pub enum WatchtowerError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid watcher: {0}")]
    InvalidWatcher(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatchtowerError {
    /// Short machine-friendly name of the variant, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Extraction(_) => "extraction",
            Self::Persistence(_) => "persistence",
            Self::Notification(_) => "notification",
            Self::Config(_) => "config",
            Self::InvalidWatcher(_) => "invalid_watcher",
            Self::Io(_) => "io",
        }
    }
}
