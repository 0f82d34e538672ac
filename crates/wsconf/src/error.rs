//
// error.rs
//
// Errors surfaced to direct callers of the configuration loader
//

use thiserror::Error;

/// Errors returned by [`crate::loader::ConfigLoader`].
///
/// Collaborator failures (listing, fetching, parsing) never show up here:
/// they degrade to missing content and are logged instead. Only misuse of
/// the loader itself is reported to the caller.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `get_configuration` (or a related read) ran before `initialize` completed.
    #[error("configuration has not been initialized")]
    NotInitialized,

    /// The loader was disposed; no further loads are applied.
    #[error("configuration loader has been disposed")]
    Disposed,

    /// The filesystem watcher could not be set up.
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: String,
        #[source]
        source: notify::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
