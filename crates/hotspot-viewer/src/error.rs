//! Error types for the viewer binary.
//!
//! [`AppError`] wraps every failure mode of startup and stream switching so
//! that `main` can propagate with `?`.

/// Top-level error for the viewer binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: hotspot_core::ConfigError,
    },

    /// The viewer context rejected an operation.
    #[error("viewer error: {source}")]
    Viewer {
        /// The underlying context error.
        #[from]
        source: hotspot_core::ViewerError,
    },

    /// The store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: hotspot_store::StoreError,
    },
}
