//! CLI error types.

use ssi_config::ConfigError;
use ssi_engine::{RenderError, UnknownEncoding};

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Encoding(#[from] UnknownEncoding),

    #[error("{0}")]
    Render(#[from] RenderError),
}
