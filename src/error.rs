use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// AIDEV-NOTE: The only error that reaches the user; everything else degrades locally
#[derive(Debug, Error)]
pub enum ToolInvocationError {
    #[error("failed to launch validator tool '{}': {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("permission denied to use the validator tool: {detail}")]
    PermissionDenied { detail: String },

    #[error("i/o error while talking to the validator tool: {0}")]
    Io(#[from] io::Error),

    #[error("validator tool did not finish within {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no bundled validator tool for platform '{0}'")]
    UnsupportedPlatform(String),

    #[error("could not determine the validator tool directory; pass --tool-dir or --tool")]
    MissingToolDir,
}
