//! Error handling module for the push step

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("{0}")]
    Configuration(String),

    #[error(
        "Unknown artifact type: {builder_id}\nCan only import from docker-import and docker-tag artifacts."
    )]
    UnknownArtifact { builder_id: String },

    #[error("Error creating temporary Docker configuration directory: {0}")]
    ScratchDir(#[source] std::io::Error),

    #[error("{0}")]
    Ecr(String),

    #[error("Error logging in to Docker: {0}")]
    Login(#[source] Box<PushError>),

    /// A docker invocation exited unsuccessfully
    #[error("`{command}` failed with exit code {exit_code}: {}", stderr.trim())]
    Command {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PushError>;
