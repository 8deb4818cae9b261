//! Docker Push Library
//!
//! Pipeline step that logs in to a container registry (directly or through an ECR
//! credential exchange), pushes a built image under all of its names, and records the
//! resulting digest in a new artifact.

pub mod artifact;
pub mod cli;
pub mod config;
pub mod driver;
pub mod ecr;
pub mod error;
pub mod logging;
pub mod post_processor;

pub use artifact::{Artifact, FileArtifact, ImageState, ImportArtifact, StateValue};
pub use config::{AwsAccessConfig, Config};
pub use driver::{DockerDriver, Driver};
pub use ecr::{CredentialExchange, EcrCredentials, RegistryCredentials};
pub use error::{PushError, Result};
pub use logging::{Logger, Ui};
pub use post_processor::{BUILDER_ID, PostProcessOutput, PostProcessor};
