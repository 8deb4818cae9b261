//! Container engine drivers
//!
//! The push step never talks to a registry itself. Every registry operation is
//! delegated to a [`Driver`], normally the [`DockerDriver`] which shells out to the
//! docker executable.

pub mod docker;

pub use docker::DockerDriver;

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Driver: Send + Sync {
    /// Log in to `server`. Empty username/password are left out of the invocation.
    async fn login(&self, server: &str, username: &str, password: &str) -> Result<()>;

    async fn logout(&self, server: &str) -> Result<()>;

    /// Push `name`, restricted to `platform` when it is not empty
    async fn push(&self, name: &str, platform: &str) -> Result<()>;

    /// Repository digest of a local image
    async fn digest(&self, id: &str) -> Result<String>;

    async fn delete_image(&self, id: &str) -> Result<()>;
}
