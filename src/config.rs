//! Configuration module for the push step
//!
//! Values arrive already decoded (from a JSON file, the command line, or both).
//! [`Config::prepare`] applies the defaults and the one cross-field rule.

use crate::error::{PushError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const DEFAULT_EXECUTABLE: &str = "docker";

pub const USERNAME_ENV: &str = "DOCKER_PUSH_USERNAME";
pub const PASSWORD_ENV: &str = "DOCKER_PUSH_PASSWORD";

/// AWS settings used to exchange credentials for an ECR login
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsAccessConfig {
    pub aws_access_key: String,
    pub aws_secret_key: String,
    pub aws_token: String,
    pub aws_profile: String,
}

impl AwsAccessConfig {
    pub fn has_static_credentials(&self) -> bool {
        !self.aws_access_key.is_empty() && !self.aws_secret_key.is_empty()
    }
}

impl fmt::Debug for AwsAccessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsAccessConfig")
            .field("aws_access_key", &self.aws_access_key)
            .field("aws_secret_key", &redact(&self.aws_secret_key))
            .field("aws_token", &redact(&self.aws_token))
            .field("aws_profile", &self.aws_profile)
            .finish()
    }
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "docker_path")]
    pub executable: String,
    pub login: bool,
    pub login_username: String,
    pub login_password: String,
    pub login_server: String,
    pub ecr_login: bool,
    pub platform: String,
    #[serde(flatten)]
    pub aws: AwsAccessConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Fill in missing login credentials from the environment
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn apply_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.login_username.is_empty() {
            if let Some(username) = lookup(USERNAME_ENV) {
                self.login_username = username;
            }
        }
        if self.login_password.is_empty() {
            if let Some(password) = lookup(PASSWORD_ENV) {
                self.login_password = password;
            }
        }
        self
    }

    pub fn prepare(&mut self) -> Result<()> {
        if self.executable.is_empty() {
            self.executable = DEFAULT_EXECUTABLE.to_string();
        }

        if self.ecr_login && self.login_server.is_empty() {
            return Err(PushError::Configuration(
                "ECR login requires login server to be provided.".to_string(),
            ));
        }

        Ok(())
    }

    pub fn wants_login(&self) -> bool {
        self.login || self.ecr_login
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("executable", &self.executable)
            .field("login", &self.login)
            .field("login_username", &self.login_username)
            .field("login_password", &redact(&self.login_password))
            .field("login_server", &self.login_server)
            .field("ecr_login", &self.ecr_login)
            .field("platform", &self.platform)
            .field("aws", &self.aws)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "<redacted>" }
}
