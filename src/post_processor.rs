//! Push step of an image-build pipeline
//!
//! [`PostProcessor::post_process`] takes an image produced by the docker-import or
//! docker-tag steps, optionally logs in to the registry, pushes the image under its
//! id and every tag, and returns a new artifact carrying the pushed digest.
//!
//! Resources are released in reverse acquisition order on every exit path: the
//! registry session is closed first, then the scratch docker config directory is
//! removed. Release failures are reported through the [`Ui`] and never change the
//! outcome of the step.

use crate::artifact::{
    Artifact, DOCKER_IMPORT_BUILDER_ID, DOCKER_TAG_BUILDER_ID, ImageState, ImportArtifact,
};
use crate::config::Config;
use crate::driver::{DockerDriver, Driver};
use crate::ecr::{CredentialExchange, EcrCredentials};
use crate::error::{PushError, Result};
use crate::logging::Ui;
use std::ffi::OsString;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Builder id stamped on pushed artifacts
pub const BUILDER_ID: &str = DOCKER_IMPORT_BUILDER_ID;

/// Environment variable naming an externally managed docker config directory
pub const DOCKER_CONFIG_ENV: &str = "DOCKER_CONFIG";

/// Result of a successful push
#[derive(Debug)]
pub struct PostProcessOutput {
    pub artifact: ImportArtifact,
    /// The input artifact should be kept
    pub keep: bool,
    /// Whether `keep` must override the user's own choice
    pub force_override: bool,
}

pub struct PostProcessor {
    config: Config,
    driver: Option<Arc<dyn Driver>>,
    credentials: Option<Arc<dyn CredentialExchange>>,
    /// Value of `DOCKER_CONFIG` captured at configure time
    shared_config_dir: Option<OsString>,
}

impl PostProcessor {
    /// Validate the configuration and create the step
    pub fn configure(mut config: Config) -> Result<Self> {
        config.prepare()?;
        Ok(Self {
            config,
            driver: None,
            credentials: None,
            shared_config_dir: std::env::var_os(DOCKER_CONFIG_ENV),
        })
    }

    /// Override the externally managed docker config directory; `None` means a
    /// private scratch directory is created for each run
    pub fn with_shared_config_dir(mut self, dir: Option<OsString>) -> Self {
        self.shared_config_dir = dir;
        self
    }

    /// Use `driver` instead of running the docker executable
    pub fn with_driver(mut self, driver: Arc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Use `credentials` instead of calling ECR
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialExchange>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Push `artifact` and return the pushed image as a new artifact.
    ///
    /// Once login succeeded, logout runs on every exit path. If the returned future is
    /// dropped before completion, logout is spawned onto the current tokio runtime on a
    /// best-effort basis, and the scratch config directory is removed by its own drop.
    pub async fn post_process(
        &self,
        ui: &dyn Ui,
        artifact: &dyn Artifact,
    ) -> Result<PostProcessOutput> {
        let builder_id = artifact.builder_id();
        if builder_id != DOCKER_IMPORT_BUILDER_ID && builder_id != DOCKER_TAG_BUILDER_ID {
            return Err(PushError::UnknownArtifact {
                builder_id: builder_id.to_string(),
            });
        }

        let (driver, scratch) = match self.driver {
            Some(ref driver) => (Arc::clone(driver), None),
            None => {
                let scratch = scratch_config_dir(ui, self.shared_config_dir.clone())?;
                let mut docker = DockerDriver::new(&self.config.executable);
                if let Some(ref dir) = scratch {
                    docker = docker.with_config_dir(dir.path());
                }
                (Arc::new(docker) as Arc<dyn Driver>, scratch)
            }
        };

        let result = self.login_and_push(ui, driver, artifact).await;

        if let Some(dir) = scratch {
            remove_scratch_config_dir(ui, dir);
        }

        result
    }

    async fn login_and_push(
        &self,
        ui: &dyn Ui,
        driver: Arc<dyn Driver>,
        artifact: &dyn Artifact,
    ) -> Result<PostProcessOutput> {
        if !self.config.wants_login() {
            return push_artifact(ui, driver, artifact, &self.config.platform).await;
        }

        let server = self.config.login_server.as_str();
        let (username, password) = if self.config.ecr_login {
            ui.message("Fetching ECR credentials...");
            let credentials = self.credential_exchange().login_credentials(server).await?;
            (credentials.username, credentials.password)
        } else {
            (
                self.config.login_username.clone(),
                self.config.login_password.clone(),
            )
        };

        ui.message("Logging in...");
        driver
            .login(server, &username, &password)
            .await
            .map_err(|e| PushError::Login(Box::new(e)))?;

        let session = LoginSession::new(Arc::clone(&driver), server);
        let result = push_artifact(ui, driver, artifact, &self.config.platform).await;
        session.logout(ui).await;

        result
    }

    fn credential_exchange(&self) -> Arc<dyn CredentialExchange> {
        match self.credentials {
            Some(ref credentials) => Arc::clone(credentials),
            None => Arc::new(EcrCredentials::new(self.config.aws.clone())),
        }
    }
}

/// Push the artifact under every name, then record its digest
async fn push_artifact(
    ui: &dyn Ui,
    driver: Arc<dyn Driver>,
    artifact: &dyn Artifact,
    platform: &str,
) -> Result<PostProcessOutput> {
    let mut state = ImageState::from_artifact(artifact);
    let names = state.names(artifact.id());

    ui.say(&format!("Pushing {} name(s) to the registry", names.len()));
    for name in &names {
        ui.message(&format!("Pushing: {}", name));
        driver.push(name, platform).await?;
    }

    let digest = match driver.digest(artifact.id()).await {
        Ok(digest) => digest,
        Err(e) => {
            debug!("Digest lookup for {} failed: {}", artifact.id(), e);
            ui.message("Unable to determine digest for source image, ignoring it for now");
            String::new()
        }
    };
    state.set_digest(digest);

    let id = names.into_iter().next().unwrap_or_default();
    Ok(PostProcessOutput {
        artifact: ImportArtifact {
            builder_id: BUILDER_ID.to_string(),
            driver,
            id,
            state: state.into_state(),
        },
        keep: true,
        force_override: false,
    })
}

/// Open registry session. Dropping it without calling [`LoginSession::logout`]
/// spawns a background logout.
struct LoginSession {
    driver: Arc<dyn Driver>,
    server: String,
    active: bool,
}

impl LoginSession {
    fn new(driver: Arc<dyn Driver>, server: &str) -> Self {
        Self {
            driver,
            server: server.to_string(),
            active: true,
        }
    }

    async fn logout(mut self, ui: &dyn Ui) {
        self.active = false;
        ui.message("Logging out...");
        if let Err(e) = self.driver.logout(&self.server).await {
            ui.error(&format!("Error logging out: {}", e));
        }
    }
}

impl Drop for LoginSession {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available to log out of {}", self.server);
            return;
        };
        let driver = Arc::clone(&self.driver);
        let server = std::mem::take(&mut self.server);
        handle.spawn(async move {
            if let Err(e) = driver.logout(&server).await {
                warn!("Background logout of {} failed: {}", server, e);
            }
        });
    }
}

/// Create a private docker config directory unless `shared` names one already
pub(crate) fn scratch_config_dir(ui: &dyn Ui, shared: Option<OsString>) -> Result<Option<TempDir>> {
    if shared.is_some() {
        return Ok(None);
    }

    ui.message("Creating temporary Docker configuration directory");
    let dir = tempfile::Builder::new()
        .prefix("docker-push")
        .tempdir()
        .map_err(PushError::ScratchDir)?;
    debug!("Scratch docker config directory: {}", dir.path().display());
    Ok(Some(dir))
}

pub(crate) fn remove_scratch_config_dir(ui: &dyn Ui, dir: TempDir) {
    ui.message("Removing temporary Docker configuration directory");
    if let Err(e) = dir.close() {
        ui.error(&format!(
            "Error removing temporary Docker configuration directory: {}",
            e
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Messages(Mutex<Vec<String>>);

    impl Ui for Messages {
        fn message(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }

        fn say(&self, message: &str) {
            self.message(message);
        }

        fn error(&self, message: &str) {
            self.0.lock().unwrap().push(format!("error: {}", message));
        }
    }

    #[test]
    fn test_shared_config_dir_skips_scratch_dir() {
        let ui = Messages::default();
        let dir = scratch_config_dir(&ui, Some(OsString::from("/home/ci/.docker"))).unwrap();
        assert!(dir.is_none());
        assert!(ui.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_scratch_dir_is_created_and_removed() {
        let ui = Messages::default();
        let dir = scratch_config_dir(&ui, None).unwrap().unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());

        remove_scratch_config_dir(&ui, dir);
        assert!(!path.exists());
        assert_eq!(
            *ui.0.lock().unwrap(),
            vec![
                "Creating temporary Docker configuration directory",
                "Removing temporary Docker configuration directory",
            ]
        );
    }

    #[test]
    fn test_configure_rejects_ecr_without_server() {
        let config = Config {
            ecr_login: true,
            ..Default::default()
        };
        assert!(matches!(
            PostProcessor::configure(config),
            Err(PushError::Configuration(_))
        ));
    }
}
