//! Build artifacts passed between pipeline steps
//!
//! An artifact is identified by the id of the step that produced it (its builder id),
//! a primary id, and an open-ended map of named state. State values cross process and
//! serialization boundaries, so they are carried as loosely-typed [`StateValue`]s and
//! normalised once, on ingress, by [`state::ImageState`].

pub mod state;

pub use state::ImageState;

use crate::driver::Driver;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builder id of artifacts produced by the docker-import step
pub const DOCKER_IMPORT_BUILDER_ID: &str = "packer.post-processor.docker-import";

/// Builder id of artifacts produced by the docker-tag step
pub const DOCKER_TAG_BUILDER_ID: &str = "packer.post-processor.docker-tag";

pub const DOCKER_TAGS_KEY: &str = "docker_tags";
pub const GENERATED_DATA_KEY: &str = "generated_data";

pub type StateMap = BTreeMap<String, StateValue>;

/// Loosely-typed state value as it arrives from an upstream step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Null,
    Bool(bool),
    Integer(i64),
    /// Integers beyond `i64::MAX`
    UInteger(u64),
    Float(f64),
    String(String),
    /// Native list of strings
    Strings(Vec<String>),
    /// List whose elements lost their static type
    List(Vec<StateValue>),
    Map(BTreeMap<String, StateValue>),
    /// Map whose keys lost their static type
    Entries(Vec<(StateValue, StateValue)>),
}

impl StateValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::String(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::String(value)
    }
}

#[async_trait]
pub trait Artifact: Send + Sync {
    /// Id of the step that produced this artifact
    fn builder_id(&self) -> &str;

    fn id(&self) -> &str;

    fn state(&self, key: &str) -> Option<&StateValue>;

    fn files(&self) -> &[PathBuf] {
        &[]
    }

    fn description(&self) -> String;

    /// Remove whatever the artifact refers to
    async fn destroy(&self) -> Result<()>;
}

/// Artifact record as written to and read from disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileArtifact {
    pub builder_id: String,
    pub id: String,
    #[serde(default)]
    pub state: StateMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathBuf>,
}

impl FileArtifact {
    pub fn new(builder_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            builder_id: builder_id.into(),
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, key: impl Into<String>, value: StateValue) -> Self {
        self.state.insert(key.into(), value);
        self
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

#[async_trait]
impl Artifact for FileArtifact {
    fn builder_id(&self) -> &str {
        &self.builder_id
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self, key: &str) -> Option<&StateValue> {
        self.state.get(key)
    }

    fn files(&self) -> &[PathBuf] {
        &self.files
    }

    fn description(&self) -> String {
        format!("Docker image: {}", self.id)
    }

    // A record on disk owns nothing that needs removing
    async fn destroy(&self) -> Result<()> {
        Ok(())
    }
}

/// An image that lives in the engine the driver talks to
pub struct ImportArtifact {
    pub builder_id: String,
    pub driver: Arc<dyn Driver>,
    pub id: String,
    pub state: StateMap,
}

impl ImportArtifact {
    pub fn to_record(&self) -> FileArtifact {
        FileArtifact {
            builder_id: self.builder_id.clone(),
            id: self.id.clone(),
            state: self.state.clone(),
            files: Vec::new(),
        }
    }
}

impl fmt::Debug for ImportArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportArtifact")
            .field("builder_id", &self.builder_id)
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Artifact for ImportArtifact {
    fn builder_id(&self) -> &str {
        &self.builder_id
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self, key: &str) -> Option<&StateValue> {
        self.state.get(key)
    }

    fn description(&self) -> String {
        format!("Imported Docker image: {}", self.id)
    }

    async fn destroy(&self) -> Result<()> {
        self.driver.delete_image(&self.id).await
    }
}
