//! Canonical image state
//!
//! Upstream steps may hand over `docker_tags` as a native string list or as a list of
//! arbitrary values, and `generated_data` as a string-keyed map or as loose key/value
//! entries. [`ImageState::from_artifact`] is the only place those shapes are
//! interpreted; everything after it works with plain typed fields.

use super::{Artifact, DOCKER_TAGS_KEY, GENERATED_DATA_KEY, StateMap, StateValue};
use std::collections::BTreeMap;

/// Key of the pushed digest inside generated data
pub const DIGEST_KEY: &str = "Digest";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageState {
    /// Additional names of the image, in upstream order
    pub docker_tags: Vec<String>,
    pub generated_data: BTreeMap<String, StateValue>,
}

impl ImageState {
    pub fn from_artifact(artifact: &dyn Artifact) -> Self {
        Self {
            docker_tags: artifact
                .state(DOCKER_TAGS_KEY)
                .map(normalize_tags)
                .unwrap_or_default(),
            generated_data: artifact
                .state(GENERATED_DATA_KEY)
                .map(normalize_generated_data)
                .unwrap_or_default(),
        }
    }

    /// Names to push: the primary id followed by every tag
    pub fn names(&self, primary: &str) -> Vec<String> {
        std::iter::once(primary.to_string())
            .chain(self.docker_tags.iter().cloned())
            .collect()
    }

    pub fn set_digest(&mut self, digest: impl Into<String>) {
        self.generated_data
            .insert(DIGEST_KEY.to_string(), StateValue::String(digest.into()));
    }

    pub fn into_state(self) -> StateMap {
        let mut state = StateMap::new();
        state.insert(
            DOCKER_TAGS_KEY.to_string(),
            StateValue::Strings(self.docker_tags),
        );
        state.insert(
            GENERATED_DATA_KEY.to_string(),
            StateValue::Map(self.generated_data),
        );
        state
    }
}

/// Elements that are not strings are dropped rather than rejected.
fn normalize_tags(value: &StateValue) -> Vec<String> {
    match value {
        StateValue::Strings(tags) => tags.clone(),
        StateValue::List(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn normalize_generated_data(value: &StateValue) -> BTreeMap<String, StateValue> {
    match value {
        StateValue::Map(map) => map.clone(),
        StateValue::Entries(entries) => entries
            .iter()
            .filter_map(|(key, value)| key.as_str().map(|k| (k.to_string(), value.clone())))
            .collect(),
        _ => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{DOCKER_IMPORT_BUILDER_ID, FileArtifact};

    fn artifact() -> FileArtifact {
        FileArtifact::new(DOCKER_IMPORT_BUILDER_ID, "myimage")
    }

    #[test]
    fn test_missing_state_is_empty() {
        let state = ImageState::from_artifact(&artifact());
        assert_eq!(state, ImageState::default());
        assert_eq!(state.names("myimage"), vec!["myimage"]);
    }

    #[test]
    fn test_native_tags_keep_order() {
        let input = artifact().with_state(
            DOCKER_TAGS_KEY,
            StateValue::Strings(vec!["v2".into(), "v1".into()]),
        );
        let state = ImageState::from_artifact(&input);
        assert_eq!(state.names("myimage"), vec!["myimage", "v2", "v1"]);
    }

    #[test]
    fn test_loose_tags_drop_non_strings() {
        let input = artifact().with_state(
            DOCKER_TAGS_KEY,
            StateValue::List(vec![
                StateValue::from("v1"),
                StateValue::Integer(7),
                StateValue::Null,
                StateValue::from("v2"),
            ]),
        );
        let state = ImageState::from_artifact(&input);
        assert_eq!(state.docker_tags, vec!["v1", "v2"]);
    }

    #[test]
    fn test_unexpected_tag_shape_is_ignored() {
        let input = artifact().with_state(DOCKER_TAGS_KEY, StateValue::from("v1"));
        assert!(ImageState::from_artifact(&input).docker_tags.is_empty());
    }

    #[test]
    fn test_loose_generated_data_keys_are_normalized() {
        let input = artifact().with_state(
            GENERATED_DATA_KEY,
            StateValue::Entries(vec![
                (StateValue::from("Foo"), StateValue::from("bar")),
                (StateValue::Integer(1), StateValue::from("dropped")),
            ]),
        );
        let state = ImageState::from_artifact(&input);

        assert_eq!(state.generated_data.len(), 1);
        assert_eq!(state.generated_data.get("Foo"), Some(&StateValue::from("bar")));
    }

    #[test]
    fn test_into_state_carries_digest_next_to_existing_data() {
        let mut data = BTreeMap::new();
        data.insert("Foo".to_string(), StateValue::from("bar"));
        let input = artifact()
            .with_state(GENERATED_DATA_KEY, StateValue::Map(data))
            .with_state(DOCKER_TAGS_KEY, StateValue::Strings(vec!["v1".into()]));

        let mut state = ImageState::from_artifact(&input);
        state.set_digest("myimage@sha256:0123");
        let output = state.into_state();

        assert_eq!(
            output.get(DOCKER_TAGS_KEY),
            Some(&StateValue::Strings(vec!["v1".into()]))
        );
        let Some(StateValue::Map(data)) = output.get(GENERATED_DATA_KEY) else {
            panic!("generated_data must be a map");
        };
        assert_eq!(data.get("Foo"), Some(&StateValue::from("bar")));
        assert_eq!(data.get(DIGEST_KEY), Some(&StateValue::from("myimage@sha256:0123")));
    }
}
