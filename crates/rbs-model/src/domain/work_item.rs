use std::collections::HashMap;

use crate::{EntryFields, EntryId, ModelError};

pub const FIELD_GIT_HASH: &str = "git_hash";
pub const FIELD_BUILD_IMAGE: &str = "build_image";
pub const FIELD_RUN_IMAGE: &str = "run_image";
pub const FIELD_BUILD_ARTIFACTS: &str = "build_artifacts";

/// Artifact set assumed when an entry does not declare `build_artifacts`.
pub const DEFAULT_ARTIFACT: &str = "redis-server";

const METADATA_FIELDS: [&str; 4] = [
    FIELD_GIT_HASH,
    FIELD_BUILD_IMAGE,
    FIELD_RUN_IMAGE,
    FIELD_BUILD_ARTIFACTS,
];

/// A completed build announced on the build-events stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: EntryId,
    pub git_hash: String,
    pub build_image: String,
    /// Image the database sandbox runs in; the build image unless overridden.
    pub run_image: String,
    /// Declared artifact names, in delivery order.
    pub artifacts: Vec<String>,
    payloads: HashMap<String, Vec<u8>>,
}

impl WorkItem {
    /// Decode the binary field map of a stream entry.
    ///
    /// Only the metadata is validated here. A declared artifact without a
    /// payload is left for the materialization step to reject, since it fails
    /// a single run rather than the whole entry.
    pub fn decode(id: EntryId, mut fields: EntryFields) -> Result<Self, ModelError> {
        let git_hash = take_text(&mut fields, FIELD_GIT_HASH)?
            .ok_or(ModelError::MissingField(FIELD_GIT_HASH))?;
        let build_image = take_text(&mut fields, FIELD_BUILD_IMAGE)?
            .ok_or(ModelError::MissingField(FIELD_BUILD_IMAGE))?;
        let run_image = take_text(&mut fields, FIELD_RUN_IMAGE)?
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| build_image.clone());
        let artifacts = take_text(&mut fields, FIELD_BUILD_ARTIFACTS)?
            .map(|s| parse_artifact_list(&s))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_ARTIFACT.to_string()]);

        for key in METADATA_FIELDS {
            fields.remove(key);
        }

        Ok(Self {
            id,
            git_hash,
            build_image,
            run_image,
            artifacts,
            payloads: fields,
        })
    }

    /// Payload delivered for the artifact `name`, if any.
    pub fn payload(&self, name: &str) -> Option<&[u8]> {
        self.payloads.get(name).map(Vec::as_slice)
    }

    pub fn with_payload(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.payloads.insert(name.into(), data);
        self
    }
}

fn take_text(fields: &mut EntryFields, key: &'static str) -> Result<Option<String>, ModelError> {
    match fields.remove(key) {
        None => Ok(None),
        Some(raw) => String::from_utf8(raw)
            .map(|s| Some(s.trim().to_string()))
            .map_err(|e| ModelError::InvalidField {
                field: key,
                reason: e.to_string(),
            }),
    }
}

fn parse_artifact_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
