//! Build artifacts delivered inline with a work item, written into a run's
//! working directory.
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    os::unix::fs::{OpenOptionsExt, PermissionsExt},
    path::{Path, PathBuf},
};

use rbs_model::WorkItem;
use thiserror::Error;
use tracing::debug;

const EXECUTABLE_MODE: u32 = 0o755;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("artifact {0:?} declared but not delivered")]
    Missing(String),
    #[error("invalid artifact name {0:?}")]
    InvalidName(String),
    #[error("failed to write artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Write every declared artifact into `dir` as an executable file named after it.
///
/// All names are checked before anything is written, so a missing payload
/// leaves `dir` untouched.
pub fn materialize(
    item: &WorkItem,
    names: &[String],
    dir: &Path,
) -> Result<BTreeMap<String, PathBuf>, ArtifactError> {
    let mut payloads = Vec::with_capacity(names.len());
    for name in names {
        if !is_plain_file_name(name) {
            return Err(ArtifactError::InvalidName(name.clone()));
        }
        let data = item
            .payload(name)
            .ok_or_else(|| ArtifactError::Missing(name.clone()))?;
        payloads.push((name, data));
    }

    let mut written = BTreeMap::new();
    for (name, data) in payloads {
        let path = dir.join(name);
        write_executable(&path, data).map_err(|source| ArtifactError::Write {
            path: path.clone(),
            source,
        })?;
        debug!(
            target: "rbs.core.artifact",
            artifact = %name,
            bytes = data.len(),
            path = %path.display(),
            "artifact materialized"
        );
        written.insert(name.clone(), path);
    }
    Ok(written)
}

fn write_executable(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(EXECUTABLE_MODE)
        .open(path)?;
    file.write_all(data)?;
    file.flush()?;
    // `mode` is filtered by the umask; set the bits explicitly.
    fs::set_permissions(path, fs::Permissions::from_mode(EXECUTABLE_MODE))
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbs_model::{EntryFields, EntryId, FIELD_BUILD_IMAGE, FIELD_GIT_HASH};

    fn item(payloads: &[(&str, &[u8])]) -> WorkItem {
        let mut fields = EntryFields::new();
        fields.insert(FIELD_GIT_HASH.into(), b"abc123".to_vec());
        fields.insert(FIELD_BUILD_IMAGE.into(), b"gcc:8.5".to_vec());
        let mut item = WorkItem::decode(EntryId::new(1, 0), fields).unwrap();
        for (name, data) in payloads {
            item = item.with_payload(*name, data.to_vec());
        }
        item
    }

    #[test]
    fn writes_executable_copies() {
        let dir = tempfile::tempdir().unwrap();
        let item = item(&[("redis-server", b"\x7fELFserver"), ("redis-cli", b"cli")]);
        let names = vec!["redis-server".to_string(), "redis-cli".to_string()];

        let written = materialize(&item, &names, dir.path()).unwrap();

        assert_eq!(written.len(), 2);
        let server = &written["redis-server"];
        assert_eq!(fs::read(server).unwrap(), b"\x7fELFserver");
        let mode = fs::metadata(server).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn missing_payload_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let item = item(&[("redis-server", b"bin")]);
        let names = vec!["redis-server".to_string(), "redis-cli".to_string()];

        let err = materialize(&item, &names, dir.path()).unwrap_err();

        assert!(matches!(err, ArtifactError::Missing(ref n) if n == "redis-cli"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let item = item(&[("../evil", b"x")]);

        let err = materialize(&item, &["../evil".to_string()], dir.path()).unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidName(_)));
    }
}
