//! Monitored database targets and the config file that lists them.

use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::ConfigError;

/// One monitored database server.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Target {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// On-disk layout of the targets file.
#[derive(Debug, Deserialize)]
struct TargetsFile {
    databases: Vec<Target>,
}

/// Something that yields the current list of targets.
///
/// The scheduler calls `load` once per poll cycle, so implementations may
/// pick up changes between cycles.
pub trait TargetSource: Send + Sync + 'static {
    fn load(&self) -> Result<Vec<Target>, ConfigError>;
}

/// Targets read from a JSON file on every load.
#[derive(Debug, Clone)]
pub struct FileTargetSource {
    path: PathBuf,
}

impl FileTargetSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl TargetSource for FileTargetSource {
    fn load(&self) -> Result<Vec<Target>, ConfigError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;
        let file: TargetsFile =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?;
        validate_targets(file.databases)
    }
}

/// Reject target lists the store could not key unambiguously.
fn validate_targets(targets: Vec<Target>) -> Result<Vec<Target>, ConfigError> {
    let mut seen = HashSet::new();
    for target in &targets {
        if target.name.trim().is_empty() {
            return Err(ConfigError::EmptyTargetName);
        }
        if !seen.insert(target.name.as_str()) {
            return Err(ConfigError::DuplicateTarget(target.name.clone()));
        }
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio_test::{assert_err, assert_ok};

    const TWO_DATABASES: &str = r#"{
        "databases": [
            {"name": "db1", "host": "10.0.0.1", "port": 3306, "username": "monitor", "password": "s3cret"},
            {"name": "db2", "host": "10.0.0.2", "port": 3307, "username": "monitor"}
        ]
    }"#;

    fn write_config(doc: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(doc.as_bytes()).unwrap();
        file
    }

    fn load(doc: &str) -> Result<Vec<Target>, ConfigError> {
        let file = write_config(doc);
        FileTargetSource::new(file.path()).load()
    }

    #[test]
    fn test_load_from_file() {
        let targets = assert_ok!(load(TWO_DATABASES));

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name, "db1");
        assert_eq!(targets[0].password, "s3cret");
        assert_eq!(targets[1].port, 3307);
        assert_eq!(targets[1].password, "");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let doc = r#"{"databases": [
            {"name": "a", "host": "h1", "port": 1, "username": "u"},
            {"name": "a", "host": "h2", "port": 2, "username": "u"}
        ]}"#;

        match load(doc) {
            Err(ConfigError::DuplicateTarget(name)) => assert_eq!(name, "a"),
            other => panic!("expected duplicate error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        let doc = r#"{"databases": [{"name": " ", "host": "h", "port": 1, "username": "u"}]}"#;
        assert!(matches!(load(doc), Err(ConfigError::EmptyTargetName)));
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let file = write_config("{\"databases\": [");

        match FileTargetSource::new(file.path()).load() {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = assert_err!(FileTargetSource::new("/nonexistent/tsadmin.json").load());
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_debug_hides_password() {
        let targets = load(TWO_DATABASES).unwrap();
        let debug = format!("{:?}", targets[0]);
        assert!(!debug.contains("s3cret"));
    }
}
