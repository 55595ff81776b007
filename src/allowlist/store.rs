use crate::error::{GateError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|]"#).unwrap());

const STORE_VERSION: u32 = 1;

/// Backing store of dynamically approved senders, keyed by channel class
#[async_trait]
pub trait AllowFromStore: Send + Sync {
    async fn read_allow_list(&self, channel_class: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllowFromFile {
    version: u32,
    #[serde(default)]
    allow_from: Vec<String>,
}

/// Reads `<dir>/<channel>-allowFrom.json`
#[derive(Debug, Clone)]
pub struct FileAllowFromStore {
    dir: PathBuf,
}

impl FileAllowFromStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, channel_class: &str) -> PathBuf {
        self.dir
            .join(format!("{}-allowFrom.json", safe_channel_key(channel_class)))
    }
}

#[async_trait]
impl AllowFromStore for FileAllowFromStore {
    async fn read_allow_list(&self, channel_class: &str) -> Result<Vec<String>> {
        let path = self.path_for(channel_class);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = ?path, "Allow-from store file missing, using empty list");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let file: AllowFromFile = serde_json::from_slice(&raw)?;
        if file.version != STORE_VERSION {
            return Err(GateError::Store(format!(
                "unsupported allow-from store version {} in {:?}",
                file.version, path
            )));
        }

        Ok(file.allow_from)
    }
}

fn safe_channel_key(channel_class: &str) -> String {
    let lower = channel_class.trim().to_lowercase();
    let replaced = UNSAFE_FILE_CHARS.replace_all(&lower, "_");
    replaced.replace("..", "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_allow_list(store: &FileAllowFromStore, channel_class: &str, allow_from: &[&str]) {
        tokio::fs::create_dir_all(store.dir()).await.unwrap();
        let body = serde_json::json!({ "version": STORE_VERSION, "allowFrom": allow_from });
        tokio::fs::write(store.path_for(channel_class), body.to_string())
            .await
            .unwrap();
    }

    #[test]
    fn test_safe_channel_key() {
        assert_eq!(safe_channel_key("Slack"), "slack");
        assert_eq!(safe_channel_key("../etc/passwd"), "__etc_passwd");
        assert_eq!(safe_channel_key("a:b*c"), "a_b_c");
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileAllowFromStore::new(dir.path());

        assert!(store.read_allow_list("slack").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_file_under_nested_dir() {
        let dir = TempDir::new().unwrap();
        let store = FileAllowFromStore::new(dir.path().join("credentials"));

        write_allow_list(&store, "slack", &["U1", "U2"]).await;

        assert!(store.path_for("slack").ends_with("slack-allowFrom.json"));
        assert_eq!(store.read_allow_list("slack").await.unwrap(), vec!["U1", "U2"]);
    }

    #[tokio::test]
    async fn test_reads_camel_case_file() {
        let dir = TempDir::new().unwrap();
        let store = FileAllowFromStore::new(dir.path());
        std::fs::write(
            store.path_for("slack"),
            r#"{ "version": 1, "allowFrom": ["U7"] }"#,
        )
        .unwrap();

        assert_eq!(store.read_allow_list("slack").await.unwrap(), vec!["U7"]);
    }

    #[tokio::test]
    async fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let store = FileAllowFromStore::new(dir.path());
        std::fs::write(store.path_for("slack"), "not json").unwrap();

        let err = store.read_allow_list("slack").await.unwrap_err();
        assert!(matches!(err, GateError::Serde(_)));
    }

    #[tokio::test]
    async fn test_unknown_version_is_error() {
        let dir = TempDir::new().unwrap();
        let store = FileAllowFromStore::new(dir.path());
        std::fs::write(
            store.path_for("slack"),
            r#"{ "version": 2, "allowFrom": [] }"#,
        )
        .unwrap();

        let err = store.read_allow_list("slack").await.unwrap_err();
        assert!(matches!(err, GateError::Store(_)));
    }
}
