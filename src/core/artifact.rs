//! Backup artifacts on disk.
//!
//! One live file per device: the name depends only on the device name and
//! address, so every run overwrites the previous file. History lives in the
//! database records, which keep the full content and its checksum.

use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;
use uuid::Uuid;

pub const ARTIFACT_EXTENSION: &str = "cfg";

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s/\\]").expect("static regex"));

fn sanitize(part: &str) -> String {
    UNSAFE_CHARS.replace_all(part.trim(), "_").into_owned()
}

/// `<name>_<address>.cfg` with whitespace and path separators replaced.
pub fn artifact_filename(device_name: &str, device_address: &str) -> String {
    format!(
        "{}_{}.{}",
        sanitize(device_name),
        sanitize(device_address),
        ARTIFACT_EXTENSION
    )
}

/// Hex BLAKE3 digest of an artifact body.
pub fn checksum(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Accumulates labeled per-command blocks in command order.
#[derive(Debug, Default)]
pub struct ArtifactBuilder {
    blocks: Vec<String>,
}

impl ArtifactBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&mut self, command: &str, output: &str) {
        self.blocks.push(format!("# Command: {}\n{}\n", command, output));
    }

    pub fn push_error(&mut self, command: &str, error: &str) {
        self.blocks
            .push(format!("# Command: {}\n[ERROR] {}\n", command, error));
    }

    pub fn finish(self) -> String {
        self.blocks.join("\n")
    }
}

/// Filesystem location where artifacts are written.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }

    /// Replace the artifact atomically: write a temp file, then rename over it.
    pub async fn write(&self, filename: &str, content: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create {}", self.root.display()))?;

        let target = self.path_for(filename);
        let staging = self
            .root
            .join(format!(".{}.{}.tmp", filename, Uuid::now_v7().simple()));

        tokio::fs::write(&staging, content)
            .await
            .with_context(|| format!("Failed to write {}", staging.display()))?;

        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e).with_context(|| format!("Failed to replace {}", target.display()));
        }

        debug!(path = %target.display(), bytes = content.len(), "Artifact written");
        Ok(target)
    }

    /// Read an artifact, `None` if it does not exist.
    pub async fn read(&self, filename: &str) -> Result<Option<String>> {
        match tokio::fs::read(self.path_for(filename)).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read artifact {}", filename)),
        }
    }

    /// Remove an artifact; a missing file is not an error.
    pub async fn remove(&self, filename: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(filename)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove artifact {}", filename)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn filename_is_deterministic_and_sanitized() {
        assert_eq!(
            artifact_filename("core switch/1", "10.0.0.1"),
            "core_switch_1_10.0.0.1.cfg"
        );
        assert_eq!(
            artifact_filename("lab\\edge  a", "192.168.1.2"),
            "lab_edge__a_192.168.1.2.cfg"
        );
        assert_eq!(
            artifact_filename("core switch/1", "10.0.0.1"),
            artifact_filename("core switch/1", "10.0.0.1")
        );
    }

    #[test]
    fn blocks_keep_command_order() {
        let mut builder = ArtifactBuilder::new();
        builder.push_output("show version", "IOS 15.2");
        builder.push_error("show clock", "channel closed");
        builder.push_output("show running-config", "hostname edge");

        let text = builder.finish();
        let version = text.find("# Command: show version").unwrap();
        let clock = text.find("# Command: show clock").unwrap();
        let running = text.find("# Command: show running-config").unwrap();

        assert!(version < clock && clock < running);
        assert!(text.contains("[ERROR] channel closed"));
        assert!(text.find("IOS 15.2").unwrap() > version);
    }

    #[test]
    fn checksum_is_stable() {
        assert_eq!(checksum("hostname edge"), checksum("hostname edge"));
        assert_ne!(checksum("hostname edge"), checksum("hostname core"));
        assert_eq!(checksum("").len(), 64);
    }

    #[tokio::test]
    async fn write_overwrites_previous_artifact() {
        let temp = tempdir().unwrap();
        let store = ArtifactStore::new(temp.path().join("backups"));

        store.write("edge_10.0.0.1.cfg", "first").await.unwrap();
        store.write("edge_10.0.0.1.cfg", "second").await.unwrap();

        let content = store.read("edge_10.0.0.1.cfg").await.unwrap();
        assert_eq!(content.as_deref(), Some("second"));

        // No staging files are left behind
        let entries: Vec<_> = std::fs::read_dir(store.root()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn read_and_remove_missing_artifact() {
        let temp = tempdir().unwrap();
        let store = ArtifactStore::new(temp.path());

        assert!(store.read("missing.cfg").await.unwrap().is_none());
        assert!(store.remove("missing.cfg").await.is_ok());
    }
}
