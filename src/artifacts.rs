use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use url::Url;

use crate::timestamp;

/// Longest file name written, extension included.
pub const MAX_FILE_NAME_LEN: usize = 250;

const RESERVED: &[char] = &[':', '/', '?', '#', '&', '='];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Render,
    Content,
}

impl ArtifactKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            ArtifactKind::Render => "screenshots",
            ArtifactKind::Content => "html",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Render => ".png",
            ArtifactKind::Content => ".html",
        }
    }
}

/// Persists scan artifacts and returns where they were written.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save(&self, bytes: &[u8], target: &str, kind: ArtifactKind) -> Result<PathBuf>;
}

/// Writes artifacts under `<root>/screenshots` and `<root>/html`.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn dir_for(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn save(&self, bytes: &[u8], target: &str, kind: ArtifactKind) -> Result<PathBuf> {
        let dir = self.dir_for(kind);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let name = artifact_file_name(target, &timestamp::now_compact(), kind.extension());
        let path = dir.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Host component of `target` with reserved filesystem characters replaced by `_`.
///
/// Targets that do not parse as URLs fall back to the raw text without scheme
/// and trailing slash.
pub fn sanitize_host(target: &str) -> String {
    let host = Url::parse(target)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| {
            let t = target.strip_prefix("http://").unwrap_or(target);
            let t = t.strip_prefix("https://").unwrap_or(t);
            t.strip_suffix('/').unwrap_or(t).to_string()
        });
    host.replace(RESERVED, "_")
}

/// `<host>_<stamp><ext>`, with the stem cut so the whole name fits [`MAX_FILE_NAME_LEN`].
pub fn artifact_file_name(target: &str, stamp: &str, extension: &str) -> String {
    let mut stem = format!("{}_{}", sanitize_host(target), stamp);
    let max_stem = MAX_FILE_NAME_LEN.saturating_sub(extension.len());
    if stem.len() > max_stem {
        let mut cut = max_stem;
        while !stem.is_char_boundary(cut) {
            cut -= 1;
        }
        stem.truncate(cut);
    }
    stem.push_str(extension);
    stem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_has_no_reserved_chars() {
        let h = sanitize_host("https://example.onion:80/x?y=1");
        assert_eq!(h, "example.onion");
        assert!(!h.contains([':', '/', '?', '&', '=']));
    }

    #[test]
    fn unparseable_target_is_scrubbed() {
        let h = sanitize_host("example.onion:8080/a?b=c&d=e#f");
        assert_eq!(h, "example.onion_8080_a_b_c_d_e_f");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for t in ["https://example.onion:80/x?y=1", "a:b/c?d#e&f=g", "plain"] {
            let once = sanitize_host(t);
            assert_eq!(sanitize_host(&once), once);
        }
    }

    #[test]
    fn file_name_is_deterministic() {
        let a = artifact_file_name("http://abc.onion/", "20240101_000000", ".png");
        let b = artifact_file_name("http://abc.onion/", "20240101_000000", ".png");
        assert_eq!(a, b);
        assert_eq!(a, "abc.onion_20240101_000000.png");
    }

    #[test]
    fn long_names_are_truncated_before_extension() {
        let target = format!("{}.onion", "x".repeat(400));
        let name = artifact_file_name(&target, "20240101_000000", ".html");
        assert_eq!(name.len(), MAX_FILE_NAME_LEN);
        assert!(name.ends_with(".html"));
        assert!(!name.ends_with(".html.html"));
    }

    #[tokio::test]
    async fn fs_store_writes_under_kind_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(tmp.path());
        let path = store
            .save(b"<html/>", "http://abc.onion", ArtifactKind::Content)
            .await
            .unwrap();
        assert!(path.starts_with(tmp.path().join("html")));
        assert_eq!(std::fs::read(&path).unwrap(), b"<html/>");
    }

    #[tokio::test]
    async fn fs_store_reports_unwritable_root() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let store = FsArtifactStore::new(&blocker);
        assert!(store
            .save(b"png", "http://abc.onion", ArtifactKind::Render)
            .await
            .is_err());
    }
}
