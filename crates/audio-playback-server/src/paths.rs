//! Sandboxed filename resolution and file listing under the root directory.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use audio_playback_types::{FileEntry, FileListing};
use walkdir::WalkDir;

use crate::error::PlaybackError;

/// A filename that passed the sandbox checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Normalized root-relative form, as shown to callers.
    pub relative: String,
    /// Canonical absolute path inside the root.
    pub absolute: PathBuf,
}

/// Resolves client filenames against a canonical root directory.
#[derive(Clone, Debug)]
pub struct PathResolver {
    root: PathBuf,
    default_format: String,
    max_depth: usize,
}

impl PathResolver {
    /// Build a resolver; the root is canonicalized here once.
    pub fn new(root: &Path, default_format: &str, max_depth: usize) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("canonicalize root {:?}", root))?;
        if !root.is_dir() {
            return Err(anyhow::anyhow!("root is not a directory: {:?}", root));
        }
        std::fs::read_dir(&root).with_context(|| format!("read_dir {:?}", root))?;
        Ok(Self {
            root,
            default_format: default_format.trim_start_matches('.').to_ascii_lowercase(),
            max_depth: max_depth.max(1),
        })
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `filename` to a canonical path inside the root.
    ///
    /// Missing extensions get the default format appended. Absolute paths and
    /// `..` components are refused before the filesystem is consulted; the
    /// canonical result (symlinks resolved) must still sit under the root.
    pub fn resolve(&self, filename: &str) -> Result<ResolvedPath, PlaybackError> {
        let trimmed = filename.trim();
        if trimmed.is_empty() {
            return Err(PlaybackError::MissingParameter("filename"));
        }

        let mut relative = PathBuf::from(trimmed);
        if relative.is_absolute() || relative.has_root() {
            return Err(PlaybackError::InvalidPath(
                "Filename must be a relative path under AUDIO_ROOT_DIR.".to_string(),
            ));
        }
        let escapes = relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir));
        if escapes {
            return Err(PlaybackError::InvalidPath(
                "Filename must remain inside AUDIO_ROOT_DIR.".to_string(),
            ));
        }
        if relative.extension().is_none() {
            relative.set_extension(&self.default_format);
        }

        let shown = to_slash(&relative);
        let canonical = self.root.join(&relative).canonicalize().map_err(|_| {
            PlaybackError::NotFound(format!("File '{shown}' not found under AUDIO_ROOT_DIR."))
        })?;
        if !is_within(&self.root, &canonical) {
            tracing::warn!(
                filename = %shown,
                resolved = %canonical.display(),
                "rejected path outside root"
            );
            return Err(PlaybackError::InvalidPath(
                "Filename must remain inside AUDIO_ROOT_DIR.".to_string(),
            ));
        }
        if !canonical.is_file() {
            return Err(PlaybackError::NotFound(format!(
                "'{shown}' is not a file under AUDIO_ROOT_DIR."
            )));
        }

        Ok(ResolvedPath {
            relative: shown,
            absolute: canonical,
        })
    }

    /// List eligible audio files under the root in lexicographic order.
    ///
    /// `count` is the number of eligible files found; `files` is capped at
    /// `limit`. Symlinks are not followed, so nothing outside the root shows up.
    pub fn list(&self, limit: usize) -> FileListing {
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(self.max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.is_eligible(entry.path()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(FileEntry {
                filename: to_slash(rel),
                size_bytes,
            });
        }
        files.sort_by(|a, b| a.filename.cmp(&b.filename));

        let count = files.len();
        files.truncate(limit);
        FileListing {
            root_dir: self.root.display().to_string(),
            count,
            limit,
            files,
        }
    }

    fn is_eligible(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or("")
            .to_ascii_lowercase();
        is_supported_extension(&ext) || (!ext.is_empty() && ext == self.default_format)
    }
}

fn is_supported_extension(ext: &str) -> bool {
    matches!(
        ext,
        "flac" | "wav" | "aiff" | "aif" | "mp3" | "m4a" | "aac" | "alac" | "ogg" | "oga" | "opus"
    )
}

fn is_hidden(name: &OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

/// Component-wise containment; `root-evil/x` is not inside `root`.
fn is_within(root: &Path, candidate: &Path) -> bool {
    candidate == root || candidate.starts_with(root)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(files: &[&str]) -> (tempfile::TempDir, PathResolver) {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"RIFF").unwrap();
        }
        let resolver = PathResolver::new(dir.path(), "wav", 8).unwrap();
        (dir, resolver)
    }

    #[test]
    fn appends_default_format_when_extension_missing() {
        let (_dir, resolver) = fixture(&["song.wav"]);
        let resolved = resolver.resolve("song").unwrap();
        assert_eq!(resolved.relative, "song.wav");
        assert!(resolved.absolute.ends_with("song.wav"));
        assert!(resolved.absolute.starts_with(resolver.root()));
    }

    #[test]
    fn keeps_explicit_extension_and_subdirectories() {
        let (_dir, resolver) = fixture(&["voices/hello.mp3"]);
        let resolved = resolver.resolve("  voices/hello.mp3 ").unwrap();
        assert_eq!(resolved.relative, "voices/hello.mp3");
    }

    #[test]
    fn rejects_parent_traversal_and_absolute_paths() {
        let (_dir, resolver) = fixture(&["song.wav"]);
        for name in ["../secret.wav", "../../etc/passwd", "a/../song.wav", "/etc/passwd"] {
            let err = resolver.resolve(name).unwrap_err();
            assert!(matches!(err, PlaybackError::InvalidPath(_)), "{name}: {err:?}");
        }
    }

    #[test]
    fn blank_filename_is_missing_parameter() {
        let (_dir, resolver) = fixture(&[]);
        assert_eq!(
            resolver.resolve("   ").unwrap_err(),
            PlaybackError::MissingParameter("filename")
        );
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_dir, resolver) = fixture(&["song.wav"]);
        let err = resolver.resolve("other").unwrap_err();
        assert_eq!(
            err,
            PlaybackError::NotFound("File 'other.wav' not found under AUDIO_ROOT_DIR.".to_string())
        );
    }

    #[test]
    fn directory_is_not_a_playable_file() {
        let (_dir, resolver) = fixture(&["album.wav/track.wav"]);
        let err = resolver.resolve("album.wav").unwrap_err();
        assert!(matches!(err, PlaybackError::NotFound(_)));
    }

    #[test]
    fn sibling_with_shared_prefix_is_outside() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("root");
        let evil = parent.path().join("root-evil");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&evil).unwrap();
        std::fs::write(evil.join("file.wav"), b"x").unwrap();

        let root = root.canonicalize().unwrap();
        let evil_file = evil.canonicalize().unwrap().join("file.wav");
        assert!(!is_within(&root, &evil_file));
        assert!(is_within(&root, &root.join("file.wav")));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.wav"), b"x").unwrap();
        let (dir, resolver) = fixture(&[]);
        std::os::unix::fs::symlink(
            outside.path().join("secret.wav"),
            dir.path().join("link.wav"),
        )
        .unwrap();

        let err = resolver.resolve("link").unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidPath(_)));
        assert_eq!(resolver.list(10).count, 0);
    }

    #[test]
    fn list_caps_entries_but_counts_all() {
        let (_dir, resolver) = fixture(&["e.wav", "d.mp3", "c.flac", "b/a.ogg", "a.wav"]);
        let listing = resolver.list(1);
        assert_eq!(listing.count, 5);
        assert_eq!(listing.limit, 1);
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].filename, "a.wav");
        assert_eq!(listing.files[0].size_bytes, 4);
    }

    #[test]
    fn list_is_sorted_and_skips_ineligible_and_hidden() {
        let (_dir, resolver) = fixture(&[
            "notes.txt",
            ".hidden.wav",
            ".cache/x.wav",
            "z.wav",
            "b/a.mp3",
        ]);
        let names: Vec<_> = resolver
            .list(200)
            .files
            .into_iter()
            .map(|f| f.filename)
            .collect();
        assert_eq!(names, vec!["b/a.mp3".to_string(), "z.wav".to_string()]);
    }

    #[test]
    fn list_respects_depth_bound() {
        let dir = tempfile::tempdir().unwrap();
        let deep = dir.path().join("a/b/c");
        std::fs::create_dir_all(&deep).unwrap();
        std::fs::write(deep.join("deep.wav"), b"x").unwrap();
        std::fs::write(dir.path().join("top.wav"), b"x").unwrap();

        let resolver = PathResolver::new(dir.path(), "wav", 2).unwrap();
        let listing = resolver.list(10);
        assert_eq!(listing.count, 1);
        assert_eq!(listing.files[0].filename, "top.wav");
    }

    #[test]
    fn default_format_counts_as_eligible() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.raw"), b"x").unwrap();
        let resolver = PathResolver::new(dir.path(), ".raw", 8).unwrap();
        assert_eq!(resolver.list(10).count, 1);
        assert_eq!(resolver.resolve("clip").unwrap().relative, "clip.raw");
    }
}
