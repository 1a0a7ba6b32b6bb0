use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use glob::Pattern;

use crate::constants::{FALLBACK_MIME, MEDIA_EXTENSIONS};
use crate::core::MediaFile;

/// Lists the media files directly inside one directory.
pub struct LocalIngestor {
    patterns: Vec<Pattern>,
}

impl Default for LocalIngestor {
    fn default() -> Self {
        Self::with_extensions(MEDIA_EXTENSIONS).expect("built-in extensions are valid patterns")
    }
}

impl LocalIngestor {
    pub fn with_extensions(extensions: &[&str]) -> Result<Self> {
        let patterns = extensions
            .iter()
            .map(|ext| {
                Pattern::new(&format!("*.{}", Pattern::escape(ext)))
                    .with_context(|| format!("invalid extension '{ext}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Non-recursive and case-sensitive; sorted so every run sees the same
    /// order.
    pub fn discover(&self, dir: &Path) -> Result<Vec<MediaFile>> {
        if !dir.is_dir() {
            bail!("{} is not a directory", dir.display());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
            let path = entry?.path();
            if path.is_file() && self.matches(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        paths.into_iter().map(media_file).collect()
    }

    fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.patterns.iter().any(|pattern| pattern.matches(name))
    }
}

fn media_file(path: PathBuf) -> Result<MediaFile> {
    let size_bytes = fs::metadata(&path)
        .with_context(|| format!("reading metadata for {}", path.display()))?
        .len();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mime = mime_guess::from_path(&path)
        .first_raw()
        .unwrap_or(FALLBACK_MIME)
        .to_string();
    Ok(MediaFile {
        path,
        name,
        size_bytes,
        mime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, bytes: &[u8]) {
        fs::write(dir.join(name), bytes).unwrap();
    }

    #[test]
    fn finds_supported_extensions_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.mov", b"12");
        touch(dir.path(), "a.mp4", b"1234");
        touch(dir.path(), "c.webm", b"");
        touch(dir.path(), "notes.txt", b"x");
        touch(dir.path(), "captions.json", b"[]");
        fs::create_dir(dir.path().join("nested.mp4")).unwrap();

        let found = LocalIngestor::default().discover(dir.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a.mp4", "b.mov", "c.webm"]);
        assert_eq!(found[0].size_bytes, 4);
        assert_eq!(found[0].mime, "video/mp4");
        assert_eq!(found[1].mime, "video/quicktime");
    }

    #[test]
    fn extension_match_is_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "LOUD.MP4", b"1");
        touch(dir.path(), "quiet.mp4", b"1");

        let found = LocalIngestor::default().discover(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "quiet.mp4");
    }

    #[test]
    fn unknown_mime_falls_back_to_video() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "clip.xyzvid", b"1");
        let ingestor = LocalIngestor::with_extensions(&["xyzvid"]).unwrap();
        let found = ingestor.discover(dir.path()).unwrap();
        assert_eq!(found[0].mime, FALLBACK_MIME);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalIngestor::default()
            .discover(&dir.path().join("absent"))
            .is_err());
    }
}
