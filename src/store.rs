use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct CaptionRecord {
    #[serde(default)]
    media_path: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

/// On-disk `file name -> caption` map. Every key was captioned
/// successfully; anything absent is still eligible.
#[derive(Debug)]
pub struct CaptionStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl CaptionStore {
    /// A missing store starts empty. One that cannot be read or parsed is
    /// moved aside first so the next save cannot clobber it; if that move
    /// fails the load fails.
    pub fn load(path: &Path) -> Result<Self> {
        let entries = match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Vec<CaptionRecord>>(&text) {
                Ok(records) => records
                    .into_iter()
                    .filter_map(|r| Some((r.media_path?, r.caption.unwrap_or_default())))
                    .collect(),
                Err(err) => {
                    move_aside(path, &format!("not valid JSON ({err})"))?;
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                move_aside(path, &format!("unreadable ({err})"))?;
                BTreeMap::new()
            }
        };
        debug!(store = %path.display(), entries = entries.len(), "caption store loaded");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Inserts (last write wins) and rewrites the whole store.
    pub fn record(&mut self, name: &str, caption: String) -> Result<()> {
        self.entries.insert(name.to_string(), caption);
        self.save()
    }

    /// Writes to a sibling temp file and renames it over the store.
    pub fn save(&self) -> Result<()> {
        let records: Vec<CaptionRecord> = self
            .entries
            .iter()
            .map(|(name, caption)| CaptionRecord {
                media_path: Some(name.clone()),
                caption: Some(caption.clone()),
            })
            .collect();
        let json = serde_json::to_string_pretty(&records)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

fn move_aside(path: &Path, problem: &str) -> Result<()> {
    let aside = corrupt_path(path);
    warn!(
        store = %path.display(),
        moved_to = %aside.display(),
        "caption store is {problem}; starting empty"
    );
    fs::rename(path, &aside).with_context(|| {
        format!(
            "caption store {} is {problem} and could not be moved to {}",
            path.display(),
            aside.display()
        )
    })
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}
