//! Story sources and baseline stores.
//!
//! A [`StorySource`] enumerates the screenshots to check; a
//! [`BaselineStore`] holds the approved references. Both are traits so the
//! runner can work against directories in production and an in-memory
//! store in tests.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, VdcError};
use crate::screenshot::{Screenshot, ScreenshotError};

/// Supplies the current screenshots for a run.
pub trait StorySource: Send + Sync {
    /// Story ids in deterministic order.
    fn stories(&self) -> Result<Vec<String>>;
    fn load(&self, story: &str) -> Result<Screenshot>;
}

/// Result of looking a story up in a baseline store.
#[derive(Debug)]
pub enum BaselineLookup {
    Found {
        screenshot: Screenshot,
        /// Opaque revision marker, when the store tracks one.
        revision: Option<String>,
    },
    /// No baseline stored yet; the story is on its first run.
    Missing,
    /// Something is stored but cannot be decoded.
    Corrupt { detail: String },
}

/// Holds approved baseline screenshots keyed by story id.
pub trait BaselineStore: Send + Sync {
    fn get(&self, story: &str) -> Result<BaselineLookup>;
    fn put(&self, story: &str, screenshot: &Screenshot) -> Result<()>;
}

/// Story source over a directory tree of PNGs.
///
/// The story id is the path relative to the root without the extension,
/// with `/` separators (`buttons/primary.png` -> `buttons/primary`).
#[derive(Debug)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Result<DirSource> {
        let root = root.into();
        if !root.is_dir() {
            return Err(VdcError::Config(format!(
                "screenshot directory not found: {}",
                root.display()
            )));
        }
        Ok(DirSource { root })
    }

    fn path_for(&self, story: &str) -> PathBuf {
        self.root.join(format!("{story}.png"))
    }
}

impl StorySource for DirSource {
    fn stories(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        collect_pngs(&self.root, &mut files)?;
        let mut ids: Vec<String> = files
            .iter()
            .filter_map(|p| story_id(&self.root, p))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn load(&self, story: &str) -> Result<Screenshot> {
        Ok(Screenshot::load(&self.path_for(story))?)
    }
}

/// File-backed baseline store, one PNG per story under a root directory.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> DirStore {
        DirStore { root: root.into() }
    }

    fn path_for(&self, story: &str) -> PathBuf {
        self.root.join(format!("{story}.png"))
    }
}

impl BaselineStore for DirStore {
    fn get(&self, story: &str) -> Result<BaselineLookup> {
        let path = self.path_for(story);
        if !path.exists() {
            return Ok(BaselineLookup::Missing);
        }
        match Screenshot::load(&path) {
            Ok(screenshot) => Ok(BaselineLookup::Found {
                screenshot,
                revision: file_revision(&path),
            }),
            Err(ScreenshotError::NotFound(_)) => Ok(BaselineLookup::Missing),
            Err(ScreenshotError::Decode(err)) => Ok(BaselineLookup::Corrupt {
                detail: err.to_string(),
            }),
            Err(other) => Err(other.into()),
        }
    }

    fn put(&self, story: &str, screenshot: &Screenshot) -> Result<()> {
        Ok(screenshot.save(&self.path_for(story))?)
    }
}

/// In-memory store for tests; remembers which stories were written.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    baselines: HashMap<String, Screenshot>,
    corrupt: HashMap<String, String>,
    puts: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn with_baseline(self, story: &str, screenshot: Screenshot) -> MemoryStore {
        if let Ok(mut inner) = self.inner.lock() {
            inner.baselines.insert(story.to_string(), screenshot);
        }
        self
    }

    pub fn with_corrupt(self, story: &str, detail: &str) -> MemoryStore {
        if let Ok(mut inner) = self.inner.lock() {
            inner.corrupt.insert(story.to_string(), detail.to_string());
        }
        self
    }

    /// Story ids written via `put`, in order.
    pub fn puts(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.puts.clone())
            .unwrap_or_default()
    }
}

impl BaselineStore for MemoryStore {
    fn get(&self, story: &str) -> Result<BaselineLookup> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| VdcError::Unknown("baseline store lock poisoned".to_string()))?;
        if let Some(detail) = inner.corrupt.get(story) {
            return Ok(BaselineLookup::Corrupt {
                detail: detail.clone(),
            });
        }
        match inner.baselines.get(story) {
            Some(screenshot) => Ok(BaselineLookup::Found {
                screenshot: screenshot.clone(),
                revision: None,
            }),
            None => Ok(BaselineLookup::Missing),
        }
    }

    fn put(&self, story: &str, screenshot: &Screenshot) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| VdcError::Unknown("baseline store lock poisoned".to_string()))?;
        inner
            .baselines
            .insert(story.to_string(), screenshot.clone());
        inner.corrupt.remove(story);
        inner.puts.push(story.to_string());
        Ok(())
    }
}

fn collect_pngs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_pngs(&path, out)?;
        } else if path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("png"))
            .unwrap_or(false)
        {
            out.push(path);
        }
    }
    Ok(())
}

fn story_id(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let stem = rel.with_extension("");
    let parts: Vec<String> = stem
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn file_revision(path: &Path) -> Option<String> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified).to_rfc3339())
}
