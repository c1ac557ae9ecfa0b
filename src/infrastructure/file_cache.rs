//! On-disk cache of sanitized analytics responses.
//!
//! Layout: `<root>/{views|downloads}/<start>[_<end>].json[.partial]`.
//! Downstream reporting reads these files directly, so the naming is a
//! contract. A `.partial` file holds a window that hadn't closed when it
//! was fetched; once the window is in the past the final name is looked
//! up instead, which misses and triggers a refetch.
//!
//! There is no locking: runs against the same root must be serialized.

use chrono::{Local, NaiveDate};
use serde_json::Value;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::{
    sanitize_response, CacheError, DateUnit, EntryState, MetricKind, ResponseStore,
};

pub const PARTIAL_SUFFIX: &str = ".partial";

/// JSON file cache rooted at an output directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    base_path: PathBuf,
    today: NaiveDate,
}

impl FileCache {
    /// Cache rooted at `base_path`, judging partial windows against the local date.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            today: Local::now().date_naive(),
        }
    }

    /// Pin "today", for reproducible runs and tests.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    fn final_path(&self, kind: MetricKind, unit: DateUnit) -> PathBuf {
        self.base_path
            .join(kind.as_str())
            .join(format!("{}.json", unit.label()))
    }

    fn with_partial_suffix(path: &Path) -> PathBuf {
        let mut raw = path.as_os_str().to_owned();
        raw.push(PARTIAL_SUFFIX);
        PathBuf::from(raw)
    }

    /// Rewrite every cached response through the sanitizer.
    ///
    /// Returns the number of files rewritten. Safe to run repeatedly.
    pub fn sanitize_all(&self) -> Result<usize, CacheError> {
        let mut rewritten = 0;
        for kind in MetricKind::ALL {
            let dir = self.base_path.join(kind.as_str());
            if !dir.is_dir() {
                continue;
            }
            let entries = fs::read_dir(&dir).map_err(|source| CacheError::Io {
                path: dir.clone(),
                source,
            })?;
            for entry in entries {
                let path = entry
                    .map_err(|source| CacheError::Io {
                        path: dir.clone(),
                        source,
                    })?
                    .path();
                let name = path.to_string_lossy();
                if !(name.ends_with(".json") || name.ends_with(".json.partial")) {
                    continue;
                }
                info!("sanitizing {}", path.display());
                let response = self.read(&path)?;
                self.write(&path, response)?;
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }
}

impl ResponseStore for FileCache {
    fn entry_path(&self, kind: MetricKind, unit: DateUnit) -> PathBuf {
        let path = self.final_path(kind, unit);
        if unit.is_partial(self.today) {
            // anything gathered today (or about the future) will only ever be partial
            Self::with_partial_suffix(&path)
        } else {
            path
        }
    }

    fn entry_state(&self, kind: MetricKind, unit: DateUnit) -> EntryState {
        let path = self.entry_path(kind, unit);
        if unit.is_partial(self.today) {
            return if path.exists() {
                EntryState::Partial(path)
            } else {
                EntryState::Absent
            };
        }
        if path.exists() {
            return EntryState::Final(path);
        }
        let partial = Self::with_partial_suffix(&path);
        if partial.exists() {
            EntryState::StalePartial(partial)
        } else {
            EntryState::Absent
        }
    }

    fn read(&self, path: &Path) -> Result<Value, CacheError> {
        let file = File::open(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| CacheError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write(&self, path: &Path, response: Value) -> Result<(), CacheError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| CacheError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let body = serde_json::to_vec_pretty(&sanitize_response(response)).map_err(|source| {
            CacheError::Json {
                path: path.to_path_buf(),
                source,
            }
        })?;
        if path.exists() {
            debug!("overwriting {}", path.display());
        }
        fs::write(path, body).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("wrote {}", path.display());
        Ok(())
    }
}
