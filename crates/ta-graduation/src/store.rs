// store.rs — MetricsStore: persistence for CategoryMetrics records.
//
// The engine never caches metrics; every decision reads the store and every
// transition writes back through it. Stores are responsible for per-category
// atomicity: a read-modify-write of one category must not interleave with
// another write to the same category, even from another process. Updates may
// also carry an expected level (compare-and-swap), checked under that lock.
//
// JsonMetricsStore keeps one JSON file per category: `<dir>/<category>.json`,
// guarded by an advisory lock on `<dir>/<category>.json.lock`.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::GraduationError;
use crate::metrics::{CategoryMetrics, MetricsUpdate};

/// Durable keyed storage for [`CategoryMetrics`].
///
/// Methods take `&self` so different categories can be evaluated from
/// several threads against one store.
pub trait MetricsStore: Send + Sync {
    /// Fetch the record for `category`, if one exists.
    fn get(&self, category: &str) -> Result<Option<CategoryMetrics>, GraduationError>;

    /// Create the record if needed, then apply `update` atomically.
    ///
    /// Unknown field names fail with `UnknownField` and nothing is written.
    fn upsert(&self, category: &str, update: &MetricsUpdate) -> Result<(), GraduationError>;

    /// Every category key in the store, sorted.
    ///
    /// Keys are listed even when their record cannot be read, so a caller
    /// that calls `get` per key sees the failure.
    fn list_categories(&self) -> Result<Vec<String>, GraduationError>;

    /// Every readable record in the store, sorted by category.
    fn list_all(&self) -> Result<Vec<CategoryMetrics>, GraduationError>;
}

impl<S: MetricsStore + ?Sized> MetricsStore for &S {
    fn get(&self, category: &str) -> Result<Option<CategoryMetrics>, GraduationError> {
        (**self).get(category)
    }

    fn upsert(&self, category: &str, update: &MetricsUpdate) -> Result<(), GraduationError> {
        (**self).upsert(category, update)
    }

    fn list_categories(&self) -> Result<Vec<String>, GraduationError> {
        (**self).list_categories()
    }

    fn list_all(&self) -> Result<Vec<CategoryMetrics>, GraduationError> {
        (**self).list_all()
    }
}

/// Map-backed store for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    records: Mutex<BTreeMap<String, CategoryMetrics>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<String, CategoryMetrics>> {
        // apply() is all-or-nothing, so a poisoned map is still consistent.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MetricsStore for InMemoryMetricsStore {
    fn get(&self, category: &str) -> Result<Option<CategoryMetrics>, GraduationError> {
        Ok(self.records().get(category).cloned())
    }

    fn upsert(&self, category: &str, update: &MetricsUpdate) -> Result<(), GraduationError> {
        let mut records = self.records();
        let mut record = records
            .get(category)
            .cloned()
            .unwrap_or_else(|| CategoryMetrics::new(category));
        record.apply(update)?;
        records.insert(category.to_string(), record);
        Ok(())
    }

    fn list_categories(&self) -> Result<Vec<String>, GraduationError> {
        Ok(self.records().keys().cloned().collect())
    }

    fn list_all(&self) -> Result<Vec<CategoryMetrics>, GraduationError> {
        Ok(self.records().values().cloned().collect())
    }
}

/// File-backed store: one pretty-printed JSON file per category.
///
/// Writers lock the category's `.lock` file, so separate processes sharing
/// the directory (a scheduled `evaluate` and a metrics collector) never
/// overwrite each other's changes.
pub struct JsonMetricsStore {
    store_dir: PathBuf,
}

impl JsonMetricsStore {
    /// Create a new store backed by the given directory.
    /// Creates the directory if it doesn't exist.
    pub fn new(store_dir: impl AsRef<Path>) -> Result<Self, GraduationError> {
        let store_dir = store_dir.as_ref().to_path_buf();
        fs::create_dir_all(&store_dir).map_err(|source| GraduationError::Io {
            path: store_dir.clone(),
            source,
        })?;
        Ok(Self { store_dir })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Path to the JSON file for a given category.
    fn category_file(&self, category: &str) -> Result<PathBuf, GraduationError> {
        validate_category(category)?;
        Ok(self.store_dir.join(format!("{}.json", category)))
    }

    fn open_lock(
        &self,
        category: &str,
    ) -> Result<(fd_lock::RwLock<File>, PathBuf), GraduationError> {
        let path = self.store_dir.join(format!("{}.json.lock", category));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| GraduationError::Io {
                path: path.clone(),
                source,
            })?;
        Ok((fd_lock::RwLock::new(file), path))
    }

    /// Read the record stored under `category`, checking it names the same key.
    fn read_record(category: &str, path: &Path) -> Result<CategoryMetrics, GraduationError> {
        let json = fs::read_to_string(path).map_err(|source| GraduationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let record: CategoryMetrics = serde_json::from_str(&json)?;
        if record.category != category {
            return Err(GraduationError::CategoryMismatch {
                category: category.to_string(),
                found: record.category,
                path: path.to_path_buf(),
            });
        }
        Ok(record)
    }

    fn save(&self, path: &Path, record: &CategoryMetrics) -> Result<(), GraduationError> {
        let json = serde_json::to_string_pretty(record)?;
        // Write-then-rename so a crash never leaves a truncated record.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| GraduationError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| GraduationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

impl MetricsStore for JsonMetricsStore {
    fn get(&self, category: &str) -> Result<Option<CategoryMetrics>, GraduationError> {
        let path = self.category_file(category)?;
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(category, &path).map(Some)
    }

    fn upsert(&self, category: &str, update: &MetricsUpdate) -> Result<(), GraduationError> {
        let path = self.category_file(category)?;
        let (mut lock, lock_path) = self.open_lock(category)?;
        let _guard = lock.write().map_err(|source| GraduationError::Io {
            path: lock_path,
            source,
        })?;

        // Read under the lock so the expected-level check sees the latest write.
        let mut record = if path.exists() {
            Self::read_record(category, &path)?
        } else {
            CategoryMetrics::new(category)
        };
        record.apply(update)?;
        self.save(&path, &record)
    }

    fn list_categories(&self) -> Result<Vec<String>, GraduationError> {
        let entries = fs::read_dir(&self.store_dir).map_err(|source| GraduationError::Io {
            path: self.store_dir.clone(),
            source,
        })?;

        let mut categories = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| GraduationError::Io {
                path: self.store_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_category(stem).is_ok() {
                categories.push(stem.to_string());
            }
        }

        categories.sort();
        Ok(categories)
    }

    fn list_all(&self) -> Result<Vec<CategoryMetrics>, GraduationError> {
        let mut records = Vec::new();
        for category in self.list_categories()? {
            match self.get(&category) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => tracing::warn!("skipping unreadable metrics for '{}': {}", category, e),
            }
        }
        Ok(records)
    }
}

/// Category names double as file names, so they must be a single path segment.
fn validate_category(category: &str) -> Result<(), GraduationError> {
    let invalid = category.is_empty()
        || category.contains(['/', '\\'])
        || category.contains("..")
        || category.starts_with('.');
    if invalid {
        return Err(GraduationError::InvalidCategory {
            category: category.to_string(),
        });
    }
    Ok(())
}
