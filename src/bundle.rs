use jwalk::{Parallelism, WalkDir};
use std::path::Path;

use crate::config::ScanConfig;

/// Decides whether a directory is an opaque unit whose contents are
/// reported as one size instead of a subtree.
///
/// Only consulted for directories. Closures work too, which keeps tests
/// independent of real bundles on disk.
pub trait AtomicUnitDetector: Send + Sync {
    fn is_atomic_unit(&self, path: &Path) -> bool;
}

impl<F> AtomicUnitDetector for F
where
    F: Fn(&Path) -> bool + Send + Sync,
{
    fn is_atomic_unit(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Treats every directory as ordinary.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAtomicUnits;

impl AtomicUnitDetector for NoAtomicUnits {
    fn is_atomic_unit(&self, _path: &Path) -> bool {
        false
    }
}

/// Matches directories by extension (`Foo.app`, `Bar.framework`, ...).
#[derive(Debug, Clone)]
pub struct BundleExtensionDetector {
    extensions: Vec<String>,
}

impl BundleExtensionDetector {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(&config.bundle_extensions)
    }
}

impl AtomicUnitDetector for BundleExtensionDetector {
    fn is_atomic_unit(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        self.extensions.iter().any(|known| *known == ext)
    }
}

/// Sum the sizes of everything below `path` without building a tree.
///
/// Hidden entries are skipped and links are not followed. Entries whose
/// metadata cannot be read count as zero. A plain file yields its own size.
pub fn bundle_total_size<P: AsRef<Path>>(path: P) -> u64 {
    let walker = WalkDir::new(path.as_ref())
        .skip_hidden(true)
        .follow_links(false)
        .parallelism(Parallelism::Serial);

    let mut total = 0u64;
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::trace!("Skipping unreadable bundle entry: {}", err);
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        total = total.saturating_add(size);
    }
    total
}
