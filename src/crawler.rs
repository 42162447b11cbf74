use indextree::NodeId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::bundle::{bundle_total_size, AtomicUnitDetector, BundleExtensionDetector};
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::throttle::{Clock, PublishThrottle, SystemClock};
use crate::tree::{DirectoryTree, Entry, EntryKind};

/// Cooperative cancellation flag shared between a scan and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Repeated calls are harmless.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One published, internally consistent state of a scan.
#[derive(Debug, Clone)]
pub struct ScanSnapshot {
    pub tree: Arc<DirectoryTree>,
    pub items_visited: u64,
    pub current_path: PathBuf,
    pub elapsed: Duration,
    /// Set on the last snapshot of a completed scan
    pub is_final: bool,
}

/// How a scan that got past the root checks ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Completed,
    /// The last published snapshot (if any) stands as the result.
    Cancelled,
}

/// Progressive depth-first directory crawler.
///
/// Walks one directory at a time on the calling thread. Top-level
/// subdirectories show up as pending placeholders in the first snapshot
/// and are filled in, in enumeration order, as their walks complete.
pub struct FileCrawler {
    config: ScanConfig,
    detector: Arc<dyn AtomicUnitDetector>,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
}

impl FileCrawler {
    pub fn new(config: ScanConfig) -> Self {
        let detector = Arc::new(BundleExtensionDetector::from_config(&config));
        Self {
            config,
            detector,
            clock: Arc::new(SystemClock),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn AtomicUnitDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Scan `root`, handing every accepted snapshot to `publish`.
    ///
    /// Fails only when the root itself cannot be read. Problems below the
    /// root are absorbed: unreadable entries count as zero bytes and
    /// unlistable directories become empty leaves.
    pub fn scan<P, F>(&self, root: P, mut publish: F) -> Result<ScanStatus, ScanError>
    where
        P: AsRef<Path>,
        F: FnMut(ScanSnapshot),
    {
        let root_path = root.as_ref().to_path_buf();
        let metadata = fs::metadata(&root_path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ScanError::RootNotFound(root_path.clone())
            } else {
                ScanError::RootInaccessible {
                    path: root_path.clone(),
                    source,
                }
            }
        })?;

        if self.cancel.is_cancelled() {
            return Ok(ScanStatus::Cancelled);
        }

        log::info!("Scanning {}", root_path.display());
        let started = self.clock.now();
        let mut walk = Walk {
            crawler: self,
            tree: DirectoryTree::new(Entry::placeholder(root_path.clone())),
            throttle: PublishThrottle::new(self.config.publish_interval()),
            started,
            items_visited: 1,
            current_path: root_path.clone(),
            sink: &mut publish,
        };

        if !metadata.is_dir() || self.detector.is_atomic_unit(&root_path) {
            let leaf = if metadata.is_dir() {
                Entry::atomic_unit(root_path.clone(), bundle_total_size(&root_path))
            } else {
                Entry::file(root_path.clone(), metadata.len())
            };
            walk.tree = DirectoryTree::new(leaf);
            walk.publish(true);
            log::info!("Scanned single entry {}", root_path.display());
            return Ok(ScanStatus::Completed);
        }

        let listing = self
            .read_listing(&root_path)
            .map_err(|source| ScanError::RootInaccessible {
                path: root_path.clone(),
                source,
            })?;

        let status = walk.run_root(listing);
        match status {
            ScanStatus::Completed => log::info!(
                "Scan of {} complete: {} items, {} bytes in {:?}",
                root_path.display(),
                walk.items_visited,
                walk.tree.total_size(),
                self.clock.now().saturating_duration_since(started),
            ),
            ScanStatus::Cancelled => log::info!("Scan of {} cancelled", root_path.display()),
        }
        Ok(status)
    }

    fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false)
    }

    /// List the immediate children of `dir`, sizing everything that does
    /// not need a recursive walk.
    fn read_listing(&self, dir: &Path) -> io::Result<Vec<Listed>> {
        let mut listing = Vec::new();
        for dir_entry in fs::read_dir(dir)? {
            let dir_entry = match dir_entry {
                Ok(dir_entry) => dir_entry,
                Err(err) => {
                    log::debug!("Skipping unreadable entry in {}: {}", dir.display(), err);
                    continue;
                }
            };

            let path = dir_entry.path();
            if !self.config.include_hidden && Self::is_hidden(&path) {
                continue;
            }

            // DirEntry::file_type does not follow links, so a link to a
            // directory is sized as a plain leaf.
            let file_type = dir_entry.file_type().ok();
            let is_dir = file_type.map(|t| t.is_dir()).unwrap_or(false);
            let is_symlink = file_type.map(|t| t.is_symlink()).unwrap_or(false);

            let listed = if !is_dir {
                let size = if is_symlink && fs::metadata(&path).is_err() {
                    log::debug!("Dangling link {}", path.display());
                    0
                } else {
                    dir_entry.metadata().map(|m| m.len()).unwrap_or_else(|err| {
                        log::debug!("Cannot stat {}: {}", path.display(), err);
                        0
                    })
                };
                Listed::Leaf(Entry::file(path, size))
            } else if self.detector.is_atomic_unit(&path) {
                let size = bundle_total_size(&path);
                Listed::Leaf(Entry::atomic_unit(path, size))
            } else {
                Listed::Subdir(path)
            };
            listing.push(listed);
        }
        Ok(listing)
    }
}

enum Listed {
    Leaf(Entry),
    Subdir(PathBuf),
}

/// Raised inside the recursion when the cancel token trips.
struct Interrupted;

/// Mutable state of one scan; owns the tree until it is snapshotted.
struct Walk<'a> {
    crawler: &'a FileCrawler,
    tree: DirectoryTree,
    throttle: PublishThrottle,
    started: Instant,
    items_visited: u64,
    current_path: PathBuf,
    sink: &'a mut dyn FnMut(ScanSnapshot),
}

impl Walk<'_> {
    fn run_root(&mut self, listing: Vec<Listed>) -> ScanStatus {
        let root_id = self.tree.get_root();
        let (leaf_total, subdirs) = self.attach_listing(root_id, listing);
        self.set_size(root_id, leaf_total);
        self.publish(false);

        let mut total = leaf_total;
        for (child_id, child_path) in subdirs {
            if self.crawler.cancel.is_cancelled() {
                return ScanStatus::Cancelled;
            }
            match self.walk_dir(child_id, &child_path) {
                Ok(size) => total = total.saturating_add(size),
                Err(Interrupted) => return ScanStatus::Cancelled,
            }
            self.set_size(root_id, total);
            self.publish(false);
        }

        self.tree.clear_pending();
        self.publish(true);
        ScanStatus::Completed
    }

    fn walk_dir(&mut self, node_id: NodeId, path: &Path) -> Result<u64, Interrupted> {
        if self.crawler.cancel.is_cancelled() {
            return Err(Interrupted);
        }
        self.current_path = path.to_path_buf();

        let listing = match self.crawler.read_listing(path) {
            Ok(listing) => listing,
            Err(err) => {
                log::debug!("Cannot list {}: {}", path.display(), err);
                if let Some(entry) = self.tree.get_mut(node_id) {
                    entry.kind = EntryKind::Unreadable;
                    entry.size = 0;
                    entry.is_pending = false;
                }
                return Ok(0);
            }
        };

        let (mut total, subdirs) = self.attach_listing(node_id, listing);
        for (child_id, child_path) in subdirs {
            if self.crawler.cancel.is_cancelled() {
                return Err(Interrupted);
            }
            total = total.saturating_add(self.walk_dir(child_id, &child_path)?);
        }

        if let Some(entry) = self.tree.get_mut(node_id) {
            entry.size = total;
            entry.is_pending = false;
        }
        Ok(total)
    }

    /// Add a listing under `parent` in enumeration order. Returns the
    /// summed size of the leaves and the placeholders still to walk.
    fn attach_listing(
        &mut self,
        parent: NodeId,
        listing: Vec<Listed>,
    ) -> (u64, Vec<(NodeId, PathBuf)>) {
        let mut leaf_total = 0u64;
        let mut subdirs = Vec::new();

        for listed in listing {
            self.items_visited += 1;
            match listed {
                Listed::Leaf(entry) => {
                    let size = entry.size;
                    if self.tree.add_child(parent, entry).is_some() {
                        leaf_total = leaf_total.saturating_add(size);
                    }
                }
                Listed::Subdir(path) => {
                    if let Some(child_id) = self.tree.add_child(parent, Entry::placeholder(path.clone())) {
                        subdirs.push((child_id, path));
                    }
                }
            }
        }
        (leaf_total, subdirs)
    }

    fn set_size(&mut self, node_id: NodeId, size: u64) {
        if let Some(entry) = self.tree.get_mut(node_id) {
            entry.size = size;
        }
    }

    /// Sort, recompute percentages and hand a copy of the tree to the sink
    /// if the throttle allows it. `force` marks the final publish.
    fn publish(&mut self, force: bool) {
        let now = self.crawler.clock.now();
        if !self.throttle.should_publish(now, force) {
            log::trace!("Publish of {} throttled", self.current_path.display());
            return;
        }

        self.tree.sort_descending_by_size();
        self.tree.recompute_percentages();

        let snapshot = ScanSnapshot {
            tree: Arc::new(self.tree.clone()),
            items_visited: self.items_visited,
            current_path: self.current_path.clone(),
            elapsed: now.saturating_duration_since(self.started),
            is_final: force,
        };
        (self.sink)(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::NoAtomicUnits;
    use crate::throttle::ManualClock;

    fn write_file(path: &Path, len: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![b'x'; len]).unwrap();
    }

    fn unthrottled() -> ScanConfig {
        ScanConfig {
            publish_interval_ms: 0,
            ..ScanConfig::default()
        }
    }

    fn collect(crawler: &FileCrawler, root: &Path) -> (ScanStatus, Vec<ScanSnapshot>) {
        let mut snapshots = Vec::new();
        let status = crawler.scan(root, |s| snapshots.push(s)).unwrap();
        (status, snapshots)
    }

    fn child_names(tree: &DirectoryTree, id: NodeId) -> Vec<String> {
        tree.child_entries(id)
            .into_iter()
            .map(|(_, entry)| entry.name.clone())
            .collect()
    }

    /// Size, order and percentage invariants that every snapshot must hold.
    fn assert_consistent(tree: &DirectoryTree) {
        for id in tree.node_ids() {
            let entry = tree.get(id).unwrap();
            assert!(
                (0.0..=100.0).contains(&entry.percentage_of_parent),
                "{} has percentage {}",
                entry.path.display(),
                entry.percentage_of_parent
            );

            let children = tree.child_entries(id);
            if entry.kind == EntryKind::Directory {
                assert_eq!(entry.size, tree.known_children_size(id), "{}", entry.path.display());
            } else {
                assert!(children.is_empty());
            }
            assert!(children.windows(2).all(|pair| pair[0].1.size >= pair[1].1.size));
        }
    }

    #[test]
    fn test_end_to_end_scan() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        write_file(&root.join("a.txt"), 500);
        write_file(&root.join("sub/b.txt"), 1500);

        let crawler = FileCrawler::new(ScanConfig::default()).with_detector(Arc::new(NoAtomicUnits));
        let (status, snapshots) = collect(&crawler, &root);
        assert_eq!(status, ScanStatus::Completed);

        let last = snapshots.last().unwrap();
        assert!(last.is_final);
        let tree = &last.tree;
        let root_id = tree.get_root();
        assert_eq!(tree.total_size(), 2000);
        assert_eq!(tree.root_entry().percentage_of_parent, 100.0);
        assert_eq!(child_names(tree, root_id), vec!["sub", "a.txt"]);

        let sub = tree.get(tree.get_node(&root.join("sub")).unwrap()).unwrap();
        assert_eq!(sub.size, 1500);
        assert_eq!(sub.percentage_of_parent, 75.0);
        let a = tree.get(tree.get_node(&root.join("a.txt")).unwrap()).unwrap();
        assert_eq!(a.percentage_of_parent, 25.0);
        assert!(tree.node_ids().iter().all(|id| !tree.get(*id).unwrap().is_pending));
    }

    #[test]
    fn test_first_snapshot_shows_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(&root.join("top.bin"), 10);
        write_file(&root.join("one/deep/file"), 300);
        write_file(&root.join("two/file"), 200);

        let crawler = FileCrawler::new(unthrottled()).with_detector(Arc::new(NoAtomicUnits));
        let (_, snapshots) = collect(&crawler, root);

        let first = &snapshots[0];
        assert!(!first.is_final);
        assert_eq!(first.tree.total_size(), 10);
        assert!(first.tree.root_entry().is_pending);
        for name in ["one", "two"] {
            let id = first.tree.get_node(&root.join(name)).unwrap();
            let entry = first.tree.get(id).unwrap();
            assert!(entry.is_pending);
            assert_eq!(entry.size, 0);
            assert_eq!(first.tree.children(id), Some(vec![]));
        }
        // Nothing below a placeholder is visible yet.
        assert!(first.tree.get_node(&root.join("one/deep")).is_none());
    }

    #[test]
    fn test_every_snapshot_is_consistent_and_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(&root.join("a/1"), 100);
        write_file(&root.join("a/b/2"), 250);
        write_file(&root.join("c/3"), 40);
        write_file(&root.join("d/e/f/4"), 900);
        write_file(&root.join("loose"), 7);
        fs::create_dir_all(root.join("empty")).unwrap();

        let crawler = FileCrawler::new(unthrottled()).with_detector(Arc::new(NoAtomicUnits));
        let (status, snapshots) = collect(&crawler, root);
        assert_eq!(status, ScanStatus::Completed);
        // Initial publish, one per top-level directory, and the final one.
        assert_eq!(snapshots.len(), 6);

        let mut previous_total = 0;
        let mut previous_visited = 0;
        for snapshot in &snapshots {
            assert_consistent(&snapshot.tree);
            assert!(snapshot.tree.total_size() >= previous_total);
            assert!(snapshot.items_visited >= previous_visited);
            previous_total = snapshot.tree.total_size();
            previous_visited = snapshot.items_visited;
        }
        assert_eq!(previous_total, 1297);
        assert_eq!(
            child_names(&snapshots[5].tree, snapshots[5].tree.get_root()),
            vec!["d", "a", "c", "loose", "empty"]
        );
    }

    #[test]
    fn test_throttle_drops_intermediate_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for name in ["a", "b", "c"] {
            write_file(&root.join(name).join("f"), 10);
        }

        // A clock that never moves keeps every intermediate publish
        // inside the 300ms window.
        let crawler = FileCrawler::new(ScanConfig::default())
            .with_detector(Arc::new(NoAtomicUnits))
            .with_clock(Arc::new(ManualClock::new()));
        let (_, snapshots) = collect(&crawler, root);

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].tree.total_size(), 0);
        assert!(snapshots[1].is_final);
        assert_eq!(snapshots[1].tree.total_size(), 30);
    }

    #[test]
    fn test_atomic_units_stay_opaque() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(&root.join("Tool.app/Contents/MacOS/tool"), 700);
        write_file(&root.join("Tool.app/Contents/Resources/a/b/c"), 300);
        write_file(&root.join("docs/readme"), 50);

        let detector = |path: &Path| path.extension().map(|e| e == "app").unwrap_or(false);
        let crawler = FileCrawler::new(unthrottled()).with_detector(Arc::new(detector));
        let (_, snapshots) = collect(&crawler, root);

        for snapshot in &snapshots {
            let tree = &snapshot.tree;
            let app_id = tree.get_node(&root.join("Tool.app")).unwrap();
            let app = tree.get(app_id).unwrap();
            assert!(app.is_atomic_unit());
            assert_eq!(app.size, 1000);
            assert_eq!(tree.children(app_id), None);
            assert!(tree.get_node(&root.join("Tool.app/Contents")).is_none());
        }
        assert_eq!(snapshots.last().unwrap().tree.total_size(), 1050);
    }

    #[test]
    fn test_atomic_root_is_single_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Big.app");
        write_file(&bundle.join("Contents/data"), 1234);

        let crawler = FileCrawler::new(ScanConfig::default());
        let (status, snapshots) = collect(&crawler, &bundle);

        assert_eq!(status, ScanStatus::Completed);
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].is_final);
        let tree = &snapshots[0].tree;
        assert_eq!(tree.len(), 1);
        assert!(tree.root_entry().is_atomic_unit());
        assert_eq!(tree.total_size(), 1234);
    }

    #[test]
    fn test_file_root_is_single_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lonely.bin");
        write_file(&file, 42);

        let crawler = FileCrawler::new(ScanConfig::default());
        let (_, snapshots) = collect(&crawler, &file);

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].tree.root_entry().kind, EntryKind::File);
        assert_eq!(snapshots[0].tree.total_size(), 42);
    }

    #[test]
    fn test_hidden_entries_follow_config() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(&root.join(".cache/blob"), 400);
        write_file(&root.join("visible"), 100);

        let crawler = FileCrawler::new(ScanConfig::default()).with_detector(Arc::new(NoAtomicUnits));
        let (_, snapshots) = collect(&crawler, root);
        assert_eq!(snapshots.last().unwrap().tree.total_size(), 100);

        let config = ScanConfig {
            include_hidden: true,
            ..ScanConfig::default()
        };
        let crawler = FileCrawler::new(config).with_detector(Arc::new(NoAtomicUnits));
        let (_, snapshots) = collect(&crawler, root);
        assert_eq!(snapshots.last().unwrap().tree.total_size(), 500);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        write_file(&dir.path().join("elsewhere/huge"), 5000);
        write_file(&root.join("real"), 10);
        std::os::unix::fs::symlink(dir.path().join("elsewhere"), root.join("link")).unwrap();

        let crawler = FileCrawler::new(ScanConfig::default()).with_detector(Arc::new(NoAtomicUnits));
        let (_, snapshots) = collect(&crawler, &root);
        let tree = &snapshots.last().unwrap().tree;

        let link = tree.get(tree.get_node(&root.join("link")).unwrap()).unwrap();
        assert_eq!(link.kind, EntryKind::File);
        assert!(tree.total_size() < 5000);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_link_counts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        write_file(&root.join("real"), 10);
        std::os::unix::fs::symlink(dir.path().join("gone/target"), root.join("dangling")).unwrap();

        let crawler = FileCrawler::new(ScanConfig::default()).with_detector(Arc::new(NoAtomicUnits));
        let (status, snapshots) = collect(&crawler, &root);
        assert_eq!(status, ScanStatus::Completed);

        let tree = &snapshots.last().unwrap().tree;
        let link = tree.get(tree.get_node(&root.join("dangling")).unwrap()).unwrap();
        assert_eq!(link.size, 0);
        assert_eq!(tree.total_size(), 10);
    }

    #[test]
    fn test_unlistable_directory_becomes_empty_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        write_file(&root.join("f"), 10);
        write_file(&root.join("z/y/inner"), 500);

        // Remove z/y right after z lists it, so its own listing fails
        // regardless of the privileges the tests run with.
        let detector = |path: &Path| {
            if path.ends_with("z/y") {
                fs::remove_dir_all(path).unwrap();
            }
            false
        };
        let crawler = FileCrawler::new(unthrottled()).with_detector(Arc::new(detector));
        let (status, snapshots) = collect(&crawler, &root);
        assert_eq!(status, ScanStatus::Completed);

        let tree = &snapshots.last().unwrap().tree;
        let y_id = tree.get_node(&root.join("z/y")).unwrap();
        let y = tree.get(y_id).unwrap();
        assert_eq!(y.kind, EntryKind::Unreadable);
        assert_eq!(y.size, 0);
        assert!(!y.is_pending);
        assert_eq!(tree.children(y_id), None);
        assert_eq!(tree.total_size(), 10);
        for snapshot in &snapshots {
            assert_consistent(&snapshot.tree);
        }
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let crawler = FileCrawler::new(ScanConfig::default());
        let err = crawler.scan(dir.path().join("missing"), |_| {}).unwrap_err();
        assert!(matches!(err, ScanError::RootNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_inaccessible_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        write_file(&file, 1);

        // A path through a regular file fails with ENOTDIR, not NotFound.
        let crawler = FileCrawler::new(ScanConfig::default());
        let err = crawler.scan(file.join("below"), |_| {}).unwrap_err();
        assert!(matches!(err, ScanError::RootInaccessible { .. }));
    }

    #[test]
    fn test_cancel_before_start_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("a/f"), 10);

        let crawler = FileCrawler::new(ScanConfig::default());
        crawler.cancel_token().cancel();
        let (status, snapshots) = collect(&crawler, dir.path());

        assert_eq!(status, ScanStatus::Cancelled);
        assert!(snapshots.is_empty());
    }

    #[test]
    fn test_cancel_mid_scan_keeps_last_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for name in ["a", "b", "c"] {
            write_file(&root.join(name).join("nested/f"), 10);
        }

        let token = CancelToken::new();
        let crawler = FileCrawler::new(unthrottled())
            .with_detector(Arc::new(NoAtomicUnits))
            .with_cancel_token(token.clone());

        let mut snapshots = Vec::new();
        let status = crawler
            .scan(root, |snapshot| {
                snapshots.push(snapshot);
                token.cancel();
            })
            .unwrap();

        assert_eq!(status, ScanStatus::Cancelled);
        assert_eq!(snapshots.len(), 1);
        assert!(!snapshots[0].is_final);

        // Cancelling again is a no-op.
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_deep_in_tree_unwinds() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        write_file(&root.join("a/f"), 10);
        write_file(&root.join("m/n/o/deep/f"), 20);
        write_file(&root.join("m/n/o/deep/p/f"), 20);
        write_file(&root.join("m/n/o/after/f"), 20);
        write_file(&root.join("z/f"), 30);

        let token = CancelToken::new();
        let tripwire = token.clone();
        let detector = move |path: &Path| {
            if path.ends_with("m/n/o/deep") {
                tripwire.cancel();
            }
            false
        };
        let crawler = FileCrawler::new(unthrottled())
            .with_detector(Arc::new(detector))
            .with_cancel_token(token.clone());

        let mut snapshots = Vec::new();
        let status = crawler.scan(&root, |s| snapshots.push(s)).unwrap();
        assert_eq!(status, ScanStatus::Cancelled);
        assert!(token.is_cancelled());

        // Nothing is published once the cancel trips, so m never shows
        // more than its placeholder.
        assert!(!snapshots.is_empty());
        for snapshot in &snapshots {
            let tree = &snapshot.tree;
            assert!(!snapshot.is_final);
            assert!(tree.get_node(&root.join("m/n")).is_none());
            assert!(tree.get_node(&root.join("m/n/o/deep")).is_none());
            let m = tree.get(tree.get_node(&root.join("m")).unwrap()).unwrap();
            assert!(m.is_pending);
            assert_eq!(m.size, 0);
        }
    }
}
