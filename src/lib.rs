//! Progressive disk usage scanning and treemap layout.
//!
//! [`session::ScanSession`] runs a [`crawler::FileCrawler`] in the
//! background and streams [`crawler::ScanSnapshot`]s of a growing
//! [`tree::DirectoryTree`]; [`treemap`] turns a node's children into
//! rectangles for display.

pub mod bundle;
pub mod config;
pub mod crawler;
pub mod error;
pub mod session;
pub mod throttle;
pub mod tier;
pub mod tree;
pub mod treemap;

pub use bundle::{bundle_total_size, AtomicUnitDetector};
pub use config::ScanConfig;
pub use crawler::{CancelToken, FileCrawler, ScanSnapshot, ScanStatus};
pub use error::{ConfigError, ScanError};
pub use session::{ScanEvent, ScanHandle, ScanOutcome, ScanSession};
pub use tier::{classify_tier, format_size};
pub use tree::{DirectoryTree, Entry, EntryKind};
pub use treemap::{layout_children, layout_treemap, Rect, TreemapAlgorithm, TreemapItem};
