//! Service discovery: directory-tree crawler plus inotify watch engine.

pub mod crawler;
pub mod filesystem;
pub mod inotify;

pub use crawler::{
    convert_from_string_to_instance_id, crawl, crawl_and_watch, crawl_and_watch_with_retry,
    parse_quality_type_from_string, CrawlResult, DiscoveredHandle, InstanceSelector, WatchedInstance,
};
pub use filesystem::{EntryKind, FakeFilesystem, FileStatus, Filesystem, OsFilesystem};
pub use inotify::{FakeInotify, InotifyInstance, OsInotify, WatchDescriptor, WatchEvent};
