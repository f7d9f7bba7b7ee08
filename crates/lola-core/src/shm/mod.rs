//! Shared-memory lifecycle: typed region headers, advisory locking over
//! the existence/usage markers, and the create-or-reopen protocol.

pub mod layout;
pub mod lifecycle;
pub mod lockfile;

pub use layout::{EventControl, ServiceDataControl, ServiceDataStorage};
pub use lifecycle::{OfferOutcome, OfferedRegions, RegionSizes, ShmLifecycle, ShmRegion};
pub use lockfile::{open_existence_marker, open_usage_marker, FileLock, OsFileLock};

#[cfg(target_family = "unix")]
pub use lifecycle::OsShmRegion;
