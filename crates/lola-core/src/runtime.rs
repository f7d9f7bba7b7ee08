//! Explicit runtime handle bundling the binding's injected collaborators.
//!
//! Grounded on the design's DESIGN NOTES: "thread through a `Runtime` handle
//! explicitly; do not keep process-wide singletons in production code
//! paths." Construction is the only place collaborators are chosen; every
//! other module takes references instead of reaching for a global.

use crate::acl::Acl;
use crate::discovery::Filesystem;
use crate::messaging::MessagePassingService;
use crate::path_builder::PathBuilder;
use std::sync::Arc;

/// Bundles the collaborators `ShmLifecycle` and `Discovery` need, passed
/// explicitly to their constructors rather than looked up from a
/// process-wide singleton.
pub struct Runtime {
    pub path_builder: PathBuilder,
    pub filesystem: Arc<dyn Filesystem>,
    pub acl: Arc<dyn Acl>,
    pub message_passing: Arc<dyn MessagePassingService>,
}

impl Runtime {
    pub fn new(
        path_builder: PathBuilder,
        filesystem: Arc<dyn Filesystem>,
        acl: Arc<dyn Acl>,
        message_passing: Arc<dyn MessagePassingService>,
    ) -> Self {
        Self {
            path_builder,
            filesystem,
            acl,
            message_passing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::RecordingAcl;
    use crate::discovery::FakeFilesystem;
    use crate::messaging::FakeMessagePassingService;

    #[test]
    fn runtime_bundles_collaborators_without_global_state() {
        let runtime = Runtime::new(
            PathBuilder::with_default_root(),
            Arc::new(FakeFilesystem::new()),
            Arc::new(RecordingAcl::new()),
            Arc::new(FakeMessagePassingService::new()),
        );
        assert!(runtime.filesystem.read_dir(std::path::Path::new("/missing")).unwrap().is_empty());
    }
}
