//! Access-control collaborator, applied once at SHM create time.
//!
//! The actual permission-system binding stays an external collaborator —
//! this crate only defines the trait boundary and a recording fake for
//! tests.

/// Access level granted to a single uid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

/// Opaque handle naming one ACL entry, matching POSIX ACL's
/// create-entry/set-tag/set-qualifier/set-permset split: a permission and
/// a uid are both attached to the same entry, not to each other directly.
pub type AclEntry = u32;

/// ACL collaborator consumed once per offered region at create time.
pub trait Acl: Send + Sync {
    fn add_perm(&self, entry: AclEntry, permission: Permission);
    /// Binds `entry` to `uid` — the qualifier is what makes a permission
    /// entry apply to one specific user rather than the ACL's default.
    fn set_qualifier(&self, entry: AclEntry, uid: u32);
}

/// Test double recording every call for assertions.
#[derive(Debug, Default)]
pub struct RecordingAcl {
    calls: parking_lot::Mutex<Vec<AclCall>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclCall {
    AddPerm { entry: AclEntry, permission: Permission },
    SetQualifier { entry: AclEntry, uid: u32 },
}

impl RecordingAcl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AclCall> {
        self.calls.lock().clone()
    }
}

impl Acl for RecordingAcl {
    fn add_perm(&self, entry: AclEntry, permission: Permission) {
        self.calls.lock().push(AclCall::AddPerm { entry, permission });
    }

    fn set_qualifier(&self, entry: AclEntry, uid: u32) {
        self.calls.lock().push(AclCall::SetQualifier { entry, uid });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_acl_captures_calls_in_order() {
        let acl = RecordingAcl::new();
        acl.add_perm(0, Permission::ReadWrite);
        acl.set_qualifier(0, 1000);

        assert_eq!(
            acl.calls(),
            vec![
                AclCall::AddPerm {
                    entry: 0,
                    permission: Permission::ReadWrite
                },
                AclCall::SetQualifier { entry: 0, uid: 1000 },
            ]
        );
    }

    #[test]
    fn each_uid_gets_its_own_entry_bound_by_qualifier() {
        let acl = RecordingAcl::new();
        for (entry, uid) in [(0u32, 1000u32), (1, 1001)] {
            acl.add_perm(entry, Permission::ReadOnly);
            acl.set_qualifier(entry, uid);
        }

        let calls = acl.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[1], AclCall::SetQualifier { entry: 0, uid: 1000 });
        assert_eq!(calls[3], AclCall::SetQualifier { entry: 1, uid: 1001 });
    }
}
