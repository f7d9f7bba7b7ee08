//! Canonical filesystem/SHM naming, a pure function of
//! `(service_id, instance_id)` plus a platform temp root.
//!
//! Grounded on `original_source/.../bindings/lola/shm_path_builder.h` and
//! `i_shm_path_builder.h`; bit-exact names pinned against observed behavior.

use crate::identifiers::{InstanceId, ServiceId};
use std::path::PathBuf;

/// Builds SHM object names and filesystem paths for a fixed platform temp
/// root. On Linux that root is `/tmp`; QNX uses `/tmp_discovery`
/// — callers select the root, this type stays platform-agnostic.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    platform_tmp: PathBuf,
}

impl PathBuilder {
    pub fn new(platform_tmp: impl Into<PathBuf>) -> Self {
        Self {
            platform_tmp: platform_tmp.into(),
        }
    }

    /// Default platform root: `/tmp` on Linux.
    pub fn with_default_root() -> Self {
        Self::new("/tmp")
    }

    /// `/lola-data-<service_id:016x>-<instance_id:05x>`
    pub fn data_shm_name(&self, service_id: ServiceId, instance_id: InstanceId) -> String {
        format!(
            "/lola-data-{}-{}",
            service_id.to_path_hex(),
            instance_id.to_path_hex()
        )
    }

    /// `/lola-ctl-<service_id:016x>-<instance_id:05x>`
    pub fn control_qm_shm_name(&self, service_id: ServiceId, instance_id: InstanceId) -> String {
        format!(
            "/lola-ctl-{}-{}",
            service_id.to_path_hex(),
            instance_id.to_path_hex()
        )
    }

    /// `/lola-ctl-<service_id:016x>-<instance_id:05x>-b`
    pub fn control_b_shm_name(&self, service_id: ServiceId, instance_id: InstanceId) -> String {
        format!(
            "/lola-ctl-{}-{}-b",
            service_id.to_path_hex(),
            instance_id.to_path_hex()
        )
    }

    /// `<platform_tmp>/mw_com_lola/partial_restart/`
    pub fn partial_restart_dir(&self) -> PathBuf {
        self.platform_tmp.join("mw_com_lola").join("partial_restart")
    }

    /// `<partial_restart>/existence-<service_id:016x>-<instance_id:05x>`
    pub fn existence_marker_path(&self, service_id: ServiceId, instance_id: InstanceId) -> PathBuf {
        self.partial_restart_dir().join(format!(
            "existence-{}-{}",
            service_id.to_path_hex(),
            instance_id.to_path_hex()
        ))
    }

    /// `<partial_restart>/usage-<service_id:016x>-<instance_id:05x>`
    pub fn usage_marker_path(&self, service_id: ServiceId, instance_id: InstanceId) -> PathBuf {
        self.partial_restart_dir().join(format!(
            "usage-{}-{}",
            service_id.to_path_hex(),
            instance_id.to_path_hex()
        ))
    }

    /// `<platform_tmp>/mw_com_lola/service_discovery/`
    pub fn discovery_root(&self) -> PathBuf {
        self.platform_tmp.join("mw_com_lola").join("service_discovery")
    }

    /// `<discovery_root>/<service_id_decimal>/`
    pub fn discovery_service_dir(&self, service_id: ServiceId) -> PathBuf {
        self.discovery_root().join(service_id.to_path_decimal())
    }

    /// `<discovery_root>/<service_id_decimal>/<instance_id_decimal>/`
    pub fn discovery_instance_dir(&self, service_id: ServiceId, instance_id: InstanceId) -> PathBuf {
        self.discovery_service_dir(service_id)
            .join(instance_id.to_path_decimal())
    }

    /// `<pid>_<quality>_<disambiguator>` flag file name, where `quality` is
    /// already the canonical suffix (`"asil-qm"` / `"asil-b"`).
    pub fn flag_file_name(&self, pid: u32, quality_suffix: &str, disambiguator: u64) -> String {
        format!("{pid}_{quality_suffix}_{disambiguator}")
    }

    /// Inverse of `flag_file_name`. `None` if `name` is not exactly three
    /// `_`-separated segments with numeric first and third segments —
    /// anything else is not a name this builder could have produced.
    pub fn parse_flag_file_name(name: &str) -> Option<(u32, String, u64)> {
        let mut parts = name.splitn(3, '_');
        let pid = parts.next()?.parse::<u32>().ok()?;
        let quality_suffix = parts.next()?.to_string();
        let disambiguator = parts.next()?.parse::<u64>().ok()?;
        Some((pid, quality_suffix, disambiguator))
    }
}
