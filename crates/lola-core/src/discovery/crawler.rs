//! Directory-tree crawler + inotify watch engine: turns discovery-tree
//! filesystem state into typed offer/withdraw events.
//!
//! Invalid entries are ignored rather than surfaced as errors;
//! the dependency-injected real+fake watcher split follows
//! `groblegark-oddjobs`'s `oj-adapters` crate.

use super::filesystem::{EntryKind, Filesystem};
use super::inotify::{InotifyInstance, WatchDescriptor};
use crate::error::{Error, Result};
use crate::identifiers::{InstanceId, ServiceId};
use crate::path_builder::PathBuilder;
use lola_config::QualityType;
use std::path::PathBuf;

/// Whether a crawl targets one instance or every instance of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceSelector {
    Bound(InstanceId),
    Any,
}

/// One discovered offer: the flag file's parsed `<pid>_<quality>_<disambiguator>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredHandle {
    pub instance_id: InstanceId,
    pub pid: u32,
    pub disambiguator: u64,
}

/// Crawl result, split by quality (`crawl` returns two containers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlResult {
    pub asil_qm: Vec<DiscoveredHandle>,
    pub asil_b: Vec<DiscoveredHandle>,
}

/// Strict parse used by discovery's instance-id directory names: rejects
/// empty strings and any non-decimal-digit content.
pub fn convert_from_string_to_instance_id(value: &str) -> Option<InstanceId> {
    InstanceId::parse_decimal(value)
}

/// Matches the canonical quality suffixes; anything else maps to `Invalid`
/// (caller decides if that is a fault).
pub fn parse_quality_type_from_string(value: &str) -> QualityType {
    QualityType::parse_from_string(value)
}

fn parse_flag_file_name(name: &str) -> Option<(u32, QualityType, u64)> {
    let (pid, quality_suffix, disambiguator) = PathBuilder::parse_flag_file_name(name)?;
    let quality = parse_quality_type_from_string(&quality_suffix);
    if quality == QualityType::Invalid {
        return None;
    }
    Some((pid, quality, disambiguator))
}

fn crawl_instance_dir(
    fs: &dyn Filesystem,
    instance_id: InstanceId,
    dir: &PathBuf,
    result: &mut CrawlResult,
) -> Result<()> {
    let Some(status) = fs.status(dir)? else {
        return Ok(());
    };
    if status.kind != EntryKind::Directory {
        // A flag file sitting where an instance directory is expected:
        // wrong filesystem type, silently ignored.
        return Ok(());
    }

    for entry in fs.read_dir(dir)? {
        let Some(status) = fs.status(&entry)? else {
            continue;
        };
        if status.kind != EntryKind::RegularFile {
            continue;
        }
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((pid, quality, disambiguator)) = parse_flag_file_name(name) else {
            continue;
        };
        let handle = DiscoveredHandle {
            instance_id,
            pid,
            disambiguator,
        };
        match quality {
            QualityType::AsilQm => result.asil_qm.push(handle),
            QualityType::AsilB => result.asil_b.push(handle),
            QualityType::Invalid => unreachable!("filtered out by parse_flag_file_name"),
        }
    }
    Ok(())
}

/// Pure enumeration: reads only the relevant instance directory (bound) or
/// iterates every instance-id subdirectory (any). Invalid subdirectory
/// names and wrong-type entries are silently ignored.
pub fn crawl(
    fs: &dyn Filesystem,
    path_builder: &PathBuilder,
    service_id: ServiceId,
    selector: InstanceSelector,
) -> Result<CrawlResult> {
    let mut result = CrawlResult::default();

    match selector {
        InstanceSelector::Bound(instance_id) => {
            let dir = path_builder.discovery_instance_dir(service_id, instance_id);
            crawl_instance_dir(fs, instance_id, &dir, &mut result)?;
        }
        InstanceSelector::Any => {
            let service_dir = path_builder.discovery_service_dir(service_id);
            let Some(status) = fs.status(&service_dir)? else {
                return Ok(result);
            };
            if status.kind != EntryKind::Directory {
                return Ok(result);
            }
            for entry in fs.read_dir(&service_dir)? {
                let Some(status) = fs.status(&entry)? else {
                    continue;
                };
                if status.kind != EntryKind::Directory {
                    // e.g. a regular file at the service-id level.
                    continue;
                }
                let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some(instance_id) = convert_from_string_to_instance_id(name) else {
                    continue;
                };
                crawl_instance_dir(fs, instance_id, &entry, &mut result)?;
            }
        }
    }

    Ok(result)
}

/// Pairs a placed watch with the instance it watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchedInstance {
    pub watch_descriptor: WatchDescriptor,
    pub instance_id: InstanceId,
}

/// Crawls, then places watches: bound selectors watch only the
/// instance-id directory; `Any` watches the service-id directory plus each
/// existing instance-id directory (newly appearing ones are watched when
/// the service-id watch fires, handled by the caller's event loop).
pub fn crawl_and_watch(
    fs: &dyn Filesystem,
    inotify: &mut dyn InotifyInstance,
    path_builder: &PathBuilder,
    service_id: ServiceId,
    selector: InstanceSelector,
) -> Result<(CrawlResult, Vec<WatchedInstance>)> {
    let result = crawl(fs, path_builder, service_id, selector)?;
    let mut watches = Vec::new();

    match selector {
        InstanceSelector::Bound(instance_id) => {
            let dir = path_builder.discovery_instance_dir(service_id, instance_id);
            let wd = inotify.add_watch(&dir)?;
            watches.push(WatchedInstance {
                watch_descriptor: wd,
                instance_id,
            });
        }
        InstanceSelector::Any => {
            let service_dir = path_builder.discovery_service_dir(service_id);
            inotify.add_watch(&service_dir)?;

            let mut seen: Vec<InstanceId> = result.asil_qm.iter().map(|h| h.instance_id).collect();
            seen.extend(result.asil_b.iter().map(|h| h.instance_id));
            seen.sort_by_key(|id| id.0);
            seen.dedup_by_key(|id| id.0);

            for instance_id in seen {
                let dir = path_builder.discovery_instance_dir(service_id, instance_id);
                let wd = inotify.add_watch(&dir)?;
                watches.push(WatchedInstance {
                    watch_descriptor: wd,
                    instance_id,
                });
            }
        }
    }

    Ok((result, watches))
}

/// Retries `crawl_and_watch` up to `max` attempts; a directory removed
/// concurrently between crawl and watch may reappear by the next attempt.
pub fn crawl_and_watch_with_retry(
    fs: &dyn Filesystem,
    inotify: &mut dyn InotifyInstance,
    path_builder: &PathBuilder,
    service_id: ServiceId,
    selector: InstanceSelector,
    max: u32,
) -> Result<(CrawlResult, Vec<WatchedInstance>)> {
    let mut last_err = None;
    for _ in 0..max.max(1) {
        match crawl_and_watch(fs, inotify, path_builder, service_id, selector) {
            Ok(outcome) => return Ok(outcome),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| Error::BindingFailure("crawl_and_watch_with_retry: no attempts made".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::filesystem::FakeFilesystem;
    use crate::discovery::inotify::FakeInotify;

    fn builder() -> PathBuilder {
        PathBuilder::new("/tmp")
    }

    #[test]
    fn instance_id_parsing_rules() {
        assert_eq!(convert_from_string_to_instance_id("0"), Some(InstanceId(0)));
        assert_eq!(convert_from_string_to_instance_id("00000"), Some(InstanceId(0)));
        assert_eq!(convert_from_string_to_instance_id("65535"), Some(InstanceId(65535)));
        assert_eq!(convert_from_string_to_instance_id(""), None);
        assert_eq!(convert_from_string_to_instance_id("a"), None);
    }

    #[test]
    fn s2_crawl_mixed_tree_skips_invalid_directory() {
        let path_builder = builder();
        let service_id = ServiceId::new(10);
        let inst1 = InstanceId::new(1);
        let inst2 = InstanceId::new(2);

        let dir1 = path_builder.discovery_instance_dir(service_id, inst1);
        let dir2 = path_builder.discovery_instance_dir(service_id, inst2);
        let service_dir = path_builder.discovery_service_dir(service_id);
        let invalid_dir = service_dir.join("invalid_directory_name");

        let fs = FakeFilesystem::new()
            .with_directory(service_dir.clone())
            .with_directory(dir1.clone())
            .with_directory(dir2.clone())
            .with_directory(invalid_dir)
            .with_file(dir1.join("111_asil-qm_1"))
            .with_file(dir2.join("222_asil-qm_2"))
            .with_file(dir1.join("111_asil-b_3"))
            .with_file(dir2.join("222_asil-b_4"));

        let result = crawl(&fs, &path_builder, service_id, InstanceSelector::Any).unwrap();
        assert_eq!(result.asil_qm.len(), 2);
        assert_eq!(result.asil_b.len(), 2);
    }

    #[test]
    fn crawl_ignores_regular_file_at_service_id_level() {
        let path_builder = builder();
        let service_id = ServiceId::new(11);
        let service_dir = path_builder.discovery_service_dir(service_id);
        let fs = FakeFilesystem::new()
            .with_directory(service_dir.clone())
            .with_file(service_dir.join("not_a_directory"));

        let result = crawl(&fs, &path_builder, service_id, InstanceSelector::Any).unwrap();
        assert!(result.asil_qm.is_empty() && result.asil_b.is_empty());
    }

    #[test]
    fn crawl_and_watch_bound_watches_only_instance_dir() {
        let path_builder = builder();
        let service_id = ServiceId::new(12);
        let instance_id = InstanceId::new(1);
        let dir = path_builder.discovery_instance_dir(service_id, instance_id);
        let fs = FakeFilesystem::new()
            .with_directory(dir.clone())
            .with_file(dir.join("1_asil-qm_1"));
        let mut inotify = FakeInotify::new();

        let (result, watches) = crawl_and_watch(
            &fs,
            &mut inotify,
            &path_builder,
            service_id,
            InstanceSelector::Bound(instance_id),
        )
        .unwrap();

        assert_eq!(result.asil_qm.len(), 1);
        assert_eq!(watches.len(), 1);
        assert_eq!(watches[0].instance_id, instance_id);
    }

    fn arbitrary_entry_name() -> impl proptest::prelude::Strategy<Value = String> {
        proptest::prelude::prop_oneof![
            "[0-9]{1,5}",
            "[a-zA-Z_-]{1,10}",
            (proptest::prelude::any::<u32>(), proptest::prelude::prop::sample::select(vec!["asil-qm", "asil-b"]), proptest::prelude::any::<u64>())
                .prop_map(|(pid, quality, disambiguator)| format!("{pid}_{quality}_{disambiguator}")),
        ]
    }

    proptest::proptest! {
        /// Every discovered handle traces back to an entry whose directory
        /// name and flag-file name both parse; anything else — directories
        /// named something other than a decimal instance id, flag files
        /// that don't split into `<pid>_<quality>_<disambiguator>` — is
        /// silently skipped rather than surfaced as an error.
        #[test]
        fn crawl_only_counts_entries_that_actually_parse(
            instance_dir_names in proptest::prelude::prop::collection::vec(arbitrary_entry_name(), 1..6),
            flag_names in proptest::prelude::prop::collection::vec(arbitrary_entry_name(), 1..6),
        ) {
            let mut instance_dir_names = instance_dir_names;
            instance_dir_names.sort();
            instance_dir_names.dedup();
            let mut flag_names = flag_names;
            flag_names.sort();
            flag_names.dedup();

            let path_builder = PathBuilder::new("/tmp");
            let service_id = ServiceId::new(12345);
            let service_dir = path_builder.discovery_service_dir(service_id);

            let mut fs = FakeFilesystem::new().with_directory(service_dir.clone());
            let mut expected = 0usize;

            for dir_name in &instance_dir_names {
                let dir = service_dir.join(dir_name);
                fs = fs.with_directory(dir.clone());
                let is_valid_instance = convert_from_string_to_instance_id(dir_name).is_some();

                for flag_name in &flag_names {
                    fs = fs.with_file(dir.join(flag_name));
                    if is_valid_instance && parse_flag_file_name(flag_name).is_some() {
                        expected += 1;
                    }
                }
            }

            let result = crawl(&fs, &path_builder, service_id, InstanceSelector::Any).unwrap();
            proptest::prop_assert_eq!(result.asil_qm.len() + result.asil_b.len(), expected);
        }
    }
}
