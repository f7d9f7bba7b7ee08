use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `(name, major, minor)` identifying a service *type* (not an instance).
///
/// Equality, ordering and hashing all go through the same serialised string
/// form, following `original_source/.../service_identifier_type.h`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceIdentifierType {
    pub name: String,
    pub major_version: u32,
    pub minor_version: u32,
}

impl ServiceIdentifierType {
    pub fn new(name: impl Into<String>, major_version: u32, minor_version: u32) -> Self {
        Self {
            name: name.into(),
            major_version,
            minor_version,
        }
    }

    /// Canonical string form used as a hash/comparison key:
    /// `"<name>:<major>.<minor>"`.
    pub fn to_hash_string(&self) -> String {
        format!("{}:{}.{}", self.name, self.major_version, self.minor_version)
    }
}

impl fmt::Display for ServiceIdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hash_string())
    }
}

/// A validated, human-readable configuration key naming a deployment of a
/// service type in the system configuration (the string a user writes in
/// `FindService("my_spec")`-style lookups).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceSpecifier(String);

impl InstanceSpecifier {
    /// Rejects the empty string; otherwise takes the value as-is. The
    /// upstream grammar additionally restricts the charset, but that lives
    /// in the external JSON-config parser this crate does not reimplement.
    pub fn new(value: impl Into<String>) -> Result<Self, ConfigError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ConfigError::Validation(
                "InstanceSpecifier must not be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The public object by which a discovered service offer is named.
///
/// `instance_id` is `None` when the handle refers to "any instance" of the
/// service type (instance-any discovery); `Some` once discovery has resolved
/// a concrete offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleType {
    pub instance_identifier: ServiceIdentifierType,
    pub instance_id: Option<u16>,
}

impl HandleType {
    pub fn new(instance_identifier: ServiceIdentifierType, instance_id: Option<u16>) -> Self {
        Self {
            instance_identifier,
            instance_id,
        }
    }

    pub fn is_instance_any(&self) -> bool {
        self.instance_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_string_is_deterministic() {
        let a = ServiceIdentifierType::new("radar_service", 1, 0);
        let b = ServiceIdentifierType::new("radar_service", 1, 0);
        assert_eq!(a.to_hash_string(), b.to_hash_string());
        assert_eq!(a, b);
    }

    #[test]
    fn instance_specifier_rejects_empty() {
        assert!(InstanceSpecifier::new("").is_err());
        assert!(InstanceSpecifier::new("abc/my_instance").is_ok());
    }

    #[test]
    fn handle_type_instance_any() {
        let handle = HandleType::new(ServiceIdentifierType::new("s", 1, 0), None);
        assert!(handle.is_instance_any());
    }
}
