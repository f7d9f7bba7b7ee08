//! Structured identifiers: service, instance, element, and their canonical
//! string forms.
//!
//! Grounded on `original_source/.../configuration/lola_service_instance_id.h`
//! and `service_instance_id.h`: the leading nibble of `InstanceId`'s hash
//! string disambiguates the binding (`0` for Lola) within a unified key
//! space shared with other bindings this crate does not implement.

use std::fmt;

/// 16-bit service identifier; canonical path form is a 16-hex-digit,
/// zero-padded lowercase string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceId(pub u16);

impl ServiceId {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// `<service_id:016x>` as used in SHM names and discovery/marker paths.
    pub fn to_path_hex(self) -> String {
        format!("{:016x}", self.0)
    }

    /// Decimal form used by the discovery tree's directory names.
    pub fn to_path_decimal(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// 16-bit instance identifier; canonical path form is a 5-hex-digit,
/// zero-padded lowercase string whose leading nibble encodes the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u16);

/// Leading hex nibble tagging a Lola-binding hash string within the
/// cross-binding key space (`1` is reserved for SOME/IP upstream; this
/// crate never emits it).
const LOLA_BINDING_NIBBLE: u8 = 0;

impl InstanceId {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// `<instance_id:05x>`, zero-padded to 5 hex digits (not the natural
    /// 4-digit width of a u16 — this is the observed canonical form).
    pub fn to_path_hex(self) -> String {
        format!("{:05x}", self.0)
    }

    pub fn to_path_decimal(self) -> String {
        self.0.to_string()
    }

    /// Cross-binding comparable hash string: binding nibble followed by
    /// the zero-padded instance value.
    pub fn to_hash_string(self) -> String {
        format!("{:x}{:04x}", LOLA_BINDING_NIBBLE, self.0)
    }

    /// Strict parse used by discovery's instance-id directory names:
    /// rejects empty strings and any non-decimal-digit content.
    pub fn parse_decimal(value: &str) -> Option<InstanceId> {
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        value.parse::<u16>().ok().map(InstanceId)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#05x}", self.0)
    }
}

/// Kind of element a `ElementFqId` names within a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Event,
    Field,
    Method,
}

/// Uniquely names a service element (event/field/method) within a process:
/// `(service_id, element_id, instance_id, element_type)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementFqId {
    pub service_id: ServiceId,
    pub element_id: u16,
    pub instance_id: InstanceId,
    pub element_type: ElementType,
}

impl ElementFqId {
    pub fn new(
        service_id: ServiceId,
        element_id: u16,
        instance_id: InstanceId,
        element_type: ElementType,
    ) -> Self {
        Self {
            service_id,
            element_id,
            instance_id,
            element_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_id_path_hex_is_16_digits() {
        let id = ServiceId::new(0x1234);
        assert_eq!(id.to_path_hex(), "0000000000001234");
    }

    #[test]
    fn instance_id_path_hex_is_5_digits() {
        let id = InstanceId::new(1);
        assert_eq!(id.to_path_hex(), "00001");
    }

    #[test]
    fn instance_id_parse_decimal_accepts_boundary_values() {
        assert_eq!(InstanceId::parse_decimal("0"), Some(InstanceId(0)));
        assert_eq!(InstanceId::parse_decimal("00000"), Some(InstanceId(0)));
        assert_eq!(InstanceId::parse_decimal("65535"), Some(InstanceId(65535)));
    }

    #[test]
    fn instance_id_parse_decimal_rejects_invalid() {
        assert_eq!(InstanceId::parse_decimal(""), None);
        assert_eq!(InstanceId::parse_decimal("a"), None);
        assert_eq!(InstanceId::parse_decimal("-1"), None);
        assert_eq!(InstanceId::parse_decimal("65536"), None);
    }

    #[test]
    fn instance_id_hash_string_carries_binding_nibble() {
        assert_eq!(InstanceId::new(1).to_hash_string(), "00001");
    }
}
