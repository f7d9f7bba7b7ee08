use crate::{ConfigError, QualityType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// `CALL_QUEUE_SIZE` is fixed at 1 throughout the binding: a configured `queue_size` other than `1` is a validation
/// error rather than a silently-ignored value.
pub const CALL_QUEUE_SIZE: u8 = 1;

/// Per-event instance deployment (`events[name]` in the service instance config).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LolaEventInstanceDeployment {
    pub slots: Option<u16>,
    pub max_subscribers: Option<u16>,
    #[serde(default)]
    pub tracing_slots: u16,
}

impl LolaEventInstanceDeployment {
    /// Effective sample-slot count = configured slots + tracing slots; must
    /// fit the `u16` counter width.
    pub fn effective_slot_count(&self, configured_slots: u16) -> Result<u16, ConfigError> {
        let slots = self.slots.unwrap_or(configured_slots);
        slots.checked_add(self.tracing_slots).ok_or_else(|| {
            ConfigError::Validation(format!(
                "event slot count overflow: {slots} configured slots + {} tracing slots",
                self.tracing_slots
            ))
        })
    }
}

/// Per-field instance deployment; same shape as events (fields are
/// event-like in their slot/subscriber bookkeeping).
pub type LolaFieldInstanceDeployment = LolaEventInstanceDeployment;

/// Per-method instance deployment (`methods[name]` in the service instance config).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LolaMethodInstanceDeployment {
    pub queue_size: Option<u8>,
}

impl LolaMethodInstanceDeployment {
    /// Honours a configured queue size of `1`/unset; rejects anything else,
    /// since the core's `MethodCallQueue` only implements `CALL_QUEUE_SIZE
    /// == 1`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.queue_size {
            None | Some(CALL_QUEUE_SIZE) => Ok(()),
            Some(other) => Err(ConfigError::Validation(format!(
                "method queue_size {other} is not supported; CALL_QUEUE_SIZE is fixed at {CALL_QUEUE_SIZE}"
            ))),
        }
    }
}

/// Per-instance configuration for a LoLa-bound service instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LolaServiceInstanceDeployment {
    pub instance_id: Option<u16>,
    pub shared_memory_size: Option<usize>,
    pub control_qm_size: Option<usize>,
    pub control_b_size: Option<usize>,
    #[serde(default)]
    pub events: HashMap<String, LolaEventInstanceDeployment>,
    #[serde(default)]
    pub fields: HashMap<String, LolaFieldInstanceDeployment>,
    #[serde(default)]
    pub methods: HashMap<String, LolaMethodInstanceDeployment>,
    #[serde(default)]
    pub allowed_consumer: HashMap<QualityType, Vec<u32>>,
    #[serde(default)]
    pub allowed_provider: HashMap<QualityType, Vec<u32>>,
    #[serde(default)]
    pub strict_permissions: bool,
    /// Quality declared for this instance; validated against the process's
    /// declared quality in [`LolaServiceInstanceDeployment::validate`].
    #[serde(default = "default_quality")]
    pub quality: QualityType,
}

fn default_quality() -> QualityType {
    QualityType::AsilQm
}

impl LolaServiceInstanceDeployment {
    /// Validates the cross-cutting invariants that apply to an
    /// instance deployment: a `ServiceInstanceDeployment`'s quality must not
    /// exceed the process's declared quality, and every configured method's
    /// queue size must be supported.
    pub fn validate(&self, process_quality: QualityType) -> Result<(), ConfigError> {
        if !self.quality.is_within(process_quality) {
            return Err(ConfigError::Validation(format!(
                "instance quality {:?} exceeds process quality {:?}",
                self.quality, process_quality
            )));
        }
        for (name, method) in &self.methods {
            method
                .validate()
                .map_err(|e| ConfigError::Validation(format!("method '{name}': {e}")))?;
        }
        Ok(())
    }
}

/// Compile-time-static per-service-type deployment: the event/field/method
/// ID tables shared by every instance of the service type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceTypeDeployment {
    pub service_id: u16,
    #[serde(default)]
    pub events: HashMap<String, u16>,
    #[serde(default)]
    pub fields: HashMap<String, u16>,
    #[serde(default)]
    pub methods: HashMap<String, u16>,
}

impl ServiceTypeDeployment {
    /// Maps an already-parsed JSON value onto the typed fields. The bespoke
    /// config-JSON grammar/schema validation is the external collaborator;
    /// this crate only owns the typed fields the grammar produces.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let deployment: ServiceTypeDeployment = serde_json::from_value(value)?;
        deployment.validate()?;
        Ok(deployment)
    }

    /// Event IDs and field IDs are disjoint within a single service type
    ///.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let event_ids: HashSet<u16> = self.events.values().copied().collect();
        for field_id in self.fields.values() {
            if event_ids.contains(field_id) {
                return Err(ConfigError::Validation(format!(
                    "field id {field_id} collides with an event id in service {}",
                    self.service_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_slot_count_adds_tracing_slots() {
        let dep = LolaEventInstanceDeployment {
            slots: Some(10),
            max_subscribers: None,
            tracing_slots: 5,
        };
        assert_eq!(dep.effective_slot_count(0).unwrap(), 15);
    }

    #[test]
    fn effective_slot_count_overflow_is_rejected() {
        let dep = LolaEventInstanceDeployment {
            slots: Some(u16::MAX),
            max_subscribers: None,
            tracing_slots: 1,
        };
        assert!(dep.effective_slot_count(0).is_err());
    }

    #[test]
    fn method_queue_size_other_than_one_is_rejected() {
        let ok = LolaMethodInstanceDeployment { queue_size: Some(1) };
        assert!(ok.validate().is_ok());
        let bad = LolaMethodInstanceDeployment { queue_size: Some(4) };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn instance_quality_cannot_exceed_process_quality() {
        let mut dep = LolaServiceInstanceDeployment {
            quality: QualityType::AsilB,
            ..Default::default()
        };
        assert!(dep.validate(QualityType::AsilQm).is_err());
        dep.quality = QualityType::AsilQm;
        assert!(dep.validate(QualityType::AsilB).is_ok());
    }

    #[test]
    fn service_type_event_field_ids_must_be_disjoint() {
        let mut deployment = ServiceTypeDeployment {
            service_id: 0x1234,
            ..Default::default()
        };
        deployment.events.insert("speed".to_string(), 1);
        deployment.fields.insert("status".to_string(), 1);
        assert!(deployment.validate().is_err());

        deployment.fields.insert("status".to_string(), 2);
        assert!(deployment.validate().is_ok());
    }

    #[test]
    fn service_type_deployment_from_json() {
        let value = serde_json::json!({
            "service_id": 0x1234,
            "events": {"speed": 1},
            "fields": {"status": 2},
            "methods": {"reset": 3}
        });
        let deployment = ServiceTypeDeployment::from_json_value(value).unwrap();
        assert_eq!(deployment.service_id, 0x1234);
        assert_eq!(deployment.events["speed"], 1);
    }
}
