//! Deployment configuration data model for the LoLa mw::com binding.
//!
//! The bespoke configuration-JSON grammar (`score::json::Object` parsing,
//! schema validation against the full system configuration) is an external
//! collaborator: this crate only defines the typed records that grammar
//! produces and the handful of cross-cutting invariants that apply
//! to them, mirroring the division of labour in `ServiceTypeDeployment` /
//! `ServiceInstanceDeployment` in the upstream C++.

mod deployment;
mod identifiers;
mod quality;

pub use deployment::{
    LolaEventInstanceDeployment, LolaFieldInstanceDeployment, LolaMethodInstanceDeployment,
    LolaServiceInstanceDeployment, ServiceTypeDeployment,
};
pub use identifiers::{HandleType, InstanceSpecifier, ServiceIdentifierType};
pub use quality::QualityType;

use thiserror::Error;

/// Errors raised while building or validating the configuration data model.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading configuration: {0}")]
    Io(String),

    #[error("failed to parse configuration JSON: {0}")]
    Parse(String),

    #[error("configuration validation failed: {0}")]
    Validation(String),

    #[error("missing required field: {0}")]
    MissingField(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
