//! Runtime bootstrap: telemetry and wiring settings into the services.

pub mod bootstrap;
pub mod error;
pub mod telemetry;
