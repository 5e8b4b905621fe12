//! Backend for PCB fabrication quoting: a tenant-aware pricing engine
//! behind a small HTTP API.

pub mod config;
pub mod error;
pub mod pricing;
pub mod server;
pub mod telemetry;
