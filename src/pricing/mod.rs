//! The quoting core: parameter normalization and validation, the rules
//! tables, the price calculators, caching, tenant overrides, experiments
//! and the migration-aware engine that ties them together.

pub mod abtest;
pub mod cache;
pub mod calculator;
pub mod domain;
pub mod engine;
pub mod migration;
pub mod models;
pub mod normalizer;
pub mod rules;
pub mod tenant;
pub mod validator;

pub use domain::{BoardDimensions, ManufacturingParameters};
pub use engine::{EngineSettings, PricingEngine, QuoteInput};
pub use models::{PriceResult, PriceStatus, QuoteResponse};
