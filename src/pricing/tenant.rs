//! Per-tenant pricing overrides. A tenant config replaces the material
//! table and quantity brackets wholesale and can add a flat discount or
//! markup on the final price. Unknown tenants silently use the default
//! config.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::pricing::domain::BaseMaterial;
use crate::pricing::rules::{
    default_material_multipliers, default_quantity_brackets, PricingTables, QuantityBrackets,
};

pub const DEFAULT_TENANT: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantPricingConfig {
    pub tenant_id: String,
    pub material_multipliers: BTreeMap<BaseMaterial, f64>,
    pub quantity_brackets: QuantityBrackets,
    pub discount_percentage: f64,
    pub markup_percentage: f64,
}

impl TenantPricingConfig {
    pub fn standard(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            material_multipliers: default_material_multipliers(),
            quantity_brackets: default_quantity_brackets(),
            discount_percentage: 0.0,
            markup_percentage: 0.0,
        }
    }

    /// Tables for the rules engine: tenant material and quantity overrides
    /// over the shared defaults.
    pub fn tables(&self) -> PricingTables {
        PricingTables {
            material: self.material_multipliers.clone(),
            quantity_brackets: self.quantity_brackets.clone(),
            ..PricingTables::default()
        }
    }

    /// Discount wins when both a discount and a markup are configured.
    pub fn adjust_price(&self, price: f64) -> f64 {
        if self.discount_percentage > 0.0 {
            price * (1.0 - self.discount_percentage / 100.0)
        } else if self.markup_percentage > 0.0 {
            price * (1.0 + self.markup_percentage / 100.0)
        } else {
            price
        }
    }
}

fn scaled_config(
    tenant_id: &str,
    material_scale: f64,
    bracket_scale: f64,
    discount_percentage: f64,
) -> TenantPricingConfig {
    let material_multipliers = default_material_multipliers()
        .into_iter()
        .map(|(material, multiplier)| (material, multiplier * material_scale))
        .collect();
    let quantity_brackets = default_quantity_brackets()
        .into_iter()
        .map(|(threshold, multiplier)| (threshold, multiplier * bracket_scale))
        .collect();
    TenantPricingConfig {
        tenant_id: tenant_id.to_owned(),
        material_multipliers,
        quantity_brackets,
        discount_percentage,
        markup_percentage: 0.0,
    }
}

pub struct TenantRegistry {
    configs: RwLock<HashMap<String, TenantPricingConfig>>,
}

impl Default for TenantRegistry {
    fn default() -> Self {
        let mut configs = HashMap::new();
        configs.insert(
            DEFAULT_TENANT.to_owned(),
            TenantPricingConfig::standard(DEFAULT_TENANT),
        );
        configs.insert(
            "enterprise".to_owned(),
            scaled_config("enterprise", 0.9, 0.9, 10.0),
        );
        configs.insert(
            "partner".to_owned(),
            scaled_config("partner", 0.85, 0.85, 15.0),
        );
        Self {
            configs: RwLock::new(configs),
        }
    }
}

impl TenantRegistry {
    /// Resolve a tenant config, falling back to the default tenant for
    /// unknown or absent identifiers.
    pub fn config_for(&self, tenant_id: Option<&str>) -> TenantPricingConfig {
        let configs = match self.configs.read() {
            Ok(configs) => configs,
            Err(poisoned) => poisoned.into_inner(),
        };
        tenant_id
            .and_then(|id| configs.get(id))
            .or_else(|| configs.get(DEFAULT_TENANT))
            .cloned()
            .unwrap_or_else(|| TenantPricingConfig::standard(DEFAULT_TENANT))
    }

    /// Replace a tenant's config wholesale.
    pub fn update(&self, config: TenantPricingConfig) {
        let mut configs = match self.configs.write() {
            Ok(configs) => configs,
            Err(poisoned) => poisoned.into_inner(),
        };
        info!(tenant_id = %config.tenant_id, "tenant pricing config updated");
        configs.insert(config.tenant_id.clone(), config);
    }

    pub fn tenant_ids(&self) -> Vec<String> {
        let configs = match self.configs.read() {
            Ok(configs) => configs,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut ids: Vec<String> = configs.keys().cloned().collect();
        ids.sort();
        ids
    }
}
