//! The unified quoting pipeline: normalize, validate, consult the cache,
//! pick a computation path, price, record, store. Calculation failures after
//! validation never surface to the caller; they degrade to the fallback
//! formula with the reason attached as a warning.

use std::time::Instant;

use metrics::{counter, histogram};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::error::{CalculationError, PricingError};
use crate::pricing::abtest::{
    AbTestManager, PricingAlgorithm, CONTROL_VARIANT, PRICING_ALGORITHM_EXPERIMENT,
};
use crate::pricing::cache::{CacheKey, CacheSettings, CacheStats, CacheTier, PricingCache};
use crate::pricing::calculator::{
    fallback_quote, ExportRates, LocalCalculator, OutsourcedCalculator, PanelCalculator,
};
use crate::pricing::domain::{BaseMaterial, BoardDimensions, ManufacturingParameters};
use crate::pricing::migration::{
    EngineChoice, MigrationController, MigrationStatus, MigrationStrategy,
};
use crate::pricing::models::{Multipliers, PriceBreakdown, PriceResult, PriceStatus};
use crate::pricing::normalizer::validate_and_normalize;
use crate::pricing::rules::RulesEngine;
use crate::pricing::tenant::{TenantPricingConfig, TenantRegistry};
use crate::pricing::validator::{validate_dimensions, validate_parameters, validate_quantity};

const FLAT_SHIPPING_EGP: f64 = 45.0;
const SMALL_ORDER_ENGINEERING_RATE: f64 = 0.05;
const CUSTOMS_RATE: f64 = 0.05;
const UNIFIED_VAT_RATE: f64 = 0.14;

/// Everything the engine needs from deployment configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub export_rates: ExportRates,
    pub cache: CacheSettings,
    pub migration_strategy: Option<MigrationStrategy>,
    pub rollout_percentage: u8,
    /// Material families routed to the outsourced fabrication line.
    pub outsourced_materials: Vec<BaseMaterial>,
}

/// One quote request after HTTP decoding.
#[derive(Debug, Clone)]
pub struct QuoteInput {
    pub parameters: Map<String, Value>,
    pub width_mm: f64,
    pub height_mm: f64,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
}

pub struct PricingEngine {
    rules: RulesEngine,
    tenants: TenantRegistry,
    ab_tests: AbTestManager,
    migration: MigrationController,
    cache: PricingCache,
    local: LocalCalculator,
    outsourced: OutsourcedCalculator,
    panel: PanelCalculator,
    outsourced_materials: Vec<BaseMaterial>,
}

impl PricingEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let migration = match settings.migration_strategy {
            Some(strategy) => MigrationController::new(strategy, settings.rollout_percentage),
            None => MigrationController::default(),
        };
        Self {
            rules: RulesEngine::default(),
            tenants: TenantRegistry::default(),
            ab_tests: AbTestManager::default(),
            migration,
            cache: PricingCache::new(settings.cache),
            local: LocalCalculator::default(),
            outsourced: OutsourcedCalculator::new(settings.export_rates),
            panel: PanelCalculator,
            outsourced_materials: settings.outsourced_materials,
        }
    }

    /// Full quoting pipeline. The only error paths are parameter and
    /// dimension validation; any later failure degrades to a fallback quote.
    pub async fn quote(&self, input: &QuoteInput) -> Result<PriceResult, PricingError> {
        let started = Instant::now();

        let (params, mut warnings) = validate_and_normalize(&input.parameters)?;
        let dims = BoardDimensions::new(input.width_mm, input.height_mm);
        validate_dimensions(&dims)?;
        validate_quantity(params.quantity)?;

        let capability = validate_parameters(&params, &dims);
        warnings.extend(capability.errors);
        warnings.extend(capability.warnings);

        let tenant_id = input.tenant_id.as_deref();
        let cache_key = match CacheKey::build(&params, &dims, tenant_id) {
            Ok(key) => Some(key),
            Err(err) => {
                warn!(error = %err, "failed to build cache key, skipping cache");
                None
            }
        };

        if let Some(key) = &cache_key {
            if let Some(mut hit) = self.cache.get(key).await {
                hit.status = PriceStatus::Cached;
                hit.from_cache = true;
                hit.calculation_time_ms = elapsed_ms(started);
                let variant = hit
                    .ab_variant
                    .clone()
                    .unwrap_or_else(|| CONTROL_VARIANT.to_owned());
                counter!("pricing_quotes_total", "status" => "cached", "variant" => variant)
                    .increment(1);
                return Ok(hit);
            }
        }

        let request_key = input
            .request_id
            .as_deref()
            .or(input.user_id.as_deref())
            .or(tenant_id);
        let choice = self.migration.choose(request_key);
        let variant = self.ab_tests.variant_for(
            PRICING_ALGORITHM_EXPERIMENT,
            input.user_id.as_deref(),
            tenant_id,
        );
        let algorithm = self
            .ab_tests
            .algorithm_for(PRICING_ALGORITHM_EXPERIMENT, &variant);
        let tenant_config = self.tenants.config_for(tenant_id);

        let mut result = self.compute(choice, &params, &dims, &tenant_config, algorithm);
        result.warnings.splice(0..0, warnings);
        result.tenant_id = Some(tenant_config.tenant_id.clone());
        result.ab_variant = Some(variant.clone());
        result.cache_key = cache_key.as_ref().map(|k| k.as_str().to_owned());
        result.calculation_time_ms = elapsed_ms(started);

        // Counters carry the experiment arm so variants can be compared
        // straight off the metrics endpoint.
        counter!(
            "pricing_quotes_total",
            "status" => result.status.label(),
            "variant" => variant
        )
        .increment(1);
        histogram!("pricing_calculation_duration_ms").record(result.calculation_time_ms);
        info!(
            tenant_id = %tenant_config.tenant_id,
            status = result.status.label(),
            total_egp = result.breakdown.total_egp(),
            "quote computed"
        );

        // Fallback prices are transient; caching them would pin bad quotes.
        if result.status == PriceStatus::Success {
            if let Some(key) = &cache_key {
                self.cache.set(key, &result).await;
            }
        }
        Ok(result)
    }

    fn compute(
        &self,
        choice: EngineChoice,
        params: &ManufacturingParameters,
        dims: &BoardDimensions,
        tenant: &TenantPricingConfig,
        algorithm: PricingAlgorithm,
    ) -> PriceResult {
        match choice {
            EngineChoice::Old => self.compute_old(params, dims),
            EngineChoice::New => match self.compute_new(params, dims, tenant, algorithm) {
                Ok(result) => result,
                Err(err) => self.fallback(params, dims, &err),
            },
            EngineChoice::NewWithFallback => {
                match self.compute_new(params, dims, tenant, algorithm) {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(error = %err, "unified path failed, using legacy path");
                        let mut result = self.compute_old(params, dims);
                        result
                            .metadata
                            .insert("fallback_reason".to_owned(), json!(err.to_string()));
                        result
                    }
                }
            }
            EngineChoice::Comparison => {
                let old = self.compute_old(params, dims);
                match self.compute_new(params, dims, tenant, algorithm) {
                    Ok(mut new) => {
                        if let Some(warning) = crate::pricing::migration::comparison_warning(
                            new.breakdown.total_egp(),
                            old.breakdown.total_egp(),
                        ) {
                            warn!("{warning}");
                            new.warnings.push(warning);
                        }
                        new.metadata.insert(
                            "comparison_old_total_egp".to_owned(),
                            json!(old.breakdown.total_egp()),
                        );
                        new
                    }
                    Err(err) => {
                        warn!(error = %err, "unified path failed during comparison");
                        old
                    }
                }
            }
        }
    }

    /// Legacy path: route to the local or outsourced formula by material.
    fn compute_old(&self, params: &ManufacturingParameters, dims: &BoardDimensions) -> PriceResult {
        if self.outsourced_materials.contains(&params.base_material) {
            match self.outsourced.calculate(dims, params) {
                Ok(breakdown) => {
                    let mut result = PriceResult::new(
                        PriceStatus::Success,
                        breakdown,
                        Multipliers::default(),
                    );
                    result
                        .metadata
                        .insert("engine".to_owned(), json!("legacy_outsourced"));
                    return result;
                }
                Err(err) => return self.fallback(params, dims, &err),
            }
        }
        match self.local.calculate(dims, params) {
            Ok(quote) => {
                let mut result =
                    PriceResult::new(PriceStatus::Success, quote.breakdown, quote.multipliers);
                result
                    .metadata
                    .insert("engine".to_owned(), json!("legacy_local"));
                result.metadata.insert(
                    "extra_working_days".to_owned(),
                    json!(quote.extra_working_days),
                );
                result.metadata.insert(
                    "price_per_cm2_egp".to_owned(),
                    json!(quote.price_per_cm2_egp),
                );
                result
            }
            Err(err) => self.fallback(params, dims, &err),
        }
    }

    /// Unified path: panel base price scaled by the tenant's rules tables,
    /// with additive per-factor attribution.
    fn compute_new(
        &self,
        params: &ManufacturingParameters,
        dims: &BoardDimensions,
        tenant: &TenantPricingConfig,
        algorithm: PricingAlgorithm,
    ) -> Result<PriceResult, CalculationError> {
        let rules = RulesEngine::new(tenant.tables());
        let multipliers = rules.calculate_multipliers(params);

        let mut base = self.panel.base_price(dims, params)?;
        base *= match algorithm {
            PricingAlgorithm::Legacy => 1.0,
            // Improved nesting on the production panels.
            PricingAlgorithm::Optimized => 0.97,
            // Demand-sensitive margin adjustment.
            PricingAlgorithm::MlBased => {
                if params.quantity >= 50 {
                    0.95
                } else if params.quantity >= 10 {
                    1.0
                } else {
                    1.02
                }
            }
        };

        let mut breakdown = PriceBreakdown {
            base_price_egp: base,
            material_cost_egp: base * (multipliers.material - 1.0),
            quantity_cost_egp: base * (multipliers.quantity - 1.0),
            thickness_cost_egp: base * (multipliers.thickness - 1.0),
            copper_cost_egp: base * (multipliers.copper_weight - 1.0),
            via_cost_egp: base * (multipliers.via_hole - 1.0),
            tolerance_cost_egp: base * (multipliers.tolerance - 1.0),
            color_cost_egp: base * (multipliers.color - 1.0)
                + base * (multipliers.silkscreen - 1.0),
            surface_finish_cost_egp: base * (multipliers.surface_finish - 1.0)
                + base * (multipliers.high_spec - 1.0),
            shipping_cost_egp: FLAT_SHIPPING_EGP,
            customs_cost_egp: base * CUSTOMS_RATE,
            ..PriceBreakdown::default()
        };
        if params.quantity < 10 {
            breakdown.engineering_fee_egp = base * SMALL_ORDER_ENGINEERING_RATE;
        }
        breakdown.tax_egp =
            (breakdown.subtotal_egp() + breakdown.engineering_fee_egp) * UNIFIED_VAT_RATE;

        if !breakdown.total_egp().is_finite() {
            return Err(CalculationError::NonFinitePrice);
        }

        // Tenant discount or markup scales the whole quote uniformly.
        let adjusted = tenant.adjust_price(breakdown.total_egp());
        let total = breakdown.total_egp();
        if (adjusted - total).abs() > f64::EPSILON && total > 0.0 {
            scale_breakdown(&mut breakdown, adjusted / total);
        }

        let mut result = PriceResult::new(PriceStatus::Success, breakdown, multipliers);
        result
            .metadata
            .insert("engine".to_owned(), json!("unified"));
        result
            .metadata
            .insert("algorithm".to_owned(), json!(algorithm));
        for warning in rules.validate_multipliers(&result.multipliers) {
            result.warnings.push(warning);
        }
        Ok(result)
    }

    fn fallback(
        &self,
        params: &ManufacturingParameters,
        dims: &BoardDimensions,
        reason: &CalculationError,
    ) -> PriceResult {
        warn!(error = %reason, "falling back to the simplified formula");
        counter!("pricing_fallbacks_total").increment(1);
        let (breakdown, multipliers) = fallback_quote(dims, params);
        let mut result = PriceResult::new(PriceStatus::Fallback, breakdown, multipliers);
        result.warnings.push(format!("fallback pricing used: {reason}"));
        result
            .metadata
            .insert("engine".to_owned(), json!("fallback"));
        result
            .metadata
            .insert("fallback_reason".to_owned(), json!(reason.to_string()));
        result
    }

    pub fn pricing_info(&self) -> Value {
        self.rules.pricing_info()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn clear_cache(&self, tier: Option<CacheTier>) {
        self.cache.clear(tier).await;
    }

    pub fn tenant_config(&self, tenant_id: Option<&str>) -> TenantPricingConfig {
        self.tenants.config_for(tenant_id)
    }

    pub fn update_tenant_config(&self, config: TenantPricingConfig) {
        self.tenants.update(config);
    }

    pub fn tenant_ids(&self) -> Vec<String> {
        self.tenants.tenant_ids()
    }

    pub fn ab_status(&self) -> Vec<crate::pricing::abtest::Experiment> {
        self.ab_tests.status()
    }

    pub fn migration_status(&self) -> MigrationStatus {
        self.migration.status()
    }

    pub fn set_migration(&self, strategy: MigrationStrategy, rollout_percentage: u8) {
        self.migration.set_strategy(strategy, rollout_percentage);
    }
}

fn scale_breakdown(breakdown: &mut PriceBreakdown, factor: f64) {
    breakdown.base_price_egp *= factor;
    breakdown.material_cost_egp *= factor;
    breakdown.quantity_cost_egp *= factor;
    breakdown.thickness_cost_egp *= factor;
    breakdown.copper_cost_egp *= factor;
    breakdown.via_cost_egp *= factor;
    breakdown.tolerance_cost_egp *= factor;
    breakdown.color_cost_egp *= factor;
    breakdown.surface_finish_cost_egp *= factor;
    breakdown.engineering_fee_egp *= factor;
    breakdown.shipping_cost_egp *= factor;
    breakdown.customs_cost_egp *= factor;
    breakdown.tax_egp *= factor;
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
