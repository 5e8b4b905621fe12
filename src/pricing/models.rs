use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome classification of a quote computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceStatus {
    Success,
    Cached,
    Fallback,
    Error,
}

impl PriceStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PriceStatus::Success => "success",
            PriceStatus::Cached => "cached",
            PriceStatus::Fallback => "fallback",
            PriceStatus::Error => "error",
        }
    }
}

/// Per-factor cost multipliers resolved from the rules tables. The total is
/// always the product of the individual factors, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Multipliers {
    pub material: f64,
    pub quantity: f64,
    pub thickness: f64,
    pub copper_weight: f64,
    pub via_hole: f64,
    pub tolerance: f64,
    pub color: f64,
    pub surface_finish: f64,
    pub silkscreen: f64,
    pub high_spec: f64,
}

impl Multipliers {
    pub fn total(&self) -> f64 {
        self.material
            * self.quantity
            * self.thickness
            * self.copper_weight
            * self.via_hole
            * self.tolerance
            * self.color
            * self.surface_finish
            * self.silkscreen
            * self.high_spec
    }

    pub fn as_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("material".to_owned(), self.material);
        map.insert("quantity".to_owned(), self.quantity);
        map.insert("thickness".to_owned(), self.thickness);
        map.insert("copper_weight".to_owned(), self.copper_weight);
        map.insert("via_hole".to_owned(), self.via_hole);
        map.insert("tolerance".to_owned(), self.tolerance);
        map.insert("color".to_owned(), self.color);
        map.insert("surface_finish".to_owned(), self.surface_finish);
        map.insert("silkscreen".to_owned(), self.silkscreen);
        map.insert("high_spec".to_owned(), self.high_spec);
        map.insert("total".to_owned(), self.total());
        map
    }
}

impl Default for Multipliers {
    fn default() -> Self {
        Self {
            material: 1.0,
            quantity: 1.0,
            thickness: 1.0,
            copper_weight: 1.0,
            via_hole: 1.0,
            tolerance: 1.0,
            color: 1.0,
            surface_finish: 1.0,
            silkscreen: 1.0,
            high_spec: 1.0,
        }
    }
}

/// Itemized cost decomposition in EGP. Every component is traceable to one
/// multiplier or one fixed rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base_price_egp: f64,
    pub material_cost_egp: f64,
    pub quantity_cost_egp: f64,
    pub thickness_cost_egp: f64,
    pub copper_cost_egp: f64,
    pub via_cost_egp: f64,
    pub tolerance_cost_egp: f64,
    pub color_cost_egp: f64,
    pub surface_finish_cost_egp: f64,
    pub engineering_fee_egp: f64,
    pub shipping_cost_egp: f64,
    pub customs_cost_egp: f64,
    pub tax_egp: f64,
}

impl PriceBreakdown {
    /// Sum of the base price and all per-component costs, before fees,
    /// shipping, customs and tax.
    pub fn subtotal_egp(&self) -> f64 {
        self.base_price_egp
            + self.material_cost_egp
            + self.quantity_cost_egp
            + self.thickness_cost_egp
            + self.copper_cost_egp
            + self.via_cost_egp
            + self.tolerance_cost_egp
            + self.color_cost_egp
            + self.surface_finish_cost_egp
    }

    pub fn total_egp(&self) -> f64 {
        self.subtotal_egp()
            + self.engineering_fee_egp
            + self.shipping_cost_egp
            + self.customs_cost_egp
            + self.tax_egp
    }
}

/// Full result of one pricing computation, as stored in the cache and
/// projected into the API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceResult {
    pub status: PriceStatus,
    pub breakdown: PriceBreakdown,
    pub multipliers: Multipliers,
    pub calculation_time_ms: f64,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ab_variant: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl PriceResult {
    pub fn new(status: PriceStatus, breakdown: PriceBreakdown, multipliers: Multipliers) -> Self {
        Self {
            status,
            breakdown,
            multipliers,
            calculation_time_ms: 0.0,
            from_cache: false,
            cache_key: None,
            tenant_id: None,
            ab_variant: None,
            warnings: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn to_response(&self) -> QuoteResponse {
        let breakdown = &self.breakdown;
        QuoteResponse {
            direct_cost_egp: round2(breakdown.subtotal_egp()),
            shipping_cost_egp: round2(breakdown.shipping_cost_egp),
            customs_rate_egp: round2(breakdown.customs_cost_egp),
            final_price_egp: round2(breakdown.total_egp()),
            currency: "EGP",
            details: QuoteDetails {
                base_price_egp: round2(breakdown.base_price_egp),
                material_cost_egp: round2(breakdown.material_cost_egp),
                quantity_cost_egp: round2(breakdown.quantity_cost_egp),
                thickness_cost_egp: round2(breakdown.thickness_cost_egp),
                copper_cost_egp: round2(breakdown.copper_cost_egp),
                via_cost_egp: round2(breakdown.via_cost_egp),
                tolerance_cost_egp: round2(breakdown.tolerance_cost_egp),
                color_cost_egp: round2(breakdown.color_cost_egp),
                surface_finish_cost_egp: round2(breakdown.surface_finish_cost_egp),
                engineering_fee_egp: round2(breakdown.engineering_fee_egp),
                tax_egp: round2(breakdown.tax_egp),
                multipliers: self.multipliers.as_map(),
                calculation_time_ms: self.calculation_time_ms,
                from_cache: self.from_cache,
                status: self.status,
                tenant_id: self.tenant_id.clone(),
                ab_variant: self.ab_variant.clone(),
                warnings: self.warnings.clone(),
            },
        }
    }
}

/// Wire shape of a successful quote.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteResponse {
    pub direct_cost_egp: f64,
    pub shipping_cost_egp: f64,
    pub customs_rate_egp: f64,
    pub final_price_egp: f64,
    pub currency: &'static str,
    pub details: QuoteDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteDetails {
    pub base_price_egp: f64,
    pub material_cost_egp: f64,
    pub quantity_cost_egp: f64,
    pub thickness_cost_egp: f64,
    pub copper_cost_egp: f64,
    pub via_cost_egp: f64,
    pub tolerance_cost_egp: f64,
    pub color_cost_egp: f64,
    pub surface_finish_cost_egp: f64,
    pub engineering_fee_egp: f64,
    pub tax_egp: f64,
    pub multipliers: BTreeMap<String, f64>,
    pub calculation_time_ms: f64,
    pub from_cache: bool,
    pub status: PriceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ab_variant: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_total_is_product_of_factors() {
        let multipliers = Multipliers {
            material: 2.0,
            quantity: 1.5,
            ..Multipliers::default()
        };
        assert!((multipliers.total() - 3.0).abs() < 1e-12);
        let map = multipliers.as_map();
        assert_eq!(map.get("total").copied(), Some(3.0));
    }

    #[test]
    fn breakdown_total_sums_components_fees_and_tax() {
        let breakdown = PriceBreakdown {
            base_price_egp: 100.0,
            material_cost_egp: 50.0,
            engineering_fee_egp: 200.0,
            tax_egp: 21.0,
            ..PriceBreakdown::default()
        };
        assert!((breakdown.subtotal_egp() - 150.0).abs() < 1e-9);
        assert!((breakdown.total_egp() - 371.0).abs() < 1e-9);
    }

    #[test]
    fn response_rounds_monetary_fields() {
        let mut breakdown = PriceBreakdown::default();
        breakdown.base_price_egp = 10.005;
        let result = PriceResult::new(PriceStatus::Success, breakdown, Multipliers::default());
        let response = result.to_response();
        assert!((response.details.base_price_egp - 10.01).abs() < 1e-9);
        assert_eq!(response.currency, "EGP");
    }
}
