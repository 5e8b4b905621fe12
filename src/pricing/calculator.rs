//! The concrete price formulas. Three calculators share the cost model
//! vocabulary of [`PriceBreakdown`] but price very different supply chains:
//! local manufacturing in EGP, outsourced fabrication quoted in yuan and
//! imported, and a panel-utilization base price used by the unified engine.

use std::collections::BTreeMap;

use crate::error::CalculationError;
use crate::pricing::domain::{
    BaseMaterial, BoardDimensions, CopperWeight, DeliveryFormat, ManufacturingParameters,
    SolderMaskColor, Thickness, Tolerance,
};
use crate::pricing::models::{Multipliers, PriceBreakdown};
use crate::pricing::rules::default_material_multipliers;

pub const VAT_RATE: f64 = 0.14;
pub const ENGINEERING_FEE_EGP: f64 = 200.0;
pub const MAX_PANEL_WIDTH_CM: f64 = 38.0;
pub const MAX_PANEL_HEIGHT_CM: f64 = 28.0;

/// Exchange and freight rates for the outsourced route. The yuan rate is a
/// deployment setting; the buffer absorbs day-to-day drift.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRates {
    pub yuan_to_egp: f64,
    pub exchange_buffer: f64,
    pub engineering_fee_yuan: f64,
    pub price_per_m2_yuan: f64,
    pub shipping_per_kg_yuan: f64,
    pub customs_multiplier: f64,
}

impl Default for ExportRates {
    fn default() -> Self {
        Self {
            yuan_to_egp: 6.9,
            exchange_buffer: 1.05,
            engineering_fee_yuan: 50.0,
            price_per_m2_yuan: 480.0,
            shipping_per_kg_yuan: 60.0,
            customs_multiplier: 1.6,
        }
    }
}

impl ExportRates {
    pub fn effective_rate(&self) -> f64 {
        self.yuan_to_egp * self.exchange_buffer
    }
}

/// Result of the local formula, including delivery schedule effects.
#[derive(Debug, Clone)]
pub struct LocalQuote {
    pub breakdown: PriceBreakdown,
    pub multipliers: Multipliers,
    pub price_per_cm2_egp: f64,
    pub extra_working_days: u32,
}

/// Pricing for boards fabricated in-house.
#[derive(Debug, Clone)]
pub struct LocalCalculator {
    material_multipliers: BTreeMap<BaseMaterial, f64>,
}

impl Default for LocalCalculator {
    fn default() -> Self {
        Self {
            material_multipliers: default_material_multipliers(),
        }
    }
}

impl LocalCalculator {
    pub fn new(material_multipliers: BTreeMap<BaseMaterial, f64>) -> Self {
        Self {
            material_multipliers,
        }
    }

    pub fn calculate(
        &self,
        dims: &BoardDimensions,
        params: &ManufacturingParameters,
    ) -> Result<LocalQuote, CalculationError> {
        let area_cm2 = dims.area_cm2();
        if area_cm2 <= 0.0 {
            return Err(CalculationError::NonPositiveArea { area_cm2 });
        }
        check_panel_fit(dims)?;

        let price_per_cm2 = price_per_cm2_egp(area_cm2);
        let mut breakdown = PriceBreakdown {
            base_price_egp: area_cm2 * price_per_cm2,
            ..PriceBreakdown::default()
        };
        let mut extra_working_days = 0;

        // Costs are attributed sequentially so each component maps to
        // exactly one multiplier and the subtotal stays exact.
        let mut running = breakdown.base_price_egp;

        let thickness = local_thickness_multiplier(params);
        breakdown.thickness_cost_egp = running * (thickness - 1.0);
        running *= thickness;

        // Green is never surcharged; neither is the material's own
        // factory-default color.
        let color = if params.pcb_color == SolderMaskColor::Green
            || params.pcb_color == params.base_material.standard_color()
        {
            1.0
        } else {
            extra_working_days += 1;
            1.2
        };
        breakdown.color_cost_egp = running * (color - 1.0);
        running *= color;

        let copper = match params.outer_copper_weight {
            CopperWeight::ThirdOz | CopperWeight::OneOz => 1.0,
            CopperWeight::TwoOz | CopperWeight::ThreeOz => 2.5,
        };
        breakdown.copper_cost_egp = running * (copper - 1.0);
        running *= copper;

        let via = if params.min_via_hole.mm() < 0.3 { 1.3 } else { 1.0 };
        breakdown.via_cost_egp = running * (via - 1.0);
        running *= via;

        let tolerance = match params.board_outline_tolerance {
            Tolerance::Regular => 1.0,
            Tolerance::Precision => 1.3,
        };
        breakdown.tolerance_cost_egp = running * (tolerance - 1.0);
        running *= tolerance;

        let material = self
            .material_multipliers
            .get(&params.base_material)
            .copied()
            .unwrap_or(1.0);
        breakdown.material_cost_egp = running * (material - 1.0);
        running *= material;

        // Design count, panelization and the quantity bracket all scale the
        // whole order; they are attributed to the quantity component.
        let designs = 1.0 + (params.different_designs.saturating_sub(1) as f64) * 0.1;
        let delivery = if params.delivery_format == DeliveryFormat::PanelByCustomer {
            designs
        } else {
            1.0
        };
        let bracket = local_quantity_bracket(params);
        let order_factor = designs * delivery * bracket * params.quantity as f64;
        breakdown.quantity_cost_egp = running * (order_factor - 1.0);
        running *= order_factor;

        breakdown.tax_egp = running * VAT_RATE;
        breakdown.engineering_fee_egp = ENGINEERING_FEE_EGP;

        let total = breakdown.total_egp();
        if !total.is_finite() {
            return Err(CalculationError::NonFinitePrice);
        }

        let multipliers = Multipliers {
            material,
            quantity: bracket,
            thickness,
            copper_weight: copper,
            via_hole: via,
            tolerance,
            color,
            ..Multipliers::default()
        };

        Ok(LocalQuote {
            breakdown,
            multipliers,
            price_per_cm2_egp: price_per_cm2,
            extra_working_days,
        })
    }
}

/// Pricing for boards fabricated abroad and imported. All upstream prices
/// are quoted in yuan and converted at the buffered exchange rate.
#[derive(Debug, Clone, Default)]
pub struct OutsourcedCalculator {
    rates: ExportRates,
}

impl OutsourcedCalculator {
    pub fn new(rates: ExportRates) -> Self {
        Self { rates }
    }

    pub fn calculate(
        &self,
        dims: &BoardDimensions,
        params: &ManufacturingParameters,
    ) -> Result<PriceBreakdown, CalculationError> {
        let area_cm2 = dims.area_cm2();
        if area_cm2 <= 0.0 {
            return Err(CalculationError::NonPositiveArea { area_cm2 });
        }
        let rate = self.rates.effective_rate();
        let quantity = params.quantity as f64;

        let direct = (self.rates.engineering_fee_yuan + dims.area_m2 * self.rates.price_per_m2_yuan)
            * quantity
            * rate;

        let volume_cm3 =
            (dims.width_mm / 10.0) * (dims.height_mm / 10.0) * (params.thickness.mm() / 10.0);
        let weight_kg =
            volume_cm3 * params.base_material.density_g_per_cm3() * quantity / 1000.0;
        let shipping = weight_kg * self.rates.shipping_per_kg_yuan * rate;

        let customs_total = (direct + shipping) * self.rates.customs_multiplier;
        let margin = if dims.area_m2 >= 1.0 {
            1.4
        } else if dims.area_m2 >= 0.5 {
            1.5
        } else {
            1.6
        };
        let final_price = customs_total * margin;
        if !final_price.is_finite() {
            return Err(CalculationError::NonFinitePrice);
        }

        Ok(PriceBreakdown {
            base_price_egp: direct,
            shipping_cost_egp: shipping,
            customs_cost_egp: final_price - direct - shipping,
            ..PriceBreakdown::default()
        })
    }
}

/// Base order price from panel utilization, used by the unified engine
/// before the rules multipliers are applied.
#[derive(Debug, Clone, Default)]
pub struct PanelCalculator;

impl PanelCalculator {
    const SETUP_FEE_EGP: f64 = 25.0;
    const MINIMUM_ORDER_EGP: f64 = 50.0;

    pub fn base_price(
        &self,
        dims: &BoardDimensions,
        params: &ManufacturingParameters,
    ) -> Result<f64, CalculationError> {
        let area_cm2 = dims.area_cm2();
        if area_cm2 <= 0.0 {
            return Err(CalculationError::NonPositiveArea { area_cm2 });
        }
        let per_board = area_cm2 * price_per_cm2_egp(area_cm2);
        let mut base = per_board * params.quantity as f64 * self.utilization_multiplier(dims);
        if params.quantity < 5 {
            base += Self::SETUP_FEE_EGP;
        }
        let base = base.max(Self::MINIMUM_ORDER_EGP);
        if !base.is_finite() {
            return Err(CalculationError::NonFinitePrice);
        }
        Ok(base)
    }

    /// Boards that pack a standard panel densely waste less laminate.
    fn utilization_multiplier(&self, dims: &BoardDimensions) -> f64 {
        let w_cm = dims.width_mm / 10.0;
        let h_cm = dims.height_mm / 10.0;
        let fit = |w: f64, h: f64| -> f64 {
            ((MAX_PANEL_WIDTH_CM / w).floor() * (MAX_PANEL_HEIGHT_CM / h).floor()).max(0.0)
        };
        let boards = fit(w_cm, h_cm).max(fit(h_cm, w_cm)).max(1.0);
        let utilization =
            (boards * dims.area_cm2()) / (MAX_PANEL_WIDTH_CM * MAX_PANEL_HEIGHT_CM);
        if utilization >= 0.75 {
            0.7
        } else if utilization >= 0.5 {
            0.8
        } else if utilization >= 0.25 {
            0.9
        } else {
            1.0
        }
    }
}

/// Last-resort quote used when every richer calculator has failed. Pure
/// arithmetic over already-validated inputs; cannot fail.
pub fn fallback_quote(
    dims: &BoardDimensions,
    params: &ManufacturingParameters,
) -> (PriceBreakdown, Multipliers) {
    const FALLBACK_RATE_EGP_PER_CM2: f64 = 2.0;

    let base = dims.area_cm2().max(0.0) * FALLBACK_RATE_EGP_PER_CM2;
    let material = default_material_multipliers()
        .get(&params.base_material)
        .copied()
        .unwrap_or(1.0);
    let bracket = if params.quantity <= 1 {
        2.0
    } else if params.quantity <= 3 {
        1.5
    } else {
        1.0
    };

    let mut breakdown = PriceBreakdown {
        base_price_egp: base,
        ..PriceBreakdown::default()
    };
    let mut running = base;
    breakdown.material_cost_egp = running * (material - 1.0);
    running *= material;
    let order_factor = bracket * params.quantity as f64;
    breakdown.quantity_cost_egp = running * (order_factor - 1.0);
    running *= order_factor;
    breakdown.tax_egp = running * VAT_RATE;
    breakdown.engineering_fee_egp = ENGINEERING_FEE_EGP;

    let multipliers = Multipliers {
        material,
        quantity: bracket,
        ..Multipliers::default()
    };
    (breakdown, multipliers)
}

/// Area-tiered local rate in EGP per cm².
fn price_per_cm2_egp(area_cm2: f64) -> f64 {
    if area_cm2 <= 1_000.0 {
        1.6
    } else if area_cm2 <= 1_500.0 {
        1.5
    } else if area_cm2 <= 2_000.0 {
        1.4
    } else if area_cm2 <= 2_500.0 {
        1.3
    } else {
        1.2
    }
}

fn check_panel_fit(dims: &BoardDimensions) -> Result<(), CalculationError> {
    let w_cm = dims.width_mm / 10.0;
    let h_cm = dims.height_mm / 10.0;
    let fits = (w_cm <= MAX_PANEL_WIDTH_CM && h_cm <= MAX_PANEL_HEIGHT_CM)
        || (w_cm <= MAX_PANEL_HEIGHT_CM && h_cm <= MAX_PANEL_WIDTH_CM);
    if fits {
        Ok(())
    } else {
        Err(CalculationError::OversizedPanel {
            width_cm: w_cm,
            height_cm: h_cm,
            max_width_cm: MAX_PANEL_WIDTH_CM,
            max_height_cm: MAX_PANEL_HEIGHT_CM,
        })
    }
}

fn local_thickness_multiplier(params: &ManufacturingParameters) -> f64 {
    // Flex laminates are priced by the material family alone.
    if params.base_material == BaseMaterial::Flex {
        return 1.0;
    }
    match params.thickness {
        Thickness::T0_4 => 1.4,
        Thickness::T0_6 => 1.3,
        Thickness::T0_8 => 1.2,
        Thickness::T2_0 => 1.3,
        // Thicknesses without a surcharge entry price at the standard rate.
        Thickness::T1_0 | Thickness::T1_2 | Thickness::T1_6 | Thickness::T2_4 => 1.0,
    }
}

fn local_quantity_bracket(params: &ManufacturingParameters) -> f64 {
    match params.base_material {
        BaseMaterial::Fr4 => {
            if params.quantity >= 5 {
                1.0
            } else if params.quantity >= 3 {
                1.5
            } else {
                2.0
            }
        }
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::domain::{SolderMaskColor, ViaHole};

    fn small_board() -> BoardDimensions {
        BoardDimensions::new(50.0, 50.0)
    }

    #[test]
    fn reference_single_board_quote() {
        // 50x50mm FR-4, one board, all defaults otherwise:
        // 25cm² x 1.6 = 40, x2.0 bracket = 80, +14% VAT = 91.2, +200 fee.
        let params = ManufacturingParameters {
            quantity: 1,
            ..ManufacturingParameters::default()
        };
        let quote = LocalCalculator::default()
            .calculate(&small_board(), &params)
            .unwrap();
        assert!((quote.breakdown.base_price_egp - 40.0).abs() < 1e-9);
        assert!((quote.breakdown.total_egp() - 291.2).abs() < 1e-9);
        assert_eq!(quote.extra_working_days, 0);
    }

    #[test]
    fn fr4_bracket_boundary_between_four_and_five_boards() {
        let base = ManufacturingParameters::default();
        let calc = LocalCalculator::default();
        let four = calc
            .calculate(&small_board(), &ManufacturingParameters { quantity: 4, ..base.clone() })
            .unwrap();
        let five = calc
            .calculate(&small_board(), &ManufacturingParameters { quantity: 5, ..base })
            .unwrap();
        assert!((four.multipliers.quantity - 1.5).abs() < 1e-12);
        assert!((five.multipliers.quantity - 1.0).abs() < 1e-12);
        // Five boards at the cheaper bracket cost less per board.
        assert!(five.breakdown.total_egp() / 5.0 < four.breakdown.total_egp() / 4.0);
    }

    #[test]
    fn non_standard_color_costs_twenty_percent_and_a_day() {
        let params = ManufacturingParameters {
            quantity: 1,
            pcb_color: SolderMaskColor::Red,
            ..ManufacturingParameters::default()
        };
        let quote = LocalCalculator::default()
            .calculate(&small_board(), &params)
            .unwrap();
        assert!((quote.multipliers.color - 1.2).abs() < 1e-12);
        assert_eq!(quote.extra_working_days, 1);
    }

    #[test]
    fn green_boards_are_never_surcharged_on_any_material() {
        let calc = LocalCalculator::default();
        for material in [
            BaseMaterial::Fr4,
            BaseMaterial::Flex,
            BaseMaterial::Aluminum,
        ] {
            let params = ManufacturingParameters {
                base_material: material,
                pcb_color: SolderMaskColor::Green,
                ..ManufacturingParameters::default()
            };
            let quote = calc.calculate(&small_board(), &params).unwrap();
            assert!(
                (quote.multipliers.color - 1.0).abs() < 1e-12,
                "{} in green took a color surcharge",
                material.label()
            );
            assert_eq!(quote.extra_working_days, 0);
        }
    }

    #[test]
    fn unlisted_thickness_prices_at_the_standard_rate() {
        let params = ManufacturingParameters {
            thickness: Thickness::T2_4,
            ..ManufacturingParameters::default()
        };
        let quote = LocalCalculator::default()
            .calculate(&small_board(), &params)
            .unwrap();
        assert!((quote.multipliers.thickness - 1.0).abs() < 1e-12);

        let surcharged = ManufacturingParameters {
            thickness: Thickness::T2_0,
            ..ManufacturingParameters::default()
        };
        let quote = LocalCalculator::default()
            .calculate(&small_board(), &surcharged)
            .unwrap();
        assert!((quote.multipliers.thickness - 1.3).abs() < 1e-12);
    }

    #[test]
    fn flex_standard_yellow_is_not_surcharged() {
        let params = ManufacturingParameters {
            base_material: BaseMaterial::Flex,
            pcb_color: SolderMaskColor::Yellow,
            ..ManufacturingParameters::default()
        };
        let quote = LocalCalculator::default()
            .calculate(&small_board(), &params)
            .unwrap();
        assert!((quote.multipliers.color - 1.0).abs() < 1e-12);
        assert!((quote.multipliers.thickness - 1.0).abs() < 1e-12);
    }

    #[test]
    fn oversized_panel_is_rejected_in_either_orientation() {
        let params = ManufacturingParameters::default();
        let calc = LocalCalculator::default();
        let err = calc
            .calculate(&BoardDimensions::new(390.0, 290.0), &params)
            .unwrap_err();
        assert!(matches!(err, CalculationError::OversizedPanel { .. }));
        // A long thin board still fits rotated.
        assert!(calc
            .calculate(&BoardDimensions::new(370.0, 100.0), &params)
            .is_ok());
    }

    #[test]
    fn small_via_and_precision_tolerance_compound() {
        let params = ManufacturingParameters {
            quantity: 1,
            min_via_hole: ViaHole::D0_20,
            board_outline_tolerance: Tolerance::Precision,
            ..ManufacturingParameters::default()
        };
        let quote = LocalCalculator::default()
            .calculate(&small_board(), &params)
            .unwrap();
        assert!((quote.multipliers.via_hole - 1.3).abs() < 1e-12);
        assert!((quote.multipliers.tolerance - 1.3).abs() < 1e-12);
    }

    #[test]
    fn breakdown_subtotal_matches_pre_tax_running_total() {
        let params = ManufacturingParameters {
            quantity: 7,
            pcb_color: SolderMaskColor::Blue,
            board_outline_tolerance: Tolerance::Precision,
            ..ManufacturingParameters::default()
        };
        let quote = LocalCalculator::default()
            .calculate(&small_board(), &params)
            .unwrap();
        let b = &quote.breakdown;
        let expected_tax = b.subtotal_egp() * VAT_RATE;
        assert!((b.tax_egp - expected_tax).abs() < 1e-9);
        assert!(
            (b.total_egp() - (b.subtotal_egp() + b.tax_egp + ENGINEERING_FEE_EGP)).abs() < 1e-9
        );
    }

    #[test]
    fn outsourced_quote_prices_freight_by_weight() {
        let params = ManufacturingParameters {
            quantity: 10,
            ..ManufacturingParameters::default()
        };
        let dims = BoardDimensions::new(100.0, 100.0);
        let calc = OutsourcedCalculator::default();
        let breakdown = calc.calculate(&dims, &params).unwrap();

        let rate = calc.rates.effective_rate();
        let expected_direct = (50.0 + 0.01 * 480.0) * 10.0 * rate;
        assert!((breakdown.base_price_egp - expected_direct).abs() < 1e-6);
        // 10x10x0.16cm board, FR-4 at 1.85 g/cm³, ten boards.
        let expected_weight_kg = 10.0 * 10.0 * 0.16 * 1.85 * 10.0 / 1000.0;
        let expected_shipping = expected_weight_kg * 60.0 * rate;
        assert!((breakdown.shipping_cost_egp - expected_shipping).abs() < 1e-6);

        let customs_total = (expected_direct + expected_shipping) * 1.6;
        // 0.01m² board takes the small-order margin of 1.6.
        let expected_final = customs_total * 1.6;
        assert!((breakdown.total_egp() - expected_final).abs() < 1e-6);
    }

    #[test]
    fn heavier_substrates_ship_for_more() {
        let dims = BoardDimensions::new(100.0, 100.0);
        let calc = OutsourcedCalculator::default();
        let fr4 = calc
            .calculate(&dims, &ManufacturingParameters::default())
            .unwrap();
        let copper_core = calc
            .calculate(
                &dims,
                &ManufacturingParameters {
                    base_material: BaseMaterial::CopperCore,
                    ..ManufacturingParameters::default()
                },
            )
            .unwrap();
        assert!(copper_core.shipping_cost_egp > fr4.shipping_cost_egp);
    }

    #[test]
    fn panel_base_price_enforces_order_minimum() {
        let params = ManufacturingParameters {
            quantity: 1,
            ..ManufacturingParameters::default()
        };
        let dims = BoardDimensions::new(10.0, 10.0);
        let base = PanelCalculator.base_price(&dims, &params).unwrap();
        assert_eq!(base, 50.0);
    }

    #[test]
    fn dense_panel_packing_earns_a_discount() {
        let params = ManufacturingParameters {
            quantity: 20,
            ..ManufacturingParameters::default()
        };
        // 190x140mm packs a 380x280 panel perfectly.
        let dense = PanelCalculator
            .base_price(&BoardDimensions::new(190.0, 140.0), &params)
            .unwrap();
        let per_cm2 = dense / (20.0 * 266.0);
        assert!(per_cm2 < 1.6);
    }

    #[test]
    fn fallback_quote_never_fails_and_stays_finite() {
        let params = ManufacturingParameters {
            quantity: 1,
            base_material: BaseMaterial::Ptfe,
            ..ManufacturingParameters::default()
        };
        let (breakdown, multipliers) = fallback_quote(&small_board(), &params);
        // 25cm² x 2.0 = 50, x5.0 material, x2.0 single-board bracket.
        assert!((breakdown.base_price_egp - 50.0).abs() < 1e-9);
        assert!((multipliers.material - 5.0).abs() < 1e-12);
        assert!(breakdown.total_egp().is_finite());
        assert!(breakdown.total_egp() > 0.0);
    }
}
