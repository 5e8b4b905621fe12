//! Data-driven multiplier tables. Lookups never fail: an entry missing from
//! a table resolves to the neutral multiplier 1.0, so tenant overrides can
//! carry partial tables.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::pricing::domain::{
    BaseMaterial, CopperWeight, ElectricalTest, ManufacturingParameters, SilkscreenColor,
    SolderMaskColor, SurfaceFinish, Thickness, Tolerance, ViaHole,
};
use crate::pricing::models::Multipliers;

/// Quantity brackets as (minimum quantity, multiplier), kept sorted by
/// threshold descending. A quantity below every threshold takes the
/// lowest bracket.
pub type QuantityBrackets = Vec<(u32, f64)>;

pub fn default_quantity_brackets() -> QuantityBrackets {
    vec![
        (100, 0.7),
        (50, 0.8),
        (10, 0.9),
        (5, 1.0),
        (3, 1.5),
        (1, 2.0),
    ]
}

pub fn default_material_multipliers() -> BTreeMap<BaseMaterial, f64> {
    BTreeMap::from([
        (BaseMaterial::Fr4, 1.0),
        (BaseMaterial::Flex, 2.5),
        (BaseMaterial::Aluminum, 3.0),
        (BaseMaterial::CopperCore, 2.8),
        (BaseMaterial::Rogers, 4.0),
        (BaseMaterial::Ptfe, 5.0),
    ])
}

/// Multipliers for the boolean and enum high-spec options.
#[derive(Debug, Clone, PartialEq)]
pub struct HighSpecTable {
    pub impedance_control: f64,
    pub gold_fingers: f64,
    pub stencil: f64,
    pub mark_on_pcb: f64,
    pub confirm_production_file: f64,
    pub flying_probe_test: f64,
}

impl Default for HighSpecTable {
    fn default() -> Self {
        Self {
            impedance_control: 1.2,
            gold_fingers: 1.3,
            stencil: 1.1,
            mark_on_pcb: 1.05,
            confirm_production_file: 1.1,
            flying_probe_test: 1.2,
        }
    }
}

/// The full rules configuration. Tenants may replace the material table and
/// quantity brackets; the remaining tables are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTables {
    pub material: BTreeMap<BaseMaterial, f64>,
    pub quantity_brackets: QuantityBrackets,
    pub thickness: BTreeMap<Thickness, f64>,
    pub copper_weight: BTreeMap<CopperWeight, f64>,
    pub via_hole: BTreeMap<ViaHole, f64>,
    pub tolerance: BTreeMap<Tolerance, f64>,
    pub color: BTreeMap<SolderMaskColor, f64>,
    pub surface_finish: BTreeMap<SurfaceFinish, f64>,
    pub silkscreen: BTreeMap<SilkscreenColor, f64>,
    pub high_spec: HighSpecTable,
}

impl Default for PricingTables {
    fn default() -> Self {
        Self {
            material: default_material_multipliers(),
            quantity_brackets: default_quantity_brackets(),
            thickness: BTreeMap::from([
                (Thickness::T0_8, 1.2),
                (Thickness::T1_0, 1.1),
                (Thickness::T1_2, 1.05),
                (Thickness::T1_6, 1.0),
                (Thickness::T2_0, 1.1),
                (Thickness::T2_4, 1.2),
            ]),
            copper_weight: BTreeMap::from([
                (CopperWeight::ThirdOz, 0.9),
                (CopperWeight::OneOz, 1.0),
                (CopperWeight::TwoOz, 1.3),
                (CopperWeight::ThreeOz, 1.6),
            ]),
            via_hole: BTreeMap::from([
                (ViaHole::D0_30, 1.0),
                (ViaHole::D0_25, 1.1),
                (ViaHole::D0_20, 1.3),
                (ViaHole::D0_15, 1.6),
            ]),
            tolerance: BTreeMap::from([(Tolerance::Regular, 1.0), (Tolerance::Precision, 1.2)]),
            color: BTreeMap::from([
                (SolderMaskColor::Green, 1.0),
                (SolderMaskColor::Blue, 1.05),
                (SolderMaskColor::Red, 1.1),
                (SolderMaskColor::Black, 1.15),
                (SolderMaskColor::White, 1.2),
                (SolderMaskColor::Yellow, 1.25),
            ]),
            surface_finish: BTreeMap::from([
                (SurfaceFinish::Hasl, 1.05),
                (SurfaceFinish::Enig, 1.3),
                (SurfaceFinish::ImmersionTin, 1.0),
            ]),
            silkscreen: BTreeMap::from([
                (SilkscreenColor::White, 1.0),
                (SilkscreenColor::Black, 1.05),
            ]),
            high_spec: HighSpecTable::default(),
        }
    }
}

/// Stateless rules engine over a [`PricingTables`] configuration.
#[derive(Debug, Clone, Default)]
pub struct RulesEngine {
    tables: PricingTables,
}

impl RulesEngine {
    pub fn new(tables: PricingTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &PricingTables {
        &self.tables
    }

    pub fn material_multiplier(&self, material: BaseMaterial) -> f64 {
        self.tables.material.get(&material).copied().unwrap_or(1.0)
    }

    /// Highest bracket whose threshold is at or below the quantity; below
    /// every threshold the lowest bracket applies.
    pub fn quantity_multiplier(&self, quantity: u32) -> f64 {
        let brackets = &self.tables.quantity_brackets;
        let mut sorted: Vec<(u32, f64)> = brackets.clone();
        sorted.sort_by(|a, b| b.0.cmp(&a.0));
        for (threshold, multiplier) in &sorted {
            if quantity >= *threshold {
                return *multiplier;
            }
        }
        sorted.last().map(|(_, m)| *m).unwrap_or(1.0)
    }

    pub fn high_spec_multiplier(&self, params: &ManufacturingParameters) -> f64 {
        let table = &self.tables.high_spec;
        let mut multiplier = 1.0;
        if params.impedance_control {
            multiplier *= table.impedance_control;
        }
        if params.gold_fingers {
            multiplier *= table.gold_fingers;
        }
        if params.stencil {
            multiplier *= table.stencil;
        }
        if params.mark_on_pcb {
            multiplier *= table.mark_on_pcb;
        }
        if params.confirm_production_file {
            multiplier *= table.confirm_production_file;
        }
        if params.electrical_test == ElectricalTest::FlyingProbe {
            multiplier *= table.flying_probe_test;
        }
        multiplier
    }

    /// Resolve the full multiplier set for a parameter combination. Pure and
    /// total: the same input always yields the same output and no input can
    /// fail.
    pub fn calculate_multipliers(&self, params: &ManufacturingParameters) -> Multipliers {
        let t = &self.tables;
        Multipliers {
            material: self.material_multiplier(params.base_material),
            quantity: self.quantity_multiplier(params.quantity),
            thickness: t.thickness.get(&params.thickness).copied().unwrap_or(1.0),
            copper_weight: t
                .copper_weight
                .get(&params.outer_copper_weight)
                .copied()
                .unwrap_or(1.0),
            via_hole: t.via_hole.get(&params.min_via_hole).copied().unwrap_or(1.0),
            tolerance: t
                .tolerance
                .get(&params.board_outline_tolerance)
                .copied()
                .unwrap_or(1.0),
            color: t.color.get(&params.pcb_color).copied().unwrap_or(1.0),
            surface_finish: t
                .surface_finish
                .get(&params.surface_finish)
                .copied()
                .unwrap_or(1.0),
            silkscreen: t.silkscreen.get(&params.silkscreen).copied().unwrap_or(1.0),
            high_spec: self.high_spec_multiplier(params),
        }
    }

    /// Sanity warnings over a resolved multiplier set.
    pub fn validate_multipliers(&self, multipliers: &Multipliers) -> Vec<String> {
        let mut warnings = Vec::new();
        for (name, value) in multipliers.as_map() {
            if name != "total" && value <= 0.0 {
                warnings.push(format!("{name} multiplier {value} is not positive"));
            }
        }
        let total = multipliers.total();
        if total > 10.0 {
            warnings.push(format!("total multiplier {total:.2} is unusually high"));
        } else if total < 0.1 {
            warnings.push(format!("total multiplier {total:.2} is unusually low"));
        }
        warnings
    }

    /// Table dump for the pricing info endpoint.
    pub fn pricing_info(&self) -> Value {
        let t = &self.tables;
        json!({
            "material_multipliers": t.material.iter()
                .map(|(m, v)| (m.label().to_owned(), *v))
                .collect::<BTreeMap<String, f64>>(),
            "quantity_brackets": t.quantity_brackets.iter()
                .map(|(threshold, multiplier)| json!({
                    "min_quantity": threshold,
                    "multiplier": multiplier,
                }))
                .collect::<Vec<_>>(),
            "thickness_multipliers": t.thickness.iter()
                .map(|(k, v)| (k.label().to_owned(), *v))
                .collect::<BTreeMap<String, f64>>(),
            "copper_weight_multipliers": t.copper_weight.iter()
                .map(|(k, v)| (k.label().to_owned(), *v))
                .collect::<BTreeMap<String, f64>>(),
            "via_hole_multipliers": t.via_hole.iter()
                .map(|(k, v)| (k.label().to_owned(), *v))
                .collect::<BTreeMap<String, f64>>(),
            "tolerance_multipliers": t.tolerance.iter()
                .map(|(k, v)| (k.label().to_owned(), *v))
                .collect::<BTreeMap<String, f64>>(),
            "color_multipliers": t.color.iter()
                .map(|(k, v)| (k.label().to_owned(), *v))
                .collect::<BTreeMap<String, f64>>(),
            "surface_finish_multipliers": t.surface_finish.iter()
                .map(|(k, v)| (k.label().to_owned(), *v))
                .collect::<BTreeMap<String, f64>>(),
            "silkscreen_multipliers": t.silkscreen.iter()
                .map(|(k, v)| (k.label().to_owned(), *v))
                .collect::<BTreeMap<String, f64>>(),
            "high_spec_multipliers": {
                "impedance_control": t.high_spec.impedance_control,
                "gold_fingers": t.high_spec.gold_fingers,
                "stencil": t.high_spec.stencil,
                "mark_on_pcb": t.high_spec.mark_on_pcb,
                "confirm_production_file": t.high_spec.confirm_production_file,
                "flying_probe_test": t.high_spec.flying_probe_test,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::domain::ManufacturingParameters;

    #[test]
    fn default_parameters_resolve_to_known_multipliers() {
        let engine = RulesEngine::default();
        let multipliers = engine.calculate_multipliers(&ManufacturingParameters::default());
        assert_eq!(multipliers.material, 1.0);
        assert_eq!(multipliers.quantity, 1.0);
        assert_eq!(multipliers.thickness, 1.0);
        assert_eq!(multipliers.surface_finish, 1.05);
        assert_eq!(multipliers.high_spec, 1.0);
    }

    #[test]
    fn missing_table_entry_resolves_to_neutral() {
        let mut tables = PricingTables::default();
        tables.material.remove(&BaseMaterial::Rogers);
        let engine = RulesEngine::new(tables);
        assert_eq!(engine.material_multiplier(BaseMaterial::Rogers), 1.0);
    }

    #[test]
    fn quantity_brackets_step_at_thresholds() {
        let engine = RulesEngine::default();
        assert_eq!(engine.quantity_multiplier(1), 2.0);
        assert_eq!(engine.quantity_multiplier(2), 2.0);
        assert_eq!(engine.quantity_multiplier(3), 1.5);
        assert_eq!(engine.quantity_multiplier(4), 1.5);
        assert_eq!(engine.quantity_multiplier(5), 1.0);
        assert_eq!(engine.quantity_multiplier(49), 0.9);
        assert_eq!(engine.quantity_multiplier(50), 0.8);
        assert_eq!(engine.quantity_multiplier(1_000), 0.7);
    }

    #[test]
    fn quantity_below_all_thresholds_takes_lowest_bracket() {
        let engine = RulesEngine::new(PricingTables {
            quantity_brackets: vec![(10, 0.9), (100, 0.7)],
            ..PricingTables::default()
        });
        assert_eq!(engine.quantity_multiplier(2), 0.9);
    }

    #[test]
    fn high_spec_options_compound() {
        let engine = RulesEngine::default();
        let params = ManufacturingParameters {
            impedance_control: true,
            gold_fingers: true,
            ..ManufacturingParameters::default()
        };
        let multiplier = engine.high_spec_multiplier(&params);
        assert!((multiplier - 1.2 * 1.3).abs() < 1e-12);
    }

    #[test]
    fn multipliers_are_deterministic() {
        let engine = RulesEngine::default();
        let params = ManufacturingParameters {
            base_material: BaseMaterial::Rogers,
            quantity: 42,
            impedance_control: true,
            ..ManufacturingParameters::default()
        };
        let first = engine.calculate_multipliers(&params);
        let second = engine.calculate_multipliers(&params);
        assert_eq!(first, second);
        assert_eq!(first.total().to_bits(), second.total().to_bits());
    }

    #[test]
    fn implausible_totals_are_flagged() {
        let engine = RulesEngine::default();
        let mut multipliers = Multipliers::default();
        multipliers.material = 20.0;
        let warnings = engine.validate_multipliers(&multipliers);
        assert!(warnings.iter().any(|w| w.contains("unusually high")));
    }
}
