//! Manufacturability checks. Dimension and quantity violations are hard
//! errors raised before any pricing work; capability mismatches against the
//! material specification are recorded in a [`ValidationResult`] and left to
//! the caller to act on.

use serde::Serialize;

use crate::error::{DimensionValidationError, ErrorCode, PricingError};
use crate::pricing::domain::{
    BaseMaterial, BoardDimensions, CopperWeight, ManufacturingParameters, SilkscreenColor,
    SolderMaskColor, SurfaceFinish, Thickness,
};

pub const MIN_DIMENSION_MM: f64 = 5.0;
pub const MAX_DIMENSION_MM: f64 = 500.0;
pub const MIN_AREA_CM2: f64 = 0.25;
pub const MAX_AREA_CM2: f64 = 2_500.0;
pub const MIN_QUANTITY: u32 = 1;
pub const MAX_QUANTITY: u32 = 10_000;

const MIN_ASPECT_RATIO: f64 = 0.1;
const MAX_ASPECT_RATIO: f64 = 10.0;

/// Non-throwing capability check outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// What a material family can actually be manufactured with.
struct MaterialSpecification {
    thicknesses: &'static [Thickness],
    colors: &'static [SolderMaskColor],
    silkscreens: &'static [SilkscreenColor],
    surface_finishes: &'static [SurfaceFinish],
    copper_weights: &'static [CopperWeight],
}

const ALL_COLORS: [SolderMaskColor; 7] = [
    SolderMaskColor::Green,
    SolderMaskColor::Blue,
    SolderMaskColor::Red,
    SolderMaskColor::Black,
    SolderMaskColor::White,
    SolderMaskColor::Yellow,
    SolderMaskColor::Purple,
];

const BOTH_SILKSCREENS: [SilkscreenColor; 2] = [SilkscreenColor::White, SilkscreenColor::Black];

const RIGID_THICKNESSES: [Thickness; 6] = [
    Thickness::T0_6,
    Thickness::T0_8,
    Thickness::T1_0,
    Thickness::T1_2,
    Thickness::T1_6,
    Thickness::T2_0,
];

fn specification_for(material: BaseMaterial) -> MaterialSpecification {
    match material {
        BaseMaterial::Fr4 => MaterialSpecification {
            thicknesses: &RIGID_THICKNESSES,
            colors: &ALL_COLORS,
            silkscreens: &BOTH_SILKSCREENS,
            surface_finishes: &[
                SurfaceFinish::Hasl,
                SurfaceFinish::Enig,
                SurfaceFinish::ImmersionTin,
            ],
            copper_weights: &[CopperWeight::OneOz, CopperWeight::TwoOz],
        },
        BaseMaterial::Flex => MaterialSpecification {
            thicknesses: &[Thickness::T0_4],
            colors: &[SolderMaskColor::Yellow],
            silkscreens: &[SilkscreenColor::White],
            surface_finishes: &[SurfaceFinish::ImmersionTin],
            copper_weights: &[CopperWeight::ThirdOz],
        },
        BaseMaterial::Aluminum => MaterialSpecification {
            thicknesses: &RIGID_THICKNESSES,
            colors: &ALL_COLORS,
            silkscreens: &BOTH_SILKSCREENS,
            surface_finishes: &[SurfaceFinish::Hasl, SurfaceFinish::Enig],
            copper_weights: &[CopperWeight::OneOz],
        },
        BaseMaterial::CopperCore | BaseMaterial::Rogers | BaseMaterial::Ptfe => {
            MaterialSpecification {
                thicknesses: &RIGID_THICKNESSES,
                colors: &ALL_COLORS,
                silkscreens: &BOTH_SILKSCREENS,
                surface_finishes: &[
                    SurfaceFinish::Hasl,
                    SurfaceFinish::Enig,
                    SurfaceFinish::ImmersionTin,
                ],
                copper_weights: &[CopperWeight::OneOz, CopperWeight::TwoOz],
            }
        }
    }
}

/// Hard envelope check on the board outline. Fails on the first violated
/// bound so the client gets one precise error at a time.
pub fn validate_dimensions(dims: &BoardDimensions) -> Result<(), DimensionValidationError> {
    if !(MIN_DIMENSION_MM..=MAX_DIMENSION_MM).contains(&dims.width_mm) {
        return Err(DimensionValidationError::new(
            "width",
            dims.width_mm,
            MIN_DIMENSION_MM,
            MAX_DIMENSION_MM,
            "mm",
        ));
    }
    if !(MIN_DIMENSION_MM..=MAX_DIMENSION_MM).contains(&dims.height_mm) {
        return Err(DimensionValidationError::new(
            "height",
            dims.height_mm,
            MIN_DIMENSION_MM,
            MAX_DIMENSION_MM,
            "mm",
        ));
    }
    let area = dims.area_cm2();
    if !(MIN_AREA_CM2..=MAX_AREA_CM2).contains(&area) {
        return Err(DimensionValidationError::new(
            "area",
            area,
            MIN_AREA_CM2,
            MAX_AREA_CM2,
            "cm²",
        ));
    }
    Ok(())
}

pub fn validate_quantity(quantity: u32) -> Result<(), PricingError> {
    if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
        return Err(PricingError::new(
            ErrorCode::ParameterOutOfRange,
            format!("quantity must be between {MIN_QUANTITY} and {MAX_QUANTITY}, got {quantity}"),
        )
        .with_context(serde_json::json!({
            "field": "quantity",
            "provided": quantity,
            "min": MIN_QUANTITY,
            "max": MAX_QUANTITY,
        })));
    }
    Ok(())
}

/// Capability check against the material specification plus a set of
/// advisory heuristics. Never fails; violations land in `errors` and leave
/// `is_valid` false.
pub fn validate_parameters(
    params: &ManufacturingParameters,
    dims: &BoardDimensions,
) -> ValidationResult {
    let mut result = ValidationResult {
        is_valid: true,
        ..ValidationResult::default()
    };
    let spec = specification_for(params.base_material);
    let material = params.base_material.label();

    if !spec.thicknesses.contains(&params.thickness) {
        result.errors.push(format!(
            "{material} is not available in {} thickness",
            params.thickness.label()
        ));
    }
    if !spec.colors.contains(&params.pcb_color) {
        result.errors.push(format!(
            "{material} is not available in {} soldermask",
            params.pcb_color.label()
        ));
    }
    if !spec.silkscreens.contains(&params.silkscreen) {
        result.errors.push(format!(
            "{material} does not support {} silkscreen",
            params.silkscreen.label()
        ));
    }
    if !spec.surface_finishes.contains(&params.surface_finish) {
        result.errors.push(format!(
            "{material} does not support {} surface finish",
            params.surface_finish.label()
        ));
    }
    if !spec.copper_weights.contains(&params.outer_copper_weight) {
        result.errors.push(format!(
            "{material} does not support {} outer copper",
            params.outer_copper_weight.label()
        ));
    }
    result.is_valid = result.errors.is_empty();

    let aspect = if dims.height_mm > 0.0 {
        dims.width_mm / dims.height_mm
    } else {
        f64::INFINITY
    };
    if !(MIN_ASPECT_RATIO..=MAX_ASPECT_RATIO).contains(&aspect) {
        result.warnings.push(format!(
            "unusual aspect ratio {aspect:.2}, boards this elongated may warp during reflow"
        ));
    }
    if params.min_via_hole.mm() > 0.8 * params.thickness.mm() {
        result.warnings.push(format!(
            "via hole {} is large relative to board thickness {}",
            params.min_via_hole.label(),
            params.thickness.label()
        ));
    }
    if params.quantity == 1 {
        result
            .warnings
            .push("single-board orders are priced at the prototype rate".to_owned());
    }
    if matches!(
        params.base_material,
        BaseMaterial::Rogers | BaseMaterial::Ptfe
    ) {
        result.warnings.push(format!(
            "{material} orders have an extended lead time for substrate sourcing"
        ));
    }
    if params.pcb_color == SolderMaskColor::White && params.silkscreen == SilkscreenColor::White {
        result
            .warnings
            .push("white boards should use black silkscreen for legibility".to_owned());
    }
    if params.pcb_color == SolderMaskColor::Black && params.silkscreen == SilkscreenColor::Black {
        result
            .warnings
            .push("black boards should use white silkscreen for legibility".to_owned());
    }

    result
}
