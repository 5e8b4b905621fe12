//! Raw quote parameters arrive as loosely-typed JSON from several frontend
//! generations. This module folds every historical spelling into the
//! canonical [`ManufacturingParameters`] shape, collecting warnings for
//! recoverable oddities and failing hard only where no safe default exists.

use serde_json::{Map, Value};

use crate::error::{ErrorCode, PricingError};
use crate::pricing::domain::{
    BaseMaterial, CopperWeight, DeliveryFormat, ElectricalTest, ManufacturingParameters,
    SilkscreenColor, SolderMaskColor, SurfaceFinish, Thickness, Tolerance, ViaHole,
};

const DEFAULT_QUANTITY: u32 = 5;

/// Normalize a raw parameter map. Returns the canonical parameter set plus
/// warnings for every field that needed a default or a repair. The only hard
/// failure is an unrecognized base material.
pub fn validate_and_normalize(
    raw: &Map<String, Value>,
) -> Result<(ManufacturingParameters, Vec<String>), PricingError> {
    let mut params = ManufacturingParameters::default();
    let mut warnings = Vec::new();

    if let Some(value) = raw.get("quantity") {
        match parse_u32(value) {
            Some(quantity) => params.quantity = quantity,
            None => {
                warnings.push(format!(
                    "unparseable quantity {value}, defaulting to {DEFAULT_QUANTITY}"
                ));
                params.quantity = DEFAULT_QUANTITY;
            }
        }
    }

    if let Some(value) = raw.get("base_material") {
        let label = value.as_str().unwrap_or_default();
        params.base_material = BaseMaterial::from_label(label).ok_or_else(|| {
            PricingError::new(
                ErrorCode::InvalidParameters,
                format!("unsupported base material: {label:?}"),
            )
            .with_context(serde_json::json!({
                "field": "base_material",
                "provided": label,
                "supported": BaseMaterial::ALL.iter().map(|m| m.label()).collect::<Vec<_>>(),
            }))
            .with_suggested_action("Choose one of the supported base materials")
        })?;
    }

    if let Some(value) = raw.get("thickness") {
        match parse_millimeters(value).and_then(Thickness::from_mm) {
            Some(thickness) => params.thickness = thickness,
            None => {
                warnings.push(format!("unmappable thickness {value}, defaulting to 1.6mm"));
                params.thickness = Thickness::T1_6;
            }
        }
    }

    if let Some(value) = raw.get("min_via_hole") {
        params.min_via_hole = normalize_via_hole(value, &mut warnings);
    }

    if let Some(value) = raw.get("board_outline_tolerance") {
        params.board_outline_tolerance = normalize_tolerance(value, &mut warnings);
    }

    if let Some(value) = raw.get("outer_copper_weight") {
        let label = value.as_str().unwrap_or_default();
        match CopperWeight::from_label(label) {
            Some(weight) => params.outer_copper_weight = weight,
            None => {
                warnings.push(format!("unknown copper weight {value}, defaulting to 1 oz"));
                params.outer_copper_weight = CopperWeight::OneOz;
            }
        }
    }

    if let Some(value) = raw.get("pcb_color") {
        let label = value.as_str().unwrap_or_default();
        match SolderMaskColor::from_label(label) {
            Some(color) => params.pcb_color = color,
            None => {
                warnings.push(format!("unknown soldermask color {value}, defaulting to green"));
                params.pcb_color = SolderMaskColor::Green;
            }
        }
    }

    if let Some(value) = raw.get("surface_finish") {
        let label = value.as_str().unwrap_or_default();
        match SurfaceFinish::from_label(label) {
            Some(finish) => params.surface_finish = finish,
            None => {
                warnings.push(format!("unknown surface finish {value}, defaulting to HASL"));
                params.surface_finish = SurfaceFinish::Hasl;
            }
        }
    }

    if let Some(value) = raw.get("silkscreen") {
        match value.as_str().map(str::to_ascii_lowercase).as_deref() {
            Some("white") => params.silkscreen = SilkscreenColor::White,
            Some("black") => params.silkscreen = SilkscreenColor::Black,
            _ => {
                warnings.push(format!("invalid silkscreen {value}, defaulting to white"));
                params.silkscreen = SilkscreenColor::White;
            }
        }
    }

    if let Some(value) = raw.get("delivery_format") {
        params.delivery_format = normalize_delivery_format(value, &mut warnings);
    }

    if let Some(value) = raw.get("different_designs") {
        match parse_u32(value) {
            Some(designs) if designs >= 1 => params.different_designs = designs,
            _ => {
                warnings.push(format!("invalid different_designs {value}, defaulting to 1"));
                params.different_designs = 1;
            }
        }
    }

    params.impedance_control = parse_yes_no(raw.get("impedance_control"), false);
    params.gold_fingers = parse_yes_no(raw.get("gold_fingers"), false);
    params.stencil = parse_yes_no(raw.get("stencil"), false);
    params.mark_on_pcb = parse_yes_no(raw.get("mark_on_pcb"), false);
    params.confirm_production_file = parse_yes_no(raw.get("confirm_production_file"), false);

    if let Some(value) = raw.get("electrical_test") {
        params.electrical_test = normalize_electrical_test(value, &mut warnings);
    }

    Ok((params, warnings))
}

fn parse_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}

/// Accepts `1.6`, `"1.6"`, `"1.6mm"` and similar spellings.
fn parse_millimeters(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => leading_number(text),
        _ => None,
    }
}

/// Extracts the leading numeric prefix of a string, ignoring units and any
/// trailing annotation such as `"0.3mm/(0.4/0.45mm)"`.
fn leading_number(text: &str) -> Option<f64> {
    let trimmed = text.trim().trim_start_matches('±');
    let end = trimmed
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit() && *c != '.')
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse::<f64>().ok()
}

fn normalize_via_hole(value: &Value, warnings: &mut Vec<String>) -> ViaHole {
    let Some(diameter) = parse_millimeters(value) else {
        warnings.push(format!("unparseable via hole {value}, defaulting to 0.3mm"));
        return ViaHole::D0_30;
    };
    // Snap to the nearest bucket at or below the requested diameter.
    if diameter >= 0.3 {
        ViaHole::D0_30
    } else if diameter >= 0.25 {
        ViaHole::D0_25
    } else if diameter >= 0.2 {
        ViaHole::D0_20
    } else {
        ViaHole::D0_15
    }
}

fn normalize_tolerance(value: &Value, warnings: &mut Vec<String>) -> Tolerance {
    let text = value.as_str().unwrap_or_default();
    match leading_number(text) {
        Some(t) if (t - 0.2).abs() < 1e-9 => Tolerance::Regular,
        Some(t) if (t - 0.1).abs() < 1e-9 => Tolerance::Precision,
        _ => {
            let lowered = text.to_ascii_lowercase();
            if lowered.contains("precision") {
                Tolerance::Precision
            } else if lowered.contains("regular") {
                Tolerance::Regular
            } else {
                warnings.push(format!("unknown tolerance {value}, defaulting to regular"));
                Tolerance::Regular
            }
        }
    }
}

fn normalize_delivery_format(value: &Value, warnings: &mut Vec<String>) -> DeliveryFormat {
    match value.as_str().map(str::trim) {
        Some("Single PCB") => DeliveryFormat::SinglePcb,
        Some("Panel by Customer") => DeliveryFormat::PanelByCustomer,
        Some("Panel by Manufacturer") | Some("Panel by Proto-Tech") => {
            DeliveryFormat::PanelByManufacturer
        }
        _ => {
            warnings.push(format!("unknown delivery format {value}, defaulting to Single PCB"));
            DeliveryFormat::SinglePcb
        }
    }
}

fn normalize_electrical_test(value: &Value, warnings: &mut Vec<String>) -> ElectricalTest {
    match value {
        // Legacy payloads sent a bare boolean.
        Value::Bool(true) => ElectricalTest::FlyingProbe,
        Value::Bool(false) => ElectricalTest::OpticalManualInspection,
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "flying probe" => ElectricalTest::FlyingProbe,
            "optical manual inspection" => ElectricalTest::OpticalManualInspection,
            _ => {
                warnings.push(format!(
                    "unknown electrical test {value}, defaulting to optical manual inspection"
                ));
                ElectricalTest::OpticalManualInspection
            }
        },
        _ => {
            warnings.push(format!(
                "unknown electrical test {value}, defaulting to optical manual inspection"
            ));
            ElectricalTest::OpticalManualInspection
        }
    }
}

/// Yes/No flags arrive as `"Yes"`, `"no"`, booleans or nothing at all.
fn parse_yes_no(value: Option<&Value>, default: bool) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" | "1" => true,
            "no" | "false" | "0" => false,
            _ => default,
        },
        _ => default,
    }
}
