use serde::{Deserialize, Serialize};

/// Core laminate material of the board. Drives the dominant cost multiplier
/// and the manufacturing routing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BaseMaterial {
    #[serde(rename = "FR-4")]
    Fr4,
    Flex,
    Aluminum,
    #[serde(rename = "Copper Core")]
    CopperCore,
    Rogers,
    #[serde(rename = "PTFE")]
    Ptfe,
}

impl BaseMaterial {
    pub const ALL: [BaseMaterial; 6] = [
        BaseMaterial::Fr4,
        BaseMaterial::Flex,
        BaseMaterial::Aluminum,
        BaseMaterial::CopperCore,
        BaseMaterial::Rogers,
        BaseMaterial::Ptfe,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            BaseMaterial::Fr4 => "FR-4",
            BaseMaterial::Flex => "Flex",
            BaseMaterial::Aluminum => "Aluminum",
            BaseMaterial::CopperCore => "Copper Core",
            BaseMaterial::Rogers => "Rogers",
            BaseMaterial::Ptfe => "PTFE",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.label() == label)
    }

    /// Substrate density in g/cm³, used by the outsourced shipping-weight formula.
    pub const fn density_g_per_cm3(self) -> f64 {
        match self {
            BaseMaterial::Fr4 => 1.85,
            BaseMaterial::Flex => 1.4,
            BaseMaterial::Aluminum => 2.7,
            BaseMaterial::CopperCore => 8.9,
            BaseMaterial::Rogers => 1.9,
            BaseMaterial::Ptfe => 2.2,
        }
    }

    /// Factory-default soldermask color for the material family. Boards in
    /// the default color do not pay the non-standard color surcharge.
    pub const fn standard_color(self) -> SolderMaskColor {
        match self {
            BaseMaterial::Flex => SolderMaskColor::Yellow,
            BaseMaterial::Aluminum => SolderMaskColor::White,
            _ => SolderMaskColor::Green,
        }
    }
}

/// Discrete board thickness steps offered by the fab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Thickness {
    #[serde(rename = "0.4mm")]
    T0_4,
    #[serde(rename = "0.6mm")]
    T0_6,
    #[serde(rename = "0.8mm")]
    T0_8,
    #[serde(rename = "1.0mm")]
    T1_0,
    #[serde(rename = "1.2mm")]
    T1_2,
    #[serde(rename = "1.6mm")]
    T1_6,
    #[serde(rename = "2.0mm")]
    T2_0,
    #[serde(rename = "2.4mm")]
    T2_4,
}

impl Thickness {
    pub const ALL: [Thickness; 8] = [
        Thickness::T0_4,
        Thickness::T0_6,
        Thickness::T0_8,
        Thickness::T1_0,
        Thickness::T1_2,
        Thickness::T1_6,
        Thickness::T2_0,
        Thickness::T2_4,
    ];

    pub const fn mm(self) -> f64 {
        match self {
            Thickness::T0_4 => 0.4,
            Thickness::T0_6 => 0.6,
            Thickness::T0_8 => 0.8,
            Thickness::T1_0 => 1.0,
            Thickness::T1_2 => 1.2,
            Thickness::T1_6 => 1.6,
            Thickness::T2_0 => 2.0,
            Thickness::T2_4 => 2.4,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Thickness::T0_4 => "0.4mm",
            Thickness::T0_6 => "0.6mm",
            Thickness::T0_8 => "0.8mm",
            Thickness::T1_0 => "1.0mm",
            Thickness::T1_2 => "1.2mm",
            Thickness::T1_6 => "1.6mm",
            Thickness::T2_0 => "2.0mm",
            Thickness::T2_4 => "2.4mm",
        }
    }

    pub fn from_mm(value: f64) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| (t.mm() - value).abs() < 1e-9)
    }
}

/// Minimum via hole diameter. Raw inputs are snapped to the nearest
/// smaller-or-equal bucket by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ViaHole {
    #[serde(rename = "0.3mm")]
    D0_30,
    #[serde(rename = "0.25mm")]
    D0_25,
    #[serde(rename = "0.2mm")]
    D0_20,
    #[serde(rename = "0.15mm")]
    D0_15,
}

impl ViaHole {
    pub const fn mm(self) -> f64 {
        match self {
            ViaHole::D0_30 => 0.3,
            ViaHole::D0_25 => 0.25,
            ViaHole::D0_20 => 0.2,
            ViaHole::D0_15 => 0.15,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ViaHole::D0_30 => "0.3mm",
            ViaHole::D0_25 => "0.25mm",
            ViaHole::D0_20 => "0.2mm",
            ViaHole::D0_15 => "0.15mm",
        }
    }
}

/// Board outline routing precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tolerance {
    #[serde(rename = "±0.2mm (Regular)")]
    Regular,
    #[serde(rename = "±0.1mm (Precision)")]
    Precision,
}

impl Tolerance {
    pub const fn label(self) -> &'static str {
        match self {
            Tolerance::Regular => "±0.2mm (Regular)",
            Tolerance::Precision => "±0.1mm (Precision)",
        }
    }
}

/// Outer layer copper weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CopperWeight {
    #[serde(rename = "1/3 oz")]
    ThirdOz,
    #[serde(rename = "1 oz")]
    OneOz,
    #[serde(rename = "2 oz")]
    TwoOz,
    #[serde(rename = "3 oz")]
    ThreeOz,
}

impl CopperWeight {
    pub const fn label(self) -> &'static str {
        match self {
            CopperWeight::ThirdOz => "1/3 oz",
            CopperWeight::OneOz => "1 oz",
            CopperWeight::TwoOz => "2 oz",
            CopperWeight::ThreeOz => "3 oz",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "1/3 oz" | "1/3oz" => Some(CopperWeight::ThirdOz),
            "1 oz" | "1oz" | "1" => Some(CopperWeight::OneOz),
            "2 oz" | "2oz" | "2" => Some(CopperWeight::TwoOz),
            "3 oz" | "3oz" | "3" => Some(CopperWeight::ThreeOz),
            _ => None,
        }
    }
}

/// Soldermask color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolderMaskColor {
    Green,
    Blue,
    Red,
    Black,
    White,
    Yellow,
    Purple,
}

impl SolderMaskColor {
    pub const fn label(self) -> &'static str {
        match self {
            SolderMaskColor::Green => "green",
            SolderMaskColor::Blue => "blue",
            SolderMaskColor::Red => "red",
            SolderMaskColor::Black => "black",
            SolderMaskColor::White => "white",
            SolderMaskColor::Yellow => "yellow",
            SolderMaskColor::Purple => "purple",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "green" => Some(SolderMaskColor::Green),
            "blue" => Some(SolderMaskColor::Blue),
            "red" => Some(SolderMaskColor::Red),
            "black" => Some(SolderMaskColor::Black),
            "white" => Some(SolderMaskColor::White),
            "yellow" => Some(SolderMaskColor::Yellow),
            "purple" => Some(SolderMaskColor::Purple),
            _ => None,
        }
    }
}

/// Surface coating over exposed copper pads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SurfaceFinish {
    #[serde(rename = "HASL")]
    Hasl,
    #[serde(rename = "ENIG")]
    Enig,
    #[serde(rename = "immersion tin")]
    ImmersionTin,
}

impl SurfaceFinish {
    pub const fn label(self) -> &'static str {
        match self {
            SurfaceFinish::Hasl => "HASL",
            SurfaceFinish::Enig => "ENIG",
            SurfaceFinish::ImmersionTin => "immersion tin",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "hasl" | "hasl (with lead)" | "leadfree hasl (rohs)" => Some(SurfaceFinish::Hasl),
            "enig" => Some(SurfaceFinish::Enig),
            "immersion tin" | "immersed tin" => Some(SurfaceFinish::ImmersionTin),
            _ => None,
        }
    }
}

/// Silkscreen legend color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SilkscreenColor {
    White,
    Black,
}

impl SilkscreenColor {
    pub const fn label(self) -> &'static str {
        match self {
            SilkscreenColor::White => "white",
            SilkscreenColor::Black => "black",
        }
    }
}

/// How the finished boards are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryFormat {
    #[serde(rename = "Single PCB")]
    SinglePcb,
    #[serde(rename = "Panel by Customer")]
    PanelByCustomer,
    #[serde(rename = "Panel by Manufacturer")]
    PanelByManufacturer,
}

/// Electrical test mode for the finished boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectricalTest {
    #[serde(rename = "flying probe")]
    FlyingProbe,
    #[serde(rename = "optical manual inspection")]
    OpticalManualInspection,
}

/// Canonical, fully-defaulted manufacturing parameter set. Every optional
/// field carries its default at construction time; pricing code never probes
/// for missing fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturingParameters {
    pub quantity: u32,
    pub base_material: BaseMaterial,
    pub thickness: Thickness,
    pub min_via_hole: ViaHole,
    pub board_outline_tolerance: Tolerance,
    pub outer_copper_weight: CopperWeight,
    pub pcb_color: SolderMaskColor,
    pub surface_finish: SurfaceFinish,
    pub silkscreen: SilkscreenColor,
    pub delivery_format: DeliveryFormat,
    pub different_designs: u32,
    pub impedance_control: bool,
    pub gold_fingers: bool,
    pub stencil: bool,
    pub mark_on_pcb: bool,
    pub confirm_production_file: bool,
    pub electrical_test: ElectricalTest,
}

impl Default for ManufacturingParameters {
    fn default() -> Self {
        Self {
            quantity: 5,
            base_material: BaseMaterial::Fr4,
            thickness: Thickness::T1_6,
            min_via_hole: ViaHole::D0_30,
            board_outline_tolerance: Tolerance::Regular,
            outer_copper_weight: CopperWeight::OneOz,
            pcb_color: SolderMaskColor::Green,
            surface_finish: SurfaceFinish::Hasl,
            silkscreen: SilkscreenColor::White,
            delivery_format: DeliveryFormat::SinglePcb,
            different_designs: 1,
            impedance_control: false,
            gold_fingers: false,
            stencil: false,
            mark_on_pcb: false,
            confirm_production_file: false,
            electrical_test: ElectricalTest::OpticalManualInspection,
        }
    }
}

/// Physical board size. The area is always recomputed from width × height,
/// never trusted from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardDimensions {
    pub width_mm: f64,
    pub height_mm: f64,
    pub area_m2: f64,
}

impl BoardDimensions {
    pub fn new(width_mm: f64, height_mm: f64) -> Self {
        Self {
            width_mm,
            height_mm,
            area_m2: (width_mm / 1000.0) * (height_mm / 1000.0),
        }
    }

    pub fn area_cm2(&self) -> f64 {
        self.area_m2 * 10_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_is_recomputed_from_sides() {
        let dims = BoardDimensions::new(50.0, 50.0);
        assert!((dims.area_m2 - 0.0025).abs() < 1e-12);
        assert!((dims.area_cm2() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn material_labels_round_trip() {
        for material in BaseMaterial::ALL {
            assert_eq!(BaseMaterial::from_label(material.label()), Some(material));
        }
    }

    #[test]
    fn standard_colors_follow_material_family() {
        assert_eq!(BaseMaterial::Flex.standard_color(), SolderMaskColor::Yellow);
        assert_eq!(
            BaseMaterial::Aluminum.standard_color(),
            SolderMaskColor::White
        );
        assert_eq!(BaseMaterial::Fr4.standard_color(), SolderMaskColor::Green);
    }
}
