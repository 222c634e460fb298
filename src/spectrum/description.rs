//! The metadata describing a single spectrum: how it was acquired, what was
//! isolated, and how the precursor was dissociated.
use std::fmt::Display;

use num_traits::Float;

use crate::params::{ControlledVocabulary, Param, ParamList};
use crate::utils::neutral_mass;
use crate::impl_param_described;

/// The polarity of the ion current a scan observed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanPolarity {
    #[default]
    Unknown,
    Positive,
    Negative,
}

impl Display for ScanPolarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The kind of measurement a scan performed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    #[default]
    Unknown,
    /// A full mass spectrum over a scanned range
    MassSpectrum,
    /// Selected ion monitoring
    SelectedIonMonitoring,
    /// Selected reaction monitoring
    SelectedReactionMonitoring,
}

/// A method used for dissociation or fragmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DissociationMethod {
    CollisionInducedDissociation,
    BeamTypeCollisionInducedDissociation,
    ElectronTransferDissociation,
    ElectronCaptureDissociation,
    PostSourceDecay,
    PlasmaDesorption,
    BlackbodyInfraredRadiativeDissociation,
    LowEnergyCollisionInducedDissociation,
    Photodissociation,
    SurfaceInducedDissociation,
}

impl DissociationMethod {
    /// The common abbreviation used in instrument methods.
    pub const fn abbreviation(&self) -> &'static str {
        match self {
            Self::CollisionInducedDissociation => "CID",
            Self::BeamTypeCollisionInducedDissociation => "HCD",
            Self::ElectronTransferDissociation => "ETD",
            Self::ElectronCaptureDissociation => "ECD",
            Self::PostSourceDecay => "PSD",
            Self::PlasmaDesorption => "PD",
            Self::BlackbodyInfraredRadiativeDissociation => "BIRD",
            Self::LowEnergyCollisionInducedDissociation => "LCID",
            Self::Photodissociation => "UVPD",
            Self::SurfaceInducedDissociation => "SID",
        }
    }

    pub fn from_abbreviation(text: &str) -> Option<Self> {
        let m = match text {
            "CID" => Self::CollisionInducedDissociation,
            "HCD" => Self::BeamTypeCollisionInducedDissociation,
            "ETD" => Self::ElectronTransferDissociation,
            "ECD" => Self::ElectronCaptureDissociation,
            "PSD" => Self::PostSourceDecay,
            "PD" => Self::PlasmaDesorption,
            "BIRD" => Self::BlackbodyInfraredRadiativeDissociation,
            "LCID" => Self::LowEnergyCollisionInducedDissociation,
            "UVPD" => Self::Photodissociation,
            "SID" => Self::SurfaceInducedDissociation,
            _ => return None,
        };
        Some(m)
    }

    pub const fn accession(&self) -> u32 {
        match self {
            Self::CollisionInducedDissociation => 1000133,
            Self::BeamTypeCollisionInducedDissociation => 1000422,
            Self::ElectronTransferDissociation => 1000598,
            Self::ElectronCaptureDissociation => 1000250,
            Self::PostSourceDecay => 1000135,
            Self::PlasmaDesorption => 1000134,
            Self::BlackbodyInfraredRadiativeDissociation => 1000242,
            Self::LowEnergyCollisionInducedDissociation => 1000433,
            Self::Photodissociation => 1000435,
            Self::SurfaceInducedDissociation => 1000136,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::CollisionInducedDissociation => "collision-induced dissociation",
            Self::BeamTypeCollisionInducedDissociation => "beam-type collision-induced dissociation",
            Self::ElectronTransferDissociation => "electron transfer dissociation",
            Self::ElectronCaptureDissociation => "electron capture dissociation",
            Self::PostSourceDecay => "post-source decay",
            Self::PlasmaDesorption => "plasma desorption",
            Self::BlackbodyInfraredRadiativeDissociation => {
                "blackbody infrared radiative dissociation"
            }
            Self::LowEnergyCollisionInducedDissociation => {
                "low-energy collision-induced dissociation"
            }
            Self::Photodissociation => "photodissociation",
            Self::SurfaceInducedDissociation => "surface-induced dissociation",
        }
    }

    pub fn from_accession(accession: u32) -> Option<Self> {
        let m = match accession {
            1000133 => Self::CollisionInducedDissociation,
            1000422 => Self::BeamTypeCollisionInducedDissociation,
            1000598 => Self::ElectronTransferDissociation,
            1000250 => Self::ElectronCaptureDissociation,
            1000135 => Self::PostSourceDecay,
            1000134 => Self::PlasmaDesorption,
            1000242 => Self::BlackbodyInfraredRadiativeDissociation,
            1000433 => Self::LowEnergyCollisionInducedDissociation,
            1000435 => Self::Photodissociation,
            1000136 => Self::SurfaceInducedDissociation,
            _ => return None,
        };
        Some(m)
    }

    pub fn to_param(&self) -> Param {
        ControlledVocabulary::MS.param(self.accession(), self.name())
    }
}

/// The interval around the precursor ion that was isolated in the precursor
/// scan, expressed as a target plus offsets on either side.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct IsolationWindow {
    pub target: f64,
    pub lower_offset: f64,
    pub upper_offset: f64,
}

impl IsolationWindow {
    pub fn new(target: f64, lower_offset: f64, upper_offset: f64) -> Self {
        Self {
            target,
            lower_offset,
            upper_offset,
        }
    }

    pub fn lower_bound(&self) -> f64 {
        self.target - self.lower_offset
    }

    pub fn upper_bound(&self) -> f64 {
        self.target + self.upper_offset
    }

    pub fn width(&self) -> f64 {
        self.lower_offset + self.upper_offset
    }

    /// Inclusive containment of a query m/z.
    pub fn contains<F: Float>(&self, mz: F) -> bool {
        let mz = mz.to_f64().unwrap_or(f64::NAN);
        self.lower_bound() <= mz && mz <= self.upper_bound()
    }

    pub fn is_empty(&self) -> bool {
        self.lower_offset == 0.0 && self.upper_offset == 0.0
    }
}

/// Describes a single selected ion from a precursor isolation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectedIon {
    /// The selected ion's m/z as reported, may not be the monoisotopic peak
    pub mz: f64,
    pub intensity: f32,
    /// The reported charge state, absent in some source files
    pub charge: Option<i32>,
    pub params: ParamList,
}

impl SelectedIon {
    pub fn neutral_mass(&self) -> f64 {
        neutral_mass(self.mz, self.charge.unwrap_or(1))
    }
}

impl_param_described!(SelectedIon);

/// Describes how the precursor ion was dissociated
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Activation {
    pub methods: Vec<DissociationMethod>,
    pub energy: f32,
    pub params: ParamList,
}

impl Activation {
    pub fn has_method(&self, method: DissociationMethod) -> bool {
        self.methods.contains(&method)
    }

    /// True iff this activation shares any method with `query`.
    pub fn intersects(&self, query: &[DissociationMethod]) -> bool {
        self.methods.iter().any(|m| query.contains(m))
    }
}

impl_param_described!(Activation);

/// The precursor that a fragmentation spectrum was derived from.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Precursor {
    pub ion: SelectedIon,
    pub isolation_window: IsolationWindow,
    /// The native id of the spectrum the precursor was selected in
    pub precursor_id: Option<String>,
    pub activation: Activation,
}

impl Precursor {
    pub fn mz(&self) -> f64 {
        self.ion.mz
    }

    pub fn charge(&self) -> Option<i32> {
        self.ion.charge
    }
}

/// The m/z window swept by a scan event.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ScanWindow {
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// One acquisition event contributing to a spectrum. There is usually
/// exactly one per spectrum unless scans were combined.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanEvent {
    /// When the scan started relative to the run start, in seconds
    pub start_time: f64,
    /// Ion accumulation time, in milliseconds
    pub injection_time: f32,
    pub scan_windows: Vec<ScanWindow>,
    pub instrument_configuration_id: u32,
    pub params: ParamList,
}

impl_param_described!(ScanEvent);

/// The full metadata of one spectrum.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SpectrumDescription {
    /// The native id string from the source file
    pub id: String,
    /// Position in the source file, 0-based
    pub index: usize,
    pub ms_level: u8,
    pub polarity: ScanPolarity,
    pub scan_mode: ScanMode,
    /// Whether the scan was acquired in zoom (enhanced-resolution) mode
    pub zoom_scan: bool,
    pub precursors: Vec<Precursor>,
    pub scans: Vec<ScanEvent>,
    pub params: ParamList,
}

impl SpectrumDescription {
    /// The scan start time of the first acquisition event, in seconds.
    pub fn start_time(&self) -> f64 {
        self.scans.first().map(|s| s.start_time).unwrap_or_default()
    }

    pub fn first_scan_mut(&mut self) -> &mut ScanEvent {
        if self.scans.is_empty() {
            self.scans.push(ScanEvent::default());
        }
        self.scans.first_mut().unwrap()
    }

    pub fn first_precursor(&self) -> Option<&Precursor> {
        self.precursors.first()
    }
}

impl_param_described!(SpectrumDescription);

/// Whether a chromatogram tracks total current, a selected reaction, or
/// something else.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ChromatogramType {
    #[default]
    Unknown,
    TotalIonCurrent,
    BasePeak,
    SelectedReactionMonitoring,
}

/// The metadata of one chromatogram.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChromatogramDescription {
    pub id: String,
    pub index: usize,
    pub chromatogram_type: ChromatogramType,
    pub polarity: ScanPolarity,
    pub precursor: Option<Precursor>,
    /// The product ion m/z monitored, for SRM traces
    pub product_mz: Option<f64>,
    pub params: ParamList,
}

impl_param_described!(ChromatogramDescription);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_isolation_window_bounds() {
        let iw = IsolationWindow::new(500.0, 1.5, 2.5);
        assert_eq!(iw.lower_bound(), 498.5);
        assert_eq!(iw.upper_bound(), 502.5);
        assert!(iw.contains(498.5));
        assert!(iw.contains(502.5));
        assert!(!iw.contains(502.6));
        assert_eq!(iw.width(), 4.0);
    }

    #[test]
    fn test_dissociation_round_trip() {
        for m in [
            DissociationMethod::CollisionInducedDissociation,
            DissociationMethod::BeamTypeCollisionInducedDissociation,
            DissociationMethod::ElectronTransferDissociation,
            DissociationMethod::Photodissociation,
        ] {
            assert_eq!(DissociationMethod::from_accession(m.accession()), Some(m));
            assert_eq!(DissociationMethod::from_abbreviation(m.abbreviation()), Some(m));
        }
        assert!(DissociationMethod::from_abbreviation("XYZ").is_none());
    }

    #[test]
    fn test_activation_intersection() {
        let act = Activation {
            methods: vec![DissociationMethod::BeamTypeCollisionInducedDissociation],
            energy: 30.0,
            params: Default::default(),
        };
        assert!(act.intersects(&[
            DissociationMethod::CollisionInducedDissociation,
            DissociationMethod::BeamTypeCollisionInducedDissociation,
        ]));
        assert!(!act.intersects(&[DissociationMethod::ElectronTransferDissociation]));
    }

    #[test]
    fn test_description_start_time() {
        let mut desc = SpectrumDescription::default();
        assert_eq!(desc.start_time(), 0.0);
        desc.first_scan_mut().start_time = 42.5;
        assert_eq!(desc.start_time(), 42.5);
    }
}
