//! Composable predicates over spectra and peaks for retain-style
//! filtering.
//!
//! Every predicate takes a `reverse` constructor flag that flips its
//! result, so one type drives both keep-if and remove-if passes. The
//! predicates are pure and hold no mutable state, so they can be shared
//! freely across threads.
use crate::params::ParamDescribed;
use crate::peaks::CentroidPeak;
use crate::spectrum::{DissociationMethod, ScanMode, ScanPolarity, Spectrum};

/// A test against one spectrum.
pub trait SpectrumPredicate {
    fn test(&self, spectrum: &Spectrum) -> bool;
}

/// A test against one peak.
pub trait PeakPredicate {
    fn test(&self, peak: &CentroidPeak) -> bool;
}

#[inline]
fn apply_reverse(value: bool, reverse: bool) -> bool {
    value != reverse
}

/// Closed interval on scan start time.
#[derive(Debug, Clone, Copy)]
pub struct InRtRange {
    min: f64,
    max: f64,
    reverse: bool,
}

impl InRtRange {
    pub fn new(min: f64, max: f64, reverse: bool) -> Self {
        Self { min, max, reverse }
    }
}

impl SpectrumPredicate for InRtRange {
    fn test(&self, spectrum: &Spectrum) -> bool {
        let rt = spectrum.start_time();
        apply_reverse(self.min <= rt && rt <= self.max, self.reverse)
    }
}

/// Closed interval on peak m/z.
#[derive(Debug, Clone, Copy)]
pub struct InMzRange {
    min: f64,
    max: f64,
    reverse: bool,
}

impl InMzRange {
    pub fn new(min: f64, max: f64, reverse: bool) -> Self {
        Self { min, max, reverse }
    }
}

impl PeakPredicate for InMzRange {
    fn test(&self, peak: &CentroidPeak) -> bool {
        apply_reverse(self.min <= peak.mz && peak.mz <= self.max, self.reverse)
    }
}

/// Closed interval on peak intensity.
#[derive(Debug, Clone, Copy)]
pub struct InIntensityRange {
    min: f64,
    max: f64,
    reverse: bool,
}

impl InIntensityRange {
    pub fn new(min: f64, max: f64, reverse: bool) -> Self {
        Self { min, max, reverse }
    }
}

impl PeakPredicate for InIntensityRange {
    fn test(&self, peak: &CentroidPeak) -> bool {
        let intensity = peak.intensity as f64;
        apply_reverse(
            self.min <= intensity && intensity <= self.max,
            self.reverse,
        )
    }
}

/// Membership of the spectrum's MS level in a set.
#[derive(Debug, Clone)]
pub struct InMsLevelRange {
    levels: Vec<u8>,
    reverse: bool,
}

impl InMsLevelRange {
    pub fn new<I: IntoIterator<Item = u8>>(levels: I, reverse: bool) -> Self {
        Self {
            levels: levels.into_iter().collect(),
            reverse,
        }
    }
}

impl SpectrumPredicate for InMsLevelRange {
    fn test(&self, spectrum: &Spectrum) -> bool {
        apply_reverse(self.levels.contains(&spectrum.ms_level()), self.reverse)
    }
}

/// Scan polarity equality.
#[derive(Debug, Clone, Copy)]
pub struct HasScanPolarity {
    polarity: ScanPolarity,
    reverse: bool,
}

impl HasScanPolarity {
    pub fn new(polarity: ScanPolarity, reverse: bool) -> Self {
        Self { polarity, reverse }
    }
}

impl SpectrumPredicate for HasScanPolarity {
    fn test(&self, spectrum: &Spectrum) -> bool {
        apply_reverse(spectrum.polarity() == self.polarity, self.reverse)
    }
}

/// Scan mode equality.
#[derive(Debug, Clone, Copy)]
pub struct HasScanMode {
    mode: ScanMode,
    reverse: bool,
}

impl HasScanMode {
    pub fn new(mode: ScanMode, reverse: bool) -> Self {
        Self { mode, reverse }
    }
}

impl SpectrumPredicate for HasScanMode {
    fn test(&self, spectrum: &Spectrum) -> bool {
        apply_reverse(spectrum.description.scan_mode == self.mode, self.reverse)
    }
}

/// Whether the spectrum was acquired as a zoom (enhanced resolution) scan.
#[derive(Debug, Clone, Copy)]
pub struct IsZoomSpectrum {
    reverse: bool,
}

impl IsZoomSpectrum {
    pub fn new(reverse: bool) -> Self {
        Self { reverse }
    }
}

impl SpectrumPredicate for IsZoomSpectrum {
    fn test(&self, spectrum: &Spectrum) -> bool {
        apply_reverse(spectrum.description.zoom_scan, self.reverse)
    }
}

/// Whether the spectrum holds no peaks.
#[derive(Debug, Clone, Copy)]
pub struct IsEmptySpectrum {
    reverse: bool,
}

impl IsEmptySpectrum {
    pub fn new(reverse: bool) -> Self {
        Self { reverse }
    }
}

impl SpectrumPredicate for IsEmptySpectrum {
    fn test(&self, spectrum: &Spectrum) -> bool {
        apply_reverse(spectrum.is_empty(), self.reverse)
    }
}

/// True iff any precursor's activation set intersects the query set.
#[derive(Debug, Clone)]
pub struct HasActivationMethod {
    methods: Vec<DissociationMethod>,
    reverse: bool,
}

impl HasActivationMethod {
    pub fn new<I: IntoIterator<Item = DissociationMethod>>(methods: I, reverse: bool) -> Self {
        Self {
            methods: methods.into_iter().collect(),
            reverse,
        }
    }
}

impl SpectrumPredicate for HasActivationMethod {
    fn test(&self, spectrum: &Spectrum) -> bool {
        let hit = spectrum
            .description
            .precursors
            .iter()
            .any(|p| p.activation.intersects(&self.methods));
        apply_reverse(hit, self.reverse)
    }
}

/// True iff any precursor carries one of the given charge states.
#[derive(Debug, Clone)]
pub struct HasPrecursorCharge {
    charges: Vec<i32>,
    reverse: bool,
}

impl HasPrecursorCharge {
    pub fn new<I: IntoIterator<Item = i32>>(charges: I, reverse: bool) -> Self {
        Self {
            charges: charges.into_iter().collect(),
            reverse,
        }
    }
}

impl SpectrumPredicate for HasPrecursorCharge {
    fn test(&self, spectrum: &Spectrum) -> bool {
        let hit = spectrum
            .description
            .precursors
            .iter()
            .any(|p| p.charge().map(|z| self.charges.contains(&z)).unwrap_or(false));
        apply_reverse(hit, self.reverse)
    }
}

/// True iff every precursor m/z lies inside the closed interval; a
/// spectrum with an out-of-window precursor is rejected.
#[derive(Debug, Clone, Copy)]
pub struct InPrecursorMzRange {
    min: f64,
    max: f64,
    reverse: bool,
}

impl InPrecursorMzRange {
    pub fn new(min: f64, max: f64, reverse: bool) -> Self {
        Self { min, max, reverse }
    }
}

impl SpectrumPredicate for InPrecursorMzRange {
    fn test(&self, spectrum: &Spectrum) -> bool {
        let all_inside = spectrum
            .description
            .precursors
            .iter()
            .all(|p| self.min <= p.mz() && p.mz() <= self.max);
        apply_reverse(all_inside, self.reverse)
    }
}

/// True iff some precursor's isolation window encloses any of the target
/// m/z values.
#[derive(Debug, Clone)]
pub struct IsInIsolationWindow {
    targets: Vec<f64>,
    reverse: bool,
}

impl IsInIsolationWindow {
    pub fn new<I: IntoIterator<Item = f64>>(targets: I, reverse: bool) -> Self {
        Self {
            targets: targets.into_iter().collect(),
            reverse,
        }
    }
}

impl SpectrumPredicate for IsInIsolationWindow {
    fn test(&self, spectrum: &Spectrum) -> bool {
        let hit = spectrum.description.precursors.iter().any(|p| {
            let window = &p.isolation_window;
            !window.is_empty() && self.targets.iter().any(|t| window.contains(*t))
        });
        apply_reverse(hit, self.reverse)
    }
}

/// Presence of a named metadata entry on the spectrum.
#[derive(Debug, Clone)]
pub struct HasMetaValue {
    name: String,
    reverse: bool,
}

impl HasMetaValue {
    pub fn new(name: &str, reverse: bool) -> Self {
        Self {
            name: name.to_string(),
            reverse,
        }
    }
}

impl SpectrumPredicate for HasMetaValue {
    fn test(&self, spectrum: &Spectrum) -> bool {
        apply_reverse(spectrum.description.has_param(&self.name), self.reverse)
    }
}

/// Drop the spectra failing `predicate` from `spectra`.
pub fn filter_spectra<P: SpectrumPredicate>(spectra: &mut Vec<Spectrum>, predicate: &P) {
    spectra.retain(|s| predicate.test(s));
}

/// Drop the peaks failing `predicate` from one spectrum, co-filtering its
/// auxiliary arrays by index.
pub fn filter_peaks<P: PeakPredicate>(spectrum: &mut Spectrum, predicate: &P) {
    let keep: Vec<bool> = spectrum.peaks.iter().map(|p| predicate.test(p)).collect();
    let mut index = 0;
    spectrum.peaks.retain(|_| {
        let k = keep[index];
        index += 1;
        k
    });
    for array in spectrum.float_arrays.iter_mut() {
        if array.data.len() == keep.len() {
            let mut index = 0;
            array.data.retain(|_| {
                let k = keep[index];
                index += 1;
                k
            });
        }
    }
    for array in spectrum.integer_arrays.iter_mut() {
        if array.data.len() == keep.len() {
            let mut index = 0;
            array.data.retain(|_| {
                let k = keep[index];
                index += 1;
                k
            });
        }
    }
    for array in spectrum.string_arrays.iter_mut() {
        if array.data.len() == keep.len() {
            let mut index = 0;
            array.data.retain(|_| {
                let k = keep[index];
                index += 1;
                k
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::Param;
    use crate::spectrum::{Activation, IsolationWindow, Precursor, SelectedIon};

    fn spectrum_at(rt: f64) -> Spectrum {
        let mut s = Spectrum::default();
        s.description.first_scan_mut().start_time = rt;
        s.push(CentroidPeak::new(100.0, 1.0));
        s
    }

    #[test]
    fn test_rt_range_reverse_erases_inside() {
        let mut spectra: Vec<Spectrum> =
            [1.0, 10.0, 20.0, 30.0].iter().map(|rt| spectrum_at(*rt)).collect();
        // reverse=true keeps what lies OUTSIDE [5, 25].
        filter_spectra(&mut spectra, &InRtRange::new(5.0, 25.0, true));
        let rts: Vec<f64> = spectra.iter().map(|s| s.start_time()).collect();
        assert_eq!(rts, vec![1.0, 30.0]);
    }

    #[test]
    fn test_ms_level_and_polarity() {
        let mut s = spectrum_at(1.0);
        s.description.ms_level = 2;
        s.description.polarity = ScanPolarity::Negative;
        assert!(InMsLevelRange::new([2, 3], false).test(&s));
        assert!(!InMsLevelRange::new([1], false).test(&s));
        assert!(InMsLevelRange::new([1], true).test(&s));
        assert!(HasScanPolarity::new(ScanPolarity::Negative, false).test(&s));
        assert!(!HasScanPolarity::new(ScanPolarity::Positive, false).test(&s));
        s.description.scan_mode = ScanMode::SelectedIonMonitoring;
        assert!(HasScanMode::new(ScanMode::SelectedIonMonitoring, false).test(&s));
        assert!(!HasScanMode::new(ScanMode::MassSpectrum, false).test(&s));
    }

    #[test]
    fn test_empty_and_zoom() {
        let mut s = Spectrum::default();
        assert!(IsEmptySpectrum::new(false).test(&s));
        s.push(CentroidPeak::new(1.0, 1.0));
        assert!(!IsEmptySpectrum::new(false).test(&s));
        s.description.zoom_scan = true;
        assert!(IsZoomSpectrum::new(false).test(&s));
    }

    fn with_precursor(mz: f64, charge: i32, method: DissociationMethod) -> Spectrum {
        let mut s = spectrum_at(5.0);
        s.description.ms_level = 2;
        s.description.precursors.push(Precursor {
            ion: SelectedIon {
                mz,
                charge: Some(charge),
                ..Default::default()
            },
            isolation_window: IsolationWindow::new(mz, 1.0, 1.0),
            precursor_id: None,
            activation: Activation {
                methods: vec![method],
                energy: 30.0,
                params: Default::default(),
            },
        });
        s
    }

    #[test]
    fn test_precursor_predicates() {
        let s = with_precursor(
            500.0,
            2,
            DissociationMethod::BeamTypeCollisionInducedDissociation,
        );
        assert!(HasActivationMethod::new(
            [DissociationMethod::BeamTypeCollisionInducedDissociation],
            false
        )
        .test(&s));
        assert!(!HasActivationMethod::new(
            [DissociationMethod::ElectronTransferDissociation],
            false
        )
        .test(&s));
        assert!(HasPrecursorCharge::new([2, 3], false).test(&s));
        assert!(!HasPrecursorCharge::new([4], false).test(&s));
        assert!(InPrecursorMzRange::new(400.0, 600.0, false).test(&s));
        assert!(!InPrecursorMzRange::new(510.0, 600.0, false).test(&s));
        assert!(IsInIsolationWindow::new([500.5], false).test(&s));
        assert!(!IsInIsolationWindow::new([502.0], false).test(&s));
    }

    #[test]
    fn test_meta_value() {
        let mut s = spectrum_at(1.0);
        s.description
            .params
            .push(Param::new_key_value("filter string", "FTMS"));
        assert!(HasMetaValue::new("filter string", false).test(&s));
        assert!(!HasMetaValue::new("missing", false).test(&s));
    }

    #[test]
    fn test_peak_filter_co_filters_arrays() {
        let mut s = Spectrum::default();
        for (mz, inten) in [(100.0, 1.0), (200.0, 50.0), (300.0, 2.0)] {
            s.push(CentroidPeak::new(mz, inten));
        }
        s.integer_arrays.push(crate::spectrum::IntegerDataArray {
            name: "marker".into(),
            data: vec![1, 2, 3],
        });
        filter_peaks(&mut s, &InIntensityRange::new(10.0, 100.0, false));
        assert_eq!(s.len(), 1);
        assert_eq!(s.peaks[0].mz, 200.0);
        assert_eq!(s.integer_arrays[0].data, vec![2]);
    }
}
