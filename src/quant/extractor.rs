//! Extraction of reporter-channel intensities from fragmentation spectra
//! into a consensus map, one consensus feature per quantified scan.
use log::{debug, warn};

use crate::error::CoreError;
use crate::experiment::MSExperiment;
use crate::feature::{ColumnHeader, ConsensusFeature, ConsensusMap, ExperimentType, FeatureHandle};
use crate::spectrum::{DissociationMethod, Spectrum};
use crate::utils::unique_id;

use super::channels::IsobaricQuantitationMethod;

/// The smallest permitted reporter matching tolerance, in Th.
pub const MIN_REPORTER_MASS_SHIFT: f64 = 1e-4;

/// The default guard that keeps the tolerance of C/N kits from reaching a
/// sibling channel, in Th. Configurable for instruments with tighter
/// calibration.
pub const DEFAULT_SIBLING_CHANNEL_GUARD: f64 = 0.003;

/// Marks a consensus feature whose channels all came up empty.
const EMPTY_FEATURE_FLAG: &str = "all_channels_empty";

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    /// Matching half-window around each channel center, in Th
    pub reporter_mass_shift: f64,
    /// Only quantify scans whose precursor was activated by one of these;
    /// empty means no restriction
    pub select_activation: Vec<DissociationMethod>,
    /// Skip scans whose precursor isolation window is wider than this
    pub max_precursor_isolation_width: Option<f64>,
    /// MS levels considered; the deepest one present in the data is used
    pub ms_levels: Vec<u8>,
    /// Cap that keeps the tolerance out of sibling C/N channels
    pub sibling_channel_guard: f64,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            reporter_mass_shift: 0.002,
            select_activation: Vec::new(),
            max_precursor_isolation_width: None,
            ms_levels: vec![2, 3],
            sibling_channel_guard: DEFAULT_SIBLING_CHANNEL_GUARD,
        }
    }
}

/// Extracts per-channel reporter intensities from an experiment.
#[derive(Debug)]
pub struct IsobaricChannelExtractor {
    method: IsobaricQuantitationMethod,
    settings: ExtractorSettings,
    /// Effective tolerance after validation and sibling-guard capping
    tolerance: f64,
    /// Observed-minus-expected m/z deltas per channel, for diagnostics
    deltas: Vec<Vec<f64>>,
}

impl IsobaricChannelExtractor {
    pub fn new(
        method: IsobaricQuantitationMethod,
        settings: ExtractorSettings,
    ) -> Result<Self, CoreError> {
        if settings.reporter_mass_shift < MIN_REPORTER_MASS_SHIFT {
            return Err(CoreError::InvalidValue {
                name: "reporter_mass_shift".into(),
                message: format!(
                    "{} is below the minimum of {}",
                    settings.reporter_mass_shift, MIN_REPORTER_MASS_SHIFT
                ),
            });
        }
        let mut tolerance = settings.reporter_mass_shift;
        if method.method.has_cn_siblings() && tolerance >= settings.sibling_channel_guard {
            warn!(
                "reporter_mass_shift {} would reach into sibling C/N channels; capping at {}",
                tolerance, settings.sibling_channel_guard
            );
            tolerance = settings.sibling_channel_guard * 0.999;
        }
        let deltas = vec![Vec::new(); method.channel_count()];
        Ok(Self {
            method,
            settings,
            tolerance,
            deltas,
        })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// The per-channel median observed-vs-expected m/z offset of the scans
    /// extracted so far. NaN for channels never observed.
    pub fn channel_mz_deltas(&self) -> Vec<f64> {
        self.deltas
            .iter()
            .map(|values| {
                if values.is_empty() {
                    return f64::NAN;
                }
                let mut sorted = values.clone();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            })
            .collect()
    }

    /// The deepest configured MS level present in the data, if any.
    fn quantification_level(&self, experiment: &MSExperiment) -> Option<u8> {
        self.settings
            .ms_levels
            .iter()
            .copied()
            .filter(|level| experiment.iter().any(|s| s.ms_level() == *level))
            .max()
    }

    fn passes_filters(&self, spectrum: &Spectrum) -> bool {
        let Some(precursor) = spectrum.description.first_precursor() else {
            return false;
        };
        if !self.settings.select_activation.is_empty()
            && !precursor
                .activation
                .intersects(&self.settings.select_activation)
        {
            return false;
        }
        if let Some(max_width) = self.settings.max_precursor_isolation_width {
            let window = &precursor.isolation_window;
            if !window.is_empty() && window.width() > max_width {
                return false;
            }
        }
        true
    }

    /// The intensity of the best peak for one channel: the non-zero signal
    /// nearest the channel center within tolerance, else zero.
    fn channel_intensity(&mut self, spectrum: &Spectrum, channel_id: usize) -> f32 {
        let center = self.method.channels()[channel_id].center;
        let candidates = spectrum.mz_range(center - self.tolerance, center + self.tolerance);
        let best = candidates
            .iter()
            .filter(|p| p.intensity > 0.0)
            .min_by(|a, b| {
                (a.mz - center)
                    .abs()
                    .total_cmp(&(b.mz - center).abs())
            });
        match best {
            Some(peak) => {
                self.deltas[channel_id].push(peak.mz - center);
                peak.intensity
            }
            None => 0.0,
        }
    }

    /// Walk the experiment and assemble one consensus feature per
    /// quantified scan. Spectra must be sorted by position.
    pub fn extract(&mut self, experiment: &MSExperiment) -> Result<ConsensusMap, CoreError> {
        let mut map = ConsensusMap::new();
        map.experiment_type = ExperimentType::LabeledMS2;
        let filename = experiment
            .primary_ms_run_path()
            .first()
            .cloned()
            .unwrap_or_default();
        for channel in self.method.channels() {
            map.column_headers.insert(
                channel.id as u64,
                ColumnHeader {
                    filename: filename.clone(),
                    label: format!("{} {}", self.method.method, channel.name),
                    size: 0,
                    unique_id: unique_id(),
                },
            );
        }

        let Some(level) = self.quantification_level(experiment) else {
            debug!("no spectra at any configured MS level; nothing to extract");
            return Ok(map);
        };
        debug!("quantifying reporter ions at MS level {}", level);

        for spectrum in experiment.iter().filter(|s| s.ms_level() == level) {
            if spectrum.is_empty() || !self.passes_filters(spectrum) {
                continue;
            }
            let precursor = spectrum.description.first_precursor().unwrap();
            let precursor_mz = precursor.mz();
            let precursor_charge = precursor.charge().unwrap_or_default();

            let mut feature = ConsensusFeature::new(spectrum.start_time(), precursor_mz);
            let mut any_signal = false;
            for channel_id in 0..self.method.channel_count() {
                let intensity = self.channel_intensity(spectrum, channel_id);
                any_signal |= intensity > 0.0;
                feature.insert(FeatureHandle {
                    map_index: channel_id as u64,
                    unique_id: unique_id(),
                    rt: spectrum.start_time(),
                    mz: precursor_mz,
                    intensity,
                    charge: precursor_charge,
                });
            }
            feature.compute_consensus();
            if !any_signal {
                feature
                    .params
                    .push(crate::params::Param::new_key_value(EMPTY_FEATURE_FLAG, "1"));
            }
            map.push(feature);
        }

        // Features with no signal in any channel carry nothing worth
        // keeping; they were tagged above and are dropped here.
        let before = map.len();
        map.features
            .retain(|f| !f.params.iter().any(|p| p.name == EMPTY_FEATURE_FLAG));
        if map.len() != before {
            debug!("dropped {} empty consensus features", before - map.len());
        }
        for (index, header) in map.column_headers.iter_mut() {
            header.size = map
                .features
                .iter()
                .filter(|f| f.intensity_for(*index) > 0.0)
                .count();
        }
        Ok(map)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::peaks::CentroidPeak;
    use crate::quant::channels::IsobaricLabelingMethod;
    use crate::spectrum::{
        Activation, IsolationWindow, Precursor, SelectedIon, SpectrumDescription,
    };

    fn ms2_with_peaks(rt: f64, peaks: &[(f64, f32)]) -> Spectrum {
        let mut description = SpectrumDescription {
            ms_level: 2,
            ..Default::default()
        };
        description.first_scan_mut().start_time = rt;
        description.precursors.push(Precursor {
            ion: SelectedIon {
                mz: 650.33,
                charge: Some(2),
                ..Default::default()
            },
            isolation_window: IsolationWindow::new(650.33, 1.0, 1.0),
            precursor_id: None,
            activation: Activation {
                methods: vec![DissociationMethod::BeamTypeCollisionInducedDissociation],
                energy: 35.0,
                params: Default::default(),
            },
        });
        let mut spectrum = Spectrum::new(description);
        for (mz, intensity) in peaks {
            spectrum.push(CentroidPeak::new(*mz, *intensity));
        }
        spectrum.sort_by_position();
        spectrum
    }

    fn four_plex_extractor() -> IsobaricChannelExtractor {
        IsobaricChannelExtractor::new(
            IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Itraq4plex),
            ExtractorSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_four_plex_extraction_with_tolerance_miss() {
        let mut experiment = MSExperiment::new();
        experiment.push(ms2_with_peaks(
            100.0,
            &[
                (114.1110, 1000.0),
                (115.1090, 800.0),
                (116.1115, 1200.0),
                // 117.15 is ~35 mTh off the 117 channel: out of tolerance.
                (117.1500, 500.0),
            ],
        ));

        let mut extractor = four_plex_extractor();
        let map = extractor.extract(&experiment).unwrap();
        assert_eq!(map.len(), 1);
        let feature = &map.features[0];
        assert_eq!(feature.intensity_for(0), 1000.0);
        assert_eq!(feature.intensity_for(1), 800.0);
        assert_eq!(feature.intensity_for(2), 1200.0);
        assert_eq!(feature.intensity_for(3), 0.0);
        assert_eq!(feature.rt, 100.0);
        assert!((feature.mz - 650.33).abs() < 1e-9);
        assert_eq!(feature.handles[0].charge, 2);
        assert!(map.is_map_consistent(None));
    }

    #[test]
    fn test_all_zero_features_are_dropped_but_empty_spectra_skip() {
        let mut experiment = MSExperiment::new();
        // Peaks nowhere near any channel.
        experiment.push(ms2_with_peaks(10.0, &[(500.0, 100.0)]));
        // A peak-free spectrum produces no feature at all.
        experiment.push(ms2_with_peaks(20.0, &[]));

        let mut extractor = four_plex_extractor();
        let map = extractor.extract(&experiment).unwrap();
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_activation_filter() {
        let mut experiment = MSExperiment::new();
        experiment.push(ms2_with_peaks(10.0, &[(114.1112, 10.0)]));
        let mut settings = ExtractorSettings::default();
        settings.select_activation = vec![DissociationMethod::ElectronTransferDissociation];
        let mut extractor = IsobaricChannelExtractor::new(
            IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Itraq4plex),
            settings,
        )
        .unwrap();
        let map = extractor.extract(&experiment).unwrap();
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_isolation_width_filter() {
        let mut experiment = MSExperiment::new();
        experiment.push(ms2_with_peaks(10.0, &[(114.1112, 10.0)]));
        let mut settings = ExtractorSettings::default();
        settings.max_precursor_isolation_width = Some(1.5);
        let mut extractor = IsobaricChannelExtractor::new(
            IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Itraq4plex),
            settings,
        )
        .unwrap();
        // The test precursor's window is 2.0 wide.
        let map = extractor.extract(&experiment).unwrap();
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn test_deepest_level_wins() {
        let mut experiment = MSExperiment::new();
        experiment.push(ms2_with_peaks(10.0, &[(114.1112, 11.0)]));
        let mut ms3 = ms2_with_peaks(11.0, &[(115.1082, 22.0)]);
        ms3.description.ms_level = 3;
        experiment.push(ms3);

        let mut extractor = four_plex_extractor();
        let map = extractor.extract(&experiment).unwrap();
        // Only the MS3 scan is quantified.
        assert_eq!(map.len(), 1);
        assert_eq!(map.features[0].intensity_for(1), 22.0);
        assert_eq!(map.features[0].intensity_for(0), 0.0);
    }

    #[test]
    fn test_tolerance_validation_and_cap() {
        let mut settings = ExtractorSettings::default();
        settings.reporter_mass_shift = 1e-5;
        assert!(matches!(
            IsobaricChannelExtractor::new(
                IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Itraq4plex),
                settings
            ),
            Err(CoreError::InvalidValue { .. })
        ));

        let mut settings = ExtractorSettings::default();
        settings.reporter_mass_shift = 0.01;
        let extractor = IsobaricChannelExtractor::new(
            IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Tmt10plex),
            settings.clone(),
        )
        .unwrap();
        assert!(extractor.tolerance() < DEFAULT_SIBLING_CHANNEL_GUARD);

        // Simple kits keep the configured value.
        let extractor = IsobaricChannelExtractor::new(
            IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Itraq4plex),
            settings,
        )
        .unwrap();
        assert_eq!(extractor.tolerance(), 0.01);
    }

    #[test]
    fn test_median_deltas() {
        let mut experiment = MSExperiment::new();
        experiment.push(ms2_with_peaks(10.0, &[(114.1110, 10.0)]));
        experiment.push(ms2_with_peaks(20.0, &[(114.1114, 10.0)]));
        let mut extractor = four_plex_extractor();
        extractor.extract(&experiment).unwrap();
        let deltas = extractor.channel_mz_deltas();
        // Median of −0.0002 and +0.0002.
        assert!(deltas[0].abs() < 1e-9);
        assert!(deltas[1].is_nan());
    }
}
