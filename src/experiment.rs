//! The in-memory experiment: an ordered run of spectra plus chromatograms
//! and the run-level metadata they share.
use crate::meta::{DataProcessing, FileDescription, InstrumentConfiguration, Sample, Software};
use crate::params::ParamList;
use crate::peaks::CentroidPeak;
use crate::range::RangeManager;
use crate::spectrum::{Chromatogram, ScanEvent, Spectrum, SpectrumDescription};
use crate::impl_param_described;

/// Run-level metadata shared by every spectrum of an experiment.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExperimentalSettings {
    pub file_description: FileDescription,
    pub instrument_configurations: Vec<InstrumentConfiguration>,
    pub softwares: Vec<Software>,
    pub samples: Vec<Sample>,
    pub data_processing: Vec<DataProcessing>,
    /// The native run identifier
    pub run_id: Option<String>,
    /// An identifier for the document as a whole
    pub document_id: Option<String>,
    /// The fraction this run measured, if the sample was fractionated
    pub fraction_identifier: Option<String>,
    pub params: ParamList,
}

impl_param_described!(ExperimentalSettings);

/// An ordered sequence of spectra and chromatograms, sorted by retention
/// time after [`MSExperiment::sort_by_rt`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MSExperiment {
    pub settings: ExperimentalSettings,
    pub spectra: Vec<Spectrum>,
    pub chromatograms: Vec<Chromatogram>,
    ranges: RangeManager,
}

impl MSExperiment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    pub fn push(&mut self, spectrum: Spectrum) {
        self.spectra.push(spectrum);
    }

    pub fn get(&self, index: usize) -> Option<&Spectrum> {
        self.spectra.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Spectrum> {
        self.spectra.get_mut(index)
    }

    pub fn get_by_id(&self, id: &str) -> Option<&Spectrum> {
        self.spectra.iter().find(|s| s.id() == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Spectrum> {
        self.spectra.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Spectrum> {
        self.spectra.iter_mut()
    }

    /// Stable sort of the run by scan start time.
    pub fn sort_by_rt(&mut self) {
        self.spectra
            .sort_by(|a, b| a.start_time().total_cmp(&b.start_time()));
        self.chromatograms.iter_mut().for_each(|c| c.sort_by_time());
    }

    pub fn is_sorted_by_rt(&self) -> bool {
        self.spectra
            .windows(2)
            .all(|w| w[0].start_time() <= w[1].start_time())
    }

    /// The spectra with `lo <= start_time < hi`. Requires RT sortedness.
    pub fn rt_range(&self, lo: f64, hi: f64) -> &[Spectrum] {
        let start = self.spectra.partition_point(|s| s.start_time() < lo);
        let end = self.spectra.partition_point(|s| s.start_time() < hi);
        &self.spectra[start..end]
    }

    /// Recompute the RT/m/z/intensity envelope over all spectra,
    /// transitively refreshing each spectrum's own envelope first.
    pub fn update_ranges(&mut self) {
        self.ranges.clear();
        for spectrum in self.spectra.iter_mut() {
            spectrum.update_ranges();
            self.ranges = self.ranges.united(spectrum.ranges());
        }
    }

    pub fn ranges(&self) -> &RangeManager {
        &self.ranges
    }

    /// Flatten all MS1 spectra into (rt, mz, intensity) tuples.
    pub fn get_2d_data(&self) -> Vec<(f64, f64, f32)> {
        let mut out = Vec::new();
        for spectrum in self.spectra.iter().filter(|s| s.ms_level() == 1) {
            let rt = spectrum.start_time();
            for peak in spectrum.iter() {
                out.push((rt, peak.mz, peak.intensity));
            }
        }
        out
    }

    /// Rebuild the MS1 content of this experiment from (rt, mz, intensity)
    /// tuples, bucketing consecutive equal retention times into one
    /// spectrum. Existing spectra are replaced.
    pub fn set_2d_data(&mut self, points: &[(f64, f64, f32)]) {
        self.spectra.clear();
        let mut current_rt = f64::NAN;
        for &(rt, mz, intensity) in points {
            if rt != current_rt || self.spectra.is_empty() {
                current_rt = rt;
                let mut description = SpectrumDescription {
                    ms_level: 1,
                    index: self.spectra.len(),
                    ..Default::default()
                };
                description.scans.push(ScanEvent {
                    start_time: rt,
                    ..Default::default()
                });
                self.spectra.push(Spectrum::new(description));
            }
            self.spectra
                .last_mut()
                .unwrap()
                .push(CentroidPeak::new(mz, intensity));
        }
    }

    /// The file paths this experiment's raw data came from. The recorded
    /// source files are authoritative unless an override was installed
    /// with [`MSExperiment::set_primary_ms_run_path`].
    pub fn primary_ms_run_path(&self) -> Vec<String> {
        if let Some(p) = self
            .settings
            .params
            .iter()
            .find(|p| p.name == "primary_ms_run_path")
        {
            return p.value.split('\n').map(|s| s.to_string()).collect();
        }
        self.settings
            .file_description
            .source_files
            .iter()
            .map(|sf| sf.path())
            .collect()
    }

    /// Install an override list of run paths that the writer will honour.
    pub fn set_primary_ms_run_path(&mut self, paths: &[String]) {
        self.settings
            .params
            .retain(|p| p.name != "primary_ms_run_path");
        self.settings.params.push(crate::params::Param::new_key_value(
            "primary_ms_run_path",
            paths.join("\n"),
        ));
    }

    /// Drop spectra for which `predicate` returns false.
    pub fn retain_spectra<F: FnMut(&Spectrum) -> bool>(&mut self, predicate: F) {
        self.spectra.retain(predicate);
    }

    pub fn clear(&mut self, clear_meta: bool) {
        self.spectra.clear();
        self.chromatograms.clear();
        self.ranges.clear();
        if clear_meta {
            self.settings = ExperimentalSettings::default();
        }
    }
}

impl<'a> IntoIterator for &'a MSExperiment {
    type Item = &'a Spectrum;
    type IntoIter = std::slice::Iter<'a, Spectrum>;

    fn into_iter(self) -> Self::IntoIter {
        self.spectra.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::SourceFile;

    fn spectrum_at(rt: f64, ms_level: u8, peaks: &[(f64, f32)]) -> Spectrum {
        let mut description = SpectrumDescription {
            ms_level,
            ..Default::default()
        };
        description.first_scan_mut().start_time = rt;
        let peaks = peaks
            .iter()
            .map(|(mz, inten)| CentroidPeak::new(*mz, *inten))
            .collect();
        Spectrum::with_peaks(description, peaks)
    }

    #[test]
    fn test_sort_and_rt_range() {
        let mut exp = MSExperiment::new();
        for rt in [30.0, 1.0, 20.0, 10.0] {
            exp.push(spectrum_at(rt, 1, &[(100.0, 1.0)]));
        }
        assert!(!exp.is_sorted_by_rt());
        exp.sort_by_rt();
        assert!(exp.is_sorted_by_rt());
        let hits = exp.rt_range(5.0, 25.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].start_time(), 10.0);
    }

    #[test]
    fn test_2d_round_trip_buckets_by_rt() {
        let mut exp = MSExperiment::new();
        exp.push(spectrum_at(1.0, 1, &[(100.0, 1.0), (200.0, 2.0)]));
        exp.push(spectrum_at(2.0, 1, &[(150.0, 3.0)]));
        exp.push(spectrum_at(1.5, 2, &[(55.0, 9.0)]));

        let points = exp.get_2d_data();
        // MS2 content is not part of the 2D view.
        assert_eq!(points.len(), 3);

        let mut rebuilt = MSExperiment::new();
        rebuilt.set_2d_data(&points);
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt.get(0).unwrap().len(), 2);
        assert_eq!(rebuilt.get(1).unwrap().start_time(), 2.0);
        assert_eq!(rebuilt.get_2d_data(), points);
    }

    #[test]
    fn test_primary_run_path_and_override() {
        let mut exp = MSExperiment::new();
        exp.settings
            .file_description
            .source_files
            .push(SourceFile::new("run.raw", "file:///data", "sf_1"));
        assert_eq!(exp.primary_ms_run_path(), vec!["/data/run.raw".to_string()]);

        exp.set_primary_ms_run_path(&["override.mzML".to_string()]);
        assert_eq!(exp.primary_ms_run_path(), vec!["override.mzML".to_string()]);
    }

    #[test]
    fn test_update_ranges_transitive() {
        let mut exp = MSExperiment::new();
        exp.push(spectrum_at(5.0, 1, &[(100.0, 10.0)]));
        exp.push(spectrum_at(7.0, 1, &[(900.0, 3.0)]));
        exp.update_ranges();
        assert_eq!(exp.ranges().rt.min(), 5.0);
        assert_eq!(exp.ranges().rt.max(), 7.0);
        assert_eq!(exp.ranges().mz.max(), 900.0);
        assert_eq!(exp.ranges().intensity.max(), 10.0);
    }
}
