//! The centroided spectrum container.
use std::ops::Range;

use log::warn;

use super::description::{ScanPolarity, SpectrumDescription};
use crate::peaks::{find_nearest, CentroidPeak};
use crate::range::RangeManager;

/// A named per-peak auxiliary array. The `data` length must match the peak
/// count for the array to participate in sorting and round trips.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FloatDataArray {
    pub name: String,
    pub data: Vec<f32>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct IntegerDataArray {
    pub name: String,
    pub data: Vec<i32>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct StringDataArray {
    pub name: String,
    pub data: Vec<String>,
}

/// An ordered sequence of peaks acquired at one retention time, plus the
/// scan metadata and any per-peak auxiliary arrays.
///
/// Sorting co-permutes every auxiliary array whose length matches the peak
/// count, so values stay attached to the peak they describe.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Spectrum {
    pub description: SpectrumDescription,
    pub peaks: Vec<CentroidPeak>,
    pub float_arrays: Vec<FloatDataArray>,
    pub integer_arrays: Vec<IntegerDataArray>,
    pub string_arrays: Vec<StringDataArray>,
    ranges: RangeManager,
}

impl Spectrum {
    pub fn new(description: SpectrumDescription) -> Self {
        Self {
            description,
            ..Default::default()
        }
    }

    pub fn with_peaks(description: SpectrumDescription, peaks: Vec<CentroidPeak>) -> Self {
        Self {
            description,
            peaks,
            ..Default::default()
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.description.id
    }

    #[inline]
    pub fn ms_level(&self) -> u8 {
        self.description.ms_level
    }

    #[inline]
    pub fn polarity(&self) -> ScanPolarity {
        self.description.polarity
    }

    /// The scan start time in seconds.
    #[inline]
    pub fn start_time(&self) -> f64 {
        self.description.start_time()
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn push(&mut self, peak: CentroidPeak) {
        self.peaks.push(peak);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CentroidPeak> {
        self.peaks.iter()
    }

    /// The total ion current of this spectrum.
    pub fn total_ion_current(&self) -> f64 {
        self.peaks.iter().map(|p| p.intensity as f64).sum()
    }

    /// The most intense peak, if any.
    pub fn base_peak(&self) -> Option<&CentroidPeak> {
        self.peaks
            .iter()
            .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
    }

    /// Sort peaks by m/z ascending, stably, carrying the auxiliary arrays
    /// along.
    pub fn sort_by_position(&mut self) {
        self.apply_permutation(|peaks| {
            let mut order: Vec<usize> = (0..peaks.len()).collect();
            order.sort_by(|&a, &b| peaks[a].mz.total_cmp(&peaks[b].mz));
            order
        });
    }

    /// Sort peaks by intensity; `descending` puts the base peak first.
    pub fn sort_by_intensity(&mut self, descending: bool) {
        self.apply_permutation(|peaks| {
            let mut order: Vec<usize> = (0..peaks.len()).collect();
            if descending {
                order.sort_by(|&a, &b| peaks[b].intensity.total_cmp(&peaks[a].intensity));
            } else {
                order.sort_by(|&a, &b| peaks[a].intensity.total_cmp(&peaks[b].intensity));
            }
            order
        });
    }

    fn apply_permutation<F: Fn(&[CentroidPeak]) -> Vec<usize>>(&mut self, make_order: F) {
        let order = make_order(&self.peaks);
        let n = self.peaks.len();
        self.peaks = order.iter().map(|&i| self.peaks[i]).collect();
        for array in self.float_arrays.iter_mut() {
            if array.data.len() == n {
                array.data = order.iter().map(|&i| array.data[i]).collect();
            } else {
                warn!(
                    "float array '{}' has {} entries for {} peaks; left unsorted",
                    array.name,
                    array.data.len(),
                    n
                );
            }
        }
        for array in self.integer_arrays.iter_mut() {
            if array.data.len() == n {
                array.data = order.iter().map(|&i| array.data[i]).collect();
            } else {
                warn!(
                    "integer array '{}' has {} entries for {} peaks; left unsorted",
                    array.name,
                    array.data.len(),
                    n
                );
            }
        }
        for array in self.string_arrays.iter_mut() {
            if array.data.len() == n {
                array.data = order.iter().map(|&i| array.data[i].clone()).collect();
            } else {
                warn!(
                    "string array '{}' has {} entries for {} peaks; left unsorted",
                    array.name,
                    array.data.len(),
                    n
                );
            }
        }
    }

    pub fn is_sorted_by_position(&self) -> bool {
        self.peaks.windows(2).all(|w| w[0].mz <= w[1].mz)
    }

    /// The index of the peak nearest `mz`, ties toward the lower index.
    /// Requires a position-sorted, non-empty spectrum.
    pub fn find_nearest(&self, mz: f64) -> Option<usize> {
        find_nearest(&self.peaks, mz, |p| p.mz)
    }

    /// The index range of peaks with `lo <= mz < hi`. Requires sortedness.
    pub fn mz_range_indices(&self, lo: f64, hi: f64) -> Range<usize> {
        let start = self.peaks.partition_point(|p| p.mz < lo);
        let end = self.peaks.partition_point(|p| p.mz < hi);
        start..end
    }

    /// The peaks with `lo <= mz < hi` as a slice. Requires sortedness.
    pub fn mz_range(&self, lo: f64, hi: f64) -> &[CentroidPeak] {
        &self.peaks[self.mz_range_indices(lo, hi)]
    }

    /// Drop the peak data. When `clear_meta` is set the description and the
    /// auxiliary array definitions go too; otherwise array contents are
    /// emptied but their names remain declared.
    pub fn clear(&mut self, clear_meta: bool) {
        self.peaks.clear();
        self.ranges.clear();
        if clear_meta {
            self.description = SpectrumDescription::default();
            self.float_arrays.clear();
            self.integer_arrays.clear();
            self.string_arrays.clear();
        } else {
            for array in self.float_arrays.iter_mut() {
                array.data.clear();
            }
            for array in self.integer_arrays.iter_mut() {
                array.data.clear();
            }
            for array in self.string_arrays.iter_mut() {
                array.data.clear();
            }
        }
    }

    /// Recompute the m/z and intensity envelope. RT tracks the scan start
    /// time.
    pub fn update_ranges(&mut self) {
        let rt = self.start_time();
        let peaks = &self.peaks;
        self.ranges
            .update_ranges(peaks.iter().map(|p| (rt, p.mz, p.intensity as f64)));
    }

    pub fn ranges(&self) -> &RangeManager {
        &self.ranges
    }
}

impl<'a> IntoIterator for &'a Spectrum {
    type Item = &'a CentroidPeak;
    type IntoIter = std::slice::Iter<'a, CentroidPeak>;

    fn into_iter(self) -> Self::IntoIter {
        self.peaks.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn scrambled() -> Spectrum {
        let mut spectrum = Spectrum::default();
        for (mz, intensity) in [(300.0, 30.0), (100.0, 10.0), (200.0, 20.0)] {
            spectrum.push(CentroidPeak::new(mz, intensity));
        }
        spectrum.integer_arrays.push(IntegerDataArray {
            name: "marker".into(),
            data: vec![3, 1, 2],
        });
        spectrum.float_arrays.push(FloatDataArray {
            name: "noise".into(),
            data: vec![0.3, 0.1, 0.2],
        });
        spectrum
    }

    #[test]
    fn test_sort_co_permutes_parallel_arrays() {
        let mut spectrum = scrambled();
        spectrum.sort_by_position();
        assert!(spectrum.is_sorted_by_position());
        assert_eq!(spectrum.integer_arrays[0].data, vec![1, 2, 3]);
        assert_eq!(spectrum.float_arrays[0].data, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let mut once = scrambled();
        once.sort_by_position();
        let mut twice = once.clone();
        twice.sort_by_position();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_shuffled_spectra_keep_arrays_aligned() {
        // A batch of deterministic shuffles; each peak is tagged with its
        // identity in a parallel integer array, which must follow it
        // through the sort.
        let mut state: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for _ in 0..20 {
            let n = 50;
            let mut spectrum = Spectrum::default();
            let mut markers = Vec::with_capacity(n);
            let mut order: Vec<usize> = (0..n).collect();
            for i in (1..n).rev() {
                order.swap(i, (next() % (i as u64 + 1)) as usize);
            }
            for &slot in &order {
                spectrum.push(CentroidPeak::new(100.0 + slot as f64, slot as f32));
                markers.push(slot as i32);
            }
            spectrum.integer_arrays.push(IntegerDataArray {
                name: "marker".into(),
                data: markers,
            });
            spectrum.sort_by_position();
            for (peak, marker) in spectrum.iter().zip(spectrum.integer_arrays[0].data.iter()) {
                assert_eq!(peak.mz, 100.0 + *marker as f64);
                assert_eq!(peak.intensity, *marker as f32);
            }
        }
    }

    #[test]
    fn test_sort_by_intensity_descending() {
        let mut spectrum = scrambled();
        spectrum.sort_by_intensity(true);
        assert_eq!(spectrum.peaks[0].mz, 300.0);
        assert_eq!(spectrum.integer_arrays[0].data, vec![3, 2, 1]);
    }

    #[test_log::test]
    fn test_mismatched_array_left_alone() {
        let mut spectrum = scrambled();
        spectrum.float_arrays.push(FloatDataArray {
            name: "short".into(),
            data: vec![9.0],
        });
        spectrum.sort_by_position();
        assert_eq!(spectrum.float_arrays[1].data, vec![9.0]);
    }

    #[test]
    fn test_find_nearest_tie_break() {
        let mut spectrum = Spectrum::default();
        for mz in [100.0, 200.0, 350.0] {
            spectrum.push(CentroidPeak::new(mz, 1.0));
        }
        // 275 is equidistant between 200 and 350: lower index wins.
        assert_eq!(spectrum.find_nearest(275.0), Some(1));
        assert_eq!(spectrum.find_nearest(351.0), Some(2));
        assert_eq!(Spectrum::default().find_nearest(100.0), None);
    }

    #[test]
    fn test_mz_range_is_half_open() {
        let mut spectrum = scrambled();
        spectrum.sort_by_position();
        let hits = spectrum.mz_range(100.0, 300.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].mz, 100.0);
        assert_eq!(hits[1].mz, 200.0);
    }

    #[test]
    fn test_two_level_clear() {
        let mut spectrum = scrambled();
        spectrum.description.id = "scan=1".into();
        spectrum.clear(false);
        assert!(spectrum.is_empty());
        assert_eq!(spectrum.description.id, "scan=1");
        assert_eq!(spectrum.integer_arrays[0].name, "marker");
        assert!(spectrum.integer_arrays[0].data.is_empty());

        let mut spectrum = scrambled();
        spectrum.clear(true);
        assert!(spectrum.integer_arrays.is_empty());
        assert_eq!(spectrum.description, SpectrumDescription::default());
    }

    #[test]
    fn test_update_ranges() {
        let mut spectrum = scrambled();
        spectrum.description.first_scan_mut().start_time = 12.0;
        spectrum.update_ranges();
        assert_eq!(spectrum.ranges().mz.min(), 100.0);
        assert_eq!(spectrum.ranges().mz.max(), 300.0);
        assert_eq!(spectrum.ranges().rt.min(), 12.0);
        assert_eq!(spectrum.ranges().intensity.max(), 30.0);
    }
}
