//! Chromatograms: intensity traces over time.
use super::description::ChromatogramDescription;
use super::spectrum::FloatDataArray;
use crate::peaks::{find_nearest, TimeIntensityPeak};

/// An ordered sequence of (time, intensity) points with optional precursor
/// and product m/z context.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Chromatogram {
    pub description: ChromatogramDescription,
    pub peaks: Vec<TimeIntensityPeak>,
    pub float_arrays: Vec<FloatDataArray>,
}

impl Chromatogram {
    pub fn new(description: ChromatogramDescription) -> Self {
        Self {
            description,
            ..Default::default()
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.description.id
    }

    pub fn precursor_mz(&self) -> Option<f64> {
        self.description.precursor.as_ref().map(|p| p.mz())
    }

    pub fn product_mz(&self) -> Option<f64> {
        self.description.product_mz
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn push(&mut self, peak: TimeIntensityPeak) {
        self.peaks.push(peak);
    }

    /// Sort points by time ascending, stably, carrying auxiliary arrays
    /// along.
    pub fn sort_by_time(&mut self) {
        let mut order: Vec<usize> = (0..self.peaks.len()).collect();
        order.sort_by(|&a, &b| self.peaks[a].time.total_cmp(&self.peaks[b].time));
        let n = self.peaks.len();
        self.peaks = order.iter().map(|&i| self.peaks[i]).collect();
        for array in self.float_arrays.iter_mut() {
            if array.data.len() == n {
                array.data = order.iter().map(|&i| array.data[i]).collect();
            }
        }
    }

    pub fn is_sorted_by_time(&self) -> bool {
        self.peaks.windows(2).all(|w| w[0].time <= w[1].time)
    }

    pub fn find_nearest(&self, time: f64) -> Option<usize> {
        find_nearest(&self.peaks, time, |p| p.time)
    }

    /// Points with `lo <= time < hi`. Requires sortedness.
    pub fn time_range(&self, lo: f64, hi: f64) -> &[TimeIntensityPeak] {
        let start = self.peaks.partition_point(|p| p.time < lo);
        let end = self.peaks.partition_point(|p| p.time < hi);
        &self.peaks[start..end]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sort_and_query() {
        let mut tic = Chromatogram::default();
        for (t, i) in [(3.0, 30.0), (1.0, 10.0), (2.0, 20.0)] {
            tic.push(TimeIntensityPeak::new(t, i));
        }
        tic.float_arrays.push(FloatDataArray {
            name: "baseline".into(),
            data: vec![0.3, 0.1, 0.2],
        });
        tic.sort_by_time();
        assert!(tic.is_sorted_by_time());
        assert_eq!(tic.float_arrays[0].data, vec![0.1, 0.2, 0.3]);
        assert_eq!(tic.time_range(1.5, 3.0).len(), 1);
        assert_eq!(tic.find_nearest(2.2), Some(1));
    }
}
