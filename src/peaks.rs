//! Peak primitives shared by spectra, chromatograms and features.
use std::cmp::Ordering;
use std::fmt::Display;

/// An (m/z, intensity) pair, the element type of a centroided spectrum.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CentroidPeak {
    pub mz: f64,
    pub intensity: f32,
}

impl CentroidPeak {
    pub fn new(mz: f64, intensity: f32) -> Self {
        Self { mz, intensity }
    }

    #[inline]
    pub fn coordinate(&self) -> f64 {
        self.mz
    }
}

impl Display for CentroidPeak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CentroidPeak({:0.4}, {:0.4})", self.mz, self.intensity)
    }
}

impl PartialOrd for CentroidPeak {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.mz.partial_cmp(&other.mz)
    }
}

/// A (time, intensity) pair, the element type of a chromatogram.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TimeIntensityPeak {
    pub time: f64,
    pub intensity: f32,
}

impl TimeIntensityPeak {
    pub fn new(time: f64, intensity: f32) -> Self {
        Self { time, intensity }
    }

    #[inline]
    pub fn coordinate(&self) -> f64 {
        self.time
    }
}

impl PartialOrd for TimeIntensityPeak {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.time.partial_cmp(&other.time)
    }
}

/// Locate the peak nearest to `query` along the primary coordinate of a
/// sorted slice, breaking exact-distance ties toward the lower index.
///
/// Returns `None` when the slice is empty; callers with a non-empty
/// precondition surface that as a contract failure.
pub fn find_nearest<T, F: Fn(&T) -> f64>(peaks: &[T], query: f64, key: F) -> Option<usize> {
    if peaks.is_empty() {
        return None;
    }
    let partition = peaks.partition_point(|p| key(p) < query);
    let mut best = partition.min(peaks.len() - 1);
    if partition > 0 {
        let below = partition - 1;
        // `<=` so an exact tie resolves to the lower index.
        if (key(&peaks[below]) - query).abs() <= (key(&peaks[best]) - query).abs() {
            best = below;
        }
    }
    Some(best)
}
