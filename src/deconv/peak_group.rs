//! Deconvolved peak groups: one monoisotopic mass with all of its matched
//! isotopologue peaks across charge states.
use std::fmt::Display;

/// Whether a peak group came from the real run or from one of the dummy
/// replays used to estimate false-discovery rates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetDecoyType {
    #[default]
    Target,
    ChargeDummy,
    NoiseDummy,
    IsotopeDummy,
}

impl Display for TargetDecoyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Target => "target",
            Self::ChargeDummy => "charge_dummy",
            Self::NoiseDummy => "noise_dummy",
            Self::IsotopeDummy => "isotope_dummy",
        };
        f.write_str(text)
    }
}

/// One observed peak assigned to a peak group.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FeatureSeed {
    /// ln(mz − proton), the binning coordinate
    pub log_mz: f64,
    /// The observed m/z
    pub mz: f64,
    pub intensity: f32,
    pub charge: i32,
    /// Which isotopologue of the group this peak is
    pub isotope_index: i32,
    /// Index bounds of the mass trace this peak belongs to
    pub trace_bounds: (usize, usize),
}

/// A deconvolved mass: its charge span, per-charge and per-isotope signal,
/// quality scores, and the constituent peaks.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PeakGroup {
    pub monoisotopic_mass: f64,
    /// Smallest and largest absolute charge with matched signal
    pub charge_range: (i32, i32),
    /// Summed intensity per absolute charge, indexed from charge_range.0
    pub per_charge_intensity: Vec<f32>,
    /// Summed intensity per isotope index
    pub per_isotope_intensity: Vec<f32>,
    pub isotope_cosine: f32,
    pub snr: f32,
    /// Retention time of the most abundant contributing scan
    pub rt: f64,
    pub seeds: Vec<FeatureSeed>,
    pub target_decoy_type: TargetDecoyType,
}

impl PeakGroup {
    pub fn intensity(&self) -> f32 {
        self.seeds.iter().map(|s| s.intensity).sum()
    }

    pub fn seed_count(&self) -> usize {
        self.seeds.len()
    }

    /// The charge carrying the most signal.
    pub fn most_abundant_charge(&self) -> Option<i32> {
        self.per_charge_intensity
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .filter(|(_, v)| **v > 0.0)
            .map(|(slot, _)| self.charge_range.0 + slot as i32)
    }

    /// The m/z span covered by this group's seeds.
    pub fn mz_span(&self) -> Option<(f64, f64)> {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for seed in &self.seeds {
            lo = lo.min(seed.mz);
            hi = hi.max(seed.mz);
        }
        (lo <= hi).then_some((lo, hi))
    }
}

/// The ordered result of deconvolving one spectrum.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeconvolvedSpectrum {
    /// The native id of the source spectrum
    pub source_id: String,
    pub scan_number: i32,
    pub ms_level: u8,
    /// Peak groups sorted by monoisotopic mass
    pub peak_groups: Vec<PeakGroup>,
}

impl DeconvolvedSpectrum {
    pub fn len(&self) -> usize {
        self.peak_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peak_groups.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PeakGroup> {
        self.peak_groups.iter()
    }

    pub fn sort_by_mass(&mut self) {
        self.peak_groups
            .sort_by(|a, b| a.monoisotopic_mass.total_cmp(&b.monoisotopic_mass));
    }

    /// Split into (targets, dummies).
    pub fn partition_by_decoy(&self) -> (Vec<&PeakGroup>, Vec<&PeakGroup>) {
        self.peak_groups
            .iter()
            .partition(|g| g.target_decoy_type == TargetDecoyType::Target)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_group_accessors() {
        let group = PeakGroup {
            monoisotopic_mass: 12000.0,
            charge_range: (8, 10),
            per_charge_intensity: vec![10.0, 50.0, 20.0],
            per_isotope_intensity: vec![5.0, 30.0, 25.0, 20.0],
            seeds: vec![
                FeatureSeed {
                    mz: 1501.0,
                    intensity: 40.0,
                    charge: 8,
                    ..Default::default()
                },
                FeatureSeed {
                    mz: 1334.0,
                    intensity: 40.0,
                    charge: 9,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(group.most_abundant_charge(), Some(9));
        assert_eq!(group.intensity(), 80.0);
        assert_eq!(group.mz_span(), Some((1334.0, 1501.0)));
        assert_eq!(PeakGroup::default().mz_span(), None);
    }

    #[test]
    fn test_sort_and_partition() {
        let mut dspec = DeconvolvedSpectrum::default();
        for (mass, kind) in [
            (5000.0, TargetDecoyType::Target),
            (3000.0, TargetDecoyType::ChargeDummy),
            (4000.0, TargetDecoyType::Target),
        ] {
            dspec.peak_groups.push(PeakGroup {
                monoisotopic_mass: mass,
                target_decoy_type: kind,
                ..Default::default()
            });
        }
        dspec.sort_by_mass();
        assert_eq!(dspec.peak_groups[0].monoisotopic_mass, 3000.0);
        let (targets, dummies) = dspec.partition_by_decoy();
        assert_eq!(targets.len(), 2);
        assert_eq!(dummies.len(), 1);
    }
}
