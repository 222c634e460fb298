//! Charge deconvolution of top-down spectra.
//!
//! The pipeline follows three stages: decharging via log-m/z binning and a
//! universal charge-offset pattern, isotope collection around each
//! candidate mass, and cosine scoring against averagine envelopes with
//! overlap resolution at the end.
use log::debug;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::error::CoreError;
use crate::spectrum::Spectrum;
use crate::utils::PROTON;

use super::averagine::PrecalculatedAveragine;
use super::peak_group::{DeconvolvedSpectrum, FeatureSeed, PeakGroup, TargetDecoyType};

/// Configuration of one deconvolution run. Per-level vectors are indexed
/// by `ms_level − 1` and fall back to their last entry for deeper levels.
#[derive(Debug, Clone)]
pub struct DeconvolutionConfig {
    /// Allowed absolute charge range, low to high
    pub charge_range: (i32, i32),
    /// Allowed monoisotopic mass range in Da
    pub mass_range: (f64, f64),
    /// Matching tolerance in ppm, per MS level
    pub tolerance_ppm: Vec<f64>,
    /// Minimum isotope-cosine score, per MS level
    pub min_isotope_cosine: Vec<f64>,
    /// Minimum signal-to-noise ratio, per MS level
    pub min_snr: Vec<f64>,
    /// Maximum q-value accepted by [`filter_by_qvalue`], per MS level
    pub max_qvalue: Vec<f64>,
    /// The isotopologue mass spacing in Da. Sensitive to the averagine
    /// definition, so it must be supplied explicitly.
    pub iso_da_distance: f64,
    /// When non-empty, only masses near these are reported
    pub target_masses: Vec<f64>,
    /// Masses to suppress
    pub exclusion_masses: Vec<f64>,
    pub target_decoy_type: TargetDecoyType,
    /// How many isotope-index shifts the cosine alignment may try
    pub allowed_isotope_error: i32,
    /// Minimum distinct charges that must support a mass bin
    pub min_charge_support: usize,
    /// Minimum matched isotopologue peaks per reported group
    pub min_seed_count: usize,
}

impl DeconvolutionConfig {
    /// Build a configuration. `iso_da_distance` has no default: the value
    /// depends on the averagine definition in use and is required.
    pub fn new(iso_da_distance: f64) -> Result<Self, CoreError> {
        if !(iso_da_distance.is_finite() && iso_da_distance > 0.0) {
            return Err(CoreError::InvalidParameter(format!(
                "iso_da_distance must be a positive finite value, got {}",
                iso_da_distance
            )));
        }
        Ok(Self {
            charge_range: (2, 100),
            mass_range: (50.0, 100_000.0),
            tolerance_ppm: vec![10.0, 10.0],
            min_isotope_cosine: vec![0.85, 0.85],
            min_snr: vec![1.0, 1.0],
            max_qvalue: vec![1.0, 1.0],
            iso_da_distance,
            target_masses: Vec::new(),
            exclusion_masses: Vec::new(),
            target_decoy_type: TargetDecoyType::Target,
            allowed_isotope_error: 1,
            min_charge_support: 2,
            min_seed_count: 3,
        })
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.charge_range.0 < 1 || self.charge_range.1 < self.charge_range.0 {
            return Err(CoreError::InvalidParameter(format!(
                "invalid charge range {:?}",
                self.charge_range
            )));
        }
        if self.mass_range.1 <= self.mass_range.0 || self.mass_range.0 <= 0.0 {
            return Err(CoreError::InvalidParameter(format!(
                "invalid mass range {:?}",
                self.mass_range
            )));
        }
        if self.tolerance_ppm.is_empty()
            || self.min_isotope_cosine.is_empty()
            || self.min_snr.is_empty()
            || self.max_qvalue.is_empty()
        {
            return Err(CoreError::InvalidParameter(
                "per-level thresholds must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn per_level(values: &[f64], ms_level: u8) -> f64 {
        let index = (ms_level.max(1) as usize - 1).min(values.len() - 1);
        values[index]
    }
}

/// A peak in log-m/z space.
#[derive(Debug, Clone, Copy)]
struct LogMzPeak {
    mz: f64,
    log_mz: f64,
    intensity: f32,
}

/// The deconvolution engine. Immutable once built; one instance can score
/// many spectra, in parallel when the `parallelism` feature is active.
#[derive(Debug)]
pub struct SpectralDeconvolution {
    config: DeconvolutionConfig,
    averagine: PrecalculatedAveragine,
}

impl SpectralDeconvolution {
    pub fn new(config: DeconvolutionConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let averagine = PrecalculatedAveragine::new(config.mass_range.0, config.mass_range.1, 25.0);
        Ok(Self { config, averagine })
    }

    pub fn config(&self) -> &DeconvolutionConfig {
        &self.config
    }

    pub fn averagine(&self) -> &PrecalculatedAveragine {
        &self.averagine
    }

    /// Deconvolve one centroided, position-sorted spectrum.
    pub fn deconvolve(&self, spectrum: &Spectrum, scan_number: i32) -> DeconvolvedSpectrum {
        let mut result = DeconvolvedSpectrum {
            source_id: spectrum.id().to_string(),
            scan_number,
            ms_level: spectrum.ms_level(),
            ..Default::default()
        };
        let tolerance = DeconvolutionConfig::per_level(
            &self.config.tolerance_ppm,
            spectrum.ms_level(),
        ) * 1e-6;
        let peaks: Vec<LogMzPeak> = spectrum
            .iter()
            .filter(|p| p.mz > PROTON + 1.0 && p.intensity > 0.0)
            .map(|p| LogMzPeak {
                mz: p.mz,
                log_mz: (p.mz - PROTON).ln(),
                intensity: p.intensity,
            })
            .collect();
        if peaks.len() < self.config.min_seed_count {
            return result;
        }

        let candidates = self.score_mass_bins(&peaks, tolerance);
        debug!(
            "spectrum {}: {} candidate masses after binning",
            spectrum.id(),
            candidates.len()
        );

        let min_cosine =
            DeconvolutionConfig::per_level(&self.config.min_isotope_cosine, spectrum.ms_level());
        let min_snr = DeconvolutionConfig::per_level(&self.config.min_snr, spectrum.ms_level());

        // Candidates one isotopologue off still refine to a nearby mass, so
        // the target/exclusion lists are re-checked on the refined value.
        let refined_tol_da = |mass: f64| {
            mass * tolerance * 2.0
                + self.config.allowed_isotope_error as f64 * self.config.iso_da_distance
                + 0.01
        };
        let build = |candidate: &f64| -> Option<PeakGroup> {
            self.build_peak_group(spectrum, *candidate, tolerance)
                .filter(|group| {
                    group.isotope_cosine as f64 >= min_cosine
                        && group.snr as f64 >= min_snr
                        && self.mass_list_allows(
                            group.monoisotopic_mass,
                            refined_tol_da(group.monoisotopic_mass),
                        )
                })
        };

        #[cfg(feature = "parallelism")]
        let mut groups: Vec<PeakGroup> = candidates.par_iter().filter_map(build).collect();
        #[cfg(not(feature = "parallelism"))]
        let mut groups: Vec<PeakGroup> = candidates.iter().filter_map(build).collect();

        for group in groups.iter_mut() {
            group.target_decoy_type = self.config.target_decoy_type;
        }
        result.peak_groups = groups;
        result.sort_by_mass();
        remove_overlapping_peak_groups(
            &mut result,
            self.config.iso_da_distance,
            (self.config.allowed_isotope_error * 2).max(2),
        );
        result
    }

    /// Accumulate the log-m/z bin vector, convolve it against the charge
    /// offset pattern, suppress harmonics, and return the surviving
    /// candidate masses.
    fn score_mass_bins(&self, peaks: &[LogMzPeak], tolerance: f64) -> Vec<f64> {
        let bin_multiplier = 1.0 / tolerance;
        let min_log = peaks
            .iter()
            .map(|p| p.log_mz)
            .fold(f64::INFINITY, f64::min);
        let max_log = peaks
            .iter()
            .map(|p| p.log_mz)
            .fold(f64::NEG_INFINITY, f64::max);
        let mz_bin_count = ((max_log - min_log) * bin_multiplier) as usize + 2;
        let mut mz_bins = vec![0.0f32; mz_bin_count];
        for peak in peaks {
            let bin = ((peak.log_mz - min_log) * bin_multiplier).round() as usize;
            mz_bins[bin.min(mz_bin_count - 1)] += peak.intensity;
        }

        let (z_min, z_max) = self.config.charge_range;
        // The universal pattern: at charge z a peak's log m/z sits exactly
        // ln(z) below the log of its neutral mass.
        let charge_offsets: Vec<isize> = (z_min..=z_max)
            .map(|z| ((z as f64).ln() * bin_multiplier).round() as isize)
            .collect();
        let harmonic_offsets: Vec<isize> = [2.0f64, 3.0]
            .iter()
            .map(|h| (h.ln() * bin_multiplier).round() as isize)
            .collect();

        let mass_min_log = self.config.mass_range.0.ln();
        let mass_max_log = self.config.mass_range.1.ln();
        let mass_bin_count = ((mass_max_log - mass_min_log) * bin_multiplier) as usize + 2;
        let base = ((min_log - mass_min_log) * bin_multiplier).round() as isize;

        let mut mass_bins = vec![0.0f32; mass_bin_count];
        let mut charge_support = vec![0u32; mass_bin_count];
        for (b, &intensity) in mz_bins.iter().enumerate() {
            if intensity <= 0.0 {
                continue;
            }
            for (slot, &offset) in charge_offsets.iter().enumerate() {
                // The peak bin and the charge offset round independently,
                // so one mass's contributions can land one bin apart per
                // charge; smearing over the direct neighbours keeps them
                // on a common bin. The duplicate candidates a plateau
                // produces collapse during overlap removal.
                for delta in -1isize..=1 {
                    let index = base + b as isize + offset + delta;
                    if index >= 0 && (index as usize) < mass_bin_count {
                        mass_bins[index as usize] += intensity;
                        // Charge ranges wider than 32 saturate the support
                        // mask; the distinct-charge count stays a lower
                        // bound.
                        charge_support[index as usize] |= 1 << (slot.min(31));
                    }
                }
            }
        }

        let mut candidates = Vec::new();
        for bin in 0..mass_bin_count {
            let score = mass_bins[bin];
            if score <= 0.0 {
                continue;
            }
            if (charge_support[bin].count_ones() as usize) < self.config.min_charge_support {
                continue;
            }
            // Local maximum over the immediate neighbourhood.
            let lo = bin.saturating_sub(1);
            let hi = (bin + 1).min(mass_bin_count - 1);
            if (lo..=hi).any(|other| mass_bins[other] > score) {
                continue;
            }
            // Harmonic suppression: when the h-fold smaller mass explains
            // the signal better, this bin is a charge harmonic of it.
            let is_harmonic = harmonic_offsets.iter().any(|&offset| {
                let below = bin as isize - offset;
                below >= 0 && mass_bins[below as usize] > score
            });
            if is_harmonic {
                continue;
            }
            let mass = (mass_min_log + bin as f64 / bin_multiplier).exp();
            if mass < self.config.mass_range.0 || mass > self.config.mass_range.1 {
                continue;
            }
            if !self.mass_list_allows(mass, mass * tolerance * 4.0) {
                continue;
            }
            candidates.push(mass);
        }
        candidates
    }

    fn mass_list_allows(&self, mass: f64, tol_da: f64) -> bool {
        if !self.config.target_masses.is_empty()
            && !self
                .config
                .target_masses
                .iter()
                .any(|t| (t - mass).abs() <= tol_da)
        {
            return false;
        }
        !self
            .config
            .exclusion_masses
            .iter()
            .any(|t| (t - mass).abs() <= tol_da)
    }

    /// The m/z at which isotopologue `iso` of `mass` appears at charge `z`,
    /// distorted for dummy replays.
    fn expected_mz(&self, mass: f64, iso: i32, z: i32) -> f64 {
        let iso_da = self.config.iso_da_distance;
        match self.config.target_decoy_type {
            TargetDecoyType::ChargeDummy => {
                (mass + iso as f64 * iso_da) / (z as f64 + 0.5) + PROTON
            }
            TargetDecoyType::NoiseDummy => {
                (mass + (iso as f64 + 0.55) * iso_da) / z as f64 + PROTON
            }
            _ => (mass + iso as f64 * iso_da) / z as f64 + PROTON,
        }
    }

    /// Gather isotopologues for one candidate mass across its allowed
    /// charges and score the envelope.
    fn build_peak_group(
        &self,
        spectrum: &Spectrum,
        mass: f64,
        tolerance: f64,
    ) -> Option<PeakGroup> {
        let envelope = self.averagine.get(mass);
        let iso_count = envelope.len() as i32;
        let shift = self.config.allowed_isotope_error;
        let (z_min, z_max) = self.config.charge_range;
        let iso_da = self.config.iso_da_distance;

        let mut per_isotope = vec![0.0f32; (iso_count + 2 * shift) as usize];
        let mut per_charge = vec![0.0f32; (z_max - z_min + 1) as usize];
        let mut seeds: Vec<FeatureSeed> = Vec::new();

        for z in z_min..=z_max {
            // The candidate mass is only known to bin resolution, so the
            // window is a few bin widths wide, capped below half the
            // isotopologue spacing so neighbouring indices stay disjoint.
            let tol_mz = (mass * tolerance * 3.0 / z as f64).min(0.45 * iso_da / z as f64);
            for iso in -shift..(iso_count + shift) {
                let center = self.expected_mz(mass, iso, z);
                let window = spectrum.mz_range(center - tol_mz, center + tol_mz);
                let best = window
                    .iter()
                    .max_by(|a, b| a.intensity.total_cmp(&b.intensity));
                let Some(peak) = best else { continue };
                per_isotope[(iso + shift) as usize] += peak.intensity;
                per_charge[(z - z_min) as usize] += peak.intensity;
                seeds.push(FeatureSeed {
                    log_mz: (peak.mz - PROTON).ln(),
                    mz: peak.mz,
                    intensity: peak.intensity,
                    charge: z,
                    isotope_index: iso,
                    trace_bounds: (0, 0),
                });
            }
        }
        if seeds.len() < self.config.min_seed_count {
            return None;
        }

        let (offset, cosine) = best_isotope_alignment(
            &per_isotope,
            &envelope.intensities,
            shift,
            self.config.target_decoy_type == TargetDecoyType::IsotopeDummy,
        );

        // The isotopologues actually matched, after alignment, define the
        // monoisotopic mass as an intensity-weighted consensus.
        let mut weighted_mass = 0.0f64;
        let mut weight = 0.0f64;
        for seed in &seeds {
            let implied =
                (seed.mz - PROTON) * seed.charge as f64 - (seed.isotope_index - offset) as f64 * iso_da;
            weighted_mass += implied * seed.intensity as f64;
            weight += seed.intensity as f64;
        }
        if weight <= 0.0 {
            return None;
        }
        let monoisotopic_mass = weighted_mass / weight;

        let (span_lo, span_hi) = seeds
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                (lo.min(s.mz), hi.max(s.mz))
            });
        let matched: f64 = seeds.iter().map(|s| s.intensity as f64).sum();
        let ambient: f64 = spectrum
            .mz_range(span_lo, span_hi + 1e-9)
            .iter()
            .map(|p| p.intensity as f64)
            .sum();
        let noise = (ambient - matched).max(0.0);
        let snr = (matched / noise.max(1e-3)) as f32;

        let supported_charges: Vec<i32> = per_charge
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0.0)
            .map(|(slot, _)| z_min + slot as i32)
            .collect();
        let charge_range = (
            supported_charges.first().copied().unwrap_or(z_min),
            supported_charges.last().copied().unwrap_or(z_min),
        );

        Some(PeakGroup {
            monoisotopic_mass,
            charge_range,
            per_charge_intensity: per_charge,
            per_isotope_intensity: per_isotope,
            isotope_cosine: cosine,
            snr,
            rt: spectrum.start_time(),
            seeds,
            target_decoy_type: TargetDecoyType::Target,
        })
    }
}

/// Cosine similarity between the observed per-isotope intensities and a
/// theoretical envelope, over a window of integer alignment shifts.
/// Returns (offset, cosine); with `second_best` set, the runner-up
/// alignment is returned instead.
fn best_isotope_alignment(
    observed: &[f32],
    envelope: &[f32],
    shift: i32,
    second_best: bool,
) -> (i32, f32) {
    let mut scored: Vec<(i32, f32)> = (-shift..=shift)
        .map(|offset| (offset, shifted_cosine(observed, envelope, offset + shift)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    let pick = if second_best && scored.len() > 1 { 1 } else { 0 };
    scored[pick]
}

fn shifted_cosine(observed: &[f32], envelope: &[f32], start: i32) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_obs = 0.0f64;
    let mut norm_env = 0.0f64;
    for (k, &e) in envelope.iter().enumerate() {
        norm_env += (e as f64) * (e as f64);
        let index = start + k as i32;
        if index >= 0 && (index as usize) < observed.len() {
            dot += (e as f64) * observed[index as usize] as f64;
        }
    }
    for &o in observed {
        norm_obs += (o as f64) * (o as f64);
    }
    if norm_obs <= 0.0 || norm_env <= 0.0 {
        return 0.0;
    }
    (dot / (norm_obs.sqrt() * norm_env.sqrt())) as f32
}

/// Resolve masses that are integer-Dalton shifts of one another: within
/// each conflict the higher-scoring group survives. The spectrum must be
/// sorted by mass.
pub fn remove_overlapping_peak_groups(
    dspec: &mut DeconvolvedSpectrum,
    iso_da_distance: f64,
    max_shift: i32,
) {
    let n = dspec.peak_groups.len();
    if n < 2 {
        return;
    }
    let mut keep = vec![true; n];
    for i in 0..n {
        if !keep[i] {
            continue;
        }
        for j in (i + 1)..n {
            let delta =
                dspec.peak_groups[j].monoisotopic_mass - dspec.peak_groups[i].monoisotopic_mass;
            if delta > max_shift as f64 * iso_da_distance + 0.5 {
                break;
            }
            // shifts == 0 collapses duplicate reports of the same mass.
            let shifts = (delta / iso_da_distance).round();
            if shifts > max_shift as f64 {
                continue;
            }
            if (delta - shifts * iso_da_distance).abs() > 0.02 {
                continue;
            }
            if dspec.peak_groups[j].isotope_cosine > dspec.peak_groups[i].isotope_cosine {
                keep[i] = false;
            } else {
                keep[j] = false;
            }
        }
    }
    let mut slot = 0;
    dspec.peak_groups.retain(|_| {
        let k = keep[slot];
        slot += 1;
        k
    });
}

/// Assign q-values to `targets` from the dummy score distribution: the
/// fraction of dummies scoring at least as well, among everything scoring
/// at least as well.
pub fn compute_qvalues(targets: &[&PeakGroup], dummies: &[&PeakGroup]) -> Vec<f32> {
    let mut dummy_scores: Vec<f32> = dummies.iter().map(|g| g.isotope_cosine).collect();
    dummy_scores.sort_by(|a, b| a.total_cmp(b));
    let mut target_scores: Vec<f32> = targets.iter().map(|g| g.isotope_cosine).collect();
    target_scores.sort_by(|a, b| a.total_cmp(b));

    targets
        .iter()
        .map(|group| {
            let score = group.isotope_cosine;
            let dummies_above =
                dummy_scores.len() - dummy_scores.partition_point(|s| *s < score);
            let targets_above =
                target_scores.len() - target_scores.partition_point(|s| *s < score);
            if targets_above == 0 {
                return 1.0;
            }
            (dummies_above as f32 / targets_above as f32).min(1.0)
        })
        .collect()
}
