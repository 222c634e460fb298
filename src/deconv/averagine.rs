//! Coarse theoretical isotope envelopes from the averagine model.
//!
//! Envelopes are precomputed once on a mass grid and looked up by nearest
//! grid point; deconvolution only needs the envelope shape, not exact fine
//! structure, so a Poisson factorization over +1 Da and +2 Da heavy
//! isotopes is sufficient.

/// The average residue mass of the averagine pseudo-amino-acid.
const AVERAGINE_RESIDUE_MASS: f64 = 111.1254;

/// Atoms per averagine residue.
const ATOMS_PER_RESIDUE: [(f64, f64, f64); 5] = [
    // (count, +1 Da heavy abundance, +2 Da heavy abundance)
    (4.9384, 0.0107, 0.0),      // C: 13C
    (7.7583, 0.000115, 0.0),    // H: 2H
    (1.3577, 0.00364, 0.0),     // N: 15N
    (1.4773, 0.00038, 0.00205), // O: 17O, 18O
    (0.0417, 0.0075, 0.0442),   // S: 33S, 34S
];

/// The relative abundance below which the envelope tail is trimmed.
const TAIL_CUTOFF: f64 = 1e-3;

const MAX_ISOTOPES: usize = 64;

/// One theoretical envelope: relative intensities per isotope index,
/// normalized so the most abundant isotopologue is 1.
#[derive(Debug, Clone, PartialEq)]
pub struct IsotopeEnvelope {
    pub intensities: Vec<f32>,
    /// Index of the most abundant isotopologue
    pub apex: usize,
}

impl IsotopeEnvelope {
    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }
}

fn poisson_pmf(lambda: f64, max_k: usize) -> Vec<f64> {
    let mut pmf = Vec::with_capacity(max_k + 1);
    let mut term = (-lambda).exp();
    for k in 0..=max_k {
        pmf.push(term);
        term *= lambda / (k + 1) as f64;
    }
    pmf
}

fn envelope_for_mass(mass: f64) -> IsotopeEnvelope {
    let residues = mass / AVERAGINE_RESIDUE_MASS;
    let mut lambda1 = 0.0;
    let mut lambda2 = 0.0;
    for (count, p1, p2) in ATOMS_PER_RESIDUE {
        lambda1 += residues * count * p1;
        lambda2 += residues * count * p2;
    }

    let max_k = ((lambda1 + 2.0 * lambda2) + 6.0 * (lambda1 + lambda2).sqrt())
        .ceil()
        .max(4.0) as usize;
    let max_k = max_k.min(MAX_ISOTOPES);
    let ones = poisson_pmf(lambda1, max_k);
    let twos = poisson_pmf(lambda2, max_k / 2);

    let mut raw = vec![0.0f64; max_k + 1];
    for (j, &p2) in twos.iter().enumerate() {
        for (k, &p1) in ones.iter().enumerate() {
            let index = k + 2 * j;
            if index > max_k {
                break;
            }
            raw[index] += p1 * p2;
        }
    }

    let apex_value = raw.iter().cloned().fold(0.0f64, f64::max);
    let mut intensities: Vec<f32> = raw.iter().map(|v| (v / apex_value) as f32).collect();
    // Trim the insignificant tail, keeping everything up to the last
    // index above the cutoff.
    let last = intensities
        .iter()
        .rposition(|&v| v as f64 >= TAIL_CUTOFF)
        .unwrap_or(0);
    intensities.truncate(last + 1);
    let apex = intensities
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    IsotopeEnvelope { intensities, apex }
}

/// Theoretical envelopes precomputed on a regular mass grid.
#[derive(Debug, Clone)]
pub struct PrecalculatedAveragine {
    grid_start: f64,
    grid_step: f64,
    envelopes: Vec<IsotopeEnvelope>,
}

impl PrecalculatedAveragine {
    /// Precompute envelopes for `[min_mass, max_mass]` every `step`
    /// daltons.
    pub fn new(min_mass: f64, max_mass: f64, step: f64) -> Self {
        let grid_start = min_mass.max(50.0);
        let grid_step = step.max(1.0);
        let count = (((max_mass - grid_start) / grid_step).ceil() as usize).max(1) + 1;
        let envelopes = (0..count)
            .map(|i| envelope_for_mass(grid_start + i as f64 * grid_step))
            .collect();
        Self {
            grid_start,
            grid_step,
            envelopes,
        }
    }

    /// The envelope at the grid point nearest `mass`.
    pub fn get(&self, mass: f64) -> &IsotopeEnvelope {
        let slot = ((mass - self.grid_start) / self.grid_step).round();
        let slot = (slot.max(0.0) as usize).min(self.envelopes.len() - 1);
        &self.envelopes[slot]
    }

    pub fn max_isotope_count(&self) -> usize {
        self.envelopes.iter().map(|e| e.len()).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_small_mass_is_mono_dominant() {
        let envelope = envelope_for_mass(800.0);
        assert_eq!(envelope.apex, 0);
        assert!(envelope.intensities[0] == 1.0);
        assert!(envelope.intensities[1] < 1.0);
        assert!(envelope.len() >= 3);
    }

    #[test]
    fn test_large_mass_apex_moves_up() {
        // Around 20 kDa the monoisotopic peak is far from the apex.
        let envelope = envelope_for_mass(20000.0);
        assert!(envelope.apex >= 5);
        assert!(envelope.len() > envelope.apex);
        // The envelope rises to the apex and decays after it.
        assert!(envelope.intensities[0] < envelope.intensities[envelope.apex]);
        let last = envelope.len() - 1;
        assert!(envelope.intensities[last] < envelope.intensities[envelope.apex]);
    }

    #[test]
    fn test_grid_lookup() {
        let averagine = PrecalculatedAveragine::new(100.0, 5000.0, 25.0);
        let a = averagine.get(1000.0);
        let b = averagine.get(1010.0);
        let c = averagine.get(3000.0);
        assert_eq!(a, b);
        assert_ne!(a.len(), c.len());
        // Out-of-range queries clamp to the grid edges.
        let low = averagine.get(-50.0);
        assert_eq!(low, averagine.get(100.0));
        let _high = averagine.get(1e9);
    }
}
