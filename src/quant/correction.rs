//! Isotope-impurity correction of extracted reporter intensities.
//!
//! The observed channel intensities `b` relate to the true intensities `x`
//! by `A x = b`, where `A` is the kit-specific impurity matrix. The plain
//! inverse solution is used whenever it is already non-negative; otherwise
//! the non-negative least-squares solution is taken.
use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::error::CoreError;
use crate::feature::ConsensusMap;

use super::channels::IsobaricQuantitationMethod;
use super::nnls::nnls;

/// Statistics of one correction pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionStats {
    /// Features solved by the plain matrix inverse
    pub solved_by_inverse: usize,
    /// Features that needed the NNLS fallback
    pub solved_by_nnls: usize,
}

/// Build the impurity matrix of a method: rows are observed channels,
/// columns are true channels, the diagonal is what remains after all
/// leakage (including leakage outside the measured window).
pub fn impurity_matrix(method: &IsobaricQuantitationMethod) -> DMatrix<f64> {
    let n = method.channel_count();
    let mut a = DMatrix::zeros(n, n);
    for (channel, row) in method.channels().iter().zip(method.impurities().iter()) {
        let total_leakage: f64 = row.iter().sum::<f64>() / 100.0;
        a[(channel.id, channel.id)] = 1.0 - total_leakage;
        for (slot, fraction) in row.iter().enumerate() {
            if let Some(observed) = channel.neighbours[slot] {
                a[(observed, channel.id)] += fraction / 100.0;
            }
        }
    }
    a
}

/// Correct every feature of `map` in place. Handle intensities are replaced
/// by the corrected values; when `reference_channel` is set, intensities
/// are additionally divided by the feature's corrected reference intensity.
pub fn correct_channel_intensities(
    map: &mut ConsensusMap,
    method: &IsobaricQuantitationMethod,
    reference_channel: Option<usize>,
) -> Result<CorrectionStats, CoreError> {
    let n = method.channel_count();
    if let Some(reference) = reference_channel {
        if reference >= n {
            return Err(CoreError::InvalidParameter(format!(
                "reference channel {} does not exist in {}",
                reference, method.method
            )));
        }
    }
    let a = impurity_matrix(method);
    let inverse = a.clone().try_inverse();
    let mut stats = CorrectionStats::default();

    for feature in map.features.iter_mut() {
        let mut b = DVector::zeros(n);
        for handle in feature.handles.iter() {
            if (handle.map_index as usize) < n {
                b[handle.map_index as usize] = handle.intensity as f64;
            }
        }

        let corrected = match inverse.as_ref().map(|inv| inv * &b) {
            Some(direct) if direct.min() >= 0.0 => {
                stats.solved_by_inverse += 1;
                direct
            }
            _ => {
                stats.solved_by_nnls += 1;
                nnls(&a, &b)?
            }
        };

        let reference_intensity = reference_channel.map(|r| corrected[r]);
        for handle in feature.handles.iter_mut() {
            let index = handle.map_index as usize;
            if index >= n {
                continue;
            }
            let mut value = corrected[index];
            if let Some(reference) = reference_intensity {
                if reference > 0.0 {
                    value /= reference;
                } else {
                    debug!(
                        "reference channel intensity is zero for a feature; leaving it unnormalised"
                    );
                }
            }
            handle.intensity = value as f32;
        }
        feature.compute_consensus();
    }
    Ok(stats)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::{ConsensusFeature, FeatureHandle};
    use crate::quant::channels::IsobaricLabelingMethod;

    fn map_with_intensities(intensities: &[f32]) -> ConsensusMap {
        let mut map = ConsensusMap::new();
        let mut feature = ConsensusFeature::new(10.0, 500.0);
        for (id, intensity) in intensities.iter().enumerate() {
            map.column_headers.insert(
                id as u64,
                crate::feature::ColumnHeader {
                    filename: "run.mzML".into(),
                    label: format!("channel {}", id),
                    size: 0,
                    unique_id: id as u64 + 1,
                },
            );
            feature.insert(FeatureHandle {
                map_index: id as u64,
                unique_id: 0,
                rt: 10.0,
                mz: 500.0,
                intensity: *intensity,
                charge: 2,
            });
        }
        map.push(feature);
        map
    }

    #[test]
    fn test_impurity_matrix_columns_account_for_all_signal() {
        let method = IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Itraq4plex);
        let a = impurity_matrix(&method);
        // Column sums stay at or below one: leakage beyond the measured
        // channels leaves the system.
        for j in 0..4 {
            let column_sum: f64 = (0..4).map(|i| a[(i, j)]).sum();
            assert!(column_sum <= 1.0 + 1e-12);
            assert!(a[(j, j)] > 0.85);
        }
        // 114's +1 impurity lands on 115.
        assert!((a[(1, 0)] - 0.059).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_input_corrects_non_negative() {
        let method = IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Itraq4plex);
        let mut map = map_with_intensities(&[100.0, 100.0, 100.0, 100.0]);
        let a = impurity_matrix(&method);
        let b = DVector::from_vec(vec![100.0, 100.0, 100.0, 100.0]);

        correct_channel_intensities(&mut map, &method, None).unwrap();
        let feature = &map.features[0];
        let x = DVector::from_vec(
            (0..4)
                .map(|i| feature.intensity_for(i as u64) as f64)
                .collect::<Vec<f64>>(),
        );
        assert!(x.min() >= 0.0);
        // The corrected values reproduce the observations through A.
        assert!((&a * &x - &b).norm() < 1e-3);
    }

    #[test]
    fn test_nnls_fallback_not_worse_than_inverse() {
        let method = IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Itraq4plex);
        let a = impurity_matrix(&method);
        // A vector engineered to drive the plain inverse negative: all the
        // signal in one channel, nothing where its impurities must land.
        let b = DVector::from_vec(vec![0.0, 1000.0, 0.0, 0.0]);
        let inverse = a.clone().try_inverse().unwrap();
        let direct = &inverse * &b;

        let mut map = map_with_intensities(&[0.0, 1000.0, 0.0, 0.0]);
        correct_channel_intensities(&mut map, &method, None).unwrap();
        let feature = &map.features[0];
        let x = DVector::from_vec(
            (0..4)
                .map(|i| feature.intensity_for(i as u64) as f64)
                .collect::<Vec<f64>>(),
        );
        assert!(x.min() >= 0.0);
        if direct.min() < 0.0 {
            let clamped = direct.map(|v| v.max(0.0));
            assert!((&a * &x - &b).norm() <= (&a * &clamped - &b).norm() + 1e-6);
        }
    }

    #[test]
    fn test_reference_normalisation() {
        let method = IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Tmt6plex);
        let mut map = map_with_intensities(&[100.0, 200.0, 300.0, 400.0, 500.0, 600.0]);
        correct_channel_intensities(&mut map, &method, Some(0)).unwrap();
        let feature = &map.features[0];
        // TMT6 defaults to a clean matrix, so normalised values are plain
        // ratios.
        assert!((feature.intensity_for(0) - 1.0).abs() < 1e-6);
        assert!((feature.intensity_for(3) - 4.0).abs() < 1e-6);

        assert!(matches!(
            correct_channel_intensities(&mut map, &method, Some(99)),
            Err(CoreError::InvalidParameter(_))
        ));
    }
}
