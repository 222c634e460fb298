//! Reporter-channel libraries for the supported isobaric labeling kits,
//! with their default isotope-impurity data.
use std::fmt::Display;

use crate::error::CoreError;

/// The spacing between adjacent reporter isotopologues (one 13C).
pub const REPORTER_ISOTOPE_SPACING: f64 = 1.003355;

/// Matching tolerance when wiring up neighbour channels.
const NEIGHBOUR_TOLERANCE: f64 = 0.004;

/// The supported isobaric labeling kits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsobaricLabelingMethod {
    Itraq4plex,
    Tmt6plex,
    Itraq8plex,
    Tmt10plex,
    Tmt11plex,
    Tmt16plex,
    Tmt18plex,
}

impl Display for IsobaricLabelingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl IsobaricLabelingMethod {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Itraq4plex => "itraq4plex",
            Self::Tmt6plex => "tmt6plex",
            Self::Itraq8plex => "itraq8plex",
            Self::Tmt10plex => "tmt10plex",
            Self::Tmt11plex => "tmt11plex",
            Self::Tmt16plex => "tmt16plex",
            Self::Tmt18plex => "tmt18plex",
        }
    }

    pub const fn channel_count(&self) -> usize {
        match self {
            Self::Itraq4plex => 4,
            Self::Tmt6plex => 6,
            Self::Itraq8plex => 8,
            Self::Tmt10plex => 10,
            Self::Tmt11plex => 11,
            Self::Tmt16plex => 16,
            Self::Tmt18plex => 18,
        }
    }

    /// Whether the kit separates channels by C/N isotope placement, which
    /// puts sibling channels ~6 mTh apart.
    pub const fn has_cn_siblings(&self) -> bool {
        matches!(
            self,
            Self::Tmt10plex | Self::Tmt11plex | Self::Tmt16plex | Self::Tmt18plex
        )
    }
}

/// One reporter channel of a labeling kit.
#[derive(Debug, Clone, PartialEq)]
pub struct IsobaricChannelInfo {
    /// The kit's name for the channel, e.g. "114" or "127N"
    pub name: String,
    /// The zero-based channel id, used as the consensus map column key
    pub id: usize,
    /// The reporter ion's m/z
    pub center: f64,
    pub description: String,
    pub active: bool,
    /// Channel ids receiving this channel's −2/−1/+1/+2 impurities, where
    /// such a channel exists in the kit
    pub neighbours: [Option<usize>; 4],
}

const ITRAQ4_CHANNELS: [(&str, f64); 4] = [
    ("114", 114.1112),
    ("115", 115.1082),
    ("116", 116.1116),
    ("117", 117.1149),
];

const ITRAQ8_CHANNELS: [(&str, f64); 8] = [
    ("113", 113.1078),
    ("114", 114.1112),
    ("115", 115.1082),
    ("116", 116.1116),
    ("117", 117.1149),
    ("118", 118.1120),
    ("119", 119.1147),
    ("121", 121.1220),
];

const TMT6_CHANNELS: [(&str, f64); 6] = [
    ("126", 126.127725),
    ("127", 127.124760),
    ("128", 128.134433),
    ("129", 129.131468),
    ("130", 130.141141),
    ("131", 131.138176),
];

const TMT11_CHANNELS: [(&str, f64); 11] = [
    ("126", 126.127726),
    ("127N", 127.124761),
    ("127C", 127.131081),
    ("128N", 128.128116),
    ("128C", 128.134436),
    ("129N", 129.131471),
    ("129C", 129.137790),
    ("130N", 130.134825),
    ("130C", 130.141145),
    ("131", 131.138180),
    ("131C", 131.144500),
];

const TMT18_CHANNELS: [(&str, f64); 18] = [
    ("126", 126.127726),
    ("127N", 127.124761),
    ("127C", 127.131081),
    ("128N", 128.128116),
    ("128C", 128.134436),
    ("129N", 129.131471),
    ("129C", 129.137790),
    ("130N", 130.134825),
    ("130C", 130.141145),
    ("131N", 131.138180),
    ("131C", 131.144500),
    ("132N", 132.141535),
    ("132C", 132.147855),
    ("133N", 133.144890),
    ("133C", 133.151210),
    ("134N", 134.148245),
    ("134C", 134.154565),
    ("135N", 135.151600),
];

// −2 / −1 / +1 / +2 impurity percentages from the product data sheets.
const ITRAQ4_IMPURITIES: [[f64; 4]; 4] = [
    [0.0, 1.0, 5.9, 0.2],
    [0.0, 2.0, 5.6, 0.1],
    [0.0, 3.0, 4.5, 0.1],
    [0.1, 4.0, 3.5, 0.1],
];

const ITRAQ8_IMPURITIES: [[f64; 4]; 8] = [
    [0.00, 0.00, 6.89, 0.22],
    [0.00, 0.94, 5.90, 0.16],
    [0.00, 1.88, 4.90, 0.10],
    [0.00, 2.82, 3.90, 0.07],
    [0.06, 3.77, 2.99, 0.00],
    [0.09, 4.71, 1.88, 0.00],
    [0.14, 5.66, 0.87, 0.00],
    [0.27, 7.44, 0.18, 0.00],
];

fn channel_table(method: IsobaricLabelingMethod) -> Vec<(&'static str, f64)> {
    match method {
        IsobaricLabelingMethod::Itraq4plex => ITRAQ4_CHANNELS.to_vec(),
        IsobaricLabelingMethod::Itraq8plex => ITRAQ8_CHANNELS.to_vec(),
        IsobaricLabelingMethod::Tmt6plex => TMT6_CHANNELS.to_vec(),
        IsobaricLabelingMethod::Tmt10plex => TMT11_CHANNELS[..10].to_vec(),
        IsobaricLabelingMethod::Tmt11plex => TMT11_CHANNELS.to_vec(),
        IsobaricLabelingMethod::Tmt16plex => TMT18_CHANNELS[..16].to_vec(),
        IsobaricLabelingMethod::Tmt18plex => TMT18_CHANNELS.to_vec(),
    }
}

/// A labeling kit instance: its channels and its impurity percentages,
/// which default to the data-sheet values and may be replaced from a
/// string-list specification.
#[derive(Debug, Clone, PartialEq)]
pub struct IsobaricQuantitationMethod {
    pub method: IsobaricLabelingMethod,
    channels: Vec<IsobaricChannelInfo>,
    /// Per-channel −2/−1/+1/+2 leakage percentages
    impurities: Vec<[f64; 4]>,
}

impl IsobaricQuantitationMethod {
    pub fn new(method: IsobaricLabelingMethod) -> Self {
        let table = channel_table(method);
        let mut channels: Vec<IsobaricChannelInfo> = table
            .iter()
            .enumerate()
            .map(|(id, (name, center))| IsobaricChannelInfo {
                name: name.to_string(),
                id,
                center: *center,
                description: String::new(),
                active: true,
                neighbours: [None; 4],
            })
            .collect();

        // For kits with C/N sibling channels, a neighbour sits whole
        // reporter-isotope spacings away and the ~6 mTh sibling is NOT a
        // neighbour, so matching is done on exact mass. The simpler kits
        // space their channels by mixed isotope substitutions and are wired
        // up by nominal mass instead.
        for j in 0..channels.len() {
            let center = channels[j].center;
            for (slot, steps) in [(0usize, -2.0f64), (1, -1.0), (2, 1.0), (3, 2.0)] {
                let hit = if method.has_cn_siblings() {
                    let target = center + steps * REPORTER_ISOTOPE_SPACING;
                    channels
                        .iter()
                        .filter(|c| c.id != j)
                        .find(|c| (c.center - target).abs() < NEIGHBOUR_TOLERANCE)
                        .map(|c| c.id)
                } else {
                    let target = center.round() + steps;
                    channels
                        .iter()
                        .filter(|c| c.id != j)
                        .find(|c| c.center.round() == target)
                        .map(|c| c.id)
                };
                channels[j].neighbours[slot] = hit;
            }
        }

        let impurities = match method {
            IsobaricLabelingMethod::Itraq4plex => ITRAQ4_IMPURITIES.to_vec(),
            IsobaricLabelingMethod::Itraq8plex => ITRAQ8_IMPURITIES.to_vec(),
            other => vec![[0.0; 4]; other.channel_count()],
        };

        Self {
            method,
            channels,
            impurities,
        }
    }

    pub fn channels(&self) -> &[IsobaricChannelInfo] {
        &self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn impurities(&self) -> &[[f64; 4]] {
        &self.impurities
    }

    pub fn channel_by_name(&self, name: &str) -> Option<&IsobaricChannelInfo> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Render the impurity data in the `name:v-2/v-1/v+1/v+2` string-list
    /// form.
    pub fn isotope_matrix_as_string_list(&self) -> Vec<String> {
        self.channels
            .iter()
            .zip(self.impurities.iter())
            .map(|(channel, row)| {
                format!(
                    "{}:{}/{}/{}/{}",
                    channel.name, row[0], row[1], row[2], row[3]
                )
            })
            .collect()
    }

    /// Replace impurity rows from `name:v-2/v-1/v+1/v+2` entries. Unnamed
    /// channels keep their current row; an unknown channel name or a
    /// malformed row is an invalid-parameter error.
    pub fn update_isotope_matrix_from_string_list(
        &mut self,
        entries: &[String],
    ) -> Result<(), CoreError> {
        for entry in entries {
            let (name, values) = entry.split_once(':').ok_or_else(|| {
                CoreError::InvalidParameter(format!(
                    "invalid isotope correction entry '{}': expected name:v/v/v/v",
                    entry
                ))
            })?;
            let index = self
                .channel_by_name(name.trim())
                .map(|c| c.id)
                .ok_or_else(|| {
                    CoreError::InvalidParameter(format!(
                        "unknown channel name '{}' for method {}",
                        name.trim(),
                        self.method
                    ))
                })?;
            let parts: Vec<&str> = values.split('/').collect();
            if parts.len() != 4 {
                return Err(CoreError::InvalidParameter(format!(
                    "invalid isotope correction entry '{}': expected 4 values",
                    entry
                )));
            }
            let mut row = [0.0; 4];
            for (slot, part) in parts.iter().enumerate() {
                row[slot] = part.trim().parse().map_err(|_| {
                    CoreError::InvalidParameter(format!(
                        "invalid isotope correction value '{}' in '{}'",
                        part, entry
                    ))
                })?;
            }
            self.impurities[index] = row;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_channel_counts() {
        for method in [
            IsobaricLabelingMethod::Itraq4plex,
            IsobaricLabelingMethod::Tmt6plex,
            IsobaricLabelingMethod::Itraq8plex,
            IsobaricLabelingMethod::Tmt10plex,
            IsobaricLabelingMethod::Tmt11plex,
            IsobaricLabelingMethod::Tmt16plex,
            IsobaricLabelingMethod::Tmt18plex,
        ] {
            let quant = IsobaricQuantitationMethod::new(method);
            assert_eq!(quant.channel_count(), method.channel_count());
        }
    }

    #[test]
    fn test_itraq4_neighbours_are_sequential() {
        let quant = IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Itraq4plex);
        let c115 = &quant.channels()[1];
        assert_eq!(c115.neighbours, [None, Some(0), Some(2), Some(3)]);
        let c114 = &quant.channels()[0];
        assert_eq!(c114.neighbours[0], None);
        assert_eq!(c114.neighbours[1], None);
        assert_eq!(c114.neighbours[2], Some(1));
    }

    #[test]
    fn test_itraq8_gap_resolves_to_plus_two() {
        let quant = IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Itraq8plex);
        let c119 = quant.channel_by_name("119").unwrap();
        // 120 does not exist; 121 is two spacings up.
        assert_eq!(c119.neighbours[2], None);
        assert_eq!(c119.neighbours[3], Some(7));
    }

    #[test]
    fn test_tmt10_respects_cn_lines() {
        let quant = IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Tmt10plex);
        let c127n = quant.channel_by_name("127N").unwrap();
        let c128n = quant.channel_by_name("128N").unwrap();
        // 127N leaks into 128N (one 13C up), never into the 6 mTh sibling
        // 127C.
        assert_eq!(c127n.neighbours[2], Some(c128n.id));
        let c127c = quant.channel_by_name("127C").unwrap();
        assert_ne!(c127n.neighbours[2], Some(c127c.id));
        // And 126 feeds the C line.
        let c126 = quant.channel_by_name("126").unwrap();
        assert_eq!(c126.neighbours[2], Some(c127c.id));
    }

    #[test]
    fn test_string_list_round_trip() {
        let mut quant = IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Itraq4plex);
        let listed = quant.isotope_matrix_as_string_list();
        assert_eq!(listed[0], "114:0/1/5.9/0.2");

        quant
            .update_isotope_matrix_from_string_list(&["115:0.1/2.5/5.0/0.3".to_string()])
            .unwrap();
        assert_eq!(quant.impurities()[1], [0.1, 2.5, 5.0, 0.3]);
        // Untouched rows stay.
        assert_eq!(quant.impurities()[0], [0.0, 1.0, 5.9, 0.2]);
    }

    #[test]
    fn test_string_list_rejects_bad_input() {
        let mut quant = IsobaricQuantitationMethod::new(IsobaricLabelingMethod::Itraq4plex);
        assert!(matches!(
            quant.update_isotope_matrix_from_string_list(&["999:0/0/0/0".to_string()]),
            Err(CoreError::InvalidParameter(_))
        ));
        assert!(quant
            .update_isotope_matrix_from_string_list(&["114:1/2/3".to_string()])
            .is_err());
        assert!(quant
            .update_isotope_matrix_from_string_list(&["114:a/b/c/d".to_string()])
            .is_err());
        assert!(quant
            .update_isotope_matrix_from_string_list(&["nonsense".to_string()])
            .is_err());
    }
}
