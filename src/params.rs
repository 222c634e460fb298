//! Controlled-vocabulary and user parameters attached to spectra, runs and
//! data arrays.
//!
//! Directly maps to the usage of the PSI-MS controlled vocabulary in mzML.
use std::borrow::Cow;
use std::fmt::Display;
use std::num;
use std::str::{self, FromStr};

use thiserror::Error;

/// A compact controlled-vocabulary reference: namespace + numeric accession.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CURIE {
    pub controlled_vocabulary: ControlledVocabulary,
    pub accession: u32,
}

impl CURIE {
    pub const fn new(cv_id: ControlledVocabulary, accession: u32) -> Self {
        Self {
            controlled_vocabulary: cv_id,
            accession,
        }
    }
}

impl Display for CURIE {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{:07}",
            self.controlled_vocabulary.prefix(),
            self.accession
        )
    }
}

impl PartialEq<Param> for CURIE {
    fn eq(&self, other: &Param) -> bool {
        other.controlled_vocabulary == Some(self.controlled_vocabulary)
            && other.accession == Some(self.accession)
    }
}

#[macro_export]
macro_rules! curie {
    (MS:$acc:literal) => {
        $crate::params::CURIE::new($crate::params::ControlledVocabulary::MS, $acc)
    };
    (UO:$acc:literal) => {
        $crate::params::CURIE::new($crate::params::ControlledVocabulary::UO, $acc)
    };
}

#[derive(Debug, Error)]
pub enum CURIEParsingError {
    #[error("{0} is not a recognized controlled vocabulary")]
    UnknownControlledVocabulary(String),
    #[error("Failed to parse accession number {0}")]
    AccessionParsingError(
        #[from]
        #[source]
        num::ParseIntError,
    ),
    #[error("Did not detect a namespace separator ':' token")]
    MissingNamespaceSeparator,
}

impl FromStr for CURIE {
    type Err = CURIEParsingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split(':');
        let cv = tokens.next().unwrap();
        let accession = tokens
            .next()
            .ok_or(CURIEParsingError::MissingNamespaceSeparator)?;
        let cv: ControlledVocabulary = cv
            .parse()
            .map_err(|_| CURIEParsingError::UnknownControlledVocabulary(cv.to_string()))?;
        Ok(CURIE::new(cv, accession.parse()?))
    }
}

/// A statically allocate-able borrowed counterpart of [`Param`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamCow<'a> {
    pub name: Cow<'a, str>,
    pub value: Cow<'a, str>,
    pub accession: Option<u32>,
    pub controlled_vocabulary: Option<ControlledVocabulary>,
    pub unit: Unit,
}

impl ParamCow<'static> {
    pub const fn const_new(
        name: &'static str,
        value: &'static str,
        accession: Option<u32>,
        controlled_vocabulary: Option<ControlledVocabulary>,
        unit: Unit,
    ) -> Self {
        Self {
            name: Cow::Borrowed(name),
            value: Cow::Borrowed(value),
            accession,
            controlled_vocabulary,
            unit,
        }
    }
}

impl<'a> ParamCow<'a> {
    pub fn is_controlled(&self) -> bool {
        self.accession.is_some()
    }

    pub fn parse<T: str::FromStr>(&self) -> Result<T, T::Err> {
        self.value.parse::<T>()
    }
}

impl<'a> From<ParamCow<'a>> for Param {
    fn from(value: ParamCow<'a>) -> Self {
        Param {
            name: value.name.into_owned(),
            value: value.value.into_owned(),
            accession: value.accession,
            controlled_vocabulary: value.controlled_vocabulary,
            unit: value.unit,
        }
    }
}

/// A controlled vocabulary or user parameter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub value: String,
    pub accession: Option<u32>,
    pub controlled_vocabulary: Option<ControlledVocabulary>,
    pub unit: Unit,
}

impl Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut body = if let Some(curie) = self.curie() {
            format!("{}|{}={}", curie, self.name, self.value)
        } else {
            format!("{}={}", self.name, self.value)
        };
        if self.unit != Unit::Unknown {
            body.extend(format!(" {}", self.unit).chars());
        }
        f.write_str(body.as_str())
    }
}

impl Param {
    pub fn new() -> Param {
        Param {
            ..Default::default()
        }
    }

    pub fn new_key_value<K: Into<String>, V: ToString>(name: K, value: V) -> Param {
        let mut inst = Self::new();
        inst.name = name.into();
        inst.value = value.to_string();
        inst
    }

    pub fn parse<T: str::FromStr>(&self) -> Result<T, T::Err> {
        self.value.parse::<T>()
    }

    pub fn is_controlled(&self) -> bool {
        self.accession.is_some()
    }

    pub fn curie(&self) -> Option<CURIE> {
        match (self.controlled_vocabulary, self.accession) {
            (Some(cv), Some(acc)) => Some(CURIE::new(cv, acc)),
            _ => None,
        }
    }

    pub fn with_unit(mut self, unit: Unit) -> Param {
        self.unit = unit;
        self
    }
}

/// Controlled vocabularies used in mass spectrometry data files
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ControlledVocabulary {
    MS,
    UO,
}

impl ControlledVocabulary {
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::MS => "MS",
            Self::UO => "UO",
        }
    }

    pub const fn as_bytes(&self) -> &'static [u8] {
        self.prefix().as_bytes()
    }

    /// Build an identity param (no value) for a known term.
    pub fn param<S: Into<String>>(&self, accession: u32, name: S) -> Param {
        Param {
            name: name.into(),
            accession: Some(accession),
            controlled_vocabulary: Some(*self),
            ..Default::default()
        }
    }

    pub fn param_val<S: Into<String>, V: ToString>(
        &self,
        accession: u32,
        name: S,
        value: V,
    ) -> Param {
        let mut param = self.param(accession, name);
        param.value = value.to_string();
        param
    }

    pub const fn const_param(
        &self,
        name: &'static str,
        value: &'static str,
        accession: u32,
        unit: Unit,
    ) -> ParamCow<'static> {
        ParamCow {
            name: Cow::Borrowed(name),
            value: Cow::Borrowed(value),
            accession: Some(accession),
            controlled_vocabulary: Some(*self),
            unit,
        }
    }

    pub const fn const_param_ident(&self, name: &'static str, accession: u32) -> ParamCow<'static> {
        self.const_param(name, "", accession, Unit::Unknown)
    }

    pub const fn const_param_ident_unit(
        &self,
        name: &'static str,
        accession: u32,
        unit: Unit,
    ) -> ParamCow<'static> {
        self.const_param(name, "", accession, unit)
    }
}

#[doc(hidden)]
#[derive(Debug, Clone, Error)]
#[error("Unrecognized controlled vocabulary {0}")]
pub struct ControlledVocabularyResolutionError(String);

impl FromStr for ControlledVocabulary {
    type Err = ControlledVocabularyResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MS" | "PSI-MS" => Ok(Self::MS),
            "UO" => Ok(Self::UO),
            _ => Err(ControlledVocabularyResolutionError(s.to_string())),
        }
    }
}

pub type ParamList = Vec<Param>;

/// Access to the bag of [`Param`]s attached to a described entity.
pub trait ParamDescribed {
    fn params(&self) -> &[Param];
    fn params_mut(&mut self) -> &mut ParamList;

    fn add_param(&mut self, param: Param) {
        self.params_mut().push(param);
    }

    fn remove_param(&mut self, index: usize) -> Param {
        self.params_mut().remove(index)
    }

    fn get_param_by_name(&self, name: &str) -> Option<&Param> {
        self.params().iter().find(|&param| param.name == name)
    }

    fn get_param_by_curie(&self, curie: &CURIE) -> Option<&Param> {
        self.params().iter().find(|&param| curie == param)
    }

    fn has_param(&self, name: &str) -> bool {
        self.get_param_by_name(name).is_some()
    }
}

#[macro_export]
macro_rules! impl_param_described {
    ($($t:ty), +) => {$(
        impl $crate::params::ParamDescribed for $t {
            fn params(&self) -> &[$crate::params::Param] {
                &self.params
            }

            fn params_mut(&mut self) -> &mut $crate::params::ParamList {
                &mut self.params
            }
        }
    )+};
}

/// Units that a param's value might carry
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {
    MZ,
    Mass,
    PartsPerMillion,

    Minute,
    Second,
    Millisecond,

    DetectorCounts,
    PercentBasePeak,
    CountsPerSecond,

    Electronvolt,
    Volt,

    #[default]
    Unknown,
}

impl Unit {
    pub const fn for_param(&self) -> (&'static str, &'static str) {
        match self {
            Self::Millisecond => ("UO:0000028", "millisecond"),
            Self::Second => ("UO:0000010", "second"),
            Self::Minute => ("UO:0000031", "minute"),

            Self::MZ => ("MS:1000040", "m/z"),
            Self::Mass => ("UO:0000221", "dalton"),
            Self::PartsPerMillion => ("UO:0000169", "parts per million"),

            Self::DetectorCounts => ("MS:1000131", "number of detector counts"),
            Self::PercentBasePeak => ("MS:1000132", "percent of base peak"),
            Self::CountsPerSecond => ("MS:1000814", "counts per second"),

            Self::Electronvolt => ("UO:0000266", "electronvolt"),
            Self::Volt => ("UO:0000218", "volt"),

            _ => ("", ""),
        }
    }

    pub fn from_name(name: &str) -> Unit {
        match name {
            "millisecond" => Self::Millisecond,
            "second" => Self::Second,
            "minute" => Self::Minute,

            "m/z" => Self::MZ,
            "dalton" => Self::Mass,
            "parts per million" => Self::PartsPerMillion,

            "number of detector counts" => Self::DetectorCounts,
            "percent of base peak" => Self::PercentBasePeak,
            "counts per second" => Self::CountsPerSecond,

            "electronvolt" => Self::Electronvolt,
            "volt" => Self::Volt,
            _ => Unit::Unknown,
        }
    }

    pub fn from_accession(acc: &str) -> Unit {
        match acc {
            "UO:0000028" => Self::Millisecond,
            "UO:0000010" => Self::Second,
            "UO:0000031" => Self::Minute,

            "MS:1000040" => Self::MZ,
            "UO:0000221" => Self::Mass,
            "UO:0000169" => Self::PartsPerMillion,

            "MS:1000131" => Self::DetectorCounts,
            "MS:1000132" => Self::PercentBasePeak,
            "MS:1000814" => Self::CountsPerSecond,

            "UO:0000266" => Self::Electronvolt,
            "UO:0000218" => Self::Volt,
            _ => Unit::Unknown,
        }
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(format!("{:?}", self).as_str())
    }
}
