//! Array semantics, primitive types, compression states, and the numeric
//! codecs applied to binary data arrays.
use std::fmt::Display;
use std::io;

use bytemuck::Pod;
use thiserror::Error;

use crate::params::{ControlledVocabulary, Param, ParamCow, Unit};

pub type Bytes = Vec<u8>;

pub fn to_bytes<T: Pod>(data: &[T]) -> Bytes {
    bytemuck::cast_slice(data).to_vec()
}

pub fn as_bytes<T: Pod>(data: &[T]) -> &[u8] {
    bytemuck::cast_slice(data)
}

pub fn vec_as_bytes<T: Pod>(data: Vec<T>) -> Bytes {
    bytemuck::cast_vec(data)
}

/// The kinds of data arrays found in mass spectrometry data files governed
/// by the PSI-MS controlled vocabulary.
#[derive(Debug, Clone, PartialEq, Hash, Eq, Default)]
pub enum ArrayType {
    #[default]
    Unknown,
    MZArray,
    IntensityArray,
    TimeArray,
    NonStandardDataArray {
        name: Box<String>,
    },
}

impl Display for ArrayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ArrayType {
    pub const fn preferred_dtype(&self) -> BinaryDataArrayType {
        match self {
            ArrayType::MZArray => BinaryDataArrayType::Float64,
            ArrayType::TimeArray => BinaryDataArrayType::Float64,
            ArrayType::IntensityArray => BinaryDataArrayType::Float32,
            _ => BinaryDataArrayType::Float32,
        }
    }

    /// Create a [`ArrayType::NonStandardDataArray`] with the provided name.
    pub fn nonstandard<S: ToString>(name: S) -> ArrayType {
        ArrayType::NonStandardDataArray {
            name: name.to_string().into(),
        }
    }

    pub fn as_param(&self, unit: Option<Unit>) -> Param {
        const CV: ControlledVocabulary = ControlledVocabulary::MS;
        match self {
            ArrayType::MZArray => CV
                .param(1000514, "m/z array")
                .with_unit(unit.unwrap_or(Unit::MZ)),
            ArrayType::IntensityArray => CV
                .param(1000515, "intensity array")
                .with_unit(unit.unwrap_or(Unit::DetectorCounts)),
            ArrayType::TimeArray => CV
                .param(1000595, "time array")
                .with_unit(unit.unwrap_or(Unit::Second)),
            ArrayType::NonStandardDataArray { name } => {
                let mut p = CV.param_val(1000786, "non-standard data array", name.to_string());
                p.unit = unit.unwrap_or_default();
                p
            }
            ArrayType::Unknown => {
                panic!("Could not determine how to name array {}", self);
            }
        }
    }

    pub fn from_accession(accession: u32, value: &str) -> Option<ArrayType> {
        match accession {
            1000514 => Some(ArrayType::MZArray),
            1000515 => Some(ArrayType::IntensityArray),
            1000595 => Some(ArrayType::TimeArray),
            1000786 => Some(ArrayType::nonstandard(value)),
            _ => None,
        }
    }
}

/// The canonical primitive data types found in MS data file formats
/// supported by the PSI-MS controlled vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Hash, Eq, Default)]
pub enum BinaryDataArrayType {
    #[default]
    Unknown,
    Float64,
    Float32,
    Int64,
    Int32,
    Ascii,
}

impl Display for BinaryDataArrayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl BinaryDataArrayType {
    pub const fn size_of(&self) -> usize {
        match self {
            BinaryDataArrayType::Unknown | BinaryDataArrayType::Ascii => 1,
            BinaryDataArrayType::Float32 | BinaryDataArrayType::Int32 => 4,
            BinaryDataArrayType::Float64 | BinaryDataArrayType::Int64 => 8,
        }
    }

    pub const fn as_param(&self) -> Option<ParamCow<'static>> {
        const CV: ControlledVocabulary = ControlledVocabulary::MS;
        let p = match self {
            BinaryDataArrayType::Float32 => CV.const_param_ident("32-bit float", 1000521),
            BinaryDataArrayType::Float64 => CV.const_param_ident("64-bit float", 1000523),
            BinaryDataArrayType::Int32 => CV.const_param_ident("32-bit integer", 1000519),
            BinaryDataArrayType::Int64 => CV.const_param_ident("64-bit integer", 1000522),
            BinaryDataArrayType::Ascii => {
                CV.const_param_ident("null-terminated ASCII string", 1001479)
            }
            BinaryDataArrayType::Unknown => return None,
        };
        Some(p)
    }

    pub fn from_accession(accession: u32) -> Option<Self> {
        match accession {
            1000521 => Some(Self::Float32),
            1000523 => Some(Self::Float64),
            1000519 => Some(Self::Int32),
            1000522 => Some(Self::Int64),
            1001479 => Some(Self::Ascii),
            _ => None,
        }
    }
}

/// A numeric transform applied before byte serialization. Mutually
/// exclusive with generic byte-stream compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericCompression {
    /// Two-term linear prediction with fixed-point residuals; for monotone
    /// sequences such as sorted m/z.
    Linear,
    /// Positive integer compression: round and varint-encode.
    Pic,
    /// Short logged float: log-transform, scale, store as u16.
    Slof,
}

/// The range of compression and encoding states that a raw byte buffer
/// might be in during different stages of decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BinaryCompressionType {
    #[default]
    NoCompression,
    Zlib,
    NumpressLinear,
    NumpressPic,
    NumpressSlof,
    /// The in-memory state after decoding; never written out.
    Decoded,
}

impl Display for BinaryCompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl BinaryCompressionType {
    pub const fn as_param(&self) -> Option<ParamCow<'static>> {
        let (name, accession) = match self {
            BinaryCompressionType::NoCompression => ("no compression", 1000576),
            BinaryCompressionType::Zlib => ("zlib compression", 1000574),
            BinaryCompressionType::NumpressLinear => {
                ("MS-Numpress linear prediction compression", 1002312)
            }
            BinaryCompressionType::NumpressPic => {
                ("MS-Numpress positive integer compression", 1002313)
            }
            BinaryCompressionType::NumpressSlof => {
                ("MS-Numpress short logged float compression", 1002314)
            }
            BinaryCompressionType::Decoded => return None,
        };
        Some(ControlledVocabulary::MS.const_param_ident(name, accession))
    }

    pub fn from_accession(accession: u32) -> Option<Self> {
        match accession {
            1000576 => Some(Self::NoCompression),
            1000574 => Some(Self::Zlib),
            1002312 => Some(Self::NumpressLinear),
            1002313 => Some(Self::NumpressPic),
            1002314 => Some(Self::NumpressSlof),
            _ => None,
        }
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::NumpressLinear | Self::NumpressPic | Self::NumpressSlof
        )
    }

    /// Generate a user-understandable message about why a compression
    /// conversion operation failed.
    pub fn unsupported_msg(&self, context: Option<&str>) -> String {
        match context {
            Some(ctx) => format!("Cannot decode array compressed with {:?} ({})", self, ctx),
            None => format!("Cannot decode array compressed with {:?}", self),
        }
    }
}

/// How an array should be serialized: at most one of a numeric transform
/// and zlib. The mzML contract mandates exactly one compression cvParam per
/// array, so requesting both is an invalid configuration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CompressionConfig {
    pub numeric: Option<NumericCompression>,
    pub zlib: bool,
}

impl CompressionConfig {
    pub const fn none() -> Self {
        Self {
            numeric: None,
            zlib: false,
        }
    }

    pub const fn zlib() -> Self {
        Self {
            numeric: None,
            zlib: true,
        }
    }

    pub const fn numeric(kind: NumericCompression) -> Self {
        Self {
            numeric: Some(kind),
            zlib: false,
        }
    }

    pub fn resolve(&self) -> Result<BinaryCompressionType, ArrayRetrievalError> {
        match (self.numeric, self.zlib) {
            (Some(_), true) => Err(ArrayRetrievalError::ConflictingCompression),
            (Some(NumericCompression::Linear), false) => Ok(BinaryCompressionType::NumpressLinear),
            (Some(NumericCompression::Pic), false) => Ok(BinaryCompressionType::NumpressPic),
            (Some(NumericCompression::Slof), false) => Ok(BinaryCompressionType::NumpressSlof),
            (None, true) => Ok(BinaryCompressionType::Zlib),
            (None, false) => Ok(BinaryCompressionType::NoCompression),
        }
    }
}

/// A high level set of failure modes that an operation to retrieve a typed
/// memory buffer from a binary array might encounter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ArrayRetrievalError {
    #[error("Array type {0:?} not found")]
    NotFound(ArrayType),
    #[error("An error occurred while decompressing: {0}")]
    DecompressionError(String),
    #[error("The requested data type does not match the number of bytes available in the buffer")]
    DataTypeSizeMismatch,
    #[error("Numeric and zlib compression cannot be combined on one array")]
    ConflictingCompression,
}

impl From<bytemuck::PodCastError> for ArrayRetrievalError {
    fn from(_: bytemuck::PodCastError) -> Self {
        Self::DataTypeSizeMismatch
    }
}

impl From<ArrayRetrievalError> for io::Error {
    fn from(value: ArrayRetrievalError) -> Self {
        match value {
            ArrayRetrievalError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, value),
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

const FIXED_POINT_MAX: f64 = (i32::MAX / 2) as f64;

/// Pick a linear fixed-point scale that keeps residuals inside 32 bits for
/// this data. Larger scales mean smaller absolute error (0.5 / scale).
pub fn optimal_linear_scale(data: &[f64]) -> f64 {
    match data.iter().fold(0.0f64, |acc, v| acc.max(v.abs())) {
        max if max > 0.0 => FIXED_POINT_MAX / max,
        _ => 1.0,
    }
}

/// Pick a slof scale so the largest logged value still fits a u16.
pub fn optimal_slof_scale(data: &[f64]) -> f64 {
    match data
        .iter()
        .fold(0.0f64, |acc, v| acc.max(v.abs().ln_1p()))
    {
        max if max > 0.0 => (u16::MAX as f64 - 1.0) / max,
        _ => 1.0,
    }
}

fn push_varint(out: &mut Bytes, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn read_varint(bytes: &[u8], cursor: &mut usize) -> Result<u64, ArrayRetrievalError> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *bytes
            .get(*cursor)
            .ok_or_else(|| ArrayRetrievalError::DecompressionError("truncated varint".into()))?;
        *cursor += 1;
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(ArrayRetrievalError::DecompressionError(
                "varint overflows 64 bits".into(),
            ));
        }
    }
}

#[inline]
fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Linear-prediction encoding: an 8-byte scale, two fixed-point seed values,
/// then zigzag-varint residuals against the two-term predictor
/// `2·x[n-1] − x[n-2]`.
///
/// The absolute reconstruction error is at most `0.5 / scale` per element.
pub fn linear_encode(data: &[f64], scale: f64) -> Bytes {
    let mut out = Bytes::with_capacity(16 + data.len() * 2);
    out.extend_from_slice(&scale.to_le_bytes());
    let fixed: Vec<i64> = data.iter().map(|v| (v * scale).round() as i64).collect();
    for seed in fixed.iter().take(2) {
        out.extend_from_slice(&seed.to_le_bytes());
    }
    for window in fixed.windows(3) {
        let predicted = 2 * window[1] - window[0];
        push_varint(&mut out, zigzag(window[2] - predicted));
    }
    out
}

pub fn linear_decode(bytes: &[u8]) -> Result<Vec<f64>, ArrayRetrievalError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    if bytes.len() < 8 {
        return Err(ArrayRetrievalError::DecompressionError(
            "linear stream shorter than its header".into(),
        ));
    }
    let scale = f64::from_le_bytes(bytes[..8].try_into().unwrap());
    if !(scale.is_finite() && scale > 0.0) {
        return Err(ArrayRetrievalError::DecompressionError(format!(
            "invalid linear fixed-point scale {}",
            scale
        )));
    }
    let mut fixed: Vec<i64> = Vec::new();
    let mut cursor = 8;
    for _ in 0..2 {
        if cursor + 8 > bytes.len() {
            break;
        }
        fixed.push(i64::from_le_bytes(
            bytes[cursor..cursor + 8].try_into().unwrap(),
        ));
        cursor += 8;
    }
    while cursor < bytes.len() {
        let n = fixed.len();
        let predicted = 2 * fixed[n - 1] - fixed[n - 2];
        let residual = unzigzag(read_varint(bytes, &mut cursor)?);
        fixed.push(predicted + residual);
    }
    Ok(fixed.into_iter().map(|v| v as f64 / scale).collect())
}

/// Positive integer compression: round to the nearest non-negative integer
/// and varint-encode. Exact for integral inputs; otherwise the error is the
/// rounding error, at most 0.5.
pub fn pic_encode(data: &[f64]) -> Result<Bytes, ArrayRetrievalError> {
    let mut out = Bytes::with_capacity(data.len() * 2);
    for &value in data {
        if value < -0.5 || !value.is_finite() {
            return Err(ArrayRetrievalError::DecompressionError(format!(
                "positive integer compression requires non-negative finite values, got {}",
                value
            )));
        }
        push_varint(&mut out, value.round().max(0.0) as u64);
    }
    Ok(out)
}

pub fn pic_decode(bytes: &[u8]) -> Result<Vec<f64>, ArrayRetrievalError> {
    let mut out = Vec::new();
    let mut cursor = 0;
    while cursor < bytes.len() {
        out.push(read_varint(bytes, &mut cursor)? as f64);
    }
    Ok(out)
}

/// Short logged float: store `round(ln(1 + |x|) · scale)` as u16. The
/// relative reconstruction error of `1 + x` is bounded by
/// `e^(0.5 / scale) − 1`; zero round-trips exactly.
pub fn slof_encode(data: &[f64], scale: f64) -> Bytes {
    let mut out = Bytes::with_capacity(8 + data.len() * 2);
    out.extend_from_slice(&scale.to_le_bytes());
    for &value in data {
        let logged = (value.abs().ln_1p() * scale).round();
        let clamped = logged.clamp(0.0, u16::MAX as f64) as u16;
        out.extend_from_slice(&clamped.to_le_bytes());
    }
    out
}

pub fn slof_decode(bytes: &[u8]) -> Result<Vec<f64>, ArrayRetrievalError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    if bytes.len() < 8 || (bytes.len() - 8) % 2 != 0 {
        return Err(ArrayRetrievalError::DecompressionError(
            "slof stream has a malformed length".into(),
        ));
    }
    let scale = f64::from_le_bytes(bytes[..8].try_into().unwrap());
    if !(scale.is_finite() && scale > 0.0) {
        return Err(ArrayRetrievalError::DecompressionError(format!(
            "invalid slof scale {}",
            scale
        )));
    }
    let out = bytes[8..]
        .chunks_exact(2)
        .map(|pair| {
            let stored = u16::from_le_bytes(pair.try_into().unwrap()) as f64;
            (stored / scale).exp_m1()
        })
        .collect();
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(BinaryDataArrayType::Ascii.size_of(), 1);
        assert_eq!(BinaryDataArrayType::Float32.size_of(), 4);
        assert_eq!(BinaryDataArrayType::Int32.size_of(), 4);
        assert_eq!(BinaryDataArrayType::Float64.size_of(), 8);
        assert_eq!(BinaryDataArrayType::Int64.size_of(), 8);
    }

    #[test]
    fn test_compression_cv_params() {
        let p = BinaryCompressionType::Zlib.as_param().unwrap();
        assert_eq!(p.accession, Some(1000574));
        let p = BinaryCompressionType::NumpressLinear.as_param().unwrap();
        assert_eq!(p.accession, Some(1002312));
        assert!(BinaryCompressionType::Decoded.as_param().is_none());
        assert_eq!(
            BinaryCompressionType::from_accession(1002314),
            Some(BinaryCompressionType::NumpressSlof)
        );
    }

    #[test]
    fn test_config_rejects_numeric_plus_zlib() {
        let config = CompressionConfig {
            numeric: Some(NumericCompression::Linear),
            zlib: true,
        };
        assert_eq!(
            config.resolve(),
            Err(ArrayRetrievalError::ConflictingCompression)
        );
        assert_eq!(
            CompressionConfig::zlib().resolve(),
            Ok(BinaryCompressionType::Zlib)
        );
    }

    #[test]
    fn test_linear_round_trip_bound() {
        let mz: Vec<f64> = (0..500)
            .map(|i| 200.0 + i as f64 * 0.71 + (i as f64 * 0.37).sin() * 0.01)
            .collect();
        let scale = optimal_linear_scale(&mz);
        let decoded = linear_decode(&linear_encode(&mz, scale)).unwrap();
        assert_eq!(decoded.len(), mz.len());
        let bound = 0.5 / scale;
        for (a, b) in mz.iter().zip(decoded.iter()) {
            assert!((a - b).abs() <= bound, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_linear_short_inputs() {
        assert!(linear_decode(&linear_encode(&[], 1000.0)).unwrap().is_empty());
        let one = linear_decode(&linear_encode(&[5.0], 1000.0)).unwrap();
        assert_eq!(one, vec![5.0]);
        let two = linear_decode(&linear_encode(&[5.0, 6.0], 1000.0)).unwrap();
        assert_eq!(two, vec![5.0, 6.0]);
    }

    #[test]
    fn test_pic_round_trip() {
        let counts = vec![0.0, 1.0, 127.0, 128.0, 300000.0, 4.0];
        let decoded = pic_decode(&pic_encode(&counts).unwrap()).unwrap();
        assert_eq!(decoded, counts);
        assert!(pic_encode(&[-3.0]).is_err());
        // Fractional values round.
        let decoded = pic_decode(&pic_encode(&[2.4, 2.6]).unwrap()).unwrap();
        assert_eq!(decoded, vec![2.0, 3.0]);
    }

    #[test]
    fn test_slof_relative_error_bound() {
        let intensities = vec![0.0, 1.0, 10.0, 1234.5, 99999.0, 5e6];
        let scale = optimal_slof_scale(&intensities);
        let decoded = slof_decode(&slof_encode(&intensities, scale)).unwrap();
        assert_eq!(decoded.len(), intensities.len());
        // The documented bound is on 1 + x, the quantity the codec logs.
        let bound = (0.5 / scale).exp() - 1.0;
        for (a, b) in intensities.iter().zip(decoded.iter()) {
            if *a == 0.0 {
                assert_eq!(*b, 0.0);
            } else {
                assert!(
                    ((a - b) / (1.0 + a)).abs() <= bound + 1e-12,
                    "{} vs {}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_truncated_streams_error() {
        assert!(linear_decode(&[1, 2, 3]).is_err());
        assert!(slof_decode(&[0; 9]).is_err());
        // A dangling continuation bit.
        assert!(pic_decode(&[0x80]).is_err());
    }
}
