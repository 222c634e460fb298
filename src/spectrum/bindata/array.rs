//! A binary data array and its full encode/decode pipeline:
//! numeric transform XOR zlib, then base64.
use std::borrow::Cow;
use std::fmt::{self, Formatter};
use std::io::prelude::*;

use bytemuck::Pod;
use flate2::write::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use log::warn;

use crate::params::{ParamList, Unit};

use super::encodings::{
    linear_decode, linear_encode, optimal_linear_scale, optimal_slof_scale, pic_decode,
    pic_encode, slof_decode, slof_encode, to_bytes, vec_as_bytes, ArrayRetrievalError, ArrayType,
    BinaryCompressionType, BinaryDataArrayType, Bytes, CompressionConfig,
};

/// Represents a data array
#[derive(Default, Clone, PartialEq)]
pub struct DataArray {
    pub data: Bytes,
    pub dtype: BinaryDataArrayType,
    pub compression: BinaryCompressionType,
    pub name: ArrayType,
    pub params: ParamList,
    pub unit: Unit,
}

impl fmt::Debug for DataArray {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataArray")
            .field("name", &self.name)
            .field("data size", &self.data.len())
            .field("dtype", &self.dtype)
            .field("compression", &self.compression)
            .field("unit", &self.unit)
            .finish()
    }
}

const EMPTY_BUFFER: [u8; 0] = [];

impl<'transient, 'lifespan: 'transient> DataArray {
    pub fn new() -> DataArray {
        DataArray {
            ..Default::default()
        }
    }

    pub fn from_name(name: &ArrayType) -> DataArray {
        DataArray {
            dtype: name.preferred_dtype(),
            name: name.clone(),
            compression: BinaryCompressionType::Decoded,
            ..Default::default()
        }
    }

    pub fn from_name_and_type(name: &ArrayType, dtype: BinaryDataArrayType) -> DataArray {
        DataArray {
            dtype,
            name: name.clone(),
            compression: BinaryCompressionType::Decoded,
            ..Default::default()
        }
    }

    pub fn wrap(name: &ArrayType, dtype: BinaryDataArrayType, data: Bytes) -> DataArray {
        DataArray {
            dtype,
            name: name.clone(),
            data,
            compression: BinaryCompressionType::Decoded,
            ..Default::default()
        }
    }

    /// Build a decoded f64 array directly from values.
    pub fn from_f64(name: &ArrayType, values: &[f64]) -> DataArray {
        Self::wrap(name, BinaryDataArrayType::Float64, to_bytes(values))
    }

    pub fn from_f32(name: &ArrayType, values: &[f32]) -> DataArray {
        Self::wrap(name, BinaryDataArrayType::Float32, to_bytes(values))
    }

    pub fn from_i32(name: &ArrayType, values: &[i32]) -> DataArray {
        Self::wrap(name, BinaryDataArrayType::Int32, to_bytes(values))
    }

    pub fn update_buffer<T: Pod>(&mut self, data_buffer: &[T]) -> Result<usize, ArrayRetrievalError> {
        if self.dtype.size_of() != std::mem::size_of::<T>() {
            Err(ArrayRetrievalError::DataTypeSizeMismatch)
        } else {
            self.data = to_bytes(data_buffer);
            Ok(self.data.len())
        }
    }

    pub fn push<T: Pod>(&mut self, value: T) -> Result<(), ArrayRetrievalError> {
        if !matches!(self.compression, BinaryCompressionType::Decoded) {
            self.decode_and_store()?;
        }
        if self.dtype.size_of() != std::mem::size_of::<T>() {
            Err(ArrayRetrievalError::DataTypeSizeMismatch)
        } else {
            self.data.extend(bytemuck::bytes_of(&value));
            Ok(())
        }
    }

    /// The number of elements the decoded buffer holds.
    pub fn data_len(&self) -> Result<usize, ArrayRetrievalError> {
        let data = self.decode()?;
        Ok(data.len() / self.dtype.size_of())
    }

    pub fn compress_zlib(bytestring: &[u8]) -> Bytes {
        let result = Bytes::new();
        let mut compressor = ZlibEncoder::new(result, Compression::best());
        compressor.write_all(bytestring).expect("Error compressing");
        compressor.finish().expect("Error compressing")
    }

    pub fn decompress_zlib(bytestring: &[u8]) -> Result<Bytes, ArrayRetrievalError> {
        let result = Bytes::new();
        let mut decompressor = ZlibDecoder::new(result);
        decompressor
            .write_all(bytestring)
            .map_err(|e| ArrayRetrievalError::DecompressionError(e.to_string()))?;
        decompressor
            .finish()
            .map_err(|e| ArrayRetrievalError::DecompressionError(e.to_string()))
    }

    /// Serialize the decoded buffer under `config` and base64-encode the
    /// result. The returned bytes are the ASCII text of the mzML `<binary>`
    /// element, and the [`BinaryCompressionType`] is the cvParam to declare.
    pub fn encode_bytestring(
        &self,
        config: CompressionConfig,
    ) -> Result<(Bytes, BinaryCompressionType), ArrayRetrievalError> {
        let mode = config.resolve()?;
        let decoded = self.decode()?;
        let payload: Bytes = match mode {
            BinaryCompressionType::NoCompression => decoded.into_owned(),
            BinaryCompressionType::Zlib => Self::compress_zlib(&decoded),
            BinaryCompressionType::NumpressLinear => {
                let values = self.view_f64_from(&decoded)?;
                linear_encode(&values, optimal_linear_scale(&values))
            }
            BinaryCompressionType::NumpressPic => {
                let values = self.view_f64_from(&decoded)?;
                pic_encode(&values)?
            }
            BinaryCompressionType::NumpressSlof => {
                let values = self.view_f64_from(&decoded)?;
                slof_encode(&values, optimal_slof_scale(&values))
            }
            BinaryCompressionType::Decoded => unreachable!("resolve never yields Decoded"),
        };
        Ok((
            base64_simd::STANDARD.encode_type::<Bytes>(&payload),
            mode,
        ))
    }

    /// Interpret a decoded byte buffer as f64 values according to `dtype`.
    fn view_f64_from(&self, decoded: &[u8]) -> Result<Vec<f64>, ArrayRetrievalError> {
        let values = match self.dtype {
            BinaryDataArrayType::Float64 => bytemuck::try_cast_slice::<u8, f64>(decoded)?.to_vec(),
            BinaryDataArrayType::Float32 => bytemuck::try_cast_slice::<u8, f32>(decoded)?
                .iter()
                .map(|v| *v as f64)
                .collect(),
            BinaryDataArrayType::Int32 => bytemuck::try_cast_slice::<u8, i32>(decoded)?
                .iter()
                .map(|v| *v as f64)
                .collect(),
            BinaryDataArrayType::Int64 => bytemuck::try_cast_slice::<u8, i64>(decoded)?
                .iter()
                .map(|v| *v as f64)
                .collect(),
            _ => return Err(ArrayRetrievalError::DataTypeSizeMismatch),
        };
        Ok(values)
    }

    fn store_f64(&mut self, values: Vec<f64>) {
        match self.dtype {
            BinaryDataArrayType::Float32 => {
                let narrowed: Vec<f32> = values.into_iter().map(|v| v as f32).collect();
                self.data = vec_as_bytes(narrowed);
            }
            BinaryDataArrayType::Int32 => {
                let narrowed: Vec<i32> = values.into_iter().map(|v| v as i32).collect();
                self.data = vec_as_bytes(narrowed);
            }
            BinaryDataArrayType::Int64 => {
                let narrowed: Vec<i64> = values.into_iter().map(|v| v as i64).collect();
                self.data = vec_as_bytes(narrowed);
            }
            _ => {
                self.dtype = BinaryDataArrayType::Float64;
                self.data = vec_as_bytes(values);
            }
        }
        self.compression = BinaryCompressionType::Decoded;
    }

    /// Fill this array from base64 text under the declared `compression`
    /// and store it decoded.
    pub fn fill_from_encoded(&mut self, text: &[u8]) -> Result<(), ArrayRetrievalError> {
        let bytestring = base64_simd::STANDARD
            .decode_type::<Bytes>(text)
            .map_err(|e| ArrayRetrievalError::DecompressionError(e.to_string()))?;
        match self.compression {
            BinaryCompressionType::NoCompression | BinaryCompressionType::Decoded => {
                self.data = bytestring;
                self.compression = BinaryCompressionType::Decoded;
            }
            BinaryCompressionType::Zlib => {
                self.data = Self::decompress_zlib(&bytestring)?;
                self.compression = BinaryCompressionType::Decoded;
            }
            BinaryCompressionType::NumpressLinear => {
                self.store_f64(linear_decode(&bytestring)?);
            }
            BinaryCompressionType::NumpressPic => {
                self.store_f64(pic_decode(&bytestring)?);
            }
            BinaryCompressionType::NumpressSlof => {
                self.store_f64(slof_decode(&bytestring)?);
            }
        }
        Ok(())
    }

    /// Decode the compressed data, if needed, and store the plain buffer in
    /// `self.data`. Afterwards `self.compression` is always
    /// [`BinaryCompressionType::Decoded`].
    pub fn decode_and_store(&mut self) -> Result<BinaryCompressionType, ArrayRetrievalError> {
        match self.decode()? {
            // Already decoded.
            Cow::Borrowed(_view) => Ok(self.compression),
            Cow::Owned(buffer) => {
                self.data = buffer;
                self.compression = BinaryCompressionType::Decoded;
                Ok(self.compression)
            }
        }
    }

    /// The plain little-endian byte rendition of this array's values.
    pub fn decode(&'lifespan self) -> Result<Cow<'lifespan, [u8]>, ArrayRetrievalError> {
        if self.data.is_empty() {
            return Ok(Cow::Borrowed(&EMPTY_BUFFER));
        }
        match self.compression {
            BinaryCompressionType::Decoded => Ok(Cow::Borrowed(self.data.as_slice())),
            mode => Err(ArrayRetrievalError::DecompressionError(
                mode.unsupported_msg(Some("call fill_from_encoded or decode_and_store first")),
            )),
        }
    }

    /// Verify the decoded element count against a declared count; a
    /// mismatch is logged and the observed count is kept.
    pub fn check_declared_length(&self, declared: usize) -> Result<usize, ArrayRetrievalError> {
        let actual = self.data_len()?;
        if actual != declared {
            warn!(
                "array {} declared {} elements but decoded {}; using the decoded length",
                self.name, declared, actual
            );
        }
        Ok(actual)
    }

    pub fn to_f64(&'lifespan self) -> Result<Cow<'lifespan, [f64]>, ArrayRetrievalError> {
        let view = self.decode()?;
        match (self.dtype, view) {
            (BinaryDataArrayType::Float64, Cow::Borrowed(view)) => {
                Ok(Cow::Borrowed(bytemuck::try_cast_slice(view)?))
            }
            (_, view) => {
                let values = self.view_f64_from(&view)?;
                Ok(Cow::Owned(values))
            }
        }
    }

    pub fn to_f32(&'lifespan self) -> Result<Cow<'lifespan, [f32]>, ArrayRetrievalError> {
        let view = self.decode()?;
        match (self.dtype, view) {
            (BinaryDataArrayType::Float32, Cow::Borrowed(view)) => {
                Ok(Cow::Borrowed(bytemuck::try_cast_slice(view)?))
            }
            (_, view) => {
                let values = self.view_f64_from(&view)?;
                Ok(Cow::Owned(values.into_iter().map(|v| v as f32).collect()))
            }
        }
    }

    pub fn to_i32(&'lifespan self) -> Result<Cow<'lifespan, [i32]>, ArrayRetrievalError> {
        let view = self.decode()?;
        match (self.dtype, view) {
            (BinaryDataArrayType::Int32, Cow::Borrowed(view)) => {
                Ok(Cow::Borrowed(bytemuck::try_cast_slice(view)?))
            }
            (_, view) => {
                let values = self.view_f64_from(&view)?;
                Ok(Cow::Owned(values.into_iter().map(|v| v as i32).collect()))
            }
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.compression = BinaryCompressionType::Decoded;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spectrum::bindata::encodings::NumericCompression;

    fn mz_array() -> DataArray {
        let values: Vec<f64> = (0..100).map(|i| 200.0 + i as f64 * 0.5).collect();
        DataArray::from_f64(&ArrayType::MZArray, &values)
    }

    #[test]
    fn test_plain_round_trip() {
        let array = mz_array();
        let (text, mode) = array.encode_bytestring(CompressionConfig::none()).unwrap();
        assert_eq!(mode, BinaryCompressionType::NoCompression);

        let mut back = DataArray::from_name(&ArrayType::MZArray);
        back.compression = mode;
        back.fill_from_encoded(&text).unwrap();
        assert_eq!(back.to_f64().unwrap(), array.to_f64().unwrap());
    }

    #[test]
    fn test_zlib_round_trip() {
        let array = mz_array();
        let (text, mode) = array.encode_bytestring(CompressionConfig::zlib()).unwrap();
        assert_eq!(mode, BinaryCompressionType::Zlib);

        let mut back = DataArray::from_name(&ArrayType::MZArray);
        back.compression = mode;
        back.fill_from_encoded(&text).unwrap();
        assert_eq!(back.to_f64().unwrap(), array.to_f64().unwrap());
    }

    #[test]
    fn test_numpress_linear_round_trip_within_bound() {
        let array = mz_array();
        let (text, mode) = array
            .encode_bytestring(CompressionConfig::numeric(NumericCompression::Linear))
            .unwrap();
        assert_eq!(mode, BinaryCompressionType::NumpressLinear);

        let mut back = DataArray::from_name(&ArrayType::MZArray);
        back.compression = mode;
        back.fill_from_encoded(&text).unwrap();
        let original = array.to_f64().unwrap();
        let decoded = back.to_f64().unwrap();
        assert_eq!(decoded.len(), original.len());
        for (a, b) in original.iter().zip(decoded.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_compression_cross_product() {
        // Every legal configuration decodes back to the declared element
        // count; lossless modes are exact, lossy modes respect their
        // documented bounds.
        let intensities: Vec<f64> = (0..256).map(|i| (i as f64 * 13.7) % 5000.0).collect();
        let array = DataArray::from_f64(&ArrayType::IntensityArray, &intensities);
        let configs = [
            CompressionConfig::none(),
            CompressionConfig::zlib(),
            CompressionConfig::numeric(NumericCompression::Linear),
            CompressionConfig::numeric(NumericCompression::Pic),
            CompressionConfig::numeric(NumericCompression::Slof),
        ];
        for config in configs {
            let (text, mode) = array.encode_bytestring(config).unwrap();
            let mut back = DataArray::from_name_and_type(
                &ArrayType::IntensityArray,
                BinaryDataArrayType::Float64,
            );
            back.compression = mode;
            back.fill_from_encoded(&text).unwrap();
            let decoded = back.to_f64().unwrap();
            assert_eq!(decoded.len(), intensities.len(), "{:?}", mode);
            match mode {
                BinaryCompressionType::NoCompression | BinaryCompressionType::Zlib => {
                    assert_eq!(decoded.as_ref(), intensities.as_slice(), "{:?}", mode);
                }
                BinaryCompressionType::NumpressPic => {
                    for (a, b) in intensities.iter().zip(decoded.iter()) {
                        assert!((a - b).abs() <= 0.5, "{:?}: {} vs {}", mode, a, b);
                    }
                }
                _ => {
                    for (a, b) in intensities.iter().zip(decoded.iter()) {
                        assert!((a - b).abs() <= 0.51, "{:?}: {} vs {}", mode, a, b);
                    }
                }
            }
        }
    }

    #[test]
    fn test_conflicting_compression_rejected() {
        let array = mz_array();
        let config = CompressionConfig {
            numeric: Some(NumericCompression::Slof),
            zlib: true,
        };
        assert_eq!(
            array.encode_bytestring(config),
            Err(ArrayRetrievalError::ConflictingCompression)
        );
    }

    #[test_log::test]
    fn test_declared_length_mismatch_is_permissive() {
        let array = mz_array();
        assert_eq!(array.check_declared_length(100).unwrap(), 100);
        // The decoder keeps the observed count when the declaration lies.
        assert_eq!(array.check_declared_length(128).unwrap(), 100);
    }

    #[test]
    fn test_push_and_typed_views() {
        let mut array = DataArray::from_name_and_type(&ArrayType::IntensityArray, BinaryDataArrayType::Float32);
        array.push(1.5f32).unwrap();
        array.push(2.5f32).unwrap();
        assert!(array.push(1u8).is_err());
        assert_eq!(array.data_len().unwrap(), 2);
        assert_eq!(array.to_f32().unwrap().as_ref(), &[1.5f32, 2.5f32]);
        assert_eq!(array.to_f64().unwrap().as_ref(), &[1.5f64, 2.5f64]);
    }
}
