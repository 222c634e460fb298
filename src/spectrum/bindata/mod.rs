//! Binary data arrays and the compressions applied to them inside mzML
//! files.
mod array;
mod encodings;
mod map;

pub use array::DataArray;
pub use encodings::{
    as_bytes, linear_decode, linear_encode, optimal_linear_scale, optimal_slof_scale, pic_decode,
    pic_encode, slof_decode, slof_encode, to_bytes, vec_as_bytes, ArrayRetrievalError, ArrayType,
    BinaryCompressionType, BinaryDataArrayType, Bytes, CompressionConfig, NumericCompression,
};
pub use map::BinaryArrayMap;
