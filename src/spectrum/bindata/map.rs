//! A keyed collection of [`DataArray`]s belonging to one spectrum or
//! chromatogram while it is in transit through the codec layer.
use std::borrow::Cow;
use std::collections::hash_map::{HashMap, Iter, IterMut};

use super::array::DataArray;
use super::encodings::{ArrayRetrievalError, ArrayType};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BinaryArrayMap {
    pub byte_buffer_map: HashMap<ArrayType, DataArray>,
}

impl BinaryArrayMap {
    pub fn new() -> BinaryArrayMap {
        BinaryArrayMap {
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.byte_buffer_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_buffer_map.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, ArrayType, DataArray> {
        self.byte_buffer_map.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, ArrayType, DataArray> {
        self.byte_buffer_map.iter_mut()
    }

    pub fn add(&mut self, array: DataArray) {
        self.byte_buffer_map.insert(array.name.clone(), array);
    }

    pub fn get(&self, array_type: &ArrayType) -> Option<&DataArray> {
        self.byte_buffer_map.get(array_type)
    }

    pub fn get_mut(&mut self, array_type: &ArrayType) -> Option<&mut DataArray> {
        self.byte_buffer_map.get_mut(array_type)
    }

    pub fn has_array(&self, array_type: &ArrayType) -> bool {
        self.byte_buffer_map.contains_key(array_type)
    }

    pub fn clear(&mut self) {
        self.byte_buffer_map.clear();
    }

    pub fn mzs(&self) -> Result<Cow<'_, [f64]>, ArrayRetrievalError> {
        self.get(&ArrayType::MZArray)
            .ok_or(ArrayRetrievalError::NotFound(ArrayType::MZArray))?
            .to_f64()
    }

    pub fn intensities(&self) -> Result<Cow<'_, [f32]>, ArrayRetrievalError> {
        self.get(&ArrayType::IntensityArray)
            .ok_or(ArrayRetrievalError::NotFound(ArrayType::IntensityArray))?
            .to_f32()
    }

    pub fn times(&self) -> Result<Cow<'_, [f64]>, ArrayRetrievalError> {
        self.get(&ArrayType::TimeArray)
            .ok_or(ArrayRetrievalError::NotFound(ArrayType::TimeArray))?
            .to_f64()
    }
}
