use crate::impl_param_described;
use crate::params::ParamList;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Software {
    /// A unique identifier for the software within processing metadata
    pub id: String,
    /// A string denoting a particular software version, no guarantee is given for its format
    pub version: String,
    /// Any associated vocabulary terms, including the actual software name and type
    pub params: ParamList,
}

impl Software {
    pub fn new(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            version: version.to_string(),
            ..Default::default()
        }
    }
}

impl_param_described!(Software);
