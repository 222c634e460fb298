use crate::impl_param_described;
use crate::params::ParamList;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    IonSource,
    Analyzer,
    Detector,
    #[default]
    Unknown,
}

/// One stage of the instrument: source, analyzer or detector.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Component {
    pub component_type: ComponentType,
    /// Position in the ion path
    pub order: u8,
    pub params: ParamList,
}

/// A configuration of instrument components a scan may reference.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct InstrumentConfiguration {
    pub components: Vec<Component>,
    pub params: ParamList,
    pub software_reference: String,
    pub id: u32,
}

impl InstrumentConfiguration {
    pub fn last_component_mut(&mut self) -> Option<&mut Component> {
        self.components.last_mut()
    }

    pub fn new_component(&mut self, component_type: ComponentType) -> &mut Component {
        let order = self.components.len() as u8;
        self.components.push(Component {
            component_type,
            order,
            ..Default::default()
        });
        self.components.last_mut().unwrap()
    }
}

impl_param_described!(InstrumentConfiguration, Component);
