//! Typed `onMetaData` record.

use crate::amf::AmfValue;
use crate::flv::FlvTag;
use crate::keyframes::KeyframeIndex;

/// Name of the metadata script object.
pub const ON_METADATA: &str = "onMetaData";

/// Directive prefixed to metadata sent to players, stripped on ingest.
pub const SET_DATA_FRAME: &str = "@setDataFrame";

const DURATION_KEY: &str = "duration";
const KEYFRAMES_KEY: &str = "keyframes";

/// Stream metadata with the fields the recorder owns pulled out of the
/// free-form property list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMetadata {
    /// Duration in seconds.
    pub duration: Option<f64>,
    pub keyframes: Option<KeyframeIndex>,
    /// Every other property, in wire order.
    pub extra: Vec<(String, AmfValue)>,
}

impl StreamMetadata {
    /// Split a property list into typed fields and the rest.
    pub fn from_properties(props: &[(String, AmfValue)]) -> Self {
        let mut metadata = Self::default();
        for (key, value) in props {
            match key.as_str() {
                DURATION_KEY => metadata.duration = value.as_number(),
                KEYFRAMES_KEY => metadata.keyframes = KeyframeIndex::from_amf(value),
                _ => metadata.extra.push((key.clone(), value.clone())),
            }
        }
        metadata
    }

    /// Parse the values of a data message or script tag.
    ///
    /// Leading strings (`@setDataFrame`, `onMetaData`) are skipped and the
    /// first object or ECMA array supplies the properties.
    pub fn from_data_values(values: &[AmfValue]) -> Option<Self> {
        values
            .iter()
            .skip_while(|v| matches!(v, AmfValue::String(_)))
            .find_map(AmfValue::properties)
            .map(Self::from_properties)
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration = Some(secs);
        self
    }

    pub fn with_keyframes(mut self, index: KeyframeIndex) -> Self {
        self.keyframes = Some(index);
        self
    }

    /// Look up a free-form property.
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.extra.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// ECMA array form of all properties.
    pub fn to_amf(&self) -> AmfValue {
        let mut props = Vec::with_capacity(self.extra.len() + 2);
        if let Some(duration) = self.duration {
            props.push((DURATION_KEY.to_string(), AmfValue::Number(duration)));
        }
        props.extend(self.extra.iter().cloned());
        if let Some(keyframes) = &self.keyframes {
            props.push((KEYFRAMES_KEY.to_string(), keyframes.to_amf()));
        }
        AmfValue::EcmaArray(props)
    }

    /// Values of an `onMetaData` script body.
    pub fn script_values(&self) -> Vec<AmfValue> {
        vec![AmfValue::string(ON_METADATA), self.to_amf()]
    }

    /// Values sent to a player: `@setDataFrame`, `onMetaData`, properties.
    pub fn data_frame_values(&self) -> Vec<AmfValue> {
        vec![
            AmfValue::string(SET_DATA_FRAME),
            AmfValue::string(ON_METADATA),
            self.to_amf(),
        ]
    }

    /// Script tag carrying this metadata.
    pub fn to_tag(&self, timestamp: u32) -> FlvTag {
        FlvTag::script(timestamp, &self.script_values())
    }
}
