use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Deserialize};

use crate::error::{ArchitectureError, ArchitectureResult};

/// The fixed catalog of layer kinds. Serialized by variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LayerKind {
    Conv2d,
    MaxPool2d,
    AvgPool2d,
    Linear,
    Relu,
    Sigmoid,
    Tanh,
}

impl LayerKind {
    pub const ALL: [LayerKind; 7] = [
        LayerKind::Conv2d,
        LayerKind::MaxPool2d,
        LayerKind::AvgPool2d,
        LayerKind::Linear,
        LayerKind::Relu,
        LayerKind::Sigmoid,
        LayerKind::Tanh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Conv2d => "Conv2d",
            LayerKind::MaxPool2d => "MaxPool2d",
            LayerKind::AvgPool2d => "AvgPool2d",
            LayerKind::Linear => "Linear",
            LayerKind::Relu => "Relu",
            LayerKind::Sigmoid => "Sigmoid",
            LayerKind::Tanh => "Tanh",
        }
    }

    /// Resolves a serialized tag; unknown tags are an error, never a fallback.
    pub fn from_tag(tag: &str) -> ArchitectureResult<LayerKind> {
        LayerKind::ALL.iter()
            .copied()
            .find(|k| k.as_str() == tag)
            .ok_or_else(|| ArchitectureError::UnsupportedLayerKind(tag.to_owned()))
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar construction argument.
///
/// Variant order matters for deserialization: JSON `4` becomes `Int`, `4.0`
/// becomes `Float`, so both survive a round trip unchanged. Integers above
/// `i64::MAX` land in `UInt` rather than degrading to a float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_owned())
    }
}

/// Describes one layer: its kind plus construction arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerDescriptor {
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub params: BTreeMap<String, ParamValue>,
}

impl LayerDescriptor {
    pub fn new(kind: LayerKind) -> LayerDescriptor {
        LayerDescriptor { kind, params: BTreeMap::new() }
    }

    /// Builder-style param setter.
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> LayerDescriptor {
        self.params.insert(key.to_owned(), value.into());
        self
    }
}

/// Wire form of a descriptor, before the tag has been resolved.
#[derive(Deserialize)]
struct RawLayer {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: BTreeMap<String, ParamValue>,
}

#[derive(Deserialize)]
struct RawArchitecture {
    layers: Vec<RawLayer>,
}

/// An ordered, strictly sequential list of layer descriptors.
///
/// Serializes to `{"layers": [{"type": ..., "params": {...}}, ...]}`. The
/// architecture says nothing about trained weights; those travel as a
/// separate snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ModelArchitecture {
    pub layers: Vec<LayerDescriptor>,
}

impl ModelArchitecture {
    pub fn new(layers: Vec<LayerDescriptor>) -> ModelArchitecture {
        ModelArchitecture { layers }
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn to_json(&self) -> ArchitectureResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses the JSON form. An unknown `type` tag fails with
    /// `UnsupportedLayerKind`; any other structural problem with `Malformed`.
    pub fn from_json(json: &str) -> ArchitectureResult<ModelArchitecture> {
        let raw: RawArchitecture = serde_json::from_str(json)?;
        ModelArchitecture::from_raw(raw)
    }

    /// Same as `from_json`, for an already parsed document.
    pub fn from_value(value: serde_json::Value) -> ArchitectureResult<ModelArchitecture> {
        let raw: RawArchitecture = serde_json::from_value(value)?;
        ModelArchitecture::from_raw(raw)
    }

    fn from_raw(raw: RawArchitecture) -> ArchitectureResult<ModelArchitecture> {
        let layers = raw.layers.into_iter()
            .map(|l| Ok(LayerDescriptor { kind: LayerKind::from_tag(&l.kind)?, params: l.params }))
            .collect::<ArchitectureResult<Vec<_>>>()?;
        Ok(ModelArchitecture { layers })
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{"layers":[
        {"type":"Conv2d","params":{"in_channels":1,"out_channels":4,"kernel_size":3,"padding":1}},
        {"type":"Relu","params":{}},
        {"type":"MaxPool2d","params":{"kernel_size":2}},
        {"type":"Linear","params":{"in_features":14,"out_features":10,"bias":false}},
        {"type":"Sigmoid","params":{"note":"logits"}},
        {"type":"Tanh","params":{"scale":1.5}}
    ]}"#;

    #[test]
    fn json_round_trip_is_lossless() {
        let arch = ModelArchitecture::from_json(SAMPLE).unwrap();
        assert_eq!(arch.layers.len(), 6);
        let again = ModelArchitecture::from_json(&arch.to_json().unwrap()).unwrap();
        assert_eq!(arch, again);
    }

    #[test]
    fn integer_and_float_params_keep_their_kind() {
        let arch = ModelArchitecture::from_json(SAMPLE).unwrap();
        assert_eq!(arch.layers[0].params["kernel_size"], ParamValue::Int(3));
        assert_eq!(arch.layers[5].params["scale"], ParamValue::Float(1.5));
        assert_eq!(arch.layers[3].params["bias"], ParamValue::Bool(false));
        assert_eq!(arch.layers[4].params["note"], ParamValue::Text("logits".into()));
    }

    #[test]
    fn integers_beyond_i64_keep_their_digits() {
        let json = r#"{"layers":[{"type":"Linear","params":{"in_features":18446744073709551615}}]}"#;
        let arch = ModelArchitecture::from_json(json).unwrap();
        assert_eq!(arch.layers[0].params["in_features"], ParamValue::UInt(u64::MAX));
        let out = arch.to_json().unwrap();
        assert!(out.contains("18446744073709551615"), "{}", out);
        assert_eq!(ModelArchitecture::from_json(&out).unwrap(), arch);
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let err = ModelArchitecture::from_json(r#"{"layers":[{"type":"Dropout","params":{}}]}"#)
            .unwrap_err();
        assert!(matches!(err, ArchitectureError::UnsupportedLayerKind(tag) if tag == "Dropout"));
    }

    #[test]
    fn missing_params_defaults_to_empty() {
        let arch = ModelArchitecture::from_json(r#"{"layers":[{"type":"Relu"}]}"#).unwrap();
        assert!(arch.layers[0].params.is_empty());
    }

    #[test]
    fn malformed_document_is_reported() {
        let err = ModelArchitecture::from_json(r#"{"nodes":[]}"#).unwrap_err();
        assert!(matches!(err, ArchitectureError::Malformed(_)));
    }

    #[test]
    fn serialized_form_uses_type_key() {
        let arch = ModelArchitecture::new(vec![
            LayerDescriptor::new(LayerKind::Linear).with("in_features", 4).with("out_features", 2),
        ]);
        let value: serde_json::Value = serde_json::from_str(&arch.to_json().unwrap()).unwrap();
        assert_eq!(value["layers"][0]["type"], "Linear");
        assert_eq!(value["layers"][0]["params"]["out_features"], 2);
    }
}
