use std::collections::BTreeMap;

use crate::activation::activation::ActivationFunction;
use crate::error::{ArchitectureError, ArchitectureResult};
use crate::layers::{ActivationLayer, AvgPool2d, Conv2d, Linear, MaxPool2d, Module};
use crate::network::model::ModelEntity;
use crate::network::spec::{LayerDescriptor, LayerKind, ModelArchitecture, ParamValue};

/// Constructs a module from a descriptor, or explains why the params are unusable.
pub type LayerBuilder = fn(&LayerDescriptor) -> Result<Box<dyn Module>, String>;

/// Explicit mapping from layer kind to builder function.
///
/// `LayerRegistry::builtin()` (also `Default`) knows every kind in the
/// catalog; `LayerRegistry::empty()` plus `register` builds restricted
/// registries, e.g. for deployments that disallow convolutions.
#[derive(Clone)]
pub struct LayerRegistry {
    builders: BTreeMap<LayerKind, LayerBuilder>,
}

impl LayerRegistry {
    pub fn empty() -> LayerRegistry {
        LayerRegistry { builders: BTreeMap::new() }
    }

    pub fn builtin() -> LayerRegistry {
        let mut registry = LayerRegistry::empty();
        registry
            .register(LayerKind::Conv2d, build_conv2d)
            .register(LayerKind::MaxPool2d, build_max_pool2d)
            .register(LayerKind::AvgPool2d, build_avg_pool2d)
            .register(LayerKind::Linear, build_linear)
            .register(LayerKind::Relu, build_relu)
            .register(LayerKind::Sigmoid, build_sigmoid)
            .register(LayerKind::Tanh, build_tanh);
        registry
    }

    pub fn register(&mut self, kind: LayerKind, builder: LayerBuilder) -> &mut LayerRegistry {
        self.builders.insert(kind, builder);
        self
    }

    pub fn contains(&self, kind: LayerKind) -> bool {
        self.builders.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<LayerKind> {
        self.builders.keys().copied().collect()
    }

    /// Builds the module for the descriptor at position `index`.
    pub fn build(&self, index: usize, descriptor: &LayerDescriptor) -> ArchitectureResult<Box<dyn Module>> {
        let builder = self.builders.get(&descriptor.kind)
            .ok_or_else(|| ArchitectureError::UnsupportedLayerKind(descriptor.kind.to_string()))?;
        builder(descriptor).map_err(|reason| ArchitectureError::InvalidLayerParams {
            index,
            kind: descriptor.kind,
            reason,
        })
    }

    /// Builds every descriptor in order. Nothing is kept if any layer fails.
    pub fn build_model(&self, architecture: &ModelArchitecture) -> ArchitectureResult<ModelEntity> {
        let modules = architecture.layers.iter()
            .enumerate()
            .map(|(i, d)| self.build(i, d))
            .collect::<ArchitectureResult<Vec<_>>>()?;
        Ok(ModelEntity::from_parts(architecture.clone(), modules))
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        LayerRegistry::builtin()
    }
}

// ---------------------------------------------------------------------------
// Param access
// ---------------------------------------------------------------------------

/// Typed view over a descriptor's params for one builder.
struct Params<'a> {
    params: &'a BTreeMap<String, ParamValue>,
}

impl<'a> Params<'a> {
    /// Rejects keys the builder does not understand.
    fn accept(descriptor: &'a LayerDescriptor, known: &[&str]) -> Result<Params<'a>, String> {
        if let Some(key) = descriptor.params.keys().find(|k| !known.contains(&k.as_str())) {
            return Err(format!("unexpected param '{}'", key));
        }
        Ok(Params { params: &descriptor.params })
    }

    fn integer(&self, key: &str) -> Result<Option<i64>, String> {
        match self.params.get(key) {
            None => Ok(None),
            Some(ParamValue::Int(v)) => Ok(Some(*v)),
            Some(ParamValue::UInt(v)) => Err(format!("'{}' is out of range, got {}", key, v)),
            Some(other) => Err(format!("'{}' must be an integer, got {:?}", key, other)),
        }
    }

    /// A required strictly positive integer.
    fn size(&self, key: &str) -> Result<usize, String> {
        match self.integer(key)? {
            Some(v) if v > 0 => Ok(v as usize),
            Some(v) => Err(format!("'{}' must be positive, got {}", key, v)),
            None => Err(format!("missing required param '{}'", key)),
        }
    }

    /// An optional strictly positive integer.
    fn size_or(&self, key: &str, default: usize) -> Result<usize, String> {
        match self.integer(key)? {
            None => Ok(default),
            Some(_) => self.size(key),
        }
    }

    /// An optional non-negative integer.
    fn count_or(&self, key: &str, default: usize) -> Result<usize, String> {
        match self.integer(key)? {
            None => Ok(default),
            Some(v) if v >= 0 => Ok(v as usize),
            Some(v) => Err(format!("'{}' must not be negative, got {}", key, v)),
        }
    }

    fn flag_or(&self, key: &str, default: bool) -> Result<bool, String> {
        match self.params.get(key) {
            None => Ok(default),
            Some(ParamValue::Bool(b)) => Ok(*b),
            Some(other) => Err(format!("'{}' must be a boolean, got {:?}", key, other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

fn build_conv2d(d: &LayerDescriptor) -> Result<Box<dyn Module>, String> {
    let p = Params::accept(d, &["in_channels", "out_channels", "kernel_size", "stride", "padding", "bias"])?;
    Ok(Box::new(Conv2d::new(
        p.size("in_channels")?,
        p.size("out_channels")?,
        p.size("kernel_size")?,
        p.size_or("stride", 1)?,
        p.count_or("padding", 0)?,
        p.flag_or("bias", true)?,
    )))
}

/// `(kernel, stride, padding)`; stride defaults to the kernel size.
fn pool_window(d: &LayerDescriptor) -> Result<(usize, usize, usize), String> {
    let p = Params::accept(d, &["kernel_size", "stride", "padding"])?;
    let kernel = p.size("kernel_size")?;
    let stride = p.size_or("stride", kernel)?;
    let padding = p.count_or("padding", 0)?;
    if padding * 2 > kernel {
        return Err(format!(
            "padding {} should be at most half of kernel size {}",
            padding, kernel
        ));
    }
    Ok((kernel, stride, padding))
}

fn build_max_pool2d(d: &LayerDescriptor) -> Result<Box<dyn Module>, String> {
    let (kernel, stride, padding) = pool_window(d)?;
    Ok(Box::new(MaxPool2d::new(kernel, stride, padding)))
}

fn build_avg_pool2d(d: &LayerDescriptor) -> Result<Box<dyn Module>, String> {
    let (kernel, stride, padding) = pool_window(d)?;
    Ok(Box::new(AvgPool2d::new(kernel, stride, padding)))
}

fn build_linear(d: &LayerDescriptor) -> Result<Box<dyn Module>, String> {
    let p = Params::accept(d, &["in_features", "out_features", "bias"])?;
    Ok(Box::new(Linear::new(
        p.size("in_features")?,
        p.size("out_features")?,
        p.flag_or("bias", true)?,
    )))
}

// Activations take no arguments; whatever params they carry are kept in the
// descriptor for round-tripping but ignored here.
fn build_relu(_: &LayerDescriptor) -> Result<Box<dyn Module>, String> {
    Ok(Box::new(ActivationLayer::new(ActivationFunction::Relu)))
}

fn build_sigmoid(_: &LayerDescriptor) -> Result<Box<dyn Module>, String> {
    Ok(Box::new(ActivationLayer::new(ActivationFunction::Sigmoid)))
}

fn build_tanh(_: &LayerDescriptor) -> Result<Box<dyn Module>, String> {
    Ok(Box::new(ActivationLayer::new(ActivationFunction::Tanh)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(in_f: i64, out_f: i64) -> LayerDescriptor {
        LayerDescriptor::new(LayerKind::Linear)
            .with("in_features", in_f)
            .with("out_features", out_f)
    }

    #[test]
    fn builtin_registry_covers_catalog() {
        let registry = LayerRegistry::builtin();
        assert_eq!(registry.kinds(), LayerKind::ALL.to_vec());
    }

    #[test]
    fn builds_each_kind() {
        let registry = LayerRegistry::builtin();
        let descriptors = vec![
            LayerDescriptor::new(LayerKind::Conv2d)
                .with("in_channels", 1).with("out_channels", 2).with("kernel_size", 3),
            LayerDescriptor::new(LayerKind::MaxPool2d).with("kernel_size", 2),
            LayerDescriptor::new(LayerKind::AvgPool2d).with("kernel_size", 2).with("stride", 1),
            linear(4, 2),
            LayerDescriptor::new(LayerKind::Relu),
            LayerDescriptor::new(LayerKind::Sigmoid),
            LayerDescriptor::new(LayerKind::Tanh),
        ];
        for (i, d) in descriptors.iter().enumerate() {
            let module = registry.build(i, d).unwrap();
            assert_eq!(module.kind(), d.kind);
        }
    }

    #[test]
    fn missing_required_param_is_invalid() {
        let d = LayerDescriptor::new(LayerKind::Linear).with("in_features", 4);
        let err = LayerRegistry::builtin().build(0, &d).unwrap_err();
        match err {
            ArchitectureError::InvalidLayerParams { index, kind, reason } => {
                assert_eq!(index, 0);
                assert_eq!(kind, LayerKind::Linear);
                assert!(reason.contains("out_features"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_scalar_type_is_invalid() {
        let d = LayerDescriptor::new(LayerKind::Linear)
            .with("in_features", "four")
            .with("out_features", 2);
        assert!(matches!(
            LayerRegistry::builtin().build(0, &d),
            Err(ArchitectureError::InvalidLayerParams { .. })
        ));
    }

    #[test]
    fn integer_beyond_i64_is_out_of_range() {
        let mut d = linear(4, 2);
        d.params.insert("out_features".into(), ParamValue::UInt(u64::MAX));
        let err = LayerRegistry::builtin().build(0, &d).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{}", err);
    }

    #[test]
    fn unknown_param_on_parametric_layer_is_invalid() {
        let d = linear(4, 2).with("dropout", 0.5);
        assert!(LayerRegistry::builtin().build(0, &d).is_err());
    }

    #[test]
    fn oversized_pool_padding_is_invalid() {
        let d = LayerDescriptor::new(LayerKind::MaxPool2d).with("kernel_size", 2).with("padding", 2);
        assert!(LayerRegistry::builtin().build(0, &d).is_err());
    }

    #[test]
    fn activation_params_are_ignored() {
        let d = LayerDescriptor::new(LayerKind::Relu).with("inplace", true);
        assert!(LayerRegistry::builtin().build(0, &d).is_ok());
    }

    #[test]
    fn unregistered_kind_fails_without_partial_model() {
        let mut registry = LayerRegistry::empty();
        registry.register(LayerKind::Linear, build_linear);
        let arch = ModelArchitecture::new(vec![
            linear(4, 2),
            LayerDescriptor::new(LayerKind::Relu),
        ]);
        let err = registry.build_model(&arch).unwrap_err();
        assert!(matches!(err, ArchitectureError::UnsupportedLayerKind(tag) if tag == "Relu"));
    }

    #[test]
    fn empty_architecture_builds_identity_model() {
        let mut model = LayerRegistry::builtin().build_model(&ModelArchitecture::default()).unwrap();
        assert!(model.is_empty());
        let x = crate::math::tensor::Tensor::from_slice(&[1.0, 2.0]);
        assert_eq!(model.forward(&x).unwrap(), x);
    }
}
