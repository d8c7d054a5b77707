use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::error::{ArchitectureError, ArchitectureResult, ShapeError};
use crate::layers::{Module, Param};
use crate::math::tensor::Tensor;
use crate::network::registry::LayerRegistry;
use crate::network::spec::ModelArchitecture;

/// How `predict` should interpret the network output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Arg-max class index per row.
    Classification,
    /// Raw output values.
    Regression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Classes(Vec<usize>),
    Values(Tensor),
}

/// A compiled, executable model: constructed modules in order, plus the
/// architecture they were built from.
///
/// Parameters live inside the modules. They are mutated in place by
/// training and exported/imported as a named snapshot (`state_dict`).
#[derive(Debug)]
pub struct ModelEntity {
    architecture: ModelArchitecture,
    modules: Vec<Box<dyn Module>>,
}

impl ModelEntity {
    /// Builds with the built-in registry.
    pub fn build(architecture: &ModelArchitecture) -> ArchitectureResult<ModelEntity> {
        LayerRegistry::builtin().build_model(architecture)
    }

    pub fn from_json(json: &str) -> ArchitectureResult<ModelEntity> {
        ModelEntity::build(&ModelArchitecture::from_json(json)?)
    }

    pub(crate) fn from_parts(architecture: ModelArchitecture, modules: Vec<Box<dyn Module>>) -> ModelEntity {
        ModelEntity { architecture, modules }
    }

    /// The architecture this entity was built from, verbatim.
    pub fn to_spec(&self) -> ModelArchitecture {
        self.architecture.clone()
    }

    pub fn architecture(&self) -> &ModelArchitecture {
        &self.architecture
    }

    pub fn modules(&self) -> &[Box<dyn Module>] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Forward pass; each module caches what its backward step needs.
    pub fn forward(&mut self, input: &Tensor) -> Result<Tensor, ShapeError> {
        let mut current = input.clone();
        for module in &mut self.modules {
            current = module.forward(&current)?;
        }
        Ok(current)
    }

    /// Backward pass from ∂L/∂output; accumulates into every `Param::grad`.
    pub fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor, ShapeError> {
        let mut delta = grad_output.clone();
        for module in self.modules.iter_mut().rev() {
            delta = module.backward(&delta)?;
        }
        Ok(delta)
    }

    pub fn zero_grad(&mut self) {
        for param in self.parameters_mut() {
            param.zero_grad();
        }
    }

    /// Parameters in a stable order (layer index, then weight before bias).
    pub fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.modules.iter_mut()
            .flat_map(|m| m.parameters_mut().into_iter().map(|(_, p)| p))
            .collect()
    }

    /// Parameters keyed by layer path, e.g. `layers.0.weight`.
    pub fn named_parameters(&self) -> Vec<(String, &Param)> {
        self.modules.iter()
            .enumerate()
            .flat_map(|(i, m)| {
                m.parameters().into_iter()
                    .map(move |(name, p)| (format!("layers.{}.{}", i, name), p))
            })
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.named_parameters().iter().map(|(_, p)| p.value.len()).sum()
    }

    /// Snapshot of every parameter tensor keyed by layer path.
    pub fn state_dict(&self) -> BTreeMap<String, Tensor> {
        self.named_parameters().into_iter()
            .map(|(name, p)| (name, p.value.clone()))
            .collect()
    }

    /// Replaces parameter values from a snapshot.
    ///
    /// Strict: every parameter must be present with the same shape and the
    /// snapshot may not carry extra keys. Nothing is modified on failure.
    pub fn load_state_dict(&mut self, state: &BTreeMap<String, Tensor>) -> ArchitectureResult<()> {
        let expected: BTreeMap<String, Vec<usize>> = self.named_parameters().into_iter()
            .map(|(name, p)| (name, p.value.shape.clone()))
            .collect();

        for (name, shape) in &expected {
            match state.get(name) {
                None => return Err(ArchitectureError::WeightMismatch(format!("missing key '{}'", name))),
                Some(t) if &t.shape != shape => {
                    return Err(ArchitectureError::WeightMismatch(format!(
                        "'{}' has shape {:?}, model expects {:?}",
                        name, t.shape, shape
                    )));
                }
                Some(_) => {}
            }
        }
        if let Some(extra) = state.keys().find(|k| !expected.contains_key(*k)) {
            return Err(ArchitectureError::WeightMismatch(format!("unexpected key '{}'", extra)));
        }

        for (i, module) in self.modules.iter_mut().enumerate() {
            for (name, param) in module.parameters_mut() {
                if let Some(t) = state.get(&format!("layers.{}.{}", i, name)) {
                    param.value = t.clone();
                    param.zero_grad();
                }
            }
        }
        Ok(())
    }

    /// Inference helper: runs a forward pass and interprets the output.
    pub fn predict(&mut self, input: &Tensor, task: TaskKind) -> Result<Prediction, ShapeError> {
        let output = self.forward(input)?;
        Ok(match task {
            TaskKind::Classification => Prediction::Classes(output.argmax_rows()),
            TaskKind::Regression => Prediction::Values(output),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::spec::{LayerDescriptor, LayerKind};

    fn mlp() -> ModelArchitecture {
        ModelArchitecture::new(vec![
            LayerDescriptor::new(LayerKind::Linear).with("in_features", 4).with("out_features", 3),
            LayerDescriptor::new(LayerKind::Tanh),
            LayerDescriptor::new(LayerKind::Linear).with("in_features", 3).with("out_features", 2),
        ])
    }

    #[test]
    fn entity_can_move_between_threads() {
        fn assert_send<T: Send>() {}
        assert_send::<ModelEntity>();
    }

    #[test]
    fn to_spec_returns_the_original_architecture() {
        let arch = mlp();
        let model = ModelEntity::build(&arch).unwrap();
        assert_eq!(model.len(), 3);
        assert_eq!(model.to_spec(), arch);
        assert_eq!(ModelEntity::build(&model.to_spec()).unwrap().to_spec(), arch);
    }

    #[test]
    fn adjacent_shape_mismatch_surfaces_from_forward() {
        let arch = ModelArchitecture::new(vec![
            LayerDescriptor::new(LayerKind::Linear).with("in_features", 4).with("out_features", 3),
            LayerDescriptor::new(LayerKind::Linear).with("in_features", 5).with("out_features", 2),
        ]);
        let mut model = ModelEntity::build(&arch).unwrap();
        assert!(model.forward(&Tensor::zeros(&[1, 4])).is_err());
    }

    #[test]
    fn state_dict_uses_layer_paths() {
        let model = ModelEntity::build(&mlp()).unwrap();
        let keys: Vec<_> = model.state_dict().into_keys().collect();
        assert_eq!(keys, vec!["layers.0.bias", "layers.0.weight", "layers.2.bias", "layers.2.weight"]);
        assert_eq!(model.parameter_count(), 4 * 3 + 3 + 3 * 2 + 2);
    }

    #[test]
    fn load_state_dict_copies_values() {
        let source = ModelEntity::build(&mlp()).unwrap();
        let mut target = ModelEntity::build(&mlp()).unwrap();
        target.load_state_dict(&source.state_dict()).unwrap();
        assert_eq!(target.state_dict(), source.state_dict());
    }

    #[test]
    fn load_state_dict_is_strict() {
        let mut model = ModelEntity::build(&mlp()).unwrap();
        let before = model.state_dict();

        let mut missing = before.clone();
        missing.remove("layers.2.bias");
        assert!(model.load_state_dict(&missing).is_err());

        let mut reshaped = before.clone();
        reshaped.insert("layers.0.weight".into(), Tensor::zeros(&[4, 3]));
        assert!(model.load_state_dict(&reshaped).is_err());

        let mut extra = before.clone();
        extra.insert("layers.1.weight".into(), Tensor::zeros(&[1]));
        assert!(model.load_state_dict(&extra).is_err());

        assert_eq!(model.state_dict(), before);
    }

    #[test]
    fn classification_prediction_is_argmax() {
        let arch = ModelArchitecture::new(vec![
            LayerDescriptor::new(LayerKind::Linear).with("in_features", 2).with("out_features", 2),
        ]);
        let mut model = ModelEntity::build(&arch).unwrap();
        let mut state = model.state_dict();
        state.insert("layers.0.weight".into(), Tensor::from_vec(&[2, 2], vec![1.0, 0.0, 0.0, 1.0]).unwrap());
        state.insert("layers.0.bias".into(), Tensor::zeros(&[2]));
        model.load_state_dict(&state).unwrap();

        let x = Tensor::from_rows(&[vec![3.0, 1.0], vec![0.0, 2.0]]).unwrap();
        assert_eq!(model.predict(&x, TaskKind::Classification).unwrap(), Prediction::Classes(vec![0, 1]));
    }
}
