use crate::activation::activation::ActivationFunction;
use crate::error::ShapeError;
use crate::layers::Module;
use crate::math::tensor::Tensor;
use crate::network::spec::LayerKind;

/// Stateless element-wise activation usable at any position in the stack.
#[derive(Debug)]
pub struct ActivationLayer {
    pub activator: ActivationFunction,
    pre_activation: Option<Tensor>, // needed for the derivative
}

impl ActivationLayer {
    pub fn new(activator: ActivationFunction) -> ActivationLayer {
        ActivationLayer { activator, pre_activation: None }
    }
}

impl Module for ActivationLayer {
    fn kind(&self) -> LayerKind {
        match self.activator {
            ActivationFunction::Relu => LayerKind::Relu,
            ActivationFunction::Sigmoid => LayerKind::Sigmoid,
            ActivationFunction::Tanh => LayerKind::Tanh,
        }
    }

    fn forward(&mut self, input: &Tensor) -> Result<Tensor, ShapeError> {
        let out = input.map(|x| self.activator.function(x));
        self.pre_activation = Some(input.clone());
        Ok(out)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor, ShapeError> {
        let z = self.pre_activation.as_ref()
            .ok_or(ShapeError::NoForwardCache { op: "activation" })?;
        // δ = ∂L/∂a ⊙ σ'(z)
        grad_output.zip_map(z, "activation backward", |g, x| g * self.activator.derivative(x))
    }
}
