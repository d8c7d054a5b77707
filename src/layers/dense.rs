use crate::error::ShapeError;
use crate::layers::{Module, Param};
use crate::math::tensor::Tensor;
use crate::network::spec::LayerKind;

/// Fully connected layer applied over the last axis: `y = x·Wᵀ + b`.
///
/// `weight` is stored `[out_features, in_features]` so snapshots line up
/// with the usual `layers.<i>.weight` layout.
#[derive(Debug)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    pub weight: Param,
    pub bias: Option<Param>,
    cached_input: Option<Tensor>, // input flattened to [rows, in_features]
    input_shape: Vec<usize>,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, bias: bool) -> Linear {
        let bound = 1.0 / (in_features as f64).sqrt();
        Linear {
            in_features,
            out_features,
            weight: Param::new(Tensor::uniform(&[out_features, in_features], bound)),
            bias: bias.then(|| Param::new(Tensor::uniform(&[out_features], bound))),
            cached_input: None,
            input_shape: Vec::new(),
        }
    }
}

impl Module for Linear {
    fn kind(&self) -> LayerKind {
        LayerKind::Linear
    }

    fn forward(&mut self, input: &Tensor) -> Result<Tensor, ShapeError> {
        let last = input.shape.last().copied().unwrap_or(0);
        if input.ndim() == 0 || last != self.in_features {
            let mut expected = input.shape.clone();
            match expected.last_mut() {
                Some(d) => *d = self.in_features,
                None => expected.push(self.in_features),
            }
            return Err(ShapeError::Mismatch { op: "linear", expected, actual: input.shape.clone() });
        }

        let rows = input.len() / self.in_features;
        let x = input.reshape(&[rows, self.in_features])?;
        let mut z = x.matmul(&self.weight.value.transpose()?)?;
        if let Some(bias) = &self.bias {
            for r in 0..rows {
                let out_row = &mut z.data[r * self.out_features..(r + 1) * self.out_features];
                for (o, b) in out_row.iter_mut().zip(&bias.value.data) {
                    *o += b;
                }
            }
        }

        let mut out_shape = input.shape.clone();
        if let Some(d) = out_shape.last_mut() {
            *d = self.out_features;
        }
        self.input_shape = input.shape.clone();
        self.cached_input = Some(x);
        z.reshape(&out_shape)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<Tensor, ShapeError> {
        let x = self.cached_input.as_ref()
            .ok_or(ShapeError::NoForwardCache { op: "linear" })?;
        let rows = x.shape[0];
        let g = grad_output.reshape(&[rows, self.out_features])?;

        // dW = gᵀ·x, db = Σ_rows g, dx = g·W
        let w_grad = g.transpose()?.matmul(x)?;
        self.weight.grad.add_scaled(&w_grad, 1.0)?;
        if let Some(bias) = &mut self.bias {
            for r in 0..rows {
                for (acc, v) in bias.grad.data.iter_mut().zip(g.row(r)) {
                    *acc += v;
                }
            }
        }

        let dx = g.matmul(&self.weight.value)?;
        dx.reshape(&self.input_shape)
    }

    fn parameters(&self) -> Vec<(&'static str, &Param)> {
        let mut params = vec![("weight", &self.weight)];
        if let Some(bias) = &self.bias {
            params.push(("bias", bias));
        }
        params
    }

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Param)> {
        let mut params = vec![("weight", &mut self.weight)];
        if let Some(bias) = &mut self.bias {
            params.push(("bias", bias));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_linear() -> Linear {
        let mut layer = Linear::new(2, 1, true);
        layer.weight.value = Tensor::from_vec(&[1, 2], vec![2.0, -1.0]).unwrap();
        layer.bias.as_mut().unwrap().value = Tensor::from_vec(&[1], vec![0.5]).unwrap();
        layer
    }

    #[test]
    fn forward_applies_weights_and_bias() {
        let mut layer = fixed_linear();
        let x = Tensor::from_rows(&[vec![1.0, 1.0], vec![3.0, 2.0]]).unwrap();
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.shape, vec![2, 1]);
        assert_eq!(y.data, vec![1.5, 4.5]);
    }

    #[test]
    fn backward_accumulates_gradients() {
        let mut layer = fixed_linear();
        let x = Tensor::from_rows(&[vec![1.0, 1.0], vec![3.0, 2.0]]).unwrap();
        layer.forward(&x).unwrap();
        let dx = layer.backward(&Tensor::from_rows(&[vec![1.0], vec![1.0]]).unwrap()).unwrap();

        assert_eq!(layer.weight.grad.data, vec![4.0, 3.0]);
        assert_eq!(layer.bias.as_ref().unwrap().grad.data, vec![2.0]);
        assert_eq!(dx.data, vec![2.0, -1.0, 2.0, -1.0]);
    }

    #[test]
    fn wrong_feature_count_is_a_shape_error() {
        let mut layer = Linear::new(4, 2, true);
        let x = Tensor::zeros(&[3, 5]);
        assert!(matches!(layer.forward(&x), Err(ShapeError::Mismatch { op: "linear", .. })));
    }

    #[test]
    fn acts_on_last_axis_of_higher_rank_input() {
        let mut layer = Linear::new(3, 2, false);
        let y = layer.forward(&Tensor::zeros(&[2, 4, 3])).unwrap();
        assert_eq!(y.shape, vec![2, 4, 2]);
    }
}
