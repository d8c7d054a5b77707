use crate::layers::Param;
use crate::optim::Optimizer;

pub struct Sgd {
    pub learning_rate: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Sgd {
        Sgd { learning_rate }
    }
}

impl Optimizer for Sgd {
    /// `w ← w - lr · ∂L/∂w`
    fn step(&mut self, params: Vec<&mut Param>) {
        for param in params {
            for (w, g) in param.value.data.iter_mut().zip(&param.grad.data) {
                *w -= self.learning_rate * g;
            }
        }
    }
}
