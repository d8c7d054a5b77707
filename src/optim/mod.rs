pub mod adam;
pub mod optimizer_type;
pub mod rmsprop;
pub mod sgd;

pub use adam::Adam;
pub use optimizer_type::OptimizerType;
pub use rmsprop::RmsProp;
pub use sgd::Sgd;

use crate::layers::Param;

/// Applies one update to every parameter from its accumulated gradient.
///
/// Parameters arrive in the model's stable order, so stateful optimizers can
/// key their moment buffers by position.
pub trait Optimizer: Send {
    fn step(&mut self, params: Vec<&mut Param>);
}
