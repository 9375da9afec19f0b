mod act_fn;
mod dense;
mod loss;
mod optimizer;
mod sequential;

pub use act_fn::ActFn;
pub use dense::Dense;
pub use loss::{loss_fn, BinaryCrossEntropy, CategoricalCrossEntropy, LossFn, Mse};
pub use optimizer::{optimizer, Adam, Optimizer, RmsProp, Sgd};
pub use sequential::{Predictor, Sequential};
