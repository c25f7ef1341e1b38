//! Boundary to the external inference engine
//!
//! The engine is opaque to this crate. A [`Predictor`] handle is internally
//! mutable and not safe to share between threads, and cloning one must not
//! run concurrently with any other operation on the handle being cloned.
//! [`crate::pool::PredictorPool`] enforces both rules.

use crate::error::{Result, RocketQaError};
use crate::tensor::Tensor;

/// One engine handle.
///
/// Inputs are positional: the i-th tensor feeds the i-th name returned by
/// [`Predictor::input_names`].
pub trait Predictor: Send + Sized {
    /// Everything the engine needs to build the main handle (model paths etc).
    type Config;

    /// Build the main handle directly from configuration.
    fn create(config: &Self::Config) -> Result<Self>;

    /// Structural clone of this handle sharing its loaded weights.
    fn try_clone(&self) -> Result<Self>;

    /// Input names in the order the engine expects them.
    fn input_names(&self) -> &[String];

    /// Run one inference. Outputs are returned in engine order.
    fn run(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>>;

    /// Run after checking that one tensor was supplied per declared input.
    fn infer(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>> {
        let expected = self.input_names().len();
        if inputs.len() != expected {
            return Err(RocketQaError::InvalidInput(format!(
                "got {} input tensors, engine declares {expected}: {:?}",
                inputs.len(),
                self.input_names()
            )));
        }
        self.run(inputs)
    }
}

/// Pick output `index`, failing instead of panicking when the engine returned fewer.
pub fn take_output(mut outputs: Vec<Tensor>, index: usize) -> Result<Tensor> {
    if index >= outputs.len() {
        return Err(RocketQaError::Predictor(format!(
            "engine returned {} outputs, need index {index}",
            outputs.len()
        )));
    }
    Ok(outputs.swap_remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorData;

    struct Echo {
        names: Vec<String>,
    }

    impl Predictor for Echo {
        type Config = usize;

        fn create(inputs: &usize) -> Result<Self> {
            Ok(Self {
                names: (0..*inputs).map(|i| format!("input_{i}")).collect(),
            })
        }

        fn try_clone(&self) -> Result<Self> {
            Ok(Self {
                names: self.names.clone(),
            })
        }

        fn input_names(&self) -> &[String] {
            &self.names
        }

        fn run(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>> {
            Ok(inputs)
        }
    }

    fn scalar(v: f32) -> Tensor {
        Tensor::new(vec![1], TensorData::F32(vec![v])).expect("valid")
    }

    #[test]
    fn test_infer_checks_input_count() {
        let mut p = Echo::create(&2).expect("create");
        let err = p.infer(vec![scalar(1.0)]).unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("input_1"));

        let out = p.infer(vec![scalar(1.0), scalar(2.0)]).expect("infer");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_take_output() {
        let outputs = vec![scalar(1.0), scalar(2.0)];
        let t = take_output(outputs, 1).expect("present");
        assert_eq!(t.as_f32().expect("f32"), &[2.0]);

        assert!(matches!(
            take_output(vec![scalar(1.0)], 1),
            Err(RocketQaError::Predictor(_))
        ));
    }
}
