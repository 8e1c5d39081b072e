//! Seeded weight initializers matching the Keras defaults.
//!
//! Every random initializer carries its own seed, so building the same layer
//! twice with the same configuration yields bit-identical weights.

use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Standard deviation of a unit normal truncated to [-2, 2].
const TRUNCATED_NORMAL_STD: f32 = 0.879_625_7;

/// Weight initializer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Initializer {
    /// All zeros.
    Zeros,
    /// All ones.
    Ones,
    /// Constant value.
    Constant(f32),
    /// Glorot normal: truncated normal with `std = sqrt(2 / (fan_in + fan_out))`.
    GlorotNormal {
        /// RNG seed
        seed: u64,
    },
    /// Glorot uniform: `U(-limit, limit)` with `limit = sqrt(6 / (fan_in + fan_out))`.
    GlorotUniform {
        /// RNG seed
        seed: u64,
    },
}

impl Initializer {
    /// Creates a tensor of the given shape.
    ///
    /// ```
    /// use ctr_layers::initializer::Initializer;
    ///
    /// let a = Initializer::GlorotNormal { seed: 1024 }.initialize(&[4, 1]);
    /// let b = Initializer::GlorotNormal { seed: 1024 }.initialize(&[4, 1]);
    /// assert_eq!(a, b);
    /// ```
    pub fn initialize(&self, shape: &[usize]) -> Tensor {
        match *self {
            Initializer::Zeros => Tensor::zeros(shape),
            Initializer::Ones => Tensor::ones(shape),
            Initializer::Constant(value) => Tensor::full(shape, value),
            Initializer::GlorotNormal { seed } => {
                let (fan_in, fan_out) = compute_fans(shape);
                let std = (2.0 / (fan_in + fan_out).max(1.0)).sqrt() / TRUNCATED_NORMAL_STD;
                let mut rng = StdRng::seed_from_u64(seed);
                fill(shape, || truncated_normal(&mut rng, std))
            }
            Initializer::GlorotUniform { seed } => {
                let (fan_in, fan_out) = compute_fans(shape);
                let limit = (6.0 / (fan_in + fan_out).max(1.0)).sqrt();
                let mut rng = StdRng::seed_from_u64(seed);
                fill(shape, || rng.gen_range(-limit..limit))
            }
        }
    }
}

fn fill<F: FnMut() -> f32>(shape: &[usize], sample: F) -> Tensor {
    Tensor::from_array(ArrayD::from_shape_simple_fn(IxDyn(shape), sample))
}

fn truncated_normal(rng: &mut StdRng, std: f32) -> f32 {
    // Resample until the draw lands within two standard deviations.
    loop {
        let z: f32 = rng.sample(StandardNormal);
        if (-2.0..=2.0).contains(&z) {
            return z * std;
        }
    }
}

/// Keras fan computation: for rank > 2 the leading axes form a receptive field.
fn compute_fans(shape: &[usize]) -> (f32, f32) {
    match shape.len() {
        0 => (1.0, 1.0),
        1 => (shape[0] as f32, shape[0] as f32),
        2 => (shape[0] as f32, shape[1] as f32),
        n => {
            let receptive: usize = shape[..n - 2].iter().product();
            let fan_in = (shape[n - 2] * receptive) as f32;
            let fan_out = (shape[n - 1] * receptive) as f32;
            (fan_in, fan_out)
        }
    }
}
