//! Seeded inverted dropout.
//!
//! Each training call draws its mask from a fresh RNG seeded with the
//! configured seed and the number of previous calls, so a run replays the same
//! masks given the same seed and call sequence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::tensor::Tensor;

const STEP_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Dropout that zeroes a `rate` fraction of activations during training and
/// rescales the survivors by `1 / (1 - rate)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dropout {
    rate: f32,
    seed: u64,
    calls: u64,
}

impl Dropout {
    /// Creates a dropout with the given drop rate.
    pub fn new(rate: f32, seed: u64) -> Self {
        Self {
            rate,
            seed,
            calls: 0,
        }
    }

    /// Creates a dropout from a keep probability.
    pub fn from_keep_prob(keep_prob: f32, seed: u64) -> Self {
        Self::new(1.0 - keep_prob, seed)
    }

    /// Inference pass: the identity.
    pub fn forward(&self, input: &Tensor) -> Tensor {
        input.clone()
    }

    /// Training pass: applies a fresh mask.
    pub fn forward_train(&mut self, input: &Tensor) -> Tensor {
        if self.rate <= 0.0 {
            return input.clone();
        }
        let step = self.calls;
        self.calls += 1;
        let sub_seed = self.seed ^ step.wrapping_mul(STEP_MIX);
        trace!(seed = self.seed, step, sub_seed, "drawing dropout mask");

        let mut rng = StdRng::seed_from_u64(sub_seed);
        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        Tensor::from_array(input.as_array().mapv(|x| {
            if rng.gen::<f32>() < keep {
                x * scale
            } else {
                0.0
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_is_identity() {
        let mut dropout = Dropout::from_keep_prob(1.0, 1024);
        let x = Tensor::full(&[4, 4], 3.0);
        assert_eq!(dropout.forward_train(&x), x);
        assert_eq!(dropout.calls, 0);
    }

    #[test]
    fn test_inference_is_identity() {
        let dropout = Dropout::new(0.5, 1);
        let x = Tensor::ones(&[3, 3]);
        assert_eq!(dropout.forward(&x), x);
    }

    #[test]
    fn test_masks_replay_with_same_seed() {
        let x = Tensor::ones(&[8, 16]);
        let mut a = Dropout::new(0.5, 42);
        let mut b = Dropout::new(0.5, 42);

        let a1 = a.forward_train(&x);
        let a2 = a.forward_train(&x);
        assert_eq!(a1, b.forward_train(&x));
        assert_eq!(a2, b.forward_train(&x));
        // consecutive calls draw different masks
        assert_ne!(a1, a2);
    }

    #[test]
    fn test_survivors_are_rescaled() {
        let mut dropout = Dropout::new(0.75, 9);
        let out = dropout.forward_train(&Tensor::ones(&[64]));
        for v in out.to_vec() {
            assert!(v == 0.0 || (v - 4.0).abs() < 1e-6);
        }
    }
}
