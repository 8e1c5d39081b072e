//! Activation functions.
//!
//! An [`Activation`] is either one of the named element-wise functions in
//! [`ActivationKind`] or a caller-supplied callable. Layers resolve it once,
//! at build time, into an [`ActivationFn`] and apply that on every call.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LayerError;
use crate::tensor::Tensor;

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;

/// Named element-wise activations, spelled the way Keras spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    /// Identity
    Linear,
    /// Rectified Linear Unit
    Relu,
    /// Logistic sigmoid
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
    /// `ln(1 + e^x)`
    Softplus,
    /// `x / (1 + |x|)`
    Softsign,
    /// Exponential Linear Unit with alpha = 1
    Elu,
    /// Scaled ELU
    Selu,
    /// Piecewise-linear sigmoid approximation
    HardSigmoid,
    /// `e^x`
    Exponential,
}

impl ActivationKind {
    /// All supported kinds.
    pub const ALL: [ActivationKind; 10] = [
        Self::Linear,
        Self::Relu,
        Self::Sigmoid,
        Self::Tanh,
        Self::Softplus,
        Self::Softsign,
        Self::Elu,
        Self::Selu,
        Self::HardSigmoid,
        Self::Exponential,
    ];

    /// Returns the Keras name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Softplus => "softplus",
            Self::Softsign => "softsign",
            Self::Elu => "elu",
            Self::Selu => "selu",
            Self::HardSigmoid => "hard_sigmoid",
            Self::Exponential => "exponential",
        }
    }

    /// Returns the scalar function for this kind.
    pub fn resolve(self) -> fn(f32) -> f32 {
        match self {
            Self::Linear => |x| x,
            Self::Relu => |x| x.max(0.0),
            Self::Sigmoid => |x| 1.0 / (1.0 + (-x).exp()),
            Self::Tanh => f32::tanh,
            Self::Softplus => |x| {
                // ln(1 + e^x) without overflow for large x
                x.max(0.0) + (-x.abs()).exp().ln_1p()
            },
            Self::Softsign => |x| x / (1.0 + x.abs()),
            Self::Elu => |x| if x > 0.0 { x } else { x.exp_m1() },
            Self::Selu => |x| {
                if x > 0.0 {
                    SELU_SCALE * x
                } else {
                    SELU_SCALE * SELU_ALPHA * x.exp_m1()
                }
            },
            Self::HardSigmoid => |x| (0.2 * x + 0.5).clamp(0.0, 1.0),
            Self::Exponential => f32::exp,
        }
    }
}

impl FromStr for ActivationKind {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| LayerError::config(format!("unknown activation '{}'", s)))
    }
}

impl fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type TensorFn = dyn Fn(&Tensor) -> Tensor + Send + Sync;

/// A resolved activation, ready to apply.
#[derive(Clone)]
pub struct ActivationFn(Arc<TensorFn>);

impl ActivationFn {
    /// Applies the activation.
    pub fn apply(&self, input: &Tensor) -> Tensor {
        (self.0)(input)
    }
}

impl fmt::Debug for ActivationFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActivationFn")
    }
}

/// Activation selected by name or supplied as a callable.
///
/// Serializes as its name. Only named activations can be deserialized; a
/// custom activation must be supplied again with [`Activation::custom`].
///
/// # Example
///
/// ```
/// use ctr_layers::activation::{Activation, ActivationKind};
/// use ctr_layers::tensor::Tensor;
///
/// let relu = Activation::from_name("relu").unwrap();
/// assert_eq!(relu, Activation::Named(ActivationKind::Relu));
///
/// let double = Activation::custom("double", |t: &Tensor| t.scale(2.0));
/// let out = double.resolve().apply(&Tensor::ones(&[2]));
/// assert_eq!(out.to_vec(), vec![2.0, 2.0]);
/// ```
#[derive(Clone)]
pub enum Activation {
    /// One of the built-in element-wise functions.
    Named(ActivationKind),
    /// A caller-supplied function, identified by `name` in exported configs.
    Custom {
        /// Name written to exported configs
        name: String,
        /// The function itself
        func: Arc<TensorFn>,
    },
}

impl Activation {
    /// Looks up a named activation.
    pub fn from_name(name: &str) -> Result<Self, LayerError> {
        name.parse().map(Self::Named)
    }

    /// Wraps a custom callable.
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Tensor) -> Tensor + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Returns the name written to exported configs.
    pub fn name(&self) -> &str {
        match self {
            Self::Named(kind) => kind.name(),
            Self::Custom { name, .. } => name,
        }
    }

    /// Resolves into a concrete callable.
    pub fn resolve(&self) -> ActivationFn {
        match self {
            Self::Named(kind) => {
                let f = kind.resolve();
                ActivationFn(Arc::new(move |t: &Tensor| t.map(f)))
            }
            Self::Custom { func, .. } => ActivationFn(Arc::clone(func)),
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Self::Named(ActivationKind::Relu)
    }
}

impl From<ActivationKind> for Activation {
    fn from(kind: ActivationKind) -> Self {
        Self::Named(kind)
    }
}

impl PartialEq for Activation {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Named(a), Self::Named(b)) => a == b,
            (Self::Custom { name: a, func: f }, Self::Custom { name: b, func: g }) => {
                a == b && Arc::ptr_eq(f, g)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(kind) => write!(f, "Named({})", kind),
            Self::Custom { name, .. } => write!(f, "Custom({})", name),
        }
    }
}

impl Serialize for Activation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Activation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Activation::from_name(&name).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(kind: ActivationKind, x: f32) -> f32 {
        kind.resolve()(x)
    }

    #[test]
    fn test_named_values() {
        assert_eq!(apply(ActivationKind::Sigmoid, 0.0), 0.5);
        assert_eq!(apply(ActivationKind::Relu, -3.0), 0.0);
        assert_eq!(apply(ActivationKind::Linear, -3.0), -3.0);
        assert_eq!(apply(ActivationKind::HardSigmoid, 10.0), 1.0);
        assert!((apply(ActivationKind::Softplus, 0.0) - 2f32.ln()).abs() < 1e-6);
        assert!((apply(ActivationKind::Softplus, 100.0) - 100.0).abs() < 1e-4);
        assert!((apply(ActivationKind::Elu, -1.0) - (-1f32).exp_m1()).abs() < 1e-6);
        assert_eq!(apply(ActivationKind::Softsign, 1.0), 0.5);
    }

    #[test]
    fn test_name_round_trip() {
        for kind in ActivationKind::ALL {
            assert_eq!(kind.name().parse::<ActivationKind>().unwrap(), kind);
        }
        assert!("swishy".parse::<ActivationKind>().is_err());
    }

    #[test]
    fn test_serde_uses_names() {
        let json = serde_json::to_string(&Activation::Named(ActivationKind::HardSigmoid)).unwrap();
        assert_eq!(json, "\"hard_sigmoid\"");

        let back: Activation = serde_json::from_str("\"tanh\"").unwrap();
        assert_eq!(back, Activation::Named(ActivationKind::Tanh));

        let custom = Activation::custom("dice", |t: &Tensor| t.clone());
        assert_eq!(serde_json::to_string(&custom).unwrap(), "\"dice\"");
        assert!(serde_json::from_str::<Activation>("\"dice\"").is_err());
    }

    #[test]
    fn test_resolve_applies_elementwise() {
        let input = Tensor::from_data(&[3], vec![-1.0, 0.0, 2.0]).unwrap();
        let out = Activation::from_name("relu").unwrap().resolve().apply(&input);
        assert_eq!(out.to_vec(), vec![0.0, 0.0, 2.0]);
    }
}
