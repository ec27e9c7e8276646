//! Parameter values and the distributions they were sampled from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A concrete sampled parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean choice.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Categorical string value.
    Str(String),
}

impl ParamValue {
    /// Quoted form used inside distribution descriptions.
    fn repr(&self) -> String {
        match self {
            Self::Str(s) => format!("'{s}'"),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => f.write_str(&float_text(*v)),
            Self::Str(v) => f.write_str(v),
        }
    }
}

/// Shortest round-trip text of a float as tracking backends display it.
///
/// Whole numbers keep their decimal point (`2.0`). Exponents in `-4..16`
/// are written positionally, anything else in scientific form with a
/// signed two-digit exponent (`1e-06`, `1.5e+16`).
#[allow(clippy::cast_sign_loss)]
pub(crate) fn float_text(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "-1.5e-5"
    let sci = format!("{v:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let (sign, mantissa) = mantissa
        .strip_prefix('-')
        .map_or(("", mantissa), |m| ("-", m));

    if !(-4..16).contains(&exp) {
        let exp_sign = if exp < 0 { '-' } else { '+' };
        return format!("{sign}{mantissa}e{exp_sign}{:02}", exp.abs());
    }

    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let text = if exp >= 0 {
        let int_len = exp as usize + 1;
        if digits.len() <= int_len {
            format!("{digits}{}.0", "0".repeat(int_len - digits.len()))
        } else {
            format!("{}.{}", &digits[..int_len], &digits[int_len..])
        }
    } else {
        format!("0.{}{digits}", "0".repeat((-exp - 1) as usize))
    };
    format!("{sign}{text}")
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Sampling rule a parameter was drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distribution {
    /// Continuous uniform range [low, high].
    Uniform {
        /// Lower bound, inclusive.
        low: f64,
        /// Upper bound, inclusive.
        high: f64,
    },
    /// Log-uniform range (sampled in log-space).
    LogUniform {
        /// Lower bound, must be positive.
        low: f64,
        /// Upper bound.
        high: f64,
    },
    /// Uniform over `low, low + q, ..., high`.
    DiscreteUniform {
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
        /// Discretization step.
        q: f64,
    },
    /// Integer range [low, high] with a step.
    IntUniform {
        /// Lower bound, inclusive.
        low: i64,
        /// Upper bound, inclusive.
        high: i64,
        /// Spacing between candidate values.
        step: i64,
    },
    /// Integer range sampled in log-space.
    IntLogUniform {
        /// Lower bound, must be positive.
        low: i64,
        /// Upper bound.
        high: i64,
        /// Spacing between candidate values.
        step: i64,
    },
    /// Categorical choices.
    Categorical {
        /// Candidate values in declaration order.
        choices: Vec<ParamValue>,
    },
}

impl fmt::Display for Distribution {
    /// Keyword arguments are listed alphabetically so the text is stable.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform { low, high } => {
                write!(
                    f,
                    "UniformDistribution(high={}, low={})",
                    float_text(*high),
                    float_text(*low)
                )
            }
            Self::LogUniform { low, high } => {
                write!(
                    f,
                    "LogUniformDistribution(high={}, low={})",
                    float_text(*high),
                    float_text(*low)
                )
            }
            Self::DiscreteUniform { low, high, q } => write!(
                f,
                "DiscreteUniformDistribution(high={}, low={}, q={})",
                float_text(*high),
                float_text(*low),
                float_text(*q)
            ),
            Self::IntUniform { low, high, step } => write!(
                f,
                "IntUniformDistribution(high={high}, low={low}, step={step})"
            ),
            Self::IntLogUniform { low, high, step } => write!(
                f,
                "IntLogUniformDistribution(high={high}, low={low}, step={step})"
            ),
            Self::Categorical { choices } => {
                let items: Vec<String> = choices.iter().map(ParamValue::repr).collect();
                if items.len() == 1 {
                    write!(f, "CategoricalDistribution(choices=({},))", items[0])
                } else {
                    write!(f, "CategoricalDistribution(choices=({}))", items.join(", "))
                }
            }
        }
    }
}
