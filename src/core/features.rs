//! Feature computation over sliding windows.
//!
//! A model input name is either a plain field name (`alpha`, summarised by
//! its mean) or a field name with a statistic suffix (`alpha_std`,
//! `acceleration.x_max`).

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};

/// Summary statistic over a window of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Mean,
    Std,
    Min,
    Max,
    Median,
    Rms,
    Range,
    Last,
}

impl Statistic {
    fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "mean" => Statistic::Mean,
            "std" => Statistic::Std,
            "min" => Statistic::Min,
            "max" => Statistic::Max,
            "median" => Statistic::Median,
            "rms" => Statistic::Rms,
            "range" => Statistic::Range,
            "last" => Statistic::Last,
            _ => return None,
        })
    }

    /// Compute the statistic. Returns `None` for an empty window.
    pub fn compute(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }

        let value = match self {
            Statistic::Mean => values.mean(),
            // Sample standard deviation; a single value has no spread
            Statistic::Std if values.len() < 2 => 0.0,
            Statistic::Std => values.std_dev(),
            Statistic::Min => Statistics::min(values),
            Statistic::Max => Statistics::max(values),
            Statistic::Median => Data::new(values.to_vec()).median(),
            Statistic::Rms => values.quadratic_mean(),
            Statistic::Range => Statistics::max(values) - Statistics::min(values),
            Statistic::Last => values[values.len() - 1],
        };
        Some(value)
    }
}

/// A parsed model input: which field, summarised how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFeature {
    pub field: String,
    pub statistic: Statistic,
}

impl InputFeature {
    pub fn parse(input: &str) -> Self {
        if let Some((field, suffix)) = input.rsplit_once('_') {
            if let Some(statistic) = Statistic::from_suffix(suffix) {
                if !field.is_empty() {
                    return Self {
                        field: field.to_string(),
                        statistic,
                    };
                }
            }
        }

        Self {
            field: input.to_string(),
            statistic: Statistic::Mean,
        }
    }
}
