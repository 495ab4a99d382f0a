// Unit conversions applied after reduction. Truncation toward zero.

use serde::{Deserialize, Serialize};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const MILLICORES_PER_CORE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitTransform {
    #[default]
    Identity,
    /// bytes -> whole megabytes
    Megabytes,
    /// cpu-seconds per second -> whole millicores
    Millicores,
}

impl UnitTransform {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            UnitTransform::Identity => value,
            UnitTransform::Megabytes => to_megabytes(value),
            UnitTransform::Millicores => to_millicores(value),
        }
    }
}

pub fn to_megabytes(bytes: f64) -> f64 {
    (bytes / BYTES_PER_MB).trunc()
}

pub fn to_millicores(cores: f64) -> f64 {
    (cores * MILLICORES_PER_CORE).trunc()
}
