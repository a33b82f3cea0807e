use crate::global_variables::*;

/// One named scalar reported by a post-processing function.
#[derive(Clone, Debug)]
pub struct PostResult {
    pub name: String,
    pub label: String,
    pub value: Float,
    pub unit: Option<String>,
}

impl PostResult {
    pub fn new(name: &str, label: &str, value: Float, unit: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            value,
            unit: unit.map(str::to_string),
        }
    }

    /// A value expressed in lattice units.
    pub fn lattice(name: &str, label: &str, value: Float) -> Self {
        Self::new(name, label, value, Some("lu"))
    }

    /// A dimensionless value or a count.
    pub fn plain(name: &str, label: &str, value: Float) -> Self {
        Self::new(name, label, value, None)
    }
}
