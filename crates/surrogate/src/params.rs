//! Mixed-type parameter vocabulary
//!
//! This module defines the `ParameterType` enum describing the kind of each
//! dimension of the original configuration space.

use serde::{Deserialize, Serialize};

/// The type of a single dimension of the original configuration space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterType {
    /// Two-valued parameter (on/off switches).
    Binary,
    /// Continuous parameter in a bounded real range.
    Continuous,
    /// Numerical parameter: an ordered grid of numeric values (e.g. buffer
    /// sizes), optimized as continuous and snapped to the grid on projection.
    Numerical,
    /// Categorical parameter over an unordered finite set of choices.
    Categorical,
    /// Ordinal parameter over an ordered finite set of choices.
    Ordinal,
}

impl ParameterType {
    /// All parameter types, in declaration order.
    pub const ALL: [ParameterType; 5] = [
        ParameterType::Binary,
        ParameterType::Continuous,
        ParameterType::Numerical,
        ParameterType::Categorical,
        ParameterType::Ordinal,
    ];

    /// Returns true if candidate proposals treat this type as continuous.
    pub fn is_continuous_like(self) -> bool {
        matches!(self, ParameterType::Continuous | ParameterType::Numerical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuous_like_types() {
        assert!(ParameterType::Continuous.is_continuous_like());
        assert!(ParameterType::Numerical.is_continuous_like());
        assert!(!ParameterType::Binary.is_continuous_like());
        assert!(!ParameterType::Categorical.is_continuous_like());
        assert!(!ParameterType::Ordinal.is_continuous_like());
    }
}
