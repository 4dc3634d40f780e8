//! Original configuration space description
//!
//! The optimizer searches a low-dimensional embedded space in `[-1, 1]`
//! coordinates; this module describes the original (high-dimensional) space
//! of tunable parameters and the affine map between the two.

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::errors::{NsboError, Result};
use nsbo_surrogate::ParameterType;

/// One tunable parameter of the system under optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    /// Parameter name as understood by the benchmarked system.
    pub name: String,
    /// Parameter type.
    pub ptype: ParameterType,
    /// Lower bound in original units.
    pub lower: f64,
    /// Upper bound in original units.
    pub upper: f64,
    /// Number of grid items for categorical/ordinal/numerical parameters.
    pub n_items: Option<usize>,
}

impl ParamDef {
    pub fn continuous(name: &str, lower: f64, upper: f64) -> Self {
        ParamDef {
            name: name.into(),
            ptype: ParameterType::Continuous,
            lower,
            upper,
            n_items: None,
        }
    }

    pub fn binary(name: &str) -> Self {
        ParamDef {
            name: name.into(),
            ptype: ParameterType::Binary,
            lower: 0.0,
            upper: 1.0,
            n_items: Some(2),
        }
    }

    pub fn numerical(name: &str, lower: f64, upper: f64) -> Self {
        ParamDef {
            name: name.into(),
            ptype: ParameterType::Numerical,
            lower,
            upper,
            n_items: None,
        }
    }

    pub fn categorical(name: &str, n_items: usize) -> Self {
        ParamDef {
            name: name.into(),
            ptype: ParameterType::Categorical,
            lower: 0.0,
            upper: (n_items.max(1) - 1) as f64,
            n_items: Some(n_items),
        }
    }

    pub fn ordinal(name: &str, n_items: usize) -> Self {
        ParamDef {
            name: name.into(),
            ptype: ParameterType::Ordinal,
            lower: 0.0,
            upper: (n_items.max(1) - 1) as f64,
            n_items: Some(n_items),
        }
    }

    /// Grid cardinality of the parameter in the `[-1, 1]` representation,
    /// if it is a gridded type.
    pub fn cardinality(&self) -> Option<usize> {
        match self.ptype {
            ParameterType::Binary => Some(2),
            ParameterType::Categorical | ParameterType::Ordinal => self.n_items,
            ParameterType::Continuous | ParameterType::Numerical => None,
        }
    }
}

/// The full original configuration space being tuned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpace {
    params: Vec<ParamDef>,
}

impl SearchSpace {
    pub fn new(params: Vec<ParamDef>) -> Result<Self> {
        if params.is_empty() {
            return Err(NsboError::InvalidSpace("no parameters".into()));
        }
        for p in &params {
            if p.lower > p.upper {
                return Err(NsboError::InvalidSpace(format!(
                    "parameter '{}' has inverted bounds [{}, {}]",
                    p.name, p.lower, p.upper
                )));
            }
            if matches!(p.ptype, ParameterType::Categorical | ParameterType::Ordinal)
                && p.n_items.map_or(true, |n| n < 2)
            {
                return Err(NsboError::InvalidSpace(format!(
                    "parameter '{}' needs at least two items",
                    p.name
                )));
            }
        }
        Ok(SearchSpace { params })
    }

    /// Number of original dimensions.
    pub fn dim(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[ParamDef] {
        &self.params
    }

    /// Parameter type of every dimension, in order.
    pub fn parameter_types(&self) -> Vec<ParameterType> {
        self.params.iter().map(|p| p.ptype).collect()
    }

    /// The distinct parameter types present in the space.
    pub fn unique_parameter_types(&self) -> Vec<ParameterType> {
        ParameterType::ALL
            .into_iter()
            .filter(|t| self.params.iter().any(|p| p.ptype == *t))
            .collect()
    }

    /// Lower bounds in original units.
    pub fn lb_vec(&self) -> Array1<f64> {
        self.params.iter().map(|p| p.lower).collect()
    }

    /// Upper bounds in original units.
    pub fn ub_vec(&self) -> Array1<f64> {
        self.params.iter().map(|p| p.upper).collect()
    }

    /// Maps points from the `[-1, 1]`-around-origin representation to
    /// original units, snapping gridded types to their grid.
    pub fn from_unit_around_origin(&self, x_up: &ArrayView2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros(x_up.raw_dim());
        for (r, row) in x_up.rows().into_iter().enumerate() {
            for (c, p) in self.params.iter().enumerate() {
                let unit = ((row[c] + 1.0) / 2.0).clamp(0.0, 1.0);
                let value = match p.ptype {
                    ParameterType::Continuous => p.lower + unit * (p.upper - p.lower),
                    ParameterType::Numerical => (p.lower + unit * (p.upper - p.lower)).round(),
                    ParameterType::Binary => {
                        if unit >= 0.5 {
                            p.upper
                        } else {
                            p.lower
                        }
                    }
                    ParameterType::Categorical | ParameterType::Ordinal => {
                        let m = p.n_items.unwrap_or(2);
                        let idx = (unit * (m - 1) as f64).round();
                        p.lower + idx * (p.upper - p.lower) / (m - 1) as f64
                    }
                };
                out[[r, c]] = value;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_rejects_empty_space() {
        assert!(SearchSpace::new(vec![]).is_err());
    }

    #[test]
    fn test_rejects_single_item_categorical() {
        let err = SearchSpace::new(vec![ParamDef::categorical("c", 1)]).unwrap_err();
        assert!(matches!(err, NsboError::InvalidSpace(_)));
    }

    #[test]
    fn test_from_unit_around_origin_snaps_grids() {
        let space = SearchSpace::new(vec![
            ParamDef::continuous("c", 0.0, 10.0),
            ParamDef::binary("b"),
            ParamDef::categorical("k", 4),
            ParamDef::numerical("n", 1.0, 9.0),
        ])
        .unwrap();
        let x = array![[0.0, -1.0, 1.0, 0.5]];
        let up = space.from_unit_around_origin(&x.view());
        assert_eq!(up, array![[5.0, 0.0, 3.0, 7.0]]);
    }

    #[test]
    fn test_unique_parameter_types_ordered() {
        let space = SearchSpace::new(vec![
            ParamDef::categorical("k", 3),
            ParamDef::binary("b1"),
            ParamDef::binary("b2"),
        ])
        .unwrap();
        assert_eq!(
            space.unique_parameter_types(),
            vec![ParameterType::Binary, ParameterType::Categorical]
        );
    }
}
