//! Embedding / bin manager
//!
//! Maintains the mapping between the embedded (low-dimensional) search space
//! and the original configuration space. Each embedded column is backed by a
//! [`Bin`]: a group of original dimensions of a single parameter type that
//! all take the embedded coordinate's value. Splitting a bin redistributes
//! its dimensions over finer bins, growing the embedded dimensionality
//! toward the input dimensionality over the course of a run.

use ndarray::{Array2, ArrayView2};
use ndarray_rand::rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{NsboError, Result};
use crate::space::SearchSpace;
use nsbo_surrogate::ParameterType;

/// A group of original dimensions mapped to one embedded column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bin {
    /// Parameter type shared by all member dimensions.
    pub parameter_type: ParameterType,
    /// Original dimensions taking this column's value.
    pub dims: Vec<usize>,
    /// Grid cardinality for gridded types (min over member dimensions).
    pub cardinality: Option<usize>,
}

/// Index mapping returned by [`RandomEmbedding::split`]: for every old
/// column, the new columns its values migrate to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMapping {
    groups: Vec<(usize, Vec<usize>)>,
    old_target_dim: usize,
    new_target_dim: usize,
}

impl IndexMapping {
    pub fn new_target_dim(&self) -> usize {
        self.new_target_dim
    }

    pub fn groups(&self) -> &[(usize, Vec<usize>)] {
        &self.groups
    }
}

/// Re-expresses low-dimensional observations under a finer embedding.
///
/// Every descendant column receives its ancestor's value, preserving the
/// original-space meaning of each migrated point.
pub fn remap(old_points: &ArrayView2<f64>, mapping: &IndexMapping) -> Array2<f64> {
    debug_assert_eq!(old_points.ncols(), mapping.old_target_dim);
    let mut out = Array2::zeros((old_points.nrows(), mapping.new_target_dim));
    for (old_col, descendants) in &mapping.groups {
        for &new_col in descendants {
            out.column_mut(new_col).assign(&old_points.column(*old_col));
        }
    }
    out
}

/// The grid of embedded coordinate values for a gridded bin with `m` items.
pub fn grid_values(m: usize) -> Vec<f64> {
    (0..m)
        .map(|i| -1.0 + 2.0 * i as f64 / (m - 1) as f64)
        .collect()
}

/// The low-dimensional projection of the original configuration space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomEmbedding {
    bins: Vec<Bin>,
    input_dim: usize,
    dim_types: Vec<ParameterType>,
    dim_cardinality: Vec<Option<usize>>,
}

impl RandomEmbedding {
    /// Builds an embedding with (about) `target_dim` bins, grouping original
    /// dimensions of the same type at random.
    ///
    /// Every type present receives at least one bin, so the effective target
    /// dimensionality is `max(target_dim, number of types)` capped by the
    /// input dimensionality.
    pub fn new(space: &SearchSpace, target_dim: usize, rng: &mut impl Rng) -> Result<Self> {
        let dim_types = space.parameter_types();
        let dim_cardinality: Vec<Option<usize>> =
            space.params().iter().map(|p| p.cardinality()).collect();
        let input_dim = space.dim();

        let present = space.unique_parameter_types();
        let n_bins = target_dim.max(present.len()).min(input_dim);

        // Per-type dimension pools, shuffled for the random grouping.
        let pools: Vec<(ParameterType, Vec<usize>)> = present
            .iter()
            .map(|t| {
                let mut dims: Vec<usize> = (0..input_dim).filter(|&d| dim_types[d] == *t).collect();
                for i in (1..dims.len()).rev() {
                    dims.swap(i, rng.gen_range(0..=i));
                }
                (*t, dims)
            })
            .collect();

        // One bin per type, then grant extra bins to the type with the most
        // crowded bins until n_bins are allocated.
        let mut counts: Vec<usize> = vec![1; pools.len()];
        let mut allocated: usize = pools.len();
        while allocated < n_bins {
            let next = (0..pools.len())
                .filter(|&i| counts[i] < pools[i].1.len())
                .max_by(|&a, &b| {
                    let ra = pools[a].1.len() as f64 / counts[a] as f64;
                    let rb = pools[b].1.len() as f64 / counts[b] as f64;
                    ra.total_cmp(&rb)
                });
            match next {
                Some(i) => counts[i] += 1,
                None => break,
            }
            allocated += 1;
        }

        let mut bins = Vec::with_capacity(n_bins);
        for (i, (ptype, dims)) in pools.iter().enumerate() {
            for chunk_idx in 0..counts[i] {
                let members: Vec<usize> = dims
                    .iter()
                    .copied()
                    .skip(chunk_idx)
                    .step_by(counts[i])
                    .collect();
                bins.push(make_bin(*ptype, members, &dim_cardinality)?);
            }
        }

        Ok(RandomEmbedding {
            bins,
            input_dim,
            dim_types,
            dim_cardinality,
        })
    }

    /// Current embedded dimensionality.
    pub fn target_dim(&self) -> usize {
        self.bins.len()
    }

    /// Original dimensionality; fixed for the run.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Embedded columns backed by bins of type `t`.
    pub fn columns_of_type(&self, t: ParameterType) -> Vec<usize> {
        self.bins
            .iter()
            .enumerate()
            .filter(|(_, b)| b.parameter_type == t)
            .map(|(c, _)| c)
            .collect()
    }

    /// Embedded columns optimized as continuous coordinates
    /// (continuous and numerical bins).
    pub fn continuous_columns(&self) -> Vec<usize> {
        self.bins
            .iter()
            .enumerate()
            .filter(|(_, b)| b.parameter_type.is_continuous_like())
            .map(|(c, _)| c)
            .collect()
    }

    /// Embedded columns proposed by the discrete candidate step.
    pub fn discrete_columns(&self) -> Vec<usize> {
        self.bins
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.parameter_type.is_continuous_like())
            .map(|(c, _)| c)
            .collect()
    }

    /// Draws `n` initial points in the embedded `[-1, 1]` space, sampling
    /// each parameter type with its own scheme and assembling one mixed
    /// point per sample.
    pub fn sample_initial(&self, n: usize, rng: &mut impl Rng) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((n, self.target_dim()));
        for (col, bin) in self.bins.iter().enumerate() {
            for i in 0..n {
                out[[i, col]] = match bin.parameter_type {
                    ParameterType::Binary => {
                        if rng.gen_bool(0.5) {
                            1.0
                        } else {
                            -1.0
                        }
                    }
                    ParameterType::Continuous | ParameterType::Numerical => {
                        rng.gen_range(-1.0..=1.0)
                    }
                    ParameterType::Categorical | ParameterType::Ordinal => {
                        let m = bin.cardinality.ok_or_else(|| {
                            NsboError::InvalidSpace(format!(
                                "{:?} bin without grid cardinality",
                                bin.parameter_type
                            ))
                        })?;
                        let idx = rng.gen_range(0..m);
                        -1.0 + 2.0 * idx as f64 / (m - 1) as f64
                    }
                };
            }
        }
        Ok(out)
    }

    /// Maps embedded points up to the original `[-1, 1]` space. Every
    /// original dimension takes the value of its bin's column; the mapping
    /// is a pure function of the current bin assignment.
    pub fn project_up(&self, x_low: &ArrayView2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((x_low.nrows(), self.input_dim));
        for (col, bin) in self.bins.iter().enumerate() {
            for &d in &bin.dims {
                out.column_mut(d).assign(&x_low.column(col));
            }
        }
        out
    }

    /// Splits every multi-dimension bin into up to `k + 1` finer bins,
    /// increasing the embedded dimensionality. Returns the index mapping
    /// needed to migrate existing low-dimensional observations.
    pub fn split(&mut self, k: usize) -> Result<IndexMapping> {
        if self.target_dim() >= self.input_dim {
            return Err(NsboError::SplitAtFullDimensionality {
                target_dim: self.target_dim(),
            });
        }
        let old_target_dim = self.target_dim();
        let mut appended: Vec<Bin> = Vec::new();
        let mut groups: Vec<(usize, Vec<usize>)> = Vec::with_capacity(old_target_dim);

        for col in 0..old_target_dim {
            let bin = &self.bins[col];
            let parts = (k + 1).min(bin.dims.len());
            if parts <= 1 {
                groups.push((col, vec![col]));
                continue;
            }
            let ptype = bin.parameter_type;
            let dims = bin.dims.clone();
            let chunk = dims.len().div_ceil(parts);
            let mut descendants = Vec::with_capacity(parts);
            for (part_idx, members) in dims.chunks(chunk).enumerate() {
                let child = make_bin(ptype, members.to_vec(), &self.dim_cardinality)?;
                if part_idx == 0 {
                    self.bins[col] = child;
                    descendants.push(col);
                } else {
                    descendants.push(old_target_dim + appended.len());
                    appended.push(child);
                }
            }
            groups.push((col, descendants));
        }

        self.bins.extend(appended);
        log::info!(
            "Split embedding: target dimensionality {} -> {} (input {})",
            old_target_dim,
            self.target_dim(),
            self.input_dim
        );
        Ok(IndexMapping {
            groups,
            old_target_dim,
            new_target_dim: self.target_dim(),
        })
    }
}

fn make_bin(
    ptype: ParameterType,
    dims: Vec<usize>,
    dim_cardinality: &[Option<usize>],
) -> Result<Bin> {
    if dims.is_empty() {
        return Err(NsboError::InvalidSpace("bin with no dimensions".into()));
    }
    let cardinality = match ptype {
        ParameterType::Binary => Some(2),
        ParameterType::Categorical | ParameterType::Ordinal => {
            let m = dims
                .iter()
                .filter_map(|&d| dim_cardinality[d])
                .min()
                .unwrap_or(0);
            if m < 2 {
                return Err(NsboError::InvalidSpace(format!(
                    "{ptype:?} bin needs at least two grid items"
                )));
            }
            Some(m)
        }
        ParameterType::Continuous | ParameterType::Numerical => None,
    };
    Ok(Bin {
        parameter_type: ptype,
        dims,
        cardinality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::ParamDef;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn binary_space(dim: usize) -> SearchSpace {
        SearchSpace::new(
            (0..dim)
                .map(|i| ParamDef::binary(&format!("b{i}")))
                .collect(),
        )
        .unwrap()
    }

    fn coverage_ok(embedding: &RandomEmbedding) -> bool {
        let mut seen = vec![0usize; embedding.input_dim()];
        for bin in embedding.bins() {
            for &d in &bin.dims {
                seen[d] += 1;
            }
        }
        seen.iter().all(|&c| c == 1)
    }

    #[test]
    fn test_every_dimension_in_exactly_one_bin() {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let embedding = RandomEmbedding::new(&binary_space(12), 4, &mut rng).unwrap();
        assert_eq!(embedding.target_dim(), 4);
        assert!(coverage_ok(&embedding));
    }

    #[test]
    fn test_split_preserves_coverage_and_grows_dim() {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let mut embedding = RandomEmbedding::new(&binary_space(16), 2, &mut rng).unwrap();
        let mut last_dim = embedding.target_dim();
        while embedding.target_dim() < embedding.input_dim() {
            embedding.split(2).unwrap();
            assert!(embedding.target_dim() > last_dim);
            assert!(embedding.target_dim() <= embedding.input_dim());
            assert!(coverage_ok(&embedding));
            last_dim = embedding.target_dim();
        }
        assert!(matches!(
            embedding.split(2),
            Err(NsboError::SplitAtFullDimensionality { .. })
        ));
    }

    #[test]
    fn test_remap_round_trips_projection() {
        let mut rng = Xoshiro256Plus::seed_from_u64(11);
        let mut embedding = RandomEmbedding::new(&binary_space(8), 2, &mut rng).unwrap();
        let x_low = embedding.sample_initial(5, &mut rng).unwrap();
        let up_before = embedding.project_up(&x_low.view());

        let mapping = embedding.split(2).unwrap();
        let x_migrated = remap(&x_low.view(), &mapping);
        assert_eq!(x_migrated.ncols(), embedding.target_dim());
        let up_after = embedding.project_up(&x_migrated.view());
        assert_eq!(up_before, up_after);
    }

    #[test]
    fn test_sample_initial_respects_domains() {
        let space = SearchSpace::new(vec![
            ParamDef::binary("b"),
            ParamDef::continuous("c", 0.0, 1.0),
            ParamDef::categorical("k", 3),
        ])
        .unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let embedding = RandomEmbedding::new(&space, 3, &mut rng).unwrap();
        let x = embedding.sample_initial(20, &mut rng).unwrap();
        assert_eq!(x.dim(), (20, 3));
        for (col, bin) in embedding.bins().iter().enumerate() {
            for v in x.column(col) {
                match bin.parameter_type {
                    ParameterType::Binary => assert!(*v == 1.0 || *v == -1.0),
                    ParameterType::Categorical => {
                        assert!(grid_values(3).iter().any(|g| (g - v).abs() < 1e-12))
                    }
                    _ => assert!((-1.0..=1.0).contains(v)),
                }
            }
        }
    }

    #[test]
    fn test_mixed_space_types_keep_their_columns() {
        let space = SearchSpace::new(vec![
            ParamDef::binary("b1"),
            ParamDef::binary("b2"),
            ParamDef::continuous("c1", 0.0, 1.0),
            ParamDef::numerical("n1", 1.0, 10.0),
        ])
        .unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(5);
        let embedding = RandomEmbedding::new(&space, 3, &mut rng).unwrap();
        for bin in embedding.bins() {
            for &d in &bin.dims {
                assert_eq!(space.parameter_types()[d], bin.parameter_type);
            }
        }
        let cont = embedding.continuous_columns();
        let disc = embedding.discrete_columns();
        assert_eq!(cont.len() + disc.len(), embedding.target_dim());
    }
}
