use crate::minimize::{
    MinimizerError,
    iteration::OptimisationResult,
    objective::{Evaluator, ObjHessFn},
};
use log::debug;
use ndarray::prelude::*;
use serde::Serialize;

/// One dimension of a regular grid: `points` evenly spaced values from `lower` to `upper`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridAxis {
    pub lower: f64,
    pub upper: f64,
    pub points: usize,
}

impl GridAxis {
    pub fn new(lower: f64, upper: f64, points: usize) -> Self {
        GridAxis {
            lower,
            upper,
            points,
        }
    }

    pub fn values(&self) -> Array1<f64> {
        Array1::linspace(self.lower, self.upper, self.points)
    }
}

/// Evaluate f on every node of the grid and return the lowest node.
///
/// Non-finite function values are skipped. The iteration count is the number
/// of grid nodes visited.
pub fn grid_search(
    f: &dyn ObjHessFn,
    axes: &[GridAxis],
) -> Result<OptimisationResult, MinimizerError> {
    let n = axes.len();
    if n == 0 {
        return Err(MinimizerError::InvalidDimension);
    }
    for axis in axes {
        if axis.points == 0 || !axis.lower.is_finite() || !axis.upper.is_finite() || axis.lower > axis.upper
        {
            return Err(MinimizerError::InitializationError(format!(
                "invalid grid axis [{}, {}] with {} points",
                axis.lower, axis.upper, axis.points
            )));
        }
    }

    let values: Vec<Array1<f64>> = axes.iter().map(GridAxis::values).collect();
    let mut eval = Evaluator::new(f, n);
    let mut index = vec![0; n];
    let mut best: Option<(Array1<f64>, f64)> = None;
    let mut nodes = 0;

    loop {
        let x = Array1::from_shape_fn(n, |i| values[i][index[i]]);
        let fx = eval.value(&x);
        nodes += 1;
        if fx.is_finite() && best.as_ref().map_or(true, |(_, f_best)| fx < *f_best) {
            best = Some((x, fx));
        }

        // Odometer increment, last axis fastest
        let mut dim = n;
        loop {
            if dim == 0 {
                let (x, fx) = best.ok_or_else(|| {
                    MinimizerError::NumericalError(
                        "no grid node has a finite function value".to_string(),
                    )
                })?;
                debug!("grid search: {} nodes, minimum {} at {}", nodes, fx, x);
                return Ok(OptimisationResult::from_counts(x, fx, nodes, eval.counts(), None));
            }
            dim -= 1;
            index[dim] += 1;
            if index[dim] < axes[dim].points {
                break;
            }
            index[dim] = 0;
        }
    }
}
