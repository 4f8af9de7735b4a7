//! PageRank parameters and their validation.

#![allow(clippy::module_name_repetitions)]

use graphrank_core::config::PageRankSection;
use graphrank_core::{ErrorCode, RankError};
use serde::{Deserialize, Serialize};

/// Caller-facing PageRank parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRankParams {
    /// Probability of following an out-link, strictly between 0 and 1.
    pub damping_factor: f64,
    /// Upper bound on the number of passes, at least 1.
    pub max_iter: usize,
    /// Convergence threshold on the L1 change between passes. `None` scales it to
    /// the graph size via [`default_epsilon`].
    pub epsilon: Option<f64>,
}

impl Default for PageRankParams {
    fn default() -> Self {
        Self {
            damping_factor: 0.85,
            max_iter: 100,
            epsilon: None,
        }
    }
}

impl From<&PageRankSection> for PageRankParams {
    fn from(section: &PageRankSection) -> Self {
        Self {
            damping_factor: section.damping_factor,
            max_iter: section.max_iter,
            epsilon: section.epsilon,
        }
    }
}

/// Parameters after validation, with epsilon fixed for a given node count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedParams {
    pub damping_factor: f64,
    pub max_iter: usize,
    pub epsilon: f64,
}

/// `1 / (N * 1000)`: a thousandth of the uniform rank.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn default_epsilon(node_count: usize) -> f64 {
    1.0 / (node_count.max(1) as f64 * 1000.0)
}

impl PageRankParams {
    /// Check every parameter's range.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::InvalidInput`] with [`ErrorCode::InvalidParameter`]
    /// naming the first offending parameter.
    pub fn validate(&self) -> Result<(), RankError> {
        let d = self.damping_factor;
        let damping_in_range = d > 0.0 && d < 1.0;
        if !damping_in_range {
            return Err(RankError::invalid(
                ErrorCode::InvalidParameter,
                format!("damping_factor must be in (0, 1), got {d}"),
            ));
        }
        if let Some(eps) = self.epsilon {
            let epsilon_in_range = eps.is_finite() && eps > 0.0;
            if !epsilon_in_range {
                return Err(RankError::invalid(
                    ErrorCode::InvalidParameter,
                    format!("epsilon must be a positive finite number, got {eps}"),
                ));
            }
        }
        if self.max_iter < 1 {
            return Err(RankError::invalid(
                ErrorCode::InvalidParameter,
                "max_iter must be at least 1",
            ));
        }
        Ok(())
    }

    /// Validate and fix epsilon for a graph of `node_count` nodes.
    ///
    /// # Errors
    ///
    /// Same as [`PageRankParams::validate`].
    pub fn resolve(&self, node_count: usize) -> Result<ResolvedParams, RankError> {
        self.validate()?;
        Ok(ResolvedParams {
            damping_factor: self.damping_factor,
            max_iter: self.max_iter,
            epsilon: self.epsilon.unwrap_or_else(|| default_epsilon(node_count)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with(damping_factor: f64, max_iter: usize, epsilon: Option<f64>) -> PageRankParams {
        PageRankParams {
            damping_factor,
            max_iter,
            epsilon,
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(PageRankParams::default().validate().is_ok());
    }

    #[test]
    fn damping_bounds_are_exclusive() {
        for d in [0.0, 1.0, -0.1, 1.5, f64::NAN, f64::INFINITY] {
            let err = with(d, 10, None).validate().expect_err("out of range");
            assert_eq!(err.code(), ErrorCode::InvalidParameter, "d = {d}");
        }
        assert!(with(0.01, 10, None).validate().is_ok());
        assert!(with(0.99, 10, None).validate().is_ok());
    }

    #[test]
    fn epsilon_must_be_positive_and_finite() {
        for eps in [0.0, -1e-3, f64::NAN, f64::INFINITY] {
            assert!(with(0.85, 10, Some(eps)).validate().is_err(), "eps = {eps}");
        }
    }

    #[test]
    fn zero_iterations_rejected() {
        let err = with(0.85, 0, None).validate().expect_err("max_iter = 0");
        assert!(err.to_string().contains("max_iter"));
    }

    #[test]
    fn resolve_scales_default_epsilon() {
        let resolved = PageRankParams::default().resolve(11).expect("valid");
        assert!((resolved.epsilon - 1.0 / 11_000.0).abs() < 1e-15);

        let explicit = with(0.85, 5, Some(1e-3)).resolve(11).expect("valid");
        assert!((explicit.epsilon - 1e-3).abs() < f64::EPSILON);
    }

    #[test]
    fn config_section_maps_fields() {
        let section = PageRankSection {
            damping_factor: 0.5,
            max_iter: 3,
            epsilon: Some(0.01),
        };
        assert_eq!(PageRankParams::from(&section), with(0.5, 3, Some(0.01)));
    }
}
