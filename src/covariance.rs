//! # Covariance
//!
//! $$
//! \hat\Sigma=\sum_{t}w_t(\mathbf r_t-\bar{\mathbf r})(\mathbf r_t-\bar{\mathbf r})^\top
//! $$
//!
//! Covariance estimation over aligned panels and a publish-once cache.

pub mod cache;
pub mod estimator;

pub use cache::CovarianceCache;
pub use cache::CovarianceKey;
pub use estimator::CovarianceEstimator;
pub use estimator::CovarianceMatrix;
pub use estimator::CovarianceMethod;
pub use estimator::EstimationWindow;
