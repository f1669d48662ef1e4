//! # perfrisk
//!
//! $$
//! r_{p,t}-r_{f,t}=\alpha+\beta\,(r_{b,t}-r_{f,t})+\varepsilon_t
//! $$
//!
//! Performance and risk analytics for equity portfolios evaluated against a
//! market benchmark.
//!
//! The crate turns aligned return series into risk/return statistics and a
//! mean-variance efficient frontier:
//!
//! - [`data`]: return series, aligned panels and rebalancing weight schedules.
//! - [`covariance`]: sample, exponentially-weighted and shrinkage covariance estimators.
//! - [`risk`]: volatility, drawdown, downside deviation and rolling windows.
//! - [`regression`]: CAPM / multi-factor OLS with heteroskedasticity-robust inference.
//! - [`ratios`]: Sharpe, Sortino, Information, Treynor and Calmar ratios.
//! - [`frontier`]: long-only / boxed efficient frontier via active-set QP.
//! - [`engine`]: per-window orchestration producing [`engine::PerformanceReport`]s.
//!
//! Every call takes an explicit [`config::AnalyticsConfig`]; nothing is global.

pub mod config;
pub mod covariance;
pub mod data;
pub mod engine;
pub mod error;
pub mod frontier;
pub mod linalg;
pub mod ratios;
pub mod regression;
pub mod risk;

pub use config::AnalyticsConfig;
pub use engine::AnalyticsEngine;
pub use engine::PerformanceReport;
pub use error::AnalyticsError;
pub use error::ErrorKind;
pub use error::Result;
