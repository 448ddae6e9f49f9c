mod bootstrap;
mod quantile;
mod summary;

pub use bootstrap::{BootstrapResult, BootstrapSettings, CiReason, bootstrap_median_diff};
pub use quantile::QuantileMethod;
pub use summary::{SummaryStats, summary_stats};
