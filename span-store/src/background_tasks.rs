pub mod clean_up;
pub mod metric_sampler;

pub use clean_up::{cutoff_from_max_age, CleanError, RetentionCleaner};
pub use metric_sampler::MetricSampler;
