//! Error classification and statistics

mod classifier;
mod stats;

pub use classifier::{
    categorize, io_code, ClassifiedError, Classify, ErrorClassifier, ErrorContext, ErrorSignal,
    NETWORK_CODES,
};
pub use stats::{ErrorRateSignal, ErrorStats, RateLevel};
