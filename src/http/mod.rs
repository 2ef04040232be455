pub mod fetch;

pub use fetch::{RangeFetcher, RangeOutcome};
