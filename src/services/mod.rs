pub mod aggregator;
pub mod cache;
pub mod fetcher;
pub mod rate_limit;

pub use aggregator::Aggregator;
pub use cache::BoardCache;
pub use fetcher::{FetchStationDepartures, ResilientFetcher};
pub use rate_limit::FixedWindowLimiter;
