pub mod metlink;

pub use metlink::{MetlinkClient, StopPredictions};
