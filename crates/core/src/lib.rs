#![forbid(unsafe_code)]

pub mod flow;
pub mod model;
pub mod progress;
pub mod time;

pub use flow::FlowController;
pub use progress::{Progress, progress};
pub use time::Clock;
