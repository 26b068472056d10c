pub mod controller;
pub mod poller;

pub use controller::*;
pub use poller::*;
