pub mod trading;
pub mod status;

pub use trading::*;
pub use status::*;
