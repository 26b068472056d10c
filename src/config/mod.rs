pub mod fields;
pub mod local;
pub mod manager;
pub mod settings;

pub use fields::*;
pub use local::*;
pub use manager::*;
pub use settings::*;
