pub mod config;
pub mod extension;
pub mod fspipe;
pub mod virtual_input;

pub use config::*;
pub use extension::*;
pub use fspipe::*;
pub use virtual_input::*;
