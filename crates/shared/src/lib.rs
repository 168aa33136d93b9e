pub mod config;
pub mod states;

pub use states::*;
