pub mod admin;
pub mod builds;
pub mod evaluation;
mod health;

pub use health::*;
