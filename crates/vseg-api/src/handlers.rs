//! Request handlers.

pub mod health;
pub mod process;
pub mod segments;

pub use health::*;
pub use process::*;
pub use segments::*;
