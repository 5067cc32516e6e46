pub mod commands;
pub mod console;
pub mod handlers;

pub use commands::{Cli, Commands};
