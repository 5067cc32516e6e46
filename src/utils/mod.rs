pub mod env;
pub mod process;

pub use env::user_environment;
pub use process::{process_alive, terminate_tree};
