// AskUser Library
// Human-in-the-loop feedback sessions for coding agents with a server-client architecture

pub mod cli;
pub mod client;
pub mod core;
pub mod server;
pub mod utils;

// Re-export commonly used types
pub use client::http::FeedbackClient;
pub use core::{
    Config, FeedbackRequest, FeedbackResult, FeedbackSession, ProjectSettings, ProjectStore,
};
pub use server::{AppState, HostLauncher, SessionHost};

// Error handling
pub use anyhow::{Result, Error};
