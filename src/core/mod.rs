pub mod config;
pub mod protocol;
pub mod runner;
pub mod session;
pub mod settings;

pub use config::Config;
pub use protocol::{first_line, FeedbackRecord, FeedbackRequest, FeedbackResult};
pub use runner::CommandRunner;
pub use session::{DisplayEvent, FeedbackSession, SessionChannels, UiEvent};
pub use settings::{project_key, ProjectSettings, ProjectStore};
