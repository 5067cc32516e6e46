pub mod host;
pub mod routes;

pub use host::{HostLauncher, SessionHost};
pub use routes::{router, start_server, AppState};
