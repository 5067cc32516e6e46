pub mod http;

pub use http::FeedbackClient;
