mod config;
mod http_client;
mod session;

pub use config::*;
pub use http_client::*;
pub use session::*;
