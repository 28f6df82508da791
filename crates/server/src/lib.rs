pub mod app;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod rate_limit;
pub mod tools;
pub mod transport;

pub use app::App;
pub use dispatch::{DispatchError, Dispatcher};
