pub mod context;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod schema;

pub use context::ToolContext;
pub use error::ToolError;
pub use registry::{handler_fn, ToolFuture, ToolHandler, ToolRegistration, ToolRegistry};
