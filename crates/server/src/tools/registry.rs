use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use multiapi_common::api::tools::ToolDefinition;

use super::context::ToolContext;
use super::error::ToolError;

/// Future returned by every tool handler.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send>>;

/// Handler signature: validated arguments and the shared context in,
/// a JSON result or a [`ToolError`] out.
pub type ToolHandler = Arc<dyn Fn(Value, Arc<ToolContext>) -> ToolFuture + Send + Sync>;

/// Wrap an async function as a [`ToolHandler`].
pub fn handler_fn<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Value, Arc<ToolContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    Arc::new(move |args: Value, ctx: Arc<ToolContext>| -> ToolFuture { Box::pin(f(args, ctx)) })
}

/// A definition paired with the handler that serves it.
#[derive(Clone)]
pub struct ToolRegistration {
    pub definition: ToolDefinition,
    pub handler: ToolHandler,
}

/// Registry of tool handlers with their schema definitions.
///
/// Populated once at startup and read-only afterwards.
pub struct ToolRegistry {
    tools: Vec<ToolRegistration>,
    by_name: HashMap<String, usize>,
    context: Arc<ToolContext>,
}

impl ToolRegistry {
    pub fn new(context: ToolContext) -> Self {
        Self {
            tools: Vec::new(),
            by_name: HashMap::new(),
            context: Arc::new(context),
        }
    }

    /// Register a tool under `definition.name`.
    ///
    /// A second registration under the same name replaces the first (keeping
    /// its list position) and returns `true`. The replacement is logged at
    /// warn level since it usually means two integrations collided.
    pub fn register(&mut self, definition: ToolDefinition, handler: ToolHandler) -> bool {
        let name = definition.name.clone();
        let registration = ToolRegistration {
            definition,
            handler,
        };

        match self.by_name.get(&name) {
            Some(&index) => {
                tracing::warn!(tool = %name, "Tool already registered, replacing");
                self.tools[index] = registration;
                true
            }
            None => {
                self.by_name.insert(name.clone(), self.tools.len());
                self.tools.push(registration);
                tracing::info!(tool = %name, "Registered tool");
                false
            }
        }
    }

    /// All tool definitions, in registration order.
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Option<&ToolRegistration> {
        self.by_name.get(name).map(|&index| &self.tools[index])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The context handed to every handler invocation.
    pub fn context(&self) -> Arc<ToolContext> {
        Arc::clone(&self.context)
    }
}
