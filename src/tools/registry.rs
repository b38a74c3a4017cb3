//! Tool registry - declarations and their executor bindings
//!
//! The registry is filled once at startup. Declarations come back in
//! registration order so the prompt sent to the provider is stable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::config::ToolsConfig;
use crate::core::{ExecutionReport, ParleyError, Result, ToolDeclaration};
use crate::tools::command::CommandTool;

/// Something that can run a tool call
#[async_trait]
pub trait ToolBinding: Send + Sync {
    /// Run with the provider's arguments, never longer than `timeout`
    async fn invoke(&self, arguments: &Value, timeout: Duration) -> ExecutionReport;
}

struct Entry {
    declaration: ToolDeclaration,
    binding: Arc<dyn ToolBinding>,
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in tools enabled in `config`
    pub fn with_builtins(config: &ToolsConfig) -> Result<Self> {
        let mut registry = Self::new();

        if config.bash_enabled {
            let tool = CommandTool::bash(&config.shell, config.max_output_bytes);
            registry.register(tool.declaration().clone(), Arc::new(tool))?;
        }

        if config.sql_enabled {
            let tool = CommandTool::sql(&config.sql_program, config.max_output_bytes);
            registry.register(tool.declaration().clone(), Arc::new(tool))?;
        }

        Ok(registry)
    }

    /// Register a tool. Fails if the name is taken.
    pub fn register(
        &mut self,
        declaration: ToolDeclaration,
        binding: Arc<dyn ToolBinding>,
    ) -> Result<()> {
        if self.index.contains_key(&declaration.name) {
            return Err(ParleyError::DuplicateToolName(declaration.name));
        }

        self.index
            .insert(declaration.name.clone(), self.entries.len());
        self.entries.push(Entry {
            declaration,
            binding,
        });
        Ok(())
    }

    /// Look up the binding for `name`
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ToolBinding>> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.entries[i].binding))
            .ok_or_else(|| ParleyError::UnknownTool(name.to_string()))
    }

    /// Declarations in registration order
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.entries.iter().map(|e| e.declaration.clone()).collect()
    }

    /// Registered tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.declaration.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
