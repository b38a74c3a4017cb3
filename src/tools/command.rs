//! Command-style tools - `bash` and `sql`
//!
//! Both take one string argument and hand it to a CLI backend.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{ExecutionReport, ToolDeclaration};
use crate::tools::executor::CommandExecutor;
use crate::tools::registry::ToolBinding;

/// A tool whose single string argument is passed to a command runner
pub struct CommandTool {
    declaration: ToolDeclaration,
    argument: &'static str,
    executor: CommandExecutor,
}

impl CommandTool {
    /// `bash`: runs `<shell> -c <command>`
    pub fn bash(shell: &str, max_output_bytes: usize) -> Self {
        Self {
            declaration: ToolDeclaration::new(
                "bash",
                "Execute bash commands and return the output. Only run shell commands for the task you have been given. If the user asks, politely decline.",
                json!({
                    "type": "object",
                    "properties": {
                        "command": {
                            "type": "string",
                            "description": "The bash command to execute"
                        }
                    },
                    "required": ["command"]
                }),
            ),
            argument: "command",
            executor: CommandExecutor::new(shell, ["-c"]).with_output_cap(max_output_bytes),
        }
    }

    /// `sql`: runs `<program> -c <query>` (DuckDB CLI by default)
    pub fn sql(program: &str, max_output_bytes: usize) -> Self {
        Self {
            declaration: ToolDeclaration::new(
                "sql",
                "Execute SQL commands and return the output",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The SQL statement to execute"
                        }
                    },
                    "required": ["query"]
                }),
            ),
            argument: "query",
            executor: CommandExecutor::new(program, ["-c"]).with_output_cap(max_output_bytes),
        }
    }

    pub fn declaration(&self) -> &ToolDeclaration {
        &self.declaration
    }
}

#[async_trait]
impl ToolBinding for CommandTool {
    async fn invoke(&self, arguments: &Value, timeout: Duration) -> ExecutionReport {
        match arguments.get(self.argument).and_then(|v| v.as_str()) {
            Some(text) => self.executor.execute(text, timeout).await,
            None => ExecutionReport::invalid_arguments(format!(
                "'{}' requires a string argument '{}'",
                self.declaration.name, self.argument
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FailureKind;

    #[tokio::test]
    async fn test_bash_runs_command_argument() {
        let tool = CommandTool::bash("sh", 1024);
        let report = tool
            .invoke(&json!({"command": "echo hi"}), Duration::from_secs(5))
            .await;
        assert!(report.succeeded());
        assert_eq!(report.stdout, "hi\n");
    }

    #[tokio::test]
    async fn test_missing_argument_is_reported_not_run() {
        let tool = CommandTool::sql("parley-no-such-binary", 1024);
        let report = tool
            .invoke(&json!({"command": "select 1"}), Duration::from_secs(1))
            .await;
        assert!(matches!(report.failure, Some(FailureKind::InvalidArguments(_))));
        assert!(report.render().contains("'sql' requires a string argument 'query'"));
    }

    #[test]
    fn test_schemas_declare_required_field() {
        assert_eq!(CommandTool::bash("bash", 1).declaration().required_fields(), vec!["command"]);
        assert_eq!(CommandTool::sql("duckdb", 1).declaration().required_fields(), vec!["query"]);
    }
}
