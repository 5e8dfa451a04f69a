//! Tool catalogue and execution.
//!
//! Stateless helpers:
//! - `add`, `multiply`: floating-point arithmetic
//! - `random_number`: uniform integer in an inclusive range
//!
//! Captain's log:
//! - `append_log`: record an entry, echo a confirmation line
//! - `list_projects`: projects a user has logged to
//! - `fetch_new`: entries not yet delivered, per project

use captains_log::{Journal, JournalError};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::protocol::JsonRpcError;

/// Tool schema as advertised by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,

    pub description: String,

    /// JSON Schema for the `arguments` object.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Errors produced while executing a tool call.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Journal(#[from] JournalError),

    /// The blocking worker running a journal call panicked or was cancelled.
    #[error("tool task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("failed to encode tool result: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ToolError {
    /// Short machine-readable error kind, carried in the JSON-RPC `data`.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "UnknownTool",
            ToolError::InvalidArguments(_) | ToolError::Journal(JournalError::InvalidInput(_)) => {
                "InvalidInput"
            }
            ToolError::Journal(JournalError::StorageUnavailable(_)) => "StorageUnavailable",
            ToolError::Join(_) | ToolError::Encode(_) => "Internal",
        }
    }

    pub fn to_rpc_error(&self) -> JsonRpcError {
        let error = match self {
            ToolError::UnknownTool(_)
            | ToolError::InvalidArguments(_)
            | ToolError::Journal(JournalError::InvalidInput(_)) => {
                JsonRpcError::invalid_params(self.to_string())
            }
            ToolError::Journal(JournalError::StorageUnavailable(_))
            | ToolError::Join(_)
            | ToolError::Encode(_) => {
                JsonRpcError::internal_error(self.to_string())
            }
        };
        error.with_data(json!({ "kind": self.kind() }))
    }
}

#[derive(Debug, Deserialize)]
struct BinaryArgs {
    a: f64,
    b: f64,
}

#[derive(Debug, Deserialize)]
struct RandomArgs {
    #[serde(default = "default_min_val")]
    min_val: i64,
    #[serde(default = "default_max_val")]
    max_val: i64,
}

fn default_min_val() -> i64 {
    1
}

fn default_max_val() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
struct AppendLogArgs {
    username: String,
    project: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListProjectsArgs {
    username: String,
}

#[derive(Debug, Deserialize)]
struct FetchNewArgs {
    username: String,
    projects: Vec<String>,
}

/// Dispatches tool calls by name.
#[derive(Clone, Debug)]
pub struct ToolHandler {
    journal: Journal,
}

impl ToolHandler {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }

    /// Every tool this server offers.
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: "add".to_string(),
                description: "Add two numbers.".to_string(),
                input_schema: number_pair_schema(),
            },
            Tool {
                name: "multiply".to_string(),
                description: "Multiply two numbers.".to_string(),
                input_schema: number_pair_schema(),
            },
            Tool {
                name: "random_number".to_string(),
                description: "Generate a random integer between min_val and max_val, inclusive."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "min_val": {"type": "integer", "default": 1},
                        "max_val": {"type": "integer", "default": 100}
                    }
                }),
            },
            Tool {
                name: "append_log".to_string(),
                description: "Write an entry to the captain's log for a user and project. \
                              Returns the recorded line."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "username": {"type": "string", "description": "Who is logging"},
                        "project": {"type": "string", "description": "Project the entry belongs to"},
                        "message": {"type": "string", "description": "Entry text"}
                    },
                    "required": ["username", "project", "message"]
                }),
            },
            Tool {
                name: "list_projects".to_string(),
                description: "List the projects a user has written captain's log entries for."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "username": {"type": "string"}
                    },
                    "required": ["username"]
                }),
            },
            Tool {
                name: "fetch_new".to_string(),
                description: "Return captain's log entries added since the previous fetch, \
                              per project. Each entry is delivered once."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "username": {"type": "string"},
                        "projects": {
                            "type": "array",
                            "items": {"type": "string"},
                            "minItems": 1,
                            "uniqueItems": true
                        }
                    },
                    "required": ["username", "projects"]
                }),
            },
        ]
    }

    /// Runs `tool_name` with `arguments` and returns its JSON result.
    ///
    /// Journal tools run on the blocking thread pool.
    pub async fn execute(&self, tool_name: &str, arguments: Value) -> Result<Value, ToolError> {
        tracing::debug!(tool = tool_name, "executing tool");

        match tool_name {
            "add" => {
                let args: BinaryArgs = parse_args(arguments)?;
                Ok(json!(args.a + args.b))
            }
            "multiply" => {
                let args: BinaryArgs = parse_args(arguments)?;
                Ok(json!(args.a * args.b))
            }
            "random_number" => {
                let args: RandomArgs = parse_args(arguments)?;
                random_number(args.min_val, args.max_val).map(|n| json!(n))
            }
            "append_log" => {
                let args: AppendLogArgs = parse_args(arguments)?;
                let journal = self.journal.clone();
                let line = tokio::task::spawn_blocking(move || {
                    journal.append_log(&args.username, &args.project, &args.message)
                })
                .await??;
                Ok(Value::String(line))
            }
            "list_projects" => {
                let args: ListProjectsArgs = parse_args(arguments)?;
                let journal = self.journal.clone();
                let projects =
                    tokio::task::spawn_blocking(move || journal.list_projects(&args.username))
                        .await??;
                Ok(json!(projects))
            }
            "fetch_new" => {
                let args: FetchNewArgs = parse_args(arguments)?;
                let journal = self.journal.clone();
                let result = tokio::task::spawn_blocking(move || {
                    journal.fetch_new(&args.username, args.projects.as_slice())
                })
                .await??;
                Ok(serde_json::to_value(&result)?)
            }
            other => {
                tracing::warn!(tool = other, "unknown tool requested");
                Err(ToolError::UnknownTool(other.to_string()))
            }
        }
    }
}

fn number_pair_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "a": {"type": "number"},
            "b": {"type": "number"}
        },
        "required": ["a", "b"]
    })
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    // A call without arguments is the same as an empty object.
    let arguments = if arguments.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn random_number(min_val: i64, max_val: i64) -> Result<i64, ToolError> {
    if min_val > max_val {
        return Err(ToolError::InvalidArguments(format!(
            "min_val ({min_val}) must not exceed max_val ({max_val})"
        )));
    }
    Ok(rand::thread_rng().gen_range(min_val..=max_val))
}
