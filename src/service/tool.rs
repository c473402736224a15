use super::{QueryRequest, QueryService};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Name and argument schema advertised to a conversational agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the call arguments
    pub parameters: Value,
}

/// The service exposed as a single agent tool
///
/// Calls go straight to the in-process [`QueryService`]; the answer, or the
/// user-facing error text, comes back as a bare string.
#[derive(Clone)]
pub struct DocumentTool {
    service: Arc<QueryService>,
}

impl DocumentTool {
    pub const NAME: &'static str = "document_qa";

    pub const DESCRIPTION: &'static str = "Answer a question using the content of the loaded \
document. Pass the user's question in natural language; the tool retrieves the relevant \
passages and returns an answer grounded in them.";

    pub fn new(service: Arc<QueryService>) -> Self {
        Self { service }
    }

    pub fn definition() -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: Self::DESCRIPTION.to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The question to answer from the document"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    pub async fn call(&self, query: &str) -> String {
        self.service.handle(QueryRequest::new(query)).await.response
    }

    /// Call with the raw arguments object an agent produced
    pub async fn call_json(&self, arguments: &Value) -> String {
        self.service.handle_json(arguments).await.response
    }
}
