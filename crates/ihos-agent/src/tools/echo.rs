use async_trait::async_trait;
use serde_json::json;

use crate::error::ToolError;
use crate::state::ToolArgs;
use crate::tools::{arg_str, Tool, ToolDescriptor, ToolParam};

/// Returns its input unchanged. The universal fallback tool.
pub struct EchoTool {
    descriptor: ToolDescriptor,
}

impl EchoTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new("echo", "Trả lại nguyên văn input (debug).")
                .param(ToolParam::optional("text", "Nội dung cần lặp lại", Some(json!("")))),
        }
    }
}

impl Default for EchoTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: &ToolArgs) -> Result<String, ToolError> {
        let text = arg_str(args, "text").unwrap_or_default();
        if text.is_empty() {
            Ok("ECHO: (empty)".to_string())
        } else {
            Ok(format!("ECHO: {}", text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo() {
        let tool = EchoTool::new();
        let mut args = ToolArgs::new();
        assert_eq!(tool.invoke(&args).await.unwrap(), "ECHO: (empty)");
        args.insert("text".into(), json!("xin chào"));
        assert_eq!(tool.invoke(&args).await.unwrap(), "ECHO: xin chào");
    }
}
