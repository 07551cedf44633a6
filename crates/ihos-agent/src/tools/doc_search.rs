use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use ihos_knowledge::pipeline::DEFAULT_TOP_K;
use ihos_knowledge::KnowledgePipeline;

use crate::error::ToolError;
use crate::state::ToolArgs;
use crate::tools::{arg_usize, require_str, ParamType, Tool, ToolDescriptor, ToolParam};

/// Semantic search over ingested IHOS documents.
pub struct DocSearchTool {
    descriptor: ToolDescriptor,
    pipeline: Arc<KnowledgePipeline>,
    default_k: usize,
}

impl DocSearchTool {
    pub fn new(pipeline: Arc<KnowledgePipeline>) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "ihos_doc_search",
                "Tra cứu tài liệu nội bộ IHOS theo câu hỏi. Trả JSON các đoạn liên quan nhất.",
            )
            .param(ToolParam::required("query", "Câu hỏi hoặc từ khóa cần tra cứu"))
            .param(
                ToolParam::optional("k", "Số đoạn trả về", Some(json!(DEFAULT_TOP_K)))
                    .kind(ParamType::Integer),
            ),
            pipeline,
            default_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k.max(1);
        self
    }
}

#[async_trait]
impl Tool for DocSearchTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: &ToolArgs) -> Result<String, ToolError> {
        let query = require_str(args, "query")?;
        let k = arg_usize(args, "k")?.filter(|k| *k > 0).unwrap_or(self.default_k);
        let result = self.pipeline.query(&query, k).await?;
        debug!(k, matches = result.matches.len(), "doc search");
        serde_json::to_string(&result).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ihos_knowledge::store::{InMemoryVectorStore, IndexSpec};
    use ihos_knowledge::{MockEmbedding, VectorIndexManager};
    use serde_json::Value;

    fn pipeline() -> Arc<KnowledgePipeline> {
        let index = Arc::new(VectorIndexManager::new(
            Arc::new(InMemoryVectorStore::new()),
            "docs",
            IndexSpec::default(),
        ));
        Arc::new(KnowledgePipeline::new(
            Arc::new(MockEmbedding::with_dimensions(16)),
            index,
        ))
    }

    #[tokio::test]
    async fn test_search_returns_json_matches() {
        let pipeline = pipeline();
        pipeline
            .ingest("quy-dinh", "nhân viên phải đặt phòng họp trước một ngày", 4, 1)
            .await
            .unwrap();
        let tool = DocSearchTool::new(Arc::clone(&pipeline)).with_default_k(2);

        let args = json!({"query": "đặt phòng họp"}).as_object().cloned().unwrap();
        let out: Value = serde_json::from_str(&tool.invoke(&args).await.unwrap()).unwrap();
        assert_eq!(out["query"], "đặt phòng họp");
        assert_eq!(out["matches"].as_array().unwrap().len(), 2);
        assert_eq!(out["best_match"]["doc_id"], "quy-dinh");
    }

    #[tokio::test]
    async fn test_missing_query_is_invalid() {
        let tool = DocSearchTool::new(pipeline());
        let err = tool.invoke(&ToolArgs::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
