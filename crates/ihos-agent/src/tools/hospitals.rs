use async_trait::async_trait;
use serde_json::json;

use ihos_storage::BusinessRepository;

use crate::error::ToolError;
use crate::state::ToolArgs;
use crate::tools::{arg_str, Tool, ToolDescriptor, ToolParam};

const MAX_HITS: usize = 5;

/// Keyword lookup over hospital records.
pub struct HospitalListTool {
    descriptor: ToolDescriptor,
    repo: BusinessRepository,
}

impl HospitalListTool {
    pub fn new(repo: BusinessRepository) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "hospital_list",
                "Tra cứu bệnh viện theo từ khóa (tên, tỉnh, chuyên khoa). Tham số: keyword (ví dụ 'Ha Noi tim mach'). Trả JSON.",
            )
            .param(ToolParam::required("keyword", "Từ khóa tìm kiếm")),
            repo,
        }
    }
}

#[async_trait]
impl Tool for HospitalListTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: &ToolArgs) -> Result<String, ToolError> {
        let keyword = arg_str(args, "keyword").unwrap_or_default();
        let items = self.repo.search_hospitals_by_keyword(&keyword, MAX_HITS)?;
        serde_json::to_string(&json!({"count": items.len(), "items": items}))
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ihos_storage::{Database, Hospital, SqliteDocumentStore};
    use serde_json::Value;

    #[tokio::test]
    async fn test_keyword_search_caps_hits() {
        let db = Arc::new(Database::in_memory().unwrap());
        let repo = BusinessRepository::new(Arc::new(SqliteDocumentStore::new(db)));
        for i in 0..7 {
            repo.add_hospital(&Hospital {
                id: None,
                name: format!("Bệnh viện {}", i),
                province: "Ha Noi".to_string(),
                specialties: "tim mach".to_string(),
                level: "Hạng I".to_string(),
            })
            .unwrap();
        }
        let tool = HospitalListTool::new(repo);

        let args = json!({"keyword": "ha noi TIM"}).as_object().cloned().unwrap();
        let v: Value = serde_json::from_str(&tool.invoke(&args).await.unwrap()).unwrap();
        assert_eq!(v["count"], 5);
        assert_eq!(v["items"].as_array().unwrap().len(), 5);

        let args = json!({"keyword": "da nang"}).as_object().cloned().unwrap();
        let v: Value = serde_json::from_str(&tool.invoke(&args).await.unwrap()).unwrap();
        assert_eq!(v["count"], 0);
    }
}
