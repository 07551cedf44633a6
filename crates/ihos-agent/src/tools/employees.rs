use async_trait::async_trait;
use serde_json::json;

use ihos_storage::{BusinessRepository, Employee};

use crate::error::ToolError;
use crate::state::ToolArgs;
use crate::tools::{require_str, Tool, ToolDescriptor, ToolParam};

fn render(employees: &[Employee]) -> Result<String, ToolError> {
    serde_json::to_string(&json!({"count": employees.len(), "items": employees}))
        .map_err(|e| ToolError::Failed(e.to_string()))
}

/// Lists every employee with their department.
pub struct AllEmployeesTool {
    descriptor: ToolDescriptor,
    repo: BusinessRepository,
}

impl AllEmployeesTool {
    pub fn new(repo: BusinessRepository) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "all_employees",
                "Lấy danh sách toàn bộ nhân viên và phòng ban. Trả JSON.",
            ),
            repo,
        }
    }
}

#[async_trait]
impl Tool for AllEmployeesTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, _args: &ToolArgs) -> Result<String, ToolError> {
        render(&self.repo.list_employees()?)
    }
}

/// Employees of the named departments.
pub struct EmployeesByDepartmentTool {
    descriptor: ToolDescriptor,
    repo: BusinessRepository,
}

impl EmployeesByDepartmentTool {
    pub fn new(repo: BusinessRepository) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "employees_by_department_names",
                "Lấy nhân viên theo tên phòng ban. Trả JSON.",
            )
            .param(ToolParam::required(
                "departments",
                "Tên các phòng ban, phân tách bằng dấu phẩy",
            )),
            repo,
        }
    }
}

#[async_trait]
impl Tool for EmployeesByDepartmentTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: &ToolArgs) -> Result<String, ToolError> {
        let departments: Vec<String> = match args.get("departments") {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => require_str(args, "departments")?
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
        };
        if departments.is_empty() {
            return Err(ToolError::InvalidArguments("missing 'departments'".into()));
        }
        render(&self.repo.employees_by_departments(&departments)?)
    }
}
