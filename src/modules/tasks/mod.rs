pub mod models;

use taskdb_kernel::{CollectionModule, FieldRule, IndexSpec, Validator};

use models::{TaskPriority, TaskStatus};

/// Tasks owned by users. `user_id` is not checked against `users`.
pub struct TasksModule;

impl TasksModule {
    pub const fn new() -> Self {
        Self
    }
}

impl CollectionModule for TasksModule {
    fn name(&self) -> &'static str {
        "tasks"
    }

    fn validator(&self) -> Option<Validator> {
        Some(
            Validator::object()
                .required_field(
                    "title",
                    FieldRule::string().describe("must be a string and is required"),
                )
                .field(
                    "description",
                    FieldRule::string().describe("must be a string"),
                )
                .field(
                    "status",
                    FieldRule::one_of(TaskStatus::ALL.iter().map(TaskStatus::as_str))
                        .describe("can only be one of the enum values"),
                )
                .field(
                    "priority",
                    FieldRule::one_of(TaskPriority::ALL.iter().map(TaskPriority::as_str))
                        .describe("can only be one of the enum values"),
                )
                .required_field(
                    "user_id",
                    FieldRule::string().describe("must be a string and is required"),
                ),
        )
    }

    fn indexes(&self) -> Vec<IndexSpec> {
        vec![
            IndexSpec::ascending("user_id"),
            IndexSpec::ascending("status"),
            IndexSpec::ascending("priority"),
            IndexSpec::ascending("due_date"),
        ]
    }
}

/// Create a new instance of the tasks module
pub fn create_module() -> std::sync::Arc<dyn CollectionModule> {
    std::sync::Arc::new(TasksModule::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskdb_kernel::Violation;

    #[test]
    fn status_and_priority_are_enumerated() {
        let schema = TasksModule::new().validator().unwrap().to_json_schema();
        let properties = &schema["$jsonSchema"]["properties"];

        assert_eq!(
            properties["status"]["enum"],
            json!(["pending", "in_progress", "completed", "cancelled"])
        );
        assert_eq!(
            properties["priority"]["enum"],
            json!(["low", "medium", "high", "urgent"])
        );
        assert_eq!(schema["$jsonSchema"]["required"], json!(["title", "user_id"]));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let validator = TasksModule::new().validator().unwrap();

        assert!(validator
            .validate(&json!({ "title": "t", "user_id": "1", "status": "archived" }))
            .is_err());
        assert!(validator
            .validate(&json!({ "title": "t", "user_id": "1", "status": "pending", "priority": "urgent" }))
            .is_ok());
    }

    #[test]
    fn unknown_priority_is_rejected() {
        let validator = TasksModule::new().validator().unwrap();

        let err = validator
            .validate(&json!({ "title": "t", "user_id": "1", "priority": "critical" }))
            .unwrap_err();
        assert!(matches!(&err[..], [Violation::NotInEnum { field, .. }] if field == "priority"));
    }

    #[test]
    fn indexes_cover_lookup_fields() {
        let names: Vec<_> = TasksModule::new()
            .indexes()
            .iter()
            .map(IndexSpec::name)
            .collect();
        assert_eq!(names, vec!["user_id_1", "status_1", "priority_1", "due_date_1"]);
    }
}
