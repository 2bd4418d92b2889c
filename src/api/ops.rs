use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::storage::TaskInput;

/// Body of the operation endpoint and of `subscribe` frames:
/// `{"operation": "<name>", "variables": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationEnvelope {
    pub operation: String,
    #[serde(default)]
    pub variables: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Employee { id: String },
    Employees,
    GetEmployeesByTeam,
    TasksForEmployee,
    Messages,
    UnicastMessages { sender_id: String, receiver_id: String },
    CreateOrUpdateTask { input: TaskInput },
    DeleteTask { id: String },
    AddMessage { text: String },
    AddUnicastMessage { text: String, receiver_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionRequest {
    MessageAdded,
    UnicastMessageAdded { peer_id: Option<String> },
}

#[derive(Deserialize)]
struct IdVars { id: String }

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationVars { sender_id: String, receiver_id: String }

#[derive(Deserialize)]
struct TaskVars { input: TaskInput }

#[derive(Deserialize)]
struct TextVars { text: String }

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnicastTextVars { text: String, receiver_id: String }

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct PeerVars { peer_id: Option<String> }

fn vars<T: DeserializeOwned>(op: &str, variables: Option<&Value>) -> AppResult<T> {
    let v = variables.cloned().unwrap_or(Value::Object(Default::default()));
    serde_json::from_value(v)
        .map_err(|e| AppError::validation("bad_variables".to_string(), format!("invalid variables for {}: {}", op, e)))
}

fn unknown(op: &str) -> AppError {
    AppError::validation("unknown_operation".to_string(), format!("unknown operation '{}'", op))
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Employee { .. } => "employee",
            Operation::Employees => "employees",
            Operation::GetEmployeesByTeam => "getEmployeesByTeam",
            Operation::TasksForEmployee => "tasksForEmployee",
            Operation::Messages => "messages",
            Operation::UnicastMessages { .. } => "unicastMessages",
            Operation::CreateOrUpdateTask { .. } => "createOrUpdateTask",
            Operation::DeleteTask { .. } => "deleteTask",
            Operation::AddMessage { .. } => "addMessage",
            Operation::AddUnicastMessage { .. } => "addUnicastMessage",
        }
    }

    pub fn parse(env: &OperationEnvelope) -> AppResult<Self> {
        let op = env.operation.as_str();
        let v = env.variables.as_ref();
        Ok(match op {
            "employee" => { let IdVars { id } = vars(op, v)?; Operation::Employee { id } }
            "employees" => Operation::Employees,
            "getEmployeesByTeam" => Operation::GetEmployeesByTeam,
            "tasksForEmployee" => Operation::TasksForEmployee,
            "messages" => Operation::Messages,
            "unicastMessages" => {
                let ConversationVars { sender_id, receiver_id } = vars(op, v)?;
                Operation::UnicastMessages { sender_id, receiver_id }
            }
            "createOrUpdateTask" => { let TaskVars { input } = vars(op, v)?; Operation::CreateOrUpdateTask { input } }
            "deleteTask" => { let IdVars { id } = vars(op, v)?; Operation::DeleteTask { id } }
            "addMessage" => { let TextVars { text } = vars(op, v)?; Operation::AddMessage { text } }
            "addUnicastMessage" => {
                let UnicastTextVars { text, receiver_id } = vars(op, v)?;
                Operation::AddUnicastMessage { text, receiver_id }
            }
            _ => return Err(unknown(op)),
        })
    }
}

impl SubscriptionRequest {
    pub fn name(&self) -> &'static str {
        match self {
            SubscriptionRequest::MessageAdded => "messageAdded",
            SubscriptionRequest::UnicastMessageAdded { .. } => "unicastMessageAdded",
        }
    }

    pub fn parse(env: &OperationEnvelope) -> AppResult<Self> {
        let op = env.operation.as_str();
        match op {
            "messageAdded" => Ok(SubscriptionRequest::MessageAdded),
            "unicastMessageAdded" => {
                let PeerVars { peer_id } = vars(op, env.variables.as_ref())?;
                Ok(SubscriptionRequest::UnicastMessageAdded { peer_id })
            }
            _ => Err(unknown(op)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(v: Value) -> OperationEnvelope {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn parses_operations_with_and_without_variables() {
        assert_eq!(Operation::parse(&env(json!({"operation": "employees"}))).unwrap(), Operation::Employees);
        assert_eq!(
            Operation::parse(&env(json!({"operation": "messages", "variables": {}}))).unwrap(),
            Operation::Messages
        );
        assert_eq!(
            Operation::parse(&env(json!({"operation": "unicastMessages", "variables": {"senderId": "a", "receiverId": "b"}}))).unwrap(),
            Operation::UnicastMessages { sender_id: "a".into(), receiver_id: "b".into() }
        );
    }

    #[test]
    fn task_input_defaults_apply_through_the_envelope() {
        let op = Operation::parse(&env(json!({
            "operation": "createOrUpdateTask",
            "variables": {"input": {"title": "A", "completionDate": "2025-03-01"}}
        })))
        .unwrap();
        let Operation::CreateOrUpdateTask { input } = op else { panic!("wrong operation") };
        assert_eq!(input.id, None);
        assert!(!input.priority && !input.pinned);
        assert_eq!(input.completion_date.map(|d| d.to_string()).as_deref(), Some("2025-03-01"));
    }

    #[test]
    fn missing_variables_and_unknown_names_are_rejected() {
        let err = Operation::parse(&env(json!({"operation": "deleteTask"}))).unwrap_err();
        assert_eq!(err.code_str(), "bad_variables");
        let err = Operation::parse(&env(json!({"operation": "dropEverything"}))).unwrap_err();
        assert_eq!(err.code_str(), "unknown_operation");
    }

    #[test]
    fn parses_subscriptions() {
        assert_eq!(SubscriptionRequest::parse(&env(json!({"operation": "messageAdded"}))).unwrap(), SubscriptionRequest::MessageAdded);
        assert_eq!(
            SubscriptionRequest::parse(&env(json!({"operation": "unicastMessageAdded", "variables": {"peerId": "b"}}))).unwrap(),
            SubscriptionRequest::UnicastMessageAdded { peer_id: Some("b".into()) }
        );
        assert_eq!(
            SubscriptionRequest::parse(&env(json!({"operation": "unicastMessageAdded"}))).unwrap(),
            SubscriptionRequest::UnicastMessageAdded { peer_id: None }
        );
        assert!(SubscriptionRequest::parse(&env(json!({"operation": "employees"}))).is_err());
    }
}
