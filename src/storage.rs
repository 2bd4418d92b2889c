//!
//! crewdesk storage module
//! ------------------------
//! Records (employees, tasks, messages) live in a document store reached through
//! the narrow [`DocumentStore`] collaborator trait. Everything above this module
//! only talks to `dyn DocumentStore`, so a networked database can replace the
//! bundled [`MemoryStore`] without touching identity, task or bus code.
//!
//! Key responsibilities:
//! - Employee lookups by id, email and team; employee insertion on signup.
//! - Task persistence keyed by owner, with insertion order preserved.
//! - The append-only message log and its broadcast / conversation read paths.
//!
//! Handlers share the store as a [`SharedStore`] (`Arc<dyn DocumentStore>`).

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppResult;

pub mod memory;
pub mod models;

pub use memory::MemoryStore;
pub use models::{
    Audience, Employee, EmployeeProfile, Message, MessageFilter, NewEmployee, NewMessage, Task, TaskInput,
};

pub type SharedStore = Arc<dyn DocumentStore>;

/// External document store consumed by the core. Calls may block on I/O; callers
/// must not hold locks across them.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_employee_by_email(&self, email: &str) -> AppResult<Option<Employee>>;
    async fn find_employee_by_id(&self, id: &str) -> AppResult<Option<Employee>>;
    async fn find_employees(&self) -> AppResult<Vec<Employee>>;
    async fn find_employees_by_team(&self, team: &str) -> AppResult<Vec<Employee>>;
    async fn insert_employee(&self, profile: NewEmployee) -> AppResult<Employee>;

    /// Tasks owned by `owner`, in insertion order.
    async fn find_tasks_by_owner(&self, owner: &str) -> AppResult<Vec<Task>>;
    async fn insert_task(&self, task: Task) -> AppResult<Task>;
    /// Replace the stored task with the same id. Errors with NotFound if absent.
    async fn update_task(&self, task: Task) -> AppResult<Task>;
    /// Returns `false` when no task had that id.
    async fn delete_task(&self, id: &str) -> AppResult<bool>;

    /// Append to the message log; the store assigns id and timestamp.
    async fn insert_message(&self, message: NewMessage) -> AppResult<Message>;
    /// Matching messages in append order.
    async fn find_messages(&self, filter: &MessageFilter) -> AppResult<Vec<Message>>;
}
