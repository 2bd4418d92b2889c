//! Task upsert and ordered retrieval.
//!
//! Tasks are always read through their owner, so a caller can only ever see,
//! update or delete its own tasks. Listing order is
//! `(priority desc, pinned desc, completion_date asc)`; undated tasks go after
//! dated ones inside a group, and remaining ties keep insertion order.

use std::cmp::{Ordering, Reverse};

use chrono::{NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::storage::{SharedStore, Task, TaskInput};

/// Sort tasks into listing order in place. Stable.
pub fn order_tasks(tasks: &mut [Task]) {
    tasks.sort_by(compare_tasks);
}

fn compare_tasks(a: &Task, b: &Task) -> Ordering {
    let key = |t: &Task| (Reverse(t.priority), Reverse(t.pinned), t.completion_date.is_none(), t.completion_date);
    key(a).cmp(&key(b))
}

#[derive(Clone)]
pub struct TaskOrderingStore {
    store: SharedStore,
}

impl TaskOrderingStore {
    pub fn new(store: SharedStore) -> Self { Self { store } }

    /// Create-or-update by id, as seen by `owner`.
    pub async fn upsert(&self, owner: &str, input: TaskInput) -> AppResult<Task> {
        self.upsert_on(owner, input, Utc::now().date_naive()).await
    }

    /// [`upsert`](Self::upsert) with an explicit creation date.
    pub async fn upsert_on(&self, owner: &str, input: TaskInput, today: NaiveDate) -> AppResult<Task> {
        if input.title.trim().is_empty() {
            return Err(AppError::validation("missing_title", "task title is required"));
        }
        let existing = match input.id.as_deref() {
            Some(id) => self.find_owned(owner, id).await?,
            None => None,
        };
        match existing {
            Some(mut task) => {
                task.assignee_id = input.assignee_id;
                task.title = input.title;
                task.description = input.description;
                task.task_type = input.task_type;
                task.status = input.status;
                task.completion_date = input.completion_date;
                task.priority = input.priority;
                task.pinned = input.pinned;
                debug!(target: "tasks", "task.update id={} owner={}", task.id, owner);
                self.store.update_task(task).await
            }
            None => {
                let task = Task {
                    id: Uuid::new_v4().to_string(),
                    owner_employee_id: owner.to_string(),
                    assignee_id: input.assignee_id,
                    title: input.title,
                    description: input.description,
                    task_type: input.task_type,
                    status: input.status,
                    completion_date: input.completion_date,
                    assigned_date: today,
                    priority: input.priority,
                    pinned: input.pinned,
                };
                debug!(target: "tasks", "task.create id={} owner={} requested_id={:?}", task.id, owner, input.id);
                self.store.insert_task(task).await
            }
        }
    }

    pub async fn list_for_employee(&self, owner: &str) -> AppResult<Vec<Task>> {
        let mut tasks = self.store.find_tasks_by_owner(owner).await?;
        order_tasks(&mut tasks);
        Ok(tasks)
    }

    /// Delete one of `owner`'s tasks. Unknown ids are an error, not a no-op.
    pub async fn delete(&self, owner: &str, task_id: &str) -> AppResult<()> {
        let not_found = || AppError::not_found("task_not_found".to_string(), format!("task {} not found", task_id));
        if self.find_owned(owner, task_id).await?.is_none() {
            return Err(not_found());
        }
        if !self.store.delete_task(task_id).await? {
            return Err(not_found());
        }
        debug!(target: "tasks", "task.delete id={} owner={}", task_id, owner);
        Ok(())
    }

    async fn find_owned(&self, owner: &str, id: &str) -> AppResult<Option<Task>> {
        Ok(self.store.find_tasks_by_owner(owner).await?.into_iter().find(|t| t.id == id))
    }
}
