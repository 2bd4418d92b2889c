use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::{Employee, Message, MessageFilter, NewEmployee, NewMessage, Task};
use super::DocumentStore;
use crate::error::{AppError, AppResult};

/// All documents held by a [`MemoryStore`]. Vectors keep insertion order, which the
/// task ordering tie-break and the message log both rely on.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Documents {
    #[serde(default)]
    employees: Vec<Employee>,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    created_ms: i64,
    documents: Documents,
}

/// In-process document store.
///
/// With a snapshot path every successful write rewrites `<path>` as pretty JSON
/// (write to `<path>.tmp`, then rename), and [`MemoryStore::open`] reloads it.
/// The file write runs on the blocking pool after the document lock is released;
/// `persist_gate` keeps snapshot writers one at a time so a failed write can be
/// rolled back without clobbering a later change.
#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<Documents>>,
    snapshot: Option<PathBuf>,
    persist_gate: Arc<tokio::sync::Mutex<()>>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn persist(path: &Path, docs: Documents) -> AppResult<()> {
    let snap = Snapshot { version: 1, created_ms: Utc::now().timestamp_millis(), documents: docs };
    let bytes = serde_json::to_vec_pretty(&snap)
        .map_err(|e| AppError::internal("snapshot_encode".to_string(), e.to_string()))?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)
        .and_then(|_| std::fs::rename(&tmp, path))
        .map_err(|e| {
            warn!(target: "crewdesk::storage", "snapshot write failed for '{}': {}", path.display(), e);
            AppError::internal("snapshot_write".to_string(), e.to_string())
        })
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a snapshot-backed store, loading `path` if it exists.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let docs = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let snap: Snapshot = serde_json::from_slice(&bytes)?;
            debug!(
                target: "crewdesk::storage",
                "loaded snapshot '{}' (employees={}, tasks={}, messages={})",
                path.display(), snap.documents.employees.len(), snap.documents.tasks.len(), snap.documents.messages.len()
            );
            snap.documents
        } else {
            if let Some(dir) = path.parent() { std::fs::create_dir_all(dir).ok(); }
            Documents::default()
        };
        Ok(Self { docs: Arc::new(RwLock::new(docs)), snapshot: Some(path), persist_gate: Arc::default() })
    }

    /// Apply `f` to the documents and persist. On persistence failure the in-memory
    /// change is rolled back so memory never runs ahead of the snapshot.
    async fn write<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&mut Documents) -> AppResult<T> + Send,
        T: Send,
    {
        let Some(path) = self.snapshot.clone() else {
            return f(&mut self.docs.write());
        };
        let _gate = self.persist_gate.lock().await;
        let (out, before, after) = {
            let mut docs = self.docs.write();
            let before = docs.clone();
            let out = f(&mut docs)?;
            (out, before, docs.clone())
        };
        let persisted = tokio::task::spawn_blocking(move || persist(&path, after))
            .await
            .map_err(|e| AppError::internal("snapshot_task".to_string(), e.to_string()))
            .and_then(|r| r);
        if let Err(e) = persisted {
            *self.docs.write() = before;
            return Err(e);
        }
        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_employee_by_email(&self, email: &str) -> AppResult<Option<Employee>> {
        let docs = self.docs.read();
        Ok(docs.employees.iter().find(|e| e.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn find_employee_by_id(&self, id: &str) -> AppResult<Option<Employee>> {
        Ok(self.docs.read().employees.iter().find(|e| e.id == id).cloned())
    }

    async fn find_employees(&self) -> AppResult<Vec<Employee>> {
        Ok(self.docs.read().employees.clone())
    }

    async fn find_employees_by_team(&self, team: &str) -> AppResult<Vec<Employee>> {
        Ok(self.docs.read().employees.iter().filter(|e| e.team == team).cloned().collect())
    }

    async fn insert_employee(&self, profile: NewEmployee) -> AppResult<Employee> {
        self.write(|docs| {
            if docs.employees.iter().any(|e| e.email.eq_ignore_ascii_case(&profile.email)) {
                return Err(AppError::conflict("email_exists", "email already exists"));
            }
            let employee = Employee {
                id: new_id(),
                email: profile.email,
                password_hash: profile.password_hash,
                first_name: profile.first_name,
                last_name: profile.last_name,
                dob: profile.dob,
                mobile_no: profile.mobile_no,
                pan: profile.pan,
                gender: profile.gender,
                team: profile.team,
                designation: profile.designation,
                address: profile.address,
                address2: profile.address2,
                city: profile.city,
                zip: profile.zip,
            };
            docs.employees.push(employee.clone());
            Ok(employee)
        })
        .await
    }

    async fn find_tasks_by_owner(&self, owner: &str) -> AppResult<Vec<Task>> {
        Ok(self.docs.read().tasks.iter().filter(|t| t.owner_employee_id == owner).cloned().collect())
    }

    async fn insert_task(&self, task: Task) -> AppResult<Task> {
        self.write(|docs| {
            if docs.tasks.iter().any(|t| t.id == task.id) {
                return Err(AppError::conflict("task_exists".to_string(), format!("task {} already exists", task.id)));
            }
            docs.tasks.push(task.clone());
            Ok(task)
        })
        .await
    }

    async fn update_task(&self, task: Task) -> AppResult<Task> {
        self.write(|docs| {
            let Some(slot) = docs.tasks.iter_mut().find(|t| t.id == task.id) else {
                return Err(AppError::not_found("task_not_found".to_string(), format!("task {} not found", task.id)));
            };
            *slot = task.clone();
            Ok(task)
        })
        .await
    }

    async fn delete_task(&self, id: &str) -> AppResult<bool> {
        self.write(|docs| {
            let before = docs.tasks.len();
            docs.tasks.retain(|t| t.id != id);
            Ok(docs.tasks.len() != before)
        })
        .await
    }

    async fn insert_message(&self, message: NewMessage) -> AppResult<Message> {
        self.write(|docs| {
            let stored = Message {
                id: new_id(),
                sender_id: message.sender_id,
                sender_name: message.sender_name,
                text: message.text,
                timestamp: Utc::now(),
                receiver_id: message.receiver_id,
            };
            docs.messages.push(stored.clone());
            Ok(stored)
        })
        .await
    }

    async fn find_messages(&self, filter: &MessageFilter) -> AppResult<Vec<Message>> {
        Ok(self.docs.read().messages.iter().filter(|m| filter.matches(m)).cloned().collect())
    }
}
