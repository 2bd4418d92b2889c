//! Query / mutation / subscription surface.
//!
//! Every operation takes the caller's [`IdentityContext`] and passes it through the
//! authorization gate before touching the store or the bus. Login and signup are
//! not here; they live on the HTTP routes and need no identity.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use crate::bus::{MessageBus, Subscription};
use crate::error::{AppError, AppResult};
use crate::identity::{require_authenticated, require_participant, IdentityContext};
use crate::storage::{EmployeeProfile, Message, MessageFilter, NewMessage, SharedStore, Task, TaskInput};
use crate::tasks::TaskOrderingStore;

pub mod ops;

pub use ops::{Operation, OperationEnvelope, SubscriptionRequest};

#[derive(Clone)]
pub struct Api {
    store: SharedStore,
    tasks: TaskOrderingStore,
    bus: Arc<MessageBus>,
}

impl Api {
    pub fn new(store: SharedStore, bus: Arc<MessageBus>) -> Self {
        Self { tasks: TaskOrderingStore::new(store.clone()), store, bus }
    }

    pub fn bus(&self) -> &Arc<MessageBus> { &self.bus }

    // --- queries ---

    pub async fn employee(&self, ctx: &IdentityContext, id: &str) -> AppResult<EmployeeProfile> {
        require_authenticated(ctx)?;
        match self.store.find_employee_by_id(id).await? {
            Some(e) => Ok(EmployeeProfile::from(&e)),
            None => Err(AppError::not_found("employee_not_found".to_string(), format!("No employee found with id {}", id))),
        }
    }

    pub async fn employees(&self, ctx: &IdentityContext) -> AppResult<Vec<EmployeeProfile>> {
        require_authenticated(ctx)?;
        Ok(self.store.find_employees().await?.iter().map(EmployeeProfile::from).collect())
    }

    /// Members of the caller's own team.
    pub async fn employees_by_team(&self, ctx: &IdentityContext) -> AppResult<Vec<EmployeeProfile>> {
        let claim = require_authenticated(ctx)?;
        let Some(me) = self.store.find_employee_by_id(&claim.sub).await? else {
            return Err(AppError::not_found("employee_not_found".to_string(), format!("No employee found with id {}", claim.sub)));
        };
        Ok(self.store.find_employees_by_team(&me.team).await?.iter().map(EmployeeProfile::from).collect())
    }

    /// The caller's own tasks in listing order.
    pub async fn tasks_for_employee(&self, ctx: &IdentityContext) -> AppResult<Vec<Task>> {
        let claim = require_authenticated(ctx)?;
        self.tasks.list_for_employee(&claim.sub).await
    }

    /// Broadcast history in append order.
    pub async fn messages(&self, ctx: &IdentityContext) -> AppResult<Vec<Message>> {
        require_authenticated(ctx)?;
        self.store.find_messages(&MessageFilter::Broadcast).await
    }

    /// Conversation history between two employees; the caller must be one of them.
    pub async fn unicast_messages(&self, ctx: &IdentityContext, sender_id: &str, receiver_id: &str) -> AppResult<Vec<Message>> {
        require_participant(ctx, sender_id, receiver_id)?;
        self.store
            .find_messages(&MessageFilter::Conversation { a: sender_id.to_string(), b: receiver_id.to_string() })
            .await
    }

    // --- mutations ---

    pub async fn create_or_update_task(&self, ctx: &IdentityContext, input: TaskInput) -> AppResult<Task> {
        let claim = require_authenticated(ctx)?;
        self.tasks.upsert(&claim.sub, input).await
    }

    pub async fn delete_task(&self, ctx: &IdentityContext, id: &str) -> AppResult<bool> {
        let claim = require_authenticated(ctx)?;
        self.tasks.delete(&claim.sub, id).await?;
        Ok(true)
    }

    pub async fn add_message(&self, ctx: &IdentityContext, text: &str) -> AppResult<Message> {
        let message = self.outgoing(ctx, text, None).await?;
        self.bus.publish_broadcast(message).await
    }

    pub async fn add_unicast_message(&self, ctx: &IdentityContext, text: &str, receiver_id: &str) -> AppResult<Message> {
        let message = self.outgoing(ctx, text, Some(receiver_id)).await?;
        if self.store.find_employee_by_id(receiver_id).await?.is_none() {
            return Err(AppError::not_found("employee_not_found".to_string(), format!("No employee found with id {}", receiver_id)));
        }
        self.bus.publish_unicast(message).await
    }

    async fn outgoing(&self, ctx: &IdentityContext, text: &str, receiver_id: Option<&str>) -> AppResult<NewMessage> {
        let claim = require_authenticated(ctx)?;
        if text.trim().is_empty() {
            return Err(AppError::validation("empty_message", "message text is required"));
        }
        let Some(sender) = self.store.find_employee_by_id(&claim.sub).await? else {
            return Err(AppError::not_found("employee_not_found".to_string(), format!("No employee found with id {}", claim.sub)));
        };
        Ok(NewMessage {
            sender_id: sender.id,
            sender_name: sender.first_name,
            text: text.to_string(),
            receiver_id: receiver_id.map(str::to_string),
        })
    }

    // --- subscriptions ---

    pub fn message_added(&self, ctx: &IdentityContext) -> AppResult<Subscription> {
        require_authenticated(ctx)?;
        self.bus.subscribe_broadcast()
    }

    /// Unicast messages to or from the caller, optionally only those exchanged with `peer_id`.
    pub fn unicast_message_added(&self, ctx: &IdentityContext, peer_id: Option<&str>) -> AppResult<Subscription> {
        let claim = require_authenticated(ctx)?;
        self.bus.subscribe_unicast(&claim.sub, peer_id)
    }

    // --- dispatch ---

    /// Run one query or mutation and return `{"<operation>": result}`.
    pub async fn execute(&self, ctx: &IdentityContext, op: Operation) -> AppResult<Value> {
        let name = op.name();
        debug!(target: "api", "api.execute op={} authenticated={}", name, ctx.is_authenticated());
        let value = match op {
            Operation::Employee { id } => serde_json::to_value(self.employee(ctx, &id).await?)?,
            Operation::Employees => serde_json::to_value(self.employees(ctx).await?)?,
            Operation::GetEmployeesByTeam => serde_json::to_value(self.employees_by_team(ctx).await?)?,
            Operation::TasksForEmployee => serde_json::to_value(self.tasks_for_employee(ctx).await?)?,
            Operation::Messages => serde_json::to_value(self.messages(ctx).await?)?,
            Operation::UnicastMessages { sender_id, receiver_id } => {
                serde_json::to_value(self.unicast_messages(ctx, &sender_id, &receiver_id).await?)?
            }
            Operation::CreateOrUpdateTask { input } => serde_json::to_value(self.create_or_update_task(ctx, input).await?)?,
            Operation::DeleteTask { id } => json!(self.delete_task(ctx, &id).await?),
            Operation::AddMessage { text } => serde_json::to_value(self.add_message(ctx, &text).await?)?,
            Operation::AddUnicastMessage { text, receiver_id } => {
                serde_json::to_value(self.add_unicast_message(ctx, &text, &receiver_id).await?)?
            }
        };
        let mut out = serde_json::Map::new();
        out.insert(name.to_string(), value);
        Ok(Value::Object(out))
    }

    pub fn subscribe(&self, ctx: &IdentityContext, req: &SubscriptionRequest) -> AppResult<Subscription> {
        match req {
            SubscriptionRequest::MessageAdded => self.message_added(ctx),
            SubscriptionRequest::UnicastMessageAdded { peer_id } => self.unicast_message_added(ctx, peer_id.as_deref()),
        }
    }
}
