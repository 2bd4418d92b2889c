//! Record types owned by the document store and the explicit input records
//! accepted from callers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Employee document as stored. Carries the Argon2 PHC hash; never serialize this
/// type to a client, use [`EmployeeProfile`] instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub mobile_no: String,
    #[serde(default)]
    pub pan: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub designation: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub address2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub zip: String,
}

/// Profile handed to the store on signup; the store assigns the id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewEmployee {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<String>,
    pub mobile_no: String,
    pub pan: String,
    pub gender: String,
    pub team: String,
    pub designation: String,
    pub address: String,
    pub address2: String,
    pub city: String,
    pub zip: String,
}

/// Client-facing employee view (no password hash).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeProfile {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<String>,
    pub mobile_no: String,
    pub pan: String,
    pub gender: String,
    pub team: String,
    pub designation: String,
    pub address: String,
    pub address2: String,
    pub city: String,
    pub zip: String,
}

impl From<&Employee> for EmployeeProfile {
    fn from(e: &Employee) -> Self {
        Self {
            id: e.id.clone(),
            email: e.email.clone(),
            first_name: e.first_name.clone(),
            last_name: e.last_name.clone(),
            dob: e.dob.clone(),
            mobile_no: e.mobile_no.clone(),
            pan: e.pan.clone(),
            gender: e.gender.clone(),
            team: e.team.clone(),
            designation: e.designation.clone(),
            address: e.address.clone(),
            address2: e.address2.clone(),
            city: e.city.clone(),
            zip: e.zip.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(alias = "empId")]
    pub owner_employee_id: String,
    #[serde(default)]
    pub assignee_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub task_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
    pub assigned_date: NaiveDate,
    #[serde(default)]
    pub priority: bool,
    #[serde(default)]
    pub pinned: bool,
}

/// Create-or-update input for a task.
///
/// `id` absent (or unknown to the caller) creates a new task; `priority` and
/// `pinned` default to `false` when omitted, on create and on update alike.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub task_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: bool,
    #[serde(default)]
    pub pinned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<String>,
}

/// Who a message is addressed to. Every message is exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience<'a> {
    Broadcast,
    Unicast { receiver_id: &'a str },
}

impl Message {
    pub fn audience(&self) -> Audience<'_> {
        match self.receiver_id.as_deref() {
            Some(receiver_id) => Audience::Unicast { receiver_id },
            None => Audience::Broadcast,
        }
    }

    /// True when `participant` sent or received this unicast message.
    pub fn involves(&self, participant: &str) -> bool {
        match self.audience() {
            Audience::Unicast { receiver_id } => self.sender_id == participant || receiver_id == participant,
            Audience::Broadcast => false,
        }
    }

    /// True when this is a unicast message between `a` and `b`, in either direction.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        match self.audience() {
            Audience::Unicast { receiver_id } => {
                (self.sender_id == a && receiver_id == b) || (self.sender_id == b && receiver_id == a)
            }
            Audience::Broadcast => false,
        }
    }
}

/// A message before the store has assigned id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub receiver_id: Option<String>,
}

/// Read-path filter over the message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    Broadcast,
    /// Unicast messages between two participants, either direction.
    Conversation { a: String, b: String },
}

impl MessageFilter {
    pub fn matches(&self, m: &Message) -> bool {
        match self {
            MessageFilter::Broadcast => m.audience() == Audience::Broadcast,
            MessageFilter::Conversation { a, b } => m.is_between(a, b),
        }
    }
}
