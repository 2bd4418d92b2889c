use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;

use crewdesk::api::{Api, Operation, SubscriptionRequest};
use crewdesk::bus::{MessageBus, Subscription};
use crewdesk::error::AppError;
use crewdesk::identity::{IdentityContext, LocalAuthProvider, SessionManager, SignupRequest};
use crewdesk::storage::{DocumentStore, MemoryStore, Message, MessageFilter, SharedStore, TaskInput};

struct Harness {
    store: Arc<MemoryStore>,
    api: Api,
    auth: LocalAuthProvider,
    sm: Arc<SessionManager>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let shared: SharedStore = store.clone();
    let sm = Arc::new(SessionManager::new(b"api-tests", Duration::from_secs(3600)));
    let bus = Arc::new(MessageBus::new(shared.clone()));
    Harness { api: Api::new(shared.clone(), bus), auth: LocalAuthProvider::new(shared, sm.clone()), store, sm }
}

impl Harness {
    async fn employee(&self, email: &str, first: &str, team: &str) -> (String, IdentityContext) {
        let resp = self
            .auth
            .signup(SignupRequest {
                email: email.into(),
                password: "pw".into(),
                first_name: first.into(),
                team: team.into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let claim = self.sm.verify(&resp.token).unwrap();
        (resp.user.id, IdentityContext::Authenticated(claim))
    }
}

async fn next(sub: &mut Subscription) -> Option<Message> {
    tokio::time::timeout(Duration::from_millis(500), sub.recv()).await.ok().flatten()
}

fn protected_operations() -> Vec<Operation> {
    vec![
        Operation::Employee { id: "e1".into() },
        Operation::Employees,
        Operation::GetEmployeesByTeam,
        Operation::TasksForEmployee,
        Operation::Messages,
        Operation::UnicastMessages { sender_id: "a".into(), receiver_id: "b".into() },
        Operation::CreateOrUpdateTask { input: TaskInput { title: "x".into(), ..Default::default() } },
        Operation::DeleteTask { id: "t1".into() },
        Operation::AddMessage { text: "hi".into() },
        Operation::AddUnicastMessage { text: "hi".into(), receiver_id: "b".into() },
    ]
}

#[tokio::test]
async fn anonymous_callers_are_rejected_before_any_effect() {
    let h = harness();
    let (owner, _) = h.employee("ada@x.io", "Ada", "core").await;
    let anon = IdentityContext::Anonymous;
    for op in protected_operations() {
        let name = op.name();
        let err = h.api.execute(&anon, op).await.unwrap_err();
        assert_eq!(err, AppError::unauthorized(), "operation {name}");
        assert_eq!(err.to_api_error()["extensions"]["code"], "UNAUTHORIZED");
    }
    assert!(h.store.find_tasks_by_owner(&owner).await.unwrap().is_empty());
    assert!(h.store.find_messages(&MessageFilter::Broadcast).await.unwrap().is_empty());

    for req in [SubscriptionRequest::MessageAdded, SubscriptionRequest::UnicastMessageAdded { peer_id: None }] {
        assert!(matches!(h.api.subscribe(&anon, &req), Err(AppError::Authorization { .. })));
    }
    assert_eq!(h.api.bus().subscriber_count(), 0);
}

#[tokio::test]
async fn task_flow_orders_and_updates_in_place() {
    let h = harness();
    let (_, ctx) = h.employee("ada@x.io", "Ada", "core").await;
    let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();

    let t1 = h
        .api
        .create_or_update_task(&ctx, TaskInput { title: "T1".into(), priority: true, completion_date: d("2025-03-01"), ..Default::default() })
        .await
        .unwrap();
    let t2 = h
        .api
        .create_or_update_task(&ctx, TaskInput { title: "T2".into(), pinned: true, completion_date: d("2025-01-01"), ..Default::default() })
        .await
        .unwrap();
    let t3 = h
        .api
        .create_or_update_task(&ctx, TaskInput { title: "T3".into(), priority: true, pinned: true, completion_date: d("2025-02-01"), ..Default::default() })
        .await
        .unwrap();

    let listed: Vec<String> = h.api.tasks_for_employee(&ctx).await.unwrap().into_iter().map(|t| t.id).collect();
    assert_eq!(listed, vec![t3.id.clone(), t1.id.clone(), t2.id.clone()]);

    let updated = h
        .api
        .create_or_update_task(&ctx, TaskInput { id: Some(t2.id.clone()), title: "T2b".into(), priority: true, pinned: true, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(updated.id, t2.id);
    assert_eq!(updated.assigned_date, t2.assigned_date);
    assert_eq!(h.api.tasks_for_employee(&ctx).await.unwrap().len(), 3);

    assert!(h.api.delete_task(&ctx, &t1.id).await.unwrap());
    let err = h.api.delete_task(&ctx, &t1.id).await.unwrap_err();
    assert_eq!(err.extension_code(), "NOT_FOUND");
}

#[tokio::test]
async fn tasks_are_scoped_to_the_caller() {
    let h = harness();
    let (_, ada) = h.employee("ada@x.io", "Ada", "core").await;
    let (_, bob) = h.employee("bob@x.io", "Bob", "core").await;
    let task = h.api.create_or_update_task(&ada, TaskInput { title: "mine".into(), ..Default::default() }).await.unwrap();

    assert!(h.api.tasks_for_employee(&bob).await.unwrap().is_empty());
    assert!(matches!(h.api.delete_task(&bob, &task.id).await, Err(AppError::NotFound { .. })));

    // An id Bob cannot see creates a fresh task rather than overwriting Ada's.
    let created = h
        .api
        .create_or_update_task(&bob, TaskInput { id: Some(task.id.clone()), title: "hijack".into(), ..Default::default() })
        .await
        .unwrap();
    assert_ne!(created.id, task.id);
    assert_eq!(h.api.tasks_for_employee(&ada).await.unwrap()[0].title, "mine");
}

#[tokio::test]
async fn broadcast_reaches_subscribers_and_history() {
    let h = harness();
    let (ada_id, ada) = h.employee("ada@x.io", "Ada", "core").await;
    let (_, bob) = h.employee("bob@x.io", "Bob", "core").await;

    let mut sub = h.api.message_added(&bob).unwrap();
    let sent = h.api.add_message(&ada, "hello team").await.unwrap();
    assert_eq!(sent.sender_id, ada_id);
    assert_eq!(sent.sender_name, "Ada");
    assert!(sent.receiver_id.is_none());

    let got = tokio::time::timeout(Duration::from_secs(1), sub.recv()).await.unwrap().unwrap();
    assert_eq!(got, sent);
    assert_eq!(h.api.messages(&bob).await.unwrap(), vec![sent]);

    assert!(matches!(h.api.add_message(&ada, "   ").await, Err(AppError::Validation { .. })));
}

#[tokio::test]
async fn unicast_is_private_and_symmetric() {
    let h = harness();
    let (ada_id, ada) = h.employee("ada@x.io", "Ada", "core").await;
    let (bob_id, bob) = h.employee("bob@x.io", "Bob", "core").await;
    let (_, eve) = h.employee("eve@x.io", "Eve", "ops").await;

    let mut bob_sub = h.api.unicast_message_added(&bob, None).unwrap();
    let mut ada_sub = h.api.unicast_message_added(&ada, Some(&bob_id)).unwrap();
    let mut eve_sub = h.api.unicast_message_added(&eve, None).unwrap();
    let mut broadcast = h.api.message_added(&eve).unwrap();

    let m1 = h.api.add_unicast_message(&ada, "ping", &bob_id).await.unwrap();
    let m2 = h.api.add_unicast_message(&bob, "pong", &ada_id).await.unwrap();

    assert_eq!(next(&mut bob_sub).await, Some(m1.clone()));
    assert_eq!(next(&mut bob_sub).await, Some(m2.clone()));
    assert_eq!(next(&mut ada_sub).await, Some(m1.clone()));
    assert_eq!(next(&mut ada_sub).await, Some(m2.clone()));
    assert_eq!(next(&mut eve_sub).await, None);
    assert_eq!(next(&mut broadcast).await, None);

    let forward = h.api.unicast_messages(&ada, &ada_id, &bob_id).await.unwrap();
    let backward = h.api.unicast_messages(&bob, &bob_id, &ada_id).await.unwrap();
    assert_eq!(forward, vec![m1, m2]);
    assert_eq!(forward, backward);

    let err = h.api.unicast_messages(&eve, &ada_id, &bob_id).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization { .. }));
}

#[tokio::test]
async fn unicast_to_unknown_receiver_is_not_found() {
    let h = harness();
    let (_, ada) = h.employee("ada@x.io", "Ada", "core").await;
    let err = h.api.add_unicast_message(&ada, "hello?", "nobody").await.unwrap_err();
    assert_eq!(err.extension_code(), "NOT_FOUND");
    assert!(h.store.find_messages(&MessageFilter::Conversation { a: "nobody".into(), b: "x".into() }).await.unwrap().is_empty());
}

#[tokio::test]
async fn execute_wraps_results_under_the_operation_name() {
    let h = harness();
    let (ada_id, ada) = h.employee("ada@x.io", "Ada", "core").await;
    h.employee("bob@x.io", "Bob", "core").await;
    h.employee("eve@x.io", "Eve", "ops").await;

    let v = h.api.execute(&ada, Operation::GetEmployeesByTeam).await.unwrap();
    let team = v["getEmployeesByTeam"].as_array().unwrap();
    assert_eq!(team.len(), 2);
    assert!(team.iter().all(|e| e.get("passwordHash").is_none()));

    let v = h.api.execute(&ada, Operation::Employee { id: ada_id.clone() }).await.unwrap();
    assert_eq!(v["employee"]["id"], json!(ada_id));

    let v = h.api.execute(&ada, Operation::Employees).await.unwrap();
    assert_eq!(v["employees"].as_array().unwrap().len(), 3);

    let err = h.api.execute(&ada, Operation::Employee { id: "missing".into() }).await.unwrap_err();
    assert_eq!(err.extension_code(), "NOT_FOUND");
}
