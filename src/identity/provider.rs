use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::session::{SessionManager, SessionToken};
use crate::error::{AppError, AppResult};
use crate::storage::{Employee, NewEmployee, SharedStore};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Signup profile. `email` and `password` are required; every other field
/// defaults to empty (`dob` to none).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
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

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&Employee> for UserSummary {
    fn from(e: &Employee) -> Self {
        Self { id: e.id.clone(), email: e.email.clone(), first_name: e.first_name.clone(), last_name: e.last_name.clone() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: SessionToken,
    pub user: UserSummary,
}

fn invalid_credentials() -> AppError {
    AppError::authentication("invalid_credentials", "invalid credentials")
}

fn require_fields(email: &str, password: &str) -> AppResult<()> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::validation("missing_fields", "email & password required"));
    }
    Ok(())
}

async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal("blocking_task".to_string(), e.to_string()))
}

/// Login and signup against the employee store.
#[derive(Clone)]
pub struct LocalAuthProvider {
    pub store: SharedStore,
    pub sm: Arc<SessionManager>,
}

impl LocalAuthProvider {
    pub fn new(store: SharedStore, sm: Arc<SessionManager>) -> Self { Self { store, sm } }

    fn issue_for(&self, employee: &Employee) -> AppResult<LoginResponse> {
        let token = self
            .sm
            .issue(&employee.id, &employee.email)
            .map_err(|e| AppError::internal("token_issue".to_string(), e.to_string()))?;
        Ok(LoginResponse { token, user: UserSummary::from(employee) })
    }

    /// Unknown email and wrong password produce the same error, and both run one
    /// Argon2 verification.
    pub async fn login(&self, req: &LoginRequest) -> AppResult<LoginResponse> {
        require_fields(&req.email, &req.password)?;
        let email = req.email.trim().to_string();
        let found = self.store.find_employee_by_email(&email).await?;
        let password = req.password.clone();
        let Some(employee) = found else {
            blocking(move || crate::security::verify_against_dummy(&password)).await?;
            info!(target: "auth", "auth.login rejected (unknown email)");
            return Err(invalid_credentials());
        };
        let phc = employee.password_hash.clone();
        let ok = blocking(move || crate::security::verify_password(&phc, &password)).await?;
        if !ok {
            info!(target: "auth", "auth.login rejected user={}", employee.id);
            return Err(invalid_credentials());
        }
        info!(target: "auth", "auth.login user={}", employee.id);
        self.issue_for(&employee)
    }

    pub async fn signup(&self, req: SignupRequest) -> AppResult<LoginResponse> {
        require_fields(&req.email, &req.password)?;
        let email = req.email.trim().to_string();
        if self.store.find_employee_by_email(&email).await?.is_some() {
            return Err(AppError::conflict("email_exists", "email already exists"));
        }
        let password = req.password;
        let hashed = blocking(move || crate::security::hash_password(&password)).await?.map_err(|e| {
            warn!(target: "auth", "password hashing failed: {}", e);
            AppError::internal("hash_failed".to_string(), e.to_string())
        })?;
        let created = self
            .store
            .insert_employee(NewEmployee {
                email,
                password_hash: hashed,
                first_name: req.first_name,
                last_name: req.last_name,
                dob: req.dob,
                mobile_no: req.mobile_no,
                pan: req.pan,
                gender: req.gender,
                team: req.team,
                designation: req.designation,
                address: req.address,
                address2: req.address2,
                city: req.city,
                zip: req.zip,
            })
            .await?;
        info!(target: "auth", "auth.signup user={}", created.id);
        self.issue_for(&created)
    }
}
