//! In-process router harness for endpoint tests.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Duration;
use rusqlite::Connection;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::accounts::{self, NewAccount};
use crate::api::router::api_router;
use crate::core_state::CoreState;
use crate::crypto::TokenKeys;
use crate::db::repository::{self, fixtures};
use crate::models::*;

pub struct Harness {
    pub core: Arc<CoreState>,
    app: Router,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let core = Arc::new(CoreState::new(
            dir.path().join("medicore.db"),
            TokenKeys::new(b"harness-secret", Duration::days(7)),
        ));
        let app = api_router(core.clone());
        Self {
            core,
            app,
            _dir: dir,
        }
    }

    pub fn conn(&self) -> Connection {
        self.core.open_db().unwrap()
    }

    pub fn token_for(&self, user_id: &uuid::Uuid) -> String {
        let user = repository::get_user(&self.conn(), user_id).unwrap().unwrap();
        self.core.tokens().issue(&user).unwrap()
    }

    /// Account with a real password, returns its token.
    pub fn account(&self, name: &str, email: &str, password: &str, role: Role) -> String {
        let account = NewAccount {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            phone: None,
        };
        let user = accounts::create_user(&self.conn(), &account, role).unwrap();
        self.core.tokens().issue(&user).unwrap()
    }

    pub fn staff(&self, role: Role) -> (User, String) {
        let email = format!("{}@staff.test", uuid::Uuid::new_v4().simple());
        let user = fixtures::make_user(&self.conn(), &format!("{role} user"), &email, role);
        let token = self.core.tokens().issue(&user).unwrap();
        (user, token)
    }

    pub fn admin(&self) -> String {
        self.staff(Role::Admin).1
    }

    pub fn patient(&self, name: &str) -> (Patient, String) {
        let patient = fixtures::make_patient(&self.conn(), name, Gender::Female);
        let token = self.token_for(&patient.user_id);
        (patient, token)
    }

    pub fn doctor(&self, name: &str) -> (Doctor, String) {
        let doctor = fixtures::make_doctor(&self.conn(), name, "General Medicine");
        let token = self.token_for(&doctor.user_id);
        (doctor, token)
    }

    pub fn deactivate(&self, email: &str) {
        let conn = self.conn();
        let user = repository::get_user_by_email(&conn, email).unwrap().unwrap();
        repository::update_user_status(&conn, &user.id, UserStatus::Inactive).unwrap();
    }

    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = self.app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call("GET", uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call("POST", uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call("PUT", uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call("DELETE", uri, token, None).await
    }
}
