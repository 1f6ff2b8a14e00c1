//! End-to-end tests driving the axum router in-process.
//!
//! Each test seeds an in-memory store (bootstrap SuperAdmin, the Staff test
//! account and the published organization-wide Code of Conduct), mints
//! bearer tokens and
//! exercises the HTTP surface through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use policyflow::{build_router, AppConfig, AppState, TokenIssuer};
use policyflow_store::seed::{DEFAULT_ADMIN_EMAIL, SAMPLE_STAFF_EMAIL};
use policyflow_store::SqliteStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret-value";

struct Harness {
    app: Router,
    state: Arc<AppState>,
    admin_id: String,
    admin_token: String,
}

fn harness() -> Harness {
    let store = SqliteStore::in_memory().unwrap();
    store.seed("", "").unwrap();
    let state = Arc::new(AppState {
        store: Arc::new(store),
        tokens: TokenIssuer::new(SECRET, 3600),
        config: AppConfig::default(),
    });
    let admin = state.store.get_user_by_email(DEFAULT_ADMIN_EMAIL).unwrap();
    let admin_token = state.tokens.issue(&admin).unwrap();
    Harness {
        app: build_router(state.clone()),
        state,
        admin_id: admin.id,
        admin_token,
    }
}

impl Harness {
    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call(method, uri, Some(&self.admin_token), body).await
    }

    fn token_for(&self, user_id: &str) -> String {
        let user = self.state.store.get_user(user_id).unwrap();
        self.state.tokens.issue(&user).unwrap()
    }

    async fn department(&self, name: &str) -> String {
        let (status, body) = self
            .admin("POST", "/departments", Some(json!({ "name": name })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }

    /// Create a user as the SuperAdmin and return (id, token).
    async fn user(&self, email: &str, role: &str, dept: Option<&str>) -> (String, String) {
        let (status, body) = self
            .admin(
                "POST",
                "/users",
                Some(json!({
                    "email": email,
                    "name": email,
                    "role": role,
                    "department_id": dept,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        let id = body["id"].as_str().unwrap().to_string();
        let token = self.token_for(&id);
        (id, token)
    }

    async fn seeded_policy_id(&self) -> String {
        let (_, body) = self.admin("GET", "/policies", None).await;
        body.as_array()
            .unwrap()
            .iter()
            .find(|p| p["title"] == "Employee Code of Conduct")
            .map(|p| p["id"].as_str().unwrap().to_string())
            .unwrap()
    }
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_health_is_public() {
    let h = harness();
    let (status, body) = h.call("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_requests_without_valid_token_are_unauthorized() {
    let h = harness();

    let (status, body) = h.call("GET", "/policies", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = h.call("GET", "/policies", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin = h.state.store.get_user(&h.admin_id).unwrap();
    let foreign = TokenIssuer::new("some-other-deployment-secret", 3600)
        .issue(&admin)
        .unwrap();
    let (status, _) = h.call("GET", "/me", Some(&foreign), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_for_deleted_user_is_rejected() {
    let h = harness();
    let (id, token) = h.user("gone@example.com", "Staff", None).await;

    let (status, _) = h.admin("DELETE", &format!("/users/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = h.call("GET", "/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_returns_caller_with_department() {
    let h = harness();
    let eng = h.department("Engineering").await;
    let (id, token) = h.user("dev@example.com", "Staff", Some(&eng)).await;

    let (status, body) = h.call("GET", "/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["role"], "Staff");
    assert_eq!(body["department_id"], eng.as_str());
    assert_eq!(body["department_name"], "Engineering");
}

// ============================================================================
// Policy lifecycle
// ============================================================================

#[tokio::test]
async fn test_department_admin_policy_journey() {
    let h = harness();
    let eng = h.department("Engineering").await;
    let hr = h.department("HR").await;
    let (_, lead) = h.user("lead@example.com", "DeptAdmin", Some(&eng)).await;
    let (dev_id, dev) = h.user("dev@example.com", "Staff", Some(&eng)).await;
    let (_, recruiter) = h.user("recruiter@example.com", "Staff", Some(&hr)).await;

    // Organization-wide request is clamped to the lead's department.
    let (status, policy) = h
        .call(
            "POST",
            "/policies",
            Some(&lead),
            Some(json!({
                "title": "On-call Rotation",
                "visibility_type": "organization",
                "department_id": hr,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", policy);
    assert_eq!(policy["visibility_type"], "department");
    assert_eq!(policy["department_id"], eng.as_str());
    assert_eq!(policy["status"], "Draft");
    let policy_id = policy["id"].as_str().unwrap().to_string();

    let (status, version) = h
        .call(
            "POST",
            &format!("/policies/{}/versions", policy_id),
            Some(&lead),
            Some(json!({
                "content": "Carry the pager for one week.",
                "version_string": "v1",
                "changelog": "First draft",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", version);
    let version_id = version["id"].as_str().unwrap().to_string();

    // Visibility escalation on update is clamped as well.
    let (status, updated) = h
        .call(
            "PUT",
            &format!("/policies/{}", policy_id),
            Some(&lead),
            Some(json!({ "status": "Published", "visibility_type": "organization" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", updated);
    assert_eq!(updated["status"], "Published");
    assert_eq!(updated["visibility_type"], "department");
    assert_eq!(updated["current_version_id"], version_id.as_str());

    // Members of the department see it; others do not.
    let (_, listed) = h.call("GET", "/policies", Some(&dev), None).await;
    let titles: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["title"].as_str().unwrap())
        .collect();
    assert!(titles.contains(&"On-call Rotation"));
    assert!(titles.contains(&"Employee Code of Conduct"));

    let uri = format!("/policies/{}", policy_id);
    let (status, _) = h.call("GET", &uri, Some(&recruiter), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = h
        .call("POST", &format!("{}/acknowledge", uri), Some(&recruiter), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Acknowledge once; the second attempt conflicts.
    let (status, ack) = h
        .call("POST", &format!("{}/acknowledge", uri), Some(&dev), None)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", ack);
    assert_eq!(ack["policy_version_id"], version_id.as_str());
    assert_eq!(ack["signature_hash"].as_str().unwrap().len(), 64);

    let (status, _) = h
        .call("POST", &format!("{}/acknowledge", uri), Some(&dev), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, detail) = h.call("GET", &uri, Some(&dev), None).await;
    assert_eq!(detail["acknowledged"], true);
    assert_eq!(detail["current_version"]["id"], version_id.as_str());

    let (status, acks) = h
        .call("GET", &format!("{}/acknowledgements", uri), Some(&lead), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let acks = acks.as_array().unwrap();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0]["user_id"], dev_id.as_str());
    assert_eq!(acks[0]["verified"], true);

    let (status, _) = h
        .call("GET", &format!("{}/acknowledgements", uri), Some(&dev), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_department_admin_cannot_touch_organization_policy() {
    let h = harness();
    let eng = h.department("Engineering").await;
    let (_, lead) = h.user("lead@example.com", "DeptAdmin", Some(&eng)).await;
    let org_policy = h.seeded_policy_id().await;
    let uri = format!("/policies/{}", org_policy);

    let (status, _) = h
        .call(
            "POST",
            &format!("{}/versions", uri),
            Some(&lead),
            Some(json!({ "content": "rewritten", "version_string": "v2" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h
        .call("PUT", &uri, Some(&lead), Some(json!({ "title": "Mine now" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h
        .call("GET", &format!("{}/acknowledgements", uri), Some(&lead), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The SuperAdmin can.
    let (status, _) = h
        .admin("PUT", &uri, Some(json!({ "title": "Code of Conduct 2.0" })))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_staff_cannot_author_policies() {
    let h = harness();
    let (_, dev) = h.user("dev@example.com", "Staff", None).await;

    let (status, body) = h
        .call("POST", "/policies", Some(&dev), Some(json!({ "title": "Nope" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("Staff"));
}

#[tokio::test]
async fn test_new_version_resets_acknowledgement() {
    let h = harness();
    let (_, dev) = h.user("dev@example.com", "Staff", None).await;
    let policy_id = h.seeded_policy_id().await;
    let uri = format!("/policies/{}", policy_id);

    let (status, _) = h
        .call("POST", &format!("{}/acknowledge", uri), Some(&dev), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, original) = h.admin("GET", &uri, None).await;
    let v1 = original["policy"]["current_version_id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, v2) = h
        .admin(
            "POST",
            &format!("{}/versions", uri),
            Some(json!({ "content": "Updated text", "version_string": "v1.1.0" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, detail) = h.call("GET", &uri, Some(&dev), None).await;
    assert_eq!(detail["policy"]["current_version_id"], v2["id"]);
    assert_eq!(detail["acknowledged"], false);

    let (_, versions) = h.call("GET", &format!("{}/versions", uri), Some(&dev), None).await;
    let versions = versions.as_array().unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0]["id"], v2["id"]);

    // Rolling back to v1 restores the earlier acknowledgement state.
    let (status, rolled) = h
        .admin(
            "PUT",
            &format!("{}/current-version", uri),
            Some(json!({ "version_id": v1 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", rolled);
    assert_eq!(rolled["current_version_id"], v1.as_str());

    let (_, detail) = h.call("GET", &uri, Some(&dev), None).await;
    assert_eq!(detail["acknowledged"], true);

    let (status, _) = h
        .admin(
            "PUT",
            &format!("{}/current-version", uri),
            Some(json!({ "version_id": "no-such-version" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unpublished_policy_cannot_be_acknowledged() {
    let h = harness();
    let (status, policy) = h
        .admin("POST", "/policies", Some(json!({ "title": "Remote Work" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/policies/{}/acknowledge", policy["id"].as_str().unwrap());
    let (status, _) = h.admin("POST", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_payloads_are_bad_requests() {
    let h = harness();

    let req = Request::builder()
        .method("POST")
        .uri("/policies")
        .header("authorization", format!("Bearer {}", h.admin_token))
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let (status, _) = h
        .admin("POST", "/policies", Some(json!({ "title": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .admin(
            "POST",
            "/policies",
            Some(json!({ "title": "Scoped", "visibility_type": "department" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let policy_id = h.seeded_policy_id().await;
    let (status, _) = h
        .admin(
            "PUT",
            &format!("/policies/{}", policy_id),
            Some(json!({ "status": "Retired" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Directory
// ============================================================================

#[tokio::test]
async fn test_department_delete_rules() {
    let h = harness();
    let eng = h.department("Engineering").await;
    let empty = h.department("Facilities").await;

    let (status, _) = h
        .admin(
            "POST",
            "/policies",
            Some(json!({
                "title": "Code Review",
                "visibility_type": "department",
                "department_id": eng,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = h.admin("DELETE", &format!("/departments/{}", eng), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("reassign"));

    let (status, _) = h.admin("DELETE", &format!("/departments/{}", empty), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = h.admin("DELETE", &format!("/departments/{}", empty), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h.admin("POST", "/departments", Some(json!({ "name": "Engineering" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, listed) = h.admin("GET", "/departments", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_only_super_admin_manages_departments() {
    let h = harness();
    let eng = h.department("Engineering").await;
    let (_, lead) = h.user("lead@example.com", "DeptAdmin", Some(&eng)).await;

    let (status, _) = h
        .call("POST", "/departments", Some(&lead), Some(json!({ "name": "Shadow IT" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h
        .call(
            "PUT",
            &format!("/departments/{}", eng),
            Some(&lead),
            Some(json!({ "name": "Platform" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, listed) = h.call("GET", "/departments", Some(&lead), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["name"], "Engineering");
}

#[tokio::test]
async fn test_user_management_guards() {
    let h = harness();
    let eng = h.department("Engineering").await;
    let hr = h.department("HR").await;
    let (lead_id, lead) = h.user("lead@example.com", "DeptAdmin", Some(&eng)).await;
    let (dev_id, dev) = h.user("dev@example.com", "Staff", Some(&eng)).await;
    let (hr_id, _) = h.user("hr@example.com", "Staff", Some(&hr)).await;

    // DeptAdmin sees only their department.
    let (status, users) = h.call("GET", "/users", Some(&lead), None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&lead_id.as_str()));
    assert!(ids.contains(&dev_id.as_str()));
    assert!(!ids.contains(&hr_id.as_str()));

    // Staff cannot list users.
    let (status, _) = h.call("GET", "/users", Some(&dev), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // DeptAdmin-created users land in the lead's department and never as SuperAdmin.
    let (status, created) = h
        .call(
            "POST",
            "/users",
            Some(&lead),
            Some(json!({
                "email": "intern@example.com",
                "name": "Intern",
                "role": "SuperAdmin",
                "department_id": hr,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    assert_eq!(created["role"], "Staff");
    assert_eq!(created["department_id"], eng.as_str());

    // Foreign-department and SuperAdmin targets are off limits to a DeptAdmin.
    let (status, _) = h
        .call(
            "PUT",
            &format!("/users/{}", hr_id),
            Some(&lead),
            Some(json!({ "name": "Renamed" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = h
        .call(
            "PUT",
            &format!("/users/{}", h.admin_id),
            Some(&lead),
            Some(json!({ "name": "Renamed" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Only SuperAdmins delete users.
    let (status, _) = h
        .call("DELETE", &format!("/users/{}", dev_id), Some(&lead), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Duplicate e-mail.
    let (status, _) = h
        .admin(
            "POST",
            "/users",
            Some(json!({ "email": "dev@example.com", "name": "Again" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_last_super_admin_is_protected() {
    let h = harness();
    let admin_uri = format!("/users/{}", h.admin_id);

    let (status, body) = h.admin("DELETE", &admin_uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("yourself"));

    let (status, _) = h.admin("PUT", &admin_uri, Some(json!({ "role": "Staff" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // With a second SuperAdmin the first may step down.
    let (second_id, second) = h.user("deputy@example.com", "SuperAdmin", None).await;
    let (status, demoted) = h.admin("PUT", &admin_uri, Some(json!({ "role": "Staff" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(demoted["role"], "Staff");

    let (status, _) = h
        .call("DELETE", &format!("/users/{}", second_id), Some(&second), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_user_with_acknowledgements_can_be_deleted() {
    let h = harness();
    let staff = h.state.store.get_user_by_email(SAMPLE_STAFF_EMAIL).unwrap();
    let token = h.token_for(&staff.id);
    let policy_id = h.seeded_policy_id().await;

    let (status, _) = h
        .call("POST", &format!("/policies/{}/acknowledge", policy_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = h.admin("DELETE", &format!("/users/{}", staff.id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT, "{}", body);

    let (_, users) = h.admin("GET", "/users", None).await;
    assert!(users
        .as_array()
        .unwrap()
        .iter()
        .all(|u| u["id"] != staff.id.as_str()));
    let (_, acks) = h
        .admin("GET", &format!("/policies/{}/acknowledgements", policy_id), None)
        .await;
    assert!(acks.as_array().unwrap().is_empty());
}

// ============================================================================
// Admin stats
// ============================================================================

#[tokio::test]
async fn test_stats() {
    let h = harness();
    let (_, dev) = h.user("dev@example.com", "Staff", None).await;
    let policy_id = h.seeded_policy_id().await;

    let (status, _) = h
        .call("POST", &format!("/policies/{}/acknowledge", policy_id), Some(&dev), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = h.call("GET", "/admin/stats", Some(&dev), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, report) = h.admin("GET", "/admin/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["stats"]["total_users"], 3);
    assert_eq!(report["stats"]["total_policies"], 1);
    assert_eq!(report["stats"]["published_count"], 1);
    assert_eq!(report["stats"]["total_acknowledgements"], 1);
    assert_eq!(report["ack_counts"][0]["policy_id"], policy_id.as_str());
    assert_eq!(report["ack_counts"][0]["ack_count"], 1);
}
