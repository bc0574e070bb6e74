//! Tests for the admin API: authentication, policy enforcement, audit trail.

use axum::http::StatusCode;
use serde_json::{Value, json};
use tower::ServiceExt;

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn new_licence_body(key: &str, identifier: &str) -> Value {
    json!({
        "key": key,
        "identifier": identifier,
        "tier": "premium",
        "request_limit": 100,
        "valid_until": future_timestamp(30),
        "max_ips": 2,
    })
}

async fn create_via_api(app: &axum::Router, token: &str, key: &str, identifier: &str) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/licences",
            Some(token),
            Some(new_licence_body(key, identifier)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn test_missing_or_unknown_token_is_401() {
    let app = admin_app(create_test_app_state());

    for token in [None, Some("not-a-real-token")] {
        let response = app
            .clone()
            .oneshot(json_request("GET", "/admin/licences", token, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_create_and_fetch_licence() {
    let app = admin_app(create_test_app_state());
    let created = create_via_api(&app, ADMIN_TOKEN, "LIC-ADMIN", "acme").await;

    assert_eq!(created["identifier"], "acme");
    assert_eq!(created["tier"], "premium");
    assert_eq!(created["request_count"], 0);
    assert_eq!(created["max_ips"], 2);
    assert_eq!(created["version"], 0);
    assert!(created.get("key").is_none());
    assert!(created.get("key_hash").is_none());

    let id = created["id"].as_str().unwrap();
    let response = app
        .oneshot(json_request("GET", &format!("/admin/licences/{}", id), Some(VIEW_TOKEN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], id);
}

#[tokio::test]
async fn test_duplicate_licence_is_409() {
    let app = admin_app(create_test_app_state());
    create_via_api(&app, OWNER_TOKEN, "LIC-TWICE", "acme").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/admin/licences",
            Some(OWNER_TOKEN),
            Some(new_licence_body("LIC-TWICE", "acme")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_view_role_cannot_write() {
    let app = admin_app(create_test_app_state());
    let created = create_via_api(&app, OWNER_TOKEN, "LIC-RO", "acme").await;
    let id = created["id"].as_str().unwrap();

    let attempts = [
        json_request("POST", "/admin/licences", Some(VIEW_TOKEN), Some(new_licence_body("LIC-2", "acme"))),
        json_request(
            "PATCH",
            &format!("/admin/licences/{}", id),
            Some(VIEW_TOKEN),
            Some(json!({ "request_limit": 5 })),
        ),
        json_request("POST", &format!("/admin/licences/{}/reset-ips", id), Some(VIEW_TOKEN), None),
        json_request("DELETE", &format!("/admin/licences/{}", id), Some(VIEW_TOKEN), None),
        json_request("GET", "/admin/audit-logs", Some(VIEW_TOKEN), None),
    ];
    for request in attempts {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    let response = app
        .oneshot(json_request("GET", "/admin/licences", Some(VIEW_TOKEN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_admin_role_cannot_delete_but_owner_can() {
    let app = admin_app(create_test_app_state());
    let created = create_via_api(&app, ADMIN_TOKEN, "LIC-DEL", "acme").await;
    let uri = format!("/admin/licences/{}", created["id"].as_str().unwrap());

    let response = app
        .clone()
        .oneshot(json_request("DELETE", &uri, Some(ADMIN_TOKEN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_json(response).await["details"]
        .as_str()
        .unwrap()
        .contains("licences:delete"));

    let response = app
        .clone()
        .oneshot(json_request("DELETE", &uri, Some(OWNER_TOKEN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(json_request("GET", &uri, Some(OWNER_TOKEN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_and_reset_ips_feed_the_engine() {
    let state = create_test_app_state();
    let admin = admin_app(state.clone());
    let public = public_app(state.clone());

    let created = create_via_api(&admin, ADMIN_TOKEN, "LIC-FLOW", "acme").await;
    let id = created["id"].as_str().unwrap().to_string();

    for ip in ["198.51.100.1", "198.51.100.2"] {
        let json = body_json(
            public
                .clone()
                .oneshot(validate_request("LIC-FLOW", "acme", ip))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(json["admitted"], true);
    }
    let json = body_json(
        public
            .clone()
            .oneshot(validate_request("LIC-FLOW", "acme", "198.51.100.3"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(json["reason"], "ip_not_registered");

    let response = admin
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/admin/licences/{}/reset-ips", id),
            Some(ADMIN_TOKEN),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reset = body_json(response).await;
    assert_eq!(reset["ips"], json!([]));
    assert_eq!(reset["request_count"], 2);

    let response = admin
        .clone()
        .oneshot(json_request(
            "GET",
            "/admin/audit-logs?action=reset_licence_ips",
            Some(OWNER_TOKEN),
            None,
        ))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(
        page["items"][0]["details"]["cleared_ips"],
        json!(["198.51.100.1", "198.51.100.2"])
    );

    let json = body_json(
        public
            .clone()
            .oneshot(validate_request("LIC-FLOW", "acme", "198.51.100.3"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(json["admitted"], true);
    assert_eq!(json["licence"]["request_count"], 3);

    let response = admin
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/admin/licences/{}", id),
            Some(ADMIN_TOKEN),
            Some(json!({ "valid_until": past_timestamp(1) })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(
        public
            .oneshot(validate_request("LIC-FLOW", "acme", "198.51.100.3"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(json["reason"], "expired");
}

#[tokio::test]
async fn test_invalid_update_is_400() {
    let app = admin_app(create_test_app_state());
    let created = create_via_api(&app, OWNER_TOKEN, "LIC-BAD", "acme").await;

    let response = app
        .oneshot(json_request(
            "PATCH",
            &format!("/admin/licences/{}", created["id"].as_str().unwrap()),
            Some(OWNER_TOKEN),
            Some(json!({ "request_limit": 0 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_filters_by_identifier() {
    let app = admin_app(create_test_app_state());
    create_via_api(&app, OWNER_TOKEN, "LIC-A", "acme").await;
    create_via_api(&app, OWNER_TOKEN, "LIC-B", "acme").await;
    create_via_api(&app, OWNER_TOKEN, "LIC-C", "globex").await;

    let response = app
        .oneshot(json_request(
            "GET",
            "/admin/licences?identifier=acme&limit=1",
            Some(VIEW_TOKEN),
            None,
        ))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["items"][0]["identifier"], "acme");
}

#[tokio::test]
async fn test_mutations_are_audited_without_secrets() {
    let state = create_test_app_state();
    let app = admin_app(state.clone());
    let created = create_via_api(&app, ADMIN_TOKEN, "LIC-SECRET-123", "acme").await;
    let id = created["id"].as_str().unwrap().to_string();

    app.clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/admin/licences/{}", id),
            Some(ADMIN_TOKEN),
            Some(json!({ "reset_request_count": true })),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(json_request(
            "GET",
            &format!("/admin/audit-logs?resource_id={}", id),
            Some(OWNER_TOKEN),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["total"], 2);

    let items = page["items"].as_array().unwrap();
    let actions: Vec<&str> = items.iter().map(|l| l["action"].as_str().unwrap()).collect();
    assert!(actions.contains(&"create_licence"));
    assert!(actions.contains(&"update_licence"));
    assert!(items.iter().all(|l| l["actor_id"] == "test-admin"));
    assert!(items.iter().all(|l| l["actor_type"] == "admin"));

    let raw = serde_json::to_string(&page).unwrap();
    assert!(!raw.contains("LIC-SECRET-123"));
    assert!(!raw.contains(ADMIN_TOKEN));
}
