//! Shared wiremock fixtures for the portal integration tests
#![allow(dead_code)]

use std::time::Duration;

use client_portal::{Portal, PortalConfig};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ADMIN_ID: &str = "0a4f5d1e-7c3b-4e2a-9f10-1b2c3d4e5f60";
pub const CLIENT_ID: &str = "2b1f7d2e-2a55-4b43-9f6e-0d7e3c1b0a11";
pub const ACCESS_TOKEN: &str = "user-access-token";

pub fn test_config(server: &MockServer) -> PortalConfig {
    PortalConfig::new(&server.uri(), "anon-key".to_string())
        .unwrap()
        .with_progress_sync_interval(Duration::from_millis(50))
        .with_upload_progress_tick(Duration::from_millis(5))
        .with_request_timeout(Some(Duration::from_secs(5)))
}

pub fn session_body(user_id: &str, token: &str) -> Value {
    json!({
        "access_token": token,
        "refresh_token": format!("{}-refresh", token),
        "expires_in": 3600,
        "token_type": "bearer",
        "user": {
            "id": user_id,
            "email": "someone@example.com",
            "app_metadata": {},
            "user_metadata": {}
        }
    })
}

pub fn profile_body(user_id: &str, role: &str) -> Value {
    let (full_name, company_name) = match role {
        "admin" => ("Operatore", Value::Null),
        _ => ("Maria Rossi", json!("Rossi Srl")),
    };
    json!({
        "id": user_id,
        "email": format!("{}@example.com", role),
        "full_name": full_name,
        "company_name": company_name,
        "role": role,
        "is_active": true,
        "created_at": "2026-01-05T09:00:00+00:00"
    })
}

pub fn document_body(id: Uuid, title: &str, published: bool) -> Value {
    json!({
        "id": id,
        "title": title,
        "file_name": "guida.pdf",
        "file_url": format!("https://cdn.example.com/{}.pdf", id),
        "file_size": 2_516_582,
        "file_type": "pdf",
        "category": "AI Strategy",
        "is_published": published,
        "created_at": "2026-02-01T10:00:00+00:00"
    })
}

pub fn video_body(id: Uuid, title: &str, duration: i32, published: bool) -> Value {
    json!({
        "id": id,
        "title": title,
        "description": null,
        "category": "Onboarding",
        "duration_seconds": duration,
        "video_url": format!("https://cdn.example.com/{}.mp4", id),
        "thumbnail_url": null,
        "is_published": published,
        "created_at": "2026-02-01T10:00:00+00:00"
    })
}

/// Password sign-in answering with a session for `user_id`
pub async fn mount_sign_in(server: &MockServer, user_id: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body(user_id, ACCESS_TOKEN)))
        .mount(server)
        .await;
}

/// Profile lookup for `user_id`
pub async fn mount_profile(server: &MockServer, user_id: &str, role: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{}", user_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([profile_body(user_id, role)])))
        .mount(server)
        .await;
}

/// Portal signed in as `user_id` with the given profile role
pub async fn signed_in_portal(server: &MockServer, user_id: &str, role: &str) -> Portal {
    mount_sign_in(server, user_id).await;
    mount_profile(server, user_id, role).await;

    let portal = Portal::start(test_config(server)).await.unwrap();
    portal
        .session()
        .sign_in("someone@example.com", "secret")
        .await
        .unwrap();
    portal
}

/// Wait until at least `count` requests to `request_path` arrived; returns how many did.
pub async fn wait_for_requests(server: &MockServer, request_path: &str, count: usize) -> usize {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let seen = server
                .received_requests()
                .await
                .unwrap_or_default()
                .iter()
                .filter(|r| r.url.path() == request_path)
                .count();
            if seen >= count {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("fewer than {} requests to {}", count, request_path))
}
