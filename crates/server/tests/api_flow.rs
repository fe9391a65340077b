//! End-to-end flow over the HTTP router

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use server::auth::AuthManager;
use server::config::{AppState, ChatServerConfig};
use server::store::JsonRoomStore;

async fn test_app(dir: &TempDir) -> Router {
    let config = ChatServerConfig::with_base_dir(dir.path());
    let auth = Arc::new(AuthManager::new(config.users_db_path.clone()).await.unwrap());
    let store = Arc::new(JsonRoomStore::new(config).await.unwrap());
    server::app_router(AppState { store, auth })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn bare_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn signup(app: &Router, email: &str, username: &str) -> (String, String) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/signup",
            None,
            json!({ "email": email, "username": username, "password": "pw" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let auth = body_json(response).await;
    (
        auth["token"].as_str().unwrap().to_string(),
        auth["user_id"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn test_unauthenticated_requests_are_rejected() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let response = app
        .clone()
        .oneshot(bare_request("GET", "/chat/rooms", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(bare_request("GET", "/chat/rooms", Some("not-a-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_room_and_message_flow() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (alice, _alice_id) = signup(&app, "alice@example.com", "Alice").await;
    let (bob, bob_id) = signup(&app, "bob@example.com", "Bob").await;

    // Create a room; the proposed name is normalized into the id
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/chat/rooms",
            Some(&alice),
            json!({ "name": "  General " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let room = body_json(response).await;
    assert_eq!(room["id"], "general");
    assert_eq!(room["name"], "General");

    // Collision (case-insensitive) is a 409
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/chat/rooms",
            Some(&bob),
            json!({ "name": "GENERAL" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Alice sends "hi"
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/chat/general/messages",
            Some(&alice),
            json!({ "type": "text", "text": "hi" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let message = body_json(response).await;
    let message_id = message["id"].as_str().unwrap().to_string();
    assert_eq!(message["sender_name"], "Alice");
    assert_eq!(message["edited"], false);

    // Bob cannot edit Alice's message
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/chat/general/messages/{}", message_id),
            Some(&bob),
            json!({ "text": "hacked" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Alice edits it
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/chat/general/messages/{}", message_id),
            Some(&alice),
            json!({ "text": "hi there" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let message = body_json(response).await;
    assert_eq!(message["edited"], true);
    assert_eq!(message["text"], "hi there");

    // Bob toggles a reaction on, then off
    let react = |token: String| {
        app.clone().oneshot(json_request(
            "POST",
            &format!("/chat/general/messages/{}/reactions", message_id),
            Some(&token),
            json!({ "emoji": "👍" }),
        ))
    };

    let message = body_json(react(bob.clone()).await.unwrap()).await;
    assert_eq!(message["reactions"]["👍"], json!([bob_id]));

    let message = body_json(react(bob.clone()).await.unwrap()).await;
    assert_eq!(message["reactions"], json!({}));

    // Snapshot shows the edited message
    let response = app
        .clone()
        .oneshot(bare_request("GET", "/chat/general", Some(&bob)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = body_json(response).await;
    assert_eq!(snapshot["messages"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["messages"][0]["text"], "hi there");
}

#[tokio::test]
async fn test_presence_and_typing_flow() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (alice, _) = signup(&app, "alice@example.com", "Alice").await;
    let (bob, _) = signup(&app, "bob@example.com", "Bob").await;

    app.clone()
        .oneshot(json_request(
            "POST",
            "/chat/rooms",
            Some(&alice),
            json!({ "name": "general" }),
        ))
        .await
        .unwrap();

    // Alice heartbeats; Bob sees one live member
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/chat/general/presence",
            Some(&alice),
            json!({ "display_name": "Alice", "avatar_url": null }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(bare_request("GET", "/chat/general/presence", Some(&bob)))
        .await
        .unwrap();
    let presence = body_json(response).await;
    assert_eq!(presence.as_array().unwrap().len(), 1);
    assert_eq!(presence[0]["display_name"], "Alice");

    // Alice starts typing; Bob's indicator set contains her marker
    let response = app
        .clone()
        .oneshot(bare_request("PUT", "/chat/general/typing", Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(bare_request("GET", "/chat/general/typing", Some(&bob)))
        .await
        .unwrap();
    let typing = body_json(response).await;
    assert_eq!(typing.as_array().unwrap().len(), 1);

    // Alice clears the input; the set empties
    let response = app
        .clone()
        .oneshot(bare_request("DELETE", "/chat/general/typing", Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(bare_request("GET", "/chat/general/typing", Some(&bob)))
        .await
        .unwrap();
    let typing = body_json(response).await;
    assert!(typing.as_array().unwrap().is_empty());

    // Heartbeats against a deleted room are a 404 (the loop's stop signal)
    let response = app
        .clone()
        .oneshot(bare_request("DELETE", "/chat/general", Some(&alice)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/chat/general/presence",
            Some(&alice),
            json!({ "display_name": "Alice", "avatar_url": null }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_attachment_upload_and_message_delete() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (alice, _) = signup(&app, "alice@example.com", "Alice").await;

    app.clone()
        .oneshot(json_request(
            "POST",
            "/chat/rooms",
            Some(&alice),
            json!({ "name": "general" }),
        ))
        .await
        .unwrap();

    // Upload an image blob
    let boundary = "XTESTBOUNDARY";
    let multipart_body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"pic.png\"\r\nContent-Type: image/png\r\n\r\nfake image bytes\r\n--{b}--\r\n",
        b = boundary
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/blobs")
                .header(header::AUTHORIZATION, format!("Bearer {}", alice))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(multipart_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let blob = body_json(response).await;
    assert_eq!(blob["type"], "image");
    let blob_hash = blob["blob_hash"].as_str().unwrap().to_string();
    let blob_url = blob["url"].as_str().unwrap().to_string();

    // Blob downloads publicly
    let response = app
        .clone()
        .oneshot(bare_request("GET", &blob_url, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Send the media message with a caption, blob-then-record
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/chat/general/messages",
            Some(&alice),
            json!({
                "type": "image",
                "text": "look",
                "attachment": {
                    "url": blob_url.clone(),
                    "blob_hash": blob_hash.clone(),
                    "filename": "pic.png"
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let message = body_json(response).await;
    assert_eq!(message["type"], "image");
    assert_eq!(message["text"], "look");
    let message_id = message["id"].as_str().unwrap().to_string();

    // Deleting the message removes the blob too
    let response = app
        .clone()
        .oneshot(bare_request(
            "DELETE",
            &format!("/chat/general/messages/{}", message_id),
            Some(&alice),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(bare_request("GET", &format!("/blobs/{}", blob_hash), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_is_owner_gated() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir).await;

    let (alice, alice_id) = signup(&app, "alice@example.com", "Alice").await;
    let (bob, _) = signup(&app, "bob@example.com", "Bob").await;

    // Bob cannot edit Alice's profile
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/auth/profile/{}", alice_id),
            Some(&bob),
            json!({ "about": "gotcha" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Alice can
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/auth/profile/{}", alice_id),
            Some(&alice),
            json!({ "about": "hello world" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["about"], "hello world");

    // The directory reflects it
    let response = app
        .clone()
        .oneshot(bare_request("GET", "/users", Some(&bob)))
        .await
        .unwrap();
    let users = body_json(response).await;
    let alice_row = users
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["id"] == alice_id.as_str())
        .unwrap();
    assert_eq!(alice_row["about"], "hello world");
}
