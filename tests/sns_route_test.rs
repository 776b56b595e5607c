mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use common::*;
use mailhook_backend::{
    models::notification_topic::{Region, TopicStatus},
    routes,
    services::topic_service::TOPIC_VALIDATED_MESSAGE,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sns_request(message_type: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/sns/events")
        .header("content-type", "text/plain; charset=UTF-8");
    if let Some(message_type) = message_type {
        builder = builder.header("x-amz-sns-message-type", message_type);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_message_type_header_is_a_client_error() {
    let app = TestApp::new().await;
    let body = signed_body(envelope("Notification", &topic_arn(Region::UsEast1), TOPIC_VALIDATED_MESSAGE));
    let response = routes::router(app.state.clone())
        .oneshot(sns_request(None, body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_message_type_is_ignored() {
    let app = TestApp::new().await;
    let response = routes::router(app.state.clone())
        .oneshot(sns_request(Some("SomethingElse"), b"not even json".to_vec()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn sentinel_notification_is_acknowledged() {
    let app = TestApp::new().await;
    let body = signed_body(envelope("Notification", &topic_arn(Region::UsEast1), TOPIC_VALIDATED_MESSAGE));
    let response = routes::router(app.state.clone())
        .oneshot(sns_request(Some("Notification"), body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.store.events().is_empty());
}

#[tokio::test]
async fn bad_signature_and_bad_body_get_a_bare_bad_request() {
    let app = TestApp::new().await;
    let router = routes::router(app.state.clone());

    let mut env = envelope("Notification", &topic_arn(Region::UsEast1), TOPIC_VALIDATED_MESSAGE);
    sign(&mut env);
    env.timestamp = "2024-05-01T12:00:01.000Z".into();
    let response = router
        .clone()
        .oneshot(sns_request(Some("Notification"), serde_json::to_vec(&env).unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .oneshot(sns_request(Some("Notification"), b"{".to_vec()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subscription_confirmation_activates_topic() {
    let app = TestApp::new().await;
    app.state.topic_service.setup_topics().await.unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut env = envelope("SubscriptionConfirmation", &topic_arn(Region::UsEast1), "subscribe");
    env.subscribe_url = Some(format!("{}/confirm", server.uri()));
    let response = routes::router(app.state.clone())
        .oneshot(sns_request(Some("SubscriptionConfirmation"), signed_body(env)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let status = app
        .store
        .topics()
        .into_iter()
        .find(|t| t.region == Region::UsEast1)
        .map(|t| t.status);
    assert_eq!(status, Some(TopicStatus::Active));
    server.verify().await;
}

#[tokio::test]
async fn webhook_management_round_trip() {
    let app = TestApp::new().await;
    let router = routes::router(app.state.clone());
    let workspace_id = Uuid::new_v4();

    let create = Request::builder()
        .method("POST")
        .uri(format!("/api/workspaces/{}/webhooks", workspace_id))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "url": "https://customer.example.com/hook", "events": ["EMAIL_BOUNCED", "EMAIL_OPENED"] })
                .to_string(),
        ))
        .unwrap();
    let response = router.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["status"], "ACTIVE");
    assert!(created.get("signingKey").is_none());
    assert!(!created["signingKeyPublic"].as_str().unwrap().is_empty());
    let id = created["id"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/webhooks/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["signingKeyPublic"], created["signingKeyPublic"]);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/workspaces/{}/webhooks", workspace_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);

    let response = router
        .oneshot(
            Request::builder()
                .uri(format!("/api/webhooks/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_webhook_payload_is_rejected() {
    let app = TestApp::new().await;
    let workspace_id = Uuid::new_v4();
    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/workspaces/{}/webhooks", workspace_id))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "url": "not a url", "events": [] }).to_string()))
        .unwrap();
    let response = routes::router(app.state.clone())
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app
        .state
        .webhook_service
        .list(workspace_id)
        .await
        .unwrap()
        .is_empty());
}
