use botrent::notify::{Notifier, TelegramNotifier};
use httpmock::prelude::*;
use serde_json::json;

// key: notifier-tests -> sendMessage wire contract

#[tokio::test]
async fn send_posts_chat_id_and_text_to_the_gateway() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/bottok123/sendMessage")
                .json_body_partial(r#"{ "chat_id": 42, "text": "balance low" }"#);
            then.status(200).json_body(json!({ "ok": true }));
        })
        .await;

    let notifier = TelegramNotifier::new(server.base_url(), "tok123");
    notifier.send(42, "balance low").await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn gateway_errors_surface_as_send_failures() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/bottok123/sendMessage");
            then.status(502);
        })
        .await;

    let notifier = TelegramNotifier::new(server.base_url(), "tok123");
    let err = notifier.send(42, "balance low").await.unwrap_err();
    assert!(err.to_string().contains("502"));
}
