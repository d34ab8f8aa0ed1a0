use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::auth::testing::{ScriptedEndpoint, seeded_provider};
use crate::error::ToolError;
use crate::tools::{DependencyMap, Toolbox};

async fn client(server: &MockServer, dir: &Path) -> GmailClient {
    let endpoint = Arc::new(ScriptedEndpoint::new("unused", "fresh"));
    let provider = seeded_provider(dir, endpoint, "token", GMAIL_SCOPES).await;
    let mut config = GmailConfig::new(OAuthClientConfig::new(
        "client-id",
        None,
        "https://accounts.example.com/auth",
        "https://accounts.example.com/token",
        "http://localhost",
    ));
    config.token_dir = dir.to_path_buf();
    config.api_base_url = Some(server.uri());

    GmailClient::with_credentials(&config, provider)
        .await
        .expect("client opens")
}

fn full_message(id: &str, subject: &str) -> Value {
    json!({
        "id": id,
        "threadId": format!("thread-{id}"),
        "labelIds": ["INBOX"],
        "snippet": "snippet",
        "payload": {
            "mimeType": "text/plain",
            "headers": [{"name": "Subject", "value": subject}],
            "body": {"data": base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("body")}
        }
    })
}

async fn mount_message(server: &MockServer, id: &str, subject: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/messages/{id}")))
        .and(query_param("format", "full"))
        .respond_with(ResponseTemplate::new(200).set_body_json(full_message(id, subject)))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn search_collects_ids_then_fetches_each_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .and(query_param("q", "from:boss"))
        .and(query_param("maxResults", "2"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"id": "a", "threadId": "ta"}, {"id": "b", "threadId": "tb"}],
            "nextPageToken": "page-2",
            "resultSizeEstimate": 5
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_message(&server, "a", "First").await;
    mount_message(&server, "b", "Second").await;

    let dir = tempfile::tempdir().expect("tempdir");
    let gmail = client(&server, dir.path()).await;

    let found = gmail
        .search("from:boss", 2, None, FailurePolicy::Propagate)
        .await
        .expect("search succeeds");

    assert_eq!(found.count, 2);
    let subjects = found
        .messages
        .iter()
        .map(|message| message.subject.as_str())
        .collect::<Vec<_>>();
    assert_eq!(subjects, vec!["First", "Second"]);
    assert_eq!(found.messages[0].body, "body");
    assert_eq!(found.next_page_token.as_deref(), Some("page-2"));
}

#[tokio::test]
async fn search_resumes_from_callers_page_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .and(query_param("pageToken", "resume-here"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resultSizeEstimate": 0})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let gmail = client(&server, dir.path()).await;

    let found = gmail
        .search("label:old", 10, Some("resume-here"), FailurePolicy::Propagate)
        .await
        .expect("search succeeds");
    assert_eq!(found, EmailMessages::default());
}

#[tokio::test]
async fn search_failure_is_swallowed_only_when_asked() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": 500, "message": "Backend Error"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let gmail = client(&server, dir.path()).await;

    let err = gmail
        .search("x", 5, None, FailurePolicy::Propagate)
        .await
        .expect_err("propagates");
    assert!(matches!(err, VendorError::Transient { status: 500, .. }));

    let empty = gmail
        .search("x", 5, None, FailurePolicy::EmptyOnError)
        .await
        .expect("swallowed");
    assert_eq!(empty.count, 0);
    assert!(empty.messages.is_empty());
}

#[tokio::test]
async fn delete_moves_message_to_trash() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages/m-1/trash"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m-1", "labelIds": ["TRASH"]})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let gmail = client(&server, dir.path()).await;

    gmail
        .delete("m-1", FailurePolicy::Propagate)
        .await
        .expect("trashed");

    let err = gmail
        .delete("  ", FailurePolicy::EmptyOnError)
        .await
        .expect_err("validation is never swallowed");
    assert!(matches!(err, VendorError::Validation(_)));
}

#[tokio::test]
async fn send_uses_profile_address_once_and_posts_raw_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "emailAddress": "me@example.com",
            "messagesTotal": 10,
            "threadsTotal": 4
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages/send"))
        .and(body_string_contains("\"raw\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "sent-1",
            "threadId": "thread-1",
            "labelIds": ["SENT"]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let attachment = dir.path().join("notes.txt");
    std::fs::write(&attachment, "attached text").expect("write attachment");
    let gmail = client(&server, dir.path()).await;

    let sent = gmail
        .send("a@example.com, b@example.com", "Hi", "Body text", &[attachment])
        .await
        .expect("sent");
    assert_eq!(
        sent,
        SentMessage {
            id: "sent-1".to_string(),
            thread_id: "thread-1".to_string(),
            label_ids: vec!["SENT".to_string()],
        }
    );
    gmail
        .send("a@example.com", "Again", "Body", &[])
        .await
        .expect("second send");

    let requests = server.received_requests().await.expect("recording enabled");
    let send_request = requests
        .iter()
        .find(|request| request.url.path() == "/messages/send")
        .expect("send request");
    let payload: Value = serde_json::from_slice(&send_request.body).expect("json body");
    let raw = GMAIL_BASE64
        .decode(payload["raw"].as_str().expect("raw field"))
        .expect("base64url");
    let raw = String::from_utf8_lossy(&raw);
    assert!(raw.contains("me@example.com"));
    assert!(raw.contains("a@example.com"));
    assert!(raw.contains("b@example.com"));
    assert!(raw.contains("Subject: Hi"));
    assert!(raw.contains("notes.txt"));
}

#[tokio::test]
async fn unreadable_attachment_fails_before_any_request() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let gmail = client(&server, dir.path()).await;

    let err = gmail
        .send("a@example.com", "Hi", "Body", &[dir.path().join("missing.pdf")])
        .await
        .expect_err("missing file");
    assert!(matches!(err, VendorError::Io(_)));
    assert!(
        server
            .received_requests()
            .await
            .expect("recording enabled")
            .is_empty()
    );
}

#[test]
fn compose_raw_builds_multipart_with_octet_stream_attachments() {
    let raw = compose_raw(
        "me@example.com",
        "you@example.com",
        "Report",
        "See attached.",
        vec![("report.csv".to_string(), b"a,b\n1,2\n".to_vec())],
    )
    .expect("composes");
    let raw = String::from_utf8_lossy(&raw);

    assert!(raw.contains("multipart/mixed"));
    assert!(raw.contains("text/plain"));
    assert!(raw.contains("application/octet-stream"));
    assert!(raw.contains("report.csv"));
}

#[test]
fn compose_raw_rejects_bad_recipients() {
    let err = compose_raw("me@example.com", " , ", "s", "b", Vec::new()).expect_err("no recipients");
    assert!(matches!(err, VendorError::Validation(_)));

    let err = compose_raw("me@example.com", "not an address", "s", "b", Vec::new())
        .expect_err("bad address");
    assert!(matches!(err, VendorError::Validation(_)));
}

#[tokio::test]
async fn tools_expose_labels_and_validate_arguments() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/labels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "labels": [
                {"id": "INBOX", "name": "INBOX", "type": "system",
                 "messageListVisibility": "show", "labelListVisibility": "labelShow"},
                {"id": "Label_1", "name": "Receipts", "type": "user"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let gmail = client(&server, dir.path()).await;
    let toolbox = Toolbox::new(
        all_tools().expect("schemas"),
        DependencyMap::new().with(gmail),
    )
    .expect("toolbox");

    let names = toolbox.tools().iter().map(|tool| tool.name()).collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["send_email", "search_emails", "get_email", "delete_email", "list_labels"]
    );

    let labels = toolbox
        .call("list_labels", json!({}))
        .await
        .expect("labels")
        .into_value();
    assert_eq!(labels["labels"][0]["label_list_visibility"], "labelShow");
    assert_eq!(labels["labels"][1]["type"], "user");

    let err = toolbox
        .call("search_emails", json!({"query": "x", "max_results": -1}))
        .await
        .expect_err("negative limit");
    assert!(matches!(err, ToolError::InvalidArguments { .. }));

    let err = toolbox
        .call("get_email", json!({}))
        .await
        .expect_err("missing id");
    assert!(matches!(err, ToolError::InvalidArguments { .. }));
}

#[tokio::test]
async fn tools_propagate_vendor_errors_unless_asked_not_to() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"code": 500, "message": "Backend Error"}
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages/m-1/trash"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "Requested entity was not found."}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let gmail = client(&server, dir.path()).await;
    let toolbox = Toolbox::new(
        all_tools().expect("schemas"),
        DependencyMap::new().with(gmail),
    )
    .expect("toolbox");

    let err = toolbox
        .call("search_emails", json!({"query": "x"}))
        .await
        .expect_err("search fails");
    assert!(matches!(
        err,
        ToolError::Vendor(VendorError::Transient { status: 500, .. })
    ));

    let err = toolbox
        .call("delete_email", json!({"msg_id": "m-1"}))
        .await
        .expect_err("delete fails");
    assert!(matches!(err, ToolError::Vendor(VendorError::NotFound(_))));

    let empty = toolbox
        .call("search_emails", json!({"query": "x", "on_error": "empty_on_error"}))
        .await
        .expect("swallowed on request")
        .into_value();
    assert_eq!(empty["count"], 0);

    let err = toolbox
        .call("get_email", json!({"msg_id": "m-1", "on_error": "empty_on_error"}))
        .await
        .expect_err("get_email takes no failure policy");
    assert!(matches!(err, ToolError::InvalidArguments { .. }));
}
