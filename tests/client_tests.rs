//! End-to-end client tests against a mock CodeFast server.

use codefast_client::{ClientConfig, CodeFastClient, CodeFastError, UploadRequest};
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/token";
const UPLOAD_PATH: &str = "/api/v2/es/upload";

fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig::new("kroy@example.com", "demo", "es-test-key").with_base_url(server.uri())
}

async fn mount_token(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": token })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn requests_to(server: &MockServer, target: &str) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == target)
        .collect()
}

/// Serve each canned HTTP response on its own connection, closing it
/// right after the write.
async fn serve_raw(responses: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            read_request(&mut stream).await;
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    format!("http://{addr}")
}

/// Consume one full request so closing the socket does not reset it.
async fn read_request(stream: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
        let body = &buf[head_end + 4..];

        if head.contains("transfer-encoding: chunked") {
            if body.ends_with(b"0\r\n\r\n") {
                return;
            }
            continue;
        }

        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if body.len() >= length {
            return;
        }
    }
}

fn raw_response(status_line: &str, declared_length: usize, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\n\
         content-length: {declared_length}\r\nconnection: close\r\n\r\n{body}"
    )
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[tokio::test]
async fn test_missing_credentials_fail_before_network() {
    let server = MockServer::start().await;

    let cases = [
        ("", "demo", "key"),
        ("a@b.c", "", "key"),
        ("a@b.c", "demo", ""),
    ];
    for (email, team, key) in cases {
        let config = ClientConfig::new(email, team, key).with_base_url(server.uri());
        let err = CodeFastClient::new(config).unwrap_err();
        assert!(matches!(err, CodeFastError::InvalidArgument(_)));
    }

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_token_is_fetched_once_and_cached() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("accept", "application/json"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "email": "kroy@example.com",
            "teamSlug": "demo",
            "apikey": "es-test-key"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "abc123" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    assert!(!client.has_token().await);

    assert_eq!(client.token().await.unwrap(), "abc123");
    assert_eq!(client.token().await.unwrap(), "abc123");
    assert!(client.has_token().await);
}

#[tokio::test]
async fn test_token_server_error_leaves_cache_empty() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    let err = client.token().await.unwrap_err();

    assert!(err.is_authentication());
    assert_eq!(err.status(), Some(500));
    assert!(!client.has_token().await);
}

#[tokio::test]
async fn test_token_response_without_access_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    let err = client.token().await.unwrap_err();

    assert!(matches!(err, CodeFastError::Authentication { status: None, .. }));
    assert!(!client.has_token().await);
}

#[tokio::test]
async fn test_token_response_not_json() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    assert!(client.token().await.unwrap_err().is_authentication());
}

#[tokio::test]
async fn test_token_network_failure() {
    // Nothing listens on the discard port
    let config = ClientConfig::new("a@b.c", "demo", "key")
        .with_base_url("http://127.0.0.1:9")
        .with_timeout(Duration::from_secs(5));
    let client = CodeFastClient::new(config).unwrap();

    let err = client.token().await.unwrap_err();
    match err {
        CodeFastError::Authentication { status, source, .. } => {
            assert_eq!(status, None);
            assert!(source.is_some());
        }
        other => panic!("expected authentication error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_first_authentication_shares_one_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "shared" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    let (a, b) = tokio::join!(client.token(), client.token());

    assert_eq!(a.unwrap(), "shared");
    assert_eq!(b.unwrap(), "shared");
}

#[tokio::test]
async fn test_missing_file_authenticates_first() {
    let server = MockServer::start().await;
    mount_token(&server, "abc123", 1).await;

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    let err = client.upload_path("missing.txt").await.unwrap_err();

    assert!(matches!(err, CodeFastError::FileNotFound { .. }));
    assert_eq!(requests_to(&server, TOKEN_PATH).await.len(), 1);
}

#[tokio::test]
async fn test_upload_content_returns_response_verbatim() {
    let server = MockServer::start().await;
    mount_token(&server, "abc123", 1).await;

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .and(header("token", "abc123"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "name": "a.txt" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    let response = client.upload_content("a.txt", "hello").await.unwrap();

    assert_eq!(
        serde_json::Value::Object(response),
        json!({ "id": 1, "name": "a.txt" })
    );

    let uploads = requests_to(&server, UPLOAD_PATH).await;
    let body = &uploads[0].body;
    assert!(contains(body, b"name=\"file\""));
    assert!(contains(body, b"filename=\"a.txt\""));
    assert!(contains(body, b"text/plain; charset=utf-8"));
    assert!(contains(body, b"\r\n\r\nhello\r\n"));
}

#[tokio::test]
async fn test_binary_content_sent_byte_for_byte() {
    let server = MockServer::start().await;
    mount_token(&server, "abc123", 1).await;

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    client
        .upload_content("bin.dat", vec![0x00u8, 0x01])
        .await
        .unwrap();

    let uploads = requests_to(&server, UPLOAD_PATH).await;
    let body = &uploads[0].body;
    assert!(contains(body, b"filename=\"bin.dat\""));
    assert!(contains(body, b"\r\n\r\n\x00\x01\r\n"));
}

#[tokio::test]
async fn test_upload_path_streams_file() {
    let server = MockServer::start().await;
    mount_token(&server, "abc123", 1).await;

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .and(header("token", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 7 })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("present.txt");
    std::fs::write(&file, "name,age\nJohn,30\n").unwrap();

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    let response = client.upload_path(&file).await.unwrap();
    assert_eq!(response.get("id"), Some(&json!(7)));

    let uploads = requests_to(&server, UPLOAD_PATH).await;
    let body = &uploads[0].body;
    assert!(contains(body, b"filename=\"present.txt\""));
    assert!(contains(body, b"application/octet-stream"));
    assert!(contains(body, b"name,age\nJohn,30\n"));
}

#[tokio::test]
async fn test_upload_path_with_explicit_name() {
    let server = MockServer::start().await;
    mount_token(&server, "abc123", 1).await;

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("local.csv");
    std::fs::write(&file, "a,b\n").unwrap();

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    client
        .upload(UploadRequest::from_path(&file).with_name("remote.csv"))
        .await
        .unwrap();

    let uploads = requests_to(&server, UPLOAD_PATH).await;
    assert!(contains(&uploads[0].body, b"filename=\"remote.csv\""));
}

#[tokio::test]
async fn test_unauthorized_upload_forces_reauthentication() {
    let server = MockServer::start().await;
    mount_token(&server, "abc123", 2).await;

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 2 })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("present.txt");
    std::fs::write(&file, "content").unwrap();

    let client = CodeFastClient::new(config_for(&server)).unwrap();

    let err = client.upload_path(&file).await.unwrap_err();
    assert!(err.is_authentication());
    assert_eq!(err.status(), Some(401));
    assert!(!client.has_token().await);

    let response = client.upload_path(&file).await.unwrap();
    assert_eq!(response.get("id"), Some(&json!(2)));
    assert_eq!(requests_to(&server, TOKEN_PATH).await.len(), 2);
}

#[tokio::test]
async fn test_upload_server_error_keeps_token() {
    let server = MockServer::start().await;
    mount_token(&server, "abc123", 1).await;

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    let err = client.upload_content("a.txt", "hello").await.unwrap_err();

    match err {
        CodeFastError::Upload { status, body, .. } => {
            assert_eq!(status, Some(500));
            assert_eq!(body.as_deref(), Some("internal error"));
        }
        other => panic!("expected upload error, got {other:?}"),
    }
    assert!(client.has_token().await);
}

#[tokio::test]
async fn test_upload_success_with_malformed_json() {
    let server = MockServer::start().await;
    mount_token(&server, "abc123", 1).await;

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    let err = client.upload_content("a.txt", "hello").await.unwrap_err();

    assert!(matches!(err, CodeFastError::Upload { status: Some(200), .. }));
}

#[tokio::test]
async fn test_upload_auth_failure_propagates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client = CodeFastClient::new(config_for(&server)).unwrap();
    let err = client.upload_content("a.txt", "hello").await.unwrap_err();

    assert!(err.is_authentication());
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn test_from_parts_without_payload_makes_no_requests() {
    let server = MockServer::start().await;
    let _client = CodeFastClient::new(config_for(&server)).unwrap();

    let err = UploadRequest::from_parts(None, Some("a.txt".to_string()), None).unwrap_err();
    assert!(matches!(err, CodeFastError::InvalidArgument(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unauthorized_with_truncated_body_still_clears_token() {
    let token_body = r#"{"access_token":"abc123"}"#;
    let base_url = serve_raw(vec![
        raw_response("200 OK", token_body.len(), token_body),
        // Declares 100 bytes, sends 7, then closes
        raw_response("401 Unauthorized", 100, "expired"),
    ])
    .await;

    let config = ClientConfig::new("a@b.c", "demo", "key").with_base_url(base_url);
    let client = CodeFastClient::new(config).unwrap();

    let err = client.upload_content("a.txt", "hello").await.unwrap_err();
    assert!(err.is_authentication(), "expected authentication error, got {err:?}");
    assert_eq!(err.status(), Some(401));
    assert!(!client.has_token().await);
}

#[tokio::test]
async fn test_token_unusable_as_header_is_not_cached() {
    let server = MockServer::start().await;
    mount_token(&server, "bad\ntoken", 2).await;

    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client = CodeFastClient::new(config_for(&server)).unwrap();

    for _ in 0..2 {
        let err = client.upload_content("a.txt", "hello").await.unwrap_err();
        assert!(err.is_authentication());
        assert!(!client.has_token().await);
    }
    assert_eq!(requests_to(&server, TOKEN_PATH).await.len(), 2);
}

#[tokio::test]
async fn test_upload_transport_failure_keeps_token() {
    let server = MockServer::start().await;
    mount_token(&server, "abc123", 1).await;

    // Slower than the client timeout, so no response ever arrives
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let config = config_for(&server).with_timeout(Duration::from_millis(500));
    let client = CodeFastClient::new(config).unwrap();

    let err = client.upload_content("a.txt", "hello").await.unwrap_err();
    match err {
        CodeFastError::Upload {
            status,
            body,
            source,
            ..
        } => {
            assert_eq!(status, None);
            assert_eq!(body, None);
            assert!(source.is_some_and(|e| e.is_timeout()));
        }
        other => panic!("expected upload error, got {other:?}"),
    }
    assert!(client.has_token().await);
}
