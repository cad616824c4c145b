//! HTTP-level tests driving the router with `tower::ServiceExt::oneshot`.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Request, StatusCode, header};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use task_tracker::api::{self, AppState};
use task_tracker::config::ServerConfig;
use task_tracker::db::Database;
use task_tracker::error::ERROR_NOTE;
use task_tracker::media::MediaStore;

const BOUNDARY: &str = "task-tracker-test-boundary";

struct TestApp {
    router: Router,
    token: String,
    media_dir: TempDir,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl TestResponse {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response is not JSON")
    }
}

fn setup_with(page_size: u64, server: ServerConfig) -> TestApp {
    let db = Database::open_in_memory().expect("Failed to create in-memory database");
    let token = db.issue_token("tester").unwrap().key;
    let media_dir = TempDir::new().unwrap();
    let state = AppState::new(Arc::new(db), Arc::new(MediaStore::new(media_dir.path())))
        .with_page_size(page_size);

    TestApp {
        router: api::router(state, &server),
        token,
        media_dir,
    }
}

fn setup() -> TestApp {
    setup_with(10, ServerConfig::default())
}

fn multipart_body(task: Option<&str>, file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(task) = task {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"task\"\r\n\r\n{task}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            headers,
            body: body.to_vec(),
        }
    }

    fn authed(&self, method: &str, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Token {}", self.token))
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> TestResponse {
        let request = match body {
            Some(body) => self
                .authed(method, uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => self.authed(method, uri).body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn upload(&self, method: &str, uri: &str, body: Vec<u8>) -> TestResponse {
        let request = self
            .authed(method, uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn create_task(&self, body: Value) -> Value {
        let response = self.call("POST", "/tasks/", Some(body)).await;
        assert_eq!(response.status, StatusCode::CREATED);
        response.json()
    }
}

fn id_of(record: &Value) -> String {
    match &record["id"] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn health_is_public() {
        let app = setup();
        let response = app
            .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json()["status"], "ok");
    }

    #[tokio::test]
    async fn missing_token_is_rejected_with_envelope() {
        let app = setup();
        let response = app
            .send(Request::builder().uri("/tasks/").body(Body::empty()).unwrap())
            .await;

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers.get(header::WWW_AUTHENTICATE).unwrap(),
            "Token"
        );
        assert_eq!(
            response.json(),
            json!({
                "status_code": 401,
                "errors": {"detail": "Authentication credentials were not provided."},
                "detail": ERROR_NOTE,
            })
        );
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let app = setup();
        let response = app
            .send(
                Request::builder()
                    .uri("/tasks/")
                    .header(header::AUTHORIZATION, "Token 0000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.json()["errors"]["detail"], "Invalid token.");
    }

    #[tokio::test]
    async fn bearer_scheme_is_accepted() {
        let app = setup();
        let response = app
            .send(
                Request::builder()
                    .uri("/tasks/")
                    .header(header::AUTHORIZATION, format!("Bearer {}", app.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn api_root_lists_collections() {
        let app = setup();
        let response = app.call("GET", "/", None).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.json(),
            json!({"tasks": "/tasks/", "comments": "/comments/", "files": "/files/"})
        );
    }
}

mod task_tests {
    use super::*;

    #[tokio::test]
    async fn create_defaults_status_to_new() {
        let app = setup();
        let task = app.create_task(json!({"title": "Write report"})).await;

        assert_eq!(task["title"], "Write report");
        assert_eq!(task["status"], "new");
        assert_eq!(task["description"], Value::Null);
        assert_eq!(task["comments"], json!([]));
        assert_eq!(task["files"], json!([]));
    }

    #[tokio::test]
    async fn create_without_title_reports_the_field() {
        let app = setup();
        let response = app
            .call("POST", "/tasks/", Some(json!({"description": "no title"})))
            .await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json(),
            json!({
                "status_code": 400,
                "errors": {"title": ["This field is required."]},
                "detail": ERROR_NOTE,
            })
        );
    }

    #[tokio::test]
    async fn invalid_status_and_blank_title_are_both_reported() {
        let app = setup();
        let response = app
            .call("POST", "/tasks/", Some(json!({"title": "  ", "status": "done"})))
            .await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let body = response.json();
        assert_eq!(body["errors"]["title"], json!(["This field may not be blank."]));
        assert_eq!(
            body["errors"]["status"],
            json!(["\"done\" is not a valid choice."])
        );
    }

    #[tokio::test]
    async fn nul_characters_are_a_validation_error() {
        let app = setup();
        let response = app
            .call("POST", "/tasks/", Some(json!({"title": "\u{0}abc"})))
            .await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json()["errors"],
            json!({"title": ["Null characters are not allowed."]})
        );
    }

    #[tokio::test]
    async fn scalar_titles_are_read_as_text() {
        let app = setup();
        let task = app.create_task(json!({"title": 5})).await;
        assert_eq!(task["title"], "5");

        let response = app
            .call("POST", "/tasks/", Some(json!({"title": true})))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json()["errors"],
            json!({"title": ["Not a valid string."]})
        );
    }

    #[tokio::test]
    async fn titles_are_stored_trimmed() {
        let app = setup();
        let task = app.create_task(json!({"title": "  padded  "})).await;
        assert_eq!(task["title"], "padded");

        let fetched = app
            .call("GET", &format!("/tasks/{}/", id_of(&task)), None)
            .await
            .json();
        assert_eq!(fetched["title"], "padded");
    }

    #[tokio::test]
    async fn patch_changes_only_supplied_fields() {
        let app = setup();
        let task = app
            .create_task(json!({"title": "Draft", "description": "keep"}))
            .await;
        let id = id_of(&task);

        let response = app
            .call(
                "PATCH",
                &format!("/tasks/{}/", id),
                Some(json!({"status": "in_progress"})),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        let updated = response.json();

        assert_eq!(updated["title"], "Draft");
        assert_eq!(updated["description"], "keep");
        assert_eq!(updated["status"], "in_progress");
        assert_eq!(updated["created_at"], task["created_at"]);

        let before: DateTime<Utc> = task["updated_at"].as_str().unwrap().parse().unwrap();
        let after: DateTime<Utc> = updated["updated_at"].as_str().unwrap().parse().unwrap();
        assert!(after > before);
    }

    #[tokio::test]
    async fn put_requires_title() {
        let app = setup();
        let task = app.create_task(json!({"title": "Draft"})).await;

        let response = app
            .call(
                "PUT",
                &format!("/tasks/{}/", id_of(&task)),
                Some(json!({"status": "completed"})),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.json()["errors"]["title"].is_array());
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let app = setup();
        for method in ["GET", "DELETE"] {
            let response = app.call(method, "/tasks/does-not-exist/", None).await;
            assert_eq!(response.status, StatusCode::NOT_FOUND);
            assert_eq!(response.json()["errors"], json!({"detail": "Not found."}));
        }
        let response = app
            .call("PATCH", "/tasks/does-not-exist/", Some(json!({"title": "x"})))
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn filter_and_search_through_query_string() {
        let app = setup();
        app.create_task(json!({"title": "Quarterly report"})).await;
        app.create_task(json!({"title": "Report archive", "status": "completed"}))
            .await;
        app.create_task(json!({"title": "Groceries"})).await;

        let response = app
            .call("GET", "/tasks/?status=new&search=REPORT", None)
            .await;
        let body = response.json();
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["title"], "Quarterly report");
    }

    #[tokio::test]
    async fn encoded_search_term_is_decoded() {
        let app = setup();
        app.create_task(json!({"title": "Поиск 1"})).await;
        app.create_task(json!({"title": "Поиск2"})).await;

        let body = app
            .call(
                "GET",
                "/tasks/?search=%D0%9F%D0%BE%D0%B8%D1%81%D0%BA+1",
                None,
            )
            .await
            .json();
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["title"], "Поиск 1");
    }

    #[tokio::test]
    async fn pagination_links_keep_other_parameters() {
        let app = setup_with(5, ServerConfig::default());
        for i in 0..12 {
            app.create_task(json!({"title": format!("task {}", i)})).await;
        }

        let first = app.call("GET", "/tasks/?status=new", None).await.json();
        assert_eq!(first["count"], 12);
        assert_eq!(first["results"].as_array().unwrap().len(), 5);
        assert_eq!(first["next"], "/tasks/?status=new&page=2");
        assert_eq!(first["previous"], Value::Null);

        let last = app
            .call("GET", "/tasks/?status=new&page=3", None)
            .await
            .json();
        assert_eq!(last["results"].as_array().unwrap().len(), 2);
        assert_eq!(last["next"], Value::Null);
        assert_eq!(last["previous"], "/tasks/?status=new&page=2");

        let beyond = app.call("GET", "/tasks/?page=9", None).await;
        assert_eq!(beyond.status, StatusCode::OK);
        assert_eq!(beyond.json()["results"], json!([]));
    }
}

mod framework_error_tests {
    use super::*;

    #[tokio::test]
    async fn wrong_verb_is_method_not_allowed() {
        let app = setup();
        let response = app.call("DELETE", "/tasks/", None).await;
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.json()["errors"]["detail"],
            "Method \"DELETE\" not allowed."
        );
    }

    #[tokio::test]
    async fn unknown_route_is_not_found_envelope() {
        let app = setup();
        let response = app.call("GET", "/nope/", None).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json()["status_code"], 404);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let app = setup();
        let request = app
            .authed("POST", "/tasks/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"title\": "))
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.json()["detail"], ERROR_NOTE);
    }

    #[tokio::test]
    async fn form_body_on_json_endpoint_is_unsupported() {
        let app = setup();
        let request = app
            .authed("POST", "/tasks/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("title=x"))
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let server = ServerConfig {
            max_upload_bytes: 64,
            ..ServerConfig::default()
        };
        let app = setup_with(10, server);
        let response = app
            .call("POST", "/tasks/", Some(json!({"title": "x".repeat(200)})))
            .await;
        assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.json()["status_code"], 413);
    }
}

mod comment_tests {
    use super::*;

    #[tokio::test]
    async fn comment_round_trip() {
        let app = setup();
        let task = app.create_task(json!({"title": "Discuss"})).await;
        let task_id = id_of(&task);

        let response = app
            .call(
                "POST",
                "/comments/",
                Some(json!({"task": task_id, "text": "First!"})),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
        let comment = response.json();
        assert_eq!(comment["task"], task_id.as_str());

        let fetched = app
            .call("GET", &format!("/tasks/{}/", task_id), None)
            .await
            .json();
        assert_eq!(fetched["comments"][0]["text"], "First!");

        let list = app.call("GET", "/comments/", None).await.json();
        assert_eq!(list["count"], 1);
    }

    #[tokio::test]
    async fn comment_on_missing_task_fails_on_task() {
        let app = setup();
        let response = app
            .call(
                "POST",
                "/comments/",
                Some(json!({"task": "missing", "text": ""})),
            )
            .await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let errors = &response.json()["errors"];
        assert_eq!(
            errors["task"],
            json!(["Invalid pk \"missing\" - object does not exist."])
        );
        assert_eq!(errors["text"], json!(["This field may not be blank."]));
    }

    #[tokio::test]
    async fn non_string_task_reference_fails_on_task() {
        let app = setup();
        let response = app
            .call("POST", "/comments/", Some(json!({"task": 42, "text": "x"})))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json()["errors"],
            json!({"task": ["Invalid pk \"42\" - object does not exist."]})
        );

        let response = app
            .call("POST", "/comments/", Some(json!({"task": [1], "text": "x"})))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json()["errors"],
            json!({"task": ["Not a valid string."]})
        );
    }

    #[tokio::test]
    async fn nul_in_comment_text_is_a_validation_error() {
        let app = setup();
        let task = app.create_task(json!({"title": "Discuss"})).await;
        let response = app
            .call(
                "POST",
                "/comments/",
                Some(json!({"task": id_of(&task), "text": "\u{0}"})),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json()["errors"],
            json!({"text": ["Null characters are not allowed."]})
        );
    }

    #[tokio::test]
    async fn non_numeric_comment_id_is_not_found() {
        let app = setup();
        let response = app.call("GET", "/comments/abc/", None).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}

mod file_tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_download() {
        let app = setup();
        let task = app.create_task(json!({"title": "Attach"})).await;
        let task_id = id_of(&task);

        let response = app
            .upload(
                "POST",
                "/files/",
                multipart_body(Some(&task_id), Some(("notes.txt", "text/plain", b"hello"))),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
        let file = response.json();
        assert_eq!(file["task"], task_id.as_str());
        assert_eq!(file["name"], "notes.txt");
        assert_eq!(file["size"], 5);

        let url = file["file"].as_str().unwrap().to_string();
        assert!(url.starts_with("/media/task_files/"));

        let download = app.call("GET", &url, None).await;
        assert_eq!(download.status, StatusCode::OK);
        assert_eq!(download.body, b"hello");
        assert_eq!(
            download.headers.get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );

        let fetched = app
            .call("GET", &format!("/tasks/{}/", task_id), None)
            .await
            .json();
        assert_eq!(fetched["files"][0]["id"], file["id"]);
    }

    #[tokio::test]
    async fn upload_without_file_or_task() {
        let app = setup();
        let response = app.upload("POST", "/files/", multipart_body(None, None)).await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let errors = &response.json()["errors"];
        assert_eq!(errors["file"], json!(["No file was submitted."]));
        assert_eq!(errors["task"], json!(["This field is required."]));
    }

    #[tokio::test]
    async fn upload_to_missing_task_stores_nothing() {
        let app = setup();
        let response = app
            .upload(
                "POST",
                "/files/",
                multipart_body(Some("missing"), Some(("a.txt", "text/plain", b"data"))),
            )
            .await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.json()["errors"]["task"].is_array());
        assert!(!app.media_dir.path().join("task_files").exists());
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let app = setup();
        let task = app.create_task(json!({"title": "Attach"})).await;
        let response = app
            .upload(
                "POST",
                "/files/",
                multipart_body(Some(&id_of(&task)), Some(("empty.txt", "text/plain", b""))),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json()["errors"]["file"],
            json!(["The submitted file is empty."])
        );
    }

    #[tokio::test]
    async fn replacing_the_blob_removes_the_old_one() {
        let app = setup();
        let task = app.create_task(json!({"title": "Attach"})).await;
        let task_id = id_of(&task);
        let file = app
            .upload(
                "POST",
                "/files/",
                multipart_body(Some(&task_id), Some(("v1.txt", "text/plain", b"one"))),
            )
            .await
            .json();
        let old_url = file["file"].as_str().unwrap().to_string();

        let response = app
            .upload(
                "PATCH",
                &format!("/files/{}/", id_of(&file)),
                multipart_body(None, Some(("v2.txt", "text/plain", b"two"))),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        let updated = response.json();
        assert_eq!(updated["name"], "v2.txt");
        assert_eq!(updated["task"], task_id.as_str());

        assert_eq!(app.call("GET", &old_url, None).await.status, StatusCode::NOT_FOUND);
        let new_url = updated["file"].as_str().unwrap();
        assert_eq!(app.call("GET", new_url, None).await.body, b"two");
    }
}

mod cascade_tests {
    use super::*;

    #[tokio::test]
    async fn deleting_a_task_cascades() {
        let app = setup();
        let task = app.create_task(json!({"title": "Doomed"})).await;
        let task_id = id_of(&task);

        let comment = app
            .call(
                "POST",
                "/comments/",
                Some(json!({"task": task_id, "text": "bye"})),
            )
            .await
            .json();
        let file = app
            .upload(
                "POST",
                "/files/",
                multipart_body(Some(&task_id), Some(("a.bin", "application/octet-stream", &[1, 2, 3]))),
            )
            .await
            .json();
        let url = file["file"].as_str().unwrap().to_string();

        let response = app.call("DELETE", &format!("/tasks/{}/", task_id), None).await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body.is_empty());

        for uri in [
            format!("/tasks/{}/", task_id),
            format!("/comments/{}/", id_of(&comment)),
            format!("/files/{}/", id_of(&file)),
            url,
        ] {
            assert_eq!(app.call("GET", &uri, None).await.status, StatusCode::NOT_FOUND, "{}", uri);
        }

        let leftovers = std::fs::read_dir(app.media_dir.path().join("task_files"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }
}
