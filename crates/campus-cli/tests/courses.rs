//! Integration tests for `campus courses`.


use fixtures::{ACCESS_TOKEN, campus, can_bind_localhost, mount_user, write_session};
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_list_prints_courses() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    write_session(home.path(), &server);
    mount_user(&server, &["student"]).await;

    Mock::given(method("GET"))
        .and(path("/api/courses"))
        .and(header("authorization", format!("Bearer {ACCESS_TOKEN}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "title": "Rust Basics", "description": "Ownership and borrowing" },
            { "id": 2, "title": "Distributed Systems", "description": "Consensus" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    campus(home.path(), &server)
        .args(["courses", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rust Basics"))
        .stdout(predicate::str::contains("Ownership and borrowing"))
        .stdout(predicate::str::contains("Distributed Systems"));
}

#[tokio::test]
async fn test_list_empty_shows_message() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    write_session(home.path(), &server);
    mount_user(&server, &["admin"]).await;

    Mock::given(method("GET"))
        .and(path("/api/courses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    campus(home.path(), &server)
        .args(["courses", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No courses available."));
}

#[tokio::test]
async fn test_list_maps_unauthorized() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    write_session(home.path(), &server);
    mount_user(&server, &["student"]).await;

    Mock::given(method("GET"))
        .and(path("/api/courses"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    campus(home.path(), &server)
        .args(["courses", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("401 – invalid or expired token."));
}

#[tokio::test]
async fn test_list_without_role_is_denied() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    write_session(home.path(), &server);
    mount_user(&server, &[]).await;

    Mock::given(method("GET"))
        .and(path("/api/courses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    campus(home.path(), &server)
        .args(["courses", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Access denied"));
}

#[tokio::test]
async fn test_list_without_session_fails() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;

    campus(home.path(), &server)
        .args(["courses", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not logged in"));
}

#[tokio::test]
async fn test_create_posts_course() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    write_session(home.path(), &server);
    mount_user(&server, &["admin"]).await;

    Mock::given(method("POST"))
        .and(path("/api/courses"))
        .and(header("authorization", format!("Bearer {ACCESS_TOKEN}")))
        .and(body_json(json!({ "title": "T", "description": "D" })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": 7, "title": "T", "description": "D" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    campus(home.path(), &server)
        .args(["courses", "create", "--title", " T ", "--description", "D"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Course created (id=7): T"));
}

#[tokio::test]
async fn test_create_forbidden_message() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    write_session(home.path(), &server);
    mount_user(&server, &["admin"]).await;

    Mock::given(method("POST"))
        .and(path("/api/courses"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    campus(home.path(), &server)
        .args(["courses", "create", "--title", "T", "--description", "D"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "403 – insufficient role to create a course.",
        ));
}

#[tokio::test]
async fn test_create_rejects_blank_fields_without_request() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    write_session(home.path(), &server);

    Mock::given(method("POST"))
        .and(path("/api/courses"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    campus(home.path(), &server)
        .args(["courses", "create", "--title", "   ", "--description", "D"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Title and description are required."));
}

#[tokio::test]
async fn test_create_requires_admin_role() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    write_session(home.path(), &server);
    mount_user(&server, &["student"]).await;

    Mock::given(method("POST"))
        .and(path("/api/courses"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    campus(home.path(), &server)
        .args(["courses", "create", "--title", "T", "--description", "D"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Course management requires the admin role."));
}
