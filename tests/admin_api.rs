//! Back-office routes: access control, CSV import/export, uploads and events.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use common::{ADMIN_EMAIL, TestApp, TestResponse};

const BOUNDARY: &str = "storefront-test-boundary";

fn multipart_body(file_name: &str, content_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn upload(app: &TestApp, uri: &str, cookie: &str, file_name: &str, content_type: &str, content: &[u8]) -> TestResponse {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(multipart_body(file_name, content_type, content)))
        .unwrap();
    app.send(request).await
}

#[tokio::test]
async fn test_admin_routes_reject_customers_and_guests() {
    let app = TestApp::new();
    let customer = app.register("customer@example.com").await;

    let guest = app.get("/api/admin/products", None).await;
    assert_eq!(guest.status, StatusCode::UNAUTHORIZED);

    let forbidden = app.post("/api/admin/products", Some(&customer), json!({"name": "Hack", "price": 1})).await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
    assert_eq!(forbidden.body["error"], "Admin access required");

    let users = app.get("/api/admin/users", Some(&customer)).await;
    assert_eq!(users.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_email_needs_verification_before_promotion() {
    let app = TestApp::new();
    let squatter = app.register(ADMIN_EMAIL).await;
    let me = app.get("/api/auth/me", Some(&squatter)).await;
    assert_eq!(me.body["role"], "customer");
    let users = app.get("/api/admin/users", Some(&squatter)).await;
    assert_eq!(users.status, StatusCode::FORBIDDEN);

    let credentials = json!({"email": ADMIN_EMAIL, "password": "password123"});
    let login = app.post("/api/auth/login", None, credentials.clone()).await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["role"], "customer");

    // The mailbox owner signs in with a code and takes the account over.
    let verified = app.login_with_code(ADMIN_EMAIL).await;
    assert_eq!(verified.status, StatusCode::OK);
    let owner = verified.session_cookie().expect("session cookie");
    let me = app.get("/api/auth/me", Some(&owner)).await;
    assert_eq!(me.body["role"], "admin");
    assert_eq!(app.get("/api/admin/users", Some(&owner)).await.status, StatusCode::OK);

    let login = app.post("/api/auth/login", None, credentials).await;
    assert_eq!(login.status, StatusCode::UNAUTHORIZED);
    let users = app.get("/api/admin/users", Some(&squatter)).await;
    assert_eq!(users.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_lists_users_without_secrets() {
    let app = TestApp::new();
    let admin = app.admin().await;
    app.register("one@example.com").await;
    app.register("two@example.com").await;

    let users = app.get("/api/admin/users?search=example.com", Some(&admin)).await;
    assert_eq!(users.status, StatusCode::OK);
    assert_eq!(users.body["total"], 2);
    assert!(users.body["data"][0].get("password_hash").is_none());

    let me = app.get("/api/auth/me", Some(&admin)).await;
    assert_eq!(me.body["email"], ADMIN_EMAIL);
    assert_eq!(me.body["role"], "admin");
}

#[tokio::test]
async fn test_product_update_archive_and_duplicate_sku() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let created = app
        .post("/api/admin/products", Some(&admin), json!({"sku": "TEE-001", "name": "Tee", "price": 499, "status": "active"}))
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.body["id"].as_str().unwrap();

    let duplicate = app.post("/api/admin/products", Some(&admin), json!({"sku": "TEE-001", "name": "Other", "price": 1})).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let bad_mrp = app
        .call(Method::PUT, &format!("/api/admin/products/{id}"), Some(&admin), Some(json!({"name": "Tee", "price": 499, "mrp": 299})))
        .await;
    assert_eq!(bad_mrp.status, StatusCode::BAD_REQUEST);

    let updated = app
        .call(Method::PUT, &format!("/api/admin/products/{id}"), Some(&admin), Some(json!({"name": "Organic Tee", "price": 549, "mrp": 699})))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["name"], "Organic Tee");

    let archived = app.call(Method::DELETE, &format!("/api/admin/products/{id}"), Some(&admin), None).await;
    assert_eq!(archived.body["status"], "archived");
    assert_eq!(app.get(&format!("/api/products/{id}"), None).await.status, StatusCode::NOT_FOUND);

    let admin_view = app.get("/api/admin/products?status=archived", Some(&admin)).await;
    assert_eq!(admin_view.body["total"], 1);

    let oversold = app.post(&format!("/api/admin/products/{id}/stock"), Some(&admin), json!({"delta": -1})).await;
    assert_eq!(oversold.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_csv_import_upserts_and_reports_bad_lines() {
    let app = TestApp::new();
    let admin = app.admin().await;
    app.post("/api/admin/categories", Some(&admin), json!({"name": "Tops"})).await;
    app.post("/api/admin/products", Some(&admin), json!({"sku": "TEE-001", "name": "Old Tee", "price": 399})).await;

    let csv = "\
sku,name,description,price,mrp,category,sizes,images,tags,stock,weight_grams,status
TEE-001,Cotton Tee,Soft tee,499,699,tops,S|M|L,,basics,12,200,active
SHIRT-01,Linen Shirt,,1299,,tops,M|L,https://img.example/shirt.jpg,,4,350,active
BAD-01,Broken,,not-a-price,,,,,,1,,
CAP-01,Cap,,299,,hats,,,,1,,
";
    let report = upload(&app, "/api/admin/products/import", &admin, "products.csv", "text/csv", csv.as_bytes()).await;
    assert_eq!(report.status, StatusCode::OK, "import failed: {}", report.body);
    assert_eq!(report.body["created"], 1);
    assert_eq!(report.body["updated"], 1);
    let lines: Vec<u64> = report.body["errors"].as_array().unwrap().iter().map(|e| e["line"].as_u64().unwrap()).collect();
    assert_eq!(lines, [4, 5]);

    let tops = app.get("/api/products?category=tops", None).await;
    assert_eq!(tops.body["total"], 2);

    let export = app.send(
        Request::builder()
            .uri("/api/admin/products/export")
            .header(header::COOKIE, &admin)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(export.status, StatusCode::OK);
    assert!(export.headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
    let text = export.body.as_str().unwrap();
    assert!(text.starts_with("sku,name,description,price"));
    assert!(text.contains("TEE-001,Cotton Tee,Soft tee,499,699,tops,S|M|L"));
}

#[tokio::test]
async fn test_image_upload() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let image = upload(&app, "/api/admin/uploads", &admin, "hero.png", "image/png", b"\x89PNG fake").await;
    assert_eq!(image.status, StatusCode::CREATED);
    assert_eq!(image.body["url"], "https://img.example/hero.png");
    assert_eq!(image.body["public_id"], "storefront/hero.png");

    let not_image = upload(&app, "/api/admin/uploads", &admin, "notes.txt", "text/plain", b"hello").await;
    assert_eq!(not_image.status, StatusCode::BAD_REQUEST);

    let unconfigured = TestApp::without_integrations();
    let admin = unconfigured.admin().await;
    let unavailable = upload(&unconfigured, "/api/admin/uploads", &admin, "hero.png", "image/png", b"png").await;
    assert_eq!(unavailable.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(unavailable.body["error"], "Image uploads is not configured");
}

#[tokio::test]
async fn test_event_stream_is_server_sent_events() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let request = Request::builder()
        .uri("/api/admin/events")
        .header(header::COOKIE, &admin)
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
}

#[tokio::test]
async fn test_event_stream_ends_on_shutdown() {
    let app = TestApp::new();
    let admin = app.admin().await;

    let request = Request::builder()
        .uri("/api/admin/events")
        .header(header::COOKIE, &admin)
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    app.state.shutdown().cancel();
    let body = tokio::time::timeout(Duration::from_secs(5), response.into_body().collect()).await;
    assert!(body.expect("stream still open after shutdown").is_ok());
}
