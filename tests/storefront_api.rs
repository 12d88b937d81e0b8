//! Router tests for the public storefront, sign-in, account and cart routes.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use common::{TestApp, TestResponse, decimal};
use storefront::services::accounts::OtpCode;
use storefront::store::Filter;

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let response = app.get("/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
}

#[tokio::test]
async fn test_storefront_lists_only_active_products() {
    let app = TestApp::new();
    let admin = app.admin().await;
    app.create_product(&admin, "Linen Shirt", 1499, 10, &["M", "L"]).await;
    app.create_product(&admin, "Cotton Tee", 599, 10, &[]).await;
    let draft = app
        .post("/api/admin/products", Some(&admin), json!({"name": "Secret Jacket", "price": 2999}))
        .await;
    assert_eq!(draft.status, StatusCode::CREATED);
    assert_eq!(draft.body["status"], "draft");

    let listing = app.get("/api/products?sort=price_asc", None).await;
    assert_eq!(listing.status, StatusCode::OK);
    assert_eq!(listing.body["total"], 2);
    let names: Vec<&str> = listing.body["data"].as_array().unwrap().iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Cotton Tee", "Linen Shirt"]);

    let draft_id = draft.body["id"].as_str().unwrap();
    let hidden = app.get(&format!("/api/products/{draft_id}"), None).await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);
    assert_eq!(hidden.body["error"], "Product not found");

    let search = app.get("/api/products?search=linen", None).await;
    assert_eq!(search.body["total"], 1);
}

#[tokio::test]
async fn test_products_filter_by_category_slug() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let category = app.post("/api/admin/categories", Some(&admin), json!({"name": "Summer Wear"})).await;
    assert_eq!(category.status, StatusCode::CREATED);
    assert_eq!(category.body["slug"], "summer-wear");
    let category_id = category.body["id"].as_str().unwrap();

    let created = app
        .post(
            "/api/admin/products",
            Some(&admin),
            json!({"name": "Shorts", "price": 799, "stock": 3, "status": "active", "category_id": category_id}),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED);
    app.create_product(&admin, "Scarf", 399, 3, &[]).await;

    let by_slug = app.get("/api/categories/summer-wear", None).await;
    assert_eq!(by_slug.body["id"], category_id);

    let filtered = app.get("/api/products?category=summer-wear", None).await;
    assert_eq!(filtered.body["total"], 1);
    assert_eq!(filtered.body["data"][0]["name"], "Shorts");

    let unknown = app.get("/api/products?category=winter", None).await;
    assert_eq!(unknown.body["total"], 0);

    // A referenced category cannot be deleted.
    let delete = app.call(Method::DELETE, &format!("/api/admin/categories/{category_id}"), Some(&admin), None).await;
    assert_eq!(delete.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_login_logout() {
    let app = TestApp::new();
    let cookie = app.register("Asha@Example.com").await;

    let me = app.get("/api/auth/me", Some(&cookie)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["email"], "asha@example.com");
    assert_eq!(me.body["role"], "customer");
    assert!(me.body.get("password_hash").is_none());

    let duplicate = app
        .post("/api/auth/register", None, json!({"name": "Asha", "email": "asha@example.com", "password": "password123"}))
        .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let logout = app.post("/api/auth/logout", Some(&cookie), json!({})).await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);
    let me = app.get("/api/auth/me", Some(&cookie)).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);

    let wrong = app
        .post("/api/auth/login", None, json!({"email": "asha@example.com", "password": "nope-nope"}))
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body["error"], "Invalid email or password");

    let login = app
        .post("/api/auth/login", None, json!({"email": "asha@example.com", "password": "password123"}))
        .await;
    assert_eq!(login.status, StatusCode::OK);
    let cookie = login.session_cookie().unwrap();
    assert_eq!(app.get("/api/auth/me", Some(&cookie)).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_validation_message() {
    let app = TestApp::new();
    let response = app
        .post("/api/auth/register", None, json!({"name": "Ravi", "email": "ravi@example.com", "password": "short"}))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "Password must be at least 8 characters");
}

#[tokio::test]
async fn test_email_code_login_creates_verified_user() {
    let app = TestApp::new();
    let request = app.post("/api/auth/otp/request", None, json!({"email": "meera@example.com"})).await;
    assert_eq!(request.status, StatusCode::ACCEPTED);

    let code = {
        let sent = app.mailer.sent.lock().await;
        let email = sent.last().unwrap();
        assert_eq!(email.to, "meera@example.com");
        email.body.chars().filter(char::is_ascii_digit).take(6).collect::<String>()
    };
    assert_eq!(code.len(), 6);

    let wrong = app
        .post("/api/auth/otp/verify", None, json!({"email": "meera@example.com", "code": "000000"}))
        .await;
    if code != "000000" {
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    }

    let verify = app.post("/api/auth/otp/verify", None, json!({"email": "meera@example.com", "code": code})).await;
    assert_eq!(verify.status, StatusCode::OK);
    assert_eq!(verify.body["email_verified"], true);
    assert!(verify.session_cookie().is_some());

    // Codes are single use.
    let reuse = app.post("/api/auth/otp/verify", None, json!({"email": "meera@example.com", "code": code})).await;
    assert_eq!(reuse.status, StatusCode::UNAUTHORIZED);
}

async fn request_code(app: &TestApp, email: &str) -> TestResponse {
    app.post("/api/auth/otp/request", None, json!({"email": email})).await
}

async fn submit_code(app: &TestApp, email: &str, code: &str) -> TestResponse {
    app.post("/api/auth/otp/verify", None, json!({"email": email, "code": code})).await
}

async fn expire_code(app: &TestApp, email: &str) {
    let codes = app.state.collection::<OtpCode>();
    let mut otp = codes.find_one(Filter::new().eq("email", email)).await.unwrap().expect("stored code");
    otp.expires_at = Utc::now() - Duration::minutes(1);
    codes.save(&otp).await.unwrap();
}

#[tokio::test]
async fn test_email_code_locks_after_five_wrong_guesses() {
    let app = TestApp::new();
    let email = "ravi@example.com";
    assert_eq!(request_code(&app, email).await.status, StatusCode::ACCEPTED);
    let code = app.last_code(email).await;

    for _ in 0..5 {
        let wrong = submit_code(&app, email, "000000").await;
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.body["error"], "Incorrect code");
    }
    let locked = submit_code(&app, email, &code).await;
    assert_eq!(locked.status, StatusCode::UNAUTHORIZED);
    assert_eq!(locked.body["error"], "Code expired or invalid");

    let again = request_code(&app, email).await;
    assert_eq!(again.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(again.body["error"], "Too many attempts, please try again later");

    // The lockout lasts as long as the code would have.
    expire_code(&app, email).await;
    assert_eq!(request_code(&app, email).await.status, StatusCode::ACCEPTED);
    let fresh = app.last_code(email).await;
    assert_eq!(submit_code(&app, email, &fresh).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_new_email_code_keeps_the_guess_count() {
    let app = TestApp::new();
    let email = "ravi@example.com";
    request_code(&app, email).await;
    for _ in 0..4 {
        assert_eq!(submit_code(&app, email, "000000").await.status, StatusCode::UNAUTHORIZED);
    }

    assert_eq!(request_code(&app, email).await.status, StatusCode::ACCEPTED);
    let code = app.last_code(email).await;
    let fifth = submit_code(&app, email, "000000").await;
    assert_eq!(fifth.body["error"], "Incorrect code");

    let locked = submit_code(&app, email, &code).await;
    assert_eq!(locked.status, StatusCode::UNAUTHORIZED);
    assert_eq!(locked.body["error"], "Code expired or invalid");
}

#[tokio::test]
async fn test_expired_email_code_is_rejected() {
    let app = TestApp::new();
    let email = "ravi@example.com";
    request_code(&app, email).await;
    let code = app.last_code(email).await;
    expire_code(&app, email).await;

    let expired = submit_code(&app, email, &code).await;
    assert_eq!(expired.status, StatusCode::UNAUTHORIZED);
    assert_eq!(expired.body["error"], "Code expired or invalid");
    assert!(expired.session_cookie().is_none());
}

#[tokio::test]
async fn test_account_routes_require_login() {
    let app = TestApp::new();
    for uri in ["/api/account", "/api/cart", "/api/wishlist", "/api/orders"] {
        let response = app.get(uri, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(response.body["error"], "Please log in");
    }
}

#[tokio::test]
async fn test_address_book() {
    let app = TestApp::new();
    let cookie = app.register("dev@example.com").await;

    let first = app.add_address(&cookie).await;
    assert_eq!(first["is_default"], true);
    assert_eq!(first["country"], "India");

    let bad_pincode = app
        .post(
            "/api/account/addresses",
            Some(&cookie),
            json!({"name": "Dev", "phone": "9876543210", "line1": "1 Park St", "city": "Kolkata", "state": "WB", "pincode": "7000"}),
        )
        .await;
    assert_eq!(bad_pincode.status, StatusCode::BAD_REQUEST);

    let second = app
        .post(
            "/api/account/addresses",
            Some(&cookie),
            json!({"name": "Dev", "phone": "9876543210", "line1": "1 Park St", "city": "Kolkata", "state": "WB", "pincode": "700016", "is_default": true}),
        )
        .await;
    assert_eq!(second.status, StatusCode::CREATED);

    let list = app.get("/api/account/addresses", Some(&cookie)).await;
    let defaults: Vec<bool> = list.body.as_array().unwrap().iter().map(|a| a["is_default"].as_bool().unwrap()).collect();
    assert_eq!(defaults, [false, true]);

    let second_id = second.body["id"].as_str().unwrap();
    let remaining = app.call(Method::DELETE, &format!("/api/account/addresses/{second_id}"), Some(&cookie), None).await;
    assert_eq!(remaining.status, StatusCode::OK);
    assert_eq!(remaining.body.as_array().unwrap().len(), 1);
    assert_eq!(remaining.body[0]["is_default"], true);

    let missing = app.call(Method::DELETE, &format!("/api/account/addresses/{second_id}"), Some(&cookie), None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cart_pricing_and_shipping_fee() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let shirt = app.create_product(&admin, "Linen Shirt", 450, 5, &["M", "L"]).await;
    let shirt_id = shirt["id"].as_str().unwrap();
    let cookie = app.register("buyer@example.com").await;

    let no_size = app.post("/api/cart/items", Some(&cookie), json!({"product_id": shirt_id})).await;
    assert_eq!(no_size.status, StatusCode::BAD_REQUEST);
    assert_eq!(no_size.body["error"], "Please select a size");

    let cart = app.post("/api/cart/items", Some(&cookie), json!({"product_id": shirt_id, "size": "m"})).await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.body["items"][0]["size"], "M");
    assert_eq!(decimal(&cart.body["subtotal"]["amount"]), Decimal::new(450, 0));
    assert_eq!(decimal(&cart.body["shipping_fee"]["amount"]), Decimal::new(99, 0));
    assert_eq!(decimal(&cart.body["total"]["amount"]), Decimal::new(549, 0));
    assert_eq!(cart.body["checkout_ready"], true);

    // 3 x 450 = 1350 crosses the free-shipping threshold.
    let cart = app
        .call(Method::PUT, "/api/cart/items", Some(&cookie), Some(json!({"product_id": shirt_id, "size": "M", "quantity": 3})))
        .await;
    assert_eq!(cart.body["item_count"], 3);
    assert_eq!(decimal(&cart.body["shipping_fee"]["amount"]), Decimal::ZERO);
    assert_eq!(decimal(&cart.body["total"]["amount"]), Decimal::new(1350, 0));

    let too_many = app
        .call(Method::PUT, "/api/cart/items", Some(&cookie), Some(json!({"product_id": shirt_id, "size": "M", "quantity": 11})))
        .await;
    assert_eq!(too_many.status, StatusCode::BAD_REQUEST);

    let cart = app.call(Method::DELETE, &format!("/api/cart/items/{shirt_id}"), Some(&cookie), None).await;
    assert_eq!(cart.body["items"].as_array().unwrap().len(), 0);
    assert_eq!(decimal(&cart.body["shipping_fee"]["amount"]), Decimal::ZERO);
    assert_eq!(cart.body["checkout_ready"], false);
}

#[tokio::test]
async fn test_cart_sync_skips_unknown_products() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let tee = app.create_product(&admin, "Cotton Tee", 599, 5, &[]).await;
    let tee_id = tee["id"].as_str().unwrap();
    let cookie = app.register("sync@example.com").await;
    let ghost = uuid::Uuid::now_v7().to_string();

    let synced = app
        .post(
            "/api/cart/sync",
            Some(&cookie),
            json!({"items": [
                {"product_id": tee_id, "size": null, "quantity": 2},
                {"product_id": ghost, "size": null, "quantity": 1},
            ]}),
        )
        .await;
    assert_eq!(synced.status, StatusCode::OK);
    assert_eq!(synced.body["added"], 1);
    assert_eq!(synced.body["skipped"], json!([ghost]));
    assert_eq!(synced.body["cart"]["item_count"], 2);
}

#[tokio::test]
async fn test_wishlist() {
    let app = TestApp::new();
    let admin = app.admin().await;
    let tee = app.create_product(&admin, "Cotton Tee", 599, 5, &[]).await;
    let scarf = app.create_product(&admin, "Scarf", 399, 5, &[]).await;
    let tee_id = tee["id"].as_str().unwrap();
    let scarf_id = scarf["id"].as_str().unwrap();
    let cookie = app.register("wish@example.com").await;

    let list = app.post(&format!("/api/wishlist/{tee_id}"), Some(&cookie), json!({})).await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.body.as_array().unwrap().len(), 1);

    let draft = app.post("/api/admin/products", Some(&admin), json!({"name": "Unreleased Hoodie", "price": 1499})).await;
    let draft_id = draft.body["id"].as_str().unwrap();

    let list = app
        .post("/api/wishlist/sync", Some(&cookie), json!({"product_ids": [tee_id, scarf_id, draft_id]}))
        .await;
    let names: Vec<&str> = list.body.as_array().unwrap().iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Cotton Tee", "Scarf"]);

    let list = app.call(Method::DELETE, &format!("/api/wishlist/{tee_id}"), Some(&cookie), None).await;
    assert_eq!(list.body[0]["name"], "Scarf");

    app.call(Method::DELETE, &format!("/api/admin/products/{scarf_id}"), Some(&admin), None).await;
    let list = app.get("/api/wishlist", Some(&cookie)).await;
    assert_eq!(list.body, json!([]));
}

#[tokio::test]
async fn test_announcements_and_banners() {
    let app = TestApp::new();
    let admin = app.admin().await;
    app.post("/api/admin/announcements", Some(&admin), json!({"message": "Free shipping over 999", "position": 2})).await;
    app.post("/api/admin/announcements", Some(&admin), json!({"message": "Monsoon sale", "position": 1})).await;
    app.post("/api/admin/announcements", Some(&admin), json!({"message": "Hidden", "active": false})).await;

    let public = app.get("/api/announcements", None).await;
    let messages: Vec<&str> = public.body.as_array().unwrap().iter().map(|a| a["message"].as_str().unwrap()).collect();
    assert_eq!(messages, ["Monsoon sale", "Free shipping over 999"]);

    let banner = app
        .post(
            "/api/admin/banners",
            Some(&admin),
            json!({"kind": "carousel", "image_url": "https://img.example/hero.jpg", "public_id": "storefront/hero"}),
        )
        .await;
    assert_eq!(banner.status, StatusCode::CREATED);
    app.post("/api/admin/banners", Some(&admin), json!({"kind": "promo", "image_url": "https://img.example/promo.jpg"})).await;

    let carousel = app.get("/api/banners?kind=carousel", None).await;
    assert_eq!(carousel.body.as_array().unwrap().len(), 1);

    let banner_id = banner.body["id"].as_str().unwrap();
    let deleted = app.call(Method::DELETE, &format!("/api/admin/banners/{banner_id}"), Some(&admin), None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(*app.images.destroyed.lock().await, ["storefront/hero"]);
}

#[tokio::test]
async fn test_currency_conversion() {
    let app = TestApp::new();
    let converted = app.get("/api/currency/convert?amount=1000&to=usd", None).await;
    assert_eq!(converted.status, StatusCode::OK);
    assert_eq!(converted.body["from"], "INR");
    assert_eq!(converted.body["to"], "USD");
    assert_eq!(decimal(&converted.body["converted"]), Decimal::new(12, 0));

    let unsupported = app.get("/api/currency/convert?amount=10&to=XYZ", None).await;
    assert_eq!(unsupported.status, StatusCode::BAD_REQUEST);
    assert_eq!(unsupported.body["error"], "Unsupported currency: XYZ");

    let negative = app.get("/api/currency/convert?amount=-5&to=USD", None).await;
    assert_eq!(negative.status, StatusCode::BAD_REQUEST);
    assert_eq!(negative.body["error"], "Amount cannot be negative");

    let traversal = app.get("/api/currency/convert?amount=5&from=..%2Fv6&to=USD", None).await;
    assert_eq!(traversal.status, StatusCode::BAD_REQUEST);
    assert_eq!(traversal.body["error"], "Invalid currency code: ../v6");
}
