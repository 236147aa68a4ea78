//! Request-level behavior that is decided before any query runs, so these tests
//! need no database.

#[macro_use]
mod common;

use actix_web::{http::StatusCode, test, web, App, HttpServer};
use pretty_assertions::assert_eq;
use serde_json::json;
use taskify::auth::generate_token;

#[test_log::test(actix_rt::test)]
async fn test_health_is_public() {
    common::init();
    let app = test_app!(common::unreachable_pool(), common::config(None));

    let req = test::TestRequest::get().uri("/health").to_request();
    let (status, body) = common::send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[test_log::test(actix_rt::test)]
async fn test_protected_routes_require_a_token() {
    common::init();
    let pool = common::unreachable_pool();
    let config = common::config(None);

    // Middleware rejections surface as service errors, so go through a real server.
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config.clone()))
            .service(
                web::scope("/api")
                    .wrap(taskify::auth::AuthMiddleware)
                    .configure(taskify::routes::config),
            )
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .expect("bind test server");
    let addr = server.addrs()[0];
    let server = server.run();
    let handle = server.handle();
    actix_rt::spawn(server);

    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let resp = client
        .post(format!("{}/api/tasks", base))
        .json(&json!({ "title": "Unauthorized Task" }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json().await.expect("json body");
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Missing token");

    let resp = client
        .get(format!("{}/api/stats/overview", base))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

    handle.stop(true).await;
}

#[test_log::test(actix_rt::test)]
async fn test_admin_routes_reject_regular_users() {
    common::init();
    let app = test_app!(common::unreachable_pool(), common::config(None));
    let token = generate_token(42, false).unwrap();

    for uri in [
        "/api/admin/dashboard",
        "/api/admin/users",
        "/api/admin/stats/most-active?limit=3",
    ] {
        let req = test::TestRequest::get()
            .uri(uri)
            .insert_header(common::bearer(&token))
            .to_request();
        let (status, body) = common::send(&app, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        assert_eq!(body["message"], "Admin access required");
    }
}

#[test_log::test(actix_rt::test)]
async fn test_validation_failures_are_field_keyed() {
    common::init();
    let app = test_app!(common::unreachable_pool(), common::config(None));
    let token = generate_token(42, false).unwrap();

    let req = test::TestRequest::post()
        .uri("/api/tasks")
        .insert_header(common::bearer(&token))
        .set_json(json!({ "title": "" }))
        .to_request();
    let (status, body) = common::send(&app, req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert!(body["errors"]["title"].is_array());

    let req = test::TestRequest::post()
        .uri("/api/tags")
        .insert_header(common::bearer(&token))
        .set_json(json!({ "name": "home", "color": "blue" }))
        .to_request();
    let (status, body) = common::send(&app, req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"]["color"][0], "Color must look like #1a2b3c");

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "username": "bad name!",
            "email": "not-an-email",
            "password": "123"
        }))
        .to_request();
    let (status, body) = common::send(&app, req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    for field in ["username", "email", "password"] {
        assert!(body["errors"][field].is_array(), "missing error for {}", field);
    }
}

#[test_log::test(actix_rt::test)]
async fn test_unknown_period_is_unprocessable() {
    common::init();
    let app = test_app!(common::unreachable_pool(), common::config(None));
    let token = generate_token(42, false).unwrap();

    let req = test::TestRequest::get()
        .uri("/api/stats/tasks-by-date?period=fortnight")
        .insert_header(common::bearer(&token))
        .to_request();
    let (status, body) = common::send(&app, req).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["period"].is_array());
}

#[test_log::test(actix_rt::test)]
async fn test_malformed_input_is_a_bad_request() {
    common::init();
    let app = test_app!(common::unreachable_pool(), common::config(None));
    let token = generate_token(42, false).unwrap();

    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(common::bearer(&token))
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{\"title\": ")
        .to_request();
    let (status, body) = common::send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"]
        .as_str()
        .is_some_and(|m| m.starts_with("Invalid JSON body")));

    let req = test::TestRequest::get()
        .uri("/api/tasks/not-a-uuid")
        .insert_header(common::bearer(&token))
        .to_request();
    let (status, _) = common::send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri("/api/tasks?status=someday")
        .insert_header(common::bearer(&token))
        .to_request();
    let (status, _) = common::send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[test_log::test(actix_rt::test)]
async fn test_listing_another_users_rows_is_forbidden() {
    common::init();
    let app = test_app!(common::unreachable_pool(), common::config(None));
    let token = generate_token(42, false).unwrap();

    for uri in [
        "/api/tasks?user_id=7",
        "/api/todos?user_id=7",
        "/api/categories?user_id=7",
        "/api/tags?user_id=7",
    ] {
        let req = test::TestRequest::get()
            .uri(uri)
            .insert_header(common::bearer(&token))
            .to_request();
        let (status, _) = common::send(&app, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
    }
}
