//! End-to-end dispatch scenarios through `Router::serve` and an in-memory sink.

use std::fs;
use std::sync::{Arc, Mutex};

use waypoint::http::{Cookie, MemorySink, Recording, Request, RequestBuilder};
use waypoint::router::{Flow, Router};
use waypoint::static_content::StaticDirectory;
use waypoint::{Error, StatusCode};

async fn serve(router: &Router, request: RequestBuilder) -> Recording {
    let (parts, body) = request.into_parts();
    let sink = MemorySink::new();
    router.serve(parts, body, sink.clone()).await;
    sink.recording()
}

#[tokio::test]
async fn numeric_user_route_matches_only_digits() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let mut router = Router::new();
    router
        .route(Some("GET"), r"/users/(\d+)", move |caps, _req, res| {
            log.lock().unwrap().push(caps.clone().into_vec());
            Box::pin(async move {
                res.write_body_text(&caps[0]).await?;
                Ok(Flow::Stop)
            })
        })
        .unwrap();

    let rec = serve(&router, Request::builder().uri("/users/42")).await;
    assert_eq!(rec.status_code(), Some(200));
    assert_eq!(rec.body_text(), "42");

    let rec = serve(&router, Request::builder().uri("/users/abc")).await;
    assert_eq!(rec.status_code(), Some(404));

    assert_eq!(*seen.lock().unwrap(), vec![vec!["42".to_owned()]]);
}

#[tokio::test]
async fn middleware_routes_continue_and_terminal_routes_stop() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new();

    let log = Arc::clone(&calls);
    router
        .route_fn(None, "/admin/.*", move |req, _res| {
            log.lock().unwrap().push("auth");
            let authorized = req.header("authorization") == Some("Bearer letmein");
            Box::pin(async move {
                if authorized {
                    Ok(Flow::Continue)
                } else {
                    Err(Error::Forbidden("missing token".into()))
                }
            })
        })
        .unwrap();
    let log = Arc::clone(&calls);
    router
        .route_fn(Some("GET"), "/admin/stats", move |_req, res| {
            log.lock().unwrap().push("stats");
            Box::pin(async move {
                res.write_body_json(&serde_json::json!({ "users": 3 })).await?;
                Ok(Flow::Stop)
            })
        })
        .unwrap();
    let log = Arc::clone(&calls);
    router
        .route_fn(None, ".*", move |_req, _res| {
            log.lock().unwrap().push("unreachable");
            Box::pin(async move { Ok(Flow::Stop) })
        })
        .unwrap();

    let rec = serve(
        &router,
        Request::builder()
            .uri("/admin/stats")
            .header("Authorization", "Bearer letmein"),
    )
    .await;
    assert_eq!(rec.status_code(), Some(200));
    assert_eq!(rec.body_text(), r#"{"users":3}"#);

    let rec = serve(&router, Request::builder().uri("/admin/stats")).await;
    assert_eq!(rec.status_code(), Some(403));
    assert_eq!(rec.body_text(), "Forbidden.");

    assert_eq!(*calls.lock().unwrap(), vec!["auth", "stats", "auth"]);
}

#[tokio::test]
async fn commit_reaches_the_sink_exactly_once() {
    let mut router = Router::new();
    router.exact_route(None, "/twice", |_req, res| {
        Box::pin(async move {
            res.set_header("X-Once", "1");
            res.commit().await?;
            res.commit().await?;
            res.write_body_text("body").await?;
            res.close().await?;
            res.close().await?;
            Ok(Flow::Stop)
        })
    });

    let rec = serve(&router, Request::builder().uri("/twice")).await;
    assert_eq!(rec.heads.len(), 1);
    assert_eq!(rec.finished, 1);
    assert_eq!(rec.header("x-once"), Some("1"));
}

#[tokio::test]
async fn range_requests_against_a_static_directory() {
    let dir = tempfile::tempdir().unwrap();
    let content: Vec<u8> = (0..100_u8).collect();
    fs::write(dir.path().join("blob.bin"), &content).unwrap();

    let mut router = Router::new();
    router
        .static_directory("/files", StaticDirectory::new(dir.path()))
        .unwrap();

    let rec = serve(&router, Request::builder().uri("/files/blob.bin").header("Range", "bytes=5-")).await;
    assert_eq!(rec.status_code(), Some(206));
    assert_eq!(rec.header("content-range"), Some("bytes 5-99/100"));
    assert_eq!(rec.body, &content[5..]);

    let rec = serve(&router, Request::builder().uri("/files/blob.bin").header("Range", "bytes=0-0")).await;
    assert_eq!(rec.status_code(), Some(206));
    assert_eq!(rec.body, &content[..1]);

    let rec = serve(&router, Request::builder().uri("/files/blob.bin")).await;
    assert_eq!(rec.status_code(), Some(200));
    assert_eq!(rec.body, content);
}

#[tokio::test]
async fn traversal_behaves_like_a_missing_file() {
    let outer = tempfile::tempdir().unwrap();
    let root = outer.path().join("www");
    fs::create_dir(&root).unwrap();
    fs::write(outer.path().join("passwd"), "root:x:0:0").unwrap();

    let mut router = Router::new();
    router.static_directory("/", StaticDirectory::new(&root)).unwrap();

    for target in ["/../passwd", "/../../etc/passwd", "/%2E%2E/passwd"] {
        let rec = serve(&router, Request::builder().uri(target)).await;
        assert_eq!(rec.status_code(), Some(404), "{target}");
        assert!(!rec.body_text().contains("root:"), "{target}");
    }
}

#[tokio::test]
async fn cors_preflight_overrides_handler_status() {
    let mut router = Router::new();
    router
        .route_fn(None, "/api/x", |_req, res| {
            Box::pin(async move {
                res.set_status(StatusCode::Accepted);
                Ok(Flow::Stop)
            })
        })
        .unwrap();
    router.allow_cors(&["/api/.*"]).unwrap();

    let rec = serve(
        &router,
        Request::builder()
            .method("OPTIONS")
            .uri("/api/x")
            .header("Access-Control-Request-Method", "PUT"),
    )
    .await;
    assert_eq!(rec.header("access-control-allow-methods"), Some("PUT"));
    assert_eq!(rec.header("access-control-allow-origin"), Some("*"));
    assert_eq!(rec.status_code(), Some(204));
}

#[tokio::test]
async fn custom_data_flows_down_the_chain() {
    struct User(&'static str);

    let mut router = Router::new();
    router
        .route_fn(None, ".*", |req, _res| {
            req.set_custom_data(User("ada"));
            Box::pin(async move { Ok(Flow::Continue) })
        })
        .unwrap()
        .route_fn(Some("GET"), "/me", |req, res| {
            Box::pin(async move {
                let name = req.custom_data::<User>().map_or("anonymous", |user| user.0);
                res.write_body_text(name).await?;
                Ok(Flow::Stop)
            })
        })
        .unwrap();

    assert_eq!(serve(&router, Request::builder().uri("/me")).await.body_text(), "ada");
}

#[tokio::test]
async fn captured_text_cannot_add_cookie_attributes() {
    let mut router = Router::new();
    router
        .get("/hello/([^/]+)", |caps, _req, res| {
            Box::pin(async move {
                res.set_cookie(Cookie::new("raw", &caps[0]).path("/api"))
                    .set_cookie(Cookie::new("encoded", urlencoding::encode(&caps[0])).path("/api"));
                Ok(Flow::Stop)
            })
        })
        .unwrap();

    let rec = serve(&router, Request::builder().uri("/hello/x%3B%20Domain%3Devil.example")).await;
    let lines: Vec<String> = rec
        .head()
        .unwrap()
        .cookies()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(lines, vec!["encoded=x%3B%20Domain%3Devil.example; Path=/api"]);
}

#[tokio::test]
async fn error_route_that_closes_skips_the_default_handler() {
    let mut router = Router::new();
    router
        .route_fn(None, "/boom", |_req, _res| {
            Box::pin(async move { Err(Error::BadRequest("boom".into())) })
        })
        .unwrap();
    router.error_route(|_err, _req, res| {
        Box::pin(async move {
            res.set_status(StatusCode::from_u16(422).unwrap());
            res.write_body_text("handled").await?;
            res.close().await?;
            Ok(Flow::Continue)
        })
    });

    let rec = serve(&router, Request::builder().uri("/boom")).await;
    assert_eq!(rec.status_code(), Some(422));
    assert_eq!(rec.body_text(), "handled");
    assert_eq!(rec.finished, 1);
}
