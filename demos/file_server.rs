//! Static file server with a small JSON API.
//!
//! ```text
//! cargo run --example file_server -- [ADDR] [ROOT]
//! RUST_LOG=waypoint=debug cargo run --example file_server -- 127.0.0.1:8080 ./public
//! ```

use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use waypoint::http::{Cookie, StatusCode};
use waypoint::router::{Flow, Router};
use waypoint::server::Server;
use waypoint::static_content::StaticDirectory;

#[derive(Debug, Deserialize)]
struct NewNote {
    title: String,
}

#[derive(Debug, Serialize)]
struct Note {
    id: u64,
    title: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let mut args = env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:8080".to_owned());
    let root = args.next().unwrap_or_else(|| ".".to_owned());

    let next_note = Arc::new(AtomicU64::new(1));
    let mut router = Router::new();
    router.allow_cors(&["/api/.*"])?;

    router.get(r"/api/hello/([^/]+)", |caps, req, res| {
        Box::pin(async move {
            let greeting = req.query_param("greeting").unwrap_or("Hello");
            let remembered = urlencoding::encode(&caps[0]).into_owned();
            res.set_cookie(Cookie::new("last_name", remembered).path("/api").max_age(3600));
            res.write_body_json(&serde_json::json!({
                "message": format!("{greeting}, {}!", &caps[0]),
                "request": req.id(),
            }))
            .await?;
            Ok(Flow::Stop)
        })
    })?;

    router.post("/api/notes", move |_caps, req, res| {
        let next_note = Arc::clone(&next_note);
        Box::pin(async move {
            let new: NewNote = req.read_body_json().await?;
            let note = Note {
                id: next_note.fetch_add(1, Ordering::Relaxed),
                title: new.title,
            };
            res.set_status(StatusCode::Created)
                .set_header("Location", format!("/api/notes/{}", note.id));
            res.write_body_json(&note).await?;
            Ok(Flow::Stop)
        })
    })?;

    router.exact_route(Some("GET"), "/old-home", |_req, res| {
        Box::pin(async move {
            res.redirect("/");
            Ok(Flow::Stop)
        })
    });

    router.static_directory("/", StaticDirectory::new(root).default_file("index.html"))?;

    Server::bind(&addr).await?.run(router).await?;
    Ok(())
}
