//! Static files and directory trees, with single byte-range support.
//!
//! Both mounts are ordinary routes built on [`serve_file`]. A path that does not
//! resolve (missing file, a directory with no default file, or a path escaping
//! the root) yields [`Flow::Continue`], so a later route or the default 404 takes
//! over and the client never learns why.

mod mime;
mod range;

pub use mime::content_type_for;
pub use range::RangeSpec;

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, File};
use tokio::io::AsyncSeekExt;
use tracing::{debug, warn};

use crate::http::{Request, Response, StatusCode};
use crate::router::{Flow, HandlerResult, Pattern, PatternError, Route};

/// A directory tree served below a URL prefix.
///
/// # Examples
///
/// ```rust
/// use waypoint::router::Router;
/// use waypoint::static_content::StaticDirectory;
///
/// # fn main() -> Result<(), waypoint::router::PatternError> {
/// let mut router = Router::new();
/// router.static_directory("/assets", StaticDirectory::new("./public").default_file("index.html"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StaticDirectory {
    root: PathBuf,
    default_file: Option<String>,
}

impl StaticDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            default_file: None,
        }
    }

    /// File served when a request resolves to a directory.
    #[must_use]
    pub fn default_file(mut self, name: impl Into<String>) -> Self {
        self.default_file = Some(name.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A `GET` route matching `url` and everything below it.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the mount pattern fails to compile.
    pub fn route(self, url: &str) -> Result<Route, PatternError> {
        let prefix = regex::escape(url.trim_end_matches('/'));
        let pattern = Pattern::regex(Some("GET"), Some(&format!("{prefix}(/.*)?")))?;
        let directory = Arc::new(self);

        Ok(Route::new(pattern, move |captures, request, response| {
            let directory = Arc::clone(&directory);
            Box::pin(async move {
                let remainder = captures.get(0).unwrap_or_default();
                directory.serve(remainder, request, response).await
            })
        }))
    }

    /// Maps a URL remainder onto a file inside the root.
    ///
    /// Both the root and the candidate are canonicalized, so symlinks and `..`
    /// segments are resolved before the containment check. Returns `None` for
    /// anything that is missing or outside the root.
    pub async fn resolve(&self, remainder: &str) -> Option<PathBuf> {
        let root = match fs::canonicalize(&self.root).await {
            Ok(root) => root,
            Err(error) => {
                warn!(root = %self.root.display(), %error, "static root unavailable");
                return None;
            }
        };

        let relative = remainder.trim_start_matches(['/', '\\']);
        let mut candidate = contained(&root, root.join(relative)).await?;

        if fs::metadata(&candidate).await.ok()?.is_dir() {
            let default_file = self.default_file.as_deref()?;
            candidate = contained(&root, candidate.join(default_file)).await?;
        }

        debug!(remainder, "static path resolved");
        Some(candidate)
    }

    /// Resolves `remainder` and serves it, or continues if it does not resolve.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors other than a missing file, such as permission
    /// denied (403) or a broken connection.
    pub async fn serve(&self, remainder: &str, request: &mut Request, response: &mut Response) -> HandlerResult {
        match self.resolve(remainder).await {
            Some(path) => serve_file(&path, request, response).await,
            None => Ok(Flow::Continue),
        }
    }
}

async fn contained(root: &Path, path: PathBuf) -> Option<PathBuf> {
    let canonical = fs::canonicalize(&path).await.ok()?;
    if canonical.starts_with(root) {
        Some(canonical)
    } else {
        debug!("static path rejected: outside the root");
        None
    }
}

/// A single file served at an exact URL.
#[derive(Debug, Clone)]
pub struct StaticFile {
    path: PathBuf,
}

impl StaticFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An exact `GET` route for `url`.
    pub fn route(self, url: &str) -> Route {
        let file = Arc::new(self);
        Route::exchange(Pattern::exact(Some("GET"), Some(url)), move |request, response| {
            let file = Arc::clone(&file);
            Box::pin(async move { serve_file(&file.path, request, response).await })
        })
    }
}

/// Streams the file at `path`, honouring a single `Range` request header.
///
/// Stages `Content-Type` (from the extension), `Content-Length` (unless an
/// earlier route made the response chunked), and `Accept-Ranges`; a strict
/// sub-range also gets `206` and `Content-Range`. The body is copied through a
/// bounded buffer.
///
/// # Errors
///
/// A missing path (or a directory) is not an error: it returns
/// [`Flow::Continue`]. Other I/O failures propagate.
pub async fn serve_file(path: &Path, request: &mut Request, response: &mut Response) -> HandlerResult {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Flow::Continue),
        Err(error) => return Err(error.into()),
    };

    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Ok(Flow::Continue);
    }

    let total = metadata.len();
    let range = RangeSpec::parse(request.header("range"), total);
    if range.offset > 0 {
        file.seek(SeekFrom::Start(range.offset)).await?;
    }

    response
        .set_content_type(content_type_for(path))
        .set_header("Accept-Ranges", "bytes");
    // A chunked body is framed by its chunks.
    if !response.head().is_some_and(|head| head.chunked) {
        response.set_header("Content-Length", range.length.to_string());
    }
    if range.is_partial(total) {
        response
            .set_status(StatusCode::PartialContent)
            .set_header("Content-Range", range.content_range(total));
    }

    let copied = response
        .body_stream()
        .await?
        .copy_from(&mut file, range.length)
        .await?;
    if copied < range.length {
        warn!(
            request_id = request.id(),
            expected = range.length,
            copied,
            "file shrank while it was being served"
        );
    }

    Ok(Flow::Stop)
}

#[cfg(test)]
mod tests {
    use std::fs as stdfs;

    use tempfile::TempDir;

    use super::*;
    use crate::http::{MemorySink, Recording};
    use crate::router::Router;

    const BODY: &[u8] = b"0123456789abcdefghij";

    fn site() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        stdfs::write(dir.path().join("data.bin"), BODY).unwrap();
        stdfs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        stdfs::create_dir(dir.path().join("docs")).unwrap();
        stdfs::write(dir.path().join("docs").join("index.html"), "<h1>docs</h1>").unwrap();
        stdfs::write(dir.path().join("docs").join("My Notes.txt"), "notes").unwrap();
        dir
    }

    async fn get(router: &Router, target: &str, range: Option<&str>) -> Recording {
        let mut builder = Request::builder().uri(target);
        if let Some(range) = range {
            builder = builder.header("Range", range);
        }
        let (parts, body) = builder.into_parts();
        let sink = MemorySink::new();
        router.serve(parts, body, sink.clone()).await;
        sink.recording()
    }

    fn mounted(dir: &TempDir) -> Router {
        let mut router = Router::new();
        router
            .static_directory("/static/", StaticDirectory::new(dir.path()).default_file("index.html"))
            .unwrap();
        router
    }

    #[tokio::test]
    async fn serves_whole_file_without_range() {
        let dir = site();
        let rec = get(&mounted(&dir), "/static/data.bin", None).await;
        assert_eq!(rec.status_code(), Some(200));
        assert_eq!(rec.body, BODY);
        assert_eq!(rec.header("content-length"), Some("20"));
        assert_eq!(rec.header("accept-ranges"), Some("bytes"));
        assert_eq!(rec.header("content-range"), None);
        assert_eq!(rec.header("content-type"), Some("application/octet-stream"));
    }

    #[tokio::test]
    async fn open_ended_range_returns_the_tail() {
        let dir = site();
        let rec = get(&mounted(&dir), "/static/data.bin", Some("bytes=5-")).await;
        assert_eq!(rec.status_code(), Some(206));
        assert_eq!(rec.body, &BODY[5..]);
        assert_eq!(rec.header("content-range"), Some("bytes 5-19/20"));
        assert_eq!(rec.header("content-length"), Some("15"));
    }

    #[tokio::test]
    async fn first_byte_range_returns_one_byte() {
        let dir = site();
        let rec = get(&mounted(&dir), "/static/data.bin", Some("bytes=0-0")).await;
        assert_eq!(rec.status_code(), Some(206));
        assert_eq!(rec.body, b"0");
        assert_eq!(rec.header("content-range"), Some("bytes 0-0/20"));
    }

    #[tokio::test]
    async fn suffix_range_returns_the_last_bytes() {
        let dir = site();
        let rec = get(&mounted(&dir), "/static/data.bin", Some("bytes=-3")).await;
        assert_eq!(rec.status_code(), Some(206));
        assert_eq!(rec.body, b"hij");
    }

    #[tokio::test]
    async fn directory_request_uses_the_default_file() {
        let dir = site();
        let router = mounted(&dir);

        let rec = get(&router, "/static", None).await;
        assert_eq!(rec.body_text(), "<h1>home</h1>");
        assert_eq!(rec.header("content-type"), Some("text/html; charset=utf-8"));

        let rec = get(&router, "/static/docs/", None).await;
        assert_eq!(rec.body_text(), "<h1>docs</h1>");
    }

    #[tokio::test]
    async fn directory_without_default_file_is_not_found() {
        let dir = site();
        let mut router = Router::new();
        router
            .static_directory("/static", StaticDirectory::new(dir.path()))
            .unwrap();
        assert_eq!(get(&router, "/static/docs", None).await.status_code(), Some(404));
    }

    #[tokio::test]
    async fn encoded_names_are_decoded() {
        let dir = site();
        let rec = get(&mounted(&dir), "/static/docs/My%20Notes.txt", None).await;
        assert_eq!(rec.body_text(), "notes");
    }

    #[tokio::test]
    async fn missing_file_falls_through_to_404() {
        let dir = site();
        let rec = get(&mounted(&dir), "/static/nope.txt", None).await;
        assert_eq!(rec.status_code(), Some(404));
        assert_eq!(rec.body_text(), "Not found.");
    }

    #[tokio::test]
    async fn traversal_never_leaves_the_root() {
        let outer = tempfile::tempdir().unwrap();
        stdfs::write(outer.path().join("secret.txt"), "secret").unwrap();
        let root = outer.path().join("www");
        stdfs::create_dir(&root).unwrap();
        stdfs::write(root.join("ok.txt"), "ok").unwrap();

        let directory = StaticDirectory::new(&root);
        assert!(directory.resolve("/../secret.txt").await.is_none());
        assert!(directory.resolve("/../../../../etc/passwd").await.is_none());
        assert!(directory.resolve("/ok.txt").await.is_some());

        let mut router = Router::new();
        router.static_directory("/files", directory).unwrap();
        for target in ["/files/../secret.txt", "/files/%2e%2e/secret.txt", "/files/..%2Fsecret.txt"] {
            let rec = get(&router, target, None).await;
            assert_eq!(rec.status_code(), Some(404), "{target}");
            assert!(!rec.body_text().contains("secret"));
        }
    }

    #[tokio::test]
    async fn later_routes_run_when_the_file_is_missing() {
        let dir = site();
        let mut router = mounted(&dir);
        router.route_fn(Some("GET"), "/static/.*", |_req, res| {
            Box::pin(async move {
                res.write_body_text("fallback").await?;
                Ok(Flow::Stop)
            })
        })
        .unwrap();
        assert_eq!(get(&router, "/static/gone.css", None).await.body_text(), "fallback");
    }

    #[tokio::test]
    async fn chunked_response_gets_no_content_length() {
        let dir = site();
        let mut router = Router::new();
        router
            .route_fn(None, ".*", |_req, res| {
                res.set_chunked(true);
                Box::pin(async { Ok(Flow::Continue) })
            })
            .unwrap()
            .static_directory("/static", StaticDirectory::new(dir.path()))
            .unwrap();

        let rec = get(&router, "/static/data.bin", Some("bytes=2-4")).await;
        let head = rec.head().unwrap();
        assert!(head.is_chunked());
        assert_eq!(rec.header("content-length"), None);
        assert_eq!(rec.header("content-range"), Some("bytes 2-4/20"));
        assert_eq!(rec.body, b"234");
    }

    #[tokio::test]
    async fn prefix_is_matched_literally() {
        let dir = site();
        let mut router = Router::new();
        router
            .static_directory("/a.b", StaticDirectory::new(dir.path()))
            .unwrap();
        assert_eq!(get(&router, "/axb/data.bin", None).await.status_code(), Some(404));
        assert_eq!(get(&router, "/a.b/data.bin", None).await.status_code(), Some(200));
    }

    #[tokio::test]
    async fn static_file_route() {
        let dir = site();
        let mut router = Router::new();
        router.static_file("/favicon.ico", dir.path().join("data.bin"));

        let rec = get(&router, "/favicon.ico", Some("bytes=10-12")).await;
        assert_eq!(rec.status_code(), Some(206));
        assert_eq!(rec.body, b"abc");
        assert_eq!(get(&router, "/favicon.ico/x", None).await.status_code(), Some(404));
    }

    #[tokio::test]
    async fn empty_file_is_served_whole() {
        let dir = site();
        stdfs::write(dir.path().join("empty.txt"), "").unwrap();
        let rec = get(&mounted(&dir), "/static/empty.txt", Some("bytes=0-0")).await;
        assert_eq!(rec.status_code(), Some(200));
        assert!(rec.body.is_empty());
        assert_eq!(rec.header("content-length"), Some("0"));
    }

    #[tokio::test]
    async fn missing_root_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let directory = StaticDirectory::new(dir.path().join("absent"));
        assert!(directory.resolve("/anything").await.is_none());
    }
}
