//! Static demo site
//!
//! Serves a fixed set of files from an asset directory. Routing misses are
//! recorded in a line log on disk.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::warn;
use twinport_http::{
    Application, FileLog, HttpRequest, HttpResponse, Reply, CONTENT_TYPE_HTML,
    CONTENT_TYPE_JAVASCRIPT,
};

/// Request path, file name and content type of every served asset
const ROUTES: &[(&str, &str, &str)] = &[
    ("/", "index.html", CONTENT_TYPE_HTML),
    ("/three.js", "three.js", CONTENT_TYPE_JAVASCRIPT),
    ("/index.js", "index.js", CONTENT_TYPE_JAVASCRIPT),
    ("/OrbitControls.js", "OrbitControls.js", CONTENT_TYPE_JAVASCRIPT),
];

pub struct StaticSite {
    assets: PathBuf,
    log: FileLog,
}

impl StaticSite {
    pub fn new<A: Into<PathBuf>, L: Into<PathBuf>>(assets: A, log_file: L) -> Self {
        Self {
            assets: assets.into(),
            log: FileLog::new(log_file),
        }
    }

    fn not_found() -> HttpResponse {
        HttpResponse::not_found().content_type(CONTENT_TYPE_HTML)
    }
}

#[async_trait]
impl Application for StaticSite {
    async fn get(&self, request: &HttpRequest) -> Reply {
        if let Err(e) = self.log.discard_if_corrupt().await {
            warn!("Failed to check log file {}: {}", self.log.path().display(), e);
        }

        let Some((_, file, content_type)) = ROUTES.iter().find(|(path, _, _)| *path == request.path)
        else {
            self.log
                .record(&format!("404 encountered: {}", request.path))
                .await;
            return Self::not_found().into();
        };

        match tokio::fs::read(self.assets.join(file)).await {
            Ok(content) => HttpResponse::ok()
                .content_type(content_type)
                .bytes(content)
                .into(),
            Err(e) => {
                warn!("Failed to read asset {}: {}", file, e);
                self.log.record(&format!("missing asset: {}", file)).await;
                Self::not_found().into()
            }
        }
    }

    async fn post(&self, request: &HttpRequest) -> HttpResponse {
        let message = if request.path == "/" {
            format!("404 POST encountered: {}\n\t{}", request.path, request.body_text())
        } else {
            format!("404 POST encountered: {}", request.path)
        };
        self.log.record(&message).await;
        Self::not_found()
    }
}
