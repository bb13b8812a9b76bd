//! In-memory transports shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::version::errors::{VersionError, VersionResult};
use crate::version::source_trait::{MetadataTransport, TransportResponse};

pub fn release_json(tag: &str, commitish: &str, prerelease: bool) -> String {
    serde_json::json!({
        "tag_name": tag,
        "target_commitish": commitish,
        "name": format!("Build {}", tag),
        "draft": false,
        "prerelease": prerelease,
        "published_at": "2025-03-01T12:00:00Z",
        "html_url": format!("https://github.com/Winds-Studio/Nycticorax/releases/tag/{}", tag),
        "assets": [
            {
                "name": "nycticorax-paperclip.jar",
                "browser_download_url": format!(
                    "https://github.com/Winds-Studio/Nycticorax/releases/download/{}/nycticorax-paperclip.jar",
                    tag
                )
            }
        ]
    })
    .to_string()
}

/// Replays scripted answers in order; the last one repeats once the script runs out
pub struct ScriptedTransport {
    script: Mutex<VecDeque<VersionResult<TransportResponse>>>,
    last: Mutex<Option<VersionResult<TransportResponse>>>,
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<VersionResult<TransportResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        })
    }

    pub fn status(status: u16, body: &str) -> VersionResult<TransportResponse> {
        Ok(TransportResponse::new(status, body))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataTransport for ScriptedTransport {
    async fn get(&self, url: &str) -> VersionResult<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(answer) => {
                *last = Some(answer.clone());
                answer
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(VersionError::UpstreamUnavailable("script is empty".to_string()))),
        }
    }
}

/// Counts connections that were released
pub struct ConnectionGuard {
    closed: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Opens a "connection" per request and never answers
#[derive(Default)]
pub struct HangingTransport {
    pub opened: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
}

#[async_trait]
impl MetadataTransport for HangingTransport {
    async fn get(&self, _url: &str) -> VersionResult<TransportResponse> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let _connection = ConnectionGuard {
            closed: self.closed.clone(),
        };
        futures::future::pending::<()>().await;
        unreachable!("pending future never resolves")
    }
}
