use std::sync::{ atomic::{ AtomicUsize, Ordering }, Arc };

use anyhow::{ anyhow, Result };
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use crate::{ intel::{ CheckResponse, ThreatIntelApi }, news::NewsItem };

pub enum Reply {
    Respond(u16, Value),
    Unreachable,
}

/// In-process backend for controller and CLI tests.
pub struct StubApi {
    pub reply: Reply,
    pub news: Option<Vec<NewsItem>>,
    pub bulk: Option<CheckResponse>,
    pub calls: AtomicUsize,
    pub news_calls: AtomicUsize,
    pub seen: Mutex<Vec<String>>,
    // when set, check() waits for a notification before answering
    pub gate: Option<Arc<Notify>>,
}

impl StubApi {
    pub fn new(reply: Reply) -> Self {
        StubApi {
            reply,
            news: None,
            bulk: None,
            calls: AtomicUsize::new(0),
            news_calls: AtomicUsize::new(0),
            seen: Mutex::new(vec![]),
            gate: None,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn news_calls(&self) -> usize {
        self.news_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThreatIntelApi for StubApi {
    async fn check(&self, ioc: &str) -> Result<CheckResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(ioc.to_string());
        if let Some(g) = &self.gate {
            g.notified().await;
        }
        match &self.reply {
            Reply::Respond(status, body) => Ok(CheckResponse { status: *status, body: body.clone() }),
            Reply::Unreachable => Err(anyhow!("error trying to connect: Connection refused")),
        }
    }

    async fn news(&self) -> Result<Vec<NewsItem>> {
        self.news_calls.fetch_add(1, Ordering::SeqCst);
        self.news.clone().ok_or_else(|| anyhow!("connection reset"))
    }

    async fn bulk_check(&self, _file_name: &str, _contents: Vec<u8>) -> Result<CheckResponse> {
        self.bulk.clone().ok_or_else(|| anyhow!("connection reset"))
    }
}
