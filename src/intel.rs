use std::{ fmt, fs, path::Path };

use anyhow::{ anyhow, Context, Result };
use async_trait::async_trait;
use serde_derive::Serialize;
use serde_json::Value;
use tracing::{ debug, info };

use crate::news::NewsItem;
mod http;

pub use http::HttpApi;

#[derive(Serialize, Debug)]
pub struct CheckRequest<'a> {
    pub ioc: &'a str,
}

/// A response that made it back from the backend, whatever its status.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckResponse {
    pub status: u16,
    pub body: Value,
}

impl CheckResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Remote threat-intel backend. An `Err` always means the call itself failed
/// (unreachable, timed out, unreadable); backend-side rejections come back
/// as a `CheckResponse` with a non-success status.
#[async_trait]
pub trait ThreatIntelApi: Send + Sync {
    async fn check(&self, ioc: &str) -> Result<CheckResponse>;
    async fn news(&self) -> Result<Vec<NewsItem>>;
    async fn bulk_check(&self, file_name: &str, contents: Vec<u8>) -> Result<CheckResponse>;
}

impl fmt::Debug for dyn ThreatIntelApi {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "n/a")
    }
}

pub async fn bulk_check_file(api: &dyn ThreatIntelApi, path: &Path) -> Result<CheckResponse> {
    info!("reading {:?}", path);
    let contents = fs::read(path).context(format!("cannot read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow!("{} is not a file", path.display()))?;
    debug!(file_name = %file_name, size = contents.len(), "uploading file for bulk check");
    api.bulk_check(&file_name, contents).await
}
