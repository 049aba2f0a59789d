use anyhow::{ Context, Result };
use async_trait::async_trait;
use reqwest::{ multipart::{ Form, Part }, Client, Response };
use serde_json::Value;
use tracing::{ debug, trace };

use super::{ CheckRequest, CheckResponse, ThreatIntelApi };
use crate::{ config::DashboardConfig, news::NewsItem };

/// `ThreatIntelApi` over HTTP against the configured API origin.
pub struct HttpApi {
    client: Client,
    config: DashboardConfig,
}

impl HttpApi {
    pub fn new(config: DashboardConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(t) = config.timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().context("cannot build HTTP client")?;
        Ok(HttpApi { client, config })
    }
}

async fn read_response(resp: Response, what: &str) -> Result<CheckResponse> {
    let status = resp.status();
    let text = resp.text().await.context(format!("cannot read response to {}", what))?;
    trace!(status = status.as_u16(), body = %text, "{} response", what);
    let body = if status.is_success() {
        serde_json::from_str(&text).context(format!("malformed response to {}", what))?
    } else {
        // rejections are surfaced verbatim, even when the backend didn't send JSON
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    Ok(CheckResponse { status: status.as_u16(), body })
}

#[async_trait]
impl ThreatIntelApi for HttpApi {
    async fn check(&self, ioc: &str) -> Result<CheckResponse> {
        let url = self.config.endpoint("/check");
        debug!("posting check request to {}", url);
        let resp = self.client
            .post(url)
            .json(&(CheckRequest { ioc }))
            .send().await
            .context("cannot send check request")?;
        read_response(resp, "check request").await
    }

    async fn news(&self) -> Result<Vec<NewsItem>> {
        let url = self.config.endpoint("/news");
        debug!("fetching news from {}", url);
        let resp = self.client
            .get(url)
            .send().await
            .context("cannot get news")?
            .error_for_status()
            .context("news request rejected")?;
        let text = resp.text().await.context("cannot read news response")?;
        let items: Vec<NewsItem> = serde_json::from_str(&text).context("malformed news response")?;
        Ok(items)
    }

    async fn bulk_check(&self, file_name: &str, contents: Vec<u8>) -> Result<CheckResponse> {
        let url = self.config.endpoint("/bulk-check");
        debug!("posting bulk check to {}", url);
        let form = Form::new().part("file", Part::bytes(contents).file_name(file_name.to_string()));
        let resp = self.client
            .post(url)
            .multipart(form)
            .send().await
            .context("cannot send bulk check request")?;
        read_response(resp, "bulk check request").await
    }
}
