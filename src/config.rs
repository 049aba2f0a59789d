use std::time::Duration;

use anyhow::{ anyhow, Context, Result };
use clap::ValueEnum;
use reqwest::Url;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:5000";

/// What the risk badge shows when the backend omits `combined_risk`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MissingRisk {
    /// Render an empty badge label
    Blank,
    /// Render "Unknown"
    #[default]
    Unknown,
    /// Render "Low"
    Low,
}

impl MissingRisk {
    pub fn label(self) -> &'static str {
        match self {
            MissingRisk::Blank => "",
            MissingRisk::Unknown => "Unknown",
            MissingRisk::Low => "Low",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DashboardConfig {
    pub api_base: Url,
    pub timeout: Option<Duration>,
    pub missing_risk: MissingRisk,
}

impl DashboardConfig {
    pub fn new(api_base: &str, timeout_secs: Option<u64>, missing_risk: MissingRisk) -> Result<Self> {
        let trimmed = api_base.trim().trim_end_matches('/');
        let api_base = Url::parse(trimmed).context(format!("invalid API origin {}", api_base))?;
        if api_base.scheme() != "http" && api_base.scheme() != "https" {
            return Err(anyhow!("API origin must use http or https, got {}", api_base.scheme()));
        }
        if api_base.cannot_be_a_base() || api_base.host_str().is_none() {
            return Err(anyhow!("API origin {} has no host", api_base));
        }
        let timeout = match timeout_secs {
            Some(0) => {
                return Err(anyhow!("timeout must be at least one second"));
            }
            other => other.map(Duration::from_secs),
        };
        debug!(api_base = %api_base, ?timeout, ?missing_risk, "dashboard configured");
        Ok(DashboardConfig { api_base, timeout, missing_risk })
    }

    /// Joins `path` onto the API origin, keeping any path prefix the origin carries.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.api_base.as_str().trim_end_matches('/');
        format!("{}/{}", base, path.trim_start_matches('/'))
    }
}
