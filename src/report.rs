use std::collections::BTreeMap;

use serde::{ de::DeserializeOwned, Deserializer };
use serde_derive::{ Deserialize, Serialize };
use serde_json::Value;
use tracing::warn;

/// Aggregated answer of the backend for one indicator.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct CheckReport {
    #[serde(default)]
    pub combined_risk: Option<String>,
    #[serde(default, deserialize_with = "provider")]
    pub virustotal: Option<VirusTotalReport>,
    #[serde(default, deserialize_with = "provider")]
    pub abuseipdb: Option<AbuseIpDbReport>,
    #[serde(default, deserialize_with = "provider")]
    pub otx: Option<OtxReport>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct VirusTotalReport {
    #[serde(default)]
    pub malicious: Option<u64>,
    #[serde(default)]
    pub suspicious: Option<u64>,
    #[serde(default)]
    pub harmless: Option<u64>,
    #[serde(default)]
    pub undetected: Option<u64>,
    #[serde(default)]
    pub reputation: Option<i64>,
    /// engine name -> verdict
    #[serde(default)]
    pub vendors: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct AbuseIpDbReport {
    #[serde(default, alias = "totalReports")]
    pub reports: Option<u64>,
    #[serde(default, alias = "abuseConfidenceScore")]
    pub confidence: Option<f64>,
    #[serde(default, alias = "countryCode")]
    pub country: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default, alias = "usageType")]
    pub usage_type: Option<String>,
}

impl AbuseIpDbReport {
    /// Zero reports count as no data, same as a missing count.
    pub fn has_reports(&self) -> bool {
        matches!(self.reports, Some(n) if n > 0)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct OtxReport {
    #[serde(default)]
    pub pulse_count: Option<u64>,
    #[serde(default)]
    pub malware_families: Option<Vec<String>>,
    #[serde(default)]
    pub asn: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

// A provider block that isn't a JSON object (null, or an error string from the
// backend), or one whose fields don't decode, is treated as absent. The other
// providers still render.
fn provider<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where D: Deserializer<'de>, T: DeserializeOwned
{
    let v = <Option<Value> as serde::Deserialize>::deserialize(deserializer)?;
    match v {
        Some(obj @ Value::Object(_)) =>
            match serde_json::from_value(obj) {
                Ok(r) => Ok(Some(r)),
                Err(e) => {
                    warn!("ignoring malformed {} section: {}", section_name::<T>(), e);
                    Ok(None)
                }
            }
        _ => Ok(None),
    }
}

fn section_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

impl CheckReport {
    pub fn from_value(v: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(v)
    }
}
