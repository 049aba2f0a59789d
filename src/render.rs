use std::fmt;

use crate::{
    config::MissingRisk,
    dashboard::{ CheckFailure, CheckResult },
    report::{ AbuseIpDbReport, CheckReport, OtxReport, VirusTotalReport },
};

pub const NO_DATA: &str = "No Data";
const ERROR_BADGE: &str = "Error";

#[derive(Clone, Copy, Debug, Default)]
pub struct RenderOptions {
    pub missing_risk: MissingRisk,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub label: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Card {
    pub title: &'static str,
    pub rows: Vec<Row>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum View {
    Nothing,
    Report {
        badge: String,
        cards: Vec<Card>,
    },
    Error {
        badge: String,
        dump: String,
    },
}

fn row(label: &str, value: impl ToString) -> Row {
    Row { label: label.to_string(), value: value.to_string() }
}

fn push_opt<T: std::fmt::Display>(rows: &mut Vec<Row>, label: &str, value: &Option<T>) {
    if let Some(v) = value {
        rows.push(row(label, v));
    }
}

// 87.0 prints as "87%", 87.5 as "87.5%"
fn percent(v: f64) -> String {
    if v.fract() == 0.0 { format!("{}%", v as i64) } else { format!("{}%", v) }
}

fn virustotal_card(vt: &VirusTotalReport) -> Card {
    let mut rows = vec![];
    push_opt(&mut rows, "Malicious", &vt.malicious);
    push_opt(&mut rows, "Suspicious", &vt.suspicious);
    push_opt(&mut rows, "Harmless", &vt.harmless);
    push_opt(&mut rows, "Undetected", &vt.undetected);
    push_opt(&mut rows, "Reputation", &vt.reputation);
    if let Some(vendors) = &vt.vendors {
        for (engine, verdict) in vendors {
            rows.push(row(engine, verdict));
        }
    }
    Card { title: "VirusTotal", rows }
}

fn abuseipdb_card(a: Option<&AbuseIpDbReport>) -> Card {
    let mut rows = vec![];
    match a {
        Some(a) if a.has_reports() => push_opt(&mut rows, "Reports", &a.reports),
        _ => rows.push(row("Reports", NO_DATA)),
    }
    if let Some(a) = a {
        if let Some(c) = a.confidence {
            rows.push(row("Confidence", percent(c)));
        }
        push_opt(&mut rows, "Country", &a.country);
        push_opt(&mut rows, "ISP", &a.isp);
        push_opt(&mut rows, "Domain", &a.domain);
        push_opt(&mut rows, "Usage", &a.usage_type);
    }
    Card { title: "AbuseIPDB", rows }
}

fn otx_card(o: &OtxReport) -> Card {
    let mut rows = vec![];
    push_opt(&mut rows, "Pulses", &o.pulse_count);
    if let Some(families) = &o.malware_families {
        if !families.is_empty() {
            rows.push(row("Malware families", families.join(", ")));
        }
    }
    push_opt(&mut rows, "ASN", &o.asn);
    push_opt(&mut rows, "Country", &o.country);
    Card { title: "AlienVault OTX", rows }
}

fn report_view(r: &CheckReport, opt: &RenderOptions) -> View {
    let badge = r.combined_risk.clone().unwrap_or_else(|| opt.missing_risk.label().to_string());
    let mut cards = vec![];
    if let Some(vt) = &r.virustotal {
        cards.push(virustotal_card(vt));
    }
    cards.push(abuseipdb_card(r.abuseipdb.as_ref()));
    if let Some(o) = &r.otx {
        cards.push(otx_card(o));
    }
    View::Report { badge, cards }
}

fn error_view(f: &CheckFailure) -> View {
    let dump = serde_json
        ::to_string_pretty(f)
        .unwrap_or_else(|_| format!("{{ \"error\": \"{}\" }}", f.error));
    View::Error { badge: ERROR_BADGE.to_string(), dump }
}

/// Projects a check result into what the dashboard shows. Depends on nothing
/// but its arguments.
pub fn render(result: &CheckResult, opt: &RenderOptions) -> View {
    match result {
        CheckResult::Empty => View::Nothing,
        CheckResult::Success(r) => report_view(r, opt),
        CheckResult::Failure(f) => error_view(f),
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            View::Nothing => Ok(()),
            View::Report { badge, cards } => {
                writeln!(f, "[{}]", badge)?;
                for c in cards {
                    writeln!(f)?;
                    writeln!(f, "{}", c.title)?;
                    for r in &c.rows {
                        writeln!(f, "  {}: {}", r.label, r.value)?;
                    }
                }
                Ok(())
            }
            View::Error { badge, dump } => {
                writeln!(f, "[{}]", badge)?;
                writeln!(f, "{}", dump)
            }
        }
    }
}
