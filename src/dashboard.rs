use std::{ fmt, sync::Arc };

use parking_lot::Mutex;
use serde_derive::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{ debug, info, warn };

use crate::{ intel::{ CheckResponse, ThreatIntelApi }, ioc::IocKind, news::NewsItem, report::CheckReport };

const UPDATE_CHANNEL_SIZE: usize = 64;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    #[serde(rename = "Backend error")]
    BackendError,
    #[serde(rename = "Server not reachable")]
    ServerNotReachable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FailureKind::BackendError => write!(f, "Backend error"),
            FailureKind::ServerNotReachable => write!(f, "Server not reachable"),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CheckFailure {
    pub error: FailureKind,
    pub detail: Value,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum CheckResult {
    #[default]
    Empty,
    Success(CheckReport),
    Failure(CheckFailure),
}

impl CheckResult {
    pub fn unreachable(err: &anyhow::Error) -> Self {
        CheckResult::Failure(CheckFailure {
            error: FailureKind::ServerNotReachable,
            detail: Value::String(format!("{:#}", err)),
        })
    }

    pub fn from_response(resp: CheckResponse) -> Self {
        if !resp.is_success() {
            return CheckResult::Failure(CheckFailure {
                error: FailureKind::BackendError,
                detail: resp.body,
            });
        }
        match CheckReport::from_value(resp.body) {
            Ok(r) => CheckResult::Success(r),
            Err(e) =>
                CheckResult::Failure(CheckFailure {
                    error: FailureKind::ServerNotReachable,
                    detail: Value::String(format!("malformed response to check request: {}", e)),
                }),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DashboardState {
    pub query: String,
    pub result: CheckResult,
    pub loading: bool,
    pub news: Vec<NewsItem>,
}

/// Published after each write to the dashboard state, in write order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateChange {
    CheckStarted,
    ResultSettled,
    CheckFinished,
    NewsReplaced,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyQuery,
    InFlight,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Submission {
    Ignored(IgnoreReason),
    Settled(CheckResult),
}

/// A check whose slot is already claimed; `settle` sends it.
pub struct PendingCheck {
    dashboard: Dashboard,
    ioc: String,
}

impl PendingCheck {
    pub fn ioc(&self) -> &str {
        &self.ioc
    }

    pub async fn settle(self) -> CheckResult {
        self.dashboard.settle(&self.ioc).await
    }
}

/// Owns the query, the loading flag, the last check result and the news list.
/// Clones share the same state.
#[derive(Clone, Debug)]
pub struct Dashboard {
    api: Arc<dyn ThreatIntelApi>,
    state: Arc<Mutex<DashboardState>>,
    updates: broadcast::Sender<StateChange>,
}

impl Dashboard {
    pub fn new(api: Arc<dyn ThreatIntelApi>) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_SIZE);
        Dashboard {
            api,
            state: Arc::new(Mutex::new(DashboardState::default())),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> DashboardState {
        self.state.lock().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    fn publish(&self, change: StateChange) {
        // no subscribers is fine
        let _ = self.updates.send(change);
    }

    pub fn set_query(&self, text: &str) {
        self.state.lock().query = text.to_string();
    }

    /// Claims the check slot for `query`: stores it, refuses an empty query or
    /// a second check while one is in flight, then marks the dashboard loading.
    /// The query is captured here, so later `set_query` calls don't change
    /// what gets sent.
    fn begin(&self, query: Option<&str>) -> Result<String, IgnoreReason> {
        let ioc = {
            let mut s = self.state.lock();
            if let Some(q) = query {
                s.query = q.to_string();
            }
            if s.query.is_empty() {
                debug!("empty query, nothing to check");
                return Err(IgnoreReason::EmptyQuery);
            }
            if s.loading {
                warn!(ioc = %s.query, "a check is already in flight, ignoring submit");
                return Err(IgnoreReason::InFlight);
            }
            s.loading = true;
            s.result = CheckResult::Empty;
            s.query.clone()
        };
        self.publish(StateChange::CheckStarted);
        info!(ioc = %ioc, kind = %IocKind::classify(&ioc), "checking indicator");
        Ok(ioc)
    }

    async fn settle(&self, ioc: &str) -> CheckResult {
        let result = match self.api.check(ioc).await {
            Ok(resp) => {
                debug!(ioc = %ioc, status = resp.status, "check request settled");
                CheckResult::from_response(resp)
            }
            Err(e) => {
                warn!(ioc = %ioc, "check request failed: {:#}", e);
                CheckResult::unreachable(&e)
            }
        };

        self.state.lock().result = result.clone();
        self.publish(StateChange::ResultSettled);
        self.state.lock().loading = false;
        self.publish(StateChange::CheckFinished);
        result
    }

    /// Runs one check for the current query. Ignored when the query is empty
    /// or another check is still in flight.
    pub async fn submit(&self) -> Submission {
        match self.begin(None) {
            Ok(ioc) => Submission::Settled(self.settle(&ioc).await),
            Err(reason) => Submission::Ignored(reason),
        }
    }

    /// Sets the query and claims the check slot in one step. The returned
    /// check only talks to the backend once awaited.
    pub fn begin_check(&self, query: &str) -> Result<PendingCheck, IgnoreReason> {
        let ioc = self.begin(Some(query))?;
        Ok(PendingCheck { dashboard: self.clone(), ioc })
    }

    /// Fetches the news list once and replaces the current one. A failed
    /// fetch leaves the single "unavailable" item instead.
    pub async fn load_news(&self) {
        let news = match self.api.news().await {
            Ok(items) => {
                info!("loaded {} news items", items.len());
                items
            }
            Err(e) => {
                warn!("cannot load news: {:#}", e);
                vec![NewsItem::unavailable()]
            }
        };
        self.state.lock().news = news;
        self.publish(StateChange::NewsReplaced);
    }
}
