use std::{ io::Write, path::{ Path, PathBuf }, process::ExitCode, sync::Arc };

use clap::{ Args, Parser, Subcommand };
use tokio::{ io::{ AsyncBufRead, AsyncBufReadExt, BufReader }, sync::broadcast::error::RecvError, task::JoinSet };
use tracing::{ debug, error, info, warn };
use anyhow::{ Error, Result };

use crate::{
    config::{ DashboardConfig, MissingRisk, DEFAULT_API_BASE },
    dashboard::{ CheckResult, Dashboard, IgnoreReason, StateChange, Submission },
    intel::{ HttpApi, ThreatIntelApi },
    news::NewsPanel,
    render::{ render, RenderOptions },
};

mod config;
mod dashboard;
mod intel;
mod ioc;
mod logger;
mod news;
mod render;
mod report;
#[cfg(test)]
mod testing;

const QUIT_COMMAND: &str = ":quit";
const NEWS_COMMAND: &str = ":news";

#[derive(Parser)]
#[command(
    version,
    about = "Threat intel dashboard",
    long_about = "Threat intel dashboard\n\n\
    Submits an indicator of compromise (IP, domain, URL or hash) to a threat intel\n\
    aggregator backend and shows the combined risk and per-provider results,\n\
    next to the latest cybersecurity news."
)]
struct Cli {
    #[command(subcommand)]
    subcommand: SubCommands,
    /// Increase logging verbosity
    #[arg(short('v'), long, action = clap::ArgAction::Count, global = true)]
    verbosity: u8,
    /// Write logs as JSON lines
    #[arg(long = "json-log", global = true)]
    json_log: bool,
    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Args, Debug)]
pub struct BackendArgs {
    /// Origin of the threat intel aggregator API
    #[arg(
        short('a'),
        long = "api",
        env = "TIA_API_BASE",
        value_name = "url",
        default_value = DEFAULT_API_BASE,
        global = true
    )]
    api_base: String,
    /// Give up on a request after this many seconds. Requests never time out when unset
    #[arg(short('t'), long = "timeout", value_name = "seconds", global = true)]
    timeout: Option<u64>,
    /// Badge to show when the backend doesn't report a combined risk
    #[arg(long = "missing-risk", value_enum, default_value_t = MissingRisk::Unknown, global = true)]
    missing_risk: MissingRisk,
}

#[derive(Subcommand)]
pub enum SubCommands {
    #[command(about = "Check a single indicator and print the result", name = "check")]
    Check(CheckArgs),
    #[command(about = "Print the cybersecurity news panel", name = "news")]
    News,
    #[command(about = "Upload a file of indicators to the bulk check endpoint", name = "bulk-check")]
    BulkCheck(BulkCheckArgs),
    #[command(
        about = "Start an interactive dashboard session",
        long_about = "Start an interactive dashboard session. News is loaded once at startup,\n\
        then every input line is checked as an indicator. Type :news to show the\n\
        news again and :quit to exit.",
        name = "dashboard"
    )]
    Dashboard,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Indicator to check: IP address, domain, URL or file hash
    #[arg(value_name = "ioc")]
    ioc: String,
}

#[derive(Args, Debug)]
pub struct BulkCheckArgs {
    /// File to upload
    #[arg(value_name = "file")]
    file: PathBuf,
}

/// How a command ended, mapped to the process exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Ignored,
}

impl From<Outcome> for ExitCode {
    fn from(o: Outcome) -> Self {
        match o {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::Failure => ExitCode::FAILURE,
            Outcome::Ignored => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    let level = logger::verbosity_to_level_filter(args.verbosity);
    let (sub, _guard) = logger::setup_logger(level, args.json_log)?;
    tracing::subscriber::set_global_default(sub)?;

    let config = DashboardConfig::new(
        &args.backend.api_base,
        args.backend.timeout,
        args.backend.missing_risk
    ).map_err(|e| log_startup_err("reading configuration", e))?;
    info!("using threat intel backend at {}", config.api_base);
    let opt = RenderOptions { missing_risk: config.missing_risk };
    let api: Arc<dyn ThreatIntelApi> = Arc::new(
        HttpApi::new(config).map_err(|e| log_startup_err("creating HTTP client", e))?
    );

    let mut out = std::io::stdout();
    let outcome = match args.subcommand {
        SubCommands::Check(c) => check(api, &c.ioc, &opt, &mut out).await?,
        SubCommands::News => news(api, &mut out).await?,
        SubCommands::BulkCheck(b) => bulk_check(api.as_ref(), &b.file, &mut out).await?,
        SubCommands::Dashboard => {
            let input = BufReader::new(tokio::io::stdin());
            interactive(Dashboard::new(api), opt, input, &mut out).await?;
            Outcome::Success
        }
    };
    out.flush()?;
    Ok(outcome.into())
}

fn log_startup_err(context: &str, err: Error) -> Error {
    error!("error {}: {:?}", context, err);
    err
}

async fn check<W: Write>(
    api: Arc<dyn ThreatIntelApi>,
    ioc: &str,
    opt: &RenderOptions,
    out: &mut W
) -> Result<Outcome> {
    let dashboard = Dashboard::new(api);
    dashboard.set_query(ioc);
    match dashboard.submit().await {
        Submission::Ignored(reason) => {
            warn!(?reason, "nothing was checked");
            Ok(Outcome::Ignored)
        }
        Submission::Settled(result) => {
            write!(out, "{}", render(&result, opt))?;
            match result {
                CheckResult::Failure(_) => Ok(Outcome::Failure),
                _ => Ok(Outcome::Success),
            }
        }
    }
}

async fn news<W: Write>(api: Arc<dyn ThreatIntelApi>, out: &mut W) -> Result<Outcome> {
    let dashboard = Dashboard::new(api);
    dashboard.load_news().await;
    let news = dashboard.snapshot().news;
    write!(out, "{}", NewsPanel(&news))?;
    if news.iter().any(|n| n.is_unavailable()) {
        Ok(Outcome::Failure)
    } else {
        Ok(Outcome::Success)
    }
}

async fn bulk_check<W: Write>(api: &dyn ThreatIntelApi, file: &Path, out: &mut W) -> Result<Outcome> {
    let res = intel::bulk_check_file(api, file).await?;
    writeln!(out, "{}", serde_json::to_string_pretty(&res.body)?)?;
    if res.is_success() {
        Ok(Outcome::Success)
    } else {
        error!(status = res.status, "bulk check rejected by backend");
        Ok(Outcome::Failure)
    }
}

fn show<W: Write>(dashboard: &Dashboard, change: StateChange, out: &mut W) -> Result<()> {
    match change {
        StateChange::NewsReplaced => write!(out, "{}", NewsPanel(&dashboard.snapshot().news))?,
        other => debug!(?other, loading = dashboard.is_loading(), "dashboard changed"),
    }
    Ok(())
}

/// One indicator per input line. Each line claims the check slot before the
/// next one is read, and results are printed from the settled check itself.
async fn interactive<R, W>(dashboard: Dashboard, opt: RenderOptions, input: R, out: &mut W) -> Result<()>
    where R: AsyncBufRead + Unpin, W: Write
{
    let mut updates = dashboard.subscribe();
    let news_handle = tokio::spawn({
        let d = dashboard.clone();
        async move { d.load_news().await }
    });
    let mut lines = input.lines();
    let mut submissions = JoinSet::new();
    let mut input_closed = false;

    writeln!(out, "Enter IP, Domain, URL or Hash ({} to exit)", QUIT_COMMAND)?;
    loop {
        tokio::select! {
            line = lines.next_line(), if !input_closed => {
                match line?.as_deref().map(str::trim) {
                    None => {
                        debug!("end of input");
                        input_closed = true;
                    }
                    Some(QUIT_COMMAND) => {
                        news_handle.abort();
                        break;
                    }
                    Some(NEWS_COMMAND) => write!(out, "{}", NewsPanel(&dashboard.snapshot().news))?,
                    Some(query) => match dashboard.begin_check(query) {
                        Ok(pending) => {
                            writeln!(out, "Checking {}...", pending.ioc())?;
                            submissions.spawn(pending.settle());
                        }
                        Err(IgnoreReason::InFlight) => {
                            writeln!(out, "Still checking, {} was not submitted", query)?;
                        }
                        Err(IgnoreReason::EmptyQuery) => {}
                    },
                }
            },
            Some(joined) = submissions.join_next() => {
                match joined {
                    Ok(result) => write!(out, "{}", render(&result, &opt))?,
                    Err(e) => error!("check task failed: {:?}", e),
                }
            },
            change = updates.recv() => {
                match change {
                    Ok(c) => show(&dashboard, c, out)?,
                    Err(RecvError::Lagged(n)) => warn!("skipped {} dashboard updates", n),
                    Err(RecvError::Closed) => break,
                }
            },
        }
        // at end of input, stay until pending checks have been shown
        if input_closed && submissions.is_empty() {
            break;
        }
    }
    if input_closed {
        if let Err(e) = news_handle.await {
            error!("news task failed: {:?}", e);
        }
    }
    while let Ok(c) = updates.try_recv() {
        show(&dashboard, c, out)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::{ fs, io };

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::{ intel::CheckResponse, news::NewsItem, testing::{ Reply, StubApi } };

    const OPT: RenderOptions = RenderOptions { missing_risk: MissingRisk::Unknown };

    // output buffer readable while the session still holds the writer
    #[derive(Clone, Default)]
    struct SharedOut(Arc<Mutex<Vec<u8>>>);

    impl SharedOut {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).to_string()
        }
    }

    impl Write for SharedOut {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn headline() -> Vec<NewsItem> {
        vec![NewsItem {
            title: "Patch Tuesday fixes zero-day".to_string(),
            link: "https://news.example/patch".to_string(),
            source: "Example".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_check_exit_codes() {
        let high = json!({ "combined_risk": "High", "virustotal": { "malicious": 5 } });
        let api = Arc::new(StubApi::new(Reply::Respond(200, high)));
        let mut out = vec![];
        assert_eq!(check(api.clone(), "8.8.8.8", &OPT, &mut out).await.unwrap(), Outcome::Success);
        assert!(String::from_utf8_lossy(&out).contains("[High]"));

        let api = Arc::new(StubApi::new(Reply::Respond(500, json!({ "msg": "boom" }))));
        let mut out = vec![];
        assert_eq!(check(api, "8.8.8.8", &OPT, &mut out).await.unwrap(), Outcome::Failure);
        assert!(String::from_utf8_lossy(&out).contains("[Error]"));

        let api = Arc::new(StubApi::new(Reply::Unreachable));
        let mut out = vec![];
        assert_eq!(check(api, "8.8.8.8", &OPT, &mut out).await.unwrap(), Outcome::Failure);

        let api = Arc::new(StubApi::new(Reply::Unreachable));
        let mut out = vec![];
        assert_eq!(check(api.clone(), "", &OPT, &mut out).await.unwrap(), Outcome::Ignored);
        assert!(out.is_empty());
        assert_eq!(api.calls(), 0);
    }

    #[test]
    fn test_outcome_exit_code() {
        // ExitCode has no PartialEq, compare the debug form
        let code = |o: Outcome| format!("{:?}", ExitCode::from(o));
        assert_eq!(code(Outcome::Success), format!("{:?}", ExitCode::SUCCESS));
        assert_eq!(code(Outcome::Failure), format!("{:?}", ExitCode::FAILURE));
        assert_eq!(code(Outcome::Ignored), format!("{:?}", ExitCode::from(2)));
    }

    #[tokio::test]
    async fn test_news_command() {
        let mut stub = StubApi::new(Reply::Unreachable);
        stub.news = Some(headline());
        let mut out = vec![];
        assert_eq!(news(Arc::new(stub), &mut out).await.unwrap(), Outcome::Success);
        assert!(String::from_utf8_lossy(&out).contains("Patch Tuesday fixes zero-day"));

        let mut out = vec![];
        let res = news(Arc::new(StubApi::new(Reply::Unreachable)), &mut out).await.unwrap();
        assert_eq!(res, Outcome::Failure);
        assert!(String::from_utf8_lossy(&out).contains("Failed to load news"));
    }

    #[tokio::test]
    async fn test_bulk_check_command() {
        let dir = std::env::temp_dir().join(format!("tia-cli-bulk-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("iocs.txt");
        fs::write(&path, b"1.2.3.4\n").unwrap();

        let mut stub = StubApi::new(Reply::Unreachable);
        stub.bulk = Some(CheckResponse { status: 200, body: json!({ "accepted": 1 }) });
        let mut out = vec![];
        assert_eq!(bulk_check(&stub, &path, &mut out).await.unwrap(), Outcome::Success);
        assert!(String::from_utf8_lossy(&out).contains("\"accepted\": 1"));

        stub.bulk = Some(CheckResponse { status: 413, body: json!({ "msg": "file too large" }) });
        let mut out = vec![];
        assert_eq!(bulk_check(&stub, &path, &mut out).await.unwrap(), Outcome::Failure);
        assert!(String::from_utf8_lossy(&out).contains("file too large"));

        stub.bulk = None;
        assert!(bulk_check(&stub, &path, &mut Vec::<u8>::new()).await.is_err());
        assert!(bulk_check(&stub, &dir.join("missing.txt"), &mut Vec::<u8>::new()).await.is_err());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_session_back_to_back_lines() {
        let gate = Arc::new(Notify::new());
        let mut stub = StubApi::new(Reply::Respond(200, json!({ "combined_risk": "High" })));
        stub.gate = Some(gate.clone());
        stub.news = Some(headline());
        let api = Arc::new(stub);
        let dashboard = Dashboard::new(api.clone());
        let out = SharedOut::default();

        let input: &[u8] = b"1.1.1.1\n8.8.8.8\n";
        let mut writer = out.clone();
        let session = interactive(dashboard.clone(), OPT, input, &mut writer);
        let release = async {
            // the second line is refused while the first check is held
            while !out.text().contains("Still checking") {
                tokio::task::yield_now().await;
            }
            gate.notify_one();
        };
        let (res, _) = tokio::join!(session, release);
        res.unwrap();

        let text = out.text();
        assert!(text.contains("Checking 1.1.1.1..."));
        assert!(text.contains("Still checking, 8.8.8.8 was not submitted"));
        assert!(text.contains("[High]"));
        assert!(text.contains("Patch Tuesday fixes zero-day"));
        assert_eq!(*api.seen.lock(), vec!["1.1.1.1".to_string()]);
        assert_eq!(api.calls(), 1);

        // the result was printed once, from the finished check
        assert_eq!(text.matches("[High]").count(), 1);
        assert!(!dashboard.is_loading());
    }

    #[tokio::test]
    async fn test_session_waits_for_check_at_end_of_input() {
        let mut stub = StubApi::new(Reply::Respond(429, json!({ "msg": "rate limited" })));
        stub.news = Some(headline());
        let api = Arc::new(stub);
        let mut out = vec![];

        let input: &[u8] = b"   \nexample.com\n";
        interactive(Dashboard::new(api.clone()), OPT, input, &mut out).await.unwrap();

        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with("Enter IP, Domain, URL or Hash (:quit to exit)"));
        assert!(text.contains("[Error]"));
        assert!(text.contains("rate limited"));
        assert!(text.contains("Cybersecurity News"));
        assert_eq!(api.calls(), 1);
        assert_eq!(api.news_calls(), 1);
    }

    #[tokio::test]
    async fn test_session_quit() {
        let api = Arc::new(StubApi::new(Reply::Respond(200, json!({ "combined_risk": "Low" }))));
        let mut out = vec![];

        let input: &[u8] = b":news\n:quit\n1.1.1.1\n";
        interactive(Dashboard::new(api.clone()), OPT, input, &mut out).await.unwrap();

        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("Cybersecurity News"));
        assert!(!text.contains("[Low]"));
        assert_eq!(api.calls(), 0);
    }
}
