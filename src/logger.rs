use anyhow::Result;
use tracing::{ level_filters::LevelFilter, Subscriber };
use tracing_appender::non_blocking::WorkerGuard;

pub fn verbosity_to_level_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Logs go to stderr so stdout only carries what the dashboard renders. Keep
/// the returned guard alive until exit or buffered lines are lost.
pub fn setup_logger(
    level: LevelFilter,
    json: bool
) -> Result<(Box<dyn Subscriber + Send + Sync>, WorkerGuard)> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let builder = tracing_subscriber
        ::fmt()
        .with_max_level(level)
        .with_writer(writer)
        .with_target(false);
    let sub: Box<dyn Subscriber + Send + Sync> = if json {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.with_ansi(false).finish())
    };
    Ok((sub, guard))
}
