use crate::errors::LoggingError;
use configs::AppConfigs;
use tracing::warn;
use tracing_bunyan_formatter::BunyanFormattingLayer;
use tracing_log::LogTracer;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{
        format::{Format, Pretty},
        Layer,
    },
    layer::SubscriberExt,
};

pub fn setup(cfg: &AppConfigs) -> Result<(), LoggingError> {
    if let Err(err) = LogTracer::init() {
        warn!(
            error = err.to_string(),
            "failure to bridge log records, probably the logger was already initialized"
        );
    }

    let level_filter = get_log_level_filter(cfg);

    let target_filters = if cfg.enable_external_creates_logging {
        Targets::new().with_default(level_filter)
    } else {
        Targets::new()
            .with_default(level_filter)
            .with_target("lapin", LevelFilter::WARN)
            .with_target("amq_protocol", LevelFilter::WARN)
            .with_target("tcp_stream", LevelFilter::WARN)
            .with_target("rustls", LevelFilter::WARN)
            .with_target("async_io", LevelFilter::WARN)
            .with_target("polling", LevelFilter::WARN)
            .with_target("log", LevelFilter::WARN)
    };

    let (fmt_pretty, fmt_json): (Option<Layer<_, Pretty, Format<Pretty>>>, _) =
        if cfg.env.is_local() {
            (Some(Layer::new().pretty()), None)
        } else {
            (
                None,
                Some(BunyanFormattingLayer::new(
                    cfg.name.to_owned(),
                    std::io::stdout,
                )),
            )
        };

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(fmt_json)
            .with(fmt_pretty)
            .with(target_filters),
    )
    .map_err(|err| {
        warn!(error = err.to_string(), "failure to set tracing subscriber");
        LoggingError::InternalError
    })
}

fn get_log_level_filter(cfg: &AppConfigs) -> LevelFilter {
    match cfg.log_level.as_str() {
        "debug" | "Debug" | "DEBUG" => LevelFilter::DEBUG,
        "info" | "Info" | "INFO" => LevelFilter::INFO,
        "warn" | "Warn" | "WARN" => LevelFilter::WARN,
        "error" | "Error" | "ERROR" => LevelFilter::ERROR,
        "trace" | "Trace" | "TRACE" => LevelFilter::TRACE,
        _ => LevelFilter::OFF,
    }
}
