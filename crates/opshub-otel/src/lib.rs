use once_cell::sync::OnceCell;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Install console tracing (stderr) filtered by `RUST_LOG`, default `info`.
pub fn init() {
    init_with_service("opshub");
}

/// Same as [`init`], tagging the optional rolling log file with `service`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_with_service(service: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter, service);
}

fn install(filter: EnvFilter, service: &str) {
    let console = fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(console.with_filter(filter));
    match rolling_settings(service) {
        Some(settings) => {
            if std::fs::create_dir_all(&settings.dir).is_err() {
                tracing::warn!(directory = %settings.dir, "failed to create log directory");
            }
            let writer = match settings.rotation.as_str() {
                "hourly" => tracing_appender::rolling::hourly(&settings.dir, &settings.prefix),
                "minutely" => tracing_appender::rolling::minutely(&settings.dir, &settings.prefix),
                _ => tracing_appender::rolling::daily(&settings.dir, &settings.prefix),
            };
            let (nb, guard) = tracing_appender::non_blocking(writer);
            let _ = FILE_GUARD.set(guard);
            let file_filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(nb)
                .with_filter(file_filter);
            let _ = registry.with(file_layer).try_init();
        }
        None => {
            let _ = registry.try_init();
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct RollingSettings {
    dir: String,
    prefix: String,
    rotation: String,
}

/// `OPSHUB_LOG_ROLL=1` enables a rolling file next to console output.
fn rolling_settings(service: &str) -> Option<RollingSettings> {
    rolling_settings_from(service, |key| std::env::var(key).ok())
}

fn rolling_settings_from(
    service: &str,
    get: impl Fn(&str) -> Option<String>,
) -> Option<RollingSettings> {
    if get("OPSHUB_LOG_ROLL").as_deref() != Some("1") {
        return None;
    }
    let dir = get("OPSHUB_LOG_DIR").unwrap_or_else(|| "logs".to_string());
    let prefix = get("OPSHUB_LOG_PREFIX").unwrap_or_else(|| service.to_string());
    let rotation = get("OPSHUB_LOG_ROTATION")
        .unwrap_or_else(|| "daily".into())
        .to_lowercase();
    Some(RollingSettings {
        dir,
        prefix,
        rotation,
    })
}
