use autoplant::config::LoggingConfig;
use tokio::signal;
use tracing::error;
use tracing_subscriber::EnvFilter;

pub fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},autoplant=debug", logging.level))
    });

    let log_dir = file_log_dir(std::env::var("AUTOPLANT_LOG_DIR").ok());
    let file_layer = log_dir.as_deref().and_then(file_writer).map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
    });

    let console_layer = (!logging.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });
    let json_layer = logging
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));

    let file_logging_dir = if file_layer.is_some() { log_dir } else { None };
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    if let Some(dir) = file_logging_dir {
        eprintln!("Logging to: {}/autoplant.log", dir);
    }
}

/// File logging is on only when AUTOPLANT_LOG_DIR names a directory
fn file_log_dir(value: Option<String>) -> Option<String> {
    value.filter(|dir| !dir.trim().is_empty())
}

/// Daily-rolling writer, or `None` when `log_dir` is not writable.
///
/// `tracing_appender::rolling::daily` panics if it can't create the initial
/// log file, so preflight writability.
fn file_writer(log_dir: &str) -> Option<tracing_appender::non_blocking::NonBlocking> {
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!(
            "Warning: Could not create log directory {} ({}), file logging disabled",
            log_dir, e
        );
        return None;
    }

    let test_path = std::path::Path::new(log_dir).join(".autoplant_write_test");
    if let Err(e) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&test_path)
    {
        eprintln!(
            "Warning: Could not write to log directory {} ({}), file logging disabled",
            log_dir, e
        );
        return None;
    }
    let _ = std::fs::remove_file(&test_path);

    let file_appender = tracing_appender::rolling::daily(log_dir, "autoplant.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the guard alive for the life of the process
    Box::leak(Box::new(guard));

    Some(non_blocking)
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
