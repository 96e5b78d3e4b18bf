use tracing_subscriber::EnvFilter;

/* ============================= LOGGING SETUP ============================= */

/// Map the configured level name onto a tracing directive.
///
/// Accepts the operator-facing vocabulary (DEBUG/INFO/WARNING/ERROR/CRITICAL);
/// CRITICAL collapses onto `error` since tracing has no higher level.
pub fn level_directive(level: &str) -> &'static str {
    match level.to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" => "warn",
        "ERROR" => "error",
        "CRITICAL" => "error",
        _ => "info",
    }
}

/// Install the global subscriber. Call once at startup.
///
/// `json` switches to the JSON formatter for log aggregation; the default
/// fmt layer is kept for interactive runs. `RUST_LOG` overrides the
/// configured level when set.
pub fn init(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(level)));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }
}

/// Fresh correlation id for one pipeline run.
pub fn correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
