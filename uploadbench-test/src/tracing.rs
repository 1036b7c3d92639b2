use tracing_subscriber::EnvFilter;

const CRATE_NAMES: &[&str] = &["uploadbench", "uploadbench_storage"];

/// Initialize the logger for testing.
///
/// This logs to the stdout registered by the Rust test runner. By default only the benchmark
/// crates are logged, at `TRACE`, and the HTTP stack at `WARN`. A non-empty `RUST_LOG` replaces
/// those directives, e.g. `RUST_LOG=uploadbench=info,hyper=debug`.
///
/// # Example
///
/// ```
/// uploadbench_test::tracing::init();
/// ```
pub fn init() {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::fmt::fmt()
        .with_env_filter(EnvFilter::new(directives(rust_log.as_deref())))
        .with_target(true)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}

fn directives(rust_log: Option<&str>) -> String {
    if let Some(rust_log) = rust_log.filter(|value| !value.trim().is_empty()) {
        return rust_log.to_owned();
    }

    let mut directives = String::from("error,reqwest=warn,hyper=warn,axum=warn");
    for name in CRATE_NAMES {
        directives.push_str(&format!(",{name}=trace"));
    }
    directives
}
