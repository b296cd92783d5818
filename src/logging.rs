// src/logging.rs
//
// Tracing subscriber setup for the CLI binary.

#[cfg(feature = "cli")]
pub fn init(level: tracing::Level) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("ECUCONNECT_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
