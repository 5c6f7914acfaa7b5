pub mod config;
pub mod errors;
pub mod llm;
pub mod navigation;
pub mod perception;

/// Install the global tracing subscriber. Logs go to stderr so stdout only
/// carries the note and the model reply.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
