use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "feeder_service=info";

pub fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = DEFAULT_DIRECTIVE.parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
