use anyhow::Context as _;

/// Used when `RUST_LOG` is unset or unparsable. Dependencies stay at warn so
/// status lines are not buried under connection-pool chatter.
const DEFAULT_DIRECTIVES: &str = "warn,webtextextract=info";

/// Logs go to stderr; stdout carries extracted text only.
pub fn init() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_DIRECTIVES))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
