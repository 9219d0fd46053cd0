use color_eyre::Result;
use tracing_subscriber::{
    prelude::*,
    EnvFilter,
};

/// Initializes the tracing subscriber. `RUST_LOG` wins over the verbosity
/// flag when set.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_error::ErrorLayer::default())
        .try_init()?;
    Ok(())
}
