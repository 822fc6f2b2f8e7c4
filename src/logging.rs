//! Subscriber initialisation for binaries and tests.

use anyhow::{bail, Result};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Accepted `level` arguments, case-insensitive.
pub const ALL_LOG_LEVELS: &str = "TRACE|DEBUG|INFO|WARN|ERROR";

pub fn parse_level(level: &str) -> Result<Level> {
    let upper = level.trim().to_ascii_uppercase();
    if !ALL_LOG_LEVELS.split('|').any(|known| known == upper) {
        bail!("invalid log level {level:?}, expected one of {ALL_LOG_LEVELS}");
    }
    Ok(upper.parse()?)
}

/// Install the global fmt subscriber at `level`.
///
/// `RUST_LOG` overrides `level` when set. Fails if a subscriber is already installed.
pub fn init(level: &str) -> Result<()> {
    let level = parse_level(level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(ChronoLocal::new("%H:%M:%S%.3f".to_string()))
                .with_target(false),
        )
        .try_init()?;
    Ok(())
}
