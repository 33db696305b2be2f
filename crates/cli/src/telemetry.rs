use std::{io, sync::OnceLock};

use color_eyre::eyre::{self, Context as _};
use tracing_subscriber::{EnvFilter, Registry, filter::Directive, fmt, layer::SubscriberExt as _};

static TELEMETRY_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber; later calls are no-ops.
///
/// `RUST_LOG` takes precedence over `default_directive`. Output goes to stderr so that command
/// output on stdout stays machine readable.
pub fn init(default_directive: &str) -> eyre::Result<()> {
    let default_directive: Directive = default_directive
        .parse()
        .wrap_err_with(|| format!("invalid log directive {default_directive:?}"))?;

    if TELEMETRY_INIT.set(()).is_err() {
        return Ok(());
    }

    let filter = EnvFilter::builder()
        .with_default_directive(default_directive)
        .from_env_lossy();
    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .compact(),
    );

    tracing::subscriber::set_global_default(subscriber)
        .wrap_err("failed to install tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init("warn").unwrap();
        init("satchel=debug").unwrap();
    }
}
