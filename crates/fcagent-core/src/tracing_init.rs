//! Shared tracing/logging initialization.
//!
//! Logs always go to stderr: stdout carries the relayed output of the
//! remote process and must stay byte-exact.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"fcagent_cli=info,fcagent_core=info"`).
/// * `log_json` -- when `true`, emit structured JSON log lines instead of the
///   human-readable format.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );
    if log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Build the default filter string for a level name, scoped to fcagent crates.
pub fn default_filter(level: &str) -> String {
    format!("fcagent={level},fcagent_cli={level},fcagent_core={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_scopes_every_crate() {
        assert_eq!(
            default_filter("debug"),
            "fcagent=debug,fcagent_cli=debug,fcagent_core=debug"
        );
    }
}
