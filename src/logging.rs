//! Logging setup.
//!
//! Events are emitted with `tracing` under a handful of targets
//! (`ingest`, `search`, `translate`, `embedding`, `store`) and written to
//! stderr so stdout stays parseable for scripts.
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! ingest = "debug"
//! ```
//!
//! `RUST_LOG` takes precedence over the config file.

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Build the filter directive string from config (`warn,ingest=debug`).
pub fn filter_directives(config: &LoggingConfig) -> String {
    let mut filter = config.default.clone();
    for (module, level) in &config.modules {
        filter.push_str(&format!(",{}={}", module, level));
    }
    filter
}

/// Install the global subscriber. Only the first call has an effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(filter_directives(config))
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        // try_init: a test harness or embedding application may already own the subscriber.
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}
