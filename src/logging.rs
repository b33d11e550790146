//! Custom logging formatter with hostname prefix and no ANSI colors
//!
//! Data nodes log to stdout so a cluster launcher can aggregate the
//! streams; the hostname prefix keeps interleaved logs attributable.

use std::fmt;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Custom event formatter with hostname prefix
pub struct HostnameFormatter {
    hostname: String,
}

impl HostnameFormatter {
    pub fn new() -> Self {
        let hostname = gethostname::gethostname()
            .to_str()
            .unwrap_or("unknown")
            .to_string();
        Self { hostname }
    }
}

impl Default for HostnameFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, N> FormatEvent<S, N> for HostnameFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();

        let now = std::time::SystemTime::now();
        let datetime: chrono::DateTime<chrono::Utc> = now.into();

        // Write hostname prefix
        write!(writer, "[{}] ", self.hostname)?;

        // Write timestamp and level (no ANSI codes)
        write!(writer, "{} ", datetime.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;
        write!(writer, "{:5} ", meta.level())?;

        // Write target (module path)
        write!(writer, "{}: ", meta.target())?;

        // Write the actual message
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Initialize tracing with the hostname formatter
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init_with_hostname(level: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = fmt::layer()
        .event_format(HostnameFormatter::new())
        .with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    let hostname_os = gethostname::gethostname();
    let hostname = hostname_os.to_str().unwrap_or("unknown");
    tracing::info!("Logging initialized on host: {}", hostname);
}
