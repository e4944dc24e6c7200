//! Log formatting with hostname and rank prefix.
//!
//! Every line carries the emitting host and rank so interleaved output
//! from a multi-node run can be attributed. No ANSI colors; output is
//! routinely redirected to job logs.

use std::fmt;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Event formatter prefixing `[hostname:r<rank>]`.
pub struct RankFormatter {
    hostname: String,
    rank: u32,
}

impl RankFormatter {
    pub fn new(rank: u32) -> Self {
        let hostname = gethostname::gethostname()
            .to_str()
            .unwrap_or("unknown")
            .to_string();
        Self { hostname, rank }
    }
}

impl<S, N> FormatEvent<S, N> for RankFormatter
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
        let now: chrono::DateTime<chrono::Utc> = std::time::SystemTime::now().into();

        write!(writer, "[{}:r{}] ", self.hostname, self.rank)?;
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;
        write!(writer, "{:5} ", meta.level())?;
        write!(writer, "{}: ", meta.target())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Initialize tracing for one rank.
///
/// `RUST_LOG` overrides the configured level, as usual.
pub fn init_with_rank(level: &str, rank: u32) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = fmt::layer()
        .event_format(RankFormatter::new(rank))
        .with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
