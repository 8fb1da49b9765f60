//! A compact event formatter: timestamp, level, target, message, and the fields of every
//! active span, trimmed from the teacher's `nu-ansi-term`/`time`-based formatter down to
//! `tracing_subscriber`'s own built-in timer and hand-rolled ANSI codes so this crate
//! doesn't need either dependency just for colorizing a level label.

use std::fmt;

use tracing::{Event, Level, Subscriber};
use tracing_log::NormalizeEvent as _;
use tracing_subscriber::{
    fmt::{
        format::Writer,
        time::{FormatTime, SystemTime},
        FmtContext, FormatEvent, FormatFields, FormattedFields,
    },
    registry::LookupSpan,
};

pub struct Format {
    time: bool,
    level: bool,
}

impl Format {
    pub fn new() -> Self {
        Self {
            time: true,
            level: true,
        }
    }

    pub fn without_timestamp(self) -> Self {
        Self { time: false, ..self }
    }

    pub fn without_level(self) -> Self {
        Self { level: false, ..self }
    }
}

impl Default for Format {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, N> FormatEvent<S, N> for Format
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
        let normalized_meta = event.normalized_metadata();
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());

        if self.time {
            SystemTime.format_time(&mut writer)?;
            writer.write_char(' ')?;
        }

        if self.level {
            write!(
                writer,
                "{} ",
                FmtLevel::new(meta.level(), writer.has_ansi_escapes())
            )?;
        }

        write!(writer, "{}: ", meta.target())?;

        ctx.format_fields(writer.by_ref(), event)?;

        for span in ctx
            .event_scope()
            .into_iter()
            .flat_map(tracing_subscriber::registry::Scope::from_root)
        {
            let exts = span.extensions();
            if let Some(fields) = exts.get::<FormattedFields<N>>()
                && !fields.is_empty()
            {
                write!(writer, " {}", fields.fields)?;
            }
        }

        writeln!(writer)
    }
}

struct FmtLevel<'a> {
    level: &'a Level,
    ansi: bool,
}

impl<'a> FmtLevel<'a> {
    fn new(level: &'a Level, ansi: bool) -> Self {
        Self { level, ansi }
    }
}

const TRACE_STR: &str = "TRACE";
const DEBUG_STR: &str = "DEBUG";
const INFO_STR: &str = " INFO";
const WARN_STR: &str = " WARN";
const ERROR_STR: &str = "ERROR";

impl fmt::Display for FmtLevel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (code, label) = match *self.level {
            Level::TRACE => ("35", TRACE_STR),
            Level::DEBUG => ("34", DEBUG_STR),
            Level::INFO => ("32", INFO_STR),
            Level::WARN => ("33", WARN_STR),
            Level::ERROR => ("31", ERROR_STR),
        };

        if self.ansi {
            write!(f, "\x1b[{code}m{label}\x1b[0m")
        } else {
            f.pad(label)
        }
    }
}
