//! Header patterns
//!
//! A header pattern is compiled once into literal text and field tokens.
//! Recognized tokens, each optionally followed by `:[fill]align width`:
//!
//! | token | output |
//! |-------|--------|
//! | `{a}` `{b}` | weekday / month name (`Wed`, `Jan`) |
//! | `{C}` `{Y}` | two / four digit year |
//! | `{m}` `{d}` `{H}` `{M}` `{S}` | month, day, hour, minute, second |
//! | `{e}` `{f}` `{F}` | milli / micro / nanoseconds |
//! | `{Ymd}` `{HMS}` `{HMSe}` `{HMSf}` `{HMSF}` | date or time groups |
//! | `{YmdHMS}` `{YmdHMSe}` `{YmdHMSf}` `{YmdHMSF}` | date and time |
//! | `{l}` | level tag |
//! | `{s}` `{g}` | `file:line`, `path:line` |
//! | `{t}` | thread name |
//!
//! Anything else is copied through literally.

use super::log_level::LogLevel;
use super::template::FormatSpec;
use super::timestamp::{DateFields, HeaderTimeZone};
use std::fmt::Write;

pub const DEFAULT_HEADER_PATTERN: &str = "{HMSf} {s:<16} {l}[{t:<6}] ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Weekday,
    MonthName,
    ShortYear,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millis,
    Micros,
    Nanos,
    Ymd,
    Hms,
    HmsMillis,
    HmsMicros,
    HmsNanos,
    YmdHms,
    YmdHmsMillis,
    YmdHmsMicros,
    YmdHmsNanos,
    Level,
    ShortLocation,
    FullLocation,
    Thread,
}

impl Field {
    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "a" => Field::Weekday,
            "b" => Field::MonthName,
            "C" => Field::ShortYear,
            "Y" => Field::Year,
            "m" => Field::Month,
            "d" => Field::Day,
            "H" => Field::Hour,
            "M" => Field::Minute,
            "S" => Field::Second,
            "e" => Field::Millis,
            "f" => Field::Micros,
            "F" => Field::Nanos,
            "Ymd" => Field::Ymd,
            "HMS" => Field::Hms,
            "HMSe" => Field::HmsMillis,
            "HMSf" => Field::HmsMicros,
            "HMSF" => Field::HmsNanos,
            "YmdHMS" => Field::YmdHms,
            "YmdHMSe" => Field::YmdHmsMillis,
            "YmdHMSf" => Field::YmdHmsMicros,
            "YmdHMSF" => Field::YmdHmsNanos,
            "l" => Field::Level,
            "s" => Field::ShortLocation,
            "g" => Field::FullLocation,
            "t" => Field::Thread,
            _ => return None,
        })
    }

    fn needs_date(self) -> bool {
        !matches!(
            self,
            Field::Level | Field::ShortLocation | Field::FullLocation | Field::Thread
        )
    }
}

#[derive(Debug, Clone)]
enum Piece {
    Literal(String),
    Field { field: Field, pad: Option<FormatSpec> },
}

/// Per-record values substituted into a header
#[derive(Debug, Clone, Copy)]
pub struct HeaderContext<'a> {
    pub timestamp_ns: u64,
    pub level: LogLevel,
    pub short_location: &'a str,
    pub full_location: &'a str,
    pub thread_name: &'a str,
}

/// A compiled header pattern
#[derive(Debug, Clone)]
pub struct HeaderPattern {
    source: String,
    pieces: Vec<Piece>,
    needs_date: bool,
}

impl HeaderPattern {
    pub fn compile(pattern: &str) -> Self {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut rest = pattern;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                literal.push_str(&rest[open..]);
                rest = "";
                break;
            };
            let token = &after[..close];
            match parse_token(token) {
                Some((field, pad)) => {
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Field { field, pad });
                }
                None => {
                    literal.push('{');
                    literal.push_str(token);
                    literal.push('}');
                }
            }
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        let needs_date = pieces
            .iter()
            .any(|p| matches!(p, Piece::Field { field, .. } if field.needs_date()));
        Self {
            source: pattern.to_string(),
            pieces,
            needs_date,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn render(&self, ctx: &HeaderContext<'_>, tz: HeaderTimeZone, out: &mut String) {
        let date = self
            .needs_date
            .then(|| DateFields::from_nanos(ctx.timestamp_ns, tz));

        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Field { field, pad } => {
                    let start = out.len();
                    write_field(*field, ctx, date.as_ref(), out);
                    if let Some(spec) = pad {
                        spec.pad(out, start, false);
                    }
                }
            }
        }
    }
}

impl Default for HeaderPattern {
    fn default() -> Self {
        Self::compile(DEFAULT_HEADER_PATTERN)
    }
}

fn parse_token(token: &str) -> Option<(Field, Option<FormatSpec>)> {
    let (name, spec) = match token.split_once(':') {
        Some((name, spec)) => (name, Some(spec)),
        None => (token, None),
    };
    let field = Field::from_token(name)?;
    let pad = match spec {
        None => None,
        Some(spec) => {
            let spec = FormatSpec::parse(spec).ok()?;
            let plain = FormatSpec {
                fill: spec.fill,
                align: spec.align,
                width: spec.width,
                ..FormatSpec::default()
            };
            // only fill, alignment and width apply to header fields
            if spec != plain {
                return None;
            }
            Some(spec)
        }
    };
    Some((field, pad))
}

fn write_field(field: Field, ctx: &HeaderContext<'_>, date: Option<&DateFields>, out: &mut String) {
    match field {
        Field::Level => out.push_str(ctx.level.to_str()),
        Field::ShortLocation => out.push_str(ctx.short_location),
        Field::FullLocation => out.push_str(ctx.full_location),
        Field::Thread => out.push_str(ctx.thread_name),
        _ => {
            if let Some(d) = date {
                // writing to a String cannot fail
                let _ = write_date_field(field, d, out);
            }
        }
    }
}

fn write_date_field(field: Field, d: &DateFields, out: &mut String) -> std::fmt::Result {
    match field {
        Field::Weekday => out.write_str(d.weekday_name()),
        Field::MonthName => out.write_str(d.month_name()),
        Field::ShortYear => write!(out, "{:02}", d.year.rem_euclid(100)),
        Field::Year => write!(out, "{:04}", d.year),
        Field::Month => write!(out, "{:02}", d.month),
        Field::Day => write!(out, "{:02}", d.day),
        Field::Hour => write!(out, "{:02}", d.hour),
        Field::Minute => write!(out, "{:02}", d.minute),
        Field::Second => write!(out, "{:02}", d.second),
        Field::Millis => write!(out, "{:03}", d.nanos / 1_000_000),
        Field::Micros => write!(out, "{:06}", d.nanos / 1_000),
        Field::Nanos => write!(out, "{:09}", d.nanos),
        Field::Ymd => write_ymd(d, out),
        Field::Hms => write_hms(d, out),
        Field::HmsMillis => {
            write_hms(d, out)?;
            write!(out, ".{:03}", d.nanos / 1_000_000)
        }
        Field::HmsMicros => {
            write_hms(d, out)?;
            write!(out, ".{:06}", d.nanos / 1_000)
        }
        Field::HmsNanos => {
            write_hms(d, out)?;
            write!(out, ".{:09}", d.nanos)
        }
        Field::YmdHms | Field::YmdHmsMillis | Field::YmdHmsMicros | Field::YmdHmsNanos => {
            write_ymd(d, out)?;
            out.push(' ');
            let time = match field {
                Field::YmdHms => Field::Hms,
                Field::YmdHmsMillis => Field::HmsMillis,
                Field::YmdHmsMicros => Field::HmsMicros,
                _ => Field::HmsNanos,
            };
            write_date_field(time, d, out)
        }
        Field::Level | Field::ShortLocation | Field::FullLocation | Field::Thread => Ok(()),
    }
}

fn write_ymd(d: &DateFields, out: &mut String) -> std::fmt::Result {
    write!(out, "{:04}-{:02}-{:02}", d.year, d.month, d.day)
}

fn write_hms(d: &DateFields, out: &mut String) -> std::fmt::Result {
    write!(out, "{:02}:{:02}:{:02}", d.hour, d.minute, d.second)
}
