//! Runtime-validated format templates
//!
//! Templates are compiled once, when their call site is registered, and
//! rendered on the draining thread against decoded arguments. Supported
//! grammar:
//!
//! - `{}` next positional argument, `{N}` explicit index
//! - `{{` and `}}` for literal braces
//! - `{:spec}` with `[[fill]align][+|-][#][0][width][.precision][type]`,
//!   `align` one of `<` `>` `^`, `type` one of `d s x X o b e E f ? p c`
//!
//! A template that fails to parse, or an argument list that does not fit
//! it, is never fatal: the body is replaced by a diagnostic line.

use super::args::ArgValue;
use super::error::LoggerError;
use std::borrow::Cow;
use std::fmt::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatType {
    Default,
    Decimal,
    Str,
    LowerHex,
    UpperHex,
    Octal,
    Binary,
    LowerExp,
    UpperExp,
    Fixed,
    Debug,
    Pointer,
    Char,
}

/// Parsed `{:...}` specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub fill: char,
    pub align: Option<Align>,
    pub plus: bool,
    pub alternate: bool,
    pub zero: bool,
    pub width: Option<usize>,
    pub precision: Option<usize>,
    pub ty: FormatType,
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self {
            fill: ' ',
            align: None,
            plus: false,
            alternate: false,
            zero: false,
            width: None,
            precision: None,
            ty: FormatType::Default,
        }
    }
}

impl FormatSpec {
    pub fn parse(spec: &str) -> Result<Self, String> {
        let mut out = FormatSpec::default();
        let chars: Vec<char> = spec.chars().collect();
        let mut i = 0;

        let align_of = |c: char| match c {
            '<' => Some(Align::Left),
            '>' => Some(Align::Right),
            '^' => Some(Align::Center),
            _ => None,
        };

        if chars.len() >= 2 && align_of(chars[1]).is_some() {
            out.fill = chars[0];
            out.align = align_of(chars[1]);
            i = 2;
        } else if let Some(align) = chars.first().and_then(|c| align_of(*c)) {
            out.align = Some(align);
            i = 1;
        }

        if let Some(&c) = chars.get(i) {
            if c == '+' {
                out.plus = true;
                i += 1;
            } else if c == '-' {
                i += 1;
            }
        }
        if chars.get(i) == Some(&'#') {
            out.alternate = true;
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            out.zero = true;
            i += 1;
        }

        let (width, next) = parse_number(&chars, i)?;
        out.width = width;
        i = next;

        if chars.get(i) == Some(&'.') {
            let (precision, next) = parse_number(&chars, i + 1)?;
            if precision.is_none() {
                return Err("missing precision after '.'".to_string());
            }
            out.precision = precision;
            i = next;
        }

        if let Some(&c) = chars.get(i) {
            out.ty = match c {
                'd' => FormatType::Decimal,
                's' => FormatType::Str,
                'x' => FormatType::LowerHex,
                'X' => FormatType::UpperHex,
                'o' => FormatType::Octal,
                'b' => FormatType::Binary,
                'e' => FormatType::LowerExp,
                'E' => FormatType::UpperExp,
                'f' | 'F' => FormatType::Fixed,
                '?' => FormatType::Debug,
                'p' => FormatType::Pointer,
                'c' => FormatType::Char,
                other => return Err(format!("unknown format type '{}'", other)),
            };
            i += 1;
        }

        if i != chars.len() {
            return Err(format!("unexpected trailing characters in spec '{}'", spec));
        }
        Ok(out)
    }

    /// Pad the text written to `out` since `start` up to the configured width
    pub(crate) fn pad(&self, out: &mut String, start: usize, numeric: bool) {
        let Some(width) = self.width else {
            return;
        };
        let len = out[start..].chars().count();
        if len >= width {
            return;
        }
        let missing = width - len;

        if self.zero && numeric && self.align.is_none() {
            let body = &out[start..];
            let mut prefix = 0;
            if body.starts_with('+') || body.starts_with('-') {
                prefix += 1;
            }
            let rest = &body[prefix..];
            if rest.starts_with("0x") || rest.starts_with("0o") || rest.starts_with("0b") {
                prefix += 2;
            }
            let zeros: String = std::iter::repeat('0').take(missing).collect();
            out.insert_str(start + prefix, &zeros);
            return;
        }

        let align = self
            .align
            .unwrap_or(if numeric { Align::Right } else { Align::Left });
        let (left, right) = match align {
            Align::Left => (0, missing),
            Align::Right => (missing, 0),
            Align::Center => (missing / 2, missing - missing / 2),
        };
        if left > 0 {
            let fill: String = std::iter::repeat(self.fill).take(left).collect();
            out.insert_str(start, &fill);
        }
        for _ in 0..right {
            out.push(self.fill);
        }
    }
}

fn parse_number(chars: &[char], mut i: usize) -> Result<(Option<usize>, usize), String> {
    let begin = i;
    let mut value: usize = 0;
    while let Some(d) = chars.get(i).and_then(|c| c.to_digit(10)) {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(d as usize))
            .ok_or_else(|| "width or precision too large".to_string())?;
        i += 1;
    }
    Ok(((i > begin).then_some(value), i))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Arg { index: usize, spec: FormatSpec },
}

/// A compiled template; parse failures are kept and surface at render time
#[derive(Debug, Clone)]
pub struct Template {
    source: Cow<'static, str>,
    compiled: Result<Vec<Piece>, String>,
}

impl Template {
    pub fn compile(source: impl Into<Cow<'static, str>>) -> Self {
        let source = source.into();
        let compiled = parse_pieces(&source);
        Self { source, compiled }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parse error, if the template is malformed
    pub fn error(&self) -> Option<&str> {
        self.compiled.as_ref().err().map(String::as_str)
    }

    /// The parse error as a [`LoggerError`]
    pub fn check(&self) -> crate::core::error::Result<()> {
        match self.error() {
            Some(reason) => Err(LoggerError::template(self.source(), reason)),
            None => Ok(()),
        }
    }

    /// Number of arguments the template refers to (highest index + 1)
    pub fn arg_count(&self) -> usize {
        match &self.compiled {
            Ok(pieces) => pieces
                .iter()
                .filter_map(|p| match p {
                    Piece::Arg { index, .. } => Some(index + 1),
                    Piece::Literal(_) => None,
                })
                .max()
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Render into `out`; on failure `out` may hold a partial body
    pub fn render(&self, args: &[ArgValue<'_>], out: &mut String) -> Result<(), String> {
        let pieces = self.compiled.as_ref().map_err(Clone::clone)?;
        for piece in pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Arg { index, spec } => {
                    let value = args.get(*index).ok_or_else(|| {
                        format!(
                            "argument {} requested but only {} supplied",
                            index,
                            args.len()
                        )
                    })?;
                    write_value(spec, value, out)?;
                }
            }
        }
        Ok(())
    }

    /// Render into `out`, replacing a failed render with a diagnostic
    ///
    /// Returns `false` when the diagnostic was used.
    pub fn render_or_diagnostic(&self, args: &[ArgValue<'_>], out: &mut String) -> bool {
        let start = out.len();
        match self.render(args, out) {
            Ok(()) => true,
            Err(reason) => {
                out.truncate(start);
                let _ = write!(out, "[format error: {}] {}", reason, self.source);
                false
            }
        }
    }
}

fn parse_pieces(source: &str) -> Result<Vec<Piece>, String> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut next_auto = 0usize;
    let mut iter = source.char_indices().peekable();

    while let Some((pos, c)) = iter.next() {
        match c {
            '{' => {
                if matches!(iter.peek(), Some((_, '{'))) {
                    iter.next();
                    literal.push('{');
                    continue;
                }
                let mut inner = String::new();
                let mut closed = false;
                for (_, c) in iter.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    if c == '{' {
                        return Err(format!("nested '{{' in placeholder at offset {}", pos));
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(format!("unterminated placeholder at offset {}", pos));
                }

                let (arg, spec) = match inner.split_once(':') {
                    Some((arg, spec)) => (arg, spec),
                    None => (inner.as_str(), ""),
                };
                let index = if arg.is_empty() {
                    let index = next_auto;
                    next_auto += 1;
                    index
                } else {
                    arg.trim()
                        .parse::<usize>()
                        .map_err(|_| format!("named argument '{}' is not supported", arg))?
                };
                let spec = FormatSpec::parse(spec)?;

                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                pieces.push(Piece::Arg { index, spec });
            }
            '}' => {
                if matches!(iter.peek(), Some((_, '}'))) {
                    iter.next();
                    literal.push('}');
                } else {
                    return Err(format!("unmatched '}}' at offset {}", pos));
                }
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Ok(pieces)
}

fn type_error(spec: &FormatSpec, what: &str) -> String {
    format!("format type {:?} is not valid for {}", spec.ty, what)
}

fn write_value(spec: &FormatSpec, value: &ArgValue<'_>, out: &mut String) -> Result<(), String> {
    let start = out.len();
    let numeric = match *value {
        ArgValue::Int(v) => {
            write_integer(spec, v < 0, v.unsigned_abs(), out)?;
            true
        }
        ArgValue::Uint(v) => {
            write_integer(spec, false, v, out)?;
            true
        }
        ArgValue::F32(v) => {
            write_float(spec, v, out)?;
            true
        }
        ArgValue::F64(v) => {
            write_float(spec, v, out)?;
            true
        }
        ArgValue::Bool(v) => match spec.ty {
            FormatType::Default | FormatType::Str | FormatType::Debug => {
                out.push_str(if v { "true" } else { "false" });
                false
            }
            FormatType::Decimal => {
                out.push(if v { '1' } else { '0' });
                true
            }
            _ => return Err(type_error(spec, "bool")),
        },
        ArgValue::Char(v) => match spec.ty {
            FormatType::Default | FormatType::Char | FormatType::Str => {
                out.push(v);
                false
            }
            FormatType::Debug => {
                write_fmt(out, format_args!("{:?}", v))?;
                false
            }
            FormatType::Decimal
            | FormatType::LowerHex
            | FormatType::UpperHex
            | FormatType::Octal
            | FormatType::Binary => {
                write_integer(spec, false, v as u128, out)?;
                true
            }
            _ => return Err(type_error(spec, "char")),
        },
        ArgValue::Str(s) => {
            match spec.ty {
                FormatType::Default | FormatType::Str => match spec.precision {
                    Some(p) => out.extend(s.chars().take(p)),
                    None => out.push_str(s),
                },
                FormatType::Debug => write_fmt(out, format_args!("{:?}", s))?,
                _ => return Err(type_error(spec, "string")),
            }
            false
        }
        ArgValue::Ptr(p) => match spec.ty {
            FormatType::Default | FormatType::Pointer | FormatType::LowerHex => {
                write_fmt(out, format_args!("{:#x}", p))?;
                true
            }
            _ => return Err(type_error(spec, "pointer")),
        },
        ArgValue::Custom { render, bytes } => match spec.ty {
            FormatType::Default | FormatType::Str => {
                render(bytes, out).map_err(|_| "custom formatter failed".to_string())?;
                false
            }
            _ => return Err(type_error(spec, "custom argument")),
        },
    };
    spec.pad(out, start, numeric);
    Ok(())
}

fn write_fmt(out: &mut String, args: fmt::Arguments<'_>) -> Result<(), String> {
    out.write_fmt(args).map_err(|_| "formatter error".to_string())
}

fn write_integer(spec: &FormatSpec, negative: bool, magnitude: u128, out: &mut String) -> Result<(), String> {
    if spec.precision.is_some() {
        return Err("precision is not allowed for integers".to_string());
    }
    if spec.ty == FormatType::Char {
        let c = u32::try_from(magnitude)
            .ok()
            .filter(|_| !negative)
            .and_then(char::from_u32)
            .ok_or_else(|| "integer is not a valid char".to_string())?;
        out.push(c);
        return Ok(());
    }

    if negative {
        out.push('-');
    } else if spec.plus {
        out.push('+');
    }
    match spec.ty {
        FormatType::Default | FormatType::Decimal | FormatType::Debug => {
            write_fmt(out, format_args!("{}", magnitude))
        }
        FormatType::LowerHex => {
            if spec.alternate {
                out.push_str("0x");
            }
            write_fmt(out, format_args!("{:x}", magnitude))
        }
        FormatType::UpperHex => {
            if spec.alternate {
                out.push_str("0x");
            }
            write_fmt(out, format_args!("{:X}", magnitude))
        }
        FormatType::Octal => {
            if spec.alternate {
                out.push_str("0o");
            }
            write_fmt(out, format_args!("{:o}", magnitude))
        }
        FormatType::Binary => {
            if spec.alternate {
                out.push_str("0b");
            }
            write_fmt(out, format_args!("{:b}", magnitude))
        }
        _ => Err(type_error(spec, "integer")),
    }
}

fn write_float<T>(spec: &FormatSpec, v: T, out: &mut String) -> Result<(), String>
where
    T: fmt::Display + fmt::Debug + fmt::LowerExp + fmt::UpperExp + Copy,
{
    let start = out.len();
    match (spec.ty, spec.precision) {
        (FormatType::Default | FormatType::Fixed, None) => write_fmt(out, format_args!("{}", v))?,
        (FormatType::Default | FormatType::Fixed, Some(p)) => {
            write_fmt(out, format_args!("{:.*}", p, v))?
        }
        (FormatType::LowerExp, None) => write_fmt(out, format_args!("{:e}", v))?,
        (FormatType::LowerExp, Some(p)) => write_fmt(out, format_args!("{:.*e}", p, v))?,
        (FormatType::UpperExp, None) => write_fmt(out, format_args!("{:E}", v))?,
        (FormatType::UpperExp, Some(p)) => write_fmt(out, format_args!("{:.*E}", p, v))?,
        (FormatType::Debug, _) => write_fmt(out, format_args!("{:?}", v))?,
        _ => return Err(type_error(spec, "float")),
    }
    if spec.plus && !out[start..].starts_with('-') && !out[start..].starts_with("NaN") {
        out.insert(start, '+');
    }
    Ok(())
}
