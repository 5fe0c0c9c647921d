//! Argument encoding for deferred rendering
//!
//! A log call serializes its arguments into the calling thread's scratch
//! buffer as tagged little-endian values. Value types are copied; strings
//! are copied unless the caller wraps them in [`StaticStr`], which stores
//! only the pointer and length of a `'static` string. [`Custom`] lets a
//! type pick its own byte layout plus the function that renders it later.
//!
//! Record layout:
//!
//! ```text
//! [timestamp u64][call site u32][level u8][arg count u8][args...]
//! ```

use super::call_site::CallSiteId;
use super::log_level::LogLevel;
use std::fmt;

/// Size in bytes of the fixed record prefix
pub const RECORD_HEADER_LEN: usize = 14;

/// Maximum number of arguments per log call
pub const MAX_ARGS: usize = u8::MAX as usize;

mod tag {
    pub const I8: u8 = 1;
    pub const I16: u8 = 2;
    pub const I32: u8 = 3;
    pub const I64: u8 = 4;
    pub const U8: u8 = 5;
    pub const U16: u8 = 6;
    pub const U32: u8 = 7;
    pub const U64: u8 = 8;
    pub const F32: u8 = 9;
    pub const F64: u8 = 10;
    pub const BOOL: u8 = 11;
    pub const CHAR: u8 = 12;
    pub const STR: u8 = 13;
    pub const STATIC_STR: u8 = 14;
    pub const PTR: u8 = 15;
    pub const CUSTOM: u8 = 16;
    pub const I128: u8 = 17;
    pub const U128: u8 = 18;
}

/// Render function stored alongside [`Custom`] argument bytes
pub type RenderFn = fn(&[u8], &mut String) -> fmt::Result;

/// A type with its own deferred encoding
///
/// `encode` runs on the logging thread and should only copy bytes;
/// `render` runs later on the draining thread.
///
/// # Example
///
/// ```
/// use deferred_logger::Loggable;
/// use std::fmt::Write;
///
/// struct Price { ticks: i64 }
///
/// impl Loggable for Price {
///     fn encode(&self, out: &mut Vec<u8>) {
///         out.extend_from_slice(&self.ticks.to_le_bytes());
///     }
///
///     fn render(bytes: &[u8], out: &mut String) -> std::fmt::Result {
///         let mut raw = [0u8; 8];
///         raw.copy_from_slice(&bytes[..8]);
///         let ticks = i64::from_le_bytes(raw);
///         write!(out, "{}.{:02}", ticks / 100, ticks % 100)
///     }
/// }
/// ```
pub trait Loggable {
    fn encode(&self, out: &mut Vec<u8>);

    fn render(bytes: &[u8], out: &mut String) -> fmt::Result
    where
        Self: Sized;
}

/// Anything that can be passed as a log argument
pub trait LogArg {
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>);
}

/// A string with a caller-guaranteed `'static` lifetime, stored by reference
#[derive(Debug, Clone, Copy)]
pub struct StaticStr(pub &'static str);

/// Wrapper routing a [`Loggable`] value through its own encoder
pub struct Custom<'a, T: Loggable>(pub &'a T);

/// Writes tagged arguments into a record buffer
pub struct ArgEncoder<'a> {
    buf: &'a mut Vec<u8>,
    count: usize,
}

impl<'a> ArgEncoder<'a> {
    /// Start a record in `buf`, discarding whatever it held
    pub fn begin(buf: &'a mut Vec<u8>, timestamp_ns: u64, site: CallSiteId, level: LogLevel) -> Self {
        buf.clear();
        buf.extend_from_slice(&timestamp_ns.to_le_bytes());
        buf.extend_from_slice(&site.as_u32().to_le_bytes());
        buf.push(level.as_u8());
        buf.push(0);
        Self { buf, count: 0 }
    }

    #[inline]
    pub fn push<T: LogArg + ?Sized>(&mut self, arg: &T) {
        arg.encode_arg(self);
    }

    /// Number of arguments written so far
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Patch the argument count; returns `false` if there were too many
    pub fn finish(self) -> bool {
        if self.count > MAX_ARGS {
            return false;
        }
        self.buf[RECORD_HEADER_LEN - 1] = self.count as u8;
        true
    }

    #[inline]
    fn put(&mut self, tag: u8, bytes: &[u8]) {
        self.count += 1;
        self.buf.push(tag);
        self.buf.extend_from_slice(bytes);
    }

    #[inline]
    fn put_str(&mut self, s: &str) {
        self.count += 1;
        self.buf.push(tag::STR);
        self.buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(s.as_bytes());
    }
}

macro_rules! impl_log_arg_num {
    ($($ty:ty => $tag:expr),* $(,)?) => {
        $(
            impl LogArg for $ty {
                #[inline]
                fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
                    enc.put($tag, &self.to_le_bytes());
                }
            }
        )*
    };
}

impl_log_arg_num! {
    i8 => tag::I8,
    i16 => tag::I16,
    i32 => tag::I32,
    i64 => tag::I64,
    i128 => tag::I128,
    u8 => tag::U8,
    u16 => tag::U16,
    u32 => tag::U32,
    u64 => tag::U64,
    u128 => tag::U128,
    f32 => tag::F32,
    f64 => tag::F64,
}

impl LogArg for isize {
    #[inline]
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
        enc.put(tag::I64, &(*self as i64).to_le_bytes());
    }
}

impl LogArg for usize {
    #[inline]
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
        enc.put(tag::U64, &(*self as u64).to_le_bytes());
    }
}

impl LogArg for bool {
    #[inline]
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
        enc.put(tag::BOOL, &[*self as u8]);
    }
}

impl LogArg for char {
    #[inline]
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
        enc.put(tag::CHAR, &(*self as u32).to_le_bytes());
    }
}

impl LogArg for str {
    #[inline]
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
        enc.put_str(self);
    }
}

impl LogArg for String {
    #[inline]
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
        enc.put_str(self);
    }
}

impl<T: LogArg + ?Sized> LogArg for &T {
    #[inline]
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
        (**self).encode_arg(enc);
    }
}

impl<T: LogArg + ?Sized> LogArg for &mut T {
    #[inline]
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
        (**self).encode_arg(enc);
    }
}

impl<T: ?Sized> LogArg for *const T {
    #[inline]
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
        enc.put(tag::PTR, &(self.cast::<()>() as usize as u64).to_le_bytes());
    }
}

impl<T: ?Sized> LogArg for *mut T {
    #[inline]
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
        enc.put(tag::PTR, &(self.cast::<()>() as usize as u64).to_le_bytes());
    }
}

impl LogArg for StaticStr {
    #[inline]
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
        let mut raw = [0u8; 16];
        raw[..8].copy_from_slice(&(self.0.as_ptr() as usize as u64).to_le_bytes());
        raw[8..].copy_from_slice(&(self.0.len() as u64).to_le_bytes());
        enc.put(tag::STATIC_STR, &raw);
    }
}

impl<T: Loggable> LogArg for Custom<'_, T> {
    fn encode_arg(&self, enc: &mut ArgEncoder<'_>) {
        let render: RenderFn = T::render;
        enc.count += 1;
        enc.buf.push(tag::CUSTOM);
        enc.buf.extend_from_slice(&(render as usize as u64).to_le_bytes());
        let len_at = enc.buf.len();
        enc.buf.extend_from_slice(&[0u8; 4]);
        self.0.encode(enc.buf);
        let len = (enc.buf.len() - len_at - 4) as u32;
        enc.buf[len_at..len_at + 4].copy_from_slice(&len.to_le_bytes());
    }
}

/// Why a record could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    UnknownTag(u8),
    InvalidUtf8,
    InvalidChar(u32),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "record truncated"),
            DecodeError::UnknownTag(t) => write!(f, "unknown argument tag {}", t),
            DecodeError::InvalidUtf8 => write!(f, "string argument is not UTF-8"),
            DecodeError::InvalidChar(c) => write!(f, "invalid char value {:#x}", c),
        }
    }
}

/// One decoded argument, borrowing from the record bytes
#[derive(Clone, Copy)]
pub enum ArgValue<'a> {
    Int(i128),
    Uint(u128),
    F32(f32),
    F64(f64),
    Bool(bool),
    Char(char),
    Str(&'a str),
    Ptr(usize),
    Custom { render: RenderFn, bytes: &'a [u8] },
}

impl fmt::Debug for ArgValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(v) => write!(f, "Int({})", v),
            ArgValue::Uint(v) => write!(f, "Uint({})", v),
            ArgValue::F32(v) => write!(f, "F32({})", v),
            ArgValue::F64(v) => write!(f, "F64({})", v),
            ArgValue::Bool(v) => write!(f, "Bool({})", v),
            ArgValue::Char(v) => write!(f, "Char({:?})", v),
            ArgValue::Str(v) => write!(f, "Str({:?})", v),
            ArgValue::Ptr(v) => write!(f, "Ptr({:#x})", v),
            ArgValue::Custom { bytes, .. } => write!(f, "Custom({} bytes)", bytes.len()),
        }
    }
}

/// Fixed prefix of an encoded record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub timestamp_ns: u64,
    pub site: CallSiteId,
    pub level: LogLevel,
    pub arg_count: u8,
}

impl RecordHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < RECORD_HEADER_LEN {
            return Err(DecodeError::Truncated);
        }
        Ok(Self {
            timestamp_ns: read_u64(bytes, 0)?,
            site: CallSiteId::from_u32(read_u32(bytes, 8)?),
            level: LogLevel::from_u8(bytes[12]),
            arg_count: bytes[13],
        })
    }

    /// Read only the capture timestamp; used to merge queues by time
    #[inline]
    pub fn peek_timestamp(bytes: &[u8]) -> Option<u64> {
        read_u64(bytes, 0).ok()
    }
}

/// Decode every argument of a record into `out`
pub fn decode_args<'a>(record: &'a [u8], out: &mut Vec<ArgValue<'a>>) -> Result<RecordHeader, DecodeError> {
    let header = RecordHeader::parse(record)?;
    let mut pos = RECORD_HEADER_LEN;
    out.clear();
    for _ in 0..header.arg_count {
        let tag = *record.get(pos).ok_or(DecodeError::Truncated)?;
        pos += 1;
        let value = match tag {
            tag::I8 => ArgValue::Int(take::<1>(record, &mut pos)?[0] as i8 as i128),
            tag::I16 => ArgValue::Int(i16::from_le_bytes(take(record, &mut pos)?) as i128),
            tag::I32 => ArgValue::Int(i32::from_le_bytes(take(record, &mut pos)?) as i128),
            tag::I64 => ArgValue::Int(i64::from_le_bytes(take(record, &mut pos)?) as i128),
            tag::I128 => ArgValue::Int(i128::from_le_bytes(take(record, &mut pos)?)),
            tag::U8 => ArgValue::Uint(take::<1>(record, &mut pos)?[0] as u128),
            tag::U16 => ArgValue::Uint(u16::from_le_bytes(take(record, &mut pos)?) as u128),
            tag::U32 => ArgValue::Uint(u32::from_le_bytes(take(record, &mut pos)?) as u128),
            tag::U64 => ArgValue::Uint(u64::from_le_bytes(take(record, &mut pos)?) as u128),
            tag::U128 => ArgValue::Uint(u128::from_le_bytes(take(record, &mut pos)?)),
            tag::F32 => ArgValue::F32(f32::from_le_bytes(take(record, &mut pos)?)),
            tag::F64 => ArgValue::F64(f64::from_le_bytes(take(record, &mut pos)?)),
            tag::BOOL => ArgValue::Bool(take::<1>(record, &mut pos)?[0] != 0),
            tag::CHAR => {
                let raw = u32::from_le_bytes(take(record, &mut pos)?);
                ArgValue::Char(char::from_u32(raw).ok_or(DecodeError::InvalidChar(raw))?)
            }
            tag::STR => {
                let len = u32::from_le_bytes(take(record, &mut pos)?) as usize;
                let bytes = take_slice(record, &mut pos, len)?;
                ArgValue::Str(std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?)
            }
            tag::STATIC_STR => {
                let ptr = u64::from_le_bytes(take(record, &mut pos)?) as usize;
                let len = u64::from_le_bytes(take(record, &mut pos)?) as usize;
                // SAFETY: written by `StaticStr::encode_arg` in this process from a
                // `&'static str`, so the pointer is valid UTF-8 for `len` bytes forever.
                let s = unsafe {
                    std::str::from_utf8_unchecked(std::slice::from_raw_parts(ptr as *const u8, len))
                };
                ArgValue::Str(s)
            }
            tag::PTR => ArgValue::Ptr(u64::from_le_bytes(take(record, &mut pos)?) as usize),
            tag::CUSTOM => {
                let raw = u64::from_le_bytes(take(record, &mut pos)?) as usize;
                let len = u32::from_le_bytes(take(record, &mut pos)?) as usize;
                let bytes = take_slice(record, &mut pos, len)?;
                // SAFETY: written by `Custom::encode_arg` in this process from a
                // `RenderFn`; records never leave the process that encoded them.
                let render = unsafe { std::mem::transmute::<usize, RenderFn>(raw) };
                ArgValue::Custom { render, bytes }
            }
            other => return Err(DecodeError::UnknownTag(other)),
        };
        out.push(value);
    }
    Ok(header)
}

#[inline]
fn take<const N: usize>(bytes: &[u8], pos: &mut usize) -> Result<[u8; N], DecodeError> {
    let slice = take_slice(bytes, pos, N)?;
    let mut raw = [0u8; N];
    raw.copy_from_slice(slice);
    Ok(raw)
}

#[inline]
fn take_slice<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], DecodeError> {
    let end = pos.checked_add(len).ok_or(DecodeError::Truncated)?;
    let slice = bytes.get(*pos..end).ok_or(DecodeError::Truncated)?;
    *pos = end;
    Ok(slice)
}

fn read_u64(bytes: &[u8], at: usize) -> Result<u64, DecodeError> {
    let mut pos = at;
    take::<8>(bytes, &mut pos).map(u64::from_le_bytes)
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, DecodeError> {
    let mut pos = at;
    take::<4>(bytes, &mut pos).map(u32::from_le_bytes)
}
