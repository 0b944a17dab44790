// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Syslog RFC 5424 line encoder.
//!
//! Console lines are turned into
//!
//! ```text
//! <PRI>1 - HOSTNAME APP-NAME TASK - - MSG
//! ```
//!
//! TIMESTAMP, MSGID and STRUCTURED-DATA are always the nil value `-`; the
//! originating task label fills the PROCID slot. The field order is what
//! collectors already parse, so it must not change.

use crate::error::EncodeError;
use crate::severity::{Severity, SyslogFacility};
use std::collections::TryReserveError;
use std::fmt::{self, Write};

/// RFC 5424 nil value.
pub const NILVALUE: &str = "-";

/// Bytes reserved beyond header, task and payload (`<PRI>` plus separators).
const RECORD_OVERHEAD: usize = 16;

/// Capacity of the allocation-free fallback record.
pub const FALLBACK_LEN: usize = crate::buffer::MAX_ENTRY_LEN + 64;

/// Fixed-capacity, stack-allocated text buffer.
///
/// Writes past the capacity are truncated on a char boundary, so the
/// contents are always valid UTF-8.
pub struct LineBuf<const N: usize> {
    buf: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> LineBuf<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            truncated: false,
        }
    }

    pub fn as_str(&self) -> &str {
        // Only whole chars are ever copied in.
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if some write did not fit.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Drop trailing line terminators.
    pub fn trim_newlines(&mut self) {
        while self.len > 0 && matches!(self.buf[self.len - 1], b'\n' | b'\r') {
            self.len -= 1;
        }
    }

    /// End with exactly one `\n`, giving up the last char if full.
    pub fn terminate_line(&mut self) {
        if N == 0 {
            return;
        }
        self.trim_newlines();
        if self.len == N {
            let mut end = self.len - 1;
            while end > 0 && (self.buf[end] & 0xc0) == 0x80 {
                end -= 1;
            }
            self.len = end;
            self.truncated = true;
        }
        self.buf[self.len] = b'\n';
        self.len += 1;
    }
}

impl<const N: usize> Default for LineBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Write for LineBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = N - self.len;
        let mut take = s.len().min(remaining);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        if take < s.len() {
            self.truncated = true;
        }
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

impl<const N: usize> fmt::Debug for LineBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LineBuf").field(&self.as_str()).finish()
    }
}

/// Display adapter that skips ANSI `ESC [ ... m` sequences.
///
/// An unterminated sequence swallows the rest of the text.
pub struct StripAnsi<'a>(pub &'a str);

impl<'a> StripAnsi<'a> {
    /// Text runs between the escape sequences.
    pub fn segments(&self) -> impl Iterator<Item = &'a str> {
        let mut rest = Some(self.0);
        std::iter::from_fn(move || {
            let text = rest?;
            match text.find("\x1b[") {
                Some(pos) => {
                    let seq = &text[pos + 2..];
                    rest = Some(seq.find('m').map_or("", |end| &seq[end + 1..]));
                    Some(&text[..pos])
                }
                None => {
                    rest = None;
                    Some(text)
                }
            }
        })
    }
}

impl fmt::Display for StripAnsi<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.segments().try_for_each(|segment| f.write_str(segment))
    }
}

/// Remove ANSI color sequences and trailing newlines.
pub fn clean_line(raw: &str) -> String {
    let mut line = StripAnsi(raw).to_string();
    let kept = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(kept);
    line
}

/// Severity of a raw line, judged on its first cleaned bytes.
fn severity_of_raw(raw: &str) -> Severity {
    let mut head: LineBuf<4> = LineBuf::new();
    let _ = write!(head, "{}", StripAnsi(raw));
    Severity::of_line(head.as_str())
}

#[cfg(test)]
thread_local! {
    static FAIL_RESERVE: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

fn reserve(out: &mut Vec<u8>, needed: usize) -> Result<(), TryReserveError> {
    #[cfg(test)]
    if FAIL_RESERVE.with(std::cell::Cell::get) {
        // Always a capacity overflow
        return Vec::<u8>::new().try_reserve_exact(usize::MAX);
    }
    out.try_reserve_exact(needed)
}

/// Writes a header field, replacing bytes RFC 5424 does not allow there.
struct HeaderField<'a>(Option<&'a str>);

impl fmt::Display for HeaderField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.filter(|s| !s.is_empty()) {
            None => f.write_str(NILVALUE),
            Some(value) => {
                for c in value.chars() {
                    f.write_char(if c.is_ascii_graphic() { c } else { '_' })?;
                }
                Ok(())
            }
        }
    }
}

/// Per-installation line template: host and application baked in once.
#[derive(Debug, Clone)]
pub struct Template {
    facility: SyslogFacility,
    /// `"1 - HOST APP "`, everything between `<PRI>` and the task label.
    header: String,
}

impl Template {
    /// Build the template. Absent or empty identifiers become `-`.
    pub fn new(
        hostname: Option<&str>,
        app_name: Option<&str>,
        facility: SyslogFacility,
    ) -> Self {
        let header = format!(
            "1 {} {} {} ",
            NILVALUE,
            HeaderField(hostname),
            HeaderField(app_name)
        );
        Self { facility, header }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn facility(&self) -> SyslogFacility {
        self.facility
    }

    /// Encode one console line.
    ///
    /// The whole record is reserved up front, with the raw length as a bound
    /// on the cleaned payload; nothing else touches the heap.
    pub fn encode(&self, raw: &str, task: Option<&str>) -> Result<Vec<u8>, EncodeError> {
        let pri = self.facility.priority(severity_of_raw(raw));
        let task = task.filter(|t| !t.is_empty());

        let task_len = task.map_or(NILVALUE.len(), str::len);
        let needed = self.header.len() + task_len + raw.len() + RECORD_OVERHEAD;
        let mut out = Vec::new();
        reserve(&mut out, needed).map_err(|source| EncodeError::Alloc { needed, source })?;

        out.push(b'<');
        push_decimal(&mut out, pri);
        out.push(b'>');
        out.extend_from_slice(self.header.as_bytes());
        match task {
            Some(task) => out.extend(
                task.bytes()
                    .map(|b| if b.is_ascii_graphic() { b } else { b'_' }),
            ),
            None => out.extend_from_slice(NILVALUE.as_bytes()),
        }
        out.extend_from_slice(b" - - ");

        let payload_start = out.len();
        for segment in StripAnsi(raw).segments() {
            out.extend_from_slice(segment.as_bytes());
        }
        while out.len() > payload_start && matches!(out.last(), Some(b'\n' | b'\r')) {
            out.pop();
        }
        Ok(out)
    }

    /// Minimal fixed-format record that needs no heap memory.
    ///
    /// Host and application are replaced by `-`; an oversized payload is cut.
    pub fn encode_fallback(&self, raw: &str, task: Option<&str>) -> LineBuf<FALLBACK_LEN> {
        let mut payload: LineBuf<FALLBACK_LEN> = LineBuf::new();
        let _ = write!(payload, "{}", StripAnsi(raw));
        payload.trim_newlines();

        let pri = self.facility.priority(Severity::of_line(payload.as_str()));
        let mut line = LineBuf::new();
        let _ = write!(
            line,
            "<{}>1 - - - {} - - {}",
            pri,
            HeaderField(task),
            payload.as_str()
        );
        line
    }
}

fn push_decimal(out: &mut Vec<u8>, value: u8) {
    if value >= 100 {
        out.push(b'0' + value / 100);
    }
    if value >= 10 {
        out.push(b'0' + (value / 10) % 10);
    }
    out.push(b'0' + value % 10);
}

/// Encode a console line with the default facility (local0).
///
/// Pure and total apart from allocation failure.
pub fn encode(
    raw: &str,
    task: Option<&str>,
    hostname: Option<&str>,
    app_name: Option<&str>,
) -> Result<Vec<u8>, EncodeError> {
    Template::new(hostname, app_name, SyslogFacility::Local0).encode(raw, task)
}

/// How an installation turns records into datagrams.
#[derive(Debug, Clone)]
pub enum LineEncoder {
    /// Structured RFC 5424 lines.
    Syslog(Template),
    /// Console text sent unchanged.
    Raw,
}

/// One encoded datagram.
#[allow(clippy::large_enum_variant)]
pub enum Encoded<'a> {
    Heap(Vec<u8>),
    Fixed(LineBuf<FALLBACK_LEN>),
    Borrowed(&'a [u8]),
}

impl Encoded<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Heap(v) => v,
            Self::Fixed(b) => b.as_bytes(),
            Self::Borrowed(b) => b,
        }
    }
}

impl LineEncoder {
    /// Encode a record, falling back to the fixed format if encoding fails.
    pub fn encode<'a>(&self, raw: &'a str, task: Option<&str>) -> Encoded<'a> {
        match self {
            Self::Raw => Encoded::Borrowed(raw.as_bytes()),
            Self::Syslog(template) => match template.encode(raw, task) {
                Ok(bytes) => Encoded::Heap(bytes),
                Err(_) => Encoded::Fixed(template.encode_fallback(raw, task)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bytes: &[u8]) -> &str {
        std::str::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_error_line_highest_severity() {
        let out = encode("E (123) tag: boom", Some("taskX"), Some("host1"), Some("app1")).unwrap();
        // local0 (16) * 8 + error (3)
        assert_eq!(text(&out), "<131>1 - host1 app1 taskX - - E (123) tag: boom");
    }

    #[test]
    fn test_unmarked_line_default_severity() {
        let out = encode("plain text", Some("main"), Some("h"), Some("a")).unwrap();
        assert!(text(&out).starts_with("<133>1 "));
        assert!(text(&out).ends_with(" - - plain text"));
    }

    #[test]
    fn test_absent_identifiers_are_nil() {
        let out = encode("I (5) x: y\n", None, None, Some("")).unwrap();
        assert_eq!(text(&out), "<134>1 - - - - - - I (5) x: y");
    }

    #[test]
    fn test_ansi_and_newlines_stripped() {
        assert_eq!(clean_line("\x1b[31mred\x1b[0m\n"), "red");
        assert_eq!(clean_line("a\n\n\n"), "a");
        assert_eq!(clean_line("no escapes"), "no escapes");
        assert_eq!(clean_line("cut \x1b[0;3"), "cut ");

        let out = encode("\x1b[31mred\x1b[0m\n", Some("t"), Some("h"), Some("a")).unwrap();
        assert!(text(&out).ends_with(" - - red"));
    }

    #[test]
    fn test_severity_seen_through_color_codes() {
        let out = encode("\x1b[0;33mW (42) net: slow\x1b[0m\n", None, None, None).unwrap();
        // local0 (16) * 8 + warning (4)
        assert!(text(&out).starts_with("<132>"));
    }

    #[test]
    fn test_header_fields_sanitized() {
        let template = Template::new(Some("my host"), Some("app"), SyslogFacility::Local0);
        assert_eq!(template.header(), "1 - my_host app ");
        let out = template.encode("x", Some("worker 1")).unwrap();
        assert_eq!(text(&out), "<133>1 - my_host app worker_1 - - x");
    }

    #[test]
    fn test_fallback_format() {
        let template = Template::new(Some("h"), Some("a"), SyslogFacility::Local0);
        let line = template.encode_fallback("\x1b[31mE (1) t: bad\x1b[0m\n", Some("main"));
        assert_eq!(line.as_str(), "<131>1 - - - main - - E (1) t: bad");
    }

    #[test]
    fn test_allocation_failure_uses_fallback() {
        let template = Template::new(Some("h"), Some("a"), SyslogFacility::Local0);
        FAIL_RESERVE.with(|fail| fail.set(true));
        let result = template.encode("W (7) net: slow\n", Some("main"));
        let encoder = LineEncoder::Syslog(template.clone());
        let encoded = encoder.encode("W (7) net: slow\n", Some("main"));
        FAIL_RESERVE.with(|fail| fail.set(false));

        assert!(matches!(result, Err(EncodeError::Alloc { .. })));
        assert!(matches!(encoded, Encoded::Fixed(_)));
        assert_eq!(text(encoded.as_bytes()), "<132>1 - - - main - - W (7) net: slow");

        let encoded = encoder.encode("W (7) net: slow\n", Some("main"));
        assert!(matches!(encoded, Encoded::Heap(_)));
    }

    #[test]
    fn test_severity_split_by_escape() {
        let out = encode("\x1b[1mE\x1b[0m (3) t: x\r\n", None, None, None).unwrap();
        assert_eq!(text(&out), "<131>1 - - - - - - E (3) t: x");
    }

    #[test]
    fn test_raw_encoder_passthrough() {
        let encoded = LineEncoder::Raw.encode("I (1) raw\n", Some("main"));
        assert_eq!(encoded.as_bytes(), b"I (1) raw\n");
    }

    #[test]
    fn test_line_buf_truncates_on_char_boundary() {
        let mut buf: LineBuf<5> = LineBuf::new();
        let _ = write!(buf, "abcé€");
        assert_eq!(buf.as_str(), "abcé");
        assert!(buf.truncated());
    }

    #[test]
    fn test_terminate_line() {
        let mut buf: LineBuf<8> = LineBuf::new();
        let _ = write!(buf, "ab\n\n");
        buf.terminate_line();
        assert_eq!(buf.as_str(), "ab\n");

        let mut full: LineBuf<4> = LineBuf::new();
        let _ = write!(full, "abé");
        full.terminate_line();
        assert_eq!(full.as_str(), "ab\n");
    }

    #[test]
    fn test_push_decimal() {
        let mut out = Vec::new();
        for value in [0u8, 7, 10, 99, 100, 191] {
            out.clear();
            push_decimal(&mut out, value);
            assert_eq!(text(&out), value.to_string());
        }
    }
}
