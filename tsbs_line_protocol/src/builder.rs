//! Typestate [line protocol] builder.
//!
//! [line protocol]: https://questdb.io/docs/reference/api/ilp/overview/
use bytes::BufMut;
use std::{
    fmt::{self, Write as _},
    marker::PhantomData,
};

const COMMA_EQ_SPACE: [char; 3] = [',', '=', ' '];
const COMMA_SPACE: [char; 2] = [',', ' '];

#[doc(hidden)]
#[derive(Clone, Copy, Debug, Default)]
pub struct BeforeMeasurement;
#[doc(hidden)]
#[derive(Clone, Copy, Debug)]
pub struct AfterMeasurement;
#[doc(hidden)]
#[derive(Clone, Copy, Debug)]
pub struct AfterField;
#[doc(hidden)]
#[derive(Clone, Copy, Debug)]
pub struct AfterTimestamp;

/// A statically-typed [line protocol] builder.
///
/// It writes one or more lines of line protocol to a [`bytes::BufMut`]. Symbols (tags) always
/// come before columns (fields), and a line cannot be closed without at least one column:
///
/// ```
/// use tsbs_line_protocol::LineProtocolBuilder;
/// let lp = LineProtocolBuilder::new()
///     .measurement("cpu")
///     .tag("hostname", "host_0")
///     .field("usage_user", 42.0)
///     .timestamp(1451606400000000000)
///     .close_line();
///
/// assert_eq!(lp.build().unwrap(), b"cpu,hostname=host_0 usage_user=42.0 1451606400000000000\n");
/// ```
///
/// Closing a line that has no column yet is a compile-time error:
///
/// ```compile_fail
/// # use tsbs_line_protocol::LineProtocolBuilder;
/// let lp = LineProtocolBuilder::new()
///     .measurement("cpu")
///     .tag("hostname", "host_0")
///     .close_line();
/// ```
///
/// The builder does not check names; [`crate::Buffer`] does that before handing values to it.
/// The first error raised while formatting a value is kept and returned by
/// [`LineProtocolBuilder::build`]; later writes are skipped.
///
/// [line protocol]: https://questdb.io/docs/reference/api/ilp/overview/
#[derive(Debug)]
pub struct LineProtocolBuilder<B, S = BeforeMeasurement>
where
    B: BufMut,
{
    buf: B,
    result: fmt::Result,
    _marker: PhantomData<S>,
}

impl LineProtocolBuilder<Vec<u8>, BeforeMeasurement> {
    /// Creates a new [`LineProtocolBuilder`] with an empty buffer.
    pub fn new() -> Self {
        Self::new_with(vec![])
    }
}

impl<B> LineProtocolBuilder<B, BeforeMeasurement>
where
    B: BufMut,
{
    /// Like `new` but appending to an existing `BufMut`.
    pub fn new_with(buf: B) -> Self {
        Self {
            buf,
            result: Ok(()),
            _marker: PhantomData,
        }
    }

    /// Provide the table name.
    pub fn measurement(self, measurement: &str) -> LineProtocolBuilder<B, AfterMeasurement> {
        let measurement = escape(measurement, COMMA_SPACE);
        self.write(format_args!("{measurement}"))
    }

    /// Finish building and return the inner buffer.
    pub fn build(self) -> Result<B, fmt::Error> {
        self.result.map(|()| self.buf)
    }
}

impl<B> LineProtocolBuilder<B, AfterMeasurement>
where
    B: BufMut,
{
    /// Add a symbol (tag) key and value.
    pub fn tag(self, tag_key: &str, tag_value: &str) -> Self {
        let tag_key = escape(tag_key, COMMA_EQ_SPACE);
        let tag_value = escape(tag_value, COMMA_EQ_SPACE);
        self.write(format_args!(",{tag_key}={tag_value}"))
    }

    /// Add the first column. No symbols can follow.
    pub fn field<F>(self, field_key: &str, field_value: F) -> LineProtocolBuilder<B, AfterField>
    where
        F: FieldValue,
    {
        self.write(format_args!(" {}", format_field(field_key, &field_value)))
    }
}

impl<B> LineProtocolBuilder<B, AfterField>
where
    B: BufMut,
{
    /// Add the second and subsequent columns.
    pub fn field<F: FieldValue>(self, field_key: &str, field_value: F) -> Self {
        self.write(format_args!(",{}", format_field(field_key, &field_value)))
    }

    /// Provide a timestamp in nanoseconds since the epoch.
    pub fn timestamp(self, ts: i64) -> LineProtocolBuilder<B, AfterTimestamp> {
        self.write(format_args!(" {ts}"))
    }

    /// Closing a line is required before starting a new one or finishing the batch.
    pub fn close_line(self) -> LineProtocolBuilder<B, BeforeMeasurement> {
        self.close()
    }
}

impl<B> LineProtocolBuilder<B, AfterTimestamp>
where
    B: BufMut,
{
    /// Closing a line is required before starting a new one or finishing the batch.
    pub fn close_line(self) -> LineProtocolBuilder<B, BeforeMeasurement> {
        self.close()
    }
}

impl<B, S> LineProtocolBuilder<B, S>
where
    B: BufMut,
{
    fn close(self) -> LineProtocolBuilder<B, BeforeMeasurement> {
        self.write(format_args!("\n"))
    }

    fn write<S2>(mut self, args: fmt::Arguments<'_>) -> LineProtocolBuilder<B, S2> {
        if self.result.is_ok() {
            self.result = FmtAdapter(&mut self.buf).write_fmt(args);
        }
        LineProtocolBuilder {
            buf: self.buf,
            result: self.result,
            _marker: PhantomData,
        }
    }
}

struct FmtAdapter<'a, B>(&'a mut B);

impl<B: BufMut> fmt::Write for FmtAdapter<'_, B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.put_slice(s.as_bytes());
        Ok(())
    }
}

// Renders `src`, escaping every character in `special_characters` (and backslash) with a `\`
fn escape<const N: usize>(src: &str, special_characters: [char; N]) -> Escaped<'_, N> {
    Escaped {
        src,
        special_characters,
    }
}

struct Escaped<'a, const N: usize> {
    src: &'a str,
    special_characters: [char; N],
}

impl<const N: usize> fmt::Display for Escaped<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ch in self.src.chars() {
            if self.special_characters.contains(&ch) || ch == '\\' {
                f.write_char('\\')?;
            }
            f.write_char(ch)?;
        }
        Ok(())
    }
}

fn format_field<'a, F>(field_key: &'a str, field_value: &'a F) -> impl fmt::Display + 'a
where
    F: FieldValue,
{
    FormattedField {
        field_key,
        field_value,
    }
}

struct FormattedField<'a, F>
where
    F: FieldValue,
{
    field_key: &'a str,
    field_value: &'a F,
}

impl<F> fmt::Display for FormattedField<'_, F>
where
    F: FieldValue,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=", escape(self.field_key, COMMA_EQ_SPACE))?;
        self.field_value.fmt(f)
    }
}

/// Implemented by the column value types the builder can write.
pub trait FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl FieldValue for f64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // integral doubles keep a decimal point so the server does not see an integer
        if self.is_finite() && self.fract() == 0.0 {
            write!(f, "{self}.0")
        } else {
            write!(f, "{self}")
        }
    }
}

impl FieldValue for i64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}i")
    }
}
