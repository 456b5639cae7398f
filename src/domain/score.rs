//! Source documents, notation payloads, and the render request built from them.

use std::fmt;

use bytes::Bytes;

/// Title used when the storage key ends with a separator.
pub const DEFAULT_TITLE: &str = "Sheet Music";

const CONTAINER_SUFFIX: &[u8] = b".mxl";

/// How the stored bytes wrap the notation markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Uncompressed MusicXML markup.
    Plain,
    /// Compressed MXL (zip) container.
    Container,
}

impl SourceFormat {
    /// Derive the format from the storage key suffix (`.mxl` is a container).
    pub fn from_key(key: &str) -> Self {
        let bytes = key.as_bytes();
        let is_container = bytes.len() >= CONTAINER_SUFFIX.len()
            && bytes[bytes.len() - CONTAINER_SUFFIX.len()..].eq_ignore_ascii_case(CONTAINER_SUFFIX);
        if is_container {
            SourceFormat::Container
        } else {
            SourceFormat::Plain
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::Plain => "plain",
            SourceFormat::Container => "container",
        }
    }
}

/// Raw bytes fetched for one storage key.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub key: String,
    pub bytes: Bytes,
    pub format: SourceFormat,
}

impl SourceDocument {
    pub fn new(key: impl Into<String>, bytes: Bytes) -> Self {
        let key = key.into();
        let format = SourceFormat::from_key(&key);
        Self { key, bytes, format }
    }

    /// Display title derived from the key.
    pub fn title(&self) -> String {
        title_from_key(&self.key)
    }
}

/// Last path segment of `key`, or [`DEFAULT_TITLE`] when that segment is empty.
pub fn title_from_key(key: &str) -> String {
    match key.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ => DEFAULT_TITLE.to_string(),
    }
}

/// Plain notation markup ready to hand to the renderer. Never compressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotationPayload {
    pub markup: Bytes,
    pub title: String,
}

/// Pitch shift in semitones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transpose(i32);

impl Transpose {
    pub const NONE: Transpose = Transpose(0);

    pub fn new(semitones: i32) -> Self {
        Self(semitones)
    }

    /// Coerce a raw query value into a transpose.
    ///
    /// Reads an optional sign followed by the leading decimal digits, after
    /// skipping leading whitespace. Anything that yields no digits becomes zero,
    /// so `"abc"` and `""` are zero and `"5.7"` is five. Values outside the
    /// `i32` range saturate.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::NONE;
        };

        let trimmed = raw.trim_start();
        let (negative, digits) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let mut value: i32 = 0;
        let mut seen_digit = false;
        for byte in digits.bytes().take_while(u8::is_ascii_digit) {
            seen_digit = true;
            let digit = i32::from(byte - b'0');
            value = if negative {
                value.saturating_mul(10).saturating_sub(digit)
            } else {
                value.saturating_mul(10).saturating_add(digit)
            };
        }

        if seen_digit { Self(value) } else { Self::NONE }
    }

    pub fn semitones(self) -> i32 {
        self.0
    }

    pub fn is_identity(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Transpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the render document needs for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub payload: NotationPayload,
    pub transpose: Transpose,
}

impl RenderRequest {
    pub fn new(payload: NotationPayload, transpose: Transpose) -> Self {
        Self { payload, transpose }
    }

    pub fn title(&self) -> &str {
        &self.payload.title
    }
}
