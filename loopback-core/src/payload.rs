//! Substitute payloads served in place of intercepted resources
//!
//! A payload is redirected to as a `data:` URL, so the browser never
//! contacts the original server.

use crate::error::InterceptorError;
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;

/// Default MIME type of generated script payloads
pub const SCRIPT_MIME: &str = "text/javascript";

/// Width of one quoted chunk in the pretty-printed form
const PRETTY_CHUNK_WIDTH: usize = 150;

/// Fixed replacement content
#[derive(Clone, PartialEq, Eq)]
pub struct Payload {
    mime_type: String,
    bytes: Vec<u8>,
    data_url: String,
}

impl Payload {
    /// Build a payload from raw bytes
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let mime_type = mime_type.into();
        let bytes = bytes.into();
        let data_url = format!("data:{};base64,{}", mime_type, STANDARD.encode(&bytes));
        Self {
            mime_type,
            bytes,
            data_url,
        }
    }

    /// Parse an already encoded `data:` URL
    ///
    /// Both base64 (`data:text/javascript;base64,...`) and plain
    /// (`data:text/plain,hello`) forms are accepted.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| InterceptorError::Payload(format!("not a data URL: {}", truncate(url))))?;
        let (meta, data) = rest
            .split_once(',')
            .ok_or_else(|| InterceptorError::Payload("data URL has no ',' separator".to_string()))?;

        let (mime_type, is_base64) = match meta.strip_suffix(";base64") {
            Some(mime) => (mime, true),
            None => (meta, false),
        };
        let mime_type = if mime_type.is_empty() {
            "text/plain"
        } else {
            mime_type
        };

        let bytes = if is_base64 {
            STANDARD
                .decode(data)
                .map_err(|e| InterceptorError::Payload(format!("invalid base64 payload: {}", e)))?
        } else {
            data.as_bytes().to_vec()
        };

        Ok(Self::new(mime_type, bytes))
    }

    /// Generate a script payload from function source.
    ///
    /// The source is wrapped as an immediately invoked function, each line
    /// is trimmed, whole-line `//` comments are dropped and the remaining
    /// lines are joined without separators.
    pub fn from_script(source: &str) -> Self {
        Self::from_script_with_mime(source, SCRIPT_MIME)
    }

    pub fn from_script_with_mime(source: &str, mime_type: &str) -> Self {
        let wrapped = format!("({})();", source);
        let minified: String = wrapped
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.starts_with("//"))
            .collect();
        Self::new(mime_type, minified.into_bytes())
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The redirect target for this payload
    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// Render the data URL as quoted 150-character chunks, one per line,
    /// ready to paste into a rule catalog.
    pub fn pretty_print(&self) -> String {
        let mut output = String::new();
        let mut rest = self.data_url.as_str();
        while !rest.is_empty() {
            let split = rest
                .char_indices()
                .nth(PRETTY_CHUNK_WIDTH)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            let (chunk, tail) = rest.split_at(split);
            output.push_str(&format!("\"{}\" +\n", chunk));
            rest = tail;
        }
        output
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(40) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
