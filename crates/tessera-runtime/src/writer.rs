use std::fmt;

use crate::charset::Charset;
use crate::error::RenderError;

/// Output sink seen by generated code and tag handlers.
pub trait JspWriter: Send {
    fn write_str(&mut self, text: &str) -> Result<(), RenderError>;

    fn write_char(&mut self, ch: char) -> Result<(), RenderError> {
        let mut buf = [0u8; 4];
        self.write_str(ch.encode_utf8(&mut buf))
    }

    fn print(&mut self, value: &dyn fmt::Display) -> Result<(), RenderError> {
        self.write_str(&value.to_string())
    }

    fn newline(&mut self) -> Result<(), RenderError> {
        self.write_str("\n")
    }

    /// Discards buffered output; fails once anything has been flushed.
    fn clear(&mut self) -> Result<(), RenderError>;

    /// Discards buffered output without checking the flushed state.
    fn clear_buffer(&mut self) -> Result<(), RenderError>;

    fn flush(&mut self) -> Result<(), RenderError>;

    fn buffer_size(&self) -> usize;

    fn remaining(&self) -> usize;
}

/// Page-level writer buffering in front of the encoded response body.
pub struct PageWriter {
    buffer: String,
    buffer_size: usize,
    auto_flush: bool,
    flushed: bool,
    charset: Charset,
    sink: Vec<u8>,
}

impl PageWriter {
    pub fn new(buffer_size: usize, auto_flush: bool, charset: Charset) -> Self {
        Self {
            buffer: String::with_capacity(buffer_size),
            buffer_size,
            auto_flush,
            flushed: false,
            charset,
            sink: Vec::new(),
        }
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Writes pre-encoded bytes after any pending buffered text.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), RenderError> {
        self.flush_buffer();
        self.sink.extend_from_slice(bytes);
        self.flushed = true;
        Ok(())
    }

    fn flush_buffer(&mut self) {
        if !self.buffer.is_empty() {
            self.sink.extend(self.charset.encode(&self.buffer));
            self.buffer.clear();
            self.flushed = true;
        }
    }

    pub(crate) fn into_body(mut self) -> Vec<u8> {
        self.flush_buffer();
        self.sink
    }
}

impl JspWriter for PageWriter {
    fn write_str(&mut self, text: &str) -> Result<(), RenderError> {
        if self.buffer_size == 0 {
            self.sink.extend(self.charset.encode(text));
            self.flushed = true;
            return Ok(());
        }
        if self.buffer.len() + text.len() > self.buffer_size {
            if !self.auto_flush {
                return Err(RenderError::io("page buffer overflow"));
            }
            self.flush_buffer();
            if text.len() > self.buffer_size {
                self.sink.extend(self.charset.encode(text));
                self.flushed = true;
                return Ok(());
            }
        }
        self.buffer.push_str(text);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        if self.buffer_size == 0 {
            return Err(RenderError::state("cannot clear an unbuffered writer"));
        }
        if self.flushed {
            return Err(RenderError::io(
                "attempt to clear a buffer that has already been flushed",
            ));
        }
        self.buffer.clear();
        Ok(())
    }

    fn clear_buffer(&mut self) -> Result<(), RenderError> {
        if self.buffer_size == 0 {
            return Err(RenderError::state("cannot clear an unbuffered writer"));
        }
        self.buffer.clear();
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RenderError> {
        self.flush_buffer();
        self.flushed = true;
        Ok(())
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn remaining(&self) -> usize {
        self.buffer_size.saturating_sub(self.buffer.len())
    }
}

/// Captured output of a buffered tag body or named attribute.
#[derive(Debug, Default)]
pub struct BodyContent {
    text: String,
}

impl BodyContent {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn clear_body(&mut self) {
        self.text.clear();
    }
}

impl JspWriter for BodyContent {
    fn write_str(&mut self, text: &str) -> Result<(), RenderError> {
        self.text.push_str(text);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        self.text.clear();
        Ok(())
    }

    fn clear_buffer(&mut self) -> Result<(), RenderError> {
        self.text.clear();
        Ok(())
    }

    fn flush(&mut self) -> Result<(), RenderError> {
        Err(RenderError::io("body content cannot be flushed"))
    }

    fn buffer_size(&self) -> usize {
        self.text.capacity()
    }

    fn remaining(&self) -> usize {
        self.text.capacity() - self.text.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_after_flush_fails() {
        let mut out = PageWriter::new(16, true, Charset::Utf8);
        out.write_str("abc").unwrap();
        out.clear().unwrap();
        out.write_str("def").unwrap();
        out.flush().unwrap();
        assert!(matches!(out.clear(), Err(RenderError::Io(_))));
        assert_eq!(out.into_body(), b"def");
    }

    #[test]
    fn overflow_without_auto_flush_is_an_error() {
        let mut out = PageWriter::new(4, false, Charset::Utf8);
        out.write_str("abcd").unwrap();
        assert!(out.write_str("e").is_err());
    }

    #[test]
    fn auto_flush_preserves_order() {
        let mut out = PageWriter::new(4, true, Charset::Utf8);
        out.write_str("ab").unwrap();
        out.write_str("cdef").unwrap();
        out.write_str("g").unwrap();
        assert!(out.is_flushed());
        assert_eq!(out.into_body(), b"abcdefg");
    }
}
