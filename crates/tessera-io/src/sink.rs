//! CGI-style streamed output.

use std::io::{self, Write};

use tessera_pipeline::OutputSink;

/// Writes a `Content-Type` header block before the first body bytes.
///
/// A sink that never receives a content type writes the body bare.
#[derive(Debug)]
pub struct CgiSink<W: Write> {
    writer: W,
    content_type: Option<String>,
    started: bool,
}

impl<W: Write> CgiSink<W> {
    /// Wrap `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer,
            content_type: None,
            started: false,
        }
    }

    /// Flush and return the writer.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> OutputSink for CgiSink<W> {
    fn set_content_type(&mut self, content_type: &str) {
        if !self.started {
            self.content_type = Some(content_type.to_owned());
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.started {
            self.started = true;
            if let Some(content_type) = self.content_type.take() {
                write!(self.writer, "Content-Type: {content_type}\r\n\r\n")?;
            }
        }
        self.writer.write_all(bytes)
    }
}
