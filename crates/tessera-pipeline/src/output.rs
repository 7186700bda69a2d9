//! Output sinks for streamed artifacts.

use std::io;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::types::Format;

/// A destination that receives a content type followed by a body.
///
/// The content type is always announced before the first body byte.
pub trait OutputSink {
    /// Announce the body's content type.
    fn set_content_type(&mut self, content_type: &str);

    /// Append body bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Collects the content type and body in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferSink {
    /// The last announced content type.
    pub content_type: Option<String>,
    /// Everything written so far.
    pub body: Vec<u8>,
}

impl BufferSink {
    /// An empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputSink for BufferSink {
    fn set_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_owned());
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.body.extend_from_slice(bytes);
        Ok(())
    }
}

/// Render encoded bytes as a `data:` URI with the format's MIME type.
#[must_use]
pub fn data_uri(format: Format, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(bytes))
}
