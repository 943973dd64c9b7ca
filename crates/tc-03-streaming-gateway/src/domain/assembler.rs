//! Reassembly of text payloads delivered in parts.

use crate::error::StreamingError;

#[derive(Debug)]
pub struct FrameAssembler {
    buffer: String,
    max_size: usize,
    /// Set while the remaining parts of an oversized payload are skipped.
    discarding: bool,
}

impl FrameAssembler {
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: String::new(),
            max_size,
            discarding: false,
        }
    }

    /// Feed one part. Returns the complete payload once `is_final` is seen.
    ///
    /// An oversized payload is reported once; its remaining parts are
    /// swallowed so the next payload starts clean.
    pub fn push(&mut self, part: &str, is_final: bool) -> Result<Option<String>, StreamingError> {
        if self.discarding {
            self.discarding = !is_final;
            return Ok(None);
        }

        let size = self.buffer.len() + part.len();
        if size > self.max_size {
            self.buffer.clear();
            self.discarding = !is_final;
            return Err(StreamingError::MessageTooLarge {
                size,
                max: self.max_size,
            });
        }

        self.buffer.push_str(part);
        if is_final {
            Ok(Some(std::mem::take(&mut self.buffer)))
        } else {
            Ok(None)
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.buffer.is_empty() || self.discarding
    }
}
