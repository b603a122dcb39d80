use crate::error::EngineError;
use bytes::Bytes;

/// The result of a minification: an owned buffer and the length of its valid
/// prefix.
///
/// When the engine writes its output back into the caller's input buffer,
/// the output is never longer than the input, so only the first
/// [`valid_len`](Self::valid_len) bytes are meaningful. The remainder is stale
/// input and is never exposed through this type.
#[derive(Clone, PartialEq, Eq)]
pub struct Output {
    buffer: Vec<u8>,
    valid_len: usize,
}

impl Output {
    /// Wraps a freshly allocated output; every byte is valid.
    pub fn owned(buffer: Vec<u8>) -> Self {
        let valid_len = buffer.len();
        Self { buffer, valid_len }
    }

    /// Wraps a reused buffer whose first `valid_len` bytes are the output.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidLength`] if `valid_len` exceeds the
    /// buffer length.
    pub fn reused(buffer: Vec<u8>, valid_len: usize) -> Result<Self, EngineError> {
        if valid_len > buffer.len() {
            return Err(EngineError::InvalidLength {
                valid_len,
                capacity: buffer.len(),
            });
        }
        Ok(Self { buffer, valid_len })
    }

    /// Writes `output` into the front of `buffer` when it fits, falling back
    /// to an owned output otherwise.
    pub fn write_into(mut buffer: Vec<u8>, output: &[u8]) -> Self {
        if output.len() <= buffer.len() {
            buffer[..output.len()].copy_from_slice(output);
            Self {
                buffer,
                valid_len: output.len(),
            }
        } else {
            Self::owned(output.to_vec())
        }
    }

    pub const fn valid_len(&self) -> usize {
        self.valid_len
    }

    pub const fn is_empty(&self) -> bool {
        self.valid_len == 0
    }

    /// Length of the underlying allocation's initialized region, including
    /// any stale tail.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.valid_len]
    }

    /// Truncates to the valid prefix and returns the buffer.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.buffer.truncate(self.valid_len);
        self.buffer
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.into_vec())
    }
}

impl AsRef<[u8]> for Output {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Output> for Bytes {
    fn from(output: Output) -> Self {
        output.into_bytes()
    }
}

impl core::fmt::Debug for Output {
    // Omits the stale tail.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Output")
            .field("valid_len", &self.valid_len)
            .field("buffer_len", &self.buffer.len())
            .finish()
    }
}
