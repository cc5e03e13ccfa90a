use super::error::PDFResult;

/// Base trait for random-access byte sources.
///
/// The tokenizer and the cross-reference resolver read the document through
/// this trait, which lets a validation run work the same way over an in-memory
/// buffer or a window of one. Positions are absolute offsets into the
/// underlying document, including for sub-streams.
pub trait BaseStream {
    // ============================================================================
    // Required methods
    // ============================================================================

    /// Returns the total length of the stream in bytes.
    fn length(&self) -> usize;

    /// Returns true if the stream contains no data.
    fn is_empty(&self) -> bool;

    /// Returns the first absolute offset covered by this stream.
    fn start(&self) -> usize;

    /// Returns the current position in the stream.
    fn pos(&self) -> usize;

    /// Sets the current position in the stream.
    fn set_pos(&mut self, pos: usize) -> PDFResult<()>;

    /// Reads and returns a single byte from the stream, advancing the position.
    ///
    /// Returns `UnexpectedEndOfStream` once the end is reached.
    fn get_byte(&mut self) -> PDFResult<u8>;

    /// Reads the specified number of bytes from the stream, advancing the position.
    fn get_bytes(&mut self, length: usize) -> PDFResult<Vec<u8>>;

    /// Returns a range of bytes from the stream without changing the current position.
    ///
    /// # Arguments
    /// * `begin` - Starting byte offset (inclusive)
    /// * `end` - Ending byte offset (exclusive)
    fn get_byte_range(&self, begin: usize, end: usize) -> PDFResult<Vec<u8>>;

    /// Creates a sub-stream sharing this stream's data.
    ///
    /// # Arguments
    /// * `start` - Absolute starting offset for the sub-stream
    /// * `length` - Length of the sub-stream
    fn make_sub_stream(&self, start: usize, length: usize) -> PDFResult<Box<dyn BaseStream>>;

    // ============================================================================
    // Provided methods with default implementations
    // ============================================================================

    /// Returns the absolute offset one past the last byte of the stream.
    fn end(&self) -> usize {
        self.start() + self.length()
    }

    /// Reads a single byte without advancing the position.
    fn peek_byte(&mut self) -> PDFResult<u8> {
        let current_pos = self.pos();
        let byte = self.get_byte()?;
        self.set_pos(current_pos)?;
        Ok(byte)
    }

    /// Returns the bytes from `begin` to the end of the stream.
    fn tail_from(&self, begin: usize) -> PDFResult<Vec<u8>> {
        let end = self.end();
        if begin >= end {
            return Ok(Vec::new());
        }
        self.get_byte_range(begin, end)
    }
}
