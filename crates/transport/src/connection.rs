// Connection abstraction consumed by the fetch and download workers
// Ordered byte delivery with an explicit end-of-stream, TCP/TLS semantics
// assumed from the implementation underneath

use cappella_core::Result;

/// One open byte stream.
///
/// Dropping a connection closes it; an in-flight read is abandoned by simply
/// not calling `read_chunk` again.
pub trait Connection: Send {
    /// Server-announced content length, if any
    fn content_length(&self) -> Option<u64>;

    /// Read the next chunk into `buf`. Returns the number of bytes read;
    /// zero means end of stream.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Opens connections from resolved locators.
///
/// The scheme of the locator selects the profile (plaintext or TLS); callers
/// never care which one they got.
pub trait Transport: Send + Sync {
    fn open(&self, locator: &str) -> Result<Box<dyn Connection>>;
}
