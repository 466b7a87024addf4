use tokio::io::{self, AsyncRead, AsyncReadExt};

const CHUNK: usize = 4096;

/// Bounded capture of one output pipe
///
/// Keeps at most `limit` bytes and keeps draining afterward, so the writer
/// never blocks on a full pipe while the excess is thrown away.
pub struct Capture<R> {
    reader: R,
    buffer: Vec<u8>,
    limit: usize,
    discarded: u64,
    eof: bool,
}

impl<R: AsyncRead + Unpin> Capture<R> {
    pub fn new(reader: R, limit: usize) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(limit.min(CHUNK)),
            limit,
            discarded: 0,
            eof: false,
        }
    }
    /// Read until EOF
    ///
    /// Cancel safe: bytes are accounted as soon as a read returns, so dropping
    /// this future loses nothing already read.
    pub async fn drain(&mut self) -> io::Result<()> {
        let mut chunk = [0; CHUNK];
        while !self.eof {
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                self.eof = true;
                break;
            }
            let keep = (self.limit - self.buffer.len()).min(n);
            self.buffer.extend_from_slice(&chunk[..keep]);
            self.discarded += (n - keep) as u64;
        }
        Ok(())
    }
    /// Whether the buffer reached the limit
    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.limit
    }
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}
