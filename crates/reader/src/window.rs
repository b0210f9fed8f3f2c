//! Read-ahead window over a backup file.
//!
//! Decoding a row issues many small reads. The window pulls large chunks from
//! disk and serves those reads from memory, refilling only when the bytes
//! left in memory cannot satisfy a request. A request larger than the window
//! grows it; the window never shrinks.
//!
//! Each refill discards the bytes already served. [`ReadWindow::will_discard`]
//! lets a reader act before that happens.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

pub(crate) struct ReadWindow {
    source: Option<File>,
    buffer: Vec<u8>,
    /// Start of unread data
    pos: usize,
    /// End of valid data
    filled: usize,
    eof: bool,
    /// Bytes served since the file was attached
    consumed: u64,
}

impl ReadWindow {
    pub(crate) fn new(size: usize) -> Self {
        ReadWindow {
            source: None,
            buffer: vec![0u8; size.max(1)],
            pos: 0,
            filled: 0,
            eof: false,
            consumed: 0,
        }
    }

    /// Attach a freshly opened file, discarding any buffered data
    pub(crate) fn attach(&mut self, file: File) {
        self.source = Some(file);
        self.pos = 0;
        self.filled = 0;
        self.eof = false;
        self.consumed = 0;
    }

    /// Close the attached file
    pub(crate) fn detach(&mut self) {
        self.source = None;
        self.pos = 0;
        self.filled = 0;
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.source.is_some()
    }

    pub(crate) fn data_left(&self) -> usize {
        self.filled - self.pos
    }

    pub(crate) fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Whether serving `want` more bytes will discard bytes already served
    pub(crate) fn will_discard(&self, want: usize) -> bool {
        self.pos > 0 && self.data_left() < want && !self.eof
    }

    /// Grow the window to hold at least `bytes`. Never shrinks.
    pub(crate) fn create_buffer(&mut self, bytes: usize) {
        if bytes > self.buffer.len() {
            self.buffer.resize(bytes.next_power_of_two(), 0);
        }
    }

    fn refill(&mut self, want: usize) -> io::Result<()> {
        if self.pos > 0 {
            self.buffer.copy_within(self.pos..self.filled, 0);
            self.filled -= self.pos;
            self.pos = 0;
        }
        self.create_buffer(want);

        let source = self
            .source
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no file attached"))?;

        while self.filled < self.buffer.len() {
            match source.read(&mut self.buffer[self.filled..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Serve up to `nmemb` members of `size` bytes from the window.
    ///
    /// Returns fewer members only at end of file. The returned bytes stay
    /// valid until the next call.
    pub(crate) fn get_buffer_ptr(&mut self, size: usize, nmemb: usize) -> io::Result<&[u8]> {
        debug_assert!(size > 0);
        let want = size * nmemb;
        if self.data_left() < want && !self.eof {
            self.refill(want)?;
        }
        let avail = want.min(self.data_left()) / size * size;
        let start = self.pos;
        self.pos += avail;
        self.consumed += avail as u64;
        Ok(&self.buffer[start..start + avail])
    }

    /// Copy whole members of `size` bytes into `out`; returns members copied
    pub(crate) fn fread_buffer(&mut self, out: &mut [u8], size: usize) -> io::Result<usize> {
        let nmemb = out.len() / size;
        let served = self.get_buffer_ptr(size, nmemb)?;
        let n = served.len();
        out[..n].copy_from_slice(served);
        Ok(n / size)
    }

    /// Read the last `n` bytes of the file without moving the read position.
    ///
    /// Returns `None` if the file is shorter than `n`.
    pub(crate) fn read_tail(&mut self, n: usize) -> io::Result<Option<Vec<u8>>> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no file attached"))?;
        let current = source.stream_position()?;
        let len = source.seek(SeekFrom::End(0))?;
        let result = if len < n as u64 {
            None
        } else {
            source.seek(SeekFrom::Start(len - n as u64))?;
            let mut tail = vec![0u8; n];
            source.read_exact(&mut tail)?;
            Some(tail)
        };
        source.seek(SeekFrom::Start(current))?;
        Ok(result)
    }
}
