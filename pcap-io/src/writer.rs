// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! Buffered pcap output.
//!
//! The disk thread hands the writer many small slices (16-byte record
//! headers interleaved with frame payloads); the writer batches them through
//! one large pinned staging buffer so the kernel sees few, large writes.

use std::fs::File;
use std::io::Write as _;
use std::os::fd::AsRawFd;

use mem::{AllocError, PinnedBuffer};
use tracing::debug;

/// Staging buffer size unless the caller says otherwise.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Error type for pcap output failures.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("failed to allocate staging buffer: {0}")]
    Staging(#[source] AllocError),
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("short write: {written} of {expected} bytes")]
    Short { written: usize, expected: usize },
    #[error("close failed: {0}")]
    Close(#[source] std::io::Error),
}

/// A pcap byte sink over an opened file.
pub struct Writer {
    file: File,
    staging: PinnedBuffer,
    filled: usize,
    /// File offset of the first unflushed byte, for write-back hints.
    flushed: u64,
    sync: bool,
}

impl Writer {
    /// Wrap `file`, staging up to `buffer_size` bytes per write syscall.
    ///
    /// `sync` enables an advisory `sync_file_range` write-back hint after
    /// each flush; it smooths dirty-page accumulation on fast disks and is
    /// ignored on failure.
    pub fn new(file: File, buffer_size: usize, sync: bool) -> Result<Writer, WriterError> {
        let staging = PinnedBuffer::new(buffer_size).map_err(WriterError::Staging)?;
        Ok(Writer {
            file,
            staging,
            filled: 0,
            flushed: 0,
            sync,
        })
    }

    /// Append `data` to the stream, flushing whenever the staging buffer
    /// fills.
    pub fn write(&mut self, mut data: &[u8]) -> Result<(), WriterError> {
        while !data.is_empty() {
            let room = self.staging.len() - self.filled;
            let n = data.len().min(room);
            self.staging[self.filled..self.filled + n].copy_from_slice(&data[..n]);
            self.filled += n;
            data = &data[n..];
            if self.filled == self.staging.len() {
                self.flush()?;
            }
        }
        Ok(())
    }

    /// Emit the staged bytes with a single write call.
    pub fn flush(&mut self) -> Result<(), WriterError> {
        if self.filled == 0 {
            return Ok(());
        }
        let written = self
            .file
            .write(&self.staging[..self.filled])
            .map_err(WriterError::Write)?;
        if written != self.filled {
            return Err(WriterError::Short {
                written,
                expected: self.filled,
            });
        }
        if self.sync {
            self.hint_writeback(self.flushed, written as u64);
        }
        self.flushed += written as u64;
        self.filled = 0;
        Ok(())
    }

    /// Flush and close, surfacing the close result rather than dropping it.
    pub fn close(mut self) -> Result<(), WriterError> {
        self.flush()?;
        debug!("closing pcap stream after {} bytes", self.flushed);
        let ret = unsafe { libc::close(std::mem::ManuallyDrop::new(self.file).as_raw_fd()) };
        if ret != 0 {
            return Err(WriterError::Close(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Ask the kernel to start write-back of the just-flushed range. Purely
    /// advisory.
    fn hint_writeback(&self, offset: u64, nbytes: u64) {
        let ret = unsafe {
            libc::sync_file_range(
                self.file.as_raw_fd(),
                offset as libc::off64_t,
                nbytes as libc::off64_t,
                libc::SYNC_FILE_RANGE_WRITE,
            )
        };
        if ret != 0 {
            debug!(
                "sync_file_range hint failed: {}",
                std::io::Error::last_os_error()
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;

    fn read_back(file: &mut File) -> Vec<u8> {
        use std::io::Seek;
        file.rewind().unwrap();
        let mut out = Vec::new();
        file.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn small_writes_coalesce_until_flush() {
        let tmp = tempfile::tempfile().unwrap();
        let mut probe = tmp.try_clone().unwrap();
        let mut writer = Writer::new(tmp, 4096, false).unwrap();

        writer.write(b"abc").unwrap();
        writer.write(b"defgh").unwrap();
        assert_eq!(read_back(&mut probe), b"");

        writer.flush().unwrap();
        assert_eq!(read_back(&mut probe), b"abcdefgh");
    }

    #[test]
    fn filling_the_staging_buffer_triggers_a_write() {
        let tmp = tempfile::tempfile().unwrap();
        let mut probe = tmp.try_clone().unwrap();
        let mut writer = Writer::new(tmp, 8, false).unwrap();

        writer.write(b"0123456789ab").unwrap();
        // One full staging buffer hit the file; the tail is still staged.
        assert_eq!(read_back(&mut probe), b"01234567");

        writer.flush().unwrap();
        assert_eq!(read_back(&mut probe), b"0123456789ab");
    }

    #[test]
    fn writes_larger_than_the_buffer_land_whole() {
        let tmp = tempfile::tempfile().unwrap();
        let mut probe = tmp.try_clone().unwrap();
        let mut writer = Writer::new(tmp, 16, false).unwrap();

        let data: Vec<u8> = (0..100u8).collect();
        writer.write(&data).unwrap();
        writer.flush().unwrap();
        assert_eq!(read_back(&mut probe), data);
    }

    #[test]
    fn close_flushes_the_tail() {
        let tmp = tempfile::tempfile().unwrap();
        let mut probe = tmp.try_clone().unwrap();
        let mut writer = Writer::new(tmp, 4096, false).unwrap();

        writer.write(b"tail").unwrap();
        writer.close().unwrap();
        assert_eq!(read_back(&mut probe), b"tail");
    }
}
