//! Page-granular I/O.
//!
//! The [`PageSwapper`] seam is how the page cache reads and writes one
//! file's pages; everything above it is format-agnostic.

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::types::{Result, UmbraError};

/// Per-file, page-granular, synchronous I/O.
///
/// One swapper per mapped file; the cache never touches byte offsets, only
/// file-local page indexes.
pub trait PageSwapper: Send + Sync + 'static {
    /// Reads one page into `buf`. A page past the end of the file reads as
    /// zeroes (a freshly allocated page).
    fn read_page(&self, page_index: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes one page from `buf`.
    fn write_page(&self, page_index: u64, buf: &[u8]) -> Result<()>;

    /// Forces written pages to stable storage.
    fn sync(&self) -> Result<()> {
        Ok(())
    }

    /// Releases the underlying file.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// [`PageSwapper`] over a regular file using positioned reads and writes.
pub struct FileSwapper {
    file: File,
    page_size: usize,
}

impl FileSwapper {
    /// Opens (creating if absent) the file at `path`.
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file, page_size })
    }

    fn offset(&self, page_index: u64) -> Result<u64> {
        page_index
            .checked_mul(self.page_size as u64)
            .ok_or(UmbraError::Invalid("page offset overflow"))
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, mut off: u64, mut dst: &mut [u8]) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    let mut total = 0;
    while !dst.is_empty() {
        let read = file.read_at(dst, off)?;
        if read == 0 {
            break;
        }
        off += read as u64;
        total += read;
        dst = &mut dst[read..];
    }
    Ok(total)
}

#[cfg(unix)]
fn write_all_at(file: &File, off: u64, src: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(src, off)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut off: u64, mut dst: &mut [u8]) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    let mut total = 0;
    while !dst.is_empty() {
        let read = file.seek_read(dst, off)?;
        if read == 0 {
            break;
        }
        off += read as u64;
        total += read;
        dst = &mut dst[read..];
    }
    Ok(total)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut off: u64, mut src: &[u8]) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !src.is_empty() {
        let written = file.seek_write(src, off)?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "seek_write wrote zero bytes",
            ));
        }
        off += written as u64;
        src = &src[written..];
    }
    Ok(())
}

impl PageSwapper for FileSwapper {
    fn read_page(&self, page_index: u64, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        let off = self.offset(page_index)?;
        let read = read_exact_at(&self.file, off, buf).map_err(UmbraError::from)?;
        // Short reads come from pages beyond the end of the file; those
        // are fresh pages and read as zeroes.
        buf[read..].fill(0);
        Ok(())
    }

    fn write_page(&self, page_index: u64, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        let off = self.offset(page_index)?;
        write_all_at(&self.file, off, buf).map_err(UmbraError::from)
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all().map_err(UmbraError::from)
    }
}
