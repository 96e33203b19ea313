//! I/O helpers shared by the builder and the loader

use crate::error::{Result, SealError};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::warn;

/// Total length of a seekable source. Leaves the cursor at the end.
pub fn source_len<R: Seek + ?Sized>(source: &mut R) -> Result<u64> {
    Ok(source.seek(SeekFrom::End(0))?)
}

/// Positioned read of exactly `length` bytes at `offset`
pub fn read_at<R: Read + Seek + ?Sized>(
    source: &mut R,
    offset: u64,
    length: u64,
) -> Result<Vec<u8>> {
    let length = usize::try_from(length).map_err(|_| {
        SealError::malformed(format!("leaf length {length} does not fit in memory"))
    })?;

    source.seek(SeekFrom::Start(offset))?;
    let mut buffer = vec![0u8; length];
    source.read_exact(&mut buffer).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            SealError::malformed(format!("source ended inside {length} bytes at {offset}"))
        }
        _ => SealError::Io(e),
    })?;

    Ok(buffer)
}

/// SHA-256 of the first `length` bytes of `source`
pub fn hash_prefix<R: Read + Seek + ?Sized>(source: &mut R, length: u64) -> Result<[u8; 32]> {
    source.seek(SeekFrom::Start(0))?;

    let mut hasher = Sha256::new();
    let copied = io::copy(&mut source.take(length), &mut hasher)?;
    if copied != length {
        return Err(SealError::malformed(format!(
            "expected {length} signed bytes, source had {copied}"
        )));
    }

    Ok(hasher.finalize().into())
}

/// Writer that hashes everything passing through it
///
/// The builder writes the whole signed prefix through one of these so the
/// signature can be produced without buffering the archive.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        HashingWriter {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Return the inner writer, the digest of everything written and the byte count
    pub fn finish(self) -> (W, [u8; 32], u64) {
        (self.inner, self.hasher.finalize().into(), self.written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Write a file through a temporary sibling, moving it over `path` only
/// once `write` has succeeded
///
/// On failure the temporary is removed and whatever was at `path` is left
/// untouched, including an input that is also being read by `write`.
pub fn write_atomically<T, F>(path: &Path, write: F) -> Result<T>
where
    F: FnOnce(&mut File) -> Result<T>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    let value = write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;

    temp.persist(path).map_err(|e| {
        warn!(path = %path.display(), error = %e.error, "failed to move archive into place");
        SealError::Io(e.error)
    })?;
    Ok(value)
}
