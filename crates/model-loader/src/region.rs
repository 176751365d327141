// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Read-only mapped model file with page-granular release.
//!
//! When a model is loaded from a file, constant tensor bytes are copied out
//! of the mapping one tensor at a time. Right after each copy the fully
//! covered pages of that tensor are handed back to the kernel, so the peak
//! resident size stays close to one copy of the weights instead of two.
//!
//! Pages are released with `madvise(MADV_DONTNEED)`, not `munmap`: the
//! address range stays valid, so a later tensor that shares a buffer (or a
//! table stored on the same page) simply faults the file page back in.

use crate::LoadError;
use memmap2::Mmap;
use std::cell::Cell;
use std::fs::File;
use std::ops::Range;
use std::path::Path;

const FALLBACK_PAGE_SIZE: usize = 4096;

pub struct MappedRegion {
    map: Mmap,
    page_size: usize,
    released: Cell<usize>,
}

impl MappedRegion {
    /// Maps `path` read-only.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        let io_err = |source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        // SAFETY: the map is private and read-only; the loader never holds a
        // slice across a point where the file could be truncated by us.
        let map = unsafe { Mmap::map(&file) }.map_err(io_err)?;
        tracing::debug!("mapped '{}' ({} bytes)", path.display(), map.len());
        Ok(Self {
            map,
            page_size: page_size(),
            released: Cell::new(0),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Total bytes handed back so far.
    pub fn released_bytes(&self) -> usize {
        self.released.get()
    }

    /// Releases the pages fully covered by `[offset, offset + len)`.
    ///
    /// Partially covered edge pages are kept. Returns the number of bytes
    /// released. Failure to advise is logged and otherwise ignored: the pages
    /// simply stay resident.
    pub fn release_range(&self, offset: usize, len: usize) -> usize {
        let Some(range) = aligned_inner_range(offset, len, self.page_size) else {
            return 0;
        };
        let range = range.start..range.end.min(self.map.len());
        if range.is_empty() {
            return 0;
        }
        let outcome = self.advise_dont_need(range.clone());
        self.settle(range, outcome)
    }

    /// Accounts for one advise call. A failure keeps the pages resident.
    fn settle(&self, range: Range<usize>, outcome: std::io::Result<()>) -> usize {
        if let Err(err) = outcome {
            tracing::warn!("page release of {:?} failed, pages stay resident: {err}", range);
            return 0;
        }
        let released = range.len();
        tracing::debug!("released {} pages at offset {}", released / self.page_size, range.start);
        self.released.set(self.released.get() + released);
        released
    }

    #[cfg(unix)]
    fn advise_dont_need(&self, range: Range<usize>) -> std::io::Result<()> {
        // SAFETY: the mapping is private and read-only, so dropping the pages
        // only discards clean file-backed copies; later reads fault them in.
        unsafe {
            self.map
                .unchecked_advise_range(memmap2::UncheckedAdvice::DontNeed, range.start, range.len())
        }
    }

    #[cfg(not(unix))]
    fn advise_dont_need(&self, _range: Range<usize>) -> std::io::Result<()> {
        Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
    }
}

/// The page-aligned sub-range of `[offset, offset + len)`: start rounded
/// up, end rounded down. `None` if no whole page is covered.
pub fn aligned_inner_range(offset: usize, len: usize, page_size: usize) -> Option<Range<usize>> {
    if page_size == 0 {
        return None;
    }
    let end = offset.checked_add(len)?;
    let start = offset.div_ceil(page_size).checked_mul(page_size)?;
    let end = (end / page_size) * page_size;
    (end > start).then_some(start..end)
}

#[cfg(unix)]
fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(not(unix))]
fn page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_aligned_inner_range() {
        // Entirely inside one page.
        assert_eq!(aligned_inner_range(10, 100, 4096), None);
        // Exactly one page.
        assert_eq!(aligned_inner_range(4096, 4096, 4096), Some(4096..8192));
        // Edge pages kept on both sides.
        assert_eq!(aligned_inner_range(100, 3 * 4096, 4096), Some(4096..12288));
        // Straddles a boundary without covering a page.
        assert_eq!(aligned_inner_range(4000, 200, 4096), None);
        assert_eq!(aligned_inner_range(0, 0, 4096), None);
    }

    #[test]
    fn test_release_range_keeps_mapping_readable() {
        let path = std::env::temp_dir().join(format!("nnrt-region-{}.bin", std::process::id()));
        let payload: Vec<u8> = (0..5 * 4096).map(|i| (i % 251) as u8).collect();
        std::fs::File::create(&path).unwrap().write_all(&payload).unwrap();

        let region = MappedRegion::open(&path).unwrap();
        assert_eq!(region.len(), payload.len());
        let page = region.page_size();
        let released = region.release_range(1, payload.len() - 2);
        if cfg!(unix) && page <= 4096 {
            assert!(released >= page);
            assert_eq!(region.released_bytes(), released);
        }
        // Released pages fault back in from the file.
        assert_eq!(region.bytes(), &payload[..]);
        assert_eq!(region.release_range(0, 10), 0);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_failed_release_is_not_counted() {
        let path = std::env::temp_dir().join(format!("nnrt-region-fail-{}.bin", std::process::id()));
        std::fs::File::create(&path).unwrap().write_all(&[7u8; 3 * 4096]).unwrap();
        let region = MappedRegion::open(&path).unwrap();

        let refused = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(region.settle(0..4096, Err(refused)), 0);
        assert_eq!(region.released_bytes(), 0);
        assert_eq!(region.settle(0..4096, Ok(())), 4096);
        assert_eq!(region.released_bytes(), 4096);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_open_missing_file() {
        let err = MappedRegion::open(Path::new("/nonexistent/model.tflite")).err().unwrap();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
