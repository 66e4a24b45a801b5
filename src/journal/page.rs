//! Page images
//!
//! A PA record carries only the edges of a page: a left run starting at
//! offset 0 and a right run ending at the last byte. On replay the middle is
//! zero-filled.
//!
//! ```text
//! page:     [ left_size bytes | ......... cleared ......... | tail bytes ]
//! captured: [ left_size bytes | tail bytes ]
//! ```

use crate::error::{AtlasError, Result};

/// Captured image of one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub volume_handle: i32,
    pub page_address: i64,

    /// Bytes of `bytes` that belong at the start of the page
    pub left_size: usize,

    /// Full page size
    pub buffer_size: usize,

    /// Left run followed by the tail run
    pub bytes: Vec<u8>,
}

impl PageImage {
    /// Capture the first `left_size` and last `right_size` bytes of `page`
    ///
    /// If the runs overlap the whole page is captured.
    pub fn capture(
        volume_handle: i32,
        page_address: i64,
        page: &[u8],
        left_size: usize,
        right_size: usize,
    ) -> Self {
        let buffer_size = page.len();
        let (left_size, bytes) = if left_size + right_size >= buffer_size {
            (buffer_size, page.to_vec())
        } else {
            let mut bytes = Vec::with_capacity(left_size + right_size);
            bytes.extend_from_slice(&page[..left_size]);
            bytes.extend_from_slice(&page[buffer_size - right_size..]);
            (left_size, bytes)
        };

        Self {
            volume_handle,
            page_address,
            left_size,
            buffer_size,
            bytes,
        }
    }

    /// Capture a page keeping only what differs from zero at either edge
    ///
    /// The left run ends after the last non-zero byte of the first half and
    /// the right run starts at the first non-zero byte of the second half.
    pub fn capture_trimmed(volume_handle: i32, page_address: i64, page: &[u8]) -> Self {
        let middle = page.len() / 2;
        let left_size = page[..middle]
            .iter()
            .rposition(|b| *b != 0)
            .map_or(0, |p| p + 1);
        let right_size = page[middle..]
            .iter()
            .position(|b| *b != 0)
            .map_or(0, |p| page.len() - middle - p);
        Self::capture(volume_handle, page_address, page, left_size, right_size)
    }

    /// Length of the tail run
    pub fn right_size(&self) -> usize {
        self.bytes.len().saturating_sub(self.left_size)
    }

    /// Check that the runs fit the page
    pub fn validate(&self) -> Result<()> {
        if self.left_size > self.bytes.len() {
            return Err(AtlasError::IllegalState(format!(
                "page image left size {} exceeds captured {} bytes",
                self.left_size,
                self.bytes.len()
            )));
        }
        if self.bytes.len() > self.buffer_size {
            return Err(AtlasError::IllegalState(format!(
                "page image captures {} bytes of a {}-byte page",
                self.bytes.len(),
                self.buffer_size
            )));
        }
        Ok(())
    }

    /// Rebuild the full page
    pub fn replay(&self) -> Result<Vec<u8>> {
        let mut page = vec![0u8; self.buffer_size];
        self.replay_into(&mut page)?;
        Ok(page)
    }

    /// Rebuild the full page into `page`, which must be `buffer_size` long
    pub fn replay_into(&self, page: &mut [u8]) -> Result<()> {
        self.validate()?;
        if page.len() != self.buffer_size {
            return Err(AtlasError::IllegalState(format!(
                "page image of {} bytes replayed into {}-byte page",
                self.buffer_size,
                page.len()
            )));
        }

        let (left, right) = self.bytes.split_at(self.left_size);
        let tail_start = self.buffer_size - right.len();
        page[..self.left_size].copy_from_slice(left);
        page[self.left_size..tail_start].fill(0);
        page[tail_start..].copy_from_slice(right);
        Ok(())
    }
}
