//! Circular frame dump backed by a memory-mapped file.
//!
//! The file holds exactly `frame_size * frame_count` bytes split into
//! `frame_count` equal slots with no header. Frames are written round-robin
//! starting at offset 0, so after a run the file holds the most recent
//! `frame_count` frames of the session.

use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct DumpStore {
    path: PathBuf,
    file: Option<File>,
    mmap: Option<MmapMut>,
    frame_size: usize,
    /// Offset of the next write.
    cursor: usize,
}

impl DumpStore {
    /// Create or truncate `path`, size it to hold `frame_count` frames and map it.
    pub fn open(
        path: impl AsRef<Path>,
        frame_size: usize,
        frame_count: usize,
    ) -> Result<Self, DumpError> {
        let path = path.as_ref().to_path_buf();
        let capacity = frame_size
            .checked_mul(frame_count)
            .filter(|&c| c > 0)
            .ok_or(DumpError::Capacity {
                frame_size,
                frame_count,
            })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| DumpError::Open(path.display().to_string(), e))?;

        file.set_len(capacity as u64)
            .map_err(|e| DumpError::Resize(path.display().to_string(), e))?;

        let mmap = unsafe {
            MmapOptions::new()
                .len(capacity)
                .map_mut(&file)
                .map_err(|e| DumpError::Map(path.display().to_string(), e))?
        };

        info!(
            path = %path.display(),
            frame_count,
            frame_size,
            capacity,
            "dump store opened"
        );

        Ok(Self {
            path,
            file: Some(file),
            mmap: Some(mmap),
            frame_size,
            cursor: 0,
        })
    }

    /// Copy one frame into the slot at the cursor.
    ///
    /// Every write takes exactly one slot: at most `frame_size` bytes of
    /// `data` are copied and the rest of a short frame's slot is zeroed.
    /// When the slot would run past the end of the region the cursor goes
    /// back to offset 0 first, so a frame never straddles the wrap point.
    /// Writes after `close` are dropped.
    pub fn write(&mut self, data: &[u8]) {
        let Some(mmap) = self.mmap.as_mut() else {
            return;
        };
        if self.cursor + self.frame_size > mmap.len() {
            self.cursor = 0;
        }
        let slot = &mut mmap[self.cursor..self.cursor + self.frame_size];
        let len = data.len().min(self.frame_size);
        slot[..len].copy_from_slice(&data[..len]);
        slot[len..].fill(0);
        self.cursor += self.frame_size;
    }

    /// Unmap the region and close the file. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mmap) = self.mmap.take() {
            if let Err(e) = mmap.flush() {
                warn!(path = %self.path.display(), error = %e, "failed to flush dump store");
            }
            debug!(path = %self.path.display(), "dump store unmapped");
        }
        self.file = None;
    }

    pub fn is_open(&self) -> bool {
        self.mmap.is_some()
    }

    /// Offset the next write will land at (before any wrap).
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.mmap.as_ref().map(|m| m.len()).unwrap_or(0)
    }
}

impl Drop for DumpStore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Dump file for one session. A single session writes to `base` as given,
/// otherwise every session gets `<stem>_<index>.<ext>` next to it.
pub fn session_dump_path(base: &Path, index: usize, sessions: usize) -> PathBuf {
    if sessions <= 1 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rx_dump".into());
    let name = match base.extension() {
        Some(ext) => format!("{stem}_{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{index}"),
    };
    base.with_file_name(name)
}

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("dump capacity must be non-zero (frame size {frame_size}, frame count {frame_count})")]
    Capacity {
        frame_size: usize,
        frame_count: usize,
    },
    #[error("failed to open dump file {0}: {1}")]
    Open(String, std::io::Error),
    #[error("failed to size dump file {0}: {1}")]
    Resize(String, std::io::Error),
    #[error("failed to mmap dump file {0}: {1}")]
    Map(String, std::io::Error),
}
