//! Frame acquisition seam.
//!
//! Camera capture is a collaborator, not part of this crate: the session only
//! needs "give me a still image right now, or nothing". A tick with no ready
//! frame is a skip, not an error.

use std::path::PathBuf;

/// Supplies one still image per sampling tick.
pub trait FrameSource: Send {
    /// Grab the current frame as encoded JPEG bytes, if one is ready.
    fn grab(&mut self) -> Option<Vec<u8>>;
}

/// Frame source backed by an image file, re-read on every tick.
///
/// Useful when a capture pipeline drops stills into a well-known path.
pub struct StillFrameSource {
    path: PathBuf,
}

impl StillFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSource for StillFrameSource {
    fn grab(&mut self) -> Option<Vec<u8>> {
        match std::fs::read(&self.path) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), "no frame available: {e}");
                None
            }
        }
    }
}

/// Frame source that never produces a frame; every tick skips.
pub struct SilentFrameSource;

impl FrameSource for SilentFrameSource {
    fn grab(&mut self) -> Option<Vec<u8>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_source_always_skips() {
        let mut source = SilentFrameSource;
        assert!(source.grab().is_none());
        assert!(source.grab().is_none());
    }

    #[test]
    fn test_still_source_missing_file_skips() {
        let mut source = StillFrameSource::new("/nonexistent/frame.jpg");
        assert!(source.grab().is_none());
    }

    #[test]
    fn test_still_source_reads_file() {
        let path = std::env::temp_dir().join("troublewatch-test-frame.jpg");
        std::fs::write(&path, b"jpegdata").unwrap();

        let mut source = StillFrameSource::new(&path);
        assert_eq!(source.grab().unwrap(), b"jpegdata");

        let _ = std::fs::remove_file(&path);
    }
}
