use std::fs;
use std::path::Path;

use miette::Result;

use crate::error;

/// Object image: an origin followed by the words to place there.
///
/// On disk both are big-endian 16-bit words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub orig: u16,
    pub words: Vec<u16>,
}

impl Image {
    pub fn read(path: &Path) -> Result<Image> {
        let bytes = fs::read(path).map_err(|e| error::image_open(path, e))?;
        let image =
            Image::from_bytes(&bytes).ok_or_else(|| error::image_truncated(path, bytes.len()))?;
        log::debug!(
            "read {}: {} words at 0x{:04x}",
            path.display(),
            image.words.len(),
            image.orig
        );
        Ok(image)
    }

    /// `None` if there are not enough bytes for the origin.
    pub fn from_bytes(bytes: &[u8]) -> Option<Image> {
        let (orig, body) = bytes.split_first_chunk::<2>()?;
        let chunks = body.chunks_exact(2);
        if !chunks.remainder().is_empty() {
            log::warn!("image has an odd trailing byte, which is ignored");
        }
        let words = chunks
            .map(|word| u16::from_be_bytes([word[0], word[1]]))
            .collect();
        Some(Image {
            orig: u16::from_be_bytes(*orig),
            words,
        })
    }
}
