//! LC-3 object image format.
//!
//! An image is a flat sequence of big-endian 16-bit words:
//! - word 0 is the origin, the address the program is loaded at
//! - every following word is stored at origin, origin + 1, ...
//!
//! A trailing odd byte is ignored.

use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

/// A decoded object image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Load address of the first data word.
    pub origin: u16,
    /// Data words in host order.
    pub words: Vec<u16>,
}

impl Image {
    pub fn new(origin: u16, words: Vec<u16>) -> Self {
        Self { origin, words }
    }

    /// Decode an image from its on-disk bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        let mut chunks = bytes.chunks_exact(2);
        let origin = match chunks.next() {
            Some(pair) => u16::from_be_bytes([pair[0], pair[1]]),
            None => return Err(ImageError::MissingOrigin { path: None }),
        };
        let words = chunks
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self { origin, words })
    }

    /// Read and decode an image file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let image = Self::from_bytes(&bytes).map_err(|e| match e {
            ImageError::MissingOrigin { .. } => ImageError::MissingOrigin {
                path: Some(path.to_path_buf()),
            },
            other => other,
        })?;
        debug!(
            "loaded {}: origin {:#06x}, {} words",
            path.display(),
            image.origin,
            image.words.len()
        );
        Ok(image)
    }

    /// Encode back to the on-disk format.
    pub fn to_bytes(&self) -> Vec<u8> {
        std::iter::once(self.origin)
            .chain(self.words.iter().copied())
            .flat_map(u16::to_be_bytes)
            .collect()
    }

    /// Number of data words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if the image carries no data words.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Errors that can occur while loading an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to load image {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fewer than two bytes. `path` is set when the bytes came from a file.
    #[error("image {}is too short to hold an origin", describe(.path))]
    MissingOrigin { path: Option<PathBuf> },
}

fn describe(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!("{} ", p.display()),
        None => String::new(),
    }
}
