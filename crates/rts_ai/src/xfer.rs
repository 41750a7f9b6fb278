//! Versioned snapshot transfer.
//!
//! One [`Xfer`] walks a machine's fields in a fixed order and either
//! writes them, reads them back or folds them into a checksum. Using the
//! same walk for all three keeps save, load and resync checks from
//! drifting apart.
//!
//! Every block starts with a version tag written through
//! [`Xfer::xfer_version`]. Readers accept any version up to the one they
//! were built with. A field added in a later version is read only when the
//! stored tag is new enough, otherwise the reader fills it in itself (see
//! the engine block in [`crate::machine`]).

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AiError, Result};

/// Snapshot block version tag.
pub type XferVersion = u8;

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferMode {
    /// Fields are appended to a byte buffer.
    Save,
    /// Fields are read back from a byte buffer.
    Load,
    /// Fields are hashed; nothing is stored.
    Crc,
}

/// Field-by-field snapshot transfer.
pub struct Xfer {
    mode: XferMode,
    buffer: Vec<u8>,
    cursor: usize,
    hasher: DefaultHasher,
}

impl Xfer {
    /// Start a save.
    #[must_use]
    pub fn saver() -> Self {
        Self::with_mode(XferMode::Save, Vec::new())
    }

    /// Start a load over previously saved bytes.
    #[must_use]
    pub fn loader(bytes: &[u8]) -> Self {
        Self::with_mode(XferMode::Load, bytes.to_vec())
    }

    /// Start a checksum walk.
    #[must_use]
    pub fn crc() -> Self {
        Self::with_mode(XferMode::Crc, Vec::new())
    }

    fn with_mode(mode: XferMode, buffer: Vec<u8>) -> Self {
        Self {
            mode,
            buffer,
            cursor: 0,
            hasher: DefaultHasher::new(),
        }
    }

    /// Direction of this transfer.
    #[must_use]
    pub const fn mode(&self) -> XferMode {
        self.mode
    }

    /// Whether fields are being read back.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.mode == XferMode::Load
    }

    /// Transfer one field.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Snapshot`] when encoding fails or the data is
    /// truncated.
    pub fn xfer<T>(&mut self, value: &mut T) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        match self.mode {
            XferMode::Save => bincode::serialize_into(&mut self.buffer, value)?,
            XferMode::Load => {
                let mut rest = self.buffer.get(self.cursor..).unwrap_or_default();
                let before = rest.len();
                *value = bincode::deserialize_from(&mut rest)?;
                self.cursor += before - rest.len();
            }
            XferMode::Crc => {
                let bytes = bincode::serialize(value)?;
                self.hasher.write(&bytes);
            }
        }
        Ok(())
    }

    /// Transfer a block version tag.
    ///
    /// On save and crc the current version is written. On load the stored
    /// version is returned through `version`.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::VersionMismatch`] when the stored version is newer
    /// than `current`.
    pub fn xfer_version(
        &mut self,
        version: &mut XferVersion,
        current: XferVersion,
        context: &'static str,
    ) -> Result<()> {
        if !self.is_loading() {
            *version = current;
        }
        self.xfer(version)?;
        if *version > current {
            return Err(AiError::VersionMismatch {
                context,
                found: *version,
                current,
            });
        }
        Ok(())
    }

    /// Bytes written by a save.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Checksum accumulated by a crc walk.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        self.hasher.finish()
    }

    /// Bytes a load has not consumed yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.cursor)
    }

    /// Finish a load, rejecting leftover bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::TrailingSnapshotData`] if unread bytes remain.
    pub fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(AiError::TrailingSnapshotData(n)),
        }
    }
}

/// A value that takes part in snapshots.
pub trait Snapshot {
    /// Walk every persistent field through `xfer`.
    ///
    /// # Errors
    ///
    /// Propagates encoding and version errors.
    fn xfer(&mut self, xfer: &mut Xfer) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Sample {
        frame: u32,
        target: Option<u64>,
        name: String,
    }

    impl Snapshot for Sample {
        fn xfer(&mut self, xfer: &mut Xfer) -> Result<()> {
            let mut version = 1;
            xfer.xfer_version(&mut version, 1, "sample")?;
            xfer.xfer(&mut self.frame)?;
            xfer.xfer(&mut self.target)?;
            xfer.xfer(&mut self.name)
        }
    }

    #[test]
    fn test_save_then_load_restores_fields() {
        let mut original = Sample {
            frame: 42,
            target: Some(7),
            name: "dock".to_string(),
        };
        let mut saver = Xfer::saver();
        original.xfer(&mut saver).unwrap();
        let bytes = saver.into_bytes();

        let mut restored = Sample::default();
        let mut loader = Xfer::loader(&bytes);
        restored.xfer(&mut loader).unwrap();
        loader.finish().unwrap();

        assert_eq!(restored, original);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let mut saver = Xfer::saver();
        let mut version = 9;
        saver.xfer_version(&mut version, 9, "future").unwrap();
        let bytes = saver.into_bytes();

        let mut loader = Xfer::loader(&bytes);
        let mut read = 0;
        let err = loader.xfer_version(&mut read, 1, "sample").unwrap_err();
        assert!(matches!(err, AiError::VersionMismatch { found: 9, current: 1, .. }));
    }

    #[test]
    fn test_truncated_data_errors() {
        let mut loader = Xfer::loader(&[1, 2]);
        let mut value = 0u64;
        assert!(loader.xfer(&mut value).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut saver = Xfer::saver();
        saver.xfer(&mut 5u32).unwrap();
        saver.xfer(&mut 6u32).unwrap();
        let bytes = saver.into_bytes();

        let mut loader = Xfer::loader(&bytes);
        let mut first = 0u32;
        loader.xfer(&mut first).unwrap();
        assert!(matches!(loader.finish(), Err(AiError::TrailingSnapshotData(4))));
    }

    #[test]
    fn test_crc_tracks_field_changes() {
        let checksum = |frame| {
            let mut sample = Sample {
                frame,
                ..Sample::default()
            };
            let mut crc = Xfer::crc();
            sample.xfer(&mut crc).unwrap();
            crc.checksum()
        };
        assert_eq!(checksum(3), checksum(3));
        assert_ne!(checksum(3), checksum(4));
    }
}
