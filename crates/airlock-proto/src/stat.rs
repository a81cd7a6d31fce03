//! Packed stat record.
//!
//! Stat results cross the link as a fixed 15-byte little-endian
//! record. Fields are raw byte arrays to keep the struct alignment-free
//! so it can be cast straight from untrusted frame payloads.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::errors::ProtocolError;

/// Wire form of a stat result: `<B H L L L>` little-endian.
///
/// Layout: flags (1 byte), permission bits (2 bytes), size (4 bytes),
/// mtime (4 bytes), ctime (4 bytes). Times are whole seconds; sizes
/// larger than 32 bits truncate.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct StatRecord {
    flags: u8,
    mode: [u8; 2],
    size: [u8; 4],
    mtime: [u8; 4],
    ctime: [u8; 4],
}

impl StatRecord {
    /// Size of the serialized record (15 bytes).
    pub const SIZE: usize = 15;

    /// Flag bit: path is a directory.
    pub const FLAG_DIR: u8 = 0x01;

    /// Flag bit: path is a regular file.
    pub const FLAG_FILE: u8 = 0x02;

    /// Flag bit: the client-visible path is a symlink.
    pub const FLAG_SYMLINK: u8 = 0x80;

    /// Build a record from its component fields.
    #[must_use]
    pub fn new(flags: u8, mode: u16, size: u32, mtime: u32, ctime: u32) -> Self {
        Self {
            flags,
            mode: mode.to_le_bytes(),
            size: size.to_le_bytes(),
            mtime: mtime.to_le_bytes(),
            ctime: ctime.to_le_bytes(),
        }
    }

    /// Build a record from filesystem metadata.
    ///
    /// `symlink` reports whether the *request path* (before symlink
    /// resolution) is itself a symlink; the remaining flags describe
    /// the resolved target.
    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(meta: &std::fs::Metadata, symlink: bool) -> Self {
        use std::os::unix::fs::MetadataExt;

        let mut flags = 0u8;
        if meta.is_dir() {
            flags |= Self::FLAG_DIR;
        }
        if meta.is_file() {
            flags |= Self::FLAG_FILE;
        }
        if symlink {
            flags |= Self::FLAG_SYMLINK;
        }

        Self::new(
            flags,
            (meta.mode() & 0o7777) as u16,
            meta.len() as u32,
            meta.mtime() as u32,
            meta.ctime() as u32,
        )
    }

    /// Parse a record from a response payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::BadStatRecord`] unless the payload is exactly
    /// [`Self::SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::read_from_bytes(bytes).map_err(|_| ProtocolError::BadStatRecord { len: bytes.len() })
    }

    /// Serialize to the 15-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Raw flags byte.
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Permission bits (the low 12 bits of the Unix mode).
    #[must_use]
    pub fn mode(&self) -> u16 {
        u16::from_le_bytes(self.mode)
    }

    /// File size in bytes, truncated to 32 bits.
    #[must_use]
    pub fn size(&self) -> u32 {
        u32::from_le_bytes(self.size)
    }

    /// Modification time, whole seconds since the epoch.
    #[must_use]
    pub fn mtime(&self) -> u32 {
        u32::from_le_bytes(self.mtime)
    }

    /// Change time, whole seconds since the epoch.
    #[must_use]
    pub fn ctime(&self) -> u32 {
        u32::from_le_bytes(self.ctime)
    }

    /// True if the resolved target is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.flags & Self::FLAG_DIR != 0
    }

    /// True if the resolved target is a regular file.
    #[must_use]
    pub fn is_regular_file(&self) -> bool {
        self.flags & Self::FLAG_FILE != 0
    }

    /// True if the request path was a symlink.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.flags & Self::FLAG_SYMLINK != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_layout_is_little_endian_packed() {
        let record = StatRecord::new(
            StatRecord::FLAG_FILE,
            0o644,
            0x0102_0304,
            0x1111_2222,
            0x3333_4444,
        );

        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), StatRecord::SIZE);
        assert_eq!(bytes[0], 0x02);
        assert_eq!(&bytes[1..3], &0o644u16.to_le_bytes());
        assert_eq!(&bytes[3..7], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[7..11], &[0x22, 0x22, 0x11, 0x11]);
        assert_eq!(&bytes[11..15], &[0x44, 0x44, 0x33, 0x33]);
    }

    #[test]
    fn round_trip() {
        let record = StatRecord::new(
            StatRecord::FLAG_DIR | StatRecord::FLAG_SYMLINK,
            0o755,
            4096,
            1_700_000_000,
            1_700_000_001,
        );

        let parsed = StatRecord::from_bytes(&record.to_bytes()).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.is_dir());
        assert!(parsed.is_symlink());
        assert!(!parsed.is_regular_file());
        assert_eq!(parsed.mode(), 0o755);
        assert_eq!(parsed.size(), 4096);
    }

    #[test]
    fn wrong_length_rejected() {
        assert_eq!(
            StatRecord::from_bytes(&[0u8; 14]),
            Err(ProtocolError::BadStatRecord { len: 14 })
        );
        assert_eq!(
            StatRecord::from_bytes(&[0u8; 16]),
            Err(ProtocolError::BadStatRecord { len: 16 })
        );
    }

    #[cfg(unix)]
    #[test]
    fn from_metadata_marks_file_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe");
        std::fs::write(&path, b"abc").unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        let record = StatRecord::from_metadata(&meta, false);

        assert!(record.is_regular_file());
        assert!(!record.is_dir());
        assert!(!record.is_symlink());
        assert_eq!(record.size(), 3);
        assert!(record.mtime() > 0);
    }
}
