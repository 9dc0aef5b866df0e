/// The "Grub" bundle container shared by modelbin, materialbin and swatchbin files
pub mod bundle;
/// Cursor-based binary reader
pub mod stream;

use crate::error::DecodeResult;
use stream::BinaryStream;

/// Two-byte `major.minor` version stamped on bundles, blobs and records.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub fn read(stream: &mut BinaryStream<'_>) -> DecodeResult<Self> {
        let major = stream.read_u8()?;
        let minor = stream.read_u8()?;
        Ok(Self { major, minor })
    }

    pub fn is_at_least(&self, major: u8, minor: u8) -> bool {
        *self >= Version::new(major, minor)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
