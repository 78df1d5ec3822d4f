//! `.sar` container reader and writer.

pub mod read;
pub mod write;

pub use read::SarArchive;
pub use write::{ArchiveBuilder, HeaderSeed};

/// Key identifying an unchanged file relative to a base/delta archive:
/// same path, same size on disk, same pre-transform CRC32.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeltaKey {
    /// Content identity.
    pub path: sar_schema::FilePath,
    /// Stored (post-compression) size.
    pub compressed_size: u64,
    /// CRC32 before compression and obfuscation.
    pub crc32_pre: u32,
}
