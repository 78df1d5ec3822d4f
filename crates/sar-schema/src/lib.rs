//! Shared value types and the `.sar` wire format.
//!
//! This crate defines the vocabulary used across the cooking pipeline:
//! [`FilePath`] identity triples, the [`FileType`]/[`GameDirectory`] enums,
//! the fixed 48-byte [`PackageFileHeader`], per-file [`PackageFileEntry`]
//! records, and the reversible XOR obfuscation applied to archive payloads.

pub mod file_path;
pub mod obfuscate;
pub mod wire;

pub use file_path::{FilePath, FileType, GameDirectory, Platform};
pub use obfuscate::{generate_key, obfuscate};
pub use wire::{
    PackageFileEntry, PackageFileHeader, SAR_ENTRY_ALIGNMENT, SAR_HEADER_SIZE, SAR_SIGNATURE,
    SAR_VERSION, WireError, crc32,
};
