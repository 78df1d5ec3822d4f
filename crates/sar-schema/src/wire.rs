//! On-disk layout of `.sar` archives.
//!
//! An archive is a fixed 48-byte little-endian header, followed by file
//! payloads aligned to [`SAR_ENTRY_ALIGNMENT`]-byte boundaries, followed by
//! the file table (one [`PackageFileEntry`] per file, serialized, zstd
//! compressed, obfuscated, and terminated by a CRC32 footer).
//!
//! Header layout, all fields little-endian:
//!
//! | offset | size | field |
//! |-------:|-----:|-------|
//! |      0 |    4 | signature (`0xDA7F`) |
//! |      4 |    4 | version (`21`) |
//! |      8 |    8 | total archive size in bytes |
//! |     16 |    8 | file-table offset |
//! |     24 |    4 | entry count |
//! |     28 |    2 | game directory code |
//! |     30 |    2 | table compression mode (`1` = zstd) |
//! |     32 |    4 | table size on disk, CRC footer included |
//! |     36 |    2 | variation id |
//! |     38 |    2 | build version major (clamped to at least 1) |
//! |     40 |    4 | build changelist (clamped to at least 1) |
//! |     44 |    2 | supports-directory-queries flag |
//! |     46 |    1 | payloads-obfuscated flag |
//! |     47 |    1 | platform code |

use std::io::{self, Read, Write};

use crate::file_path::{GameDirectory, Platform};

/// First four bytes of every `.sar` archive.
pub const SAR_SIGNATURE: u32 = 0xDA7F;

/// Current container version. Readers reject any other value.
pub const SAR_VERSION: u32 = 21;

/// Size of the fixed header in bytes.
pub const SAR_HEADER_SIZE: u64 = 48;

/// File payloads start on multiples of this within the archive.
pub const SAR_ENTRY_ALIGNMENT: u64 = 8;

/// File-table compression mode: zstd. The only mode this version writes.
pub const SAR_TABLE_COMPRESSION_ZSTD: u16 = 1;

/// Errors from decoding archive structures.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The first four bytes were not [`SAR_SIGNATURE`].
    #[error("bad archive signature 0x{0:X}, expected 0x{SAR_SIGNATURE:X}")]
    BadSignature(u32),
    /// The archive was written by an incompatible version.
    #[error("unsupported archive version {0}, expected {SAR_VERSION}")]
    BadVersion(u32),
    /// The header names a game directory code we do not know.
    #[error("unknown game directory code {0}")]
    BadGameDirectory(u16),
    /// The header names a platform code we do not know.
    #[error("unknown platform code {0}")]
    BadPlatform(u8),
    /// The file table uses a compression mode we do not support.
    #[error("unsupported file-table compression mode {0}")]
    BadTableCompression(u16),
    /// The CRC32 footer of the file table did not match its contents.
    #[error("file table CRC mismatch: stored 0x{stored:08X}, computed 0x{computed:08X}")]
    TableCrcMismatch {
        /// CRC32 read from the table footer.
        stored: u32,
        /// CRC32 computed over the table bytes.
        computed: u32,
    },
    /// A length-prefixed string was not valid UTF-8.
    #[error("entry filename is not valid UTF-8")]
    BadFilename(#[from] std::string::FromUtf8Error),
    /// Underlying read or write failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// CRC32 (IEEE) of a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Round `offset` up to the next multiple of `alignment`.
pub fn align_up(offset: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (offset + alignment - 1) & !(alignment - 1)
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Fixed archive header. Written once at offset 0, then rewritten with
/// final sizes when the archive is sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFileHeader {
    /// Total archive size in bytes, table and footer included.
    pub total_size: u64,
    /// Absolute offset of the file table.
    pub table_offset: u64,
    /// Number of entries in the file table.
    pub entry_count: u32,
    /// Directory root all entries resolve against.
    pub game_directory: GameDirectory,
    /// On-disk size of the file table, CRC footer included.
    pub table_size: u32,
    /// Variation id; 0 for a base archive, 1.. for variations.
    pub variation: u16,
    /// Build version major, at least 1.
    pub build_version_major: u16,
    /// Build changelist, at least 1.
    pub build_changelist: u32,
    /// Whether the archive supports directory queries.
    pub supports_directory_queries: bool,
    /// Whether file payloads are obfuscated.
    pub obfuscated: bool,
    /// Platform the archive was cooked for.
    pub platform: Platform,
}

impl PackageFileHeader {
    /// Encode as the fixed 48-byte little-endian header.
    pub fn encode(&self) -> [u8; SAR_HEADER_SIZE as usize] {
        let mut buf = [0u8; SAR_HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&SAR_SIGNATURE.to_le_bytes());
        buf[4..8].copy_from_slice(&SAR_VERSION.to_le_bytes());
        buf[8..16].copy_from_slice(&self.total_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.table_offset.to_le_bytes());
        buf[24..28].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[28..30].copy_from_slice(&self.game_directory.code().to_le_bytes());
        buf[30..32].copy_from_slice(&SAR_TABLE_COMPRESSION_ZSTD.to_le_bytes());
        buf[32..36].copy_from_slice(&self.table_size.to_le_bytes());
        buf[36..38].copy_from_slice(&self.variation.to_le_bytes());
        buf[38..40].copy_from_slice(&self.build_version_major.max(1).to_le_bytes());
        buf[40..44].copy_from_slice(&self.build_changelist.max(1).to_le_bytes());
        buf[44..46].copy_from_slice(&u16::from(self.supports_directory_queries).to_le_bytes());
        buf[46] = u8::from(self.obfuscated);
        buf[47] = self.platform.code();
        buf
    }

    /// Decode and validate a header read from the start of an archive.
    pub fn decode<R: Read>(r: &mut R) -> Result<Self, WireError> {
        let signature = read_u32(r)?;
        if signature != SAR_SIGNATURE {
            return Err(WireError::BadSignature(signature));
        }
        let version = read_u32(r)?;
        if version != SAR_VERSION {
            return Err(WireError::BadVersion(version));
        }
        let total_size = read_u64(r)?;
        let table_offset = read_u64(r)?;
        let entry_count = read_u32(r)?;
        let dir_code = read_u16(r)?;
        let game_directory =
            GameDirectory::from_code(dir_code).ok_or(WireError::BadGameDirectory(dir_code))?;
        let table_compression = read_u16(r)?;
        if table_compression != SAR_TABLE_COMPRESSION_ZSTD {
            return Err(WireError::BadTableCompression(table_compression));
        }
        let table_size = read_u32(r)?;
        let variation = read_u16(r)?;
        let build_version_major = read_u16(r)?;
        let build_changelist = read_u32(r)?;
        let supports_directory_queries = read_u16(r)? != 0;
        let obfuscated = read_u8(r)? != 0;
        let platform_code = read_u8(r)?;
        let platform =
            Platform::from_code(platform_code).ok_or(WireError::BadPlatform(platform_code))?;
        Ok(Self {
            total_size,
            table_offset,
            entry_count,
            game_directory,
            table_size,
            variation,
            build_version_major,
            build_changelist,
            supports_directory_queries,
            obfuscated,
            platform,
        })
    }
}

/// One file-table record: where a payload lives and how to verify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFileEntry {
    /// Absolute offset of the payload within the archive.
    pub offset: u64,
    /// Payload size on disk (after compression/obfuscation).
    pub compressed_size: u64,
    /// Original payload size before compression.
    pub uncompressed_size: u64,
    /// Source modification time, seconds since the Unix epoch.
    pub modified_time: u64,
    /// CRC32 of the payload before compression and obfuscation.
    pub crc32_pre: u32,
    /// CRC32 of the payload as stored. Equals `crc32_pre` when the payload
    /// was stored untransformed.
    pub crc32_post: u32,
    /// Relative filename with extension, `/`-separated.
    pub filename: String,
}

impl PackageFileEntry {
    /// Serialize into the (uncompressed) file-table stream.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.offset.to_le_bytes())?;
        w.write_all(&self.compressed_size.to_le_bytes())?;
        w.write_all(&self.uncompressed_size.to_le_bytes())?;
        w.write_all(&self.modified_time.to_le_bytes())?;
        w.write_all(&self.crc32_pre.to_le_bytes())?;
        w.write_all(&self.crc32_post.to_le_bytes())?;
        let name = self.filename.as_bytes();
        w.write_all(&u32::try_from(name.len()).unwrap_or(u32::MAX).to_le_bytes())?;
        w.write_all(name)?;
        Ok(())
    }

    /// Deserialize from the (uncompressed) file-table stream.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, WireError> {
        let offset = read_u64(r)?;
        let compressed_size = read_u64(r)?;
        let uncompressed_size = read_u64(r)?;
        let modified_time = read_u64(r)?;
        let crc32_pre = read_u32(r)?;
        let crc32_post = read_u32(r)?;
        let name_len = read_u32(r)? as usize;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        Ok(Self {
            offset,
            compressed_size,
            uncompressed_size,
            modified_time,
            crc32_pre,
            crc32_post,
            filename: String::from_utf8(name)?,
        })
    }
}
