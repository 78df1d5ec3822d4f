//! Low-level `.sar` container writing.
//!
//! [`ArchiveBuilder`] owns the container mechanics only: a placeholder
//! header written up front, aligned payload appends, and a sealed
//! (compressed, obfuscated, CRC-footered) file table with the header
//! backpatched at the end. What bytes go into each payload, and whether
//! an entry is skipped for a delta cook, is the caller's business.

use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use sar_schema::{
    GameDirectory, PackageFileEntry, PackageFileHeader, Platform, SAR_ENTRY_ALIGNMENT, crc32,
    generate_key, obfuscate,
    wire::align_up,
};

use crate::error::{CookError, Result};

/// Header fields fixed before any payload is written. Sizes and offsets
/// are backpatched by [`ArchiveBuilder::finish`].
#[derive(Debug, Clone)]
pub struct HeaderSeed {
    /// Directory root of every entry.
    pub game_directory: GameDirectory,
    /// Variation id; 0 for the base archive.
    pub variation: u16,
    /// Build version major stamped into the header.
    pub build_version_major: u16,
    /// Build changelist stamped into the header.
    pub build_changelist: u32,
    /// Directory-query support flag.
    pub supports_directory_queries: bool,
    /// Whether payloads are obfuscated.
    pub obfuscated: bool,
    /// Target platform.
    pub platform: Platform,
}

/// Incremental writer for one archive.
#[derive(Debug)]
pub struct ArchiveBuilder<W: Write + Seek> {
    writer: W,
    seed: HeaderSeed,
    entries: Vec<PackageFileEntry>,
    // For io error reporting only.
    label: PathBuf,
}

impl<W: Write + Seek> ArchiveBuilder<W> {
    /// Start an archive: writes the header with zeroed size fields.
    pub fn new(mut writer: W, seed: HeaderSeed, label: PathBuf) -> Result<Self> {
        let header = Self::header_with(&seed, 0, 0, 0, 0);
        writer
            .write_all(&header.encode())
            .map_err(|e| CookError::io(&label, e))?;
        Ok(Self {
            writer,
            seed,
            entries: Vec::new(),
            label,
        })
    }

    fn header_with(
        seed: &HeaderSeed,
        total_size: u64,
        table_offset: u64,
        entry_count: u32,
        table_size: u32,
    ) -> PackageFileHeader {
        PackageFileHeader {
            total_size,
            table_offset,
            entry_count,
            game_directory: seed.game_directory,
            table_size,
            variation: seed.variation,
            build_version_major: seed.build_version_major.max(1),
            build_changelist: seed.build_changelist.max(1),
            supports_directory_queries: seed.supports_directory_queries,
            obfuscated: seed.obfuscated,
            platform: seed.platform,
        }
    }

    fn pad_to_alignment(&mut self) -> Result<u64> {
        let position = self
            .writer
            .stream_position()
            .map_err(|e| CookError::io(&self.label, e))?;
        let aligned = align_up(position, SAR_ENTRY_ALIGNMENT);
        if aligned > position {
            let padding = vec![0u8; (aligned - position) as usize];
            self.writer
                .write_all(&padding)
                .map_err(|e| CookError::io(&self.label, e))?;
        }
        Ok(aligned)
    }

    /// Append one payload: pads to alignment, records the offset, writes
    /// the bytes, and queues the file-table record.
    pub fn append(
        &mut self,
        filename: String,
        stored: &[u8],
        uncompressed_size: u64,
        modified_time: u64,
        crc32_pre: u32,
        crc32_post: u32,
    ) -> Result<()> {
        let offset = self.pad_to_alignment()?;
        self.writer
            .write_all(stored)
            .map_err(|e| CookError::io(&self.label, e))?;
        self.entries.push(PackageFileEntry {
            offset,
            compressed_size: stored.len() as u64,
            uncompressed_size,
            modified_time,
            crc32_pre,
            crc32_post,
            filename,
        });
        Ok(())
    }

    /// Number of entries appended so far.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Seal the archive: serialize the file table, compress at
    /// `table_level`, obfuscate with the build-version key, append the
    /// CRC32 footer, then backpatch the header. Returns the final size.
    pub fn finish(mut self, table_level: i32) -> Result<u64> {
        let mut raw = Vec::new();
        for entry in &self.entries {
            entry
                .write_to(&mut raw)
                .map_err(|e| CookError::io(&self.label, e))?;
        }

        let mut table =
            zstd::bulk::compress(&raw, table_level).map_err(|e| CookError::Compression {
                path: self.label.display().to_string(),
                source: e,
            })?;
        let key = generate_key(&format!(
            "{}{}",
            self.seed.build_version_major.max(1),
            self.seed.build_changelist.max(1)
        ));
        obfuscate(key, &mut table);
        let footer = crc32(&table);

        let table_offset = self.pad_to_alignment()?;
        self.writer
            .write_all(&table)
            .map_err(|e| CookError::io(&self.label, e))?;
        self.writer
            .write_all(&footer.to_le_bytes())
            .map_err(|e| CookError::io(&self.label, e))?;

        let total_size = self
            .writer
            .stream_position()
            .map_err(|e| CookError::io(&self.label, e))?;

        // The four backpatched fields are scattered through the fixed
        // header, so rewrite it whole.
        let header = Self::header_with(
            &self.seed,
            total_size,
            table_offset,
            self.entries.len() as u32,
            (table.len() + 4) as u32,
        );
        self.writer
            .seek(SeekFrom::Start(0))
            .map_err(|e| CookError::io(&self.label, e))?;
        self.writer
            .write_all(&header.encode())
            .map_err(|e| CookError::io(&self.label, e))?;
        self.writer
            .flush()
            .map_err(|e| CookError::io(&self.label, e))?;
        Ok(total_size)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use sar_schema::{SAR_HEADER_SIZE, SAR_SIGNATURE, SAR_VERSION};

    use super::*;

    fn seed() -> HeaderSeed {
        HeaderSeed {
            game_directory: GameDirectory::Content,
            variation: 0,
            build_version_major: 2,
            build_changelist: 777,
            supports_directory_queries: false,
            obfuscated: false,
            platform: Platform::Pc,
        }
    }

    #[test]
    fn test_payloads_are_aligned() {
        let mut builder =
            ArchiveBuilder::new(Cursor::new(Vec::new()), seed(), PathBuf::from("test")).unwrap();
        let a = b"0123456789";
        let b = b"xyz";
        builder
            .append("a/one.bank".to_string(), a, 10, 1, crc32(a), crc32(a))
            .unwrap();
        builder
            .append("a/two.bank".to_string(), b, 3, 2, crc32(b), crc32(b))
            .unwrap();
        assert_eq!(builder.entries[0].offset % SAR_ENTRY_ALIGNMENT, 0);
        assert_eq!(builder.entries[1].offset % SAR_ENTRY_ALIGNMENT, 0);
        assert_eq!(builder.entries[0].offset, SAR_HEADER_SIZE);
        assert_eq!(builder.entries[1].offset, SAR_HEADER_SIZE + 16);
    }

    #[test]
    fn test_finished_archive_reads_back() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut builder =
                ArchiveBuilder::new(&mut cursor, seed(), PathBuf::from("test")).unwrap();
            let body = b"hello sar";
            builder
                .append(
                    "a/hello.bank".to_string(),
                    body,
                    body.len() as u64,
                    42,
                    crc32(body),
                    crc32(body),
                )
                .unwrap();
            let total = builder.finish(1).unwrap();
            assert_eq!(total, cursor.get_ref().len() as u64);
        }
        let bytes = cursor.into_inner();
        assert_eq!(&bytes[0..4], &SAR_SIGNATURE.to_le_bytes());
        assert_eq!(&bytes[4..8], &SAR_VERSION.to_le_bytes());

        let header = PackageFileHeader::decode(&mut &bytes[..]).unwrap();
        assert_eq!(header.entry_count, 1);
        assert_eq!(header.total_size, bytes.len() as u64);
        assert_eq!(header.table_offset % SAR_ENTRY_ALIGNMENT, 0);
    }
}
