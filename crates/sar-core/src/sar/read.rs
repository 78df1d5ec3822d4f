//! Reading existing `.sar` archives.
//!
//! The cook pipeline reads archives in three situations: locale base
//! files come out of a referenced base archive, delta cooks consult peer
//! archives' file tables, and variation cooks copy untouched entries
//! byte-for-byte from the already-built base.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sar_schema::{
    FilePath, PackageFileEntry, PackageFileHeader, crc32, generate_key, obfuscate,
};

use crate::error::{CookError, Result};

/// An opened archive: validated header plus the parsed file table.
#[derive(Debug)]
pub struct SarArchive {
    file: File,
    path: PathBuf,
    header: PackageFileHeader,
    entries: Vec<(FilePath, PackageFileEntry)>,
    index: HashMap<FilePath, usize>,
}

impl SarArchive {
    /// Open an archive and parse its file table. The table is
    /// de-obfuscated with the build-version key, CRC-checked against its
    /// footer, and decompressed.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| CookError::io(path, e))?;
        let header = PackageFileHeader::decode(&mut file)?;

        if header.table_size < 4 {
            return Err(CookError::Archive {
                path: path.to_path_buf(),
                reason: "file table too small for its CRC footer".to_string(),
            });
        }
        file.seek(SeekFrom::Start(header.table_offset))
            .map_err(|e| CookError::io(path, e))?;
        let mut table = vec![0u8; header.table_size as usize];
        file.read_exact(&mut table)
            .map_err(|e| CookError::io(path, e))?;

        // Trailing four bytes are the CRC32 of the stored table.
        let body_len = table.len() - 4;
        let stored = u32::from_le_bytes([
            table[body_len],
            table[body_len + 1],
            table[body_len + 2],
            table[body_len + 3],
        ]);
        table.truncate(body_len);
        let computed = crc32(&table);
        if stored != computed {
            return Err(sar_schema::WireError::TableCrcMismatch { stored, computed }.into());
        }

        let key = generate_key(&format!(
            "{}{}",
            header.build_version_major, header.build_changelist
        ));
        obfuscate(key, &mut table);

        let raw = zstd::stream::decode_all(&table[..]).map_err(|e| CookError::Compression {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut cursor = &raw[..];
        let mut entries = Vec::with_capacity(header.entry_count as usize);
        let mut index = HashMap::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            let entry = PackageFileEntry::read_from(&mut cursor)?;
            let file_path = FilePath::new(header.game_directory, &entry.filename);
            index.insert(file_path.clone(), entries.len());
            entries.push((file_path, entry));
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            header,
            entries,
            index,
        })
    }

    /// The validated header.
    pub fn header(&self) -> &PackageFileHeader {
        &self.header
    }

    /// File-table entries in table order.
    pub fn entries(&self) -> &[(FilePath, PackageFileEntry)] {
        &self.entries
    }

    /// Look up one entry.
    pub fn entry(&self, path: &FilePath) -> Option<&PackageFileEntry> {
        self.index.get(path).map(|&i| &self.entries[i].1)
    }

    /// Read stored bytes without any transform. Used when copying
    /// entries byte-for-byte into a variation archive.
    pub fn read_raw(&mut self, offset: u64, size: u64) -> Result<Vec<u8>> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| CookError::io(&self.path, e))?;
        let mut data = vec![0u8; size as usize];
        self.file
            .read_exact(&mut data)
            .map_err(|e| CookError::io(&self.path, e))?;
        Ok(data)
    }

    /// Read and fully restore one entry's original bytes: de-obfuscate,
    /// decompress (with `dict` when the archive was dictionary-cooked),
    /// and verify the pre-transform CRC32.
    pub fn read_all(&mut self, path: &FilePath, dict: Option<&[u8]>) -> Result<Vec<u8>> {
        let entry = self
            .entry(path)
            .ok_or_else(|| CookError::MissingFile(format!("{path} in {}", self.path.display())))?
            .clone();
        let mut data = self.read_raw(entry.offset, entry.compressed_size)?;

        if self.header.obfuscated {
            obfuscate(generate_key(&entry.filename), &mut data);
        }
        if entry.compressed_size != entry.uncompressed_size {
            data = match dict {
                Some(dict) => {
                    let mut dec = zstd::bulk::Decompressor::with_dictionary(dict)
                        .map_err(|e| self.compression_error(path, e))?;
                    dec.decompress(&data, entry.uncompressed_size as usize)
                        .map_err(|e| self.compression_error(path, e))?
                }
                None => zstd::stream::decode_all(&data[..])
                    .map_err(|e| self.compression_error(path, e))?,
            };
        }

        let computed = crc32(&data);
        if computed != entry.crc32_pre {
            return Err(CookError::Archive {
                path: self.path.clone(),
                reason: format!(
                    "{path}: CRC mismatch, stored 0x{:08X} computed 0x{computed:08X}",
                    entry.crc32_pre
                ),
            });
        }
        Ok(data)
    }

    fn compression_error(&self, path: &FilePath, e: std::io::Error) -> CookError {
        CookError::Compression {
            path: format!("{path} in {}", self.path.display()),
            source: e,
        }
    }
}
