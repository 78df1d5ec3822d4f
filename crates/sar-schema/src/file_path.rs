//! Content identity types.
//!
//! A [`FilePath`] is the triple `(game directory, relative path without
//! extension, file type)`. It is the key for all dependency and archive
//! bookkeeping: two paths that differ only in [`FileType`] are distinct
//! assets (texture mip levels are the canonical example).

use serde::{Deserialize, Serialize};

/// Target platform of a cook pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    /// Desktop PC.
    #[serde(rename = "PC")]
    Pc,
    /// Apple iOS.
    #[serde(rename = "IOS")]
    Ios,
    /// Android.
    Android,
    /// Desktop Linux.
    Linux,
}

impl Platform {
    /// Name used in platform-suffixed filenames (e.g. the compression
    /// dictionary `pkgcdict_PC.dat`).
    pub fn name(self) -> &'static str {
        match self {
            Self::Pc => "PC",
            Self::Ios => "IOS",
            Self::Android => "Android",
            Self::Linux => "Linux",
        }
    }

    /// Serialized code stored in the archive header.
    pub fn code(self) -> u8 {
        match self {
            Self::Pc => 0,
            Self::Ios => 1,
            Self::Android => 2,
            Self::Linux => 3,
        }
    }

    /// Inverse of [`Platform::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Pc),
            1 => Some(Self::Ios),
            2 => Some(Self::Android),
            3 => Some(Self::Linux),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Root a relative path is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum GameDirectory {
    /// No root; an invalid/unset path.
    #[default]
    Unknown,
    /// Cooked configuration JSON (`Data/Config`).
    Config,
    /// Cooked content (`Data/Content`).
    Content,
}

impl GameDirectory {
    /// Serialized code stored in the archive header.
    pub fn code(self) -> u16 {
        match self {
            Self::Unknown => 0,
            Self::Config => 1,
            Self::Content => 2,
        }
    }

    /// Inverse of [`GameDirectory::code`].
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Config),
            2 => Some(Self::Content),
            _ => None,
        }
    }

    /// URL-style scheme used when a path is written as a string
    /// (e.g. `config://chat.json`).
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Config => "config",
            Self::Content => "content",
        }
    }
}

/// Cooked type of a content file, derived from its extension.
///
/// The discriminant order matters: archive sorters place texture mip
/// levels in descending type order so lower-resolution mips land first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum FileType {
    /// Unrecognized extension.
    #[default]
    Unknown,
    /// Skeletal animation data (`.san`).
    Animation,
    /// Comma-separated values (`.csv`).
    Csv,
    /// Effect/particle bank (`.fxb`).
    FxBank,
    /// Configuration or content metadata JSON (`.json`).
    Json,
    /// Chunked scene asset (`.ssa`).
    SceneAsset,
    /// Scene prefab (`.spf`).
    ScenePrefab,
    /// Script source (`.lua`).
    Script,
    /// Audio bank (`.bank`).
    SoundBank,
    /// Audio project (`.fev`).
    SoundProject,
    /// Opaque data blob (`.dat`), e.g. the compression dictionary.
    Data,
    /// Texture, highest-detail mip.
    Texture0,
    /// Texture, mip level 1.
    Texture1,
    /// Texture, mip level 2.
    Texture2,
    /// Texture, mip level 3.
    Texture3,
    /// Texture, lowest-detail mip.
    Texture4,
    /// UI/vector-graphics movie (`.fcn`).
    UiMovie,
}

/// All texture mip types, highest detail first.
pub const TEXTURE_TYPES: [FileType; 5] = [
    FileType::Texture0,
    FileType::Texture1,
    FileType::Texture2,
    FileType::Texture3,
    FileType::Texture4,
];

impl FileType {
    /// Map a file extension (without the leading dot) to its type.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "san" => Self::Animation,
            "csv" => Self::Csv,
            "fxb" => Self::FxBank,
            "json" => Self::Json,
            "ssa" => Self::SceneAsset,
            "spf" => Self::ScenePrefab,
            "lua" => Self::Script,
            "bank" => Self::SoundBank,
            "fev" => Self::SoundProject,
            "dat" => Self::Data,
            "sif0" => Self::Texture0,
            "sif1" => Self::Texture1,
            "sif2" => Self::Texture2,
            "sif3" => Self::Texture3,
            "sif4" => Self::Texture4,
            "fcn" => Self::UiMovie,
            _ => Self::Unknown,
        }
    }

    /// Cooked extension for this type, with the leading dot.
    pub fn cooked_extension(self) -> &'static str {
        match self {
            Self::Unknown => "",
            Self::Animation => ".san",
            Self::Csv => ".csv",
            Self::FxBank => ".fxb",
            Self::Json => ".json",
            Self::SceneAsset => ".ssa",
            Self::ScenePrefab => ".spf",
            Self::Script => ".lua",
            Self::SoundBank => ".bank",
            Self::SoundProject => ".fev",
            Self::Data => ".dat",
            Self::Texture0 => ".sif0",
            Self::Texture1 => ".sif1",
            Self::Texture2 => ".sif2",
            Self::Texture3 => ".sif3",
            Self::Texture4 => ".sif4",
            Self::UiMovie => ".fcn",
        }
    }

    /// Whether this is one of the texture mip types.
    pub fn is_texture(self) -> bool {
        matches!(
            self,
            Self::Texture0 | Self::Texture1 | Self::Texture2 | Self::Texture3 | Self::Texture4
        )
    }
}

/// Identity of a content asset: directory root, normalized relative path
/// without extension, and cooked file type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FilePath {
    directory: GameDirectory,
    relative: String,
    file_type: FileType,
}

/// Lowercase a path and normalize separators to `/`.
fn normalize(path: &str) -> String {
    path.replace('\\', "/")
        .trim_start_matches('/')
        .to_ascii_lowercase()
}

impl FilePath {
    /// Build a path from a directory root and a relative filename that
    /// still carries its extension.
    pub fn new(directory: GameDirectory, relative_with_extension: &str) -> Self {
        let normalized = normalize(relative_with_extension);
        let (relative, file_type) = match normalized.rfind('.') {
            Some(dot) if !normalized[dot + 1..].contains('/') => (
                normalized[..dot].to_string(),
                FileType::from_extension(&normalized[dot + 1..]),
            ),
            _ => (normalized, FileType::Unknown),
        };
        Self {
            directory,
            relative,
            file_type,
        }
    }

    /// Shorthand for a [`GameDirectory::Config`] path.
    pub fn config(relative_with_extension: &str) -> Self {
        Self::new(GameDirectory::Config, relative_with_extension)
    }

    /// Shorthand for a [`GameDirectory::Content`] path.
    pub fn content(relative_with_extension: &str) -> Self {
        Self::new(GameDirectory::Content, relative_with_extension)
    }

    /// Parse a `config://...` / `content://...` reference string.
    pub fn from_reference(reference: &str) -> Option<Self> {
        let (scheme, rest) = reference.split_once("://")?;
        let directory = match scheme.to_ascii_lowercase().as_str() {
            "config" => GameDirectory::Config,
            "content" => GameDirectory::Content,
            _ => return None,
        };
        if rest.is_empty() {
            return None;
        }
        Some(Self::new(directory, rest))
    }

    /// The directory root.
    pub fn directory(&self) -> GameDirectory {
        self.directory
    }

    /// The cooked file type.
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Relative path without extension (normalized, lowercase, `/`).
    pub fn relative_without_extension(&self) -> &str {
        &self.relative
    }

    /// Relative filename including the cooked extension.
    pub fn relative_filename(&self) -> String {
        format!("{}{}", self.relative, self.file_type.cooked_extension())
    }

    /// Final path component without extension.
    pub fn file_name(&self) -> &str {
        self.relative
            .rsplit_once('/')
            .map_or(self.relative.as_str(), |(_, name)| name)
    }

    /// Same path with a different file type.
    pub fn with_type(&self, file_type: FileType) -> Self {
        Self {
            directory: self.directory,
            relative: self.relative.clone(),
            file_type,
        }
    }

    /// All mip-level variants of this path if it is a texture, otherwise
    /// just the path itself.
    pub fn mip_group(&self) -> Vec<Self> {
        if self.file_type.is_texture() {
            TEXTURE_TYPES.iter().map(|t| self.with_type(*t)).collect()
        } else {
            vec![self.clone()]
        }
    }

    /// A path is valid when it names something.
    pub fn is_valid(&self) -> bool {
        !self.relative.is_empty() && self.directory != GameDirectory::Unknown
    }
}

impl std::fmt::Display for FilePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}://{}",
            self.directory.scheme(),
            self.relative_filename()
        )
    }
}

impl Serialize for FilePath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FilePath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_reference(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid file path reference: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_round_trip() {
        for t in [
            FileType::Json,
            FileType::FxBank,
            FileType::Texture0,
            FileType::Texture4,
            FileType::SoundBank,
            FileType::UiMovie,
        ] {
            let ext = t.cooked_extension();
            assert_eq!(FileType::from_extension(&ext[1..]), t);
        }
    }

    #[test]
    fn test_normalization() {
        let a = FilePath::content("Authored\\UI\\Button.sif0");
        let b = FilePath::content("authored/ui/button.sif0");
        assert_eq!(a, b);
        assert_eq!(a.relative_filename(), "authored/ui/button.sif0");
        assert_eq!(a.file_name(), "button");
    }

    #[test]
    fn test_type_is_part_of_identity() {
        let a = FilePath::content("a/b.sif0");
        let b = a.with_type(FileType::Texture1);
        assert_ne!(a, b);
        assert_eq!(a.relative_without_extension(), b.relative_without_extension());
    }

    #[test]
    fn test_mip_group() {
        let group = FilePath::content("a/b.sif2").mip_group();
        assert_eq!(group.len(), 5);
        assert_eq!(group[0].file_type(), FileType::Texture0);
        assert_eq!(group[4].file_type(), FileType::Texture4);

        let single = FilePath::config("a.json").mip_group();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_reference_parsing() {
        let p = FilePath::from_reference("config://Loc/en/locale.json").unwrap();
        assert_eq!(p.directory(), GameDirectory::Config);
        assert_eq!(p.file_type(), FileType::Json);
        assert_eq!(p.to_string(), "config://loc/en/locale.json");

        assert!(FilePath::from_reference("save://x.json").is_none());
        assert!(FilePath::from_reference("no-scheme.json").is_none());
    }
}
