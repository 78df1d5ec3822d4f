//! Dependency gathering.
//!
//! Starting from every non-excluded config JSON file, walks the generic
//! tree and each referenced asset's own format to build a deduplicated,
//! insertion-ordered set of required content. Texture references expand
//! into all mip-level variants as a group.
//!
//! Missing references are tolerated only when the referencing file is an
//! FX bank or JSON asset and the missing target is a texture; everything
//! else is recorded as fatal but traversal continues, so one run reports
//! the complete set of misses.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use sar_schema::{FilePath, FileType, file_path::TEXTURE_TYPES};
use serde_json::Value;
use tracing::error;

use crate::context::CookContext;
use crate::datastore::{parse_json, string_as_file_path};
use crate::error::{CookError, Result};

// Scene-asset chunk tags.
const CHUNK_ANIMATION_CLIP: i32 = 1;
const CHUNK_SKELETON: i32 = 2;
const CHUNK_MESH: i32 = 3;
const CHUNK_MATERIAL_LIBRARY: i32 = 4;
const DELIM_MATERIAL: i32 = 5;
const DELIM_MATERIAL_PARAMETER: i32 = 6;

// Material parameter type codes.
const PARAM_TEXTURE: u32 = 0;
const PARAM_FLOAT: u32 = 1;
const PARAM_VECTOR4: u32 = 2;

static IMG_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<img\s[^>]*?src\s*=\s*"([^"]+)""#).expect("img src pattern")
});

/// Accumulates the dependency closure for one cook invocation.
pub struct DependencyGatherer<'a> {
    ctx: &'a dyn CookContext,
    settings: Vec<FilePath>,
    resolved: HashMap<FilePath, Value>,
    set: HashSet<FilePath>,
    order: Vec<FilePath>,
    missing: Vec<(FilePath, FilePath)>,
}

impl std::fmt::Debug for DependencyGatherer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGatherer")
            .field("settings", &self.settings.len())
            .field("dependencies", &self.order.len())
            .field("missing", &self.missing.len())
            .finish()
    }
}

impl<'a> DependencyGatherer<'a> {
    /// Create an empty gatherer.
    pub fn new(ctx: &'a dyn CookContext) -> Self {
        Self {
            ctx,
            settings: Vec::new(),
            resolved: HashMap::new(),
            set: HashSet::new(),
            order: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Dependencies in first-seen order.
    pub fn dependencies(&self) -> &[FilePath] {
        &self.order
    }

    /// Parsed config roots, cached for later minify/cook reuse.
    pub fn resolved_settings(&self) -> &HashMap<FilePath, Value> {
        &self.resolved
    }

    /// List and parse the config roots (every JSON under the config
    /// directory not matched by `ConfigDirectoryExcludes`).
    pub fn gather_config_roots(&mut self) -> Result<()> {
        let files = self.ctx.env().list_config_json()?;
        self.settings.clear();
        for path in files {
            if self.ctx.config().is_excluded_from_configs(&path) {
                continue;
            }
            let bytes = self.ctx.env().read_all(&path)?;
            let value = parse_json(&bytes, &path)?;
            self.settings.push(path.clone());
            self.resolved.insert(path, value);
        }
        Ok(())
    }

    /// Trace the full closure from the gathered roots. Fails with the
    /// aggregate count when any reference was missing.
    pub fn gather_all(&mut self) -> Result<()> {
        for root in self.settings.clone() {
            let value = self
                .resolved
                .get(&root)
                .cloned()
                .ok_or_else(|| CookError::MissingFile(root.to_string()))?;
            if root.relative_without_extension().starts_with("loc/") {
                self.walk_loc_tree(&root, &value)?;
            } else {
                self.walk_tree(&root, &value)?;
            }
        }
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(CookError::MissingDependencies(self.missing.len()))
        }
    }

    /// Missing targets are allowed for textures referenced from FX banks
    /// or JSON content.
    fn should_report_missing(from: &FilePath, to: &FilePath) -> bool {
        if to.file_type().is_texture()
            && matches!(from.file_type(), FileType::FxBank | FileType::Json)
        {
            return false;
        }
        true
    }

    fn record_missing(&mut self, from: &FilePath, to: &FilePath) {
        if Self::should_report_missing(from, to) {
            error!("{from}: dependency \"{to}\" does not exist on disk");
            self.missing.push((from.clone(), to.clone()));
        }
    }

    /// Add one dependency and recurse into its own references.
    pub fn add_dependency(&mut self, from: &FilePath, to: &FilePath) -> Result<()> {
        if !self.ctx.env().exists(to) {
            // Keep scanning so one run reports every miss.
            self.record_missing(from, to);
            return Ok(());
        }

        // Any texture reference stands for its whole mip group.
        let root = if to.file_type().is_texture() {
            to.with_type(FileType::Texture0)
        } else {
            to.clone()
        };
        if !self.set.insert(root.clone()) {
            // Already processed.
            return Ok(());
        }
        self.order.push(root.clone());
        if root.file_type().is_texture() {
            for t in &TEXTURE_TYPES[1..] {
                let variant = root.with_type(*t);
                if self.set.insert(variant.clone()) {
                    self.order.push(variant);
                }
            }
        }

        match to.file_type() {
            FileType::Animation => self.scan_animation(to),
            FileType::FxBank => self.scan_fx_bank(to),
            FileType::SceneAsset => self.scan_scene_asset(to),
            FileType::ScenePrefab => self.scan_scene_prefab(to),
            FileType::SoundProject => self.scan_sound_project(to),
            FileType::UiMovie => self.scan_ui_movie(to),
            _ => Ok(()),
        }
    }

    /// Generic tree walk: arrays and tables recurse, file-reference
    /// strings become dependencies.
    pub fn walk_tree(&mut self, from: &FilePath, value: &Value) -> Result<()> {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.walk_tree(from, item)?;
                }
            }
            Value::Object(map) => {
                for item in map.values() {
                    self.walk_tree(from, item)?;
                }
            }
            Value::String(s) => {
                if let Some(dep) = string_as_file_path(s) {
                    self.add_dependency(from, &dep)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Localization walk: string leaves are scanned for inline markup
    /// image references (`<img src="...">`).
    fn walk_loc_tree(&mut self, from: &FilePath, value: &Value) -> Result<()> {
        match value {
            Value::Object(map) => {
                for item in map.values() {
                    self.walk_loc_tree(from, item)?;
                }
                Ok(())
            }
            Value::String(s) => {
                if !s.contains('<') {
                    return Ok(());
                }
                let sources: Vec<String> = IMG_SRC
                    .captures_iter(s)
                    .map(|c| c[1].to_string())
                    .collect();
                for src in sources {
                    // Substitution patterns are not expected to resolve.
                    if src.contains("${") {
                        continue;
                    }
                    let Some(dep) = string_as_file_path(&src) else {
                        continue;
                    };
                    self.add_dependency(from, &dep)?;
                }
                Ok(())
            }
            other => Err(CookError::AssetScan {
                path: from.clone(),
                reason: format!("unexpected node in locale file: {other}"),
            }),
        }
    }

    fn read_decompressed(&self, path: &FilePath) -> Result<Vec<u8>> {
        let compressed = self.ctx.env().read_all(path)?;
        zstd::stream::decode_all(&compressed[..]).map_err(|e| CookError::Compression {
            path: path.to_string(),
            source: e,
        })
    }

    /// Skeletal animation: walk the decompressed tree for attachment
    /// references, then pull in sibling palette images that share the
    /// referenced base filenames.
    fn scan_animation(&mut self, path: &FilePath) -> Result<()> {
        let raw = self.read_decompressed(path)?;
        let value = parse_json(&raw, path)?;

        let mut refs = Vec::new();
        collect_reference_strings(&value, &mut refs);
        let mut base_names = HashSet::new();
        for dep in refs {
            self.add_dependency(path, &dep)?;
            base_names.insert(dep.file_name().to_string());
        }
        self.add_palettes(&base_names, path)
    }

    /// Palette images live in sibling directories of the animation's
    /// base images and replace them by exact filename.
    fn add_palettes(&mut self, base_names: &HashSet<String>, animation: &FilePath) -> Result<()> {
        if base_names.is_empty() {
            return Ok(());
        }
        let source_dir = self.ctx.env().source_dir_of(animation);
        if !source_dir.is_dir() {
            return Ok(());
        }
        let animation_dir = animation
            .relative_without_extension()
            .rsplit_once('/')
            .map_or(String::new(), |(d, _)| d.to_string());

        let mut found = Vec::new();
        for entry in walkdir::WalkDir::new(&source_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| CookError::AssetScan {
                path: animation.clone(),
                reason: format!("failed listing palette images: {e}"),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".png") else {
                continue;
            };
            if !base_names.contains(&stem.to_ascii_lowercase()) {
                continue;
            }
            let Ok(sub) = entry.path().strip_prefix(&source_dir) else {
                continue;
            };
            let Some(sub) = sub.to_str() else { continue };
            let relative = if animation_dir.is_empty() {
                sub.to_string()
            } else {
                format!("{animation_dir}/{sub}")
            };
            found.push(FilePath::content(&relative).with_type(FileType::Texture0));
        }
        for dep in found {
            self.add_dependency(animation, &dep)?;
        }
        Ok(())
    }

    /// FX bank: no structured index, so scan the decompressed blob for
    /// `.`-delimited substrings between quote/NUL boundaries that parse
    /// as a known extension.
    fn scan_fx_bank(&mut self, path: &FilePath) -> Result<()> {
        let raw = self.read_decompressed(path)?;
        let mut deps = Vec::new();

        let mut i = 0;
        while i < raw.len() {
            if raw[i] != b'.' {
                i += 1;
                continue;
            }
            let dot = i;
            let mut end = dot;
            while end < raw.len() && raw[end] != 0 && raw[end] != b'"' {
                end += 1;
            }
            let ext = String::from_utf8_lossy(&raw[dot + 1..end]);
            if FileType::from_extension(&ext) != FileType::Unknown {
                let mut start = dot;
                while start > 0 {
                    if raw[start] == 0 || raw[start] == b'"' {
                        start += 1;
                        break;
                    }
                    start -= 1;
                }
                let candidate = String::from_utf8_lossy(&raw[start..end]).into_owned();
                let dep = string_as_file_path(&candidate)
                    .unwrap_or_else(|| FilePath::content(&candidate));
                deps.push(dep);
            }
            i = end.max(dot + 1);
        }

        for dep in deps {
            self.add_dependency(path, &dep)?;
        }
        Ok(())
    }

    /// Scene asset: typed chunk walk. Animation clip, skeleton, and mesh
    /// chunks are skipped by length; material libraries are structurally
    /// parsed for texture-typed parameters.
    fn scan_scene_asset(&mut self, path: &FilePath) -> Result<()> {
        let raw = self.read_decompressed(path)?;
        let mut cursor = ChunkReader::new(&raw, path);
        let mut deps = Vec::new();

        while !cursor.at_end() {
            let tag = cursor.read_i32("chunk tag")?;
            let size = cursor.read_u32("chunk size")?;
            match tag {
                CHUNK_ANIMATION_CLIP | CHUNK_SKELETON | CHUNK_MESH => {
                    cursor.skip(size as usize, "chunk body")?;
                }
                CHUNK_MATERIAL_LIBRARY => {
                    cursor.expect_delimiter(CHUNK_MATERIAL_LIBRARY)?;
                    let materials = cursor.read_u32("material count")?;
                    for _ in 0..materials {
                        cursor.expect_delimiter(DELIM_MATERIAL)?;
                        let _technique = cursor.read_string("material technique")?;
                        let parameters = cursor.read_u32("parameter count")?;
                        for _ in 0..parameters {
                            cursor.expect_delimiter(DELIM_MATERIAL_PARAMETER)?;
                            let _name = cursor.read_string("parameter name")?;
                            let kind = cursor.read_u32("parameter type")?;
                            match kind {
                                PARAM_TEXTURE => {
                                    let reference = cursor.read_string("texture reference")?;
                                    let dep = string_as_file_path(&reference)
                                        .unwrap_or_else(|| FilePath::content(&reference));
                                    deps.push(dep);
                                }
                                PARAM_FLOAT => cursor.skip(4, "float parameter")?,
                                PARAM_VECTOR4 => cursor.skip(16, "vector4 parameter")?,
                                other => {
                                    return Err(CookError::AssetScan {
                                        path: path.clone(),
                                        reason: format!("invalid material parameter type {other}"),
                                    });
                                }
                            }
                        }
                    }
                }
                other => {
                    return Err(CookError::AssetScan {
                        path: path.clone(),
                        reason: format!("invalid asset chunk tag {other}"),
                    });
                }
            }
        }

        for dep in deps {
            self.add_dependency(path, &dep)?;
        }
        Ok(())
    }

    /// Scene prefab: decompress and recurse with the generic walker.
    fn scan_scene_prefab(&mut self, path: &FilePath) -> Result<()> {
        let raw = self.read_decompressed(path)?;
        let value = parse_json(&raw, path)?;
        self.walk_tree(path, &value)
    }

    /// Sound project: declared bank list plus per-event bank
    /// dependencies.
    fn scan_sound_project(&mut self, path: &FilePath) -> Result<()> {
        let raw = self.read_decompressed(path)?;
        let value = parse_json(&raw, path)?;
        let mut deps = Vec::new();
        for bank in value.get("Banks").and_then(Value::as_array).into_iter().flatten() {
            if let Some(dep) = bank.as_str().and_then(string_as_file_path) {
                deps.push(dep);
            }
        }
        if let Some(events) = value.get("Events").and_then(Value::as_object) {
            for banks in events.values() {
                for bank in banks.as_array().into_iter().flatten() {
                    if let Some(dep) = bank.as_str().and_then(string_as_file_path) {
                        deps.push(dep);
                    }
                }
            }
        }
        for dep in deps {
            self.add_dependency(path, &dep)?;
        }
        Ok(())
    }

    /// UI movie: declared library dependency list.
    fn scan_ui_movie(&mut self, path: &FilePath) -> Result<()> {
        let raw = self.read_decompressed(path)?;
        let value = parse_json(&raw, path)?;
        let mut deps = Vec::new();
        for item in value
            .get("Dependencies")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let Some(dep) = item.as_str().and_then(string_as_file_path) {
                deps.push(dep);
            }
        }
        for dep in deps {
            self.add_dependency(path, &dep)?;
        }
        Ok(())
    }
}

/// Collect every file-reference string in a tree.
fn collect_reference_strings(value: &Value, out: &mut Vec<FilePath>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_reference_strings(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_reference_strings(item, out);
            }
        }
        Value::String(s) => {
            if let Some(dep) = string_as_file_path(s) {
                out.push(dep);
            }
        }
        _ => {}
    }
}

/// Little-endian cursor over a scene-asset blob.
struct ChunkReader<'a> {
    data: &'a [u8],
    offset: usize,
    path: &'a FilePath,
}

impl<'a> ChunkReader<'a> {
    fn new(data: &'a [u8], path: &'a FilePath) -> Self {
        Self {
            data,
            offset: 0,
            path,
        }
    }

    fn at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn error(&self, what: &str) -> CookError {
        CookError::AssetScan {
            path: self.path.clone(),
            reason: format!("truncated or corrupt data reading {what}"),
        }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(n).ok_or_else(|| self.error(what))?;
        if end > self.data.len() {
            return Err(self.error(what));
        }
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize, what: &str) -> Result<()> {
        self.take(n, what).map(|_| ())
    }

    fn read_i32(&mut self, what: &str) -> Result<i32> {
        let buf: [u8; 4] = self
            .take(4, what)?
            .try_into()
            .map_err(|_| self.error(what))?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        self.read_i32(what).map(|v| v as u32)
    }

    fn read_string(&mut self, what: &str) -> Result<String> {
        let len = self.read_u32(what)? as usize;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.error(what))
    }

    fn expect_delimiter(&mut self, tag: i32) -> Result<()> {
        let got = self.read_i32("delimiter")?;
        if got != tag {
            return Err(CookError::AssetScan {
                path: self.path.clone(),
                reason: format!("delimiter mismatch: expected {tag}, found {got}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use sar_schema::Platform;
    use serde_json::json;

    use super::*;
    use crate::config::PackageCookConfig;
    use crate::context::DiskCookContext;
    use crate::env::ContentEnv;

    fn context(dir: &std::path::Path) -> DiskCookContext {
        let env = ContentEnv::new(
            dir.join("Config"),
            dir.join("Content"),
            dir.join("Source"),
            Platform::Pc,
        );
        let config = PackageCookConfig::for_tests(dir.join("pkg.json"), Platform::Pc, Vec::new());
        DiskCookContext::new(config, env)
    }

    fn write(dir: &std::path::Path, rel: &str, bytes: &[u8]) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_dependency_set_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Content/audio/music.bank", b"pcm");
        let ctx = context(dir.path());
        let mut gatherer = DependencyGatherer::new(&ctx);

        let from = FilePath::config("audio.json");
        let to = FilePath::content("audio/music.bank");
        gatherer.add_dependency(&from, &to).unwrap();
        let count = gatherer.dependencies().len();
        gatherer.add_dependency(&from, &to).unwrap();
        assert_eq!(gatherer.dependencies().len(), count);
    }

    #[test]
    fn test_texture_reference_expands_mip_group() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(
                dir.path(),
                &format!("Content/authored/ui/button.sif{i}"),
                b"tex",
            );
        }
        let ctx = context(dir.path());
        let mut gatherer = DependencyGatherer::new(&ctx);

        let from = FilePath::config("ui.json");
        gatherer
            .add_dependency(&from, &FilePath::content("authored/ui/button.sif2"))
            .unwrap();
        let deps = gatherer.dependencies();
        assert_eq!(deps.len(), 5);
        for t in TEXTURE_TYPES {
            assert!(deps.contains(&FilePath::content("authored/ui/button.sif0").with_type(t)));
        }
    }

    #[test]
    fn test_missing_texture_from_json_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let mut gatherer = DependencyGatherer::new(&ctx);

        let from = FilePath::config("ui.json");
        gatherer
            .add_dependency(&from, &FilePath::content("missing/tex.sif0"))
            .unwrap();
        assert!(gatherer.missing.is_empty());

        // Missing non-texture is recorded.
        gatherer
            .add_dependency(&from, &FilePath::content("missing/music.bank"))
            .unwrap();
        assert_eq!(gatherer.missing.len(), 1);
    }

    #[test]
    fn test_generic_walk_finds_nested_references() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Content/audio/music.bank", b"pcm");
        let ctx = context(dir.path());
        let mut gatherer = DependencyGatherer::new(&ctx);

        let from = FilePath::config("root.json");
        let tree = json!({
            "Sections": [{"Audio": "content://audio/music.bank"}],
            "Title": "no reference here"
        });
        gatherer.walk_tree(&from, &tree).unwrap();
        assert_eq!(gatherer.dependencies(), &[FilePath::content("audio/music.bank")]);
    }

    #[test]
    fn test_loc_walk_extracts_img_src() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(dir.path(), &format!("Content/ui/icon.sif{i}"), b"tex");
        }
        let ctx = context(dir.path());
        let mut gatherer = DependencyGatherer::new(&ctx);

        let from = FilePath::config("loc/en/locale.json");
        let tree = json!({
            "GREETING": "Hello <img src=\"content://ui/icon.sif0\"> world",
            "SUBST": "skip <img src=\"content://ui/${name}.sif0\">",
            "PLAIN": "no markup"
        });
        gatherer.walk_loc_tree(&from, &tree).unwrap();
        assert_eq!(gatherer.dependencies().len(), 5);
    }

    #[test]
    fn test_fx_bank_scan_finds_extensions() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(dir.path(), &format!("Content/fx/spark.sif{i}"), b"tex");
        }
        let blob = b"\x00junk\x00fx/spark.sif0\x00more junk".to_vec();
        let compressed = zstd::bulk::compress(&blob, 1).unwrap();
        write(dir.path(), "Content/fx/explosion.fxb", &compressed);

        let ctx = context(dir.path());
        let mut gatherer = DependencyGatherer::new(&ctx);
        let from = FilePath::config("fx.json");
        gatherer
            .add_dependency(&from, &FilePath::content("fx/explosion.fxb"))
            .unwrap();
        assert!(
            gatherer
                .dependencies()
                .contains(&FilePath::content("fx/spark.sif0"))
        );
    }

    #[test]
    fn test_sound_project_banks_and_events() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Content/audio/master.bank", b"a");
        write(dir.path(), "Content/audio/combat.bank", b"b");
        let project = json!({
            "Banks": ["content://audio/master.bank"],
            "Events": {"event:/hit": ["content://audio/combat.bank"]}
        });
        let compressed = zstd::bulk::compress(project.to_string().as_bytes(), 1).unwrap();
        write(dir.path(), "Content/audio/game.fev", &compressed);

        let ctx = context(dir.path());
        let mut gatherer = DependencyGatherer::new(&ctx);
        let from = FilePath::config("audio.json");
        gatherer
            .add_dependency(&from, &FilePath::content("audio/game.fev"))
            .unwrap();
        let deps = gatherer.dependencies();
        assert!(deps.contains(&FilePath::content("audio/master.bank")));
        assert!(deps.contains(&FilePath::content("audio/combat.bank")));
    }

    #[test]
    fn test_palette_images_join_animation() {
        let dir = tempfile::tempdir().unwrap();
        // Animation references one bitmap; a palette directory carries a
        // same-named replacement.
        for i in 0..5 {
            write(dir.path(), &format!("Content/anim/hero/images/body.sif{i}"), b"t");
            write(dir.path(), &format!("Content/anim/hero/palette_red/body.sif{i}"), b"t");
        }
        write(dir.path(), "Source/anim/hero/palette_red/body.png", b"png");
        let animation = json!({
            "Skins": {"default": {"torso": "content://anim/hero/images/body.sif0"}}
        });
        let compressed = zstd::bulk::compress(animation.to_string().as_bytes(), 1).unwrap();
        write(dir.path(), "Content/anim/hero.san", &compressed);

        let ctx = context(dir.path());
        let mut gatherer = DependencyGatherer::new(&ctx);
        let from = FilePath::config("anim.json");
        gatherer
            .add_dependency(&from, &FilePath::content("anim/hero.san"))
            .unwrap();
        let deps = gatherer.dependencies();
        assert!(deps.contains(&FilePath::content("anim/hero/images/body.sif0")));
        assert!(deps.contains(&FilePath::content("anim/hero/palette_red/body.sif0")));
    }

    #[test]
    fn test_scene_asset_material_walk() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(dir.path(), &format!("Content/scenes/wall.sif{i}"), b"t");
        }

        let mut blob = Vec::new();
        let write_str = |out: &mut Vec<u8>, s: &str| {
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        };
        // A mesh chunk that must be skipped by length.
        blob.extend_from_slice(&CHUNK_MESH.to_le_bytes());
        blob.extend_from_slice(&4u32.to_le_bytes());
        blob.extend_from_slice(&[0xAA; 4]);
        // Material library: one material, texture + float parameters.
        // Body starts with a repeated library delimiter, then the count.
        let mut body = Vec::new();
        body.extend_from_slice(&CHUNK_MATERIAL_LIBRARY.to_le_bytes());
        body.extend_from_slice(&1u32.to_le_bytes());
        body.extend_from_slice(&DELIM_MATERIAL.to_le_bytes());
        write_str(&mut body, "lit");
        body.extend_from_slice(&2u32.to_le_bytes());
        body.extend_from_slice(&DELIM_MATERIAL_PARAMETER.to_le_bytes());
        write_str(&mut body, "DiffuseTexture");
        body.extend_from_slice(&PARAM_TEXTURE.to_le_bytes());
        write_str(&mut body, "content://scenes/wall.sif0");
        body.extend_from_slice(&DELIM_MATERIAL_PARAMETER.to_le_bytes());
        write_str(&mut body, "Gloss");
        body.extend_from_slice(&PARAM_FLOAT.to_le_bytes());
        body.extend_from_slice(&0.5f32.to_le_bytes());
        blob.extend_from_slice(&CHUNK_MATERIAL_LIBRARY.to_le_bytes());
        blob.extend_from_slice(&(body.len() as u32).to_le_bytes());
        blob.extend_from_slice(&body);

        let compressed = zstd::bulk::compress(&blob, 1).unwrap();
        write(dir.path(), "Content/scenes/room.ssa", &compressed);

        let ctx = context(dir.path());
        let mut gatherer = DependencyGatherer::new(&ctx);
        let from = FilePath::config("scene.json");
        gatherer
            .add_dependency(&from, &FilePath::content("scenes/room.ssa"))
            .unwrap();
        assert!(
            gatherer
                .dependencies()
                .contains(&FilePath::content("scenes/wall.sif0"))
        );
    }
}
