//! End-to-end cook scenarios: configuration in, archives out.

use std::fs;
use std::path::{Path, PathBuf};

use sar_core::sar::SarArchive;
use sar_core::{ContentEnv, CookTask, DiskCookContext, PackageCookConfig, PackageCookTask};
use sar_schema::{FilePath, SAR_SIGNATURE, SAR_VERSION};
use serde_json::Value;

fn write(root: &Path, rel: &str, bytes: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

/// Run one full cook for the given configuration JSON, returning the
/// directory archives were written into.
fn cook(root: &Path, config_name: &str, config_json: &str) -> PathBuf {
    write(root, config_name, config_json.as_bytes());
    let config = PackageCookConfig::load(&root.join(config_name), false).unwrap();
    let env = ContentEnv::new(
        root.join("Config"),
        root.join("Content"),
        root.join("Source"),
        config.platform,
    );
    let ctx = DiskCookContext::new(config, env);
    let task = PackageCookTask::new();
    task.validate_content_environment(&ctx).unwrap();
    task.cook_all_out_of_date_content(&ctx).unwrap();
    root.to_path_buf()
}

#[test]
fn test_single_file_archive() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Content/audio/music.bank", b"0123456789");

    let out = cook(
        dir.path(),
        "cook.json",
        r#"{
            "Platform": "PC",
            "Packages": [{
                "Name": "Audio",
                "GameDirectoryType": "Content",
                "NonDependencySearchPatterns": ["*.bank"]
            }]
        }"#,
    );

    let bytes = fs::read(out.join("Audio.sar")).unwrap();
    assert_eq!(&bytes[0..4], &SAR_SIGNATURE.to_le_bytes());
    assert_eq!(&bytes[4..8], &SAR_VERSION.to_le_bytes());

    let mut archive = SarArchive::open(&out.join("Audio.sar")).unwrap();
    assert_eq!(archive.header().entry_count, 1);
    let path = FilePath::content("audio/music.bank");
    let entry = archive.entry(&path).unwrap().clone();
    assert_eq!(entry.uncompressed_size, 10);
    assert_eq!(entry.compressed_size, 10);
    assert_eq!(entry.crc32_pre, entry.crc32_post);
    assert_eq!(archive.read_all(&path, None).unwrap(), b"0123456789");
}

#[test]
fn test_compressed_obfuscated_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let body = vec![0x42u8; 4096];
    write(dir.path(), "Content/tables/stats.dat", &body);
    write(dir.path(), "Source/tables/stats.xlsx", b"src");

    let out = cook(
        dir.path(),
        "cook.json",
        r#"{
            "Platform": "PC",
            "Packages": [{
                "Name": "Tables",
                "GameDirectoryType": "Content",
                "NonDependencySearchPatterns": ["*.dat"],
                "CompressFiles": true,
                "Obfuscate": true
            }]
        }"#,
    );

    let mut archive = SarArchive::open(&out.join("Tables.sar")).unwrap();
    assert!(archive.header().obfuscated);
    let path = FilePath::content("tables/stats.dat");
    let entry = archive.entry(&path).unwrap().clone();
    assert!(entry.compressed_size < entry.uncompressed_size);
    assert_ne!(entry.crc32_pre, entry.crc32_post);
    assert_eq!(archive.read_all(&path, None).unwrap(), body);
}

#[test]
fn test_delta_archive_skips_unchanged_entries() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Content/a/x.dat", b"unchanged payload");
    write(dir.path(), "Content/a/z.dat", b"fresh payload");
    write(dir.path(), "Source/a/x.xlsx", b"s");
    write(dir.path(), "Source/a/z.xlsx", b"s");

    cook(
        dir.path(),
        "first.json",
        r#"{
            "Platform": "PC",
            "Packages": [{
                "Name": "A",
                "GameDirectoryType": "Content",
                "NonDependencySearchPatterns": ["*.dat"],
                "IncludeFiles": ["a/x.dat"]
            }]
        }"#,
    );

    let out = cook(
        dir.path(),
        "second.json",
        r#"{
            "Platform": "PC",
            "Packages": [{
                "Name": "B",
                "GameDirectoryType": "Content",
                "NonDependencySearchPatterns": ["*.dat"],
                "DeltaArchives": ["A"]
            }]
        }"#,
    );

    let archive = SarArchive::open(&out.join("B.sar")).unwrap();
    assert_eq!(archive.header().entry_count, 1);
    assert!(archive.entry(&FilePath::content("a/z.dat")).is_some());
    assert!(archive.entry(&FilePath::content("a/x.dat")).is_none());
}

#[test]
fn test_locale_patch_diffs_archived_base_against_disk_base() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "Config/loc/en/locale.json",
        br#"{"GREETING": "hello", "FAREWELL": "goodbye"}"#,
    );

    cook(
        dir.path(),
        "base.json",
        r#"{
            "Platform": "PC",
            "Packages": [{
                "Name": "LocBase",
                "GameDirectoryType": "Config",
                "NonDependencySearchPatterns": ["*.json"]
            }]
        }"#,
    );

    // Translators update the shipped base file in place; the patch
    // entry on disk is only a stub marker whose body is generated.
    write(
        dir.path(),
        "Config/loc/en/locale.json",
        br#"{"GREETING": "hello", "FAREWELL": "farewell"}"#,
    );
    write(dir.path(), "Config/loc/en/locale_patch.json", b"{}");

    let out = cook(
        dir.path(),
        "patch.json",
        r#"{
            "Platform": "PC",
            "Packages": [{
                "Name": "LocPatch",
                "GameDirectoryType": "Config",
                "NonDependencySearchPatterns": ["*.json"],
                "IncludeFiles": ["loc/*"],
                "LocaleBaseArchive": "LocBase",
                "LocaleBaseFilename": "locale.json",
                "LocalePatchFilename": "locale_patch.json"
            }]
        }"#,
    );

    let mut archive = SarArchive::open(&out.join("LocPatch.sar")).unwrap();
    let patch_path = FilePath::config("loc/en/locale_patch.json");
    let patch: Value =
        serde_json::from_slice(&archive.read_all(&patch_path, None).unwrap()).unwrap();
    assert_eq!(patch, serde_json::json!({"FAREWELL": "farewell"}));

    // The base entry ships verbatim from the base archive.
    let base_path = FilePath::config("loc/en/locale.json");
    let base: Value = serde_json::from_slice(&archive.read_all(&base_path, None).unwrap()).unwrap();
    assert_eq!(base["FAREWELL"], "goodbye");
}

#[test]
fn test_variation_archive_touches_only_its_targets() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Config/hud.json", br#"{"Scale": 1.0}"#);
    write(dir.path(), "Config/audio.json", br#"{"Volume": 0.8}"#);
    write(
        dir.path(),
        "Config/variation_big_hud.txt",
        b"@@append_to \"config://hud.json\"\n[[\"$set\", \"Scale\", 2.0]]\n",
    );

    let out = cook(
        dir.path(),
        "cook.json",
        r#"{
            "Platform": "PC",
            "Packages": [{
                "Name": "Cfg",
                "GameDirectoryType": "Config",
                "NonDependencySearchPatterns": ["*.json"],
                "Variations": ["config://variation_big_hud.txt"]
            }]
        }"#,
    );

    let mut base = SarArchive::open(&out.join("Cfg.sar")).unwrap();
    let mut varied = SarArchive::open(&out.join("Cfg_Variation_1.sar")).unwrap();
    assert_eq!(varied.header().variation, 1);
    assert_eq!(base.header().variation, 0);
    assert_eq!(varied.header().entry_count, base.header().entry_count);

    let hud = FilePath::config("hud.json");
    let hud_tree: Value = serde_json::from_slice(&varied.read_all(&hud, None).unwrap()).unwrap();
    assert_eq!(hud_tree, serde_json::json!({"Scale": 2.0}));

    // Untouched entries are byte-identical to the base archive.
    let audio = FilePath::config("audio.json");
    assert_eq!(
        base.read_all(&audio, None).unwrap(),
        varied.read_all(&audio, None).unwrap()
    );
    let base_entry = base.entry(&audio).unwrap();
    let varied_entry = varied.entry(&audio).unwrap();
    assert_eq!(base_entry.crc32_post, varied_entry.crc32_post);
    assert_eq!(base_entry.modified_time, varied_entry.modified_time);
}

#[test]
fn test_overflow_archive_written_alongside_base() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Content/t/a.sif0", &[1u8; 300]);
    write(dir.path(), "Content/t/b.sif0", &[2u8; 300]);
    write(dir.path(), "Source/t/a.png", b"s");
    write(dir.path(), "Source/t/b.png", b"s");

    let out = cook(
        dir.path(),
        "cook.json",
        r#"{
            "Platform": "PC",
            "Packages": [{
                "Name": "Textures",
                "GameDirectoryType": "Content",
                "NonDependencySearchPatterns": ["*.sif0"],
                "Overflow": "TexturesOverflow",
                "OverflowTargetBytes": 400
            }]
        }"#,
    );

    let base = SarArchive::open(&out.join("Textures.sar")).unwrap();
    let spill = SarArchive::open(&out.join("TexturesOverflow.sar")).unwrap();
    assert_eq!(base.header().entry_count, 1);
    assert_eq!(spill.header().entry_count, 1);
}

#[test]
fn test_minified_json_package() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Config/chat.json", b"{\n  \"A\": 1,\n  \"B\": [2, 3]\n}\n");

    let out = cook(
        dir.path(),
        "cook.json",
        r#"{
            "Platform": "PC",
            "Packages": [{
                "Name": "Cfg",
                "GameDirectoryType": "Config",
                "NonDependencySearchPatterns": ["*.json"],
                "MinifyJson": true
            }]
        }"#,
    );

    let mut archive = SarArchive::open(&out.join("Cfg.sar")).unwrap();
    let body = archive
        .read_all(&FilePath::config("chat.json"), None)
        .unwrap();
    assert_eq!(body, br#"{"A":1,"B":[2,3]}"#);
}

#[test]
fn test_zip_package_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Content/audio/music.bank", b"pcm data");

    let out = cook(
        dir.path(),
        "cook.json",
        r#"{
            "Platform": "PC",
            "Packages": [{
                "Name": "AudioZip",
                "GameDirectoryType": "Content",
                "NonDependencySearchPatterns": ["*.bank"],
                "ZipArchive": true,
                "CompressFiles": true
            }]
        }"#,
    );

    let file = fs::File::open(out.join("AudioZip.zip")).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    assert_eq!(archive.len(), 1);
    let mut body = Vec::new();
    std::io::Read::read_to_end(
        &mut archive.by_name("audio/music.bank").unwrap(),
        &mut body,
    )
    .unwrap();
    assert_eq!(body, b"pcm data");
}

#[test]
fn test_manifest_mirrors_file_table() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Content/audio/music.bank", b"0123456789");

    let out = cook(
        dir.path(),
        "cook.json",
        r#"{
            "Platform": "PC",
            "Packages": [{
                "Name": "Audio",
                "GameDirectoryType": "Content",
                "NonDependencySearchPatterns": ["*.bank"],
                "Manifest": true
            }]
        }"#,
    );

    // The manifest opens like an archive (header + table) but carries no
    // bodies, so it is much smaller than the real thing plus readable.
    let manifest = SarArchive::open(&out.join("Audio.manifest.sar")).unwrap();
    assert_eq!(manifest.header().entry_count, 1);
    assert!(
        manifest
            .entry(&FilePath::content("audio/music.bank"))
            .is_some()
    );
}
