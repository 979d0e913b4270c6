use std::fs;
use std::io::{Cursor, Read};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use zip::ZipArchive;

use meta_retrieve::archive::{MemoryFile, archive, build_from_memory};
use meta_retrieve::domain::PathRegistry;
use meta_retrieve::error::RetrieveError;
use meta_retrieve::extract::extract_archive;
use meta_retrieve::fs_util::LocalFs;

fn entry_names(bytes: Vec<u8>) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    archive.file_names().map(str::to_string).collect()
}

fn sample_site() -> tempfile::TempDir {
    let temp = tempfile::tempdir().unwrap();
    let site = temp.path().join("site");
    fs::create_dir_all(site.join("pages")).unwrap();
    fs::create_dir_all(site.join("empty")).unwrap();
    fs::write(site.join("pages/Home.json"), r#"{"name":"Home"}"#).unwrap();
    fs::write(site.join("pages/Home.xml"), "<page/>").unwrap();
    fs::write(site.join("site.json"), "{}").unwrap();
    temp
}

#[test]
fn directory_is_the_single_top_level_item() {
    let temp = sample_site();
    let mut out = Vec::new();
    archive(&temp.path().join("site"), &mut out).unwrap();

    let mut names = entry_names(out);
    names.sort();
    assert_eq!(
        names,
        vec!["site/pages/Home.json", "site/pages/Home.xml", "site/site.json"]
    );
}

#[test]
fn trailing_separator_puts_contents_at_root() {
    let temp = sample_site();
    let source = format!("{}/", temp.path().join("site").display());
    let mut out = Vec::new();
    archive(std::path::Path::new(&source), &mut out).unwrap();

    let mut names = entry_names(out);
    names.sort();
    assert_eq!(names, vec!["pages/Home.json", "pages/Home.xml", "site.json"]);
}

#[test]
fn failed_walk_writes_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let mut out = Vec::new();
    let err = archive(&temp.path().join("missing"), &mut out).unwrap_err();
    assert_matches!(err, RetrieveError::ArchiveWrite(_));
    assert!(out.is_empty());
}

#[test]
fn packed_directory_extracts_back() {
    let temp = sample_site();
    let mut out = Vec::new();
    archive(&temp.path().join("site"), &mut out).unwrap();

    let target = Utf8PathBuf::from_path_buf(temp.path().join("restored")).unwrap();
    let mut registry = PathRegistry::new();
    extract_archive(Cursor::new(out), &target, &mut registry, &LocalFs).unwrap();

    let restored = fs::read_to_string(target.join("site/pages/Home.json")).unwrap();
    assert_eq!(restored, r#"{"name":"Home"}"#);
}

#[test]
fn memory_archive_keeps_order_and_content() {
    let mut cursor = build_from_memory(&[
        MemoryFile::new("pages/B.json", "b"),
        MemoryFile::new("pages/A.json", "a"),
    ])
    .unwrap();
    let mut archive = ZipArchive::new(&mut cursor).unwrap();
    assert_eq!(archive.by_index(0).unwrap().name(), "pages/B.json");

    let mut body = String::new();
    archive
        .by_index(1)
        .unwrap()
        .read_to_string(&mut body)
        .unwrap();
    assert_eq!(body, "a");
}
