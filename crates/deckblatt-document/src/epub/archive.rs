// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// EPUB zip container: unpacking into an `EpubPackage` and packing it back.

use std::borrow::Cow;
use std::io::{Cursor, Read, Write};

use deckblatt_core::error::{DeckblattError, Result};
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use tracing::{debug, instrument};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::opf::{attributes_of, parse_opf, render_opf};
use super::package::{EpubPackage, TocEntry};
use super::toc::{parse_ncx, parse_nav, update_ncx, update_nav};

pub const MIMETYPE_PATH: &str = "mimetype";
pub const CONTAINER_PATH: &str = "META-INF/container.xml";
pub const EPUB_MIMETYPE: &str = "application/epub+zip";
const OPF_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Unpack and parse an EPUB held in memory.
#[instrument(skip_all, fields(bytes_len = data.len()))]
pub fn read_package(data: &[u8]) -> Result<EpubPackage> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|err| DeckblattError::EpubParse(format!("not a zip archive: {}", err)))?;

    let mut entries: Vec<(String, Vec<u8>)> = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(|err| {
            DeckblattError::EpubParse(format!("unreadable zip entry {}: {}", index, err))
        })?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut content = Vec::new();
        file.read_to_end(&mut content).map_err(|err| {
            DeckblattError::EpubParse(format!("cannot decompress {}: {}", name, err))
        })?;
        entries.push((name, content));
    }

    let container = entry(&entries, CONTAINER_PATH).ok_or_else(|| {
        DeckblattError::EpubParse(format!("missing {}", CONTAINER_PATH))
    })?;
    let opf_path = rootfile_path(utf8(container, CONTAINER_PATH)?)?;
    let opf_xml = entry(&entries, &opf_path).ok_or_else(|| {
        DeckblattError::EpubParse(format!("package document {} is missing", opf_path))
    })?;
    let mut package = parse_opf(&opf_path, utf8(opf_xml, &opf_path)?)?;

    // Hand every manifest item its file, remembering which entries were claimed.
    // Remote resources have no file in the container.
    let mut claimed = vec![false; entries.len()];
    let locations: Vec<(String, String)> = package
        .items()
        .filter(|item| !item.is_remote())
        .map(|item| (item.id.clone(), package.item_path(item)))
        .collect();
    for (id, path) in locations {
        let index = entries
            .iter()
            .position(|(name, _)| *name == path)
            .or_else(|| {
                let decoded = urlencoding::decode(&path).ok()?;
                entries.iter().position(|(name, _)| *name == decoded)
            })
            .ok_or_else(|| {
                DeckblattError::EpubParse(format!(
                    "manifest item {:?} refers to missing file {}",
                    id, path
                ))
            })?;

        let (name, content) = &mut entries[index];
        let content = if claimed[index] {
            content.clone()
        } else {
            std::mem::take(content)
        };
        if *name != path {
            package.entry_names.insert(id.clone(), name.clone());
        }
        claimed[index] = true;
        if let Some(item) = package.item_mut(&id) {
            item.content = content;
        }
    }

    package.resources = entries
        .into_iter()
        .zip(claimed)
        .filter(|((name, _), claimed)| !claimed && *name != opf_path && name != MIMETYPE_PATH)
        .map(|(entry, _)| entry)
        .collect();

    for entry in &package.spine {
        if !package.contains_item(&entry.idref) {
            return Err(DeckblattError::EpubParse(format!(
                "spine references unknown manifest id {:?}",
                entry.idref
            )));
        }
    }

    if let Some((path, toc)) = read_toc(&package)? {
        package.toc = toc;
        package.toc_path = Some(path);
    }
    debug!(
        opf = %package.opf_path(),
        items = package.item_count(),
        spine = package.spine.len(),
        toc = package.toc.len(),
        "EPUB package read"
    );
    Ok(package)
}

/// The TOC and the zip path of the file it came from: the navigation
/// document when there is one, else the NCX.
fn read_toc(package: &EpubPackage) -> Result<Option<(String, Vec<TocEntry>)>> {
    if let Some(item) = package.nav_item_id().and_then(|id| package.item(id)) {
        let path = package.entry_name(item);
        let toc = parse_nav(package, &path, utf8(&item.content, &path)?)?;
        return Ok(Some((path, toc)));
    }
    if let Some(item) = package.ncx_item_id().and_then(|id| package.item(id)) {
        let path = package.entry_name(item);
        let toc = parse_ncx(package, &path, utf8(&item.content, &path)?)?;
        return Ok(Some((path, toc)));
    }
    debug!("Package has no navigation document");
    Ok(None)
}

/// Serialise a package into a complete EPUB archive.
#[instrument(skip_all, fields(opf = %package.opf_path()))]
pub fn write_package(package: &EpubPackage) -> Result<Vec<u8>> {
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    // Readers sniff the first entry; it must be the uncompressed mimetype.
    writer
        .start_file(MIMETYPE_PATH, stored)
        .map_err(zip_error)?;
    writer.write_all(EPUB_MIMETYPE.as_bytes())?;

    if !package.resources.iter().any(|(name, _)| name == CONTAINER_PATH) {
        writer
            .start_file(CONTAINER_PATH, deflated)
            .map_err(zip_error)?;
        writer.write_all(render_container(package.opf_path()).as_bytes())?;
    }
    for (name, content) in &package.resources {
        writer.start_file(name.as_str(), deflated).map_err(zip_error)?;
        writer.write_all(content)?;
    }

    writer
        .start_file(package.opf_path(), deflated)
        .map_err(zip_error)?;
    writer.write_all(render_opf(package).as_bytes())?;

    let nav_id = package.nav_item_id();
    let ncx_id = package.ncx_item_id();
    for item in package.items().filter(|item| !item.is_remote()) {
        let name = package.entry_name(item);
        let content: Cow<'_, [u8]> = if Some(item.id.as_str()) == nav_id {
            let xml = utf8(&item.content, &name).map_err(as_write_error)?;
            Cow::Owned(update_nav(package, &name, xml)?.into_bytes())
        } else if Some(item.id.as_str()) == ncx_id {
            let xml = utf8(&item.content, &name).map_err(as_write_error)?;
            Cow::Owned(update_ncx(package, &name, xml)?.into_bytes())
        } else {
            Cow::Borrowed(&item.content)
        };

        // Images are already compressed.
        let options = if item.media_type.starts_with("image/") {
            stored
        } else {
            deflated
        };
        writer.start_file(name, options).map_err(zip_error)?;
        writer.write_all(&content)?;
    }

    let bytes = writer.finish().map_err(zip_error)?.into_inner();
    debug!(bytes_len = bytes.len(), "EPUB package written");
    Ok(bytes)
}

/// Full path of the first package document named by `container.xml`.
fn rootfile_path(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut fallback = None;
    loop {
        let event = reader.read_event().map_err(|err| {
            DeckblattError::EpubParse(format!("malformed {}: {}", CONTAINER_PATH, err))
        })?;
        match event {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                let attributes = attributes_of(&e)?;
                let lookup = |wanted: &str| {
                    attributes
                        .iter()
                        .find(|(key, _)| key == wanted)
                        .map(|(_, value)| value.clone())
                };
                let Some(path) = lookup("full-path") else {
                    continue;
                };
                let path = path.trim_start_matches('/').to_string();
                match lookup("media-type") {
                    Some(media_type) if media_type == OPF_MEDIA_TYPE => return Ok(path),
                    _ => {
                        fallback.get_or_insert(path);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    fallback.ok_or_else(|| {
        DeckblattError::EpubParse(format!("{} names no package document", CONTAINER_PATH))
    })
}

fn render_container(opf_path: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n\
         <rootfiles>\n\
         <rootfile full-path=\"{}\" media-type=\"{}\"/>\n\
         </rootfiles>\n\
         </container>\n",
        escape(opf_path),
        OPF_MEDIA_TYPE
    )
}

fn entry<'a>(entries: &'a [(String, Vec<u8>)], name: &str) -> Option<&'a [u8]> {
    entries
        .iter()
        .find(|(entry_name, _)| entry_name == name)
        .map(|(_, content)| content.as_slice())
}

fn utf8<'a>(bytes: &'a [u8], name: &str) -> Result<&'a str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes)
        .map_err(|err| DeckblattError::EpubParse(format!("{} is not valid UTF-8: {}", name, err)))
}

fn as_write_error(err: DeckblattError) -> DeckblattError {
    match err {
        DeckblattError::EpubParse(message) => DeckblattError::EpubWrite(message),
        other => other,
    }
}

fn zip_error(err: ZipError) -> DeckblattError {
    match err {
        ZipError::Io(err) => DeckblattError::Io(err),
        other => DeckblattError::EpubWrite(format!("zip error: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::package::ManifestItem;
    use crate::fixtures;

    #[test]
    fn reads_sample_package() {
        let package = read_package(&fixtures::sample_epub(Some("Alpha"))).unwrap();

        assert_eq!(package.opf_path(), "OEBPS/content.opf");
        assert_eq!(package.title(), Some("Alpha"));
        assert_eq!(package.spine_ids(), vec!["nav", "ch1", "ch2"]);
        assert_eq!(package.nav_item_id(), Some("nav"));
        assert_eq!(package.toc.len(), 2);
        assert_eq!(package.toc[0].id.as_deref(), Some("ch1"));
        assert!(!package.item("ch1").unwrap().content.is_empty());
        assert!(
            package
                .resources()
                .iter()
                .any(|(name, _)| name == CONTAINER_PATH)
        );
    }

    #[test]
    fn ncx_is_used_without_nav_document() {
        let package = read_package(&fixtures::sample_epub2()).unwrap();
        assert!(!package.is_epub3());
        assert_eq!(package.nav_item_id(), None);
        assert_eq!(package.ncx_item_id(), Some("ncx"));
        assert_eq!(package.toc[0].title, "Chapter One");
    }

    #[test]
    fn write_then_read_keeps_package() {
        let original = read_package(&fixtures::sample_epub(Some("Alpha"))).unwrap();
        let bytes = write_package(&original).unwrap();
        let reread = read_package(&bytes).unwrap();

        assert_eq!(reread.item_ids(), original.item_ids());
        assert_eq!(reread.spine, original.spine);
        assert_eq!(reread.toc, original.toc);
        assert_eq!(reread.metadata, original.metadata);
        assert_eq!(
            reread.item("ch2").unwrap().content,
            original.item("ch2").unwrap().content
        );
    }

    #[test]
    fn mimetype_is_first_and_stored() {
        let original = read_package(&fixtures::sample_epub(None)).unwrap();
        let bytes = write_package(&original).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let mut first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), MIMETYPE_PATH);
        assert_eq!(first.compression(), CompressionMethod::Stored);
        let mut content = String::new();
        first.read_to_string(&mut content).unwrap();
        assert_eq!(content, EPUB_MIMETYPE);
    }

    #[test]
    fn remote_resources_stay_in_the_manifest_only() {
        let mut package = read_package(&fixtures::sample_epub(Some("Alpha"))).unwrap();
        package.insert_item(ManifestItem::new(
            "font",
            "https://example.com/f.woff",
            "font/woff",
            Vec::new(),
        ));

        let bytes = write_package(&package).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        assert!(archive.file_names().all(|name| !name.contains("example.com")));

        let reread = read_package(&bytes).unwrap();
        let font = reread.item("font").unwrap();
        assert_eq!(font.href, "https://example.com/f.woff");
        assert!(font.is_remote());
        assert!(font.content.is_empty());
    }

    #[test]
    fn non_zip_input_is_parse_error() {
        let err = read_package(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, DeckblattError::EpubParse(_)));
    }

    #[test]
    fn missing_container_is_parse_error() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(MIMETYPE_PATH, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(EPUB_MIMETYPE.as_bytes()).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = read_package(&bytes).unwrap_err();
        assert!(err.to_string().contains("container.xml"));
    }

    #[test]
    fn container_is_generated_for_new_packages() {
        let package = EpubPackage::new("book.opf");
        let bytes = write_package(&package).unwrap();
        let reread = read_package(&bytes).unwrap();
        assert_eq!(reread.opf_path(), "book.opf");
        assert_eq!(reread.item_count(), 0);
    }
}
