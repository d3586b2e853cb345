// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic documents and cover images for tests and benchmarks.
//
// Built only under `cfg(test)` or the `test-support` feature. Panics on
// failure; these are fixtures, not library code.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::cover::{CoverImage, DEFAULT_JPEG_QUALITY};

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
            255,
        ])
    })
}

/// A normalized cover of the given size.
pub fn cover_image(width: u32, height: u32) -> CoverImage {
    CoverImage::from_dynamic(DynamicImage::ImageRgba8(gradient(width, height)), DEFAULT_JPEG_QUALITY)
        .expect("fixture cover encodes")
}

/// Write a PNG cover source into `dir` and return its path.
pub fn write_cover_png(dir: &Path, width: u32, height: u32) -> PathBuf {
    let path = dir.join("cover.png");
    gradient(width, height)
        .save(&path)
        .expect("fixture PNG is written");
    path
}

/// A PDF with `pages` US-letter pages, each showing its page number.
pub fn sample_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages);
    for number in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24_i64.into()]),
                Operation::new("Td", vec![72_i64.into(), 700_i64.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Page {number}"))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            content.encode().expect("fixture content encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0_i64.into(), 0_i64.into(), 612_i64.into(), 792_i64.into()],
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "Resources" => resources_id,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture PDF serialises");
    bytes
}

const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

fn chapter(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{title}</title><link rel="stylesheet" href="../style.css"/></head>
<body><h1>{title}</h1><p>Lorem ipsum dolor sit amet.</p></body>
</html>"#
    )
}

fn ncx(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="urn:uuid:deckblatt-fixture"/></head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
    <navPoint id="np-1" playOrder="1">
      <navLabel><text>Chapter One</text></navLabel>
      <content src="text/ch1.xhtml"/>
    </navPoint>
    <navPoint id="np-2" playOrder="2">
      <navLabel><text>Chapter Two</text></navLabel>
      <content src="text/ch2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#
    )
}

const NAV_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Navigation</title></head>
<body>
<nav epub:type="toc" id="toc">
  <h1>Contents</h1>
  <ol>
    <li><a href="text/ch1.xhtml">Chapter One</a></li>
    <li><a href="text/ch2.xhtml">Chapter Two</a></li>
  </ol>
</nav>
<nav epub:type="landmarks" hidden="">
  <ol><li><a epub:type="bodymatter" href="text/ch1.xhtml">Start</a></li></ol>
</nav>
</body>
</html>"#;

fn zip_entries(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file("mimetype", stored).expect("zip entry starts");
    zip.write_all(b"application/epub+zip").expect("zip entry written");
    for (name, content) in entries {
        zip.start_file(*name, deflated).expect("zip entry starts");
        zip.write_all(content).expect("zip entry written");
    }
    zip.finish().expect("zip finishes").into_inner()
}

/// An EPUB 3 book with a navigation document, an NCX, two chapters and a
/// stylesheet. Spine: `[nav, ch1, ch2]`. Without `title` there is no
/// `dc:title` at all.
pub fn sample_epub(title: Option<&str>) -> Vec<u8> {
    sample_epub_with_nav(title, NAV_XHTML)
}

/// Like [`sample_epub`], with `nav` as the navigation document at
/// `OEBPS/nav.xhtml`.
pub fn sample_epub_with_nav(title: Option<&str>, nav: &str) -> Vec<u8> {
    let title_element = title
        .map(|title| format!("<dc:title>{title}</dc:title>"))
        .unwrap_or_default();
    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="bookid">urn:uuid:deckblatt-fixture</dc:identifier>
    {title_element}
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">2026-01-01T00:00:00Z</meta>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="nav"/>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#
    );

    let ncx = ncx(title.unwrap_or(""));
    let ch1 = chapter("Chapter One");
    let ch2 = chapter("Chapter Two");
    zip_entries(&[
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", opf.as_bytes()),
        ("OEBPS/nav.xhtml", nav.as_bytes()),
        ("OEBPS/toc.ncx", ncx.as_bytes()),
        ("OEBPS/text/ch1.xhtml", ch1.as_bytes()),
        ("OEBPS/text/ch2.xhtml", ch2.as_bytes()),
        ("OEBPS/style.css", b"body { font-family: serif; }".as_slice()),
    ])
}

/// An EPUB 2 book: NCX only, no navigation document, a guide. Spine:
/// `[ch1, ch2]`, title "Beta".
pub fn sample_epub2() -> Vec<u8> {
    let opf = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:identifier id="bookid" opf:scheme="UUID">urn:uuid:deckblatt-fixture</dc:identifier>
    <dc:title>Beta</dc:title>
    <dc:creator opf:role="aut">A. Writer</dc:creator>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
  <guide>
    <reference type="text" title="Start" href="text/ch1.xhtml"/>
  </guide>
</package>"#;

    let ncx = ncx("Beta");
    let ch1 = chapter("Chapter One");
    let ch2 = chapter("Chapter Two");
    zip_entries(&[
        ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
        ("OEBPS/content.opf", opf.as_bytes()),
        ("OEBPS/toc.ncx", ncx.as_bytes()),
        ("OEBPS/text/ch1.xhtml", ch1.as_bytes()),
        ("OEBPS/text/ch2.xhtml", ch2.as_bytes()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_pdf_has_requested_pages() {
        for pages in [0, 1, 3] {
            let doc = Document::load_mem(&sample_pdf(pages)).unwrap();
            assert_eq!(doc.get_pages().len(), pages);
        }
    }
}
