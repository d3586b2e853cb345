// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// EPUB cover rewriter: add the cover image and a cover page to a package,
// declare it in the metadata, and put the page at the front of the reading
// order and the table of contents.
//
// Every pre-existing spine entry, manifest item, and TOC entry is kept in its
// original relative order. A cover from an earlier run (recognised by the
// fixed ids below) is replaced, never duplicated.

use std::path::Path;

use deckblatt_core::error::{DeckblattError, Result};
use deckblatt_core::types::DocumentFormat;
use quick_xml::escape::escape;
use tracing::{debug, info, instrument};

use super::archive::{read_package, write_package};
use super::package::{
    EpubPackage, GuideReference, ManifestItem, MetaKey, MetaValue, SpineItem, TocEntry,
    XHTML_MEDIA_TYPE, resolve_path,
};
use crate::cover::CoverImage;
use crate::dispatch::{CoverEmbedder, EmbedReport};

/// Manifest id of the cover image.
pub const COVER_IMAGE_ID: &str = "deckblatt-cover-image";
/// Href of the cover image, relative to the package document.
pub const COVER_IMAGE_HREF: &str = "deckblatt-cover.jpg";
/// Manifest id of the cover page.
pub const COVER_PAGE_ID: &str = "deckblatt-cover-page";
/// Href of the cover page, relative to the package document.
pub const COVER_PAGE_HREF: &str = "deckblatt-cover.xhtml";
/// Title given to packages that have none.
pub const DEFAULT_TITLE: &str = "Untitled";
/// Label of the cover page in the TOC and guide.
pub const COVER_TITLE: &str = "Cover";

const COVER_PROPERTY: &str = "cover-image";
const GUIDE_COVER: &str = "cover";

/// Adds a cover image and cover page to EPUB packages.
#[derive(Debug, Clone, Copy)]
pub struct EpubCoverRewriter {
    default_title: &'static str,
}

impl Default for EpubCoverRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl EpubCoverRewriter {
    pub const fn new() -> Self {
        Self {
            default_title: DEFAULT_TITLE,
        }
    }

    /// Use `title` for packages without a `dc:title`.
    pub const fn with_default_title(title: &'static str) -> Self {
        Self {
            default_title: title,
        }
    }

    /// Embed the cover into an EPUB held in memory. Returns the new archive and
    /// the spine lengths before and after.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn embed_bytes(&self, data: &[u8], cover: &CoverImage) -> Result<(Vec<u8>, usize, usize)> {
        let mut package = read_package(data)?;
        let spine_before = package.spine.len();

        self.rewrite_package(&mut package, cover)?;

        let spine_after = package.spine.len();
        let output = write_package(&package)?;
        info!(
            spine_before,
            spine_after,
            output_bytes = output.len(),
            "Cover page inserted"
        );
        Ok((output, spine_before, spine_after))
    }

    /// Apply the cover to a parsed package.
    pub fn rewrite_package(&self, package: &mut EpubPackage, cover: &CoverImage) -> Result<()> {
        if remove_previous_cover(package) {
            debug!("Replacing cover from an earlier run");
        }

        let opf_dir = package.opf_dir().to_string();
        for href in [COVER_IMAGE_HREF, COVER_PAGE_HREF] {
            let path = resolve_path(&opf_dir, href);
            if package.has_path(&path) {
                return Err(DeckblattError::EpubWrite(format!(
                    "{} is already taken by another file in the package",
                    path
                )));
            }
        }

        let epub3 = package.is_epub3();

        // At most one item may claim to be the cover image.
        let previous: Vec<String> = package
            .items()
            .filter(|item| item.has_property(COVER_PROPERTY))
            .map(|item| item.id.clone())
            .collect();
        for id in previous {
            if let Some(item) = package.item_mut(&id) {
                item.remove_property(COVER_PROPERTY);
            }
        }

        let mut image = ManifestItem::new(
            COVER_IMAGE_ID,
            COVER_IMAGE_HREF,
            cover.encoding().media_type(),
            cover.bytes().to_vec(),
        );
        if epub3 {
            image.properties = Some(COVER_PROPERTY.to_string());
        }
        package.insert_item(image);
        package.insert_item(ManifestItem::new(
            COVER_PAGE_ID,
            COVER_PAGE_HREF,
            XHTML_MEDIA_TYPE,
            cover_page(cover, epub3).into_bytes(),
        ));

        let position = package.nav_spine_index().map_or(0, |nav| nav + 1);
        package.spine.insert(position, SpineItem::new(COVER_PAGE_ID));

        if package.title().is_none() {
            package.metadata.set(
                MetaKey::dc("title"),
                vec![MetaValue::Bare(self.default_title.to_string())],
            );
        }
        package.metadata.set(
            MetaKey::meta("cover"),
            vec![MetaValue::Bare(COVER_IMAGE_ID.to_string())],
        );

        package
            .toc
            .insert(0, TocEntry::new(COVER_TITLE, COVER_PAGE_HREF, COVER_PAGE_ID));

        // EPUB 3 readers ignore the guide; only touch it where it matters.
        if !epub3 || !package.guide.is_empty() {
            package.guide.retain(|reference| reference.kind != GUIDE_COVER);
            package.guide.insert(
                0,
                GuideReference {
                    kind: GUIDE_COVER.to_string(),
                    title: Some(COVER_TITLE.to_string()),
                    href: COVER_PAGE_HREF.to_string(),
                },
            );
        }

        package.validate().map_err(DeckblattError::EpubWrite)?;
        debug!(
            spine_position = position,
            epub3,
            title = package.title().unwrap_or(""),
            "Cover added to package"
        );
        Ok(())
    }
}

impl CoverEmbedder for EpubCoverRewriter {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Epub
    }

    #[instrument(skip(self, cover), fields(input = %input.display()))]
    fn embed(&self, input: &Path, output: &Path, cover: &CoverImage) -> Result<EmbedReport> {
        let data = std::fs::read(input)?;
        let (bytes, spine_before, spine_after) = self.embed_bytes(&data, cover)?;
        std::fs::write(output, &bytes)?;

        Ok(EmbedReport {
            format: DocumentFormat::Epub,
            output_path: output.to_path_buf(),
            output_len: bytes.len() as u64,
            units_before: spine_before,
            units_after: spine_after,
        })
    }
}

/// Drop everything an earlier run added. Returns whether anything was found.
fn remove_previous_cover(package: &mut EpubPackage) -> bool {
    let had_image = package.remove_item(COVER_IMAGE_ID).is_some();
    let had_page = package.remove_item(COVER_PAGE_ID).is_some();
    if !had_image && !had_page {
        return false;
    }

    package.spine.retain(|entry| entry.idref != COVER_PAGE_ID);
    package.toc.retain(|entry| entry.id.as_deref() != Some(COVER_PAGE_ID));
    package
        .guide
        .retain(|reference| reference.href != COVER_PAGE_HREF);
    if package.metadata.cover_id() == Some(COVER_IMAGE_ID) {
        package.metadata.remove(&MetaKey::meta("cover"));
    }
    true
}

/// XHTML page showing the cover image. Both files sit next to the OPF.
///
/// EPUB 2 content documents are XHTML 1.1, so they get that doctype and no
/// `epub:` vocabulary.
fn cover_page(cover: &CoverImage, epub3: bool) -> String {
    let (doctype, namespaces, body) = if epub3 {
        (
            "<!DOCTYPE html>",
            "xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\"",
            "<body epub:type=\"cover\">",
        )
    } else {
        (
            "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\" \"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd\">",
            "xmlns=\"http://www.w3.org/1999/xhtml\"",
            "<body>",
        )
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         {doctype}\n\
         <html {namespaces}>\n\
         <head>\n\
         <title>{title}</title>\n\
         <style type=\"text/css\">html, body {{ margin: 0; padding: 0; }} \
         img {{ display: block; max-width: 100%; max-height: 100%; margin: 0 auto; }}</style>\n\
         </head>\n\
         {body}\n\
         <div><img src=\"{src}\" alt=\"{title}\" width=\"{width}\" height=\"{height}\"/></div>\n\
         </body>\n\
         </html>\n",
        title = escape(COVER_TITLE),
        src = escape(COVER_IMAGE_HREF),
        width = cover.width(),
        height = cover.height(),
    )
}
