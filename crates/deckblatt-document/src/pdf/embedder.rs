// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF cover embedder: insert the cover image as a new first page of an
// existing PDF using the `lopdf` crate.
//
// The original page objects are never rewritten. The cover page, its content
// stream, and the image XObject are added as new objects and the page is
// spliced into the root /Pages node ahead of every existing kid.

use std::path::Path;

use deckblatt_core::error::{DeckblattError, Result};
use deckblatt_core::types::DocumentFormat;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, info, instrument};

use crate::cover::CoverImage;
use crate::dispatch::{CoverEmbedder, EmbedReport};

/// Resource name of the cover XObject inside the cover page.
const COVER_XOBJECT: &str = "DeckblattCover";

/// Prepends a page showing the cover image to a PDF.
///
/// The page is sized to the image's pixel dimensions, one pixel per point.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfCoverEmbedder;

impl PdfCoverEmbedder {
    pub const fn new() -> Self {
        Self
    }

    /// Embed the cover into a PDF held in memory, returning the new PDF bytes
    /// together with the page counts before and after.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn embed_bytes(&self, data: &[u8], cover: &CoverImage) -> Result<(Vec<u8>, usize, usize)> {
        let mut document = Document::load_mem(data)
            .map_err(|err| DeckblattError::PdfParse(format!("failed to load PDF: {}", err)))?;

        if document.is_encrypted() {
            return Err(DeckblattError::PdfParse(
                "encrypted PDFs cannot be modified".into(),
            ));
        }

        let pages_before = document.get_pages().len();
        debug!(pages_before, "PDF loaded");

        prepend_cover_page(&mut document, cover)?;

        let pages_after = document.get_pages().len();
        let mut output = Vec::new();
        document.save_to(&mut output).map_err(|err| {
            DeckblattError::PdfWrite(format!("failed to serialise PDF: {}", err))
        })?;

        info!(
            pages_before,
            pages_after,
            output_bytes = output.len(),
            "Cover page prepended"
        );
        Ok((output, pages_before, pages_after))
    }
}

impl CoverEmbedder for PdfCoverEmbedder {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    #[instrument(skip(self, cover), fields(input = %input.display()))]
    fn embed(&self, input: &Path, output: &Path, cover: &CoverImage) -> Result<EmbedReport> {
        let data = std::fs::read(input)?;
        let (bytes, pages_before, pages_after) = self.embed_bytes(&data, cover)?;
        std::fs::write(output, &bytes)?;

        Ok(EmbedReport {
            format: DocumentFormat::Pdf,
            output_path: output.to_path_buf(),
            output_len: bytes.len() as u64,
            units_before: pages_before,
            units_after: pages_after,
        })
    }
}

/// Add the cover image, its page, and splice the page in as page one.
fn prepend_cover_page(document: &mut Document, cover: &CoverImage) -> Result<()> {
    let pages_id = root_pages_id(document)?;
    let width = i64::from(cover.width());
    let height = i64::from(cover.height());

    // The normalized JPEG goes in verbatim; DCTDecode lets readers decode it.
    let image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "DCTDecode",
        },
        cover.bytes().to_vec(),
    )
    .with_compression(false);
    let image_id = document.add_object(image);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0_i64.into(),
                    0_i64.into(),
                    height.into(),
                    0_i64.into(),
                    0_i64.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(COVER_XOBJECT.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let encoded = content.encode().map_err(|err| {
        DeckblattError::PdfWrite(format!("failed to encode cover content stream: {}", err))
    })?;
    let content_id = document.add_object(Stream::new(Dictionary::new(), encoded));

    let mut xobjects = Dictionary::new();
    xobjects.set(COVER_XOBJECT, image_id);

    let page_id = document.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0_i64.into(), 0_i64.into(), width.into(), height.into()],
        "CropBox" => vec![0_i64.into(), 0_i64.into(), width.into(), height.into()],
        "Rotate" => 0_i64,
        "Resources" => dictionary! { "XObject" => xobjects },
        "Contents" => content_id,
    });

    insert_first_kid(document, pages_id, page_id)?;
    debug!(?page_id, ?image_id, width, height, "Cover page created");
    Ok(())
}

/// Resolve the catalog's /Pages reference.
fn root_pages_id(document: &Document) -> Result<ObjectId> {
    document
        .catalog()
        .map_err(|err| DeckblattError::PdfParse(format!("no catalog: {}", err)))?
        .get(b"Pages")
        .map_err(|err| DeckblattError::PdfParse(format!("no /Pages: {}", err)))?
        .as_reference()
        .map_err(|_| DeckblattError::PdfParse("/Pages is not a reference".to_string()))
}

/// Put `page_id` in front of the root node's /Kids and bump its /Count.
/// Either entry may be stored as its own indirect object.
fn insert_first_kid(document: &mut Document, pages_id: ObjectId, page_id: ObjectId) -> Result<()> {
    let kids_id = {
        let pages_dict = pages_dictionary(document, pages_id)?;
        if !pages_dict.has(b"Kids") {
            // Zero-page documents sometimes omit /Kids entirely.
            pages_dict.set("Kids", vec![Object::Reference(page_id)]);
            None
        } else {
            match pages_dict.get_mut(b"Kids") {
                Ok(Object::Array(kids)) => {
                    kids.insert(0, Object::Reference(page_id));
                    None
                }
                Ok(Object::Reference(id)) => Some(*id),
                _ => {
                    return Err(DeckblattError::PdfParse(
                        "/Kids is neither an array nor a reference".to_string(),
                    ));
                }
            }
        }
    };
    if let Some(kids_id) = kids_id {
        document
            .get_object_mut(kids_id)
            .and_then(|object| object.as_array_mut())
            .map_err(|err| {
                DeckblattError::PdfParse(format!("/Kids does not resolve to an array: {}", err))
            })?
            .insert(0, Object::Reference(page_id));
    }

    let count_id = match pages_dictionary(document, pages_id)?.get(b"Count") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };
    match count_id {
        Some(count_id) => {
            let count = document.get_object_mut(count_id).map_err(|err| {
                DeckblattError::PdfParse(format!("/Count does not resolve: {}", err))
            })?;
            let value = count.as_i64().unwrap_or(0);
            *count = Object::Integer(value + 1);
        }
        None => {
            let pages_dict = pages_dictionary(document, pages_id)?;
            let count = pages_dict
                .get(b"Count")
                .and_then(|object| object.as_i64())
                .unwrap_or(0);
            pages_dict.set("Count", count + 1);
        }
    }
    Ok(())
}

fn pages_dictionary(document: &mut Document, pages_id: ObjectId) -> Result<&mut Dictionary> {
    document
        .get_object_mut(pages_id)
        .and_then(|object| object.as_dict_mut())
        .map_err(|err| DeckblattError::PdfParse(format!("/Pages is not a dictionary: {}", err)))
}
