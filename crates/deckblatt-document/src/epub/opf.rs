// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OPF package document reading and writing.
//
// Parsing fills an `EpubPackage` with metadata, manifest entries (without
// content), spine, and guide. Rendering writes the same structure back out.
// Metadata elements without a key of their own (`<link>`, foreign namespaces)
// are carried through as raw XML.

use deckblatt_core::error::{DeckblattError, Result};
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, BytesText, Event};
use tracing::debug;

use super::package::{
    EpubPackage, GuideReference, ManifestItem, MetaKey, MetaNamespace, MetaValue, SpineItem,
};

const OPF_NAMESPACE: &str = "http://www.idpf.org/2007/opf";
const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Metadata,
    Manifest,
    Spine,
    Guide,
}

/// A metadata element whose text is still being collected.
struct PendingMeta {
    key: MetaKey,
    attributes: Vec<(String, String)>,
    text: String,
    nested: usize,
}

/// A metadata element copied verbatim, from its start tag to its end tag.
struct RawElement {
    start: usize,
    nested: usize,
}

/// What became of a section child.
enum Handled {
    Done,
    Pending(PendingMeta),
    Passthrough,
}

/// Parse the package document at `opf_path`.
pub fn parse_opf(opf_path: &str, xml: &str) -> Result<EpubPackage> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut package = EpubPackage::new(opf_path);
    let mut section = Section::Outside;
    let mut pending: Option<PendingMeta> = None;
    let mut raw: Option<RawElement> = None;
    let mut saw_package = false;

    loop {
        let before = reader.buffer_position();
        let event = reader.read_event().map_err(|err| {
            DeckblattError::EpubParse(format!(
                "malformed package document at byte {}: {}",
                reader.buffer_position(),
                err
            ))
        })?;

        if let Some(element) = raw.as_mut() {
            match event {
                Event::Start(_) => element.nested += 1,
                Event::End(_) if element.nested > 0 => element.nested -= 1,
                Event::End(_) => {
                    let end = reader.buffer_position();
                    package
                        .metadata_passthrough
                        .push(xml[element.start..end].to_string());
                    raw = None;
                }
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) => {
                if let Some(meta) = pending.as_mut() {
                    meta.nested += 1;
                    continue;
                }
                match e.local_name().as_ref() {
                    b"package" => {
                        saw_package = true;
                        package.package_attributes = attributes_of(&e)?;
                    }
                    b"metadata" if section == Section::Outside => {
                        section = Section::Metadata;
                        package.metadata_attributes = attributes_of(&e)?;
                    }
                    b"manifest" => section = Section::Manifest,
                    b"spine" => {
                        section = Section::Spine;
                        package.spine_attributes = attributes_of(&e)?;
                    }
                    b"guide" => section = Section::Guide,
                    _ => match start_element(&mut package, section, &e, true)? {
                        Handled::Done => {}
                        Handled::Pending(meta) => pending = Some(meta),
                        Handled::Passthrough => {
                            raw = Some(RawElement {
                                start: before,
                                nested: 0,
                            })
                        }
                    },
                }
            }
            Event::Empty(e) => {
                if pending.is_some() {
                    continue;
                }
                match e.local_name().as_ref() {
                    b"spine" => package.spine_attributes = attributes_of(&e)?,
                    b"metadata" | b"manifest" | b"guide" => {}
                    _ => {
                        if let Handled::Passthrough =
                            start_element(&mut package, section, &e, false)?
                        {
                            let end = reader.buffer_position();
                            package.metadata_passthrough.push(xml[before..end].to_string());
                        }
                    }
                }
            }
            Event::Text(t) => {
                if let Some(meta) = pending.as_mut() {
                    meta.text.push_str(&text_of(&t));
                }
            }
            Event::CData(c) => {
                if let Some(meta) = pending.as_mut() {
                    meta.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => {
                if let Some(mut meta) = pending.take() {
                    if meta.nested > 0 {
                        meta.nested -= 1;
                        pending = Some(meta);
                    } else {
                        let value = MetaValue::new(meta.text.trim(), meta.attributes);
                        package.metadata.push(meta.key, value);
                    }
                    continue;
                }
                match e.local_name().as_ref() {
                    b"metadata" | b"manifest" | b"spine" | b"guide" => section = Section::Outside,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_package {
        return Err(DeckblattError::EpubParse(
            "package document has no <package> element".into(),
        ));
    }
    Ok(package)
}

/// Handle a child element of one of the package sections. `open` is set for
/// start tags, whose text and end tag are still to come.
fn start_element(
    package: &mut EpubPackage,
    section: Section,
    e: &BytesStart<'_>,
    open: bool,
) -> Result<Handled> {
    let qualified = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

    match (section, local.as_str()) {
        (Section::Metadata, "meta") => {
            let mut attributes = attributes_of(e)?;
            if let Some(name) = take_attribute(&mut attributes, "name") {
                let content = take_attribute(&mut attributes, "content").unwrap_or_default();
                package
                    .metadata
                    .push(MetaKey::meta(&name), MetaValue::new(content, attributes));
                return Ok(Handled::Done);
            }
            if let Some(property) = take_attribute(&mut attributes, "property") {
                let key = MetaKey::property(&property);
                return Ok(pending_or_push(package, key, attributes, open));
            }
            debug!(element = %qualified, "Keeping meta element without name or property as is");
            Ok(Handled::Passthrough)
        }
        (Section::Metadata, _) if qualified.starts_with("dc:") => {
            let key = MetaKey::dc(&local);
            Ok(pending_or_push(package, key, attributes_of(e)?, open))
        }
        (Section::Metadata, _) => {
            debug!(element = %qualified, "Keeping metadata element as is");
            Ok(Handled::Passthrough)
        }
        (Section::Manifest, "item") => {
            let mut attributes = attributes_of(e)?;
            let id = take_attribute(&mut attributes, "id").ok_or_else(|| {
                DeckblattError::EpubParse("manifest item without an id".into())
            })?;
            let href = take_attribute(&mut attributes, "href").ok_or_else(|| {
                DeckblattError::EpubParse(format!("manifest item {id:?} has no href"))
            })?;
            if package.contains_item(&id) {
                return Err(DeckblattError::EpubParse(format!(
                    "duplicate manifest id {id:?}"
                )));
            }
            let media_type = take_attribute(&mut attributes, "media-type").unwrap_or_default();
            let mut item = ManifestItem::new(id, href, media_type, Vec::new());
            item.properties = take_attribute(&mut attributes, "properties");
            item.attributes = attributes;
            package.insert_item(item);
            Ok(Handled::Done)
        }
        (Section::Spine, "itemref") => {
            let mut attributes = attributes_of(e)?;
            let idref = take_attribute(&mut attributes, "idref").ok_or_else(|| {
                DeckblattError::EpubParse("spine itemref without an idref".into())
            })?;
            let mut entry = SpineItem::new(idref);
            entry.linear = take_attribute(&mut attributes, "linear").as_deref() != Some("no");
            entry.properties = take_attribute(&mut attributes, "properties");
            entry.attributes = attributes;
            package.spine.push(entry);
            Ok(Handled::Done)
        }
        (Section::Guide, "reference") => {
            let mut attributes = attributes_of(e)?;
            let Some(href) = take_attribute(&mut attributes, "href") else {
                debug!("Skipping guide reference without href");
                return Ok(Handled::Done);
            };
            package.guide.push(GuideReference {
                kind: take_attribute(&mut attributes, "type").unwrap_or_default(),
                title: take_attribute(&mut attributes, "title"),
                href,
            });
            Ok(Handled::Done)
        }
        _ => Ok(Handled::Done),
    }
}

fn pending_or_push(
    package: &mut EpubPackage,
    key: MetaKey,
    attributes: Vec<(String, String)>,
    open: bool,
) -> Handled {
    if open {
        Handled::Pending(PendingMeta {
            key,
            attributes,
            text: String::new(),
            nested: 0,
        })
    } else {
        package.metadata.push(key, MetaValue::new("", attributes));
        Handled::Done
    }
}

pub(crate) fn attributes_of(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr
            .map_err(|err| DeckblattError::EpubParse(format!("malformed attribute: {}", err)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push((key, value));
    }
    Ok(attributes)
}

pub(crate) fn text_of(t: &BytesText<'_>) -> String {
    match t.unescape() {
        Ok(text) => text.into_owned(),
        // Unknown entities (e.g. &nbsp; without a DTD) come through raw.
        Err(_) => String::from_utf8_lossy(t).into_owned(),
    }
}

fn take_attribute(attributes: &mut Vec<(String, String)>, name: &str) -> Option<String> {
    let index = attributes.iter().position(|(key, _)| key == name)?;
    Some(attributes.remove(index).1)
}

// -- Rendering ------------------------------------------------------------------

/// Serialise the package document.
pub fn render_opf(package: &EpubPackage) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

    let mut package_attributes = package.package_attributes.clone();
    ensure_attribute(&mut package_attributes, "xmlns", OPF_NAMESPACE);
    ensure_attribute(&mut package_attributes, "version", package.version());
    out.push_str(&format!("<package{}>\n", render_attributes(&package_attributes)));

    let mut metadata_attributes = package.metadata_attributes.clone();
    ensure_attribute(&mut metadata_attributes, "xmlns:dc", DC_NAMESPACE);
    ensure_attribute(&mut metadata_attributes, "xmlns:opf", OPF_NAMESPACE);
    out.push_str(&format!(
        "  <metadata{}>\n",
        render_attributes(&metadata_attributes)
    ));
    for (key, value) in package.metadata.iter() {
        out.push_str("    ");
        out.push_str(&render_meta(key, value));
        out.push('\n');
    }
    for element in &package.metadata_passthrough {
        out.push_str("    ");
        out.push_str(element.trim());
        out.push('\n');
    }
    out.push_str("  </metadata>\n");

    out.push_str("  <manifest>\n");
    for item in package.items() {
        let mut attributes = vec![
            ("id".to_string(), item.id.clone()),
            ("href".to_string(), item.href.clone()),
            ("media-type".to_string(), item.media_type.clone()),
        ];
        if let Some(properties) = &item.properties {
            attributes.push(("properties".to_string(), properties.clone()));
        }
        attributes.extend(item.attributes.iter().cloned());
        out.push_str(&format!("    <item{}/>\n", render_attributes(&attributes)));
    }
    out.push_str("  </manifest>\n");

    out.push_str(&format!(
        "  <spine{}>\n",
        render_attributes(&package.spine_attributes)
    ));
    for entry in &package.spine {
        let mut attributes = vec![("idref".to_string(), entry.idref.clone())];
        if !entry.linear {
            attributes.push(("linear".to_string(), "no".to_string()));
        }
        if let Some(properties) = &entry.properties {
            attributes.push(("properties".to_string(), properties.clone()));
        }
        attributes.extend(entry.attributes.iter().cloned());
        out.push_str(&format!("    <itemref{}/>\n", render_attributes(&attributes)));
    }
    out.push_str("  </spine>\n");

    if !package.guide.is_empty() {
        out.push_str("  <guide>\n");
        for reference in &package.guide {
            let mut attributes = vec![("type".to_string(), reference.kind.clone())];
            if let Some(title) = &reference.title {
                attributes.push(("title".to_string(), title.clone()));
            }
            attributes.push(("href".to_string(), reference.href.clone()));
            out.push_str(&format!(
                "    <reference{}/>\n",
                render_attributes(&attributes)
            ));
        }
        out.push_str("  </guide>\n");
    }

    out.push_str("</package>\n");
    out
}

fn render_meta(key: &MetaKey, value: &MetaValue) -> String {
    match key.namespace {
        MetaNamespace::DublinCore => format!(
            "<dc:{name}{attrs}>{text}</dc:{name}>",
            name = key.name,
            attrs = render_attributes(value.attributes()),
            text = escape(value.text()),
        ),
        MetaNamespace::Meta => {
            let mut attributes = vec![
                ("name".to_string(), key.name.clone()),
                ("content".to_string(), value.text().to_string()),
            ];
            attributes.extend(value.attributes().iter().cloned());
            format!("<meta{}/>", render_attributes(&attributes))
        }
        MetaNamespace::Property => {
            let mut attributes = vec![("property".to_string(), key.name.clone())];
            attributes.extend(value.attributes().iter().cloned());
            format!(
                "<meta{}>{}</meta>",
                render_attributes(&attributes),
                escape(value.text())
            )
        }
    }
}

pub(crate) fn render_attributes(attributes: &[(String, String)]) -> String {
    attributes
        .iter()
        .map(|(key, value)| format!(" {}=\"{}\"", key, escape(value)))
        .collect()
}

fn ensure_attribute(attributes: &mut Vec<(String, String)>, name: &str, value: &str) {
    if !attributes.iter().any(|(key, _)| key == name) {
        attributes.push((name.to_string(), value.to_string()));
    }
}
