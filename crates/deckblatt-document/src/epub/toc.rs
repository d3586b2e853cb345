// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Table of contents: EPUB 3 navigation documents and EPUB 2 NCX files.
//
// Reading maps every entry's href onto a manifest id where one matches.
// Writing touches only the `toc` nav's `<ol>` or the NCX `<navMap>`: entries
// already there are copied as written and only new ones are rendered, so
// landmarks, page lists, and hand-made markup survive. A document without
// the expected element is regenerated from scratch.

use std::ops::Range;

use deckblatt_core::error::{DeckblattError, Result};
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use super::opf::{attributes_of, text_of};
use super::package::{
    EpubPackage, TocEntry, is_remote_href, parent_dir, relative_path, resolve_path,
    split_fragment,
};

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
const OPS_NAMESPACE: &str = "http://www.idpf.org/2007/ops";
const NCX_NAMESPACE: &str = "http://www.daisy.org/z3986/2005/ncx/";

/// An entry as found in the document, before its href is resolved.
#[derive(Debug, Default)]
struct RawEntry {
    title: String,
    href: Option<String>,
    labelled: bool,
    children: Vec<RawEntry>,
}

// -- Reading --------------------------------------------------------------------

/// Read the `toc` nav of the navigation document stored at `nav_path`.
pub fn parse_nav(package: &EpubPackage, nav_path: &str, xml: &str) -> Result<Vec<TocEntry>> {
    let Some(span) = toc_nav_span(xml).map_err(parse_error(nav_path))? else {
        debug!(nav_path, "Navigation document has no nav element");
        return Ok(Vec::new());
    };
    let raw = raw_nav_entries(&xml[span], nav_path)?;
    Ok(resolve_entries(package, parent_dir(nav_path), raw))
}

/// Read the `navMap` of the NCX stored at `ncx_path`.
pub fn parse_ncx(package: &EpubPackage, ncx_path: &str, xml: &str) -> Result<Vec<TocEntry>> {
    let raw = raw_ncx_entries(xml, ncx_path, true)?;
    Ok(resolve_entries(package, parent_dir(ncx_path), raw))
}

/// Every `li` in `fragment`, nested the way the lists nest them.
fn raw_nav_entries(fragment: &str, path: &str) -> Result<Vec<RawEntry>> {
    let mut reader = Reader::from_str(fragment);
    reader.trim_text(false);

    let mut stack: Vec<RawEntry> = Vec::new();
    let mut roots: Vec<RawEntry> = Vec::new();
    let mut label_depth: Option<usize> = None;

    loop {
        match reader.read_event().map_err(parse_error(path))? {
            Event::Start(e) => {
                if let Some(depth) = label_depth.as_mut() {
                    *depth += 1;
                    continue;
                }
                match e.local_name().as_ref() {
                    b"li" => stack.push(RawEntry::default()),
                    b"a" | b"span" => {
                        if let Some(top) = stack.last_mut() {
                            if !top.labelled {
                                top.labelled = true;
                                top.href = href_of(&e)?;
                                label_depth = Some(0);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if label_depth.is_none() && e.local_name().as_ref() == b"a" {
                    if let Some(top) = stack.last_mut() {
                        if !top.labelled {
                            top.labelled = true;
                            top.href = href_of(&e)?;
                        }
                    }
                }
            }
            Event::Text(t) => {
                if label_depth.is_some() {
                    if let Some(top) = stack.last_mut() {
                        top.title.push_str(&text_of(&t));
                    }
                }
            }
            Event::End(e) => {
                if let Some(depth) = label_depth {
                    label_depth = depth.checked_sub(1);
                    continue;
                }
                if e.local_name().as_ref() == b"li" {
                    attach(&mut stack, &mut roots);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(roots)
}

/// Every `navPoint` in `fragment`. A whole NCX only counts those inside
/// `navMap`; a fragment cut from the map counts them all.
fn raw_ncx_entries(fragment: &str, path: &str, whole_document: bool) -> Result<Vec<RawEntry>> {
    let mut reader = Reader::from_str(fragment);
    reader.trim_text(false);

    let mut stack: Vec<RawEntry> = Vec::new();
    let mut roots: Vec<RawEntry> = Vec::new();
    let mut in_map = !whole_document;
    let mut in_label = false;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(parse_error(path))? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"navMap" => in_map = true,
                b"navPoint" if in_map => stack.push(RawEntry::default()),
                b"navLabel" if !stack.is_empty() => in_label = true,
                b"text" if in_label => {
                    in_text = stack.last().is_some_and(|top| !top.labelled);
                }
                b"content" => set_content_src(&mut stack, &e)?,
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"content" {
                    set_content_src(&mut stack, &e)?;
                }
            }
            Event::Text(t) => {
                if in_text {
                    if let Some(top) = stack.last_mut() {
                        top.title.push_str(&text_of(&t));
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"text" if in_text => {
                    in_text = false;
                    if let Some(top) = stack.last_mut() {
                        top.labelled = true;
                    }
                }
                b"navLabel" => in_label = false,
                b"navPoint" if in_map => attach(&mut stack, &mut roots),
                b"navMap" => in_map = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(roots)
}

fn attach(stack: &mut Vec<RawEntry>, roots: &mut Vec<RawEntry>) {
    if let Some(done) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }
}

fn set_content_src(stack: &mut [RawEntry], e: &BytesStart<'_>) -> Result<()> {
    if let Some(top) = stack.last_mut() {
        if top.href.is_none() {
            top.href = attributes_of(e)?
                .into_iter()
                .find(|(key, _)| key == "src")
                .map(|(_, value)| value);
        }
    }
    Ok(())
}

fn href_of(e: &BytesStart<'_>) -> Result<Option<String>> {
    Ok(attributes_of(e)?
        .into_iter()
        .find(|(key, _)| key == "href")
        .map(|(_, value)| value))
}

/// Map document-relative hrefs onto manifest items. Nothing is dropped: an
/// href that matches no manifest item (an external link, a missing file) is
/// kept as written with no id, and an entry without an href is a heading.
fn resolve_entries(package: &EpubPackage, doc_dir: &str, raw: Vec<RawEntry>) -> Vec<TocEntry> {
    raw.into_iter()
        .map(|entry| resolve_entry(package, doc_dir, entry))
        .collect()
}

fn resolve_entry(package: &EpubPackage, doc_dir: &str, entry: RawEntry) -> TocEntry {
    let children = resolve_entries(package, doc_dir, entry.children);
    let title = entry.title.split_whitespace().collect::<Vec<_>>().join(" ");
    let href = entry
        .href
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty());

    let (href, id) = match href {
        None => (None, None),
        Some(href) => match locate(package, doc_dir, &href) {
            Some((opf_href, id)) => (Some(opf_href), Some(id)),
            None => {
                if is_remote_href(&href) {
                    debug!(title = %title, href = %href, "Keeping external table-of-contents link");
                } else {
                    warn!(
                        title = %title,
                        href = %href,
                        "Table-of-contents entry matches no manifest item, keeping it as written"
                    );
                }
                (Some(href), None)
            }
        },
    };

    TocEntry {
        title,
        href,
        id,
        children,
    }
}

/// OPF-relative href and manifest id for an href found in a document at `doc_dir`.
fn locate(package: &EpubPackage, doc_dir: &str, href: &str) -> Option<(String, String)> {
    let (path, fragment) = split_fragment(href);
    if path.is_empty() || is_remote_href(path) {
        return None;
    }
    let zip_path = resolve_path(doc_dir, path);
    let opf_href = relative_path(package.opf_dir(), &zip_path);
    let id = package.item_id_for_href(&opf_href)?.to_string();
    let href = match fragment {
        Some(fragment) => format!("{opf_href}#{fragment}"),
        None => opf_href,
    };
    Some((href, id))
}

// -- Writing --------------------------------------------------------------------

/// Bring the `toc` nav's list in `xml` in line with the package TOC.
pub fn update_nav(package: &EpubPackage, nav_path: &str, xml: &str) -> Result<String> {
    let nav_dir = parent_dir(nav_path);

    let Some(nav) = toc_nav_span(xml).map_err(write_error(nav_path))? else {
        debug!(nav_path, "No nav element to update, regenerating document");
        return Ok(render_nav(package, nav_path));
    };

    let Some(ol) = element_span(&xml[nav.clone()], |e| e.local_name().as_ref() == b"ol")
        .map_err(write_error(nav_path))?
    else {
        let list = render_nav_list(package, nav_dir, &package.toc);
        let replacement = format!("<nav epub:type=\"toc\" id=\"toc\">\n{list}\n</nav>");
        return Ok(splice(xml, nav, &replacement));
    };
    let ol = (nav.start + ol.start)..(nav.start + ol.end);
    let fragment = &xml[ol.clone()];

    let list = match list_layout(fragment, b"li").map_err(write_error(nav_path))? {
        Some(layout) => {
            let mut existing = Vec::with_capacity(layout.items.len());
            for range in &layout.items {
                let raw = raw_nav_entries(&fragment[range.clone()], nav_path)?;
                existing.push(first_entry(package, nav_dir, raw));
            }
            let pieces = merge_entries(
                &package.toc,
                &existing,
                fragment,
                &layout.items,
                keeps_unlisted(package, nav_path),
                |entry| render_nav_item(package, nav_dir, entry),
            );
            layout.rebuild(fragment, &pieces)
        }
        None => render_nav_list(package, nav_dir, &package.toc),
    };

    Ok(splice(xml, ol, &list))
}

/// Bring the NCX `navMap` in `xml` in line with the package TOC.
pub fn update_ncx(package: &EpubPackage, ncx_path: &str, xml: &str) -> Result<String> {
    let ncx_dir = parent_dir(ncx_path);

    let Some(span) = element_span(xml, |e| e.local_name().as_ref() == b"navMap")
        .map_err(write_error(ncx_path))?
    else {
        debug!(ncx_path, "No navMap to update, regenerating NCX");
        return Ok(render_ncx(package, ncx_path));
    };
    let fragment = &xml[span.clone()];

    let nav_map = match list_layout(fragment, b"navPoint").map_err(write_error(ncx_path))? {
        Some(layout) => {
            let mut existing = Vec::with_capacity(layout.items.len());
            for range in &layout.items {
                let raw = raw_ncx_entries(&fragment[range.clone()], ncx_path, false)?;
                existing.push(first_entry(package, ncx_dir, raw));
            }
            let mut generated = 0;
            let pieces = merge_entries(
                &package.toc,
                &existing,
                fragment,
                &layout.items,
                keeps_unlisted(package, ncx_path),
                |entry| {
                    let mut out = String::new();
                    render_nav_points(
                        package,
                        ncx_dir,
                        std::slice::from_ref(entry),
                        "deckblatt-navpoint-",
                        &mut generated,
                        &mut out,
                    );
                    out.trim_end().to_string()
                },
            );
            layout.rebuild(fragment, &pieces)
        }
        None => render_nav_map(package, ncx_dir),
    };

    let nav_map = renumber_play_order(&nav_map).map_err(write_error(ncx_path))?;
    Ok(splice(xml, span, &nav_map))
}

/// Whether the document at `path` is a secondary TOC whose entries the
/// package model does not carry, so entries missing from the model stay.
fn keeps_unlisted(package: &EpubPackage, path: &str) -> bool {
    package
        .toc_path
        .as_deref()
        .is_some_and(|source| source != path)
}

fn first_entry(package: &EpubPackage, doc_dir: &str, raw: Vec<RawEntry>) -> Option<TocEntry> {
    resolve_entries(package, doc_dir, raw).into_iter().next()
}

/// Lay the package entries over the entries already in a list. An entry
/// already present is copied as written; a new one is rendered. Entries in
/// the list but not in the package are dropped, unless `keep_unlisted`.
///
/// A secondary list only has to agree with the package on targets, so there
/// an entry counts as present when its href matches.
fn merge_entries(
    entries: &[TocEntry],
    existing: &[Option<TocEntry>],
    fragment: &str,
    ranges: &[Range<usize>],
    keep_unlisted: bool,
    mut render: impl FnMut(&TocEntry) -> String,
) -> Vec<String> {
    let mut taken = vec![false; existing.len()];
    let mut matches = Vec::with_capacity(entries.len());
    for entry in entries {
        let found = (0..existing.len()).find(|&i| {
            !taken[i]
                && existing[i].as_ref().is_some_and(|present| {
                    if keep_unlisted {
                        present.href == entry.href
                    } else {
                        present == entry
                    }
                })
        });
        if let Some(index) = found {
            taken[index] = true;
        }
        matches.push(found);
    }

    let mut pieces = Vec::with_capacity(entries.len().max(existing.len()));
    let mut next = 0;
    for (entry, found) in entries.iter().zip(matches) {
        match found {
            Some(index) => {
                if keep_unlisted {
                    for i in next..index {
                        if !taken[i] {
                            pieces.push(fragment[ranges[i].clone()].to_string());
                        }
                    }
                }
                pieces.push(fragment[ranges[index].clone()].to_string());
                next = next.max(index + 1);
            }
            None => pieces.push(render(entry)),
        }
    }
    if keep_unlisted {
        for i in next..existing.len() {
            if !taken[i] {
                pieces.push(fragment[ranges[i].clone()].to_string());
            }
        }
    } else {
        let dropped = taken.iter().filter(|taken| !**taken).count();
        if dropped > 0 {
            debug!(dropped, "Removed table-of-contents entries no longer in the package");
        }
    }
    pieces
}

/// Renumber `playOrder` on every `navPoint` in document order.
fn renumber_play_order(nav_map: &str) -> quick_xml::Result<String> {
    let mut reader = Reader::from_str(nav_map);
    reader.trim_text(false);

    let mut out = String::with_capacity(nav_map.len());
    let mut copied = 0;
    let mut order = 0usize;

    loop {
        let before = reader.buffer_position();
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"navPoint" => {
                order += 1;
                let tag = &nav_map[before..reader.buffer_position()];
                if let Some(value) = attribute_value_range(tag, "playOrder") {
                    out.push_str(&nav_map[copied..before + value.start]);
                    out.push_str(&order.to_string());
                    copied = before + value.end;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    out.push_str(&nav_map[copied..]);
    Ok(out)
}

/// Byte range of the value of attribute `name` inside a start tag.
fn attribute_value_range(tag: &str, name: &str) -> Option<Range<usize>> {
    let key = format!("{name}=");
    let mut search = 0;
    while let Some(found) = tag[search..].find(&key) {
        let at = search + found;
        let after = at + key.len();
        let quote = tag[after..].chars().next()?;
        if tag[..at].ends_with(char::is_whitespace) && (quote == '"' || quote == '\'') {
            let start = after + 1;
            let len = tag[start..].find(quote)?;
            return Some(start..start + len);
        }
        search = after;
    }
    None
}

/// A complete EPUB 3 navigation document for the package TOC.
pub fn render_nav(package: &EpubPackage, nav_path: &str) -> String {
    let title = escape(package.title().unwrap_or("Contents")).into_owned();
    let list = render_nav_list(package, parent_dir(nav_path), &package.toc);
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE html>\n\
         <html xmlns=\"{XHTML_NAMESPACE}\" xmlns:epub=\"{OPS_NAMESPACE}\">\n\
         <head>\n<title>{title}</title>\n</head>\n\
         <body>\n\
         <nav epub:type=\"toc\" id=\"toc\">\n<h1>{title}</h1>\n{list}\n</nav>\n\
         </body>\n\
         </html>\n"
    )
}

/// A complete EPUB 2 NCX for the package TOC.
pub fn render_ncx(package: &EpubPackage, ncx_path: &str) -> String {
    let uid = escape(package.unique_identifier().unwrap_or("")).into_owned();
    let title = escape(package.title().unwrap_or("")).into_owned();
    let depth = package.toc.iter().map(TocEntry::depth).max().unwrap_or(1);
    let nav_map = render_nav_map(package, parent_dir(ncx_path));
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <ncx xmlns=\"{NCX_NAMESPACE}\" version=\"2005-1\">\n\
         <head>\n\
         <meta name=\"dtb:uid\" content=\"{uid}\"/>\n\
         <meta name=\"dtb:depth\" content=\"{depth}\"/>\n\
         <meta name=\"dtb:totalPageCount\" content=\"0\"/>\n\
         <meta name=\"dtb:maxPageNumber\" content=\"0\"/>\n\
         </head>\n\
         <docTitle><text>{title}</text></docTitle>\n\
         {nav_map}\n\
         </ncx>\n"
    )
}

fn render_nav_list(package: &EpubPackage, nav_dir: &str, entries: &[TocEntry]) -> String {
    let mut out = String::from("<ol>\n");
    for entry in entries {
        out.push_str(&render_nav_item(package, nav_dir, entry));
        out.push('\n');
    }
    out.push_str("</ol>");
    out
}

fn render_nav_item(package: &EpubPackage, nav_dir: &str, entry: &TocEntry) -> String {
    let label = escape(&entry.title);
    let mut out = match target_href(package, nav_dir, entry) {
        Some(href) => format!("<li><a href=\"{}\">{label}</a>", escape(&href)),
        None => format!("<li><span>{label}</span>"),
    };
    if !entry.children.is_empty() {
        out.push('\n');
        out.push_str(&render_nav_list(package, nav_dir, &entry.children));
        out.push('\n');
    }
    out.push_str("</li>");
    out
}

fn render_nav_map(package: &EpubPackage, ncx_dir: &str) -> String {
    let mut out = String::from("<navMap>\n");
    let mut play_order = 0;
    render_nav_points(
        package,
        ncx_dir,
        &package.toc,
        "navpoint-",
        &mut play_order,
        &mut out,
    );
    out.push_str("</navMap>");
    out
}

fn render_nav_points(
    package: &EpubPackage,
    ncx_dir: &str,
    entries: &[TocEntry],
    id_prefix: &str,
    play_order: &mut usize,
    out: &mut String,
) {
    for entry in entries {
        *play_order += 1;
        out.push_str(&format!(
            "<navPoint id=\"{id_prefix}{order}\" playOrder=\"{order}\">\
             <navLabel><text>{title}</text></navLabel>\
             <content src=\"{src}\"/>\n",
            order = play_order,
            title = escape(&entry.title),
            src = escape(&ncx_src(package, ncx_dir, entry)),
        ));
        render_nav_points(package, ncx_dir, &entry.children, id_prefix, play_order, out);
        out.push_str("</navPoint>\n");
    }
}

/// NCX points must carry a `content`; a heading points at its first child.
fn ncx_src(package: &EpubPackage, ncx_dir: &str, entry: &TocEntry) -> String {
    target_href(package, ncx_dir, entry)
        .or_else(|| {
            entry
                .children
                .first()
                .map(|child| ncx_src(package, ncx_dir, child))
        })
        .unwrap_or_default()
}

/// Where an entry points, as written in a document in `doc_dir`. Entries that
/// never resolved keep their href untouched.
fn target_href(package: &EpubPackage, doc_dir: &str, entry: &TocEntry) -> Option<String> {
    let href = entry.href.as_deref()?;
    Some(match entry.id {
        Some(_) => document_href(package, doc_dir, href),
        None => href.to_string(),
    })
}

/// Re-express an OPF-relative href relative to a document in `doc_dir`.
fn document_href(package: &EpubPackage, doc_dir: &str, href: &str) -> String {
    let (path, fragment) = split_fragment(href);
    let relative = relative_path(doc_dir, &resolve_path(package.opf_dir(), path));
    match fragment {
        Some(fragment) => format!("{relative}#{fragment}"),
        None => relative,
    }
}

// -- Element spans ----------------------------------------------------------------

/// The `nav` typed `toc`, else the first `nav` in the document.
fn toc_nav_span(xml: &str) -> quick_xml::Result<Option<Range<usize>>> {
    let typed = element_span(xml, |e| {
        e.local_name().as_ref() == b"nav"
            && e.attributes().flatten().any(|attr| {
                attr.key.local_name().as_ref() == b"type"
                    && String::from_utf8_lossy(&attr.value)
                        .split_whitespace()
                        .any(|token| token == "toc")
            })
    })?;
    match typed {
        Some(span) => Ok(Some(span)),
        None => element_span(xml, |e| e.local_name().as_ref() == b"nav"),
    }
}

/// Byte range of the first element matching `wanted`, tags included.
fn element_span(
    xml: &str,
    wanted: impl Fn(&BytesStart<'_>) -> bool,
) -> quick_xml::Result<Option<Range<usize>>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    // (start offset, qualified name, nesting of same-named elements)
    let mut open: Option<(usize, Vec<u8>, usize)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match open.as_mut() {
                Some((_, name, depth)) => {
                    if e.name().as_ref() == name.as_slice() {
                        *depth += 1;
                    }
                }
                None => {
                    if wanted(&e) {
                        // The reader sits just past `>`; the tag is `<` + e + `>`.
                        let start = reader.buffer_position() - (e.len() + 2);
                        open = Some((start, e.name().as_ref().to_vec(), 0));
                    }
                }
            },
            Event::Empty(e) => {
                if open.is_none() && wanted(&e) {
                    // `<` + e + `/>`
                    let end = reader.buffer_position();
                    return Ok(Some((end - (e.len() + 3))..end));
                }
            }
            Event::End(e) => {
                if let Some((start, name, depth)) = open.as_mut() {
                    if e.name().as_ref() == name.as_slice() {
                        if *depth == 0 {
                            return Ok(Some(*start..reader.buffer_position()));
                        }
                        *depth -= 1;
                    }
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// A list element and the byte ranges of its direct entries.
struct ListLayout {
    open_end: usize,
    close_start: usize,
    items: Vec<Range<usize>>,
}

impl ListLayout {
    /// The list with `pieces` as its entries, reusing the original spacing.
    fn rebuild(&self, fragment: &str, pieces: &[String]) -> String {
        let whitespace = |range: Range<usize>| {
            let text = &fragment[range];
            if text.trim().is_empty() { text } else { "\n" }
        };
        let (lead, separator, trail) = match (self.items.first(), self.items.last()) {
            (Some(first), Some(last)) => (
                whitespace(self.open_end..first.start),
                match self.items.get(1) {
                    Some(second) => whitespace(first.end..second.start),
                    None => whitespace(self.open_end..first.start),
                },
                whitespace(last.end..self.close_start),
            ),
            _ => ("\n", "\n", "\n"),
        };

        let mut out = String::with_capacity(fragment.len());
        out.push_str(&fragment[..self.open_end]);
        out.push_str(lead);
        out.push_str(&pieces.join(separator));
        out.push_str(trail);
        out.push_str(&fragment[self.close_start..]);
        out
    }
}

/// Layout of the list element opening `fragment`, with `item` as the entry
/// element name. `None` for a self-closed or unterminated list.
fn list_layout(fragment: &str, item: &[u8]) -> quick_xml::Result<Option<ListLayout>> {
    let mut reader = Reader::from_str(fragment);
    reader.trim_text(false);

    let mut depth = 0usize;
    let mut open_end = None;
    let mut current: Option<usize> = None;
    let mut items = Vec::new();

    loop {
        let before = reader.buffer_position();
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                if depth == 1 {
                    open_end = Some(reader.buffer_position());
                } else if depth == 2 && e.local_name().as_ref() == item {
                    current = Some(before);
                }
            }
            Event::Empty(e) => {
                if depth == 0 {
                    return Ok(None);
                }
                if depth == 1 && e.local_name().as_ref() == item {
                    items.push(before..reader.buffer_position());
                }
            }
            Event::End(_) => {
                if depth == 1 {
                    return Ok(open_end.map(|open_end| ListLayout {
                        open_end,
                        close_start: before,
                        items,
                    }));
                }
                if depth == 2 {
                    if let Some(start) = current.take() {
                        items.push(start..reader.buffer_position());
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn splice(xml: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(xml.len() + replacement.len());
    out.push_str(&xml[..range.start]);
    out.push_str(replacement);
    out.push_str(&xml[range.end..]);
    out
}

fn parse_error(path: &str) -> impl Fn(quick_xml::Error) -> DeckblattError + '_ {
    move |err| DeckblattError::EpubParse(format!("malformed navigation file {path}: {err}"))
}

fn write_error(path: &str) -> impl Fn(quick_xml::Error) -> DeckblattError + '_ {
    move |err| DeckblattError::EpubWrite(format!("cannot update navigation file {path}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::package::{ManifestItem, XHTML_MEDIA_TYPE};

    fn package() -> EpubPackage {
        let mut package = EpubPackage::new("OEBPS/content.opf");
        for (id, href) in [
            ("nav", "nav.xhtml"),
            ("ch1", "text/ch1.xhtml"),
            ("ch2", "text/ch2.xhtml"),
        ] {
            package.insert_item(ManifestItem::new(id, href, XHTML_MEDIA_TYPE, Vec::new()));
        }
        package
    }

    const NAV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Alpha</title></head>
<body>
<nav epub:type="landmarks"><ol><li><a href="text/ch1.xhtml">Start</a></li></ol></nav>
<nav epub:type="toc" id="toc">
  <h1>Contents</h1>
  <ol>
    <li><a href="text/ch1.xhtml">Chapter
        One</a>
      <ol><li><a href="text/ch1.xhtml#s2"><span>Part</span> Two</a></li></ol>
    </li>
    <li><span>Untargeted</span>
      <ol><li><a href="text/ch2.xhtml">Chapter Two</a></li></ol>
    </li>
    <li><a href="http://example.com/">Elsewhere</a></li>
  </ol>
</nav>
</body>
</html>"#;

    const NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head><meta name="dtb:uid" content="urn:x"/></head>
  <docTitle><text>Alpha</text></docTitle>
  <navMap>
    <navPoint id="p1" playOrder="1">
      <navLabel><text>Chapter One</text></navLabel>
      <content src="text/ch1.xhtml"/>
      <navPoint id="p2" playOrder="2">
        <navLabel><text>Section</text></navLabel>
        <content src="text/ch1.xhtml#s"/>
      </navPoint>
    </navPoint>
    <navPoint id="p3" playOrder="3">
      <navLabel><text>Missing</text></navLabel>
      <content src="text/gone.xhtml"/>
    </navPoint>
  </navMap>
  <pageList><pageTarget id="pg1" type="normal" value="1"><navLabel><text>1</text></navLabel><content src="text/ch1.xhtml"/></pageTarget></pageList>
</ncx>"#;

    #[test]
    fn nav_entries_map_to_manifest_ids() {
        let package = package();
        let toc = parse_nav(&package, "OEBPS/nav.xhtml", NAV).unwrap();

        assert_eq!(toc.len(), 3);
        assert_eq!(toc[0].title, "Chapter One");
        assert_eq!(toc[0].id.as_deref(), Some("ch1"));
        assert_eq!(toc[0].children[0].title, "Part Two");
        assert_eq!(toc[0].children[0].href.as_deref(), Some("text/ch1.xhtml#s2"));

        assert_eq!(toc[1], TocEntry {
            title: "Untargeted".into(),
            href: None,
            id: None,
            children: vec![TocEntry::new("Chapter Two", "text/ch2.xhtml", "ch2")],
        });
        assert_eq!(toc[2], TocEntry::link("Elsewhere", "http://example.com/"));
    }

    #[test]
    fn ncx_entries_map_to_manifest_ids() {
        let package = package();
        let toc = parse_ncx(&package, "OEBPS/toc.ncx", NCX).unwrap();

        assert_eq!(toc.len(), 2);
        assert_eq!(toc[0].title, "Chapter One");
        assert_eq!(toc[0].children.len(), 1);
        assert_eq!(toc[0].children[0].href.as_deref(), Some("text/ch1.xhtml#s"));

        // No manifest item behind it, but the entry stays.
        assert_eq!(toc[1], TocEntry::link("Missing", "text/gone.xhtml"));
    }

    #[test]
    fn nav_update_keeps_landmarks_and_heading() {
        let mut package = package();
        package.toc = parse_nav(&package, "OEBPS/nav.xhtml", NAV).unwrap();
        package
            .toc
            .insert(0, TocEntry::new("Cover", "text/ch2.xhtml", "ch2"));

        let updated = update_nav(&package, "OEBPS/nav.xhtml", NAV).unwrap();
        assert!(updated.contains("epub:type=\"landmarks\""));
        assert!(updated.contains("<h1>Contents</h1>"));

        let reread = parse_nav(&package, "OEBPS/nav.xhtml", &updated).unwrap();
        assert_eq!(reread, package.toc);
    }

    #[test]
    fn nav_update_copies_existing_entries_as_written() {
        let mut package = package();
        package.toc = parse_nav(&package, "OEBPS/nav.xhtml", NAV).unwrap();
        package
            .toc
            .insert(0, TocEntry::new("Cover", "text/ch2.xhtml", "ch2"));

        let updated = update_nav(&package, "OEBPS/nav.xhtml", NAV).unwrap();
        assert!(updated.contains(
            "<ol>\n    <li><a href=\"text/ch2.xhtml\">Cover</a></li>\n    <li><a href=\"text/ch1.xhtml\">Chapter\n        One</a>"
        ));
        assert!(updated.contains("<li><span>Untargeted</span>"));
        assert!(updated.contains("<li><a href=\"http://example.com/\">Elsewhere</a></li>"));
    }

    #[test]
    fn nav_update_drops_entries_removed_from_the_package() {
        let mut package = package();
        package.toc = parse_nav(&package, "OEBPS/nav.xhtml", NAV).unwrap();
        package.toc.retain(|entry| entry.title != "Elsewhere");

        let updated = update_nav(&package, "OEBPS/nav.xhtml", NAV).unwrap();
        assert!(!updated.contains("Elsewhere"));
        assert_eq!(
            parse_nav(&package, "OEBPS/nav.xhtml", &updated).unwrap(),
            package.toc
        );
    }

    #[test]
    fn ncx_update_keeps_page_list() {
        let mut package = package();
        package.toc = parse_ncx(&package, "OEBPS/toc.ncx", NCX).unwrap();
        package
            .toc
            .insert(0, TocEntry::new("Cover", "text/ch2.xhtml", "ch2"));

        let updated = update_ncx(&package, "OEBPS/toc.ncx", NCX).unwrap();
        assert!(updated.contains("<pageList>"));
        assert!(updated.contains("playOrder=\"1\"><navLabel><text>Cover</text>"));

        let reread = parse_ncx(&package, "OEBPS/toc.ncx", &updated).unwrap();
        assert_eq!(reread, package.toc);
    }

    #[test]
    fn ncx_update_renumbers_play_order() {
        let mut package = package();
        package.toc = parse_ncx(&package, "OEBPS/toc.ncx", NCX).unwrap();
        package
            .toc
            .insert(0, TocEntry::new("Cover", "text/ch2.xhtml", "ch2"));

        let updated = update_ncx(&package, "OEBPS/toc.ncx", NCX).unwrap();
        assert!(updated.contains("<navPoint id=\"p1\" playOrder=\"2\">"));
        assert!(updated.contains("<navPoint id=\"p2\" playOrder=\"3\">"));
        assert!(updated.contains("<navPoint id=\"p3\" playOrder=\"4\">"));
        // Page targets are numbered on their own.
        assert!(updated.contains("<pageTarget id=\"pg1\" type=\"normal\" value=\"1\">"));
    }

    #[test]
    fn secondary_ncx_keeps_entries_the_nav_does_not_list() {
        let mut package = package();
        package.toc_path = Some("OEBPS/nav.xhtml".into());
        // The nav lists Chapter One without its section.
        package.toc = vec![
            TocEntry::new("Cover", "text/ch2.xhtml#cover", "ch2"),
            TocEntry::new("Chapter One", "text/ch1.xhtml", "ch1"),
        ];

        let updated = update_ncx(&package, "OEBPS/toc.ncx", NCX).unwrap();
        let reread = parse_ncx(&package, "OEBPS/toc.ncx", &updated).unwrap();
        let titles: Vec<_> = reread.iter().map(|entry| entry.title.as_str()).collect();
        assert_eq!(titles, ["Cover", "Chapter One", "Missing"]);
        assert_eq!(reread[1].children.len(), 1, "copied as written");
        assert!(updated.contains("<navPoint id=\"deckblatt-navpoint-1\" playOrder=\"1\">"));
    }

    #[test]
    fn hrefs_are_rewritten_relative_to_the_document() {
        let mut package = package();
        package.toc = vec![TocEntry::new("One", "text/ch1.xhtml#a", "ch1")];

        let rendered = render_nav(&package, "OEBPS/nav/nav.xhtml");
        assert!(rendered.contains("href=\"../text/ch1.xhtml#a\""));
        assert_eq!(
            parse_nav(&package, "OEBPS/nav/nav.xhtml", &rendered).unwrap(),
            package.toc
        );
    }

    #[test]
    fn document_without_nav_is_regenerated() {
        let mut package = package();
        package.toc = vec![TocEntry::new("One", "text/ch1.xhtml", "ch1")];

        let updated = update_nav(&package, "OEBPS/nav.xhtml", "<html><body/></html>").unwrap();
        assert!(updated.contains("epub:type=\"toc\""));
        assert_eq!(parse_nav(&package, "OEBPS/nav.xhtml", &updated).unwrap(), package.toc);
    }
}
