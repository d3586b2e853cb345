// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// EPUB package model.
//
// The manifest is an id-keyed map; the spine and the TOC refer to manifest
// items by id. Reordering or inserting entries is plain sequence editing, no
// pointer surgery. Hrefs are stored exactly as the package document states
// them, relative to the OPF directory.

use std::collections::{BTreeMap, HashMap};

/// Media type of XHTML content documents.
pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";
/// Media type of EPUB 2 NCX navigation files.
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

// -- Metadata -----------------------------------------------------------------

/// Which flavour of metadata element a key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetaNamespace {
    /// `<dc:*>` Dublin Core elements.
    DublinCore,
    /// EPUB 2 `<meta name="..." content="..."/>`.
    Meta,
    /// EPUB 3 `<meta property="...">value</meta>`.
    Property,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetaKey {
    pub namespace: MetaNamespace,
    pub name: String,
}

impl MetaKey {
    pub fn dc(name: &str) -> Self {
        Self {
            namespace: MetaNamespace::DublinCore,
            name: name.to_string(),
        }
    }

    pub fn meta(name: &str) -> Self {
        Self {
            namespace: MetaNamespace::Meta,
            name: name.to_string(),
        }
    }

    pub fn property(name: &str) -> Self {
        Self {
            namespace: MetaNamespace::Property,
            name: name.to_string(),
        }
    }
}

/// A metadata value, either bare text or text with extra attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    Bare(String),
    WithAttributes(String, Vec<(String, String)>),
}

impl MetaValue {
    /// Build a value, collapsing to `Bare` when there are no attributes.
    pub fn new(text: impl Into<String>, attributes: Vec<(String, String)>) -> Self {
        if attributes.is_empty() {
            Self::Bare(text.into())
        } else {
            Self::WithAttributes(text.into(), attributes)
        }
    }

    /// The plain string, whichever representation holds it.
    pub fn text(&self) -> &str {
        match self {
            Self::Bare(text) | Self::WithAttributes(text, _) => text,
        }
    }

    pub fn attributes(&self) -> &[(String, String)] {
        match self {
            Self::Bare(_) => &[],
            Self::WithAttributes(_, attributes) => attributes,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Package metadata keyed by namespace and name. Each key may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<MetaKey, Vec<MetaValue>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values stored under `key`, in document order.
    pub fn get(&self, key: &MetaKey) -> &[MetaValue] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Plain text of the first value under `key`.
    pub fn first_text(&self, key: &MetaKey) -> Option<&str> {
        self.get(key).first().map(MetaValue::text)
    }

    pub fn push(&mut self, key: MetaKey, value: MetaValue) {
        self.entries.entry(key).or_default().push(value);
    }

    /// Replace every value under `key`.
    pub fn set(&mut self, key: MetaKey, values: Vec<MetaValue>) {
        self.entries.insert(key, values);
    }

    pub fn remove(&mut self, key: &MetaKey) -> Vec<MetaValue> {
        self.entries.remove(key).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetaKey, &MetaValue)> {
        self.entries
            .iter()
            .flat_map(|(key, values)| values.iter().map(move |value| (key, value)))
    }

    /// First non-blank `dc:title`.
    pub fn title(&self) -> Option<&str> {
        self.first_text(&MetaKey::dc("title"))
            .map(str::trim)
            .filter(|title| !title.is_empty())
    }

    /// Manifest id named by the EPUB 2 `cover` declaration.
    pub fn cover_id(&self) -> Option<&str> {
        self.first_text(&MetaKey::meta("cover"))
    }
}

// -- Manifest, spine, TOC, guide ----------------------------------------------

/// One manifest entry and the bytes of the file it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
    /// Space-separated EPUB 3 properties (`nav`, `cover-image`, ...).
    pub properties: Option<String>,
    /// Any other attributes (`fallback`, `media-overlay`, ...), kept verbatim.
    pub attributes: Vec<(String, String)>,
    pub content: Vec<u8>,
}

impl ManifestItem {
    pub fn new(
        id: impl Into<String>,
        href: impl Into<String>,
        media_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
            properties: None,
            attributes: Vec::new(),
            content,
        }
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|props| props.split_whitespace().any(|p| p == property))
    }

    /// Whether the href points outside the container (`https:`, `//host/...`).
    pub fn is_remote(&self) -> bool {
        is_remote_href(&self.href)
    }

    /// Drop `property` from the property list, clearing it when it empties.
    pub fn remove_property(&mut self, property: &str) {
        let Some(props) = self.properties.as_deref() else {
            return;
        };
        let kept: Vec<&str> = props
            .split_whitespace()
            .filter(|p| *p != property)
            .collect();
        self.properties = (!kept.is_empty()).then(|| kept.join(" "));
    }
}

/// One reading-order entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItem {
    pub idref: String,
    pub linear: bool,
    pub properties: Option<String>,
    /// Any other `itemref` attributes (`id`, ...), kept verbatim.
    pub attributes: Vec<(String, String)>,
}

impl SpineItem {
    pub fn new(idref: impl Into<String>) -> Self {
        Self {
            idref: idref.into(),
            linear: true,
            properties: None,
            attributes: Vec::new(),
        }
    }
}

/// Table-of-contents entry.
///
/// When `id` is set, `href` is relative to the OPF directory (fragment
/// allowed) and points into that manifest item. Entries that lead outside
/// the manifest keep their href exactly as the navigation file wrote it.
/// Headings have no href at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub title: String,
    pub href: Option<String>,
    pub id: Option<String>,
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    /// An entry pointing at manifest item `id`.
    pub fn new(title: impl Into<String>, href: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: Some(href.into()),
            id: Some(id.into()),
            children: Vec::new(),
        }
    }

    /// A label without a target, grouping its children.
    pub fn heading(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: None,
            id: None,
            children: Vec::new(),
        }
    }

    /// An entry whose href is kept verbatim, e.g. a link to a web page.
    pub fn link(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: Some(href.into()),
            id: None,
            children: Vec::new(),
        }
    }

    /// Number of levels below and including this entry.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(TocEntry::depth).max().unwrap_or(0)
    }

    fn visit<'a>(&'a self, visitor: &mut dyn FnMut(&'a TocEntry)) {
        visitor(self);
        for child in &self.children {
            child.visit(visitor);
        }
    }
}

/// EPUB 2 `<guide>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideReference {
    pub kind: String,
    pub title: Option<String>,
    pub href: String,
}

// -- Package ------------------------------------------------------------------

/// A whole EPUB held in memory.
#[derive(Debug, Clone)]
pub struct EpubPackage {
    /// Zip path of the package document, e.g. `OEBPS/content.opf`.
    pub(crate) opf_path: String,
    /// Attributes of `<package>` (version, unique-identifier, namespaces).
    pub(crate) package_attributes: Vec<(String, String)>,
    /// Attributes of `<metadata>` (extra namespace declarations).
    pub(crate) metadata_attributes: Vec<(String, String)>,
    pub metadata: Metadata,
    /// Metadata children with no key of their own (EPUB 3 `<link>`, foreign
    /// elements), as raw XML in document order.
    pub(crate) metadata_passthrough: Vec<String>,
    pub(crate) manifest: HashMap<String, ManifestItem>,
    pub(crate) manifest_order: Vec<String>,
    pub spine: Vec<SpineItem>,
    /// Attributes of `<spine>` (`toc`, `page-progression-direction`).
    pub(crate) spine_attributes: Vec<(String, String)>,
    pub toc: Vec<TocEntry>,
    /// Zip path of the navigation file `toc` was read from.
    pub(crate) toc_path: Option<String>,
    pub guide: Vec<GuideReference>,
    /// Zip entries that are neither the OPF nor manifest items, in archive order.
    pub(crate) resources: Vec<(String, Vec<u8>)>,
    /// Actual zip entry name per item id, where it differs from the resolved href.
    pub(crate) entry_names: HashMap<String, String>,
}

impl EpubPackage {
    /// An empty package whose OPF lives at `opf_path`.
    pub fn new(opf_path: impl Into<String>) -> Self {
        Self {
            opf_path: opf_path.into(),
            package_attributes: Vec::new(),
            metadata_attributes: Vec::new(),
            metadata: Metadata::new(),
            metadata_passthrough: Vec::new(),
            manifest: HashMap::new(),
            manifest_order: Vec::new(),
            spine: Vec::new(),
            spine_attributes: Vec::new(),
            toc: Vec::new(),
            toc_path: None,
            guide: Vec::new(),
            resources: Vec::new(),
            entry_names: HashMap::new(),
        }
    }

    pub fn opf_path(&self) -> &str {
        &self.opf_path
    }

    /// Directory of the OPF inside the archive; empty at the root.
    pub fn opf_dir(&self) -> &str {
        parent_dir(&self.opf_path)
    }

    /// Declared package version, `2.0` when absent.
    pub fn version(&self) -> &str {
        attribute(&self.package_attributes, "version").unwrap_or("2.0")
    }

    pub fn is_epub3(&self) -> bool {
        self.version().trim_start().starts_with('3')
    }

    /// The `dc:identifier` named by `unique-identifier`, else the first one.
    pub fn unique_identifier(&self) -> Option<&str> {
        let identifiers = self.metadata.get(&MetaKey::dc("identifier"));
        attribute(&self.package_attributes, "unique-identifier")
            .and_then(|wanted| {
                identifiers
                    .iter()
                    .find(|value| value.attribute("id") == Some(wanted))
            })
            .or_else(|| identifiers.first())
            .map(MetaValue::text)
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.title()
    }

    // -- Manifest ---------------------------------------------------------------

    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.get(id)
    }

    pub fn item_mut(&mut self, id: &str) -> Option<&mut ManifestItem> {
        self.manifest.get_mut(id)
    }

    pub fn contains_item(&self, id: &str) -> bool {
        self.manifest.contains_key(id)
    }

    /// Manifest items in document order.
    pub fn items(&self) -> impl Iterator<Item = &ManifestItem> {
        self.manifest_order
            .iter()
            .filter_map(|id| self.manifest.get(id))
    }

    pub fn item_ids(&self) -> &[String] {
        &self.manifest_order
    }

    pub fn item_count(&self) -> usize {
        self.manifest.len()
    }

    /// Add an item, or replace the item with the same id in place.
    pub fn insert_item(&mut self, item: ManifestItem) {
        if !self.manifest.contains_key(&item.id) {
            self.manifest_order.push(item.id.clone());
        }
        self.manifest.insert(item.id.clone(), item);
    }

    pub fn remove_item(&mut self, id: &str) -> Option<ManifestItem> {
        let removed = self.manifest.remove(id)?;
        self.manifest_order.retain(|existing| existing != id);
        self.entry_names.remove(id);
        Some(removed)
    }

    /// Zip path of the file a manifest item names.
    pub fn item_path(&self, item: &ManifestItem) -> String {
        resolve_path(self.opf_dir(), split_fragment(&item.href).0)
    }

    /// Zip entry name the item is stored under.
    pub(crate) fn entry_name(&self, item: &ManifestItem) -> String {
        self.entry_names
            .get(&item.id)
            .cloned()
            .unwrap_or_else(|| self.item_path(item))
    }

    /// Id of the manifest item stored at zip path `path`.
    pub fn item_id_for_path(&self, path: &str) -> Option<&str> {
        self.items()
            .find(|item| self.item_path(item) == path)
            .map(|item| item.id.as_str())
    }

    /// Id of the manifest item an OPF-relative href points into.
    ///
    /// Falls back to the percent-decoded form when the raw href misses.
    pub fn item_id_for_href(&self, href: &str) -> Option<&str> {
        let path = resolve_path(self.opf_dir(), split_fragment(href).0);
        self.item_id_for_path(&path).or_else(|| {
            let decoded = urlencoding::decode(&path).ok()?;
            self.items()
                .find(|item| {
                    let item_path = self.item_path(item);
                    urlencoding::decode(&item_path).is_ok_and(|p| p == decoded)
                })
                .map(|item| item.id.as_str())
        })
    }

    /// The EPUB 3 navigation document, if any.
    pub fn nav_item_id(&self) -> Option<&str> {
        self.items()
            .find(|item| item.has_property("nav"))
            .map(|item| item.id.as_str())
    }

    /// The EPUB 2 NCX, named by the spine's `toc` attribute or found by media type.
    pub fn ncx_item_id(&self) -> Option<&str> {
        attribute(&self.spine_attributes, "toc")
            .filter(|id| self.contains_item(id))
            .or_else(|| {
                self.items()
                    .find(|item| item.media_type == NCX_MEDIA_TYPE)
                    .map(|item| item.id.as_str())
            })
    }

    // -- Spine --------------------------------------------------------------------

    pub fn spine_ids(&self) -> Vec<&str> {
        self.spine.iter().map(|entry| entry.idref.as_str()).collect()
    }

    /// Position of the navigation entry in the spine: the item conventionally
    /// named `nav`, or the item carrying the `nav` property.
    pub fn nav_spine_index(&self) -> Option<usize> {
        self.spine.iter().position(|entry| {
            entry.idref == "nav"
                || self
                    .item(&entry.idref)
                    .is_some_and(|item| item.has_property("nav"))
        })
    }

    // -- Archive ------------------------------------------------------------------

    /// Zip entries that are not the OPF and not manifest items.
    pub fn resources(&self) -> &[(String, Vec<u8>)] {
        &self.resources
    }

    /// Whether any file in the package (resource or manifest item) lives at `path`.
    pub fn has_path(&self, path: &str) -> bool {
        path == self.opf_path
            || self.resources.iter().any(|(name, _)| name == path)
            || self.item_id_for_path(path).is_some()
    }

    /// Check the cross-references between manifest, spine, TOC, and metadata.
    pub fn validate(&self) -> Result<(), String> {
        for entry in &self.spine {
            if !self.contains_item(&entry.idref) {
                return Err(format!(
                    "spine references unknown manifest id {:?}",
                    entry.idref
                ));
            }
        }

        let mut dangling = None;
        for entry in &self.toc {
            entry.visit(&mut |toc_entry| {
                if let Some(id) = toc_entry.id.as_deref() {
                    if dangling.is_none() && !self.contains_item(id) {
                        dangling = Some(id.to_string());
                    }
                }
            });
        }
        if let Some(id) = dangling {
            return Err(format!("table of contents references unknown manifest id {id:?}"));
        }

        if let Some(cover_id) = self.metadata.cover_id() {
            if !self.contains_item(cover_id) {
                return Err(format!(
                    "cover declaration references unknown manifest id {cover_id:?}"
                ));
            }
        }

        Ok(())
    }
}

// -- Path helpers ---------------------------------------------------------------

pub(crate) fn attribute<'a>(attributes: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Directory part of a zip path, without trailing slash.
pub(crate) fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Whether `href` leaves the container: it carries a URL scheme or is
/// network-path relative.
pub(crate) fn is_remote_href(href: &str) -> bool {
    let href = href.trim();
    if href.starts_with("//") {
        return true;
    }
    let Some((scheme, _)) = href.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && !scheme.contains('/')
}

/// Split `href` into path and optional fragment.
pub(crate) fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    }
}

/// Resolve `relative` against `base_dir`, collapsing `.` and `..` segments.
pub(crate) fn resolve_path(base_dir: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let joined = if relative.starts_with('/') {
        relative.trim_start_matches('/').to_string()
    } else if base_dir.is_empty() {
        relative.to_string()
    } else {
        format!("{base_dir}/{relative}")
    };

    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Express zip path `target` relative to directory `from_dir`.
pub(crate) fn relative_path(from_dir: &str, target: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    // Never consume the file name itself as a shared directory.
    let common = common.min(to.len().saturating_sub(1));

    let mut parts: Vec<&str> = std::iter::repeat_n("..", from.len() - common).collect();
    parts.extend(&to[common..]);
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_handles_dot_segments() {
        assert_eq!(resolve_path("OEBPS", "text/ch1.xhtml"), "OEBPS/text/ch1.xhtml");
        assert_eq!(resolve_path("OEBPS/text", "../images/a.jpg"), "OEBPS/images/a.jpg");
        assert_eq!(resolve_path("", "./ch1.xhtml"), "ch1.xhtml");
        assert_eq!(resolve_path("OEBPS", "/META-INF/container.xml"), "META-INF/container.xml");
    }

    #[test]
    fn relative_inverts_resolve() {
        assert_eq!(relative_path("OEBPS", "OEBPS/text/ch1.xhtml"), "text/ch1.xhtml");
        assert_eq!(relative_path("OEBPS/text", "OEBPS/cover.jpg"), "../cover.jpg");
        assert_eq!(relative_path("", "ch1.xhtml"), "ch1.xhtml");
        for (dir, target) in [("a/b", "a/c/d.xhtml"), ("x", "y/z.ncx"), ("", "q/r.xhtml")] {
            assert_eq!(resolve_path(dir, &relative_path(dir, target)), target);
        }
    }

    #[test]
    fn remote_hrefs_are_recognised() {
        for href in ["https://example.com/f.woff", "http://x/", "mailto:a@b.c", "//cdn.example/x.css"] {
            assert!(is_remote_href(href), "{href}");
        }
        for href in ["text/ch1.xhtml", "../a.jpg", "ch1.xhtml#s:2", "Chapter 1.xhtml", ""] {
            assert!(!is_remote_href(href), "{href}");
        }
    }

    #[test]
    fn fragment_is_split_off() {
        assert_eq!(split_fragment("ch1.xhtml#s2"), ("ch1.xhtml", Some("s2")));
        assert_eq!(split_fragment("ch1.xhtml"), ("ch1.xhtml", None));
    }

    #[test]
    fn title_reads_bare_and_attributed_values() {
        let mut metadata = Metadata::new();
        assert_eq!(metadata.title(), None);

        metadata.push(
            MetaKey::dc("title"),
            MetaValue::new("Alpha", vec![("id".into(), "main-title".into())]),
        );
        metadata.push(MetaKey::dc("title"), MetaValue::Bare("Beta".into()));
        assert_eq!(metadata.title(), Some("Alpha"));

        metadata.set(MetaKey::dc("title"), vec![MetaValue::Bare("  ".into())]);
        assert_eq!(metadata.title(), None);
    }

    #[test]
    fn property_list_edits() {
        let mut item = ManifestItem::new("img", "a.jpg", "image/jpeg", Vec::new());
        item.properties = Some("cover-image svg".into());
        assert!(item.has_property("cover-image"));

        item.remove_property("cover-image");
        assert_eq!(item.properties.as_deref(), Some("svg"));
        item.remove_property("svg");
        assert_eq!(item.properties, None);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut package = EpubPackage::new("OEBPS/content.opf");
        package.insert_item(ManifestItem::new("a", "a.xhtml", XHTML_MEDIA_TYPE, b"1".to_vec()));
        package.insert_item(ManifestItem::new("b", "b.xhtml", XHTML_MEDIA_TYPE, b"2".to_vec()));
        package.insert_item(ManifestItem::new("a", "a.xhtml", XHTML_MEDIA_TYPE, b"3".to_vec()));

        assert_eq!(package.item_ids(), &["a".to_string(), "b".to_string()]);
        assert_eq!(package.item("a").unwrap().content, b"3");
        assert_eq!(package.item_id_for_href("a.xhtml#top"), Some("a"));
        assert!(package.has_path("OEBPS/b.xhtml"));
    }

    #[test]
    fn percent_encoded_hrefs_resolve() {
        let mut package = EpubPackage::new("content.opf");
        package.insert_item(ManifestItem::new(
            "c1",
            "Chapter 1.xhtml",
            XHTML_MEDIA_TYPE,
            Vec::new(),
        ));
        assert_eq!(package.item_id_for_href("Chapter%201.xhtml"), Some("c1"));
    }

    #[test]
    fn validate_catches_dangling_references() {
        let mut package = EpubPackage::new("content.opf");
        package.insert_item(ManifestItem::new("ch1", "ch1.xhtml", XHTML_MEDIA_TYPE, Vec::new()));
        package.spine.push(SpineItem::new("ch1"));
        assert!(package.validate().is_ok());

        package.toc.push(TocEntry::new("Gone", "gone.xhtml", "gone"));
        assert!(package.validate().unwrap_err().contains("gone"));

        // Links and headings outside the manifest are fine.
        package.toc = vec![
            TocEntry::link("Errata", "https://example.com/errata"),
            TocEntry::heading("Part One"),
        ];
        assert!(package.validate().is_ok());

        package.toc.clear();
        package.spine.push(SpineItem::new("missing"));
        assert!(package.validate().unwrap_err().contains("missing"));
    }
}
