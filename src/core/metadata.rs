//! Document metadata: the information dictionary, catalog properties, fonts,
//! images and filters found through page resources, embedded XMP and
//! whole-file checksums.

use super::config::ValidatorConfig;
use super::decode::FilterKind;
use super::error::{PDFError, PDFResult};
use super::page::PageTree;
use super::parser::{Dict, PDFObject, PDFStream};
use super::report::{Checksums, Message, Property, Severity};
use super::xref::XRef;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rustc_hash::FxHashSet;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

// ============================================================================
// Document information dictionary
// ============================================================================

/// Standard entries of the document information dictionary, in report order.
pub const INFO_KEYS: &[&str] = &[
    "Title",
    "Author",
    "Subject",
    "Keywords",
    "Creator",
    "Producer",
    "CreationDate",
    "ModDate",
    "Trapped",
];

fn two_digits(bytes: &[u8], range: std::ops::RangeInclusive<u32>) -> bool {
    bytes.len() == 2
        && bytes.iter().all(u8::is_ascii_digit)
        && range.contains(&(u32::from(bytes[0] - b'0') * 10 + u32::from(bytes[1] - b'0')))
}

/// Checks a date string against `D:YYYYMMDDHHmmSSOHH'mm'`.
///
/// Every field after the year may be omitted, from the right.
pub fn is_valid_date(text: &str) -> bool {
    let Some(rest) = text.strip_prefix("D:") else {
        return false;
    };
    let bytes = rest.as_bytes();
    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if !matches!(digits, 4 | 6 | 8 | 10 | 12 | 14) {
        return false;
    }

    const FIELDS: [std::ops::RangeInclusive<u32>; 5] = [1..=12, 1..=31, 0..=23, 0..=59, 0..=59];
    for (i, range) in FIELDS.iter().enumerate() {
        let start = 4 + i * 2;
        if start >= digits {
            break;
        }
        if !two_digits(&bytes[start..start + 2], range.clone()) {
            return false;
        }
    }

    let zone = &bytes[digits..];
    let Some((&sign, offset)) = zone.split_first() else {
        return true;
    };
    if !matches!(sign, b'+' | b'-' | b'Z') {
        return false;
    }
    // HH, then optionally 'mm with an optional closing apostrophe
    let offset = offset.strip_suffix(b"'").unwrap_or(offset);
    match offset.len() {
        0 => true,
        2 => two_digits(offset, 0..=23),
        5 => two_digits(&offset[..2], 0..=23) && offset[2] == b'\'' && two_digits(&offset[3..], 0..=59),
        _ => false,
    }
}

/// Builds the Info property group, checking dates and the Trapped entry.
pub fn info_property(xref: &mut XRef, info: &Dict) -> PDFResult<(Property, Vec<Message>)> {
    let mut children = Vec::new();
    let mut messages = Vec::new();

    let mut custom: Vec<&String> = info.keys().filter(|k| !INFO_KEYS.contains(&k.as_str())).collect();
    custom.sort();
    let keys = INFO_KEYS.iter().copied().chain(custom.iter().map(|k| k.as_str()));

    for key in keys {
        let Some(value) = info.get(key) else {
            continue;
        };
        let value = xref.fetch_if_ref(value)?;
        if key == "Trapped" {
            match value.as_name() {
                Some(name @ ("True" | "False" | "Unknown")) => children.push(Property::text(key, name)),
                _ => messages.push(Message::invalid(format!(
                    "Info /Trapped is a {}, not True, False or Unknown",
                    value.type_name()
                ))),
            }
            continue;
        }

        let text = match &value {
            PDFObject::Name(name) => Some(name.clone()),
            other => other.as_text(),
        };
        let Some(text) = text else {
            if INFO_KEYS.contains(&key) {
                messages.push(Message::invalid(format!(
                    "Info /{} is a {}, not a text string",
                    key,
                    value.type_name()
                )));
            }
            continue;
        };
        if matches!(key, "CreationDate" | "ModDate") && !is_valid_date(&text) {
            messages.push(Message::invalid(format!("Info /{} is not a valid date: {}", key, text)));
        }
        children.push(Property::text(key, text));
    }

    Ok((Property::group("Info", children), messages))
}

// ============================================================================
// Catalog
// ============================================================================

const PAGE_LAYOUTS: &[&str] = &[
    "SinglePage",
    "OneColumn",
    "TwoColumnLeft",
    "TwoColumnRight",
    "TwoPageLeft",
    "TwoPageRight",
];

const PAGE_MODES: &[&str] = &[
    "UseNone",
    "UseOutlines",
    "UseThumbs",
    "FullScreen",
    "UseOC",
    "UseAttachments",
];

/// Descriptive facts about the document catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogInfo {
    pub page_layout: Option<String>,
    pub page_mode: Option<String>,
    pub lang: Option<String>,
    pub has_acroform: bool,
    pub has_struct_tree: bool,
    /// MarkInfo /Marked is true
    pub marked: bool,
    /// /S of each output intent
    pub output_intents: Vec<String>,
    pub has_metadata: bool,
    pub has_names: bool,
    /// Document-level JavaScript and Launch actions
    pub actions: Vec<String>,
}

fn action_type(xref: &mut XRef, action: &PDFObject) -> PDFResult<Option<String>> {
    Ok(xref
        .fetch_dict(action)?
        .and_then(|a| a.get("S").and_then(PDFObject::as_name).map(str::to_string)))
}

fn is_forbidden_action(kind: &str) -> bool {
    matches!(kind, "JavaScript" | "Launch")
}

impl CatalogInfo {
    pub fn read(xref: &mut XRef, catalog: &Dict) -> PDFResult<(Self, Vec<Message>)> {
        let mut info = CatalogInfo::default();
        let mut messages = Vec::new();

        for (key, allowed, slot) in [
            ("PageLayout", PAGE_LAYOUTS, &mut info.page_layout),
            ("PageMode", PAGE_MODES, &mut info.page_mode),
        ] {
            if let Some(value) = catalog.get(key) {
                match value.as_name() {
                    Some(name) if allowed.contains(&name) => *slot = Some(name.to_string()),
                    Some(name) => messages.push(Message::invalid(format!("unknown catalog /{} /{}", key, name))),
                    None => messages.push(Message::invalid(format!("catalog /{} is not a name", key))),
                }
            }
        }

        if let Some(lang) = catalog.get("Lang") {
            info.lang = xref.fetch_if_ref(lang)?.as_text();
        }
        info.has_acroform = catalog.contains_key("AcroForm");
        info.has_struct_tree = catalog.contains_key("StructTreeRoot");
        info.has_metadata = catalog.contains_key("Metadata");
        if let Some(mark_info) = catalog.get("MarkInfo") {
            info.marked = xref
                .fetch_dict(mark_info)?
                .and_then(|m| m.get("Marked").and_then(PDFObject::as_bool))
                .unwrap_or(false);
        }

        if let Some(intents) = catalog.get("OutputIntents") {
            let intents = xref.fetch_if_ref(intents)?;
            for intent in intents.as_array().unwrap_or(&[]) {
                if let Some(subtype) = xref
                    .fetch_dict(intent)?
                    .and_then(|d| d.get("S").and_then(PDFObject::as_name).map(str::to_string))
                {
                    info.output_intents.push(subtype);
                }
            }
        }

        if let Some(names) = catalog.get("Names") {
            info.has_names = true;
            if xref.fetch_dict(names)?.is_some_and(|n| n.contains_key("JavaScript")) {
                info.actions.push("JavaScript name tree".to_string());
            }
        }
        if let Some(open_action) = catalog.get("OpenAction") {
            if let Some(kind) = action_type(xref, open_action)? {
                if is_forbidden_action(&kind) {
                    info.actions.push(format!("{} open action", kind));
                }
            }
        }
        if catalog.contains_key("AA") {
            info.actions.push("document additional actions".to_string());
        }

        Ok((info, messages))
    }

    pub fn to_property(&self) -> Property {
        let mut children = Vec::new();
        if let Some(layout) = &self.page_layout {
            children.push(Property::text("PageLayout", layout.as_str()));
        }
        if let Some(mode) = &self.page_mode {
            children.push(Property::text("PageMode", mode.as_str()));
        }
        if let Some(lang) = &self.lang {
            children.push(Property::text("Language", lang.as_str()));
        }
        children.push(Property::boolean("AcroForm", self.has_acroform));
        children.push(Property::boolean("StructTreeRoot", self.has_struct_tree));
        children.push(Property::boolean("Marked", self.marked));
        children.push(Property::boolean("Metadata", self.has_metadata));
        children.push(Property::boolean("Names", self.has_names));
        if !self.output_intents.is_empty() {
            children.push(Property::group(
                "OutputIntents",
                self.output_intents
                    .iter()
                    .map(|s| Property::text("OutputIntent", s.as_str()))
                    .collect(),
            ));
        }
        Property::group("Catalog", children)
    }
}

// ============================================================================
// Page resources: fonts, images, filters
// ============================================================================

/// Font subtypes in report order.
pub const FONT_SUBTYPES: &[&str] = &[
    "Type0",
    "Type1",
    "MMType1",
    "Type3",
    "TrueType",
    "CIDFontType0",
    "CIDFontType2",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontInfo {
    pub subtype: String,
    pub base_font: Option<String>,
    pub embedded: bool,
    /// BaseFont carries an `ABCDEF+` subset tag
    pub subset: bool,
    pub object_num: Option<u32>,
}

fn is_subset_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() > 7 && bytes[6] == b'+' && bytes[..6].iter().all(u8::is_ascii_uppercase)
}

impl FontInfo {
    fn to_property(&self) -> Property {
        let mut children = Vec::new();
        if let Some(base_font) = &self.base_font {
            children.push(Property::text("BaseFont", base_font.as_str()));
        }
        children.push(Property::boolean("Embedded", self.embedded));
        children.push(Property::boolean("Subset", self.subset));
        if let Some(num) = self.object_num {
            children.push(Property::integer("ObjectNumber", i64::from(num)));
        }
        Property::group("Font", children)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub object_num: Option<u32>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub bits_per_component: Option<i64>,
    pub color_space: Option<String>,
    pub filters: Vec<String>,
}

impl ImageInfo {
    fn to_property(&self) -> Property {
        let mut children = Vec::new();
        if let Some(num) = self.object_num {
            children.push(Property::integer("ObjectNumber", i64::from(num)));
        }
        for (name, value) in [
            ("Width", self.width),
            ("Height", self.height),
            ("BitsPerComponent", self.bits_per_component),
        ] {
            if let Some(value) = value {
                children.push(Property::integer(name, value));
            }
        }
        if let Some(color_space) = &self.color_space {
            children.push(Property::text("ColorSpace", color_space.as_str()));
        }
        if !self.filters.is_empty() {
            children.push(Property::text("Filters", self.filters.join(" ")));
        }
        Property::group("Image", children)
    }
}

/// Everything gathered from page dictionaries and their resources.
#[derive(Debug, Clone, Default)]
pub struct ResourceSummary {
    pub fonts: Vec<FontInfo>,
    /// Enumeration stopped at the configured font limit
    pub fonts_truncated: bool,
    pub images: Vec<ImageInfo>,
    /// Full names of every filter seen on a visited stream
    pub filters: BTreeSet<String>,
    /// Annotation count per page, by page index
    pub annotation_counts: Vec<usize>,
    pub uses_transparency: bool,
    pub uses_device_color: bool,
    /// JavaScript and Launch actions found on annotations
    pub actions: Vec<String>,
}

impl ResourceSummary {
    pub fn all_fonts_embedded(&self) -> bool {
        self.fonts.iter().all(|f| f.embedded)
    }

    /// Fonts grouped by subtype, known subtypes first.
    pub fn fonts_property(&self) -> Property {
        let mut subtypes: Vec<&str> = FONT_SUBTYPES.to_vec();
        for font in &self.fonts {
            if !subtypes.contains(&font.subtype.as_str()) {
                subtypes.push(font.subtype.as_str());
            }
        }
        let groups = subtypes
            .into_iter()
            .filter_map(|subtype| {
                let fonts: Vec<Property> = self
                    .fonts
                    .iter()
                    .filter(|f| f.subtype == subtype)
                    .map(FontInfo::to_property)
                    .collect();
                (!fonts.is_empty()).then(|| Property::group(subtype, fonts))
            })
            .collect();
        Property::group("Fonts", groups)
    }

    pub fn images_property(&self) -> Property {
        Property::group("Images", self.images.iter().map(ImageInfo::to_property).collect())
    }

    pub fn filters_property(&self) -> Property {
        Property::group(
            "Filters",
            self.filters.iter().map(|f| Property::text("Filter", f.as_str())).collect(),
        )
    }
}

fn sorted_entries(dict: Dict) -> Vec<(String, PDFObject)> {
    let mut entries: Vec<_> = dict.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

fn is_device_space(name: &str) -> bool {
    matches!(name, "DeviceRGB" | "DeviceCMYK" | "DeviceGray")
}

struct ResourceScanner<'a> {
    xref: &'a mut XRef,
    config: &'a ValidatorConfig,
    summary: ResourceSummary,
    messages: Vec<Message>,
    seen_resources: FxHashSet<u32>,
    seen_fonts: FxHashSet<u32>,
    seen_xobjects: FxHashSet<u32>,
    unknown_filters: FxHashSet<String>,
}

impl ResourceScanner<'_> {
    fn note_filters(&mut self, stream: &PDFStream) {
        for filter in &stream.filters {
            match FilterKind::from_name(filter) {
                Some(kind) => {
                    self.summary.filters.insert(kind.name().to_string());
                }
                None => {
                    self.summary.filters.insert(filter.clone());
                    if self.unknown_filters.insert(filter.clone()) {
                        self.messages.push(Message::invalid(format!("unknown filter /{}", filter)));
                    }
                }
            }
        }
    }

    fn note_stream(&mut self, obj: &PDFObject) -> PDFResult<()> {
        if let PDFObject::Stream(stream) = self.xref.fetch_if_ref(obj)? {
            self.note_filters(&stream);
        }
        Ok(())
    }

    fn scan_page(&mut self, dict: &Dict, resources: Option<&PDFObject>, sequence: usize) -> PDFResult<()> {
        if let Some(group) = dict.get("Group") {
            self.note_group(group)?;
        }

        if let Some(contents) = dict.get("Contents") {
            match self.xref.fetch_if_ref(contents)? {
                PDFObject::Array(items) => {
                    for item in &items {
                        self.note_stream(item)?;
                    }
                }
                PDFObject::Stream(stream) => self.note_filters(&stream),
                _ => {}
            }
        }

        let mut annotations = 0;
        if let Some(annots) = dict.get("Annots") {
            let annots = self.xref.fetch_if_ref(annots)?;
            for annot in annots.as_array().unwrap_or(&[]) {
                annotations += 1;
                let Some(annot) = self.xref.fetch_dict(annot)? else {
                    continue;
                };
                if let Some(action) = annot.get("A") {
                    if let Some(kind) = action_type(self.xref, action)? {
                        if is_forbidden_action(&kind) {
                            self.summary.actions.push(format!("{} action on page {}", kind, sequence));
                        }
                    }
                }
            }
        }
        self.summary.annotation_counts.push(annotations);

        if let Some(resources) = resources {
            self.scan_resources(resources, 0)?;
        }
        Ok(())
    }

    fn note_group(&mut self, group: &PDFObject) -> PDFResult<()> {
        let is_transparency = self
            .xref
            .fetch_dict(group)?
            .is_some_and(|g| g.get("S").and_then(PDFObject::as_name) == Some("Transparency"));
        if is_transparency {
            self.summary.uses_transparency = true;
        }
        Ok(())
    }

    fn scan_resources(&mut self, resources: &PDFObject, depth: usize) -> PDFResult<()> {
        if depth > self.config.max_tree_depth {
            return Err(PDFError::RecursionLimit {
                limit: self.config.max_tree_depth,
                context: "scanning nested form resources",
            });
        }
        let (value, num) = self.xref.fetch_with_num(resources)?;
        if let Some(num) = num {
            if !self.seen_resources.insert(num) {
                return Ok(());
            }
        }
        let Some(dict) = value.as_dict() else {
            return Ok(());
        };

        if let Some(fonts) = dict.get("Font") {
            if let Some(fonts) = self.xref.fetch_dict(fonts)? {
                for (_, font) in sorted_entries(fonts) {
                    self.add_font(&font)?;
                }
            }
        }
        if let Some(xobjects) = dict.get("XObject") {
            if let Some(xobjects) = self.xref.fetch_dict(xobjects)? {
                for (_, xobject) in sorted_entries(xobjects) {
                    self.add_xobject(&xobject, depth)?;
                }
            }
        }
        if let Some(spaces) = dict.get("ColorSpace") {
            if let Some(spaces) = self.xref.fetch_dict(spaces)? {
                for (_, space) in sorted_entries(spaces) {
                    let space = self.xref.fetch_if_ref(&space)?;
                    let name = match &space {
                        PDFObject::Name(name) => Some(name.as_str()),
                        PDFObject::Array(items) => items.first().and_then(PDFObject::as_name),
                        _ => None,
                    };
                    if name.is_some_and(is_device_space) {
                        self.summary.uses_device_color = true;
                    }
                }
            }
        }
        if let Some(states) = dict.get("ExtGState") {
            if let Some(states) = self.xref.fetch_dict(states)? {
                for (_, state) in sorted_entries(states) {
                    let Some(state) = self.xref.fetch_dict(&state)? else {
                        continue;
                    };
                    let soft_mask = state
                        .get("SMask")
                        .is_some_and(|m| m.as_name() != Some("None"));
                    let alpha = ["CA", "ca"]
                        .iter()
                        .any(|k| state.get(*k).and_then(PDFObject::as_number).is_some_and(|a| a < 1.0));
                    if soft_mask || alpha {
                        self.summary.uses_transparency = true;
                    }
                }
            }
        }
        Ok(())
    }

    /// Records a font and, for Type0 fonts, its descendants. Returns whether
    /// the font is embedded, or `None` when it was not enumerated.
    fn add_font(&mut self, font: &PDFObject) -> PDFResult<Option<bool>> {
        let (value, num) = self.xref.fetch_with_num(font)?;
        if let Some(num) = num {
            if !self.seen_fonts.insert(num) {
                return Ok(self
                    .summary
                    .fonts
                    .iter()
                    .find(|f| f.object_num == Some(num))
                    .map(|f| f.embedded));
            }
        }
        let Some(dict) = value.as_dict() else {
            self.messages.push(Message::invalid(format!(
                "font resource is a {}, not a dictionary",
                value.type_name()
            )));
            return Ok(None);
        };
        if self.summary.fonts.len() >= self.config.max_fonts {
            if !self.summary.fonts_truncated {
                self.summary.fonts_truncated = true;
                self.messages.push(Message::info(format!(
                    "font enumeration stopped after {} fonts",
                    self.config.max_fonts
                )));
            }
            return Ok(None);
        }

        let subtype = match dict.get("Subtype").and_then(PDFObject::as_name) {
            Some(subtype) => subtype.to_string(),
            None => {
                self.messages.push(Message::invalid("font dictionary has no /Subtype"));
                "Unknown".to_string()
            }
        };
        let base_font = dict.get("BaseFont").and_then(PDFObject::as_name).map(str::to_string);
        let slot = self.summary.fonts.len();

        let embedded = match subtype.as_str() {
            // Glyphs are content streams inside the document
            "Type3" => true,
            "Type0" => {
                let descendants = match dict.get("DescendantFonts") {
                    Some(d) => self.xref.fetch_if_ref(d)?,
                    None => PDFObject::Null,
                };
                let descendants = descendants.as_array().unwrap_or(&[]);
                let mut all = !descendants.is_empty();
                for descendant in descendants {
                    all &= self.add_font(descendant)?.unwrap_or(false);
                }
                all
            }
            _ => self.descriptor_embedded(dict)?,
        };

        let info = FontInfo {
            subset: base_font.as_deref().is_some_and(is_subset_name),
            subtype,
            base_font,
            embedded,
            object_num: num,
        };
        self.summary.fonts.insert(slot.min(self.summary.fonts.len()), info);
        Ok(Some(embedded))
    }

    fn descriptor_embedded(&mut self, font: &Dict) -> PDFResult<bool> {
        let Some(descriptor) = font.get("FontDescriptor") else {
            return Ok(false);
        };
        let Some(descriptor) = self.xref.fetch_dict(descriptor)? else {
            return Ok(false);
        };
        let mut embedded = false;
        for key in ["FontFile", "FontFile2", "FontFile3"] {
            if let Some(file) = descriptor.get(key) {
                embedded = true;
                self.note_stream(file)?;
            }
        }
        Ok(embedded)
    }

    fn add_xobject(&mut self, xobject: &PDFObject, depth: usize) -> PDFResult<()> {
        let (value, num) = self.xref.fetch_with_num(xobject)?;
        if let Some(num) = num {
            if !self.seen_xobjects.insert(num) {
                return Ok(());
            }
        }
        let kind = value.type_name();
        let PDFObject::Stream(stream) = value else {
            self.messages.push(Message::invalid(format!(
                "XObject resource is a {}, not a stream",
                kind
            )));
            return Ok(());
        };
        self.note_filters(&stream);
        let dict = &stream.dict;

        match dict.get("Subtype").and_then(PDFObject::as_name) {
            Some("Image") => {
                let color_space = match dict.get("ColorSpace") {
                    Some(space) => match self.xref.fetch_if_ref(space)? {
                        PDFObject::Name(name) => Some(name),
                        PDFObject::Array(items) => items.first().and_then(PDFObject::as_name).map(str::to_string),
                        _ => None,
                    },
                    None => None,
                };
                if color_space.as_deref().is_some_and(is_device_space) {
                    self.summary.uses_device_color = true;
                }
                if dict.get("SMask").is_some_and(|m| !m.is_null()) {
                    self.summary.uses_transparency = true;
                }
                let int = |key: &str| dict.get(key).and_then(PDFObject::as_int);
                self.summary.images.push(ImageInfo {
                    object_num: num,
                    width: int("Width"),
                    height: int("Height"),
                    bits_per_component: int("BitsPerComponent"),
                    color_space,
                    filters: stream.filters.to_vec(),
                });
            }
            Some("Form") => {
                if let Some(group) = dict.get("Group") {
                    self.note_group(group)?;
                }
                if let Some(resources) = dict.get("Resources") {
                    self.scan_resources(resources, depth + 1)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Scans every page's annotations, content streams and (inherited) resources.
///
/// A failure inside one page is reported and the scan moves on to the next.
pub fn scan_pages(
    xref: &mut XRef,
    pages: &PageTree,
    config: &ValidatorConfig,
) -> (ResourceSummary, Vec<Message>) {
    let mut scanner = ResourceScanner {
        xref,
        config,
        summary: ResourceSummary::default(),
        messages: Vec::new(),
        seen_resources: FxHashSet::default(),
        seen_fonts: FxHashSet::default(),
        seen_xobjects: FxHashSet::default(),
        unknown_filters: FxHashSet::default(),
    };

    for page in &pages.pages {
        let counted = scanner.summary.annotation_counts.len();
        if let Err(err) = scanner.scan_page(page.dict(), page.resources(), page.sequence()) {
            scanner.messages.push(Message::from_error(
                Severity::Invalid,
                &format!("page {} resources", page.sequence()),
                &err,
            ));
        }
        // Keep one count per page even when the scan stopped early
        scanner.summary.annotation_counts.resize(counted + 1, 0);
    }
    log::debug!(
        "resources: {} font(s), {} image(s), filters {:?}",
        scanner.summary.fonts.len(),
        scanner.summary.images.len(),
        scanner.summary.filters
    );
    (scanner.summary, scanner.messages)
}

// ============================================================================
// XMP
// ============================================================================

/// What is read from an embedded XMP packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmpInfo {
    /// Decoded length in bytes
    pub length: usize,
    pub pdfa_part: Option<String>,
    pub pdfa_conformance: Option<String>,
}

#[derive(Clone, Copy)]
enum PdfaField {
    Part,
    Conformance,
}

fn pdfa_field(name: &[u8]) -> Option<PdfaField> {
    match name {
        b"pdfaid:part" => Some(PdfaField::Part),
        b"pdfaid:conformance" => Some(PdfaField::Conformance),
        _ => None,
    }
}

impl XmpInfo {
    fn set(&mut self, field: PdfaField, value: &str) {
        let value = Some(value.trim().to_string()).filter(|v| !v.is_empty());
        match field {
            PdfaField::Part => self.pdfa_part = value,
            PdfaField::Conformance => self.pdfa_conformance = value,
        }
    }

    fn read_attributes(&mut self, element: &BytesStart<'_>) {
        for attr in element.attributes().flatten() {
            if let Some(field) = pdfa_field(attr.key.as_ref()) {
                self.set(field, &String::from_utf8_lossy(&attr.value));
            }
        }
    }
}

/// Parses an XMP packet, picking out the PDF/A identification schema in
/// either element or attribute form.
pub fn parse_xmp(data: &[u8]) -> PDFResult<XmpInfo> {
    let mut info = XmpInfo {
        length: data.len(),
        ..XmpInfo::default()
    };
    let mut reader = Reader::from_reader(data);
    let mut buf = Vec::new();
    let mut current: Option<PdfaField> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                info.read_attributes(e);
                current = pdfa_field(e.name().as_ref());
            }
            Ok(Event::Empty(ref e)) => info.read_attributes(e),
            Ok(Event::Text(ref e)) => {
                if let Some(field) = current {
                    let text = e.unescape().map_err(|err| PDFError::Decode {
                        filter: "XMP".to_string(),
                        message: err.to_string(),
                    })?;
                    info.set(field, &text);
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(PDFError::Decode {
                    filter: "XMP".to_string(),
                    message: format!("not well-formed XML at byte {}: {}", reader.buffer_position(), err),
                });
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(info)
}

/// Reads and parses the catalog's /Metadata stream.
pub fn read_xmp(xref: &mut XRef, catalog: &Dict) -> PDFResult<Option<XmpInfo>> {
    let Some(metadata) = catalog.get("Metadata") else {
        return Ok(None);
    };
    let PDFObject::Stream(stream) = xref.fetch_if_ref(metadata)? else {
        return Err(PDFError::Generic("catalog /Metadata is not a stream".to_string()));
    };
    let data = xref.decode_stream_data(&stream)?;
    parse_xmp(&data).map(Some)
}

impl XmpInfo {
    pub fn to_property(&self) -> Property {
        let mut children = vec![Property::integer("Length", self.length as i64)];
        if let Some(part) = &self.pdfa_part {
            children.push(Property::text("PDFAPart", part.as_str()));
        }
        if let Some(conformance) = &self.pdfa_conformance {
            children.push(Property::text("PDFAConformance", conformance.as_str()));
        }
        Property::group("XMP", children)
    }
}

// ============================================================================
// Checksums
// ============================================================================

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// CRC32, MD5, SHA-1 and SHA-256 of the whole file.
pub fn checksums(data: &[u8]) -> Checksums {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    Checksums {
        crc32: format!("{:08x}", crc.sum()),
        md5: format!("{:x}", md5::compute(data)),
        sha1: hex(&sha1::Sha1::digest(data)),
        sha256: hex(&Sha256::digest(data)),
    }
}
