//! Validation run: folds every phase into a [`ValidationReport`].
//!
//! Phases run in dependency order. A malformed-file error ends the run; any
//! other phase failure is reported and the run continues with what is left.

use super::config::ValidatorConfig;
use super::document::{Header, PDFDocument};
use super::encryption::EncryptionInfo;
use super::error::{PDFError, PDFResult};
use super::metadata::{self, CatalogInfo, ResourceSummary, XmpInfo};
use super::outline::{DestinationResolver, Outline, walk_outline};
use super::page::{PageLabels, PageTree, walk_page_tree};
use super::parser::{Dict, PDFObject};
use super::profile::{DocumentFacts, PDFA_1B, ProfileRegistry};
use super::report::{Message, Property, Severity, Tristate, ValidationReport};
use super::stream::Stream;
use std::path::Path;

/// Runs validations with one configuration and profile registry.
pub struct Validator {
    config: ValidatorConfig,
    registry: ProfileRegistry,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Validator {
            config,
            registry: ProfileRegistry::standard(),
        }
    }

    pub fn with_registry(mut self, registry: ProfileRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validates an in-memory document. Never fails: every defect ends up in
    /// the report.
    pub fn validate(&self, bytes: &[u8]) -> ValidationReport {
        let mut report = ValidationReport::new();
        if self.config.compute_checksums {
            report.checksums = Some(metadata::checksums(bytes));
        }

        let stream = Stream::from_bytes(bytes.to_vec());
        let header = match Header::read(&stream) {
            Ok(header) => header,
            Err(err) => {
                report.add_message(Message::from_error(Severity::Malformed, "header", &err));
                report.finish();
                return report;
            }
        };
        report.version = Some(header.version.clone());
        let header_messages = header.messages();

        let mut doc = match PDFDocument::load(Box::new(stream), header, &self.config) {
            Ok(doc) => doc,
            Err(err) => {
                report.extend_messages(header_messages);
                report.add_message(Message::from_error(
                    Severity::Malformed,
                    "cross-reference data",
                    &err,
                ));
                report.finish();
                return report;
            }
        };

        let mut run = Run {
            config: &self.config,
            doc: &mut doc,
            report: &mut report,
        };
        let facts = run.collect();
        if self.config.check_profiles && report.well_formed != Tristate::False {
            apply_profiles(&self.registry, &facts, &mut report);
        }
        report.finish();
        log::debug!(
            "validation finished: well-formed {}, valid {}",
            report.well_formed,
            report.valid
        );
        report
    }

    pub fn validate_file(&self, path: impl AsRef<Path>) -> PDFResult<ValidationReport> {
        let path = path.as_ref();
        log::debug!("validating {}", path.display());
        let bytes = std::fs::read(path)?;
        Ok(self.validate(&bytes))
    }
}

/// Validates `bytes` with `config` and the built-in profiles.
pub fn validate(bytes: &[u8], config: &ValidatorConfig) -> ValidationReport {
    Validator::new(config.clone()).validate(bytes)
}

/// Reads and validates the file at `path`. Only I/O failures are errors.
pub fn validate_file(path: impl AsRef<Path>, config: &ValidatorConfig) -> PDFResult<ValidationReport> {
    Validator::new(config.clone()).validate_file(path)
}

fn apply_profiles(registry: &ProfileRegistry, facts: &DocumentFacts, report: &mut ValidationReport) {
    let outcome = registry.evaluate(facts);
    let claims_pdfa1 = facts
        .xmp
        .as_ref()
        .is_some_and(|x| x.pdfa_part.as_deref() == Some("1"));
    if claims_pdfa1 {
        if let Some((_, reason)) = outcome.failed.iter().find(|(name, _)| name == PDFA_1B) {
            report.add_message(Message::info(format!(
                "XMP claims PDF/A-1 conformance, but {}",
                reason
            )));
        }
    }
    report.profiles = outcome.matched;
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// `[llx lly urx ury]`, if `obj` is an array of four numbers.
fn format_box(obj: &PDFObject) -> Option<String> {
    let items = obj.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let numbers: Option<Vec<String>> = items
        .iter()
        .map(|n| n.as_number().map(format_number))
        .collect();
    Some(format!("[{}]", numbers?.join(" ")))
}

struct Run<'a> {
    config: &'a ValidatorConfig,
    doc: &'a mut PDFDocument,
    report: &'a mut ValidationReport,
}

impl Run<'_> {
    fn flush(&mut self) {
        let messages = self.doc.take_messages();
        self.report.extend_messages(messages);
    }

    fn phase_failed(&mut self, severity: Severity, phase: &str, err: &PDFError) {
        log::warn!("{} phase failed: {}", phase, err);
        self.report.add_message(Message::from_error(severity, phase, err));
    }

    /// Runs every descriptive phase, returning the facts profiles need.
    fn collect(&mut self) -> DocumentFacts {
        self.report.version = Some(self.doc.version());
        self.structure();

        let catalog = self.catalog();
        let encrypted = self.doc.is_encrypted();
        if encrypted {
            self.encryption();
        }
        let info = self.info();

        let (pages, labels) = self.pages();
        let resources = self.resources(pages.as_ref(), &labels);
        self.outlines(pages.as_ref());
        let xmp = self.xmp(encrypted);
        self.flush();

        let info_text = |key: &str| {
            info.as_ref()
                .and_then(|d| d.get(key))
                .and_then(|v| v.as_text().or_else(|| v.as_name().map(str::to_string)))
        };
        let page_list = pages.as_ref().map(|p| p.pages.as_slice()).unwrap_or(&[]);
        let chain = self.doc.chain();

        DocumentFacts {
            header: self.doc.header().clone(),
            version: self.doc.version(),
            eof_trailing_data: chain.eof.trailing_data,
            has_trailer_id: chain.trailer.id.is_some(),
            encrypted,
            uses_xref_streams: chain.uses_xref_streams(),
            nonstandard_xref_records: chain.nonstandard_records(),
            linearization: self.doc.linearization().cloned(),
            catalog,
            resources,
            xmp,
            pdfx_version: info_text("GTS_PDFXVersion"),
            pdfx_conformance: info_text("GTS_PDFXConformance"),
            trapped: info_text("Trapped"),
            page_count: page_list.len(),
            pages_with_trim_or_art: page_list
                .iter()
                .filter(|p| p.get("TrimBox").is_some() || p.get("ArtBox").is_some())
                .count(),
        }
    }

    fn structure(&mut self) {
        let xref = self.doc.xref();
        let objects = xref.size() as i64;
        let free = xref.free_count() as i64;
        let chain = self.doc.chain();
        let updates = chain.incremental_updates() as i64;
        let uses_streams = chain.uses_xref_streams();
        let nonstandard = chain.nonstandard_records();
        let eof = chain.eof;

        self.report.add_property(Property::integer("Objects", objects));
        self.report.add_property(Property::integer("FreeObjects", free));
        self.report.add_property(Property::integer("IncrementalUpdates", updates));
        self.report.add_property(Property::boolean("XRefStreams", uses_streams));

        if eof.trailing_data {
            self.report.add_message(
                Message::info("data follows the last %%EOF marker").at(eof.offset),
            );
        }
        if nonstandard > 0 {
            self.report.add_message(Message::info(format!(
                "{} cross-reference record(s) with nonstandard spacing",
                nonstandard
            )));
        }

        let linearization = self.doc.linearization().cloned();
        self.report
            .add_property(Property::boolean("Linearized", linearization.is_some()));
        if let Some(lin) = linearization {
            if !lin.length_matches() {
                self.report.add_message(Message::info(format!(
                    "linearization /L {:?} does not match file length {}",
                    lin.declared_length, lin.file_length
                )));
            }
        }
        self.flush();
    }

    fn catalog(&mut self) -> CatalogInfo {
        let catalog = self.doc.catalog().clone();
        match CatalogInfo::read(self.doc.xref_mut(), &catalog) {
            Ok((info, messages)) => {
                self.report.add_property(info.to_property());
                self.report.extend_messages(messages);
                self.flush();
                info
            }
            Err(err) => {
                self.phase_failed(Severity::Invalid, "catalog", &err);
                CatalogInfo::default()
            }
        }
    }

    fn encryption(&mut self) {
        match self.doc.encrypt_dict() {
            Ok(Some(dict)) => {
                let (info, messages) = EncryptionInfo::from_dict(&dict);
                self.report.add_property(info.to_property());
                self.report.extend_messages(messages);
            }
            Ok(None) => self
                .report
                .add_message(Message::invalid("trailer /Encrypt is not a dictionary")),
            Err(err) => self.phase_failed(Severity::Invalid, "encryption dictionary", &err),
        }
    }

    fn info(&mut self) -> Option<Dict> {
        let info = match self.doc.info_dict() {
            Ok(info) => info?,
            Err(err) => {
                self.phase_failed(Severity::Invalid, "document information", &err);
                return None;
            }
        };
        match metadata::info_property(self.doc.xref_mut(), &info) {
            Ok((property, messages)) => {
                self.report.add_property(property);
                self.report.extend_messages(messages);
            }
            Err(err) => self.phase_failed(Severity::Invalid, "document information", &err),
        }
        Some(info)
    }

    fn pages(&mut self) -> (Option<PageTree>, PageLabels) {
        let Some(root) = self.doc.catalog().get("Pages").cloned() else {
            self.report.add_message(Message::malformed("catalog has no /Pages entry"));
            return (None, PageLabels::default());
        };
        let max_depth = self.config.max_tree_depth;
        let tree = match walk_page_tree(self.doc.xref_mut(), &root, max_depth) {
            Ok(tree) => tree,
            Err(err) => {
                self.phase_failed(Severity::Malformed, "page tree", &err);
                return (None, PageLabels::default());
            }
        };
        self.report.extend_messages(tree.messages.iter().cloned());

        let labels = match self.doc.catalog().get("PageLabels").cloned() {
            Some(labels) => match PageLabels::load(self.doc.xref_mut(), &labels, max_depth) {
                Ok((labels, messages)) => {
                    self.report.extend_messages(messages);
                    labels
                }
                Err(err) => {
                    self.phase_failed(Severity::Invalid, "page labels", &err);
                    PageLabels::default()
                }
            },
            None => PageLabels::default(),
        };
        self.flush();
        (Some(tree), labels)
    }

    fn resources(&mut self, pages: Option<&PageTree>, labels: &PageLabels) -> ResourceSummary {
        let Some(pages) = pages else {
            return ResourceSummary::default();
        };
        let (summary, messages) = metadata::scan_pages(self.doc.xref_mut(), pages, self.config);
        self.report.extend_messages(messages);

        let mut page_properties = Vec::with_capacity(pages.pages.len());
        for page in &pages.pages {
            let seq = page.sequence();
            let mut children = vec![Property::integer("Sequence", seq as i64)];
            if let Some(label) = labels.label(page.index()) {
                children.push(Property::text("Label", label));
            }
            if let Some(num) = page.object_num() {
                children.push(Property::integer("ObjectNumber", i64::from(num)));
            }
            match page.media_box().map(|b| (b, format_box(b))) {
                Some((_, Some(media_box))) => children.push(Property::text("MediaBox", media_box)),
                Some((value, None)) => self.report.add_message(Message::invalid(format!(
                    "page {} /MediaBox is a malformed rectangle ({})",
                    seq,
                    value.type_name()
                ))),
                None => self
                    .report
                    .add_message(Message::invalid(format!("page {} has no /MediaBox", seq))),
            }
            if let Some(crop_box) = page.crop_box().and_then(format_box) {
                children.push(Property::text("CropBox", crop_box));
            }
            match page.rotate() {
                Some(rotate) if rotate % 90 == 0 => children.push(Property::integer("Rotate", rotate)),
                Some(rotate) => self.report.add_message(Message::invalid(format!(
                    "page {} /Rotate {} is not a multiple of 90",
                    seq, rotate
                ))),
                None => self
                    .report
                    .add_message(Message::invalid(format!("page {} /Rotate is not an integer", seq))),
            }
            let annotations = summary.annotation_counts.get(page.index()).copied().unwrap_or(0);
            children.push(Property::integer("Annotations", annotations as i64));
            page_properties.push(Property::group("Page", children));
        }
        self.report.add_property(Property::group("Pages", page_properties));

        if self.config.show_fonts {
            self.report.add_property(summary.fonts_property());
        } else {
            self.report.add_message(Message::info("fonts omitted by configuration"));
        }
        self.report.add_property(summary.images_property());
        self.report.add_property(summary.filters_property());
        self.flush();
        summary
    }

    fn outlines(&mut self, pages: Option<&PageTree>) {
        let Some(pages) = pages else {
            return;
        };
        let Some(outlines) = self.doc.catalog().get("Outlines").cloned() else {
            return;
        };
        let catalog = self.doc.catalog().clone();
        let max_depth = self.config.max_tree_depth;

        let result = (|| -> PDFResult<Option<Outline>> {
            let xref = self.doc.xref_mut();
            let Some(outlines) = xref.fetch_dict(&outlines)? else {
                return Ok(None);
            };
            let resolver = DestinationResolver::new(xref, &catalog, pages, max_depth)?;
            walk_outline(xref, &outlines, &resolver, max_depth).map(Some)
        })();

        match result {
            Ok(Some(outline)) => {
                let mut children = vec![Property::integer("Items", outline.items.len() as i64)];
                for item in &outline.items {
                    let mut fields = vec![
                        Property::text("Title", item.title.as_str()),
                        Property::integer("Level", item.depth as i64),
                    ];
                    if let Some(destination) = item.destination {
                        fields.push(Property::text("Destination", destination.to_string()));
                    }
                    children.push(Property::group("Item", fields));
                }
                self.report.add_property(Property::group("Outlines", children));
                self.report.extend_messages(outline.messages);
            }
            Ok(None) => self
                .report
                .add_message(Message::invalid("catalog /Outlines is not a dictionary")),
            Err(err) => self.phase_failed(Severity::Invalid, "outlines", &err),
        }
        self.flush();
    }

    fn xmp(&mut self, encrypted: bool) -> Option<XmpInfo> {
        if !self.doc.catalog().contains_key("Metadata") {
            return None;
        }
        if encrypted {
            self.report.add_message(Message::info(
                "XMP metadata not inspected in an encrypted document",
            ));
            return None;
        }
        let catalog = self.doc.catalog().clone();
        match metadata::read_xmp(self.doc.xref_mut(), &catalog) {
            Ok(xmp) => {
                if let Some(xmp) = &xmp {
                    self.report.add_property(xmp.to_property());
                }
                xmp
            }
            Err(err) => {
                self.phase_failed(Severity::Invalid, "XMP metadata", &err);
                None
            }
        }
    }
}
