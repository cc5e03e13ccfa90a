//! Conformance profiles.
//!
//! Each profile is a [`ProfileChecker`] evaluated over [`DocumentFacts`]
//! gathered once per run. Checkers may ask for another profile's result
//! through the [`ProfileContext`], which evaluates each profile at most once.

use super::document::{Header, Linearization};
use super::metadata::{CatalogInfo, ResourceSummary, XmpInfo};
use rustc_hash::FxHashMap;

pub const LINEARIZED: &str = "Linearized PDF";
pub const TAGGED: &str = "Tagged PDF";
pub const PDFA_1B: &str = "ISO PDF/A-1, Level B";
pub const PDFA_1A: &str = "ISO PDF/A-1, Level A";
pub const PDFX_1: &str = "ISO PDF/X-1";
pub const PDFX_1A: &str = "ISO PDF/X-1a";
pub const PDFX_2: &str = "ISO PDF/X-2";
pub const PDFX_3: &str = "ISO PDF/X-3";

/// Everything the profile predicates look at.
#[derive(Debug, Clone)]
pub struct DocumentFacts {
    pub header: Header,
    /// Effective version (header or catalog /Version)
    pub version: String,
    /// Bytes beyond an end of line follow the last `%%EOF`
    pub eof_trailing_data: bool,
    pub has_trailer_id: bool,
    pub encrypted: bool,
    pub uses_xref_streams: bool,
    /// Classic xref records with nonstandard spacing
    pub nonstandard_xref_records: usize,
    pub linearization: Option<Linearization>,
    pub catalog: CatalogInfo,
    pub resources: ResourceSummary,
    pub xmp: Option<XmpInfo>,
    pub pdfx_version: Option<String>,
    pub pdfx_conformance: Option<String>,
    pub trapped: Option<String>,
    pub page_count: usize,
    /// Pages carrying a TrimBox or an ArtBox
    pub pages_with_trim_or_art: usize,
}

/// A named conformance predicate. `Err` carries the first failed requirement.
pub trait ProfileChecker {
    fn name(&self) -> &'static str;

    fn check(&self, ctx: &mut ProfileContext<'_>) -> Result<(), String>;
}

fn require(condition: bool, reason: &str) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(reason.to_string())
    }
}

/// Evaluation state for one run: the facts plus memoized results.
pub struct ProfileContext<'a> {
    registry: &'a ProfileRegistry,
    facts: &'a DocumentFacts,
    results: FxHashMap<&'static str, Result<(), String>>,
}

impl<'a> ProfileContext<'a> {
    pub fn facts(&self) -> &'a DocumentFacts {
        self.facts
    }

    /// Result of the named profile, evaluating it on first request.
    pub fn evaluate(&mut self, name: &'static str) -> Result<(), String> {
        if let Some(result) = self.results.get(name) {
            return result.clone();
        }
        let registry = self.registry;
        let Some(checker) = registry.get(name) else {
            return Err(format!("no profile named {}", name));
        };
        // Placeholder so a profile that depends on itself fails instead of recursing
        self.results.insert(name, Err("circular profile dependency".to_string()));
        let result = checker.check(self);
        self.results.insert(name, result.clone());
        result
    }

    pub fn satisfies(&mut self, name: &'static str) -> bool {
        self.evaluate(name).is_ok()
    }
}

/// Outcome of evaluating every registered profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileOutcome {
    pub matched: Vec<String>,
    /// Profiles not satisfied, with the first failed requirement
    pub failed: Vec<(String, String)>,
}

pub struct ProfileRegistry {
    checkers: Vec<Box<dyn ProfileChecker>>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ProfileRegistry {
    pub fn empty() -> Self {
        ProfileRegistry { checkers: Vec::new() }
    }

    /// Registry with every built-in profile.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(LinearizedProfile));
        registry.register(Box::new(TaggedProfile));
        registry.register(Box::new(PdfA1bProfile));
        registry.register(Box::new(PdfA1aProfile));
        for variant in [PdfXVariant::X1, PdfXVariant::X1a, PdfXVariant::X2, PdfXVariant::X3] {
            registry.register(Box::new(PdfXProfile { variant }));
        }
        registry
    }

    pub fn register(&mut self, checker: Box<dyn ProfileChecker>) {
        self.checkers.push(checker);
    }

    fn get(&self, name: &str) -> Option<&dyn ProfileChecker> {
        self.checkers.iter().find(|c| c.name() == name).map(|c| c.as_ref())
    }

    pub fn evaluate(&self, facts: &DocumentFacts) -> ProfileOutcome {
        let mut ctx = ProfileContext {
            registry: self,
            facts,
            results: FxHashMap::default(),
        };
        let mut outcome = ProfileOutcome::default();
        for checker in &self.checkers {
            match ctx.evaluate(checker.name()) {
                Ok(()) => outcome.matched.push(checker.name().to_string()),
                Err(reason) => outcome.failed.push((checker.name().to_string(), reason)),
            }
        }
        log::debug!("profiles matched: {:?}", outcome.matched);
        outcome
    }
}

struct LinearizedProfile;

impl ProfileChecker for LinearizedProfile {
    fn name(&self) -> &'static str {
        LINEARIZED
    }

    fn check(&self, ctx: &mut ProfileContext<'_>) -> Result<(), String> {
        let linearization = ctx
            .facts()
            .linearization
            .as_ref()
            .ok_or_else(|| "no linearization dictionary".to_string())?;
        require(
            linearization.length_matches(),
            "linearization /L does not match the file length",
        )
    }
}

struct TaggedProfile;

impl ProfileChecker for TaggedProfile {
    fn name(&self) -> &'static str {
        TAGGED
    }

    fn check(&self, ctx: &mut ProfileContext<'_>) -> Result<(), String> {
        let catalog = &ctx.facts().catalog;
        require(catalog.marked, "MarkInfo /Marked is not true")?;
        require(catalog.has_struct_tree, "no StructTreeRoot")
    }
}

fn version_at_most_1_4(version: &str) -> bool {
    matches!(version, "1.0" | "1.1" | "1.2" | "1.3" | "1.4")
}

struct PdfA1bProfile;

impl ProfileChecker for PdfA1bProfile {
    fn name(&self) -> &'static str {
        PDFA_1B
    }

    fn check(&self, ctx: &mut ProfileContext<'_>) -> Result<(), String> {
        let facts = ctx.facts();
        require(version_at_most_1_4(&facts.version), "version later than 1.4")?;
        require(facts.header.binary_comment, "no binary comment after the header")?;
        require(!facts.eof_trailing_data, "data follows the %%EOF marker")?;
        require(facts.has_trailer_id, "trailer has no /ID")?;
        require(!facts.encrypted, "document is encrypted")?;
        require(!facts.uses_xref_streams, "cross-reference streams are used")?;
        require(
            facts.nonstandard_xref_records == 0,
            "cross-reference records with nonstandard spacing",
        )?;
        require(
            !facts.resources.filters.contains("LZWDecode"),
            "LZWDecode filter is used",
        )?;
        require(!facts.resources.fonts_truncated, "font enumeration was truncated")?;
        require(facts.resources.all_fonts_embedded(), "not all fonts are embedded")?;

        let xmp = facts.xmp.as_ref().ok_or_else(|| "no XMP metadata".to_string())?;
        require(
            xmp.pdfa_part.as_deref() == Some("1"),
            "XMP does not identify PDF/A part 1",
        )?;

        if facts.resources.uses_device_color {
            require(
                facts.catalog.output_intents.iter().any(|s| s == "GTS_PDFA1"),
                "device colour without a GTS_PDFA1 output intent",
            )?;
        }
        require(
            facts.catalog.actions.is_empty() && facts.resources.actions.is_empty(),
            "JavaScript or Launch actions present",
        )?;
        require(!facts.resources.uses_transparency, "transparency is used")
    }
}

struct PdfA1aProfile;

impl ProfileChecker for PdfA1aProfile {
    fn name(&self) -> &'static str {
        PDFA_1A
    }

    fn check(&self, ctx: &mut ProfileContext<'_>) -> Result<(), String> {
        ctx.evaluate(PDFA_1B)?;
        require(ctx.satisfies(TAGGED), "document is not tagged")?;
        let facts = ctx.facts();
        require(facts.catalog.lang.is_some(), "catalog has no /Lang")?;
        require(
            facts.xmp.as_ref().and_then(|x| x.pdfa_conformance.as_deref()) == Some("A"),
            "XMP does not declare conformance level A",
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PdfXVariant {
    X1,
    X1a,
    X2,
    X3,
}

struct PdfXProfile {
    variant: PdfXVariant,
}

impl PdfXProfile {
    fn claims_variant(&self, facts: &DocumentFacts) -> bool {
        let version = facts.pdfx_version.as_deref().unwrap_or("");
        let conformance = facts.pdfx_conformance.as_deref().unwrap_or("");
        match self.variant {
            PdfXVariant::X1a => version.starts_with("PDF/X-1a") || conformance.starts_with("PDF/X-1a"),
            PdfXVariant::X1 => version.starts_with("PDF/X-1") && !version.starts_with("PDF/X-1a"),
            PdfXVariant::X2 => version.starts_with("PDF/X-2"),
            PdfXVariant::X3 => version.starts_with("PDF/X-3"),
        }
    }
}

impl ProfileChecker for PdfXProfile {
    fn name(&self) -> &'static str {
        match self.variant {
            PdfXVariant::X1 => PDFX_1,
            PdfXVariant::X1a => PDFX_1A,
            PdfXVariant::X2 => PDFX_2,
            PdfXVariant::X3 => PDFX_3,
        }
    }

    fn check(&self, ctx: &mut ProfileContext<'_>) -> Result<(), String> {
        let facts = ctx.facts();
        require(facts.pdfx_version.is_some(), "Info has no /GTS_PDFXVersion")?;
        require(self.claims_variant(facts), "Info /GTS_PDFXVersion names another variant")?;
        require(
            matches!(facts.trapped.as_deref(), Some("True" | "False")),
            "Info /Trapped is not True or False",
        )?;
        require(
            facts.catalog.output_intents.iter().any(|s| s == "GTS_PDFX"),
            "no GTS_PDFX output intent",
        )?;
        require(
            facts.page_count > 0 && facts.pages_with_trim_or_art == facts.page_count,
            "a page lacks both TrimBox and ArtBox",
        )?;
        require(!facts.encrypted, "document is encrypted")?;
        if matches!(self.variant, PdfXVariant::X1 | PdfXVariant::X1a) {
            require(!facts.resources.fonts_truncated, "font enumeration was truncated")?;
            require(facts.resources.all_fonts_embedded(), "not all fonts are embedded")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::FontInfo;

    fn archival_facts() -> DocumentFacts {
        let mut resources = ResourceSummary::default();
        resources.fonts.push(FontInfo {
            subtype: "TrueType".to_string(),
            base_font: Some("ABCDEF+Arial".to_string()),
            embedded: true,
            subset: true,
            object_num: Some(9),
        });
        DocumentFacts {
            header: Header {
                version: "1.4".to_string(),
                offset: 0,
                postscript_alias: false,
                binary_comment: true,
            },
            version: "1.4".to_string(),
            eof_trailing_data: false,
            has_trailer_id: true,
            encrypted: false,
            uses_xref_streams: false,
            nonstandard_xref_records: 0,
            linearization: None,
            catalog: CatalogInfo {
                lang: Some("en".to_string()),
                marked: true,
                has_struct_tree: true,
                has_metadata: true,
                ..CatalogInfo::default()
            },
            resources,
            xmp: Some(XmpInfo {
                length: 100,
                pdfa_part: Some("1".to_string()),
                pdfa_conformance: Some("A".to_string()),
            }),
            pdfx_version: None,
            pdfx_conformance: None,
            trapped: None,
            page_count: 1,
            pages_with_trim_or_art: 0,
        }
    }

    #[test]
    fn test_pdfa_levels() {
        let outcome = ProfileRegistry::standard().evaluate(&archival_facts());
        assert_eq!(
            outcome.matched,
            vec![TAGGED.to_string(), PDFA_1B.to_string(), PDFA_1A.to_string()]
        );
    }

    #[test]
    fn test_pdfa_failure_reasons() {
        let mut facts = archival_facts();
        facts.resources.fonts[0].embedded = false;
        facts.catalog.lang = None;

        let outcome = ProfileRegistry::standard().evaluate(&facts);
        assert_eq!(outcome.matched, vec![TAGGED.to_string()]);
        let reason = outcome
            .failed
            .iter()
            .find(|(name, _)| name == PDFA_1A)
            .map(|(_, reason)| reason.as_str());
        assert_eq!(reason, Some("not all fonts are embedded"));
    }

    #[test]
    fn test_device_colour_needs_output_intent() {
        let mut facts = archival_facts();
        facts.resources.uses_device_color = true;
        assert!(!ProfileRegistry::standard().evaluate(&facts).matched.contains(&PDFA_1B.to_string()));

        facts.catalog.output_intents.push("GTS_PDFA1".to_string());
        assert!(ProfileRegistry::standard().evaluate(&facts).matched.contains(&PDFA_1B.to_string()));
    }

    #[test]
    fn test_pdfx_variants() {
        let mut facts = archival_facts();
        facts.pdfx_version = Some("PDF/X-1a:2001".to_string());
        facts.trapped = Some("False".to_string());
        facts.catalog.output_intents.push("GTS_PDFX".to_string());
        facts.pages_with_trim_or_art = 1;

        let outcome = ProfileRegistry::standard().evaluate(&facts);
        assert!(outcome.matched.contains(&PDFX_1A.to_string()));
        assert!(!outcome.matched.contains(&PDFX_1.to_string()));
        assert!(!outcome.matched.contains(&PDFX_3.to_string()));
    }

    #[test]
    fn test_linearized() {
        let mut facts = archival_facts();
        facts.linearization = Some(Linearization {
            object_num: 1,
            declared_length: Some(500),
            file_length: 500,
        });
        assert!(ProfileRegistry::standard().evaluate(&facts).matched.contains(&LINEARIZED.to_string()));
    }

    #[test]
    fn test_self_dependency_fails() {
        struct Dependent;
        impl ProfileChecker for Dependent {
            fn name(&self) -> &'static str {
                "Dependent"
            }
            fn check(&self, ctx: &mut ProfileContext<'_>) -> Result<(), String> {
                ctx.evaluate("Dependent")
            }
        }
        let mut registry = ProfileRegistry::empty();
        registry.register(Box::new(Dependent));
        let outcome = registry.evaluate(&archival_facts());
        assert_eq!(outcome.failed[0].1, "circular profile dependency");
    }
}
