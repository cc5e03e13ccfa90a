//! # pdf-conform: structural parsing and conformance validation for PDF
//!
//! pdf-conform reads a PDF file the way a strict reader does: header,
//! cross-reference chain, object graph, page tree and metadata. It reports
//! whether the file is well-formed, whether it is valid, which properties it
//! has and which conformance profiles (PDF/A-1, PDF/X, tagged, linearized) it
//! satisfies.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_conform::{ValidatorConfig, validate_file};
//!
//! let report = validate_file("document.pdf", &ValidatorConfig::default())?;
//! println!("well-formed: {}, valid: {}", report.well_formed, report.valid);
//! for profile in &report.profiles {
//!     println!("profile: {}", profile);
//! }
//! # Ok::<(), pdf_conform::PDFError>(())
//! ```
//!
//! ## Architecture
//!
//! The crate is layered bottom-up:
//!
//! 1. **Streams**: [`BaseStream`] and [`Stream`] give random access to the bytes
//! 2. **Lexer and parser**: [`Lexer`] tokenizes, [`Parser`] builds [`PDFObject`]s
//! 3. **Cross-reference**: [`XRef`] maps object numbers to locations and
//!    resolves indirect references, including objects inside object streams
//! 4. **Document**: [`PDFDocument`] walks the trailer chain and finds the catalog
//! 5. **Validation**: [`validate`] runs every phase and assembles a
//!    [`ValidationReport`]
//!
//! Lower layers can be used on their own:
//!
//! ```no_run
//! use pdf_conform::PDFDocument;
//!
//! let mut doc = PDFDocument::open(std::fs::read("document.pdf")?)?;
//! println!("{} pages, version {}", doc.page_count()?, doc.version());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod core;

// Re-export main types for convenience
pub use core::{
    BaseStream, Lexer, Message, PDFDocument, PDFError, PDFObject, PDFResult, Parser, Property,
    Severity, Stream, Token, Tristate, ValidationReport, Validator, ValidatorConfig, XRef,
    XRefEntry, validate, validate_file,
};
