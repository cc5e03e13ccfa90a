//! Cross-reference (xref) resolution tests
//!
//! Classic tables, cross-reference streams, object streams and trailer chains.

mod test_utils;

use pdf_conform::core::*;
use test_utils::*;

// ============================================================================
// Classic tables
// ============================================================================

#[test]
fn test_single_classic_table() {
    let pdf = simple_document(1).xref_table("/Root 1 0 R").build();

    let mut doc = PDFDocument::open(pdf.clone()).unwrap();
    assert_eq!(doc.xref().size(), 4);
    assert_eq!(doc.chain().incremental_updates(), 0);
    assert_eq!(doc.catalog_num(), Some(1));
    assert_eq!(doc.page_count().unwrap(), 1);

    let report = validate_default(&pdf);
    assert!(report.is_well_formed(), "{}", report);
    assert_eq!(integer_property(&report, "Objects"), Some(4));
    assert_eq!(integer_property(&report, "IncrementalUpdates"), Some(0));
}

#[test]
fn test_incremental_update_redefines_object() {
    let mut builder = simple_document(1);
    builder.xref_table("/Root 1 0 R");
    let old_offset = builder.offset_of(2);
    builder
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 595 842] >>")
        .xref_table("/Root 1 0 R");
    let new_offset = builder.offset_of(2);
    assert_ne!(old_offset, new_offset);
    let pdf = builder.build();

    let mut doc = PDFDocument::open(pdf.clone()).unwrap();
    assert_eq!(doc.chain().incremental_updates(), 1);
    assert_eq!(
        doc.xref().get_entry(2),
        Some(&XRefEntry::Uncompressed {
            offset: new_offset as u64,
            generation: 0
        })
    );
    let pages = doc.xref_mut().fetch(2, 0).unwrap();
    assert_eq!(
        pages.get("MediaBox").and_then(|b| b.as_array()).map(|b| b[2].clone()),
        Some(PDFObject::Number(595.0))
    );

    let report = validate_default(&pdf);
    assert_eq!(integer_property(&report, "IncrementalUpdates"), Some(1));
    assert_eq!(text_property(&report, "Pages/Page/MediaBox"), Some("[0 0 595 842]"));
}

#[test]
fn test_newest_section_wins_across_chain() {
    // Oldest section defines 4; the middle one adds 5; the newest redefines 4.
    let mut builder = simple_document(1);
    builder.object(4, "(oldest)").xref_table("/Root 1 0 R");
    builder.object(5, "(middle)").xref_table("/Root 1 0 R");
    builder.object(4, "(newest)").xref_table("/Root 1 0 R");
    let pdf = builder.build();

    let mut doc = PDFDocument::open(pdf).unwrap();
    assert_eq!(doc.chain().sections.len(), 3);
    assert_eq!(doc.chain().incremental_updates(), 2);

    let xref = doc.xref_mut();
    assert_eq!(xref.fetch(4, 0).unwrap(), PDFObject::String(b"newest".to_vec()));
    assert_eq!(xref.fetch(5, 0).unwrap(), PDFObject::String(b"middle".to_vec()));
}

#[test]
fn test_free_count_sums_across_chain() {
    let mut builder = simple_document(1);
    builder.free(4, 1).xref_table("/Root 1 0 R");
    builder.free(5, 0).object(6, "42").xref_stream(7, "/Root 1 0 R");
    let pdf = builder.build();

    let doc = PDFDocument::open(pdf.clone()).unwrap();
    // object 0 and 4 in the table, 5 in the stream
    assert_eq!(doc.xref().free_count(), 3);
    assert!(doc.chain().uses_xref_streams());

    let report = validate_default(&pdf);
    assert_eq!(integer_property(&report, "FreeObjects"), Some(3));
}

#[test]
fn test_object_zero_and_free_entries_resolve_to_null() {
    let mut builder = simple_document(1);
    builder.free(4, 1).xref_table("/Root 1 0 R");
    let mut doc = PDFDocument::open(builder.build()).unwrap();
    let xref = doc.xref_mut();

    assert_eq!(xref.fetch(0, 65535).unwrap(), PDFObject::Null);
    assert_eq!(xref.fetch(4, 1).unwrap(), PDFObject::Null);
    assert!(matches!(
        xref.fetch(99, 0),
        Err(PDFError::ObjectOutOfRange { num: 99, size: 5 })
    ));
}

#[test]
fn test_nonstandard_record_spacing_is_reported() {
    let pdf = simple_document(1).xref_table("/Root 1 0 R").build();
    // Turn the first in-use record's "n \n" into "n\n"
    let pdf = replace_bytes(&pdf, b" 00000 n \n", b" 00000 n\n");

    let doc = PDFDocument::open(pdf.clone()).unwrap();
    assert_eq!(doc.chain().nonstandard_records(), 1);

    let report = validate_default(&pdf);
    assert!(report.is_well_formed());
    assert!(report.has_message_containing("nonstandard spacing"));
}

// ============================================================================
// Cross-reference streams and object streams
// ============================================================================

fn compressed_document() -> PdfBuilder {
    let mut builder = PdfBuilder::new("1.5");
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] >>")
        .object_stream(
            5,
            &[
                (6, "<< /Kind /First >>"),
                (7, "[1 2 3]"),
                (8, "/SomeName"),
                (9, "(target)"),
            ],
        )
        .xref_stream(10, "/Root 1 0 R");
    builder
}

#[test]
fn test_object_stream_decoded_once() {
    let mut doc = PDFDocument::open(compressed_document().build()).unwrap();
    assert!(doc.chain().uses_xref_streams());

    let xref = doc.xref_mut();
    assert_eq!(
        xref.get_entry(9),
        Some(&XRefEntry::Compressed {
            obj_stream_num: 5,
            index: 3
        })
    );

    let before = xref.stats();
    assert_eq!(xref.fetch(9, 0).unwrap(), PDFObject::String(b"target".to_vec()));
    let after_first = xref.stats();
    assert_eq!(after_first.container_decodes, before.container_decodes + 1);

    assert_eq!(xref.fetch(9, 0).unwrap(), PDFObject::String(b"target".to_vec()));
    let after_second = xref.stats();
    assert_eq!(after_second.object_reads, after_first.object_reads);
    assert_eq!(after_second.container_decodes, after_first.container_decodes);
    assert_eq!(after_second.container_hits, after_first.container_hits + 1);

    assert_eq!(xref.fetch(8, 0).unwrap(), PDFObject::Name("SomeName".to_string()));
    assert_eq!(xref.stats().container_decodes, after_first.container_decodes);
}

#[test]
fn test_compressed_document_validates() {
    let report = validate_default(&compressed_document().build());
    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);
    assert_eq!(report.property("XRefStreams").and_then(|p| p.as_bool()), Some(true));
    assert_eq!(text_property(&report, "Filters/Filter"), None);
}

#[test]
fn test_hybrid_file_is_flagged_unsupported() {
    let mut builder = simple_document(1);
    builder.xref_table("/Root 1 0 R /XRefStm 9999");
    let pdf = builder.build();

    let report = validate_default(&pdf);
    assert!(report.is_well_formed());
    assert!(report.has_message_containing("hybrid-reference"));
    assert!(
        report
            .messages_with(Severity::Info)
            .any(|m| m.text.contains("unsupported"))
    );
}

// ============================================================================
// Broken chains
// ============================================================================

#[test]
fn test_missing_startxref_is_malformed() {
    let pdf = simple_document(1).xref_table("/Root 1 0 R").build();
    let pdf = replace_bytes(&pdf, b"startxref", b"startref");

    assert!(PDFDocument::open(pdf.clone()).is_err());

    let report = validate_default(&pdf);
    assert_eq!(report.well_formed, Tristate::False);
    assert_eq!(report.valid, Tristate::False);
    assert!(report.messages_with(Severity::Malformed).count() >= 1);
}

#[test]
fn test_prev_loop_is_rejected() {
    let mut builder = simple_document(1);
    builder.xref_table("/Root 1 0 R");
    let pdf = builder.build();
    let xref_offset = rfind_bytes(&pdf, b"xref\n0 ").unwrap();
    // Point the only section's /Prev back at itself
    let looped = replace_bytes(
        &pdf,
        b"/Root 1 0 R >>",
        format!("/Root 1 0 R /Prev {} >>", xref_offset).as_bytes(),
    );

    assert!(matches!(
        PDFDocument::open(looped),
        Err(PDFError::XRef(_))
    ));
}
