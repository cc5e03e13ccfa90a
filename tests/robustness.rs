//! Robustness tests: arbitrary and damaged input must yield a report, never a panic.

mod test_utils;

use pdf_conform::core::*;
use proptest::prelude::*;
use std::path::Path;
use test_utils::*;

fn sample_document() -> Vec<u8> {
    let mut builder = simple_document(2);
    builder
        .object(
            1,
            "<< /Type /Catalog /Pages 2 0 R /Outlines 6 0 R /PageLabels << /Nums [0 << /S /R >>] >> >>",
        )
        .object(6, "<< /Type /Outlines /First 7 0 R /Count 1 >>")
        .object(7, "<< /Title (Start) /Parent 6 0 R /Dest [3 0 R /Fit] >>")
        .object_stream(8, &[(9, "<< /Filler true >>")]);
    builder.xref_stream(10, "/Root 1 0 R");
    builder.build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: the tokenizer never panics and always reaches EOF or an error
    #[test]
    fn prop_lexer_terminates(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let budget = data.len() * 2 + 8;
        let mut lexer = Lexer::new(Box::new(Stream::from_bytes(data))).unwrap().with_comments(true);
        let mut finished = false;
        for _ in 0..budget {
            match lexer.get_object() {
                Ok(Token::EOF) | Err(_) => {
                    finished = true;
                    break;
                }
                Ok(_) => {}
            }
        }
        prop_assert!(finished);
    }

    /// Property: the object parser never panics on token soup
    #[test]
    fn prop_parser_never_panics(
        parts in proptest::collection::vec(
            prop::sample::select(vec![
                "<<", ">>", "[", "]", "/Name", "1", "0", "R", "obj", "endobj",
                "stream", "endstream", "(str)", "<4142>", "true", "null", "%c\n", " ",
            ]),
            0..64,
        )
    ) {
        let data = parts.concat().into_bytes();
        if let Ok(mut parser) = Parser::from_bytes(data) {
            for _ in 0..64 {
                if !parser.has_more() || parser.get_object().is_err() {
                    break;
                }
            }
        }
    }

    /// Property: random bytes never panic and never produce a well-formed report
    #[test]
    fn prop_random_bytes(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let report = validate_default(&data);
        prop_assert_ne!(report.well_formed, Tristate::Undetermined);
        prop_assert_ne!(report.valid, Tristate::Undetermined);
    }

    /// Property: a header followed by noise is reported, not crashed on
    #[test]
    fn prop_header_then_noise(noise in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let mut data = b"%PDF-1.7\n".to_vec();
        data.extend_from_slice(&noise);
        let report = validate_default(&data);
        prop_assert_eq!(report.version.as_deref(), Some("1.7"));
    }

    /// Property: every truncation of a valid file yields a settled report
    #[test]
    fn prop_truncated_document(cut in 0usize..1500) {
        let pdf = sample_document();
        let cut = cut.min(pdf.len());
        let report = validate_default(&pdf[..cut]);
        prop_assert_ne!(report.well_formed, Tristate::Undetermined);
        if report.well_formed == Tristate::False {
            prop_assert_eq!(report.valid, Tristate::False);
        }
    }

    /// Property: flipping bytes inside a valid file never panics
    #[test]
    fn prop_mutated_document(edits in proptest::collection::vec((any::<usize>(), any::<u8>()), 1..8)) {
        let mut pdf = sample_document();
        let len = pdf.len();
        for (pos, byte) in edits {
            pdf[pos % len] = byte;
        }
        let report = validate_default(&pdf);
        prop_assert_ne!(report.well_formed, Tristate::Undetermined);
        if !report.is_valid() {
            prop_assert!(!report.messages.is_empty());
        }
    }

    /// Property: extreme /Length, /St and /Columns values are reported, not crashed on
    #[test]
    fn prop_extreme_numeric_operands(
        length in prop_oneof![any::<u64>(), Just(u64::MAX), Just(i64::MAX as u64)],
        start in prop_oneof![any::<i64>(), Just(i64::MAX), Just(i64::MIN)],
        columns in prop_oneof![any::<u64>(), Just(u64::MAX), Just(1u64 << 40)],
        style in prop::sample::select(vec!["/D", "/R", "/r", "/A", "/a"]),
    ) {
        let mut builder = simple_document(2);
        builder
            .object(
                1,
                &format!(
                    "<< /Type /Catalog /Pages 2 0 R /Metadata 5 0 R /PageLabels << /Nums [0 << /S {} /St {} >>] >> >>",
                    style, start
                ),
            )
            .object(3, "<< /Type /Page /Parent 2 0 R /Contents 6 0 R >>")
            .flate_stream(
                5,
                &format!("/Type /Metadata /Subtype /XML /DecodeParms << /Predictor 12 /Columns {} >>", columns),
                &[2, 0, 1, 2, 0, 1],
            )
            .object_bytes(
                6,
                format!("<< /Length {} >>\nstream\nBT ET\nendstream", length).as_bytes(),
            )
            .xref_table("/Root 1 0 R");

        let report = validate_default(&builder.build());
        prop_assert_ne!(report.well_formed, Tristate::Undetermined);
        prop_assert_ne!(report.valid, Tristate::Undetermined);
    }
}

#[test]
fn test_sample_document_is_valid() {
    let report = validate_default(&sample_document());
    assert!(report.is_well_formed(), "{}", report);
    assert!(report.is_valid(), "{}", report);
    assert_eq!(text_property(&report, "Pages/Page/Label"), Some("I"));
    assert_eq!(integer_property(&report, "Outlines/Items"), Some(1));
}

#[test]
fn test_self_referencing_resources() {
    let mut builder = PdfBuilder::new("1.4");
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 1 1] /Resources 4 0 R >>",
        )
        .object(4, "<< /XObject << /Fm1 5 0 R >> >>")
        .stream(5, "/Type /XObject /Subtype /Form /BBox [0 0 1 1] /Resources 6 0 R", b"/Fm2 Do")
        .object(6, "<< /XObject << /Fm2 5 0 R >> >>")
        .xref_table("/Root 1 0 R");

    let report = validate_default(&builder.build());
    assert!(report.is_well_formed(), "{}", report);
}

#[test]
fn test_length_pointing_past_end() {
    let mut builder = simple_document(1);
    builder
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>",
        )
        .object_bytes(4, b"<< /Length 99999 >>\nstream\nBT ET\nendstream")
        .xref_table("/Root 1 0 R");

    let report = validate_default(&builder.build());
    assert_ne!(report.well_formed, Tristate::Undetermined);
}

#[test]
#[ignore] // Run manually: PDF_CONFORM_CORPUS=dir cargo test --test robustness -- --ignored --nocapture
fn test_corpus_directory() {
    let Ok(dir) = std::env::var("PDF_CONFORM_CORPUS") else {
        eprintln!("PDF_CONFORM_CORPUS not set; skipping");
        return;
    };
    let dir = Path::new(&dir);

    let mut total = 0;
    let mut well_formed = 0;
    let mut valid = 0;
    for entry in std::fs::read_dir(dir).expect("Failed to read corpus directory") {
        let path = entry.expect("Failed to read entry").path();
        if path.extension().and_then(|s| s.to_str()) != Some("pdf") {
            continue;
        }
        total += 1;
        let report = validate_file(&path, &ValidatorConfig::default()).unwrap();
        if report.is_well_formed() {
            well_formed += 1;
        }
        if report.is_valid() {
            valid += 1;
        }
        println!(
            "{} well-formed={} valid={} profiles={:?}",
            path.display(),
            report.well_formed,
            report.valid,
            report.profiles
        );
    }

    println!("\n{} files: {} well-formed, {} valid", total, well_formed, valid);
}
