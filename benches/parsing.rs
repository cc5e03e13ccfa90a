/// Benchmarks for document loading and validation
///
/// Run with: cargo bench
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use pdf_conform::core::{PDFDocument, Parser, ValidatorConfig, validate};

/// A flat page tree with `pages` leaves, each with its own content stream.
fn generate_document(pages: u32) -> Vec<u8> {
    let mut data = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::new();
    let mut push = |data: &mut Vec<u8>, num: u32, body: &str| {
        offsets.push((num, data.len()));
        data.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", num, body).as_bytes());
    };

    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 4 + i * 2)).collect();
    push(&mut data, 1, "<< /Type /Catalog /Pages 2 0 R >>");
    push(
        &mut data,
        2,
        &format!(
            "<< /Type /Pages /Kids [{}] /Count {} /MediaBox [0 0 612 792] /Resources << /Font << /F1 3 0 R >> >> >>",
            kids.join(" "),
            pages
        ),
    );
    push(&mut data, 3, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");
    for i in 0..pages {
        let page = 4 + i * 2;
        push(
            &mut data,
            page,
            &format!("<< /Type /Page /Parent 2 0 R /Contents {} 0 R >>", page + 1),
        );
        let content = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", i + 1);
        push(
            &mut data,
            page + 1,
            &format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
        );
    }

    let size = 4 + pages * 2;
    let xref_offset = data.len();
    data.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", size).as_bytes());
    offsets.sort_unstable();
    for (_, offset) in &offsets {
        data.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    data.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            size, xref_offset
        )
        .as_bytes(),
    );
    data
}

/// Benchmark header, trailer chain and catalog loading
fn benchmark_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_opening");

    for pages in [1u32, 100, 1000] {
        let data = generate_document(pages);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(pages), &data, |b, data| {
            b.iter(|| PDFDocument::open(black_box(data.clone())));
        });
    }

    group.finish();
}

/// Benchmark the full validation pass
fn benchmark_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");
    let config = ValidatorConfig::default();

    for pages in [1u32, 100, 1000] {
        let data = generate_document(pages);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(pages), &data, |b, data| {
            b.iter(|| validate(black_box(data), &config));
        });
    }

    group.finish();
}

/// Benchmark page counting on an opened document
fn benchmark_page_tree(c: &mut Criterion) {
    let data = generate_document(1000);
    if let Ok(mut doc) = PDFDocument::open(data) {
        c.bench_function("page_count_1000", |b| {
            b.iter(|| doc.page_count());
        });
    }
}

/// Benchmark raw object parsing
fn benchmark_parser(c: &mut Criterion) {
    let object = b"<< /Type /Page /MediaBox [0 0 612 792] /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Annots [5 0 R 6 0 R] /Title (A string \\(with\\) escapes) /Hex <48656C6C6F> >>".to_vec();

    c.bench_function("parse_dictionary", |b| {
        b.iter(|| {
            Parser::from_bytes(black_box(object.clone())).and_then(|mut parser| parser.get_object())
        });
    });
}

criterion_group!(
    benches,
    benchmark_open,
    benchmark_validate,
    benchmark_page_tree,
    benchmark_parser
);
criterion_main!(benches);
