//! Test utilities and helpers for pdf-conform tests
//!
//! PDFs are assembled in memory with [`PdfBuilder`] so every fixture states
//! exactly which objects and cross-reference sections it contains.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::ZlibEncoder;
use pdf_conform::{ValidationReport, ValidatorConfig, validate};
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Debug, Clone, Copy)]
enum Entry {
    InUse { offset: usize, generation: u16 },
    Free { generation: u16 },
    Compressed { container: u32, index: u32 },
}

/// Builds PDF files one object and one cross-reference section at a time.
///
/// Every section covers the entries added since the previous one; later
/// sections point back with /Prev, so calling `xref_table` twice produces an
/// incremental update.
pub struct PdfBuilder {
    data: Vec<u8>,
    pending: BTreeMap<u32, Entry>,
    offsets: BTreeMap<u32, usize>,
    last_section: Option<usize>,
    size: u32,
}

pub fn flate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

impl PdfBuilder {
    /// Header plus the binary comment line.
    pub fn new(version: &str) -> Self {
        let mut data = format!("%PDF-{}\n", version).into_bytes();
        data.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self::from_prefix(data)
    }

    /// Starts from arbitrary leading bytes (no header added).
    pub fn from_prefix(data: Vec<u8>) -> Self {
        PdfBuilder {
            data,
            pending: BTreeMap::new(),
            offsets: BTreeMap::new(),
            last_section: None,
            size: 1,
        }
    }

    fn track(&mut self, num: u32, entry: Entry) {
        self.pending.insert(num, entry);
        self.size = self.size.max(num + 1);
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn object(&mut self, num: u32, body: &str) -> &mut Self {
        self.object_bytes(num, body.as_bytes())
    }

    pub fn object_bytes(&mut self, num: u32, body: &[u8]) -> &mut Self {
        let offset = self.data.len();
        self.data.extend_from_slice(format!("{} 0 obj\n", num).as_bytes());
        self.data.extend_from_slice(body);
        self.data.extend_from_slice(b"\nendobj\n");
        self.offsets.insert(num, offset);
        self.track(num, Entry::InUse { offset, generation: 0 });
        self
    }

    /// A stream object; `dict` holds the entries besides /Length.
    pub fn stream(&mut self, num: u32, dict: &str, data: &[u8]) -> &mut Self {
        let mut body = format!("<< {} /Length {} >>\nstream\n", dict, data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.object_bytes(num, &body)
    }

    pub fn flate_stream(&mut self, num: u32, dict: &str, data: &[u8]) -> &mut Self {
        let compressed = flate(data);
        self.stream(num, &format!("{} /Filter /FlateDecode", dict), &compressed)
    }

    /// A compressed object stream holding `objects`, in order.
    pub fn object_stream(&mut self, num: u32, objects: &[(u32, &str)]) -> &mut Self {
        let mut offsets = String::new();
        let mut bodies = String::new();
        for (num, body) in objects {
            offsets.push_str(&format!("{} {} ", num, bodies.len()));
            bodies.push_str(body);
            bodies.push('\n');
        }
        let first = offsets.len();
        let content = format!("{}{}", offsets, bodies);
        self.flate_stream(
            num,
            &format!("/Type /ObjStm /N {} /First {}", objects.len(), first),
            content.as_bytes(),
        );
        for (index, (obj, _)) in objects.iter().enumerate() {
            self.track(
                *obj,
                Entry::Compressed {
                    container: num,
                    index: index as u32,
                },
            );
        }
        self
    }

    pub fn free(&mut self, num: u32, generation: u16) -> &mut Self {
        self.track(num, Entry::Free { generation });
        self
    }

    /// Byte offset of the most recent definition of `num`.
    pub fn offset_of(&self, num: u32) -> usize {
        self.offsets[&num]
    }

    fn take_entries(&mut self) -> BTreeMap<u32, Entry> {
        let mut entries = std::mem::take(&mut self.pending);
        if self.last_section.is_none() {
            entries.entry(0).or_insert(Entry::Free { generation: 65535 });
        }
        entries
    }

    /// Consecutive runs of object numbers as (first, entries) pairs.
    fn runs(entries: &BTreeMap<u32, Entry>) -> Vec<(u32, Vec<Entry>)> {
        let mut runs: Vec<(u32, Vec<Entry>)> = Vec::new();
        for (num, entry) in entries {
            match runs.last_mut() {
                Some((first, items)) if *first + items.len() as u32 == *num => items.push(*entry),
                _ => runs.push((*num, vec![*entry])),
            }
        }
        runs
    }

    fn prev_entry(&self) -> String {
        self.last_section
            .map(|offset| format!("/Prev {}", offset))
            .unwrap_or_default()
    }

    fn finish_section(&mut self, offset: usize) {
        self.data
            .extend_from_slice(format!("startxref\n{}\n%%EOF\n", offset).as_bytes());
        self.last_section = Some(offset);
    }

    /// Classic table plus trailer; `trailer` holds entries besides /Size and /Prev.
    pub fn xref_table(&mut self, trailer: &str) -> &mut Self {
        let entries = self.take_entries();
        let offset = self.data.len();
        let mut table = String::from("xref\n");
        for (first, items) in Self::runs(&entries) {
            table.push_str(&format!("{} {}\n", first, items.len()));
            for entry in items {
                let record = match entry {
                    Entry::InUse { offset, generation } => {
                        format!("{:010} {:05} n \n", offset, generation)
                    }
                    Entry::Free { generation } => format!("{:010} {:05} f \n", 0, generation),
                    Entry::Compressed { .. } => {
                        panic!("compressed objects need a cross-reference stream")
                    }
                };
                table.push_str(&record);
            }
        }
        table.push_str(&format!(
            "trailer\n<< /Size {} {} {} >>\n",
            self.size,
            self.prev_entry(),
            trailer
        ));
        self.data.extend_from_slice(table.as_bytes());
        self.finish_section(offset);
        self
    }

    /// Cross-reference stream stored as object `num`.
    pub fn xref_stream(&mut self, num: u32, trailer: &str) -> &mut Self {
        let offset = self.data.len();
        self.track(num, Entry::InUse { offset, generation: 0 });
        let entries = self.take_entries();

        let mut records = Vec::new();
        let mut index = String::new();
        for (first, items) in Self::runs(&entries) {
            index.push_str(&format!("{} {} ", first, items.len()));
            for entry in items {
                let (kind, field2, field3) = match entry {
                    Entry::Free { generation } => (0u8, 0u32, generation),
                    Entry::InUse { offset, generation } => (1, offset as u32, generation),
                    Entry::Compressed { container, index } => (2, container, index as u16),
                };
                records.push(kind);
                records.extend_from_slice(&field2.to_be_bytes());
                records.extend_from_slice(&field3.to_be_bytes());
            }
        }

        let compressed = flate(&records);
        let mut body = format!(
            "<< /Type /XRef /Size {} /W [1 4 2] /Index [{}] /Filter /FlateDecode /Length {} {} {} >>\nstream\n",
            self.size,
            index.trim_end(),
            compressed.len(),
            self.prev_entry(),
            trailer
        )
        .into_bytes();
        body.extend_from_slice(&compressed);
        body.extend_from_slice(b"\nendstream");

        self.data.extend_from_slice(format!("{} 0 obj\n", num).as_bytes());
        self.data.extend_from_slice(&body);
        self.data.extend_from_slice(b"\nendobj\n");
        self.offsets.insert(num, offset);
        self.finish_section(offset);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.data.clone()
    }
}

/// Catalog (1), page tree root (2) and `pages` leaf pages (3..).
pub fn simple_document(pages: u32) -> PdfBuilder {
    let mut builder = PdfBuilder::new("1.4");
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", i + 3)).collect();
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(
            2,
            &format!(
                "<< /Type /Pages /Kids [{}] /Count {} /MediaBox [0 0 612 792] >>",
                kids.join(" "),
                pages
            ),
        );
    for i in 0..pages {
        builder.object(i + 3, "<< /Type /Page /Parent 2 0 R >>");
    }
    builder
}

pub fn validate_default(bytes: &[u8]) -> ValidationReport {
    validate(bytes, &ValidatorConfig::default())
}

pub fn integer_property(report: &ValidationReport, path: &str) -> Option<i64> {
    report.property(path).and_then(|p| p.as_integer())
}

pub fn text_property<'a>(report: &'a ValidationReport, path: &str) -> Option<&'a str> {
    report.property(path).and_then(|p| p.as_text())
}

pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Replaces the first occurrence of `from`; panics when there is none.
pub fn replace_bytes(data: &[u8], from: &[u8], to: &[u8]) -> Vec<u8> {
    let pos = find_bytes(data, from).unwrap_or_else(|| {
        panic!("{:?} not found", String::from_utf8_lossy(from))
    });
    let mut out = data[..pos].to_vec();
    out.extend_from_slice(to);
    out.extend_from_slice(&data[pos + from.len()..]);
    out
}
