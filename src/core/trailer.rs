//! Locating the terminal trailer and walking its Prev chain.

use super::base_stream::BaseStream;
use super::error::{PDFError, PDFResult};
use super::lexer::{Lexer, Token};
use super::parser::{Dict, PDFObject};
use super::report::Message;
use super::xref::{SectionKind, XRef};
use rustc_hash::FxHashSet;

/// How far back from end of file the `%%EOF` marker is searched for.
pub const EOF_SCAN_WINDOW: usize = 1024;

/// How far back from the `%%EOF` marker `startxref` is searched for.
pub const STARTXREF_SCAN_WINDOW: usize = 128;

/// Position of the last `%%EOF` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EofMarker {
    pub offset: usize,
    /// Bytes other than a single end of line follow the marker
    pub trailing_data: bool,
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

/// Scans the last [`EOF_SCAN_WINDOW`] bytes backward for `%%EOF`.
pub fn find_eof_marker(stream: &dyn BaseStream) -> Option<EofMarker> {
    let end = stream.end();
    let start = end.saturating_sub(EOF_SCAN_WINDOW).max(stream.start());
    let window = stream.get_byte_range(start, end).ok()?;
    let pos = rfind(&window, b"%%EOF")?;

    let after = &window[pos + 5..];
    let trailing_data = !matches!(after, b"" | b"\n" | b"\r" | b"\r\n");
    Some(EofMarker {
        offset: start + pos,
        trailing_data,
    })
}

/// Finds the last `startxref` before `eof_offset` and reads its offset.
pub fn find_startxref(stream: &dyn BaseStream, eof_offset: usize) -> PDFResult<usize> {
    let start = eof_offset.saturating_sub(STARTXREF_SCAN_WINDOW).max(stream.start());
    let window = stream.get_byte_range(start, eof_offset)?;
    let keyword = rfind(&window, b"startxref")
        .map(|pos| start + pos)
        .ok_or_else(|| PDFError::XRef("'startxref' not found before %%EOF".to_string()))?;

    let value_start = keyword + b"startxref".len();
    let mut lexer = Lexer::new(stream.make_sub_stream(value_start, eof_offset - value_start)?)?;
    match lexer.get_object()? {
        Token::Number(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as usize),
        other => Err(PDFError::syntax(
            lexer.token_start(),
            format!("'startxref' not followed by an offset ({:?})", other),
        )),
    }
}

/// Document-level entries of the terminal trailer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trailer {
    pub root: Option<PDFObject>,
    pub info: Option<PDFObject>,
    pub encrypt: Option<PDFObject>,
    pub id: Option<(Vec<u8>, Vec<u8>)>,
    pub size: Option<usize>,
    pub prev: Option<usize>,
}

impl Trailer {
    pub fn from_dict(dict: &Dict) -> Self {
        let id = dict.get("ID").and_then(PDFObject::as_array).and_then(|ids| {
            match (
                ids.first().and_then(PDFObject::as_string_bytes),
                ids.get(1).and_then(PDFObject::as_string_bytes),
            ) {
                (Some(a), Some(b)) if ids.len() == 2 => Some((a.to_vec(), b.to_vec())),
                _ => None,
            }
        });

        Trailer {
            root: dict.get("Root").cloned(),
            info: dict.get("Info").cloned(),
            encrypt: dict.get("Encrypt").cloned(),
            id,
            size: dict
                .get("Size")
                .and_then(PDFObject::as_int)
                .filter(|s| *s >= 0)
                .map(|s| s as usize),
            prev: dict
                .get("Prev")
                .and_then(PDFObject::as_int)
                .filter(|p| *p >= 0)
                .map(|p| p as usize),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypt.is_some()
    }
}

/// What one section of the chain contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSummary {
    pub offset: usize,
    pub kind: SectionKind,
    pub entries: usize,
    pub free_count: usize,
    pub nonstandard_records: usize,
}

/// Result of walking the trailer chain from end of file.
#[derive(Debug, Clone)]
pub struct TrailerChain {
    pub eof: EofMarker,
    pub startxref: usize,
    /// Terminal trailer; the only source of Root, Info, Encrypt and ID
    pub trailer: Trailer,
    /// Sections in walk order, terminal first
    pub sections: Vec<SectionSummary>,
    pub messages: Vec<Message>,
}

impl TrailerChain {
    pub fn incremental_updates(&self) -> usize {
        self.sections.len().saturating_sub(1)
    }

    pub fn uses_xref_streams(&self) -> bool {
        self.sections.iter().any(|s| s.kind == SectionKind::Stream)
    }

    pub fn nonstandard_records(&self) -> usize {
        self.sections.iter().map(|s| s.nonstandard_records).sum()
    }
}

/// Walks the trailer chain, merging every section into `xref`.
///
/// A repeated Prev offset is reported as an error rather than followed.
pub fn walk_trailer_chain(xref: &mut XRef) -> PDFResult<TrailerChain> {
    let eof = find_eof_marker(xref.stream()).ok_or_else(|| {
        PDFError::XRef(format!(
            "%%EOF marker not found in the last {} bytes",
            EOF_SCAN_WINDOW
        ))
    })?;
    let startxref = find_startxref(xref.stream(), eof.offset)?;
    log::debug!("startxref {} (%%EOF at {})", startxref, eof.offset);

    let mut visited = FxHashSet::default();
    let mut sections = Vec::new();
    let mut messages = Vec::new();
    let mut terminal: Option<Trailer> = None;
    let mut next = Some(startxref);

    while let Some(offset) = next {
        if !visited.insert(offset) {
            return Err(PDFError::XRef(format!(
                "trailer chain revisits offset {}",
                offset
            )));
        }

        let section = xref.read_section(offset)?;
        if section.is_hybrid() {
            messages.push(
                Message::info(
                    "hybrid-reference file: the /XRefStm cross-reference stream is not merged (unsupported)",
                )
                .at(offset),
            );
        }
        xref.merge_section(&section);

        if terminal.is_none() {
            terminal = Some(Trailer::from_dict(&section.trailer));
        }
        next = section.prev();
        log::debug!("section at {} -> prev {:?}", offset, next);

        sections.push(SectionSummary {
            offset,
            kind: section.kind,
            entries: section.entries.len(),
            free_count: section.free_count,
            nonstandard_records: section.nonstandard_records,
        });
    }

    Ok(TrailerChain {
        eof,
        startxref,
        trailer: terminal.unwrap_or_default(),
        sections,
        messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Stream;

    fn stream_of(data: &[u8]) -> Stream {
        Stream::from_bytes(data.to_vec())
    }

    #[test]
    fn test_find_eof_marker() {
        let stream = stream_of(b"junk %%EOF\n");
        assert_eq!(
            find_eof_marker(&stream),
            Some(EofMarker {
                offset: 5,
                trailing_data: false
            })
        );

        let stream = stream_of(b"%%EOF\n%%EOF  garbage");
        let marker = find_eof_marker(&stream).unwrap();
        assert_eq!(marker.offset, 6);
        assert!(marker.trailing_data);

        assert_eq!(find_eof_marker(&stream_of(b"no marker")), None);
    }

    #[test]
    fn test_eof_marker_outside_window_is_missed() {
        let mut data = b"%%EOF\n".to_vec();
        data.extend(std::iter::repeat(b' ').take(EOF_SCAN_WINDOW));
        assert_eq!(find_eof_marker(&stream_of(&data)), None);
    }

    #[test]
    fn test_find_startxref() {
        let data = b"trailer\n<< >>\nstartxref\n1234\n%%EOF\n";
        let stream = stream_of(data);
        let eof = find_eof_marker(&stream).unwrap();
        assert_eq!(find_startxref(&stream, eof.offset).unwrap(), 1234);
    }

    #[test]
    fn test_startxref_missing_or_bad() {
        let stream = stream_of(b"trailer << >>\n%%EOF");
        assert!(matches!(find_startxref(&stream, 14), Err(PDFError::XRef(_))));

        let stream = stream_of(b"startxref\nnope\n%%EOF");
        assert!(matches!(
            find_startxref(&stream, 15),
            Err(PDFError::Syntax { .. })
        ));
    }

    #[test]
    fn test_trailer_from_dict() {
        let mut dict = Dict::default();
        dict.insert("Root".to_string(), PDFObject::Ref { num: 1, generation: 0 });
        dict.insert("Size".to_string(), PDFObject::Number(7.0));
        dict.insert("Prev".to_string(), PDFObject::Number(116.0));
        dict.insert(
            "ID".to_string(),
            PDFObject::Array(vec![
                PDFObject::HexString(vec![1, 2]),
                PDFObject::HexString(vec![3, 4]),
            ]),
        );

        let trailer = Trailer::from_dict(&dict);
        assert_eq!(trailer.root, Some(PDFObject::Ref { num: 1, generation: 0 }));
        assert_eq!(trailer.size, Some(7));
        assert_eq!(trailer.prev, Some(116));
        assert_eq!(trailer.id, Some((vec![1, 2], vec![3, 4])));
        assert!(!trailer.is_encrypted());
    }

    #[test]
    fn test_walk_detects_prev_loop() {
        let mut data = b"%PDF-1.4\n".to_vec();
        let table = data.len();
        data.extend_from_slice(
            format!(
                "xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev {} >>\nstartxref\n{}\n%%EOF\n",
                table, table
            )
            .as_bytes(),
        );
        let mut xref = XRef::new(Box::new(stream_of(&data)));

        let err = walk_trailer_chain(&mut xref).unwrap_err();
        assert!(err.to_string().contains("revisits"));
    }
}
