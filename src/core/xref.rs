use super::base_stream::BaseStream;
use super::decode::{DEFAULT_MAX_DECODED_BYTES, decode_stream};
use super::error::{PDFError, PDFResult};
use super::lexer::{Lexer, Token};
use super::parser::{Dict, PDFObject, PDFStream, Parser};
use super::report::{Message, Severity};
use lru::LruCache;
use rustc_hash::{FxHashMap, FxHashSet};
use std::num::NonZeroUsize;
use std::rc::Rc;

/// Cross-reference table entry.
///
/// Each entry describes where to find an indirect object in the file.
#[derive(Debug, Clone, PartialEq)]
pub enum XRefEntry {
    /// Free entry - object number is available for reuse
    Free { next_free: u64, generation: u32 },

    /// Uncompressed entry - object is stored uncompressed at given offset
    Uncompressed { offset: u64, generation: u32 },

    /// Compressed entry - object is stored in an object stream
    Compressed { obj_stream_num: u32, index: u32 },
}

impl XRefEntry {
    /// Returns true if this entry is free.
    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }

    /// Returns the generation number for this entry.
    pub fn generation(&self) -> u32 {
        match self {
            XRefEntry::Free { generation, .. } => *generation,
            XRefEntry::Uncompressed { generation, .. } => *generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }
}

/// Which of the two cross-reference mechanisms a section uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Table,
    Stream,
}

/// One cross-reference section and its trailer, as found at an offset.
#[derive(Debug, Clone)]
pub struct XRefSection {
    pub offset: usize,
    pub kind: SectionKind,
    /// Trailer dictionary, or the stream dictionary for xref streams
    pub trailer: Dict,
    pub entries: Vec<(u32, XRefEntry)>,
    /// "f" records or type-0 stream records in this section
    pub free_count: usize,
    /// Table records not in the exact 20-byte form
    pub nonstandard_records: usize,
}

impl XRefSection {
    /// Offset of the previous section, from /Prev.
    pub fn prev(&self) -> Option<usize> {
        self.trailer
            .get("Prev")
            .and_then(PDFObject::as_int)
            .filter(|prev| *prev >= 0)
            .map(|prev| prev as usize)
    }

    /// True for a classic trailer that also points at an xref stream.
    pub fn is_hybrid(&self) -> bool {
        self.kind == SectionKind::Table && self.trailer.contains_key("XRefStm")
    }
}

/// A decoded object stream holding its sub-objects in index order.
#[derive(Debug)]
pub struct ObjectStream {
    pub num: u32,
    objects: Vec<(u32, PDFObject)>,
}

impl ObjectStream {
    /// Parses the decoded data of object stream `num`.
    ///
    /// The header holds /N pairs of "objNum offset" followed, from /First on,
    /// by the object values. Returns the container and any defects found.
    pub fn parse(num: u32, dict: &Dict, decoded: &[u8]) -> PDFResult<(Self, Vec<Message>)> {
        let n = dict
            .get("N")
            .and_then(PDFObject::as_int)
            .filter(|n| *n >= 0)
            .ok_or_else(|| PDFError::XRef(format!("object stream {} lacks a valid /N", num)))?
            as usize;
        let first = dict
            .get("First")
            .and_then(PDFObject::as_int)
            .filter(|f| *f >= 0 && (*f as usize) <= decoded.len())
            .ok_or_else(|| {
                PDFError::XRef(format!("object stream {} lacks a valid /First", num))
            })? as usize;

        let mut header = Parser::from_bytes(decoded[..first].to_vec())?;
        let mut pairs = Vec::with_capacity(n.min(first / 2 + 1));
        for _ in 0..n {
            let obj_num = header.get_object()?.as_int();
            let offset = header.get_object()?.as_int();
            match (obj_num, offset) {
                (Some(obj_num), Some(offset)) if obj_num >= 0 && offset >= 0 => {
                    pairs.push((obj_num as u32, first + offset as usize));
                }
                _ => {
                    return Err(PDFError::XRef(format!(
                        "object stream {} has a malformed header",
                        num
                    )));
                }
            }
        }

        let mut messages = Vec::new();
        let mut objects = Vec::with_capacity(pairs.len());
        for (i, &(obj_num, start)) in pairs.iter().enumerate() {
            let end = pairs
                .get(i + 1)
                .map(|&(_, next)| next)
                .unwrap_or(decoded.len())
                .clamp(start.min(decoded.len()), decoded.len());
            if start > decoded.len() {
                messages.push(Message::malformed(format!(
                    "object stream {}: object {} starts beyond the decoded data",
                    num, obj_num
                )));
                objects.push((obj_num, PDFObject::Null));
                continue;
            }

            let mut parser = Parser::from_bytes(decoded[start..end].to_vec())?;
            let value = match parser.get_object() {
                Ok(PDFObject::Stream(_)) => {
                    messages.push(Message::malformed(format!(
                        "object stream {}: object {} is a stream",
                        num, obj_num
                    )));
                    PDFObject::Null
                }
                Ok(value) => value,
                Err(e) => {
                    messages.push(Message::malformed(format!(
                        "object stream {}: object {}: {}",
                        num, obj_num, e
                    )));
                    PDFObject::Null
                }
            };
            for issue in parser.take_issues() {
                let severity = if issue.malformed {
                    Severity::Malformed
                } else {
                    Severity::Invalid
                };
                messages.push(Message::new(
                    severity,
                    format!("object stream {}: {}", num, issue.message),
                ));
            }
            objects.push((obj_num, value));
        }

        Ok((ObjectStream { num, objects }, messages))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns (object number, value) at `index`.
    pub fn get(&self, index: usize) -> Option<&(u32, PDFObject)> {
        self.objects.get(index)
    }
}

/// Counters for reads performed while resolving objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XRefStats {
    /// Indirect objects parsed from the byte source
    pub object_reads: usize,
    /// Object streams decoded
    pub container_decodes: usize,
    /// Compressed objects served from the container cache
    pub container_hits: usize,
}

/// A parsed 20-byte (or leniently spaced) cross-reference table record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableRecord {
    offset: u64,
    generation: u32,
    in_use: bool,
    consumed: usize,
    canonical: bool,
}

fn parse_digits(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 19 {
        return None;
    }
    bytes.iter().try_fold(0u64, |acc, &b| {
        b.is_ascii_digit().then(|| acc * 10 + u64::from(b - b'0'))
    })
}

/// Parses one table record at the start of `window`.
///
/// The exact form is "oooooooooo ggggg n" followed by a two-byte end of line
/// (SP CR, SP LF or CR LF). Other spacing is accepted but flagged.
fn parse_table_record(window: &[u8]) -> Option<TableRecord> {
    if window.len() >= 20
        && window[10] == b' '
        && window[16] == b' '
        && matches!(window[17], b'n' | b'f')
        && matches!(&window[18..20], b" \r" | b" \n" | b"\r\n")
    {
        if let (Some(offset), Some(generation)) =
            (parse_digits(&window[..10]), parse_digits(&window[11..16]))
        {
            return Some(TableRecord {
                offset,
                generation: generation as u32,
                in_use: window[17] == b'n',
                consumed: 20,
                canonical: true,
            });
        }
    }

    let is_blank = |b: u8| b == b' ' || b == b'\t';
    let mut i = 0;
    let digits = |i: &mut usize| {
        let start = *i;
        while *i < window.len() && window[*i].is_ascii_digit() {
            *i += 1;
        }
        parse_digits(&window[start..*i])
    };

    let offset = digits(&mut i)?;
    let blanks = window[i..].iter().take_while(|b| is_blank(**b)).count();
    if blanks == 0 {
        return None;
    }
    i += blanks;
    let generation = digits(&mut i)?;
    let blanks = window[i..].iter().take_while(|b| is_blank(**b)).count();
    if blanks == 0 {
        return None;
    }
    i += blanks;
    let in_use = match window.get(i)? {
        b'n' => true,
        b'f' => false,
        _ => return None,
    };
    i += 1;
    i += window[i..].iter().take_while(|b| is_blank(**b)).count();
    match &window[i..] {
        [b'\r', b'\n', ..] => i += 2,
        [b'\r', ..] | [b'\n', ..] => i += 1,
        [] => {}
        _ => return None,
    }

    Some(TableRecord {
        offset,
        generation: u32::try_from(generation).ok()?,
        in_use,
        consumed: i,
        canonical: false,
    })
}

/// Reads a big-endian field of `bytes.len()` bytes.
fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Cross-reference resolver for a PDF document.
///
/// Maps object numbers to file locations, merging the sections of an
/// incremental-update chain first-seen-wins, and resolves references to
/// parsed objects. Compressed objects are served from a single-slot cache of
/// decoded object streams.
pub struct XRef {
    /// The whole document
    stream: Box<dyn BaseStream>,

    /// Entries by object number; sparse, so a huge /Size costs nothing
    entries: FxHashMap<u32, XRefEntry>,

    /// Declared /Size of the terminal trailer
    size: Option<usize>,

    /// Free records summed over every merged section
    free_count: usize,

    /// Stream data of encrypted documents cannot be decoded
    encrypted: bool,

    /// Ceiling for chasing compressed-in-compressed indirection
    max_container_depth: usize,

    max_decoded_bytes: usize,

    containers: LruCache<u32, Rc<ObjectStream>>,
    stats: XRefStats,
    messages: Vec<Message>,
    seen_messages: FxHashSet<(Option<usize>, String)>,
}

/// Default ceiling for chasing compressed objects through containers.
pub const DEFAULT_CONTAINER_DEPTH: usize = 10;

impl XRef {
    /// Creates an empty resolver over a document.
    pub fn new(stream: Box<dyn BaseStream>) -> Self {
        XRef {
            stream,
            entries: FxHashMap::default(),
            size: None,
            free_count: 0,
            encrypted: false,
            max_container_depth: DEFAULT_CONTAINER_DEPTH,
            max_decoded_bytes: DEFAULT_MAX_DECODED_BYTES,
            containers: LruCache::new(NonZeroUsize::MIN),
            stats: XRefStats::default(),
            messages: Vec::new(),
            seen_messages: FxHashSet::default(),
        }
    }

    pub fn with_max_container_depth(mut self, depth: usize) -> Self {
        self.max_container_depth = depth.max(1);
        self
    }

    pub fn with_max_decoded_bytes(mut self, max: usize) -> Self {
        self.max_decoded_bytes = max;
        self
    }

    pub fn set_encrypted(&mut self, encrypted: bool) {
        self.encrypted = encrypted;
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// The byte source this resolver reads from.
    pub fn stream(&self) -> &dyn BaseStream {
        self.stream.as_ref()
    }

    /// Records a message once; repeated resolutions do not duplicate it.
    fn record(&mut self, message: Message) {
        let key = (message.offset, message.text.clone());
        if self.seen_messages.insert(key) {
            log::warn!("{}", message.text);
            self.messages.push(message);
        }
    }

    /// Returns the messages recorded so far, leaving the list empty.
    pub fn take_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }

    // ========================================================================
    // Section parsing
    // ========================================================================

    /// Reads the cross-reference section at `offset`.
    ///
    /// The mechanism is chosen by the first token: the `xref` keyword starts a
    /// classic table, an object number starts a cross-reference stream.
    pub fn read_section(&mut self, offset: usize) -> PDFResult<XRefSection> {
        let end = self.stream.end();
        if offset >= end {
            return Err(PDFError::XRef(format!(
                "cross-reference offset {} beyond end of file ({} bytes)",
                offset, end
            )));
        }

        let mut lexer = Lexer::new(self.stream.make_sub_stream(offset, end - offset)?)?;
        match lexer.get_object()? {
            Token::Keyword(k) if k == "xref" => self.read_table_section(offset, lexer),
            Token::Number(_) => self.read_stream_section(offset),
            other => Err(PDFError::XRef(format!(
                "no cross-reference data at offset {} (found {:?})",
                offset, other
            ))),
        }
    }

    /// Parses a classic table; `lexer` has just consumed `xref`.
    ///
    /// Example xref table format:
    /// ```text
    /// xref
    /// 0 3
    /// 0000000000 65535 f
    /// 0000000015 00000 n
    /// 0000000079 00000 n
    /// trailer
    /// << /Size 3 /Root 1 0 R >>
    /// ```
    fn read_table_section(&mut self, offset: usize, mut lexer: Lexer) -> PDFResult<XRefSection> {
        let end = self.stream.end();
        let mut entries = Vec::new();
        let mut free_count = 0;
        let mut nonstandard_records = 0;

        loop {
            let token = lexer.get_object()?;
            let token_start = lexer.token_start();
            let first = match token {
                Token::Keyword(k) if k == "trailer" => break,
                Token::Number(first) if first >= 0.0 && first.fract() == 0.0 => first as u32,
                Token::EOF => {
                    return Err(PDFError::syntax(token_start, "cross-reference table without trailer"));
                }
                other => {
                    return Err(PDFError::syntax(
                        token_start,
                        format!("expected subsection header or 'trailer', got {:?}", other),
                    ));
                }
            };
            let count = match lexer.get_object()? {
                Token::Number(count) if count >= 0.0 && count.fract() == 0.0 => count as usize,
                other => {
                    return Err(PDFError::syntax(
                        lexer.token_start(),
                        format!("bad subsection count: {:?}", other),
                    ));
                }
            };

            // Skip the end of line closing the subsection header
            let mut pos = lexer.position();
            let head = self.stream.get_byte_range(pos, (pos + 8).min(end))?;
            pos += head.iter().take_while(|b| Lexer::is_whitespace(**b as i32)).count();

            for i in 0..count {
                let window = self.stream.get_byte_range(pos, (pos + 40).min(end))?;
                let record = parse_table_record(&window)
                    .ok_or_else(|| PDFError::syntax(pos, "malformed cross-reference record"))?;
                if !record.canonical {
                    nonstandard_records += 1;
                }
                let num = first.checked_add(i as u32).ok_or_else(|| {
                    PDFError::syntax(pos, "cross-reference object number overflow")
                })?;
                let entry = if record.in_use {
                    XRefEntry::Uncompressed {
                        offset: record.offset,
                        generation: record.generation,
                    }
                } else {
                    free_count += 1;
                    XRefEntry::Free {
                        next_free: record.offset,
                        generation: record.generation,
                    }
                };
                entries.push((num, entry));
                pos += record.consumed;
            }
            lexer.seek(pos)?;
        }

        let trailer_offset = lexer.token_start();
        let mut parser = Parser::new(lexer)?;
        let trailer = match parser.get_object()? {
            PDFObject::Dictionary(dict) => dict,
            other => {
                return Err(PDFError::syntax(
                    trailer_offset,
                    format!("trailer is a {}, not a dictionary", other.type_name()),
                ));
            }
        };
        for issue in parser.take_issues() {
            self.record(issue.into());
        }

        log::debug!(
            "xref table at {}: {} entries, {} free",
            offset,
            entries.len(),
            free_count
        );
        Ok(XRefSection {
            offset,
            kind: SectionKind::Table,
            trailer,
            entries,
            free_count,
            nonstandard_records,
        })
    }

    /// Parses a cross-reference stream object at `offset`.
    fn read_stream_section(&mut self, offset: usize) -> PDFResult<XRefSection> {
        let end = self.stream.end();
        let mut parser = Parser::new(Lexer::new(self.stream.make_sub_stream(offset, end - offset)?)?)?;
        let obj = parser.read_object_definition()?;
        for issue in parser.take_issues() {
            self.record(issue.into());
        }

        let stream = match obj.value {
            PDFObject::Stream(stream) => stream,
            other => {
                return Err(PDFError::XRef(format!(
                    "object at offset {} is a {}, not a cross-reference stream",
                    offset,
                    other.type_name()
                )));
            }
        };
        if stream.dict.get("Type").and_then(PDFObject::as_name) != Some("XRef") {
            return Err(PDFError::XRef(format!(
                "stream at offset {} is not /Type /XRef",
                offset
            )));
        }
        if stream.length_ref.is_some() {
            self.record(
                Message::invalid("cross-reference stream /Length is an indirect reference")
                    .at(offset),
            );
        }

        let decoded = self.decode_stream_data(&stream)?;

        let widths: Vec<usize> = stream
            .dict
            .get("W")
            .and_then(PDFObject::as_array)
            .map(|w| {
                w.iter()
                    .filter_map(PDFObject::as_int)
                    .filter(|n| (0..=8).contains(n))
                    .map(|n| n as usize)
                    .collect()
            })
            .unwrap_or_default();
        if widths.len() != 3 || widths.iter().sum::<usize>() == 0 {
            return Err(PDFError::XRef(format!(
                "cross-reference stream at {} has an invalid /W array",
                offset
            )));
        }
        let record_len: usize = widths.iter().sum();

        let size = stream
            .dict
            .get("Size")
            .and_then(PDFObject::as_int)
            .filter(|s| *s >= 0)
            .ok_or_else(|| {
                PDFError::XRef(format!("cross-reference stream at {} lacks /Size", offset))
            })? as u32;
        let index: Vec<(u32, usize)> = match stream.dict.get("Index").and_then(PDFObject::as_array)
        {
            Some(items) => items
                .chunks_exact(2)
                .filter_map(|pair| match (pair[0].as_int(), pair[1].as_int()) {
                    (Some(start), Some(count)) if start >= 0 && count >= 0 => {
                        Some((start as u32, count as usize))
                    }
                    _ => None,
                })
                .collect(),
            None => vec![(0, size as usize)],
        };

        let mut entries = Vec::new();
        let mut free_count = 0;
        let mut records = decoded.chunks_exact(record_len);
        'subsections: for (start, count) in index {
            for i in 0..count {
                let Some(record) = records.next() else {
                    self.record(
                        Message::malformed("cross-reference stream data is truncated").at(offset),
                    );
                    break 'subsections;
                };
                let (w0, w1) = (widths[0], widths[1]);
                let kind = if w0 == 0 { 1 } else { read_field(&record[..w0]) };
                let field2 = read_field(&record[w0..w0 + w1]);
                let field3 = read_field(&record[w0 + w1..]);
                let Some(num) = start.checked_add(i as u32) else {
                    break 'subsections;
                };

                let entry = match kind {
                    0 => {
                        free_count += 1;
                        XRefEntry::Free {
                            next_free: field2,
                            generation: field3 as u32,
                        }
                    }
                    1 => XRefEntry::Uncompressed {
                        offset: field2,
                        generation: field3 as u32,
                    },
                    2 => XRefEntry::Compressed {
                        obj_stream_num: field2 as u32,
                        index: field3 as u32,
                    },
                    // Unknown types are references to the null object
                    _ => continue,
                };
                entries.push((num, entry));
            }
        }

        log::debug!(
            "xref stream at {}: {} entries, {} free",
            offset,
            entries.len(),
            free_count
        );
        Ok(XRefSection {
            offset,
            kind: SectionKind::Stream,
            trailer: stream.dict,
            entries,
            free_count,
            nonstandard_records: 0,
        })
    }

    /// Merges a section's entries; earlier-merged sections win.
    ///
    /// The first merged section is the terminal one and fixes /Size.
    pub fn merge_section(&mut self, section: &XRefSection) {
        let size = match self.size {
            Some(size) => size,
            None => {
                let declared = section
                    .trailer
                    .get("Size")
                    .and_then(PDFObject::as_int)
                    .filter(|s| *s >= 0);
                let size = match declared {
                    Some(size) => size as usize,
                    None => {
                        self.record(
                            Message::invalid("trailer lacks a valid /Size").at(section.offset),
                        );
                        section
                            .entries
                            .iter()
                            .map(|(num, _)| *num as usize + 1)
                            .max()
                            .unwrap_or(0)
                    }
                };
                self.size = Some(size);
                size
            }
        };

        let mut outside = 0;
        for (num, entry) in &section.entries {
            let idx = *num as usize;
            if idx >= size {
                outside += 1;
                continue;
            }
            self.entries.entry(*num).or_insert_with(|| entry.clone());
        }
        if outside > 0 {
            self.record(
                Message::invalid(format!(
                    "{} cross-reference entries outside /Size {}",
                    outside, size
                ))
                .at(section.offset),
            );
        }
        self.free_count += section.free_count;
    }

    /// Gets an entry from the xref table.
    pub fn get_entry(&self, obj_num: u32) -> Option<&XRefEntry> {
        self.entries.get(&obj_num)
    }

    /// Declared number of objects (/Size of the terminal trailer).
    pub fn size(&self) -> usize {
        self.size.unwrap_or(0)
    }

    pub fn free_count(&self) -> usize {
        self.free_count
    }

    pub fn stats(&self) -> XRefStats {
        self.stats
    }

    // ========================================================================
    // Object resolution
    // ========================================================================

    /// Fetches an indirect object by reference.
    ///
    /// Object 0, free entries, missing entries and offset 0 all resolve to
    /// null. Numbers outside `[0, Size)` are an error.
    pub fn fetch(&mut self, obj_num: u32, generation: u32) -> PDFResult<PDFObject> {
        self.fetch_at_depth(obj_num, generation, 0)
    }

    fn fetch_at_depth(&mut self, obj_num: u32, generation: u32, depth: usize) -> PDFResult<PDFObject> {
        if obj_num == 0 {
            return Ok(PDFObject::Null);
        }
        let size = self.size();
        if obj_num as usize >= size {
            return Err(PDFError::ObjectOutOfRange { num: obj_num, size });
        }

        let Some(entry) = self.get_entry(obj_num).cloned() else {
            return Ok(PDFObject::Null);
        };

        if !entry.is_free() && entry.generation() != generation {
            self.record(Message::invalid(format!(
                "reference {} {} R does not match generation {} in cross-reference data",
                obj_num,
                generation,
                entry.generation()
            )));
        }

        match entry {
            XRefEntry::Free { .. } => Ok(PDFObject::Null),
            XRefEntry::Uncompressed { offset: 0, .. } => Ok(PDFObject::Null),
            XRefEntry::Uncompressed { offset, .. } => {
                self.read_uncompressed(obj_num, offset as usize, depth)
            }
            XRefEntry::Compressed {
                obj_stream_num,
                index,
            } => self.fetch_compressed(obj_num, obj_stream_num, index, depth),
        }
    }

    /// Parses "num gen obj ... endobj" at `offset`.
    fn read_uncompressed(&mut self, obj_num: u32, offset: usize, depth: usize) -> PDFResult<PDFObject> {
        let end = self.stream.end();
        if offset >= end {
            return Err(PDFError::XRef(format!(
                "offset {} of object {} is beyond end of file",
                offset, obj_num
            )));
        }

        self.stats.object_reads += 1;
        let lexer = Lexer::new(self.stream.make_sub_stream(offset, end - offset)?)?;
        let mut parser = Parser::new(lexer)?;
        let mut obj = parser.read_object_definition()?;
        for issue in parser.take_issues() {
            self.record(issue.into());
        }

        if obj.num != obj_num {
            return Err(PDFError::syntax(
                offset,
                format!("expected object {} at offset {}, found object {}", obj_num, offset, obj.num),
            ));
        }

        if let PDFObject::Stream(stream) = &mut obj.value {
            if let Some((len_num, len_gen)) = stream.length_ref {
                self.resolve_stream_length(stream, len_num, len_gen, depth)?;
            }
        }

        Ok(obj.value)
    }

    /// The one resolution pass for an indirect /Length.
    fn resolve_stream_length(
        &mut self,
        stream: &mut PDFStream,
        len_num: u32,
        len_gen: u32,
        depth: usize,
    ) -> PDFResult<()> {
        let resolved = self.fetch_at_depth(len_num, len_gen, depth + 1)?;
        match resolved.as_int() {
            Some(len) if len >= 0 => {
                let len = len as usize;
                let ends = stream
                    .offset
                    .checked_add(len)
                    .is_some_and(|stop| self.ends_at_endstream(stop));
                if len != stream.length && !ends {
                    self.record(
                        Message::malformed(format!(
                            "indirect /Length {} disagrees with the position of 'endstream'",
                            len
                        ))
                        .at(stream.offset),
                    );
                } else {
                    stream.length = len;
                }
            }
            _ => self.record(
                Message::invalid(format!(
                    "stream /Length {} {} R does not resolve to an integer",
                    len_num, len_gen
                ))
                .at(stream.offset),
            ),
        }
        Ok(())
    }

    fn ends_at_endstream(&self, pos: usize) -> bool {
        let end = self.stream.end();
        if pos > end {
            return false;
        }
        let Ok(window) = self.stream.get_byte_range(pos, (pos + 11).min(end)) else {
            return false;
        };
        let rest = window
            .strip_prefix(b"\r\n")
            .or_else(|| window.strip_prefix(b"\n"))
            .or_else(|| window.strip_prefix(b"\r"))
            .unwrap_or(&window);
        rest.starts_with(b"endstream")
    }

    fn fetch_compressed(
        &mut self,
        obj_num: u32,
        container: u32,
        index: u32,
        depth: usize,
    ) -> PDFResult<PDFObject> {
        if depth >= self.max_container_depth {
            return Err(PDFError::RecursionLimit {
                limit: self.max_container_depth,
                context: "resolving compressed objects",
            });
        }
        if self.encrypted {
            return Err(PDFError::Unsupported(
                "object streams of encrypted documents are not decoded".to_string(),
            ));
        }

        let objects = self.load_container(container, depth)?;
        let (found, value) = objects.get(index as usize).ok_or_else(|| {
            PDFError::XRef(format!(
                "index {} beyond object stream {} with {} objects",
                index,
                container,
                objects.len()
            ))
        })?;
        if *found != obj_num {
            self.record(Message::invalid(format!(
                "object stream {} holds object {} at index {}, expected {}",
                container, found, index, obj_num
            )));
        }
        Ok(value.clone())
    }

    /// Returns the decoded object stream `container`, decoding it on a miss.
    fn load_container(&mut self, container: u32, depth: usize) -> PDFResult<Rc<ObjectStream>> {
        if let Some(cached) = self.containers.get(&container) {
            self.stats.container_hits += 1;
            return Ok(Rc::clone(cached));
        }

        log::debug!("loading object stream {}", container);
        let holder = self.fetch_at_depth(container, 0, depth + 1)?;
        let stream = match holder {
            PDFObject::Stream(stream) => stream,
            other => {
                return Err(PDFError::XRef(format!(
                    "object {} is a {}, not an object stream",
                    container,
                    other.type_name()
                )));
            }
        };
        if stream.dict.get("Type").and_then(PDFObject::as_name) != Some("ObjStm") {
            self.record(Message::invalid(format!(
                "object stream {} is not /Type /ObjStm",
                container
            )));
        }

        let decoded = self.decode_stream_data(&stream)?;
        self.stats.container_decodes += 1;
        let (objects, messages) = ObjectStream::parse(container, &stream.dict, &decoded)?;
        for message in messages {
            self.record(message);
        }

        let objects = Rc::new(objects);
        self.containers.put(container, Rc::clone(&objects));
        Ok(objects)
    }

    /// Fetches an object if it's a reference, otherwise returns the object as-is.
    pub fn fetch_if_ref(&mut self, obj: &PDFObject) -> PDFResult<PDFObject> {
        self.fetch_with_num(obj).map(|(value, _)| value)
    }

    /// Like [`XRef::fetch_if_ref`], also returning the object number the value
    /// came from. Direct values have none.
    pub fn fetch_with_num(&mut self, obj: &PDFObject) -> PDFResult<(PDFObject, Option<u32>)> {
        match obj {
            PDFObject::Ref { num, generation } => Ok((self.fetch(*num, *generation)?, Some(*num))),
            _ => Ok((obj.clone(), None)),
        }
    }

    /// Resolves `obj` and returns it as a dictionary, if it is one.
    pub fn fetch_dict(&mut self, obj: &PDFObject) -> PDFResult<Option<Dict>> {
        Ok(match self.fetch_if_ref(obj)? {
            PDFObject::Dictionary(dict) => Some(dict),
            PDFObject::Stream(stream) => Some(stream.dict),
            _ => None,
        })
    }

    /// Raw, undecoded bytes of a stream.
    pub fn read_stream_bytes(&self, stream: &PDFStream) -> PDFResult<Vec<u8>> {
        let end = stream.offset.saturating_add(stream.length).min(self.stream.end());
        self.stream.get_byte_range(stream.offset.min(end), end)
    }

    /// Decoded bytes of a stream.
    ///
    /// Output past the decode ceiling is recorded as a malformed stream.
    pub fn decode_stream_data(&mut self, stream: &PDFStream) -> PDFResult<Vec<u8>> {
        if self.encrypted {
            return Err(PDFError::Unsupported(
                "stream data of encrypted documents is not decoded".to_string(),
            ));
        }
        let raw = self.read_stream_bytes(stream)?;
        let result = decode_stream(&raw, &stream.filters, &stream.dict, self.max_decoded_bytes);
        if let Err(err @ PDFError::DecodeLimit { .. }) = &result {
            self.record(Message::malformed(format!("stream data: {}", err)).at(stream.offset));
        }
        result
    }
}
