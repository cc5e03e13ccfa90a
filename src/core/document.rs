use super::base_stream::BaseStream;
use super::config::ValidatorConfig;
use super::error::{PDFError, PDFResult};
use super::lexer::Lexer;
use super::parser::{Dict, PDFObject, Parser};
use super::report::Message;
use super::stream::Stream;
use super::trailer::{Trailer, TrailerChain, walk_trailer_chain};
use super::xref::XRef;

/// How far into the file the header is searched for.
pub const HEADER_SCAN_WINDOW: usize = 1024;

const KNOWN_VERSIONS: &[&str] = &["1.0", "1.1", "1.2", "1.3", "1.4", "1.5", "1.6", "1.7", "2.0"];

/// The `%PDF-n.m` header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: String,
    /// Offset of the `%` that starts the header
    pub offset: usize,
    /// Header written as `%!PS-Adobe-N.n PDF-1.M`
    pub postscript_alias: bool,
    /// The next line is a comment with at least four bytes >= 0x80
    pub binary_comment: bool,
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn line_end(window: &[u8], from: usize) -> usize {
    window[from..]
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .map_or(window.len(), |p| from + p)
}

fn read_version(bytes: &[u8]) -> Option<String> {
    let len = bytes
        .iter()
        .take_while(|b| b.is_ascii_digit() || **b == b'.')
        .count();
    let version = &bytes[..len];
    if !version.iter().any(u8::is_ascii_digit) {
        return None;
    }
    Some(String::from_utf8_lossy(version).into_owned())
}

fn has_binary_comment(window: &[u8], header_pos: usize) -> bool {
    let mut i = line_end(window, header_pos);
    while i < window.len() && matches!(window[i], b'\r' | b'\n') {
        i += 1;
    }
    if window.get(i) != Some(&b'%') {
        return false;
    }
    let end = line_end(window, i);
    window[i + 1..end].iter().filter(|&&b| b >= 0x80).count() >= 4
}

/// Finds the header in the leading bytes of a file.
pub fn parse_header(window: &[u8]) -> Option<Header> {
    if let Some(pos) = find(window, b"%PDF-") {
        return Some(Header {
            version: read_version(&window[pos + 5..])?,
            offset: pos,
            postscript_alias: false,
            binary_comment: has_binary_comment(window, pos),
        });
    }

    let pos = find(window, b"%!PS-Adobe-")?;
    let line = &window[pos..line_end(window, pos)];
    let pdf = find(line, b" PDF-")?;
    Some(Header {
        version: read_version(&line[pdf + 5..])?,
        offset: pos,
        postscript_alias: true,
        binary_comment: has_binary_comment(window, pos),
    })
}

impl Header {
    /// Reads the header from the first [`HEADER_SCAN_WINDOW`] bytes.
    pub fn read(stream: &dyn BaseStream) -> PDFResult<Self> {
        let start = stream.start();
        let end = stream.end().min(start + HEADER_SCAN_WINDOW);
        let window = stream.get_byte_range(start, end)?;
        parse_header(&window).map(|mut header| {
            header.offset += start;
            header
        }).ok_or_else(|| {
            PDFError::syntax(
                start,
                format!("no PDF header within the first {} bytes", HEADER_SCAN_WINDOW),
            )
        })
    }

    pub fn is_known_version(&self) -> bool {
        KNOWN_VERSIONS.contains(&self.version.as_str())
    }

    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        if !self.is_known_version() {
            messages.push(
                Message::invalid(format!("unknown PDF version {} in header", self.version))
                    .at(self.offset),
            );
        }
        if self.postscript_alias {
            messages.push(Message::info("header uses the %!PS-Adobe alias form").at(self.offset));
        }
        if self.offset != 0 {
            messages.push(
                Message::info(format!("header found at offset {}, not at start of file", self.offset))
                    .at(self.offset),
            );
        }
        messages
    }
}

/// The linearization parameter dictionary, when the file has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linearization {
    pub object_num: u32,
    /// Declared file length (/L)
    pub declared_length: Option<usize>,
    pub file_length: usize,
}

impl Linearization {
    /// Reads the first object after the header and keeps it if it carries /Linearized.
    fn detect(stream: &dyn BaseStream, header: &Header) -> Option<Self> {
        let end = stream.end();
        let sub = stream.make_sub_stream(header.offset, end.checked_sub(header.offset)?).ok()?;
        let mut parser = Parser::new(Lexer::new(sub).ok()?).ok()?;
        let first = parser.read_object_definition().ok()?;
        let dict = first.value.as_dict()?;
        dict.get("Linearized")?;

        Some(Linearization {
            object_num: first.num,
            declared_length: dict
                .get("L")
                .and_then(PDFObject::as_int)
                .and_then(|l| usize::try_from(l).ok()),
            file_length: stream.length(),
        })
    }

    pub fn length_matches(&self) -> bool {
        self.declared_length == Some(self.file_length)
    }
}

/// PDF Document reader.
///
/// Entry point for reading a document's structure: the header, the trailer
/// chain with its merged cross-reference data, and the catalog. Everything
/// below the catalog is resolved lazily through [`PDFDocument::xref_mut`].
pub struct PDFDocument {
    xref: XRef,
    header: Header,
    chain: TrailerChain,
    catalog: Dict,
    catalog_num: Option<u32>,
    linearization: Option<Linearization>,
    messages: Vec<Message>,
}

impl PDFDocument {
    /// Opens a PDF document from a byte array.
    ///
    /// # Example
    /// ```no_run
    /// use pdf_conform::PDFDocument;
    ///
    /// let pdf_data = std::fs::read("document.pdf").unwrap();
    /// let mut doc = PDFDocument::open(pdf_data).unwrap();
    /// println!("{} pages", doc.page_count().unwrap());
    /// ```
    pub fn open(data: Vec<u8>) -> PDFResult<Self> {
        Self::open_with_config(data, &ValidatorConfig::default())
    }

    /// Like [`PDFDocument::open`], with the object-stream depth and decode
    /// limits of `config`.
    pub fn open_with_config(data: Vec<u8>, config: &ValidatorConfig) -> PDFResult<Self> {
        let stream = Stream::from_bytes(data);
        let header = Header::read(&stream)?;
        Self::load(Box::new(stream), header, config)
    }

    /// Builds the document from an already-read header.
    pub fn load(
        stream: Box<dyn BaseStream>,
        header: Header,
        config: &ValidatorConfig,
    ) -> PDFResult<Self> {
        let linearization = Linearization::detect(stream.as_ref(), &header);
        let mut xref = XRef::new(stream)
            .with_max_container_depth(config.max_object_stream_depth)
            .with_max_decoded_bytes(config.max_decoded_bytes);

        let chain = walk_trailer_chain(&mut xref)?;
        let mut messages = header.messages();
        messages.extend(chain.messages.iter().cloned());
        if chain.trailer.is_encrypted() {
            xref.set_encrypted(true);
            messages.push(Message::info(
                "document is encrypted; stream contents are not inspected",
            ));
        }

        let root = chain
            .trailer
            .root
            .clone()
            .ok_or_else(|| PDFError::XRef("trailer has no /Root entry".to_string()))?;
        let (catalog, catalog_num) = xref.fetch_with_num(&root)?;
        let catalog = match catalog {
            PDFObject::Dictionary(dict) => dict,
            other => {
                return Err(PDFError::XRef(format!(
                    "document catalog is a {}, not a dictionary",
                    other.type_name()
                )));
            }
        };
        if catalog.get("Type").and_then(PDFObject::as_name) != Some("Catalog") {
            messages.push(Message::invalid("document catalog is not /Type /Catalog"));
        }
        log::debug!(
            "opened document: version {}, {} section(s), catalog {:?}",
            header.version,
            chain.sections.len(),
            catalog_num
        );

        Ok(PDFDocument {
            xref,
            header,
            chain,
            catalog,
            catalog_num,
            linearization,
            messages,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn chain(&self) -> &TrailerChain {
        &self.chain
    }

    /// Entries of the terminal trailer.
    pub fn trailer(&self) -> &Trailer {
        &self.chain.trailer
    }

    /// Returns the document catalog (root dictionary).
    pub fn catalog(&self) -> &Dict {
        &self.catalog
    }

    pub fn catalog_num(&self) -> Option<u32> {
        self.catalog_num
    }

    pub fn linearization(&self) -> Option<&Linearization> {
        self.linearization.as_ref()
    }

    /// Returns a mutable reference to the xref table for fetching objects.
    pub fn xref_mut(&mut self) -> &mut XRef {
        &mut self.xref
    }

    /// Returns an immutable reference to the xref table.
    pub fn xref(&self) -> &XRef {
        &self.xref
    }

    pub fn is_encrypted(&self) -> bool {
        self.chain.trailer.is_encrypted()
    }

    /// Effective version: the catalog's /Version when it is later than the header's.
    pub fn version(&self) -> String {
        let header = self.header.version.as_str();
        match self.catalog.get("Version").and_then(PDFObject::as_name) {
            Some(catalog) if version_number(catalog) > version_number(header) => catalog.to_string(),
            _ => header.to_string(),
        }
    }

    /// Resolves a catalog entry.
    pub fn catalog_entry(&mut self, key: &str) -> PDFResult<Option<PDFObject>> {
        match self.catalog.get(key) {
            Some(value) => {
                let value = value.clone();
                Ok(Some(self.xref.fetch_if_ref(&value)?).filter(|v| !v.is_null()))
            }
            None => Ok(None),
        }
    }

    /// Gets the /Pages dictionary from the catalog.
    pub fn pages_dict(&mut self) -> PDFResult<PDFObject> {
        self.catalog_entry("Pages")?
            .ok_or_else(|| PDFError::XRef("No /Pages in catalog".to_string()))
    }

    /// Gets the page count from the /Pages dictionary.
    pub fn page_count(&mut self) -> PDFResult<u32> {
        let pages = self.pages_dict()?;
        let count = pages
            .get("Count")
            .ok_or_else(|| PDFError::Generic("No /Count in /Pages".to_string()))?;
        count
            .as_int()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| PDFError::Generic("/Count is not a non-negative integer".to_string()))
    }

    /// The document information dictionary, if the trailer names one.
    pub fn info_dict(&mut self) -> PDFResult<Option<Dict>> {
        match self.chain.trailer.info.clone() {
            Some(info) => self.xref.fetch_dict(&info),
            None => Ok(None),
        }
    }

    /// The encryption dictionary, if the trailer names one.
    pub fn encrypt_dict(&mut self) -> PDFResult<Option<Dict>> {
        match self.chain.trailer.encrypt.clone() {
            Some(encrypt) => self.xref.fetch_dict(&encrypt),
            None => Ok(None),
        }
    }

    /// Messages from opening the document and from every resolution since.
    pub fn take_messages(&mut self) -> Vec<Message> {
        let mut messages = std::mem::take(&mut self.messages);
        messages.extend(self.xref.take_messages());
        messages
    }
}

fn version_number(version: &str) -> f64 {
    version.parse().unwrap_or(0.0)
}
