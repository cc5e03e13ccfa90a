use super::base_stream::BaseStream;
use super::error::{PDFError, PDFResult};
use super::lexer::{Lexer, Token};
use super::stream::Stream;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Dictionary payload shared by dictionaries and stream dictionaries.
pub type Dict = FxHashMap<String, PDFObject>;

/// Filter chain of a stream, in application order.
pub type FilterChain = SmallVec<[String; 2]>;

/// PDF object types (ISO 32000-1, 7.3).
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    /// Null value
    Null,

    /// Boolean value
    Boolean(bool),

    /// Numeric value (integers and reals)
    Number(f64),

    /// String value (from literal strings like (hello))
    String(Vec<u8>),

    /// Hex string value (from hex strings like <48656c6c6f>)
    HexString(Vec<u8>),

    /// Name value (from /Name)
    Name(String),

    /// Array of objects
    Array(Vec<PDFObject>),

    /// Dictionary (key-value pairs)
    Dictionary(Dict),

    /// Stream object (dictionary + lazily read byte range)
    Stream(PDFStream),

    /// Indirect object reference (like "5 0 R")
    Ref { num: u32, generation: u32 },

    /// End of file marker
    EOF,

    /// Bare keyword that is not part of an object (obj, endobj, xref, ...)
    Keyword(String),
}

/// A stream whose raw bytes have not been read yet.
///
/// `offset` and `length` locate the undecoded data in the byte source the
/// stream was parsed from. When /Length was an indirect reference the parser
/// records it in `length_ref` and measures the extent by scanning for
/// `endstream`; the resolver then replaces `length` with the resolved value.
#[derive(Debug, Clone, PartialEq)]
pub struct PDFStream {
    pub dict: Dict,
    pub offset: usize,
    pub length: usize,
    pub length_ref: Option<(u32, u32)>,
    pub filters: FilterChain,
}

/// An object read from "num gen obj ... endobj".
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    pub num: u32,
    pub generation: u32,
    pub value: PDFObject,
    pub offset: usize,
}

/// A recoverable defect noticed while parsing.
///
/// `malformed` issues break well-formedness; the rest only break validity.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseIssue {
    pub offset: usize,
    pub message: String,
    pub malformed: bool,
}

impl PDFObject {
    /// Returns true if this object is the EOF marker.
    pub fn is_eof(&self) -> bool {
        matches!(self, PDFObject::EOF)
    }

    /// Returns true if this object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, PDFObject::Null)
    }

    /// Returns true if this object is the given keyword.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, PDFObject::Keyword(k) if k == keyword)
    }

    /// Dictionary view of dictionaries and stream dictionaries.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            PDFObject::Dictionary(dict) => Some(dict),
            PDFObject::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PDFStream> {
        match self {
            PDFObject::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PDFObject]> {
        match self {
            PDFObject::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PDFObject::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PDFObject::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value if it is an integral number.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PDFObject::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PDFObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Raw bytes of literal and hex strings.
    pub fn as_string_bytes(&self) -> Option<&[u8]> {
        match self {
            PDFObject::String(s) | PDFObject::HexString(s) => Some(s),
            _ => None,
        }
    }

    /// Decoded text of a string object (PDFDocEncoding or UTF-16BE).
    pub fn as_text(&self) -> Option<String> {
        self.as_string_bytes().map(decode_text_string)
    }

    pub fn as_ref(&self) -> Option<(u32, u32)> {
        match self {
            PDFObject::Ref { num, generation } => Some((*num, *generation)),
            _ => None,
        }
    }

    /// Looks up a key in a dictionary or stream dictionary.
    pub fn get(&self, key: &str) -> Option<&PDFObject> {
        self.as_dict().and_then(|dict| dict.get(key))
    }

    /// Short type label used in messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PDFObject::Null => "null",
            PDFObject::Boolean(_) => "boolean",
            PDFObject::Number(_) => "number",
            PDFObject::String(_) | PDFObject::HexString(_) => "string",
            PDFObject::Name(_) => "name",
            PDFObject::Array(_) => "array",
            PDFObject::Dictionary(_) => "dictionary",
            PDFObject::Stream(_) => "stream",
            PDFObject::Ref { .. } => "reference",
            PDFObject::EOF => "end of file",
            PDFObject::Keyword(_) => "keyword",
        }
    }
}

/// Decodes a PDF text string.
///
/// Text strings are either UTF-16BE with a byte order mark or
/// PDFDocEncoding, which agrees with Latin-1 for the printable range.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if bytes.len() >= 3 && bytes[..3] == [0xEF, 0xBB, 0xBF] {
        return String::from_utf8_lossy(&bytes[3..]).into_owned();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Reads the filter chain from a stream dictionary.
pub fn filter_chain(dict: &Dict) -> FilterChain {
    match dict.get("Filter") {
        Some(PDFObject::Name(name)) => SmallVec::from_elem(name.clone(), 1),
        Some(PDFObject::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().map(str::to_string))
            .collect(),
        _ => SmallVec::new(),
    }
}

/// PDF Parser for building PDF objects from tokens.
///
/// The parser maintains a 2-token lookahead buffer to detect indirect
/// references (N1 N2 R) and stream objects (dictionary followed by "stream").
/// Each buffered token carries the offset at which it started.
pub struct Parser {
    /// The lexer that provides tokens
    lexer: Lexer,

    /// First lookahead token
    buf1: Option<(Token, usize)>,

    /// Second lookahead token
    buf2: Option<(Token, usize)>,

    /// Recoverable defects seen so far
    issues: Vec<ParseIssue>,
}

/// Nesting ceiling for arrays and dictionaries.
const MAX_NESTING: usize = 256;

impl Parser {
    /// Creates a new Parser from a Lexer.
    pub fn new(mut lexer: Lexer) -> PDFResult<Self> {
        let buf1 = Self::read_token(&mut lexer)?;
        let buf2 = Self::read_token(&mut lexer)?;

        Ok(Parser {
            lexer,
            buf1: Some(buf1),
            buf2: Some(buf2),
            issues: Vec::new(),
        })
    }

    /// Creates a parser over a standalone buffer, e.g. decoded stream data.
    pub fn from_bytes(data: Vec<u8>) -> PDFResult<Self> {
        let stream = Box::new(Stream::from_bytes(data)) as Box<dyn BaseStream>;
        Self::new(Lexer::new(stream)?)
    }

    fn read_token(lexer: &mut Lexer) -> PDFResult<(Token, usize)> {
        let token = lexer.get_object()?;
        Ok((token, lexer.token_start()))
    }

    /// Shifts the token buffer: buf2 -> buf1 and a new token into buf2.
    fn shift(&mut self) -> PDFResult<()> {
        self.buf1 = self.buf2.take();
        self.buf2 = Some(Self::read_token(&mut self.lexer)?);
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.buf1.as_ref().map(|(token, _)| token)
    }

    /// Offset of the next token to be consumed.
    pub fn position(&self) -> usize {
        self.buf1
            .as_ref()
            .map(|(_, offset)| *offset)
            .unwrap_or_else(|| self.lexer.position())
    }

    /// Returns the recoverable defects seen so far, including lexer warnings.
    pub fn take_issues(&mut self) -> Vec<ParseIssue> {
        let mut issues = std::mem::take(&mut self.issues);
        issues.extend(
            self.lexer
                .take_warnings()
                .into_iter()
                .map(|w| ParseIssue {
                    offset: w.offset,
                    message: w.message,
                    malformed: true,
                }),
        );
        issues.sort_by_key(|issue| issue.offset);
        issues
    }

    fn issue(&mut self, offset: usize, message: impl Into<String>, malformed: bool) {
        let message = message.into();
        log::warn!("offset {}: {}", offset, message);
        self.issues.push(ParseIssue {
            offset,
            message,
            malformed,
        });
    }

    /// Gets the next PDF object from the stream.
    ///
    /// Handles arrays, dictionaries, streams, indirect references and scalars.
    pub fn get_object(&mut self) -> PDFResult<PDFObject> {
        self.get_object_at_depth(0)
    }

    fn get_object_at_depth(&mut self, depth: usize) -> PDFResult<PDFObject> {
        let (token, offset) = self.buf1.take().ok_or_else(|| {
            PDFError::Generic("Parser buffer is empty (this should not happen)".to_string())
        })?;

        self.shift()?;

        if depth > MAX_NESTING
            && matches!(token, Token::ArrayStart | Token::DictStart)
        {
            return Err(PDFError::RecursionLimit {
                limit: MAX_NESTING,
                context: "parsing nested containers",
            });
        }

        match token {
            Token::ArrayStart => self.parse_array(depth),
            Token::DictStart => self.parse_dictionary(depth),

            Token::ArrayEnd => Err(PDFError::syntax(offset, "unexpected ']'")),
            Token::DictEnd => Err(PDFError::syntax(offset, "unexpected '>>'")),
            Token::StreamStart => Err(PDFError::syntax(offset, "'stream' without dictionary")),

            // Number: could be the start of an indirect reference (N1 N2 R)
            Token::Number(n) => {
                let generation = match (&self.buf1, &self.buf2) {
                    (Some((Token::Number(generation), _)), Some((Token::Keyword(cmd), _)))
                        if cmd == "R" =>
                    {
                        Some(*generation)
                    }
                    _ => None,
                };
                if let Some(generation) = generation {
                    if n < 0.0 || n.fract() != 0.0 || generation.fract() != 0.0 {
                        self.issue(offset, "reference with non-integral numbers", true);
                    }

                    self.shift()?; // generation number
                    self.shift()?; // 'R'

                    return Ok(PDFObject::Ref {
                        num: n as u32,
                        generation: generation as u32,
                    });
                }
                Ok(PDFObject::Number(n))
            }

            Token::EOF => Ok(PDFObject::EOF),
            Token::Boolean(b) => Ok(PDFObject::Boolean(b)),
            Token::Null => Ok(PDFObject::Null),
            Token::String(s) => Ok(PDFObject::String(s)),
            Token::HexString(s) => Ok(PDFObject::HexString(s)),
            Token::Name(n) => Ok(PDFObject::Name(n)),
            Token::Keyword(c) => Ok(PDFObject::Keyword(c)),
            Token::Comment(_) => self.get_object_at_depth(depth),
        }
    }

    /// Parses an array: [ obj1 obj2 ... ]
    fn parse_array(&mut self, depth: usize) -> PDFResult<PDFObject> {
        let mut array = Vec::new();

        loop {
            match self.peek() {
                Some(Token::ArrayEnd) => {
                    self.shift()?;
                    break;
                }
                Some(Token::EOF) | None => {
                    return Err(PDFError::syntax(
                        self.position(),
                        "unterminated array (missing ']')",
                    ));
                }
                Some(Token::DictEnd) => {
                    // Unbalanced '>>' inside an array: report and drop it
                    let offset = self.position();
                    self.issue(offset, "unexpected '>>' inside array", true);
                    self.shift()?;
                    continue;
                }
                _ => {}
            }

            let offset = self.position();
            match self.get_object_at_depth(depth + 1) {
                Ok(obj) => array.push(obj),
                Err(e @ PDFError::RecursionLimit { .. }) => return Err(e),
                Err(e) => {
                    self.issue(offset, format!("bad array element: {}", e), true);
                    array.push(PDFObject::Null);
                }
            }
        }

        Ok(PDFObject::Array(array))
    }

    /// Parses a dictionary: << /Key1 value1 /Key2 value2 ... >>
    fn parse_dictionary(&mut self, depth: usize) -> PDFResult<PDFObject> {
        let mut dict = Dict::default();

        loop {
            let offset = self.position();
            let key = match self.peek() {
                // Don't shift '>>' yet - buf2 may hold "stream"
                Some(Token::DictEnd) => break,
                Some(Token::EOF) | None => {
                    return Err(PDFError::syntax(
                        offset,
                        "unterminated dictionary (missing '>>')",
                    ));
                }
                Some(Token::Name(name)) => name.clone(),
                Some(other) => {
                    let label = format!("{:?}", other);
                    self.issue(offset, format!("dictionary key is not a name: {}", label), true);
                    self.shift()?;
                    continue;
                }
            };

            self.shift()?; // Consume the key

            match self.peek() {
                Some(Token::EOF) | None => {
                    return Err(PDFError::syntax(
                        self.position(),
                        "unterminated dictionary (EOF after key)",
                    ));
                }
                Some(Token::DictEnd) => {
                    self.issue(offset, format!("dictionary key /{} has no value", key), true);
                    dict.insert(key, PDFObject::Null);
                    break;
                }
                _ => {}
            }

            let value = match self.get_object_at_depth(depth + 1) {
                Ok(val) => val,
                Err(e @ PDFError::RecursionLimit { .. }) => return Err(e),
                Err(e) => {
                    self.issue(offset, format!("bad value for /{}: {}", key, e), true);
                    PDFObject::Null
                }
            };
            dict.insert(key, value);
        }

        // buf1 = '>>', buf2 = next token, possibly "stream"
        if let Some((Token::StreamStart, _)) = &self.buf2 {
            // The lexer sits right after the "stream" keyword; shifting would
            // tokenize raw stream data.
            self.buf1 = None;
            self.buf2 = None;
            return self.parse_stream(dict);
        }

        self.shift()?;
        Ok(PDFObject::Dictionary(dict))
    }

    /// Parses the raw extent of a stream following its dictionary.
    ///
    /// ```text
    /// << /Length 100 >> stream
    /// ...binary data...
    /// endstream
    /// ```
    fn parse_stream(&mut self, dict: Dict) -> PDFResult<PDFObject> {
        let keyword_offset = self.lexer.token_start();
        if !self.lexer.skip_stream_eol()? {
            self.issue(
                keyword_offset,
                "'stream' keyword not followed by CRLF or LF",
                false,
            );
        }
        let data_start = self.lexer.position();
        let end = self.lexer.end();

        let mut length_ref = None;
        let declared = match dict.get("Length") {
            Some(PDFObject::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
            Some(PDFObject::Ref { num, generation }) => {
                length_ref = Some((*num, *generation));
                None
            }
            _ => {
                self.issue(keyword_offset, "stream dictionary lacks a valid /Length", false);
                None
            }
        };

        let mut length = None;
        if let Some(len) = declared {
            if let Some(stop) = data_start.checked_add(len).filter(|&stop| stop <= end) {
                self.lexer.seek(stop)?;
                if self.lexer.get_object()?.is_keyword("endstream") {
                    length = Some(len);
                } else {
                    self.issue(
                        data_start,
                        "stream /Length does not end at 'endstream'",
                        true,
                    );
                }
            } else {
                self.issue(data_start, "stream /Length runs past end of file", true);
            }
        }

        let length = match length {
            Some(len) => len,
            None => match self.lexer.find_forward(data_start, b"endstream")? {
                Some(marker) => {
                    let from = marker.saturating_sub(2).max(data_start);
                    let tail = self.lexer.byte_range(from, marker)?;
                    self.lexer.seek(marker + b"endstream".len())?;
                    trim_eol(data_start, marker, &tail)
                }
                None => {
                    self.issue(data_start, "missing 'endstream'", true);
                    self.lexer.seek(end)?;
                    end - data_start
                }
            },
        };

        self.buf1 = Some(Self::read_token(&mut self.lexer)?);
        self.buf2 = Some(Self::read_token(&mut self.lexer)?);

        let filters = filter_chain(&dict);
        Ok(PDFObject::Stream(PDFStream {
            dict,
            offset: data_start,
            length,
            length_ref,
            filters,
        }))
    }

    /// Reads "num gen obj <value> endobj" starting at the current token.
    ///
    /// A missing `endobj` is recorded as a malformed issue; the object itself
    /// is still returned so that sibling parsing can continue.
    pub fn read_object_definition(&mut self) -> PDFResult<IndirectObject> {
        let offset = self.position();

        let num = self.expect_integer("object number")?;
        let generation = self.expect_integer("generation number")?;

        match self.peek() {
            Some(Token::Keyword(k)) if k == "obj" => self.shift()?,
            other => {
                return Err(PDFError::syntax(
                    self.position(),
                    format!("expected 'obj', got {:?}", other),
                ));
            }
        }

        let value = self.get_object()?;
        if value.is_keyword("endobj") {
            self.issue(offset, format!("object {} {} has no value", num, generation), true);
            return Ok(IndirectObject {
                num,
                generation,
                value: PDFObject::Null,
                offset,
            });
        }

        if let Some(Token::Keyword(k)) = self.peek() {
            if k == "endobj" {
                self.shift()?;
                return Ok(IndirectObject {
                    num,
                    generation,
                    value,
                    offset,
                });
            }
        }
        let at = self.position();
        self.issue(at, format!("object {} {} missing 'endobj'", num, generation), true);

        Ok(IndirectObject {
            num,
            generation,
            value,
            offset,
        })
    }

    fn expect_integer(&mut self, what: &str) -> PDFResult<u32> {
        let offset = self.position();
        match self.peek() {
            Some(Token::Number(n)) if *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64 => {
                let value = *n as u32;
                self.shift()?;
                Ok(value)
            }
            other => Err(PDFError::syntax(
                offset,
                format!("expected {}, got {:?}", what, other),
            )),
        }
    }

    /// Checks if there are more objects to parse.
    pub fn has_more(&self) -> bool {
        !matches!(self.peek(), Some(Token::EOF))
    }
}

/// Length of stream data ending at `marker`, without the EOL that precedes
/// `endstream`. `tail` holds up to two bytes immediately before `marker`.
fn trim_eol(data_start: usize, marker: usize, tail: &[u8]) -> usize {
    let mut len = marker - data_start;
    match tail {
        [.., b'\r', b'\n'] => len -= 2,
        [.., b'\n'] | [.., b'\r'] => len -= 1,
        _ => {}
    }
    len.min(marker - data_start)
}
