use super::base_stream::BaseStream;
use super::error::{PDFError, PDFResult};

/// PDF token types returned by the Lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// End of file marker
    EOF,

    /// Boolean value (`true` / `false` keywords)
    Boolean(bool),

    /// Null value (`null` keyword)
    Null,

    /// Numeric value (integers and reals)
    Number(f64),

    /// String value (from literal strings like (hello))
    String(Vec<u8>),

    /// Hex string value (from hex strings like <48656c6c6f>)
    HexString(Vec<u8>),

    /// Name value (from /Name), with #xx escapes decoded
    Name(String),

    /// Bare keyword (obj, endobj, R, xref, trailer, ...)
    Keyword(String),

    /// Array start '['
    ArrayStart,

    /// Array end ']'
    ArrayEnd,

    /// Dictionary start '<<'
    DictStart,

    /// Dictionary end '>>'
    DictEnd,

    /// Comment body without the leading '%' (only when comments are kept)
    Comment(Vec<u8>),

    /// The `stream` keyword introducing raw stream data
    StreamStart,
}

impl Token {
    /// Returns true if this token is the given keyword.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Keyword(k) if k == keyword)
    }
}

/// A recoverable lexical defect.
#[derive(Debug, Clone, PartialEq)]
pub struct LexerWarning {
    pub offset: usize,
    pub message: String,
}

/// PDF Lexer for tokenizing PDF syntax.
///
/// The lexer handles:
/// - Whitespace and comment skipping (or reporting, see [`Lexer::with_comments`])
/// - Number parsing (integers, reals)
/// - String parsing (literal and hexadecimal)
/// - Name parsing with '#' escapes
/// - Keywords and delimiters
///
/// Malformed string syntax does not abort tokenization: a [`LexerWarning`] is
/// recorded and scanning resumes at the next delimiter.
pub struct Lexer {
    /// The input stream
    stream: Box<dyn BaseStream>,

    /// Current character being examined (-1 at EOF)
    current_char: i32,

    /// Buffer for building strings
    str_buf: Vec<u8>,

    /// Emit comments as tokens instead of skipping them
    keep_comments: bool,

    /// Offset at which the most recent token began
    token_start: usize,

    /// Recoverable defects seen so far
    warnings: Vec<LexerWarning>,
}

const MAX_KEYWORD_LENGTH: usize = 128;

impl Lexer {
    /// Creates a new Lexer from a stream, starting at the stream's current position.
    pub fn new(mut stream: Box<dyn BaseStream>) -> PDFResult<Self> {
        let current_char = Self::read_char(&mut stream)?;
        let token_start = stream.pos().saturating_sub(1);

        Ok(Lexer {
            stream,
            current_char,
            str_buf: Vec::new(),
            keep_comments: false,
            token_start,
            warnings: Vec::new(),
        })
    }

    /// Makes the lexer return comments as [`Token::Comment`].
    pub fn with_comments(mut self, keep: bool) -> Self {
        self.keep_comments = keep;
        self
    }

    /// Reads the next character from the stream.
    ///
    /// Returns -1 on EOF.
    fn read_char(stream: &mut Box<dyn BaseStream>) -> PDFResult<i32> {
        match stream.get_byte() {
            Ok(byte) => Ok(byte as i32),
            Err(PDFError::UnexpectedEndOfStream) => Ok(-1),
            Err(e) => Err(e),
        }
    }

    /// Advances to the next character.
    fn next_char(&mut self) -> PDFResult<i32> {
        self.current_char = Self::read_char(&mut self.stream)?;
        Ok(self.current_char)
    }

    /// Peeks at the character after the current one without consuming it.
    fn peek_char(&mut self) -> PDFResult<i32> {
        match self.stream.peek_byte() {
            Ok(byte) => Ok(byte as i32),
            Err(PDFError::UnexpectedEndOfStream) => Ok(-1),
            Err(e) => Err(e),
        }
    }

    /// Absolute offset of the character the lexer is looking at.
    pub fn position(&self) -> usize {
        if self.current_char >= 0 {
            self.stream.pos() - 1
        } else {
            self.stream.pos()
        }
    }

    /// Absolute offset at which the most recently returned token started.
    pub fn token_start(&self) -> usize {
        self.token_start
    }

    /// Repositions the lexer at an absolute offset.
    pub fn seek(&mut self, pos: usize) -> PDFResult<()> {
        self.stream.set_pos(pos)?;
        self.next_char()?;
        Ok(())
    }

    /// Absolute offset one past the last readable byte.
    pub fn end(&self) -> usize {
        self.stream.end()
    }

    /// Returns the warnings recorded so far, leaving the list empty.
    pub fn take_warnings(&mut self) -> Vec<LexerWarning> {
        std::mem::take(&mut self.warnings)
    }

    fn warn(&mut self, offset: usize, message: impl Into<String>) {
        let message = message.into();
        log::debug!("lexer warning at {}: {}", offset, message);
        self.warnings.push(LexerWarning { offset, message });
    }

    /// Checks if a character is PDF whitespace (ISO 32000-1, 7.2.2).
    ///
    /// PDF whitespace: NUL, TAB, LF, FF, CR, SPACE
    pub fn is_whitespace(ch: i32) -> bool {
        matches!(ch, 0x00 | 0x09 | 0x0A | 0x0C | 0x0D | 0x20)
    }

    /// Checks if a character is a PDF delimiter (ISO 32000-1, 7.2.2).
    ///
    /// PDF delimiters: ( ) < > [ ] { } / %
    pub fn is_delimiter(ch: i32) -> bool {
        matches!(
            ch,
            0x28 | 0x29 | 0x3C | 0x3E | 0x5B | 0x5D | 0x7B | 0x7D | 0x2F | 0x25
        )
    }

    /// Checks if a character is special (whitespace or delimiter).
    fn is_special(ch: i32) -> bool {
        Self::is_whitespace(ch) || Self::is_delimiter(ch)
    }

    fn skip_whitespace(&mut self) -> PDFResult<()> {
        while self.current_char >= 0 && Self::is_whitespace(self.current_char) {
            self.next_char()?;
        }
        Ok(())
    }

    /// Reads a comment body; the current character is the '%'.
    fn read_comment(&mut self) -> PDFResult<Vec<u8>> {
        let mut body = Vec::new();
        let mut ch = self.next_char()?;
        while ch >= 0 && ch != 0x0A && ch != 0x0D {
            body.push(ch as u8);
            ch = self.next_char()?;
        }
        Ok(body)
    }

    /// Gets the next token from the stream.
    pub fn get_object(&mut self) -> PDFResult<Token> {
        loop {
            self.skip_whitespace()?;
            self.token_start = self.position();

            let ch = self.current_char;
            if ch < 0 {
                return Ok(Token::EOF);
            }

            match ch {
                // '%' comment
                0x25 => {
                    let body = self.read_comment()?;
                    if self.keep_comments {
                        return Ok(Token::Comment(body));
                    }
                }

                // Numbers: 0-9, +, -, .
                0x30..=0x39 | 0x2B | 0x2D | 0x2E => return self.get_number(),

                // Literal string: (
                0x28 => return self.get_string(),

                // Name: /
                0x2F => return self.get_name(),

                0x5B => {
                    self.next_char()?;
                    return Ok(Token::ArrayStart);
                }

                0x5D => {
                    self.next_char()?;
                    return Ok(Token::ArrayEnd);
                }

                // Hex string or dict start: <
                0x3C => {
                    if self.next_char()? == 0x3C {
                        self.next_char()?;
                        return Ok(Token::DictStart);
                    }
                    return self.get_hex_string();
                }

                // Dict end: >>
                0x3E => {
                    if self.next_char()? == 0x3E {
                        self.next_char()?;
                        return Ok(Token::DictEnd);
                    }
                    let offset = self.token_start;
                    self.warn(offset, "stray '>' outside of hex string");
                }

                // Unbalanced ')' - report and resynchronize
                0x29 => {
                    let offset = self.token_start;
                    self.next_char()?;
                    self.warn(offset, "unbalanced ')' outside of literal string");
                }

                // PostScript calculator braces are single-character keywords
                0x7B | 0x7D => {
                    self.next_char()?;
                    return Ok(Token::Keyword((ch as u8 as char).to_string()));
                }

                _ => return self.get_keyword(),
            }
        }
    }

    /// Parses a number token.
    ///
    /// Handles integers and reals. Mirrors the lenient behaviour of common
    /// readers: a doubled leading minus is ignored and a lone sign reads as 0.
    fn get_number(&mut self) -> PDFResult<Token> {
        let mut ch = self.current_char;
        let mut divide_by = 0.0; // Non-zero once a decimal point is seen
        let mut sign = 1.0;

        if ch == 0x2D {
            sign = -1.0;
            ch = self.next_char()?;

            if ch == 0x2D {
                ch = self.next_char()?;
            }
        } else if ch == 0x2B {
            ch = self.next_char()?;
        }

        if ch == 0x2E {
            divide_by = 10.0;
            ch = self.next_char()?;
        }

        if !(0x30..=0x39).contains(&ch) {
            if Self::is_special(ch) || ch == -1 {
                let offset = self.token_start;
                self.warn(offset, "numeric token without digits read as 0");
                return Ok(Token::Number(0.0));
            }
            return Err(PDFError::syntax(
                self.token_start,
                format!("invalid number (charCode {})", ch),
            ));
        }

        let mut base_value = (ch - 0x30) as f64;

        loop {
            ch = self.next_char()?;
            if ch < 0 {
                break;
            }

            if (0x30..=0x39).contains(&ch) {
                if divide_by != 0.0 {
                    divide_by *= 10.0;
                }
                base_value = base_value * 10.0 + (ch - 0x30) as f64;
            } else if ch == 0x2E {
                if divide_by == 0.0 {
                    divide_by = 1.0;
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        let mut result = base_value;
        if divide_by != 0.0 {
            result /= divide_by;
        }

        Ok(Token::Number(sign * result))
    }

    /// Parses a literal string token.
    ///
    /// Handles nested parentheses and escape sequences. An unterminated string
    /// is reported and returned as read so far.
    fn get_string(&mut self) -> PDFResult<Token> {
        let start = self.token_start;
        let mut num_paren = 1;
        self.str_buf.clear();

        let mut ch = self.next_char()?; // Consume opening '('

        loop {
            let mut char_buffered = false;

            match ch {
                -1 => {
                    self.warn(start, "unterminated literal string");
                    break;
                }

                0x28 => {
                    num_paren += 1;
                    self.str_buf.push(b'(');
                }

                0x29 => {
                    num_paren -= 1;
                    if num_paren == 0 {
                        self.next_char()?;
                        break;
                    }
                    self.str_buf.push(b')');
                }

                0x5C => {
                    ch = self.next_char()?;
                    match ch {
                        -1 => {
                            self.warn(start, "unterminated literal string");
                            break;
                        }
                        0x6E => self.str_buf.push(b'\n'),
                        0x72 => self.str_buf.push(b'\r'),
                        0x74 => self.str_buf.push(b'\t'),
                        0x62 => self.str_buf.push(0x08),
                        0x66 => self.str_buf.push(0x0C),
                        0x5C | 0x28 | 0x29 => self.str_buf.push(ch as u8),
                        0x30..=0x37 => {
                            // Octal escape \ddd (1-3 digits)
                            let mut x = (ch & 0x0F) as u8;
                            ch = self.next_char()?;
                            char_buffered = true;

                            if (0x30..=0x37).contains(&ch) {
                                x = (x << 3).wrapping_add((ch & 0x0F) as u8);
                                ch = self.next_char()?;

                                if (0x30..=0x37).contains(&ch) {
                                    char_buffered = false;
                                    x = (x << 3).wrapping_add((ch & 0x0F) as u8);
                                }
                            }
                            self.str_buf.push(x);
                        }
                        // Line continuation
                        0x0D => {
                            if self.peek_char()? == 0x0A {
                                self.next_char()?;
                            }
                        }
                        0x0A => {}
                        _ => self.str_buf.push(ch as u8),
                    }
                }

                _ => self.str_buf.push(ch as u8),
            }

            if !char_buffered {
                ch = self.next_char()?;
            }
        }

        Ok(Token::String(self.str_buf.clone()))
    }

    /// Converts a hex character to its numeric value, or -1.
    fn to_hex_digit(ch: i32) -> i32 {
        match ch {
            0x30..=0x39 => ch & 0x0F,
            0x41..=0x46 | 0x61..=0x66 => (ch & 0x0F) + 9,
            _ => -1,
        }
    }

    /// Parses a hex string token; the current character follows the '<'.
    ///
    /// A delimiter other than '>' ends the string early (resynchronization);
    /// other non-hex bytes are skipped. Both cases are reported.
    fn get_hex_string(&mut self) -> PDFResult<Token> {
        let start = self.token_start;
        self.str_buf.clear();
        let mut ch = self.current_char;
        let mut first_digit = -1;
        let mut reported = false;

        loop {
            if ch < 0 {
                self.warn(start, "unterminated hex string");
                break;
            } else if ch == 0x3E {
                self.next_char()?;
                break;
            } else if Self::is_whitespace(ch) {
                ch = self.next_char()?;
                continue;
            } else if Self::is_delimiter(ch) {
                self.warn(self.position(), "hex string interrupted by delimiter");
                break;
            }

            let digit = Self::to_hex_digit(ch);
            if digit == -1 {
                if !reported {
                    self.warn(self.position(), "invalid character in hex string");
                    reported = true;
                }
            } else if first_digit == -1 {
                first_digit = digit;
            } else {
                self.str_buf.push(((first_digit << 4) | digit) as u8);
                first_digit = -1;
            }
            ch = self.next_char()?;
        }

        // Odd number of digits: the final digit is followed by an implied 0
        if first_digit != -1 {
            self.str_buf.push((first_digit << 4) as u8);
        }

        Ok(Token::HexString(self.str_buf.clone()))
    }

    /// Parses a name token, decoding '#xx' escapes.
    fn get_name(&mut self) -> PDFResult<Token> {
        self.str_buf.clear();

        let mut ch = self.next_char()?; // Skip the initial '/'

        while ch >= 0 && !Self::is_special(ch) {
            if ch == 0x23 {
                ch = self.next_char()?;

                if ch < 0 || Self::is_special(ch) {
                    self.str_buf.push(b'#');
                    break;
                }

                let x = Self::to_hex_digit(ch);
                if x != -1 {
                    let previous_ch = ch;
                    ch = self.next_char()?;
                    let x2 = Self::to_hex_digit(ch);

                    if x2 == -1 {
                        self.warn(self.position(), "invalid #xx escape in name");
                        self.str_buf.push(b'#');
                        self.str_buf.push(previous_ch as u8);

                        if ch < 0 || Self::is_special(ch) {
                            break;
                        }
                        self.str_buf.push(ch as u8);
                        ch = self.next_char()?;
                        continue;
                    }

                    self.str_buf.push(((x << 4) | x2) as u8);
                } else {
                    self.str_buf.push(b'#');
                    self.str_buf.push(ch as u8);
                }
            } else {
                self.str_buf.push(ch as u8);
            }

            ch = self.next_char()?;
        }

        Ok(Token::Name(String::from_utf8_lossy(&self.str_buf).into_owned()))
    }

    /// Parses a bare keyword, recognising true, false, null and stream.
    fn get_keyword(&mut self) -> PDFResult<Token> {
        let mut str_buf = String::new();
        let mut ch = self.current_char;

        while ch >= 0 && !Self::is_special(ch) {
            if str_buf.len() >= MAX_KEYWORD_LENGTH {
                return Err(PDFError::syntax(
                    self.token_start,
                    format!("keyword token too long: {}", str_buf.len()),
                ));
            }

            str_buf.push(ch as u8 as char);
            ch = self.next_char()?;
        }

        Ok(match str_buf.as_str() {
            "true" => Token::Boolean(true),
            "false" => Token::Boolean(false),
            "null" => Token::Null,
            "stream" => Token::StreamStart,
            _ => Token::Keyword(str_buf),
        })
    }

    /// Consumes the end-of-line after the `stream` keyword.
    ///
    /// Returns true when the marker is followed by CRLF or LF as required; a
    /// lone CR or trailing spaces are accepted but reported as false.
    pub fn skip_stream_eol(&mut self) -> PDFResult<bool> {
        let mut conforming = true;
        while self.current_char == 0x20 || self.current_char == 0x09 {
            conforming = false;
            self.next_char()?;
        }
        match self.current_char {
            0x0D => {
                if self.next_char()? == 0x0A {
                    self.next_char()?;
                    Ok(conforming)
                } else {
                    Ok(false)
                }
            }
            0x0A => {
                self.next_char()?;
                Ok(conforming)
            }
            _ => Ok(false),
        }
    }

    /// Returns the bytes in `[begin, end)` without moving the lexer.
    pub fn byte_range(&self, begin: usize, end: usize) -> PDFResult<Vec<u8>> {
        if begin >= end {
            return Ok(Vec::new());
        }
        self.stream.get_byte_range(begin, end)
    }

    /// Finds the next occurrence of `needle` at or after `from`, without moving.
    pub fn find_forward(&self, from: usize, needle: &[u8]) -> PDFResult<Option<usize>> {
        let tail = self.stream.tail_from(from)?;
        Ok(tail
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|idx| from + idx))
    }
}
