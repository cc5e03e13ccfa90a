//! Validation report model.
//!
//! A [`ValidationReport`] accumulates messages and properties phase by phase.
//! Message severities drive the well-formed and valid flags; everything else
//! is descriptive.

use super::error::PDFError;
use super::parser::ParseIssue;
use serde::Serialize;
use std::fmt;

/// Three-valued outcome used for the well-formed and valid flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tristate {
    True,
    False,
    Undetermined,
}

impl fmt::Display for Tristate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tristate::True => write!(f, "true"),
            Tristate::False => write!(f, "false"),
            Tristate::Undetermined => write!(f, "undetermined"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Breaks well-formedness (and therefore validity)
    Malformed,
    /// Breaks validity only
    Invalid,
    /// Informational, no effect on the flags
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl Message {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Message {
            severity,
            text: text.into(),
            offset: None,
        }
    }

    pub fn malformed(text: impl Into<String>) -> Self {
        Self::new(Severity::Malformed, text)
    }

    pub fn invalid(text: impl Into<String>) -> Self {
        Self::new(Severity::Invalid, text)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Severity::Info, text)
    }

    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Maps an error to a message, keeping its byte offset when it has one.
    pub fn from_error(severity: Severity, context: &str, err: &PDFError) -> Self {
        let message = Self::new(severity, format!("{}: {}", context, err));
        match err.offset() {
            Some(offset) => message.at(offset),
            None => message,
        }
    }
}

impl From<ParseIssue> for Message {
    fn from(issue: ParseIssue) -> Self {
        let severity = if issue.malformed {
            Severity::Malformed
        } else {
            Severity::Invalid
        };
        Message::new(severity, issue.message).at(issue.offset)
    }
}

/// Value of a report property.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Group(Vec<Property>),
}

/// A named node of the report's property tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

impl Property {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Property {
            name: name.into(),
            value: PropertyValue::Text(value.into()),
        }
    }

    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Property {
            name: name.into(),
            value: PropertyValue::Integer(value),
        }
    }

    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Property {
            name: name.into(),
            value: PropertyValue::Boolean(value),
        }
    }

    pub fn group(name: impl Into<String>, children: Vec<Property>) -> Self {
        Property {
            name: name.into(),
            value: PropertyValue::Group(children),
        }
    }

    pub fn children(&self) -> &[Property] {
        match &self.value {
            PropertyValue::Group(children) => children,
            _ => &[],
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match &self.value {
            PropertyValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &self.value {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

/// Looks up a '/'-separated path in a list of properties.
fn find_path<'a>(properties: &'a [Property], path: &str) -> Option<&'a Property> {
    let mut segments = path.split('/');
    let first = segments.next()?;
    let mut current = properties.iter().find(|p| p.name == first)?;
    for segment in segments {
        current = current.children().iter().find(|p| p.name == segment)?;
    }
    Some(current)
}

/// Whole-file digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checksums {
    pub crc32: String,
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

/// Outcome of one validation run.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub well_formed: Tristate,
    pub valid: Tristate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub profiles: Vec<String>,
    pub properties: Vec<Property>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksums: Option<Checksums>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        ValidationReport {
            well_formed: Tristate::Undetermined,
            valid: Tristate::Undetermined,
            version: None,
            profiles: Vec::new(),
            properties: Vec::new(),
            messages: Vec::new(),
            checksums: None,
        }
    }

    /// Records a message and lowers the flags it affects.
    pub fn add_message(&mut self, message: Message) {
        match message.severity {
            Severity::Malformed => {
                self.well_formed = Tristate::False;
                self.valid = Tristate::False;
            }
            Severity::Invalid => self.valid = Tristate::False,
            Severity::Info => {}
        }
        self.messages.push(message);
    }

    pub fn extend_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.add_message(message);
        }
    }

    pub fn add_property(&mut self, property: Property) {
        self.properties.push(property);
    }

    /// Settles flags still undetermined once every phase has run.
    pub fn finish(&mut self) {
        if self.well_formed == Tristate::Undetermined {
            self.well_formed = Tristate::True;
        }
        if self.valid == Tristate::Undetermined {
            self.valid = if self.well_formed == Tristate::True {
                Tristate::True
            } else {
                Tristate::False
            };
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.well_formed == Tristate::True
    }

    pub fn is_valid(&self) -> bool {
        self.valid == Tristate::True
    }

    /// Looks up a property by '/'-separated path, e.g. `"Info/Title"`.
    pub fn property(&self, path: &str) -> Option<&Property> {
        find_path(&self.properties, path)
    }

    pub fn messages_with(&self, severity: Severity) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.severity == severity)
    }

    pub fn has_message_containing(&self, needle: &str) -> bool {
        self.messages.iter().any(|m| m.text.contains(needle))
    }
}

fn write_properties(
    f: &mut fmt::Formatter<'_>,
    properties: &[Property],
    depth: usize,
) -> fmt::Result {
    for property in properties {
        let indent = "  ".repeat(depth);
        match &property.value {
            PropertyValue::Text(s) => writeln!(f, "{}{}: {}", indent, property.name, s)?,
            PropertyValue::Integer(n) => writeln!(f, "{}{}: {}", indent, property.name, n)?,
            PropertyValue::Boolean(b) => writeln!(f, "{}{}: {}", indent, property.name, b)?,
            PropertyValue::Group(children) => {
                writeln!(f, "{}{}:", indent, property.name)?;
                write_properties(f, children, depth + 1)?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Well-formed: {}", self.well_formed)?;
        writeln!(f, "Valid: {}", self.valid)?;
        if let Some(version) = &self.version {
            writeln!(f, "Version: {}", version)?;
        }
        if !self.profiles.is_empty() {
            writeln!(f, "Profiles: {}", self.profiles.join(", "))?;
        }
        write_properties(f, &self.properties, 0)?;
        if let Some(sums) = &self.checksums {
            writeln!(f, "Checksums:")?;
            writeln!(f, "  CRC32: {}", sums.crc32)?;
            writeln!(f, "  MD5: {}", sums.md5)?;
            writeln!(f, "  SHA-1: {}", sums.sha1)?;
            writeln!(f, "  SHA-256: {}", sums.sha256)?;
        }
        for message in &self.messages {
            let severity = match message.severity {
                Severity::Malformed => "MALFORMED",
                Severity::Invalid => "INVALID",
                Severity::Info => "INFO",
            };
            match message.offset {
                Some(offset) => writeln!(f, "[{}] {} (offset {})", severity, message.text, offset)?,
                None => writeln!(f, "[{}] {}", severity, message.text)?,
            }
        }
        Ok(())
    }
}
