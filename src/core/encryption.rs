//! Encryption parameters from the /Encrypt dictionary.
//!
//! Documents are never decrypted; these are reported as-is.

use super::parser::{Dict, PDFObject};
use super::report::{Message, Property};

/// User access permissions decoded from the /P value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PDFPermissions {
    /// Print the document (possibly at high quality)
    pub print: bool,
    /// Modify the document contents
    pub modify: bool,
    /// Copy or extract text and graphics
    pub copy: bool,
    /// Add or modify text annotations
    pub annotate: bool,
    /// Fill in form fields
    pub fill_form: bool,
    /// Extract text and graphics for accessibility
    pub extract: bool,
    /// Assemble the document
    pub assemble: bool,
    /// Print at high quality
    pub print_high_quality: bool,
    /// Raw permissions value from the PDF
    pub raw_value: u32,
}

impl PDFPermissions {
    /// Parse permissions from the P value in the /Encrypt dictionary
    pub fn from_p_value(p: u32) -> Self {
        PDFPermissions {
            print: (p & 0x0004) != 0,
            modify: (p & 0x0008) != 0,
            copy: (p & 0x0010) != 0,
            annotate: (p & 0x0020) != 0,
            fill_form: (p & 0x0100) != 0,
            extract: (p & 0x0200) != 0,
            assemble: (p & 0x0400) != 0,
            print_high_quality: (p & 0x0800) != 0,
            raw_value: p,
        }
    }

    /// Names of the granted permissions.
    pub fn granted(&self) -> Vec<&'static str> {
        [
            (self.print, "print"),
            (self.modify, "modify"),
            (self.copy, "copy"),
            (self.annotate, "annotate"),
            (self.fill_form, "fill forms"),
            (self.extract, "extract for accessibility"),
            (self.assemble, "assemble"),
            (self.print_high_quality, "print high quality"),
        ]
        .into_iter()
        .filter_map(|(granted, name)| granted.then_some(name))
        .collect()
    }
}

/// Encryption parameters of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionInfo {
    pub filter: Option<String>,
    pub sub_filter: Option<String>,
    /// Algorithm code (/V)
    pub algorithm: i64,
    /// Security handler revision (/R)
    pub revision: Option<i64>,
    /// Key length in bits
    pub key_length: i64,
    pub permissions: Option<PDFPermissions>,
}

fn algorithm_description(v: i64) -> &'static str {
    match v {
        0 => "undocumented",
        1 => "40-bit RC4",
        2 => "RC4 with key length over 40 bits",
        3 => "unpublished",
        4 => "security handler crypt filters",
        5 => "AES-256",
        _ => "unknown",
    }
}

impl EncryptionInfo {
    pub fn from_dict(dict: &Dict) -> (Self, Vec<Message>) {
        let mut messages = Vec::new();
        let filter = dict.get("Filter").and_then(PDFObject::as_name).map(str::to_string);
        if filter.is_none() {
            messages.push(Message::invalid("encryption dictionary has no /Filter"));
        }

        let algorithm = dict.get("V").and_then(PDFObject::as_int).unwrap_or(0);
        if !(0..=5).contains(&algorithm) {
            messages.push(Message::invalid(format!("unknown encryption algorithm /V {}", algorithm)));
        }

        let key_length = dict.get("Length").and_then(PDFObject::as_int).unwrap_or(40);
        if matches!(algorithm, 2 | 3) && (key_length % 8 != 0 || !(40..=128).contains(&key_length)) {
            messages.push(Message::invalid(format!(
                "encryption key length {} is not a multiple of 8 between 40 and 128",
                key_length
            )));
        }

        // /P is a signed 32-bit integer; the bit pattern is what matters
        let permissions = dict
            .get("P")
            .and_then(PDFObject::as_int)
            .map(|p| PDFPermissions::from_p_value(p as i32 as u32));

        let info = EncryptionInfo {
            filter,
            sub_filter: dict.get("SubFilter").and_then(PDFObject::as_name).map(str::to_string),
            algorithm,
            revision: dict.get("R").and_then(PDFObject::as_int),
            key_length,
            permissions,
        };
        (info, messages)
    }

    pub fn to_property(&self) -> Property {
        let mut children = Vec::new();
        if let Some(filter) = &self.filter {
            children.push(Property::text("SecurityHandler", filter.as_str()));
        }
        if let Some(sub_filter) = &self.sub_filter {
            children.push(Property::text("SubFilter", sub_filter.as_str()));
        }
        children.push(Property::text(
            "Algorithm",
            format!("{} ({})", self.algorithm, algorithm_description(self.algorithm)),
        ));
        if let Some(revision) = self.revision {
            children.push(Property::integer("Revision", revision));
        }
        children.push(Property::integer("KeyLength", self.key_length));
        if let Some(permissions) = &self.permissions {
            children.push(Property::group(
                "UserAccess",
                permissions
                    .granted()
                    .into_iter()
                    .map(|name| Property::boolean(name, true))
                    .collect(),
            ));
        }
        Property::group("Encryption", children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: &[(&str, PDFObject)]) -> Dict {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_permissions_from_negative_p() {
        // -3904 = 0xFFFFF0C0: no print, modify, copy, annotate, fill or extract
        let perms = PDFPermissions::from_p_value(-3904i32 as u32);
        assert!(!perms.print);
        assert!(!perms.copy);
        assert!(perms.granted().is_empty());

        let perms = PDFPermissions::from_p_value(-4i32 as u32);
        assert!(perms.print && perms.modify && perms.assemble && perms.print_high_quality);
    }

    #[test]
    fn test_encryption_info() {
        let (info, messages) = EncryptionInfo::from_dict(&dict(&[
            ("Filter", PDFObject::Name("Standard".to_string())),
            ("V", PDFObject::Number(2.0)),
            ("R", PDFObject::Number(3.0)),
            ("Length", PDFObject::Number(128.0)),
            ("P", PDFObject::Number(-1340.0)),
        ]));

        assert!(messages.is_empty());
        assert_eq!(info.filter.as_deref(), Some("Standard"));
        assert_eq!(info.key_length, 128);
        let perms = info.permissions.unwrap();
        assert!(perms.print);
        assert!(!perms.modify);

        let property = info.to_property();
        assert_eq!(property.name, "Encryption");
        assert!(property.children().iter().any(|p| p.name == "UserAccess"));
    }

    #[test]
    fn test_bad_parameters() {
        let (_, messages) = EncryptionInfo::from_dict(&dict(&[
            ("V", PDFObject::Number(2.0)),
            ("Length", PDFObject::Number(44.0)),
        ]));
        assert_eq!(messages.len(), 2);
    }
}
