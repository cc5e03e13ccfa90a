use super::error::{PDFError, PDFResult};
use super::name_tree;
use super::parser::{Dict, PDFObject};
use super::report::Message;
use super::xref::XRef;
use rustc_hash::FxHashSet;

/// A single page in a PDF document.
///
/// Inheritable attributes (Resources, MediaBox, CropBox, Rotate) are resolved
/// against the ancestor Pages nodes while the tree is walked, so the accessors
/// below return the effective value.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based position in tree order
    sequence: usize,

    /// The page dictionary
    page_dict: Dict,

    /// The indirect object reference for this page (if it has one)
    page_ref: Option<(u32, u32)>,

    inherited: Inherited,
}

impl Page {
    /// Returns the 1-based sequence number.
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    /// Returns the page index (0-based).
    pub fn index(&self) -> usize {
        self.sequence - 1
    }

    /// Returns a reference to the page dictionary.
    pub fn dict(&self) -> &Dict {
        &self.page_dict
    }

    /// Returns the page's indirect object reference if it has one.
    pub fn reference(&self) -> Option<(u32, u32)> {
        self.page_ref
    }

    pub fn object_num(&self) -> Option<u32> {
        self.page_ref.map(|(num, _)| num)
    }

    /// Gets a property from the page dictionary.
    pub fn get(&self, key: &str) -> Option<&PDFObject> {
        self.page_dict.get(key)
    }

    /// The boundaries of the physical medium, `[llx lly urx ury]`.
    pub fn media_box(&self) -> Option<&PDFObject> {
        self.inherited.media_box.as_ref()
    }

    pub fn crop_box(&self) -> Option<&PDFObject> {
        self.inherited.crop_box.as_ref()
    }

    /// Gets the Resources dictionary for this page (possibly a reference).
    pub fn resources(&self) -> Option<&PDFObject> {
        self.inherited.resources.as_ref()
    }

    /// Declared rotation in degrees, 0 when absent.
    pub fn rotate(&self) -> Option<i64> {
        match &self.inherited.rotate {
            Some(rotate) => rotate.as_int(),
            None => Some(0),
        }
    }

    /// Gets the Contents for this page.
    ///
    /// Contents can be either a single stream or an array of streams.
    pub fn contents(&self) -> Option<&PDFObject> {
        self.get("Contents")
    }
}

#[derive(Debug, Clone, Default)]
struct Inherited {
    resources: Option<PDFObject>,
    media_box: Option<PDFObject>,
    crop_box: Option<PDFObject>,
    rotate: Option<PDFObject>,
}

impl Inherited {
    fn apply(&self, dict: &Dict) -> Self {
        let pick = |key: &str, parent: &Option<PDFObject>| dict.get(key).cloned().or_else(|| parent.clone());
        Inherited {
            resources: pick("Resources", &self.resources),
            media_box: pick("MediaBox", &self.media_box),
            crop_box: pick("CropBox", &self.crop_box),
            rotate: pick("Rotate", &self.rotate),
        }
    }
}

/// Result of walking the page tree.
#[derive(Debug, Clone, Default)]
pub struct PageTree {
    pub pages: Vec<Page>,
    /// /Count of the root node
    pub declared_count: Option<i64>,
    pub messages: Vec<Message>,
}

impl PageTree {
    /// Finds the sequence number of the page with object number `num`.
    pub fn sequence_of(&self, num: u32) -> Option<usize> {
        self.pages
            .iter()
            .find(|p| p.object_num() == Some(num))
            .map(Page::sequence)
    }
}

struct PageWalker<'a> {
    xref: &'a mut XRef,
    max_depth: usize,
    visited: FxHashSet<u32>,
    cycle_reported: bool,
    tree: PageTree,
}

impl PageWalker<'_> {
    fn visit(
        &mut self,
        dict: &Dict,
        reference: Option<(u32, u32)>,
        inherited: &Inherited,
        depth: usize,
    ) -> PDFResult<()> {
        if depth > self.max_depth {
            return Err(PDFError::RecursionLimit {
                limit: self.max_depth,
                context: "walking the page tree",
            });
        }
        let inherited = inherited.apply(dict);
        let label = match reference {
            Some((num, _)) => format!("object {}", num),
            None => "direct page tree node".to_string(),
        };

        let is_pages = match dict.get("Type").and_then(PDFObject::as_name) {
            Some("Pages") => true,
            Some("Page") => false,
            Some(other) => {
                self.tree.messages.push(Message::invalid(format!(
                    "page tree {} has unexpected /Type /{}; skipped",
                    label, other
                )));
                return Ok(());
            }
            None => {
                let has_kids = dict.contains_key("Kids");
                self.tree.messages.push(Message::invalid(format!(
                    "page tree {} has no /Type; treated as {}",
                    label,
                    if has_kids { "Pages" } else { "Page" }
                )));
                has_kids
            }
        };

        if !is_pages {
            self.tree.pages.push(Page {
                sequence: self.tree.pages.len() + 1,
                page_dict: dict.clone(),
                page_ref: reference,
                inherited,
            });
            return Ok(());
        }

        let kids = match dict.get("Kids") {
            Some(kids) => self.xref.fetch_if_ref(kids)?,
            None => {
                self.tree.messages.push(Message::invalid(format!("pages node {} has no /Kids", label)));
                return Ok(());
            }
        };
        for kid in kids.as_array().unwrap_or(&[]) {
            let (value, num) = self.xref.fetch_with_num(kid)?;
            if let Some(num) = num {
                if !self.visited.insert(num) {
                    if !self.cycle_reported {
                        self.cycle_reported = true;
                        self.tree.messages.push(Message::invalid(format!(
                            "page tree cycle: object {} reached twice; traversal truncated",
                            num
                        )));
                    }
                    continue;
                }
            }
            match value.as_dict() {
                Some(kid_dict) => self.visit(kid_dict, kid.as_ref(), &inherited, depth + 1)?,
                None => self.tree.messages.push(Message::invalid(format!(
                    "page tree kid of {} is a {}, not a dictionary",
                    label,
                    value.type_name()
                ))),
            }
        }
        Ok(())
    }
}

/// Enumerates pages in tree order, starting from the catalog's /Pages entry.
///
/// Each object is visited at most once; a cycle is reported a single time and
/// the repeated branch dropped. Trees deeper than `max_depth` are an error.
pub fn walk_page_tree(xref: &mut XRef, root: &PDFObject, max_depth: usize) -> PDFResult<PageTree> {
    let (value, num) = xref.fetch_with_num(root)?;
    let dict = value.as_dict().ok_or_else(|| {
        PDFError::XRef(format!("page tree root is a {}, not a dictionary", value.type_name()))
    })?;

    let mut walker = PageWalker {
        xref,
        max_depth,
        visited: num.into_iter().collect(),
        cycle_reported: false,
        tree: PageTree {
            declared_count: dict.get("Count").and_then(PDFObject::as_int),
            ..PageTree::default()
        },
    };
    walker.visit(dict, root.as_ref(), &Inherited::default(), 0)?;

    let mut tree = walker.tree;
    match tree.declared_count {
        Some(count) if count == tree.pages.len() as i64 => {}
        Some(count) => tree.messages.push(Message::invalid(format!(
            "page tree /Count is {} but {} page(s) were found",
            count,
            tree.pages.len()
        ))),
        None => tree.messages.push(Message::invalid("page tree root has no /Count")),
    }
    log::debug!("page tree: {} page(s)", tree.pages.len());
    Ok(tree)
}

/// Numbering style of a page label range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStyle {
    Decimal,
    UpperRoman,
    LowerRoman,
    UpperAlpha,
    LowerAlpha,
    /// Prefix only
    None,
}

impl LabelStyle {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "D" => Some(LabelStyle::Decimal),
            "R" => Some(LabelStyle::UpperRoman),
            "r" => Some(LabelStyle::LowerRoman),
            "A" => Some(LabelStyle::UpperAlpha),
            "a" => Some(LabelStyle::LowerAlpha),
            _ => None,
        }
    }
}

/// One entry of the /PageLabels number tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRange {
    /// 0-based index of the first page in the range
    pub start: usize,
    pub style: LabelStyle,
    pub prefix: String,
    /// Numeric value of the first page (/St)
    pub first: i64,
}

fn to_roman(mut n: i64) -> String {
    const NUMERALS: &[(i64, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for &(value, numeral) in NUMERALS {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}

/// A, B, .., Z, AA, BB, .., ZZ, AAA, ..
fn to_alpha(n: i64) -> String {
    let letter = (b'A' + ((n - 1) % 26) as u8) as char;
    std::iter::repeat_n(letter, ((n - 1) / 26 + 1) as usize).collect()
}

/// Largest value spelled out in roman or alphabetic style.
pub const MAX_STYLED_LABEL: i64 = 1_000_000;

/// Formats `n` in `style`. Values below 1 or above [`MAX_STYLED_LABEL`]
/// fall back to decimal.
pub fn format_label(style: LabelStyle, n: i64) -> String {
    if n < 1 || (n > MAX_STYLED_LABEL && style != LabelStyle::None) {
        return match style {
            LabelStyle::None => String::new(),
            _ => n.to_string(),
        };
    }
    match style {
        LabelStyle::Decimal => n.to_string(),
        LabelStyle::UpperRoman => to_roman(n),
        LabelStyle::LowerRoman => to_roman(n).to_lowercase(),
        LabelStyle::UpperAlpha => to_alpha(n),
        LabelStyle::LowerAlpha => to_alpha(n).to_lowercase(),
        LabelStyle::None => String::new(),
    }
}

/// Page labels read from the catalog's /PageLabels number tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLabels {
    ranges: Vec<LabelRange>,
}

impl PageLabels {
    pub fn load(xref: &mut XRef, root: &PDFObject, max_depth: usize) -> PDFResult<(Self, Vec<Message>)> {
        let mut messages = Vec::new();
        let mut ranges = Vec::new();

        for (start, value) in name_tree::collect::<i64>(xref, root, max_depth)? {
            let Ok(start) = usize::try_from(start) else {
                messages.push(Message::invalid(format!("page label range starts at negative index {}", start)));
                continue;
            };
            let Some(dict) = xref.fetch_dict(&value)? else {
                messages.push(Message::invalid(format!("page label at index {} is not a dictionary", start)));
                continue;
            };

            let style = match dict.get("S").and_then(PDFObject::as_name) {
                Some(name) => LabelStyle::from_name(name).unwrap_or_else(|| {
                    messages.push(Message::invalid(format!("unknown page label style /{}", name)));
                    LabelStyle::None
                }),
                None => LabelStyle::None,
            };
            ranges.push(LabelRange {
                start,
                style,
                prefix: dict.get("P").and_then(PDFObject::as_text).unwrap_or_default(),
                first: dict.get("St").and_then(PDFObject::as_int).unwrap_or(1),
            });
        }

        if ranges.first().is_some_and(|r| r.start != 0) {
            messages.push(Message::invalid("page labels do not start at page index 0"));
        }
        Ok((PageLabels { ranges }, messages))
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Label of the page at 0-based `index`, or `None` when the numeric
    /// value does not fit in an `i64`.
    pub fn label(&self, index: usize) -> Option<String> {
        let range = self.ranges.iter().rev().find(|r| r.start <= index)?;
        let offset = i64::try_from(index - range.start).ok()?;
        let n = range.first.checked_add(offset)?;
        Some(format!("{}{}", range.prefix, format_label(range.style, n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Stream;
    use crate::core::xref::{SectionKind, XRefEntry, XRefSection};

    fn xref_with(objects: &[(u32, &str)]) -> XRef {
        let mut data = b"%PDF-1.4\n".to_vec();
        let mut entries = Vec::new();
        for (num, body) in objects {
            entries.push((
                *num,
                XRefEntry::Uncompressed {
                    offset: data.len() as u64,
                    generation: 0,
                },
            ));
            data.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", num, body).as_bytes());
        }
        let size = objects.iter().map(|(n, _)| *n).max().unwrap_or(0) + 1;
        let mut xref = XRef::new(Box::new(Stream::from_bytes(data)));
        xref.merge_section(&XRefSection {
            offset: 0,
            kind: SectionKind::Table,
            trailer: [("Size".to_string(), PDFObject::Number(size as f64))]
                .into_iter()
                .collect(),
            entries,
            free_count: 0,
            nonstandard_records: 0,
        });
        xref
    }

    fn root() -> PDFObject {
        PDFObject::Ref { num: 2, generation: 0 }
    }

    #[test]
    fn test_walk_two_leaf_tree() {
        let mut xref = xref_with(&[
            (2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /MediaBox [0 0 612 792] /Rotate 90 >>"),
            (3, "<< /Type /Page /Parent 2 0 R >>"),
            (4, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 100] /Rotate 0 >>"),
        ]);

        let tree = walk_page_tree(&mut xref, &root(), 100).unwrap();
        assert!(tree.messages.is_empty());
        assert_eq!(tree.pages.len(), 2);

        let first = &tree.pages[0];
        assert_eq!(first.sequence(), 1);
        assert_eq!(first.index(), 0);
        assert_eq!(first.reference(), Some((3, 0)));
        assert_eq!(first.rotate(), Some(90));
        assert_eq!(
            first.media_box().and_then(PDFObject::as_array).map(|a| a.len()),
            Some(4)
        );

        let second = &tree.pages[1];
        assert_eq!(second.rotate(), Some(0));
        assert_eq!(
            second.media_box().and_then(PDFObject::as_array).and_then(|a| a[2].as_int()),
            Some(100)
        );
        assert_eq!(tree.sequence_of(4), Some(2));
    }

    #[test]
    fn test_cycle_reported_once() {
        let mut xref = xref_with(&[
            (2, "<< /Type /Pages /Kids [3 0 R 5 0 R] /Count 1 >>"),
            (3, "<< /Type /Page >>"),
            (5, "<< /Type /Pages /Kids [2 0 R 5 0 R] /Count 0 >>"),
        ]);

        let tree = walk_page_tree(&mut xref, &root(), 100).unwrap();
        assert_eq!(tree.pages.len(), 1);
        let cycles = tree.messages.iter().filter(|m| m.text.contains("cycle")).count();
        assert_eq!(cycles, 1);
    }

    #[test]
    fn test_count_mismatch_and_missing_type() {
        let mut xref = xref_with(&[
            (2, "<< /Type /Pages /Kids [3 0 R] /Count 3 >>"),
            (3, "<< /Parent 2 0 R >>"),
        ]);

        let tree = walk_page_tree(&mut xref, &root(), 100).unwrap();
        assert_eq!(tree.pages.len(), 1);
        assert!(tree.messages.iter().any(|m| m.text.contains("no /Type")));
        assert!(tree.messages.iter().any(|m| m.text.contains("/Count is 3")));
    }

    #[test]
    fn test_depth_ceiling() {
        let mut xref = xref_with(&[
            (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
            (3, "<< /Type /Pages /Kids [4 0 R] /Count 1 >>"),
            (4, "<< /Type /Page >>"),
        ]);

        assert!(matches!(
            walk_page_tree(&mut xref, &root(), 1),
            Err(PDFError::RecursionLimit { .. })
        ));
    }

    #[test]
    fn test_format_label() {
        assert_eq!(format_label(LabelStyle::Decimal, 7), "7");
        assert_eq!(format_label(LabelStyle::UpperRoman, 1994), "MCMXCIV");
        assert_eq!(format_label(LabelStyle::LowerRoman, 4), "iv");
        assert_eq!(format_label(LabelStyle::UpperAlpha, 28), "BB");
        assert_eq!(format_label(LabelStyle::LowerAlpha, 1), "a");
        assert_eq!(format_label(LabelStyle::None, 3), "");
    }

    #[test]
    fn test_huge_label_values() {
        assert_eq!(format_label(LabelStyle::UpperAlpha, 1_000_000_000_000), "1000000000000");
        assert_eq!(format_label(LabelStyle::LowerRoman, i64::MAX), i64::MAX.to_string());
        assert_eq!(format_label(LabelStyle::UpperRoman, MAX_STYLED_LABEL).len(), 1000);

        let mut xref = xref_with(&[(1, "<< /Nums [0 << /S /D /St 9223372036854775807 >>] >>")]);
        let tree = PDFObject::Ref { num: 1, generation: 0 };
        let (labels, _) = PageLabels::load(&mut xref, &tree, 10).unwrap();
        assert_eq!(labels.label(0), Some(i64::MAX.to_string()));
        assert_eq!(labels.label(1), None);
    }

    #[test]
    fn test_labels_from_number_tree() {
        let mut xref = xref_with(&[(
            1,
            "<< /Nums [0 << /S /r >> 3 << /S /D /P (A-) /St 5 >>] >>",
        )]);
        let tree = PDFObject::Ref { num: 1, generation: 0 };

        let (labels, messages) = PageLabels::load(&mut xref, &tree, 10).unwrap();
        assert!(messages.is_empty());
        assert_eq!(labels.label(0).as_deref(), Some("i"));
        assert_eq!(labels.label(2).as_deref(), Some("iii"));
        assert_eq!(labels.label(3).as_deref(), Some("A-5"));
        assert_eq!(labels.label(4).as_deref(), Some("A-6"));
    }
}
