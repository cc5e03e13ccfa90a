//! Document outline (bookmark) traversal and destination resolution.
//!
//! Outline items are walked through their /First and /Next links with an
//! explicit stack. A visited set of object numbers guards against cycles; the
//! first repeat is reported once and the repeated branch dropped.

use super::error::PDFResult;
use super::name_tree;
use super::page::PageTree;
use super::parser::{Dict, PDFObject};
use super::report::{Message, Severity};
use super::xref::XRef;
use rustc_hash::FxHashSet;
use std::fmt;

/// Where an outline item or link leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// 1-based page sequence number
    Page(usize),
    /// Another document, a URI, or a target that could not be resolved
    External,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Page(seq) => write!(f, "{}", seq),
            Destination::External => write!(f, "external"),
        }
    }
}

/// Resolves destinations against the page tree and the named-destination
/// tables (/Names /Dests tree and the legacy catalog /Dests dictionary).
pub struct DestinationResolver<'a> {
    pages: &'a PageTree,
    names_tree: Option<PDFObject>,
    legacy_dests: Option<Dict>,
    max_depth: usize,
}

impl<'a> DestinationResolver<'a> {
    pub fn new(
        xref: &mut XRef,
        catalog: &Dict,
        pages: &'a PageTree,
        max_depth: usize,
    ) -> PDFResult<Self> {
        let names_tree = match catalog.get("Names") {
            Some(names) => xref.fetch_dict(names)?.and_then(|names| names.get("Dests").cloned()),
            None => None,
        };
        let legacy_dests = match catalog.get("Dests") {
            Some(dests) => xref.fetch_dict(dests)?,
            None => None,
        };
        Ok(DestinationResolver {
            pages,
            names_tree,
            legacy_dests,
            max_depth,
        })
    }

    /// Resolves a /Dest value: an explicit array, a named string, a name, or
    /// a dictionary wrapping one of those in /D.
    pub fn resolve(&self, xref: &mut XRef, dest: &PDFObject) -> PDFResult<Destination> {
        self.resolve_inner(xref, dest, true)
    }

    fn resolve_inner(&self, xref: &mut XRef, dest: &PDFObject, follow_names: bool) -> PDFResult<Destination> {
        let dest = xref.fetch_if_ref(dest)?;
        match &dest {
            PDFObject::Array(items) => Ok(match items.first() {
                Some(PDFObject::Ref { num, .. }) => self
                    .pages
                    .sequence_of(*num)
                    .map_or(Destination::External, Destination::Page),
                _ => Destination::External,
            }),
            PDFObject::Dictionary(dict) => match dict.get("D") {
                Some(inner) => self.resolve_inner(xref, inner, follow_names),
                None => Ok(Destination::External),
            },
            PDFObject::String(key) | PDFObject::HexString(key) if follow_names => {
                let target = match &self.names_tree {
                    Some(tree) => name_tree::lookup(xref, tree, key, self.max_depth)?,
                    None => None,
                };
                match target {
                    Some(target) => self.resolve_inner(xref, &target, false),
                    None => Ok(Destination::External),
                }
            }
            PDFObject::Name(name) if follow_names => {
                match self.legacy_dests.as_ref().and_then(|d| d.get(name)).cloned() {
                    Some(target) => self.resolve_inner(xref, &target, false),
                    None => Ok(Destination::External),
                }
            }
            _ => Ok(Destination::External),
        }
    }

    /// Destination of an outline item or link annotation: /Dest, or the /D of
    /// a GoTo action. Other actions lead outside the document.
    pub fn item_destination(&self, xref: &mut XRef, item: &Dict) -> PDFResult<Option<Destination>> {
        if let Some(dest) = item.get("Dest") {
            return self.resolve(xref, dest).map(Some);
        }
        let Some(action) = item.get("A") else {
            return Ok(None);
        };
        let Some(action) = xref.fetch_dict(action)? else {
            return Ok(None);
        };
        match (action.get("S").and_then(PDFObject::as_name), action.get("D")) {
            (Some("GoTo"), Some(dest)) => self.resolve(xref, dest).map(Some),
            _ => Ok(Some(Destination::External)),
        }
    }
}

/// A single outline item (bookmark).
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineItem {
    /// The title text displayed for this bookmark
    pub title: String,
    pub destination: Option<Destination>,
    /// Nesting level, 0 for top-level items
    pub depth: usize,
    pub object_num: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct Outline {
    /// Items in document order (pre-order)
    pub items: Vec<OutlineItem>,
    pub messages: Vec<Message>,
}

/// Walks the outline tree rooted at the catalog's /Outlines dictionary.
pub fn walk_outline(
    xref: &mut XRef,
    outlines: &Dict,
    resolver: &DestinationResolver<'_>,
    max_depth: usize,
) -> PDFResult<Outline> {
    let mut outline = Outline::default();
    let Some(first) = outlines.get("First") else {
        return Ok(outline);
    };

    let mut visited: FxHashSet<u32> = FxHashSet::default();
    let mut cycle_reported = false;
    let mut depth_reported = false;
    let mut stack: Vec<(PDFObject, usize)> = vec![(first.clone(), 0)];

    while let Some((node, depth)) = stack.pop() {
        if let Some((num, _)) = node.as_ref() {
            if !visited.insert(num) {
                if !cycle_reported {
                    cycle_reported = true;
                    outline.messages.push(Message::info(format!(
                        "outline cycle: object {} reached twice; outline truncated",
                        num
                    )));
                }
                continue;
            }
        }
        if depth > max_depth {
            if !depth_reported {
                depth_reported = true;
                outline.messages.push(Message::info(format!(
                    "outline deeper than {} levels; outline truncated",
                    max_depth
                )));
            }
            continue;
        }

        let (value, object_num) = xref.fetch_with_num(&node)?;
        let Some(dict) = value.as_dict() else {
            outline.messages.push(Message::invalid(format!(
                "outline item is a {}, not a dictionary",
                value.type_name()
            )));
            continue;
        };

        let title = match dict.get("Title") {
            Some(title) => xref.fetch_if_ref(title)?.as_text(),
            None => None,
        };
        let title = title.unwrap_or_else(|| {
            outline.messages.push(Message::invalid(match object_num {
                Some(num) => format!("outline item {} has no /Title", num),
                None => "outline item has no /Title".to_string(),
            }));
            String::new()
        });

        let destination = match resolver.item_destination(xref, dict) {
            Ok(destination) => destination,
            Err(err) => {
                outline
                    .messages
                    .push(Message::from_error(Severity::Invalid, "outline destination", &err));
                Some(Destination::External)
            }
        };

        outline.items.push(OutlineItem {
            title,
            destination,
            depth,
            object_num,
        });

        // Next is pushed first so children come out ahead of siblings
        if let Some(next) = dict.get("Next") {
            stack.push((next.clone(), depth));
        }
        if let Some(child) = dict.get("First") {
            stack.push((child.clone(), depth + 1));
        }
    }

    log::debug!("outline: {} item(s)", outline.items.len());
    Ok(outline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Stream;
    use crate::core::page::walk_page_tree;
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

    const PAGES: &[(u32, &str)] = &[
        (2, "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>"),
        (3, "<< /Type /Page >>"),
        (4, "<< /Type /Page >>"),
    ];

    fn run(extra: &[(u32, &str)], catalog: &str) -> Outline {
        let mut objects = PAGES.to_vec();
        objects.extend_from_slice(extra);
        objects.push((1, catalog));
        let mut xref = xref_with(&objects);

        let catalog = xref
            .fetch_dict(&PDFObject::Ref { num: 1, generation: 0 })
            .unwrap()
            .unwrap();
        let pages = walk_page_tree(&mut xref, &PDFObject::Ref { num: 2, generation: 0 }, 100).unwrap();
        let resolver = DestinationResolver::new(&mut xref, &catalog, &pages, 100).unwrap();
        let outlines = xref.fetch_dict(catalog.get("Outlines").unwrap()).unwrap().unwrap();
        walk_outline(&mut xref, &outlines, &resolver, 100).unwrap()
    }

    #[test]
    fn test_outline_order_and_destinations() {
        let outline = run(
            &[
                (10, "<< /First 11 0 R /Count 3 >>"),
                (11, "<< /Title (Intro) /Dest [3 0 R /Fit] /Next 12 0 R /First 13 0 R >>"),
                (12, "<< /Title (Web) /A << /S /URI /URI (http://x) >> >>"),
                (13, "<< /Title (Named) /Dest (chap2) >>"),
                (14, "<< /Names [(chap2) [4 0 R /XYZ 0 0 0]] >>"),
            ],
            "<< /Type /Catalog /Pages 2 0 R /Outlines 10 0 R /Names << /Dests 14 0 R >> >>",
        );

        assert!(outline.messages.is_empty());
        let titles: Vec<&str> = outline.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Intro", "Named", "Web"]);
        assert_eq!(outline.items[0].destination, Some(Destination::Page(1)));
        assert_eq!(outline.items[1].destination, Some(Destination::Page(2)));
        assert_eq!(outline.items[1].depth, 1);
        assert_eq!(outline.items[2].destination, Some(Destination::External));
    }

    #[test]
    fn test_legacy_dests_and_goto() {
        let outline = run(
            &[
                (10, "<< /First 11 0 R >>"),
                (11, "<< /Title (Legacy) /Dest /Second /Next 12 0 R >>"),
                (12, "<< /Title (GoTo) /A << /S /GoTo /D [3 0 R /Fit] >> /Next 13 0 R >>"),
                (13, "<< /Title (Missing) /Dest (nowhere) >>"),
                (15, "<< /Second << /D [4 0 R /Fit] >> >>"),
            ],
            "<< /Type /Catalog /Pages 2 0 R /Outlines 10 0 R /Dests 15 0 R >>",
        );

        let dests: Vec<_> = outline.items.iter().map(|i| i.destination).collect();
        assert_eq!(
            dests,
            vec![
                Some(Destination::Page(2)),
                Some(Destination::Page(1)),
                Some(Destination::External)
            ]
        );
    }

    #[test]
    fn test_cycle_warns_once() {
        let outline = run(
            &[
                (10, "<< /First 11 0 R >>"),
                (11, "<< /Title (A) /Next 12 0 R /First 11 0 R >>"),
                (12, "<< /Title (B) /Next 11 0 R >>"),
            ],
            "<< /Type /Catalog /Pages 2 0 R /Outlines 10 0 R >>",
        );

        assert_eq!(outline.items.len(), 2);
        assert_eq!(outline.messages.len(), 1);
        assert_eq!(outline.messages[0].severity, Severity::Info);
        assert_eq!(Destination::External.to_string(), "external");
    }
}
