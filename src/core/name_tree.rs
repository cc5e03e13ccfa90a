//! Name trees and number trees.
//!
//! Both are balanced trees whose intermediate nodes carry /Kids with /Limits
//! ranges and whose leaves carry sorted key/value arrays (/Names or /Nums).

use super::error::{PDFError, PDFResult};
use super::parser::PDFObject;
use super::xref::XRef;
use rustc_hash::FxHashSet;
use std::cmp::Ordering;

/// Key type of a tree: byte strings for name trees, integers for number trees.
pub trait TreeKey: Ord + Clone {
    /// Leaf array entry holding alternating keys and values
    const LEAF_KEY: &'static str;

    fn from_object(obj: &PDFObject) -> Option<Self>;
}

impl TreeKey for Vec<u8> {
    const LEAF_KEY: &'static str = "Names";

    fn from_object(obj: &PDFObject) -> Option<Self> {
        match obj {
            PDFObject::String(s) | PDFObject::HexString(s) => Some(s.clone()),
            // Tolerated in place of strings by most readers
            PDFObject::Name(n) => Some(n.as_bytes().to_vec()),
            _ => None,
        }
    }
}

impl TreeKey for i64 {
    const LEAF_KEY: &'static str = "Nums";

    fn from_object(obj: &PDFObject) -> Option<Self> {
        obj.as_int()
    }
}

fn leaf_pairs<K: TreeKey>(items: &[PDFObject]) -> Vec<(K, &PDFObject)> {
    items
        .chunks_exact(2)
        .filter_map(|pair| K::from_object(&pair[0]).map(|key| (key, &pair[1])))
        .collect()
}

fn limits<K: TreeKey>(node: &PDFObject) -> Option<(K, K)> {
    let limits = node.get("Limits")?.as_array()?;
    match limits {
        [lo, hi] => Some((K::from_object(lo)?, K::from_object(hi)?)),
        _ => None,
    }
}

struct TreeWalk<'a> {
    xref: &'a mut XRef,
    max_depth: usize,
    visited: FxHashSet<u32>,
}

impl TreeWalk<'_> {
    fn enter(&mut self, num: Option<u32>, depth: usize) -> PDFResult<bool> {
        if depth > self.max_depth {
            return Err(PDFError::RecursionLimit {
                limit: self.max_depth,
                context: "walking a name or number tree",
            });
        }
        Ok(num.is_none_or(|num| self.visited.insert(num)))
    }

    fn lookup<K: TreeKey>(
        &mut self,
        node: &PDFObject,
        num: Option<u32>,
        key: &K,
        depth: usize,
    ) -> PDFResult<Option<PDFObject>> {
        if !self.enter(num, depth)? {
            return Ok(None);
        }

        if let Some(leaf) = node.get(K::LEAF_KEY) {
            let leaf = self.xref.fetch_if_ref(leaf)?;
            let pairs = leaf_pairs::<K>(leaf.as_array().unwrap_or(&[]));
            let found = match pairs.binary_search_by(|(k, _)| k.cmp(key)) {
                Ok(idx) => Some(pairs[idx].1),
                // Unsorted leaves still get a linear pass
                Err(_) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| *v),
            };
            return Ok(found.cloned());
        }

        let Some(kids) = node.get("Kids") else {
            return Ok(None);
        };
        let kids = self.xref.fetch_if_ref(kids)?;
        for kid in kids.as_array().unwrap_or(&[]) {
            let (kid, kid_num) = self.xref.fetch_with_num(kid)?;
            if let Some((lo, hi)) = limits::<K>(&kid) {
                if key.cmp(&lo) == Ordering::Less || key.cmp(&hi) == Ordering::Greater {
                    continue;
                }
            }
            if let Some(found) = self.lookup(&kid, kid_num, key, depth + 1)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn collect<K: TreeKey>(
        &mut self,
        node: &PDFObject,
        num: Option<u32>,
        depth: usize,
        out: &mut Vec<(K, PDFObject)>,
    ) -> PDFResult<()> {
        if !self.enter(num, depth)? {
            return Ok(());
        }

        if let Some(leaf) = node.get(K::LEAF_KEY) {
            let leaf = self.xref.fetch_if_ref(leaf)?;
            out.extend(
                leaf_pairs::<K>(leaf.as_array().unwrap_or(&[]))
                    .into_iter()
                    .map(|(k, v)| (k, v.clone())),
            );
        }
        if let Some(kids) = node.get("Kids") {
            let kids = self.xref.fetch_if_ref(kids)?;
            for kid in kids.as_array().unwrap_or(&[]) {
                let (kid, kid_num) = self.xref.fetch_with_num(kid)?;
                self.collect(&kid, kid_num, depth + 1, out)?;
            }
        }
        Ok(())
    }
}

/// Looks up `key` in the tree rooted at `root`, descending only into kids
/// whose /Limits contain it.
pub fn lookup<K: TreeKey>(
    xref: &mut XRef,
    root: &PDFObject,
    key: &K,
    max_depth: usize,
) -> PDFResult<Option<PDFObject>> {
    let (node, num) = xref.fetch_with_num(root)?;
    let mut walk = TreeWalk {
        xref,
        max_depth,
        visited: FxHashSet::default(),
    };
    walk.lookup(&node, num, key, 0)
}

/// Collects every entry of the tree rooted at `root`, sorted by key.
pub fn collect<K: TreeKey>(
    xref: &mut XRef,
    root: &PDFObject,
    max_depth: usize,
) -> PDFResult<Vec<(K, PDFObject)>> {
    let (node, num) = xref.fetch_with_num(root)?;
    let mut walk = TreeWalk {
        xref,
        max_depth,
        visited: FxHashSet::default(),
    };
    let mut out = Vec::new();
    walk.collect::<K>(&node, num, 0, &mut out)?;
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Stream;
    use crate::core::xref::{SectionKind, XRefEntry, XRefSection};

    /// Builds an xref over numbered object bodies laid out after a header.
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

    fn tree_xref() -> XRef {
        xref_with(&[
            (1, "<< /Kids [2 0 R 3 0 R] >>"),
            (2, "<< /Limits [(alpha) (beta)] /Names [(alpha) 10 (beta) 11] >>"),
            (3, "<< /Limits [(gamma) (zeta)] /Names [(gamma) 12 (zeta) 13] >>"),
        ])
    }

    #[test]
    fn test_lookup_descends_by_limits() {
        let mut xref = tree_xref();
        let root = PDFObject::Ref { num: 1, generation: 0 };

        let found = lookup(&mut xref, &root, &b"gamma".to_vec(), 10).unwrap();
        assert_eq!(found, Some(PDFObject::Number(12.0)));
        let missing = lookup(&mut xref, &root, &b"delta".to_vec(), 10).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_collect_name_tree() {
        let mut xref = tree_xref();
        let root = PDFObject::Ref { num: 1, generation: 0 };

        let all = collect::<Vec<u8>>(&mut xref, &root, 10).unwrap();
        let keys: Vec<&[u8]> = all.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![&b"alpha"[..], b"beta", b"gamma", b"zeta"]);
    }

    #[test]
    fn test_number_tree() {
        let mut xref = xref_with(&[(1, "<< /Nums [0 (a) 4 (b)] >>")]);
        let root = PDFObject::Ref { num: 1, generation: 0 };

        let all = collect::<i64>(&mut xref, &root, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].0, 4);
        assert_eq!(
            lookup(&mut xref, &root, &4i64, 10).unwrap(),
            Some(PDFObject::String(b"b".to_vec()))
        );
    }

    #[test]
    fn test_cyclic_kids_terminate() {
        let mut xref = xref_with(&[
            (1, "<< /Kids [2 0 R] >>"),
            (2, "<< /Kids [1 0 R] >>"),
        ]);
        let root = PDFObject::Ref { num: 1, generation: 0 };

        assert!(collect::<Vec<u8>>(&mut xref, &root, 10).unwrap().is_empty());
        assert_eq!(lookup(&mut xref, &root, &b"x".to_vec(), 10).unwrap(), None);
    }

    #[test]
    fn test_depth_limit() {
        let mut xref = xref_with(&[
            (1, "<< /Kids [2 0 R] >>"),
            (2, "<< /Kids [3 0 R] >>"),
            (3, "<< /Names [(a) 1] >>"),
        ]);
        let root = PDFObject::Ref { num: 1, generation: 0 };

        assert!(matches!(
            collect::<Vec<u8>>(&mut xref, &root, 1),
            Err(PDFError::RecursionLimit { .. })
        ));
    }
}
