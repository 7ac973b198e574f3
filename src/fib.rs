use log::{debug, info};

use crate::{
    face::FaceId,
    name::{Name, NameComponent},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NextHop {
    face: FaceId,
    cost: u64,
}

impl NextHop {
    pub fn face(&self) -> FaceId {
        self.face
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FibEntry {
    prefix: Name,
    // Ordered by cost, ties keep the order in which hops were added
    next_hops: Vec<NextHop>,
}

impl FibEntry {
    fn new(prefix: Name) -> Self {
        Self {
            prefix,
            next_hops: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &Name {
        &self.prefix
    }

    pub fn next_hops(&self) -> &[NextHop] {
        &self.next_hops
    }

    pub fn has_next_hops(&self) -> bool {
        !self.next_hops.is_empty()
    }

    pub fn has_next_hop(&self, face: FaceId) -> bool {
        self.next_hops.iter().any(|hop| hop.face == face)
    }

    /// Adds the face, or updates its cost if it is already a next hop.
    pub fn add_next_hop(&mut self, face: FaceId, cost: u64) {
        if let Some(hop) = self.next_hops.iter_mut().find(|hop| hop.face == face) {
            hop.cost = cost;
        } else {
            self.next_hops.push(NextHop { face, cost });
        }
        self.sort_next_hops();
    }

    pub fn remove_next_hop(&mut self, face: FaceId) {
        self.next_hops.retain(|hop| hop.face != face);
    }

    fn sort_next_hops(&mut self) {
        // Stable, so equal costs stay in insertion order
        self.next_hops.sort_by_key(|hop| hop.cost);
    }
}

#[derive(Default)]
struct FibNode {
    entry: Option<FibEntry>,
    // Ordered by NameComponent
    children: Vec<(NameComponent, FibNode)>,
}

impl FibNode {
    fn find_child(&self, component: &NameComponent) -> Option<usize> {
        self.children
            .binary_search_by(|(c, _)| c.cmp(component))
            .ok()
    }

    fn get_child(&self, component: &NameComponent) -> Option<&FibNode> {
        let idx = self.find_child(component)?;
        Some(&self.children[idx].1)
    }

    fn get_child_mut(&mut self, component: &NameComponent) -> Option<&mut FibNode> {
        let idx = self.find_child(component)?;
        Some(&mut self.children[idx].1)
    }

    fn get_or_insert_child(&mut self, component: &NameComponent) -> &mut FibNode {
        let idx = match self
            .children
            .binary_search_by(|(c, _)| c.cmp(component))
        {
            Ok(idx) => idx,
            Err(idx) => {
                self.children
                    .insert(idx, (component.clone(), FibNode::default()));
                idx
            }
        };
        &mut self.children[idx].1
    }

    fn erase(&mut self, remaining_components: &[NameComponent]) -> bool {
        match remaining_components.split_first() {
            None => self.entry.take().is_some(),
            Some((component, rest)) => {
                let idx = match self.find_child(component) {
                    Some(idx) => idx,
                    None => return false,
                };
                let erased = self.children[idx].1.erase(rest);
                if self.children[idx].1.is_empty() {
                    self.children.remove(idx);
                }
                erased
            }
        }
    }

    fn remove_face(&mut self, face: FaceId, erased_entries: &mut usize) -> usize {
        let mut removed = 0;
        if let Some(entry) = self.entry.as_mut() {
            if entry.has_next_hop(face) {
                entry.remove_next_hop(face);
                removed += 1;
                if !entry.has_next_hops() {
                    self.entry = None;
                    *erased_entries += 1;
                }
            }
        }

        for (_, child) in self.children.iter_mut() {
            removed += child.remove_face(face, erased_entries);
        }

        // Then we only keep the children that are not empty
        self.children.retain(|(_, child)| !child.is_empty());
        removed
    }

    fn collect<'a>(&'a self, entries: &mut Vec<&'a FibEntry>) {
        if let Some(entry) = &self.entry {
            entries.push(entry);
        }
        for (_, child) in self.children.iter() {
            child.collect(entries);
        }
    }

    fn is_empty(&self) -> bool {
        self.entry.is_none() && self.children.is_empty()
    }
}

/// Maps name prefixes to next hops, as a trie over name components.
#[derive(Default)]
pub struct Fib {
    root: FibNode,
    len: usize,
}

impl Fib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `prefix`, creating an empty one if needed.
    pub fn insert(&mut self, prefix: &Name) -> &mut FibEntry {
        let mut node = &mut self.root;
        for component in prefix.components() {
            node = node.get_or_insert_child(component);
        }
        if node.entry.is_none() {
            debug!("Creating FIB entry {}", prefix);
            self.len += 1;
        }
        node.entry.get_or_insert_with(|| FibEntry::new(prefix.clone()))
    }

    pub fn find_exact_match(&self, prefix: &Name) -> Option<&FibEntry> {
        let mut node = &self.root;
        for component in prefix.components() {
            node = node.get_child(component)?;
        }
        node.entry.as_ref()
    }

    pub fn find_exact_match_mut(&mut self, prefix: &Name) -> Option<&mut FibEntry> {
        let mut node = &mut self.root;
        for component in prefix.components() {
            node = node.get_child_mut(component)?;
        }
        node.entry.as_mut()
    }

    /// Finds the entry with the longest prefix of `name`.
    ///
    /// An entry counts even when it has no next hops; telling "no route" apart
    ///  from "no entry" is up to the caller.
    pub fn find_longest_prefix_match(&self, name: &Name) -> Option<&FibEntry> {
        let mut node = &self.root;
        let mut best = node.entry.as_ref();
        for component in name.components() {
            match node.get_child(component) {
                Some(child) => {
                    node = child;
                    if child.entry.is_some() {
                        best = child.entry.as_ref();
                    }
                }
                None => break,
            }
        }

        debug!(
            "FIB lookup for {}: {}",
            name,
            match best {
                Some(entry) => entry.prefix.to_string(),
                None => "no match".to_string(),
            }
        );
        best
    }

    pub fn erase(&mut self, prefix: &Name) -> bool {
        let erased = self.root.erase(prefix.components().as_slice());
        if erased {
            info!("Erased FIB entry {}", prefix);
            self.len -= 1;
        }
        erased
    }

    pub fn add_next_hop(&mut self, prefix: &Name, face: FaceId, cost: u64) {
        info!("Route {} via face {} with cost {}", prefix, face, cost);
        self.insert(prefix).add_next_hop(face, cost);
    }

    /// Removes one next hop, erasing the entry if nothing else is left in it.
    pub fn remove_next_hop(&mut self, prefix: &Name, face: FaceId) -> bool {
        let (removed, now_empty) = match self.find_exact_match_mut(prefix) {
            Some(entry) => {
                let removed = entry.has_next_hop(face);
                entry.remove_next_hop(face);
                (removed, !entry.has_next_hops())
            }
            None => return false,
        };
        if removed {
            info!("Removed route {} via face {}", prefix, face);
        }
        if now_empty {
            self.erase(prefix);
        }
        removed
    }

    /// Drops the face from every entry, returning how many entries referred to it.
    pub fn remove_next_hop_from_all_entries(&mut self, face: FaceId) -> usize {
        let mut erased_entries = 0;
        let removed = self.root.remove_face(face, &mut erased_entries);
        self.len -= erased_entries;
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &FibEntry> {
        let mut entries = Vec::with_capacity(self.len);
        self.root.collect(&mut entries);
        entries.into_iter()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        uri.parse().unwrap()
    }

    #[test]
    fn test_longest_prefix_match() {
        let mut fib = Fib::new();
        fib.add_next_hop(&name("/a"), FaceId(1), 0);
        fib.add_next_hop(&name("/a/b"), FaceId(2), 0);

        let entry = fib.find_longest_prefix_match(&name("/a/b/c")).unwrap();
        assert_eq!(entry.prefix(), &name("/a/b"));

        let entry = fib.find_longest_prefix_match(&name("/a/c")).unwrap();
        assert_eq!(entry.prefix(), &name("/a"));

        assert!(fib.find_longest_prefix_match(&name("/b")).is_none());

        // The default route catches the rest
        fib.add_next_hop(&name("/"), FaceId(3), 0);
        let entry = fib.find_longest_prefix_match(&name("/b")).unwrap();
        assert_eq!(entry.prefix(), &name("/"));
        assert_eq!(fib.len(), 3);
    }

    #[test]
    fn test_entries_without_next_hops_still_match() {
        let mut fib = Fib::new();
        fib.add_next_hop(&name("/a"), FaceId(1), 0);
        fib.insert(&name("/a/b"));

        let entry = fib.find_longest_prefix_match(&name("/a/b/c")).unwrap();
        assert_eq!(entry.prefix(), &name("/a/b"));
        assert!(!entry.has_next_hops());
    }

    #[test]
    fn test_next_hops_are_sorted() {
        let mut fib = Fib::new();
        let entry = fib.insert(&name("/a"));
        entry.add_next_hop(FaceId(1), 10);
        entry.add_next_hop(FaceId(2), 5);
        entry.add_next_hop(FaceId(3), 7);
        entry.add_next_hop(FaceId(4), 5);

        let faces: Vec<u64> = entry.next_hops().iter().map(|h| h.face().get()).collect();
        assert_eq!(faces, vec![2, 4, 3, 1]);

        // Re-costing updates in place
        entry.add_next_hop(FaceId(1), 1);
        assert_eq!(entry.next_hops().len(), 4);
        assert_eq!(entry.next_hops()[0], NextHop { face: FaceId(1), cost: 1 });
        assert!(entry
            .next_hops()
            .windows(2)
            .all(|w| w[0].cost() <= w[1].cost()));
    }

    #[test]
    fn test_remove_next_hop() {
        let mut fib = Fib::new();
        let entry = fib.insert(&name("/a"));
        entry.add_next_hop(FaceId(1), 10);
        entry.add_next_hop(FaceId(2), 5);

        // Removing an absent face is a no-op
        entry.remove_next_hop(FaceId(9));
        assert_eq!(entry.next_hops().len(), 2);
        assert!(entry.has_next_hop(FaceId(1)));

        assert!(fib.remove_next_hop(&name("/a"), FaceId(1)));
        assert!(!fib.remove_next_hop(&name("/a"), FaceId(1)));
        assert_eq!(fib.len(), 1);

        // The last hop takes the entry with it
        assert!(fib.remove_next_hop(&name("/a"), FaceId(2)));
        assert!(fib.find_exact_match(&name("/a")).is_none());
        assert!(fib.is_empty());
        assert!(!fib.remove_next_hop(&name("/b"), FaceId(2)));
    }

    #[test]
    fn test_erase_keeps_descendants() {
        let mut fib = Fib::new();
        fib.add_next_hop(&name("/a"), FaceId(1), 0);
        fib.add_next_hop(&name("/a/b/c"), FaceId(1), 0);

        assert!(fib.erase(&name("/a")));
        assert!(!fib.erase(&name("/a")));
        assert!(!fib.erase(&name("/a/b")));
        assert_eq!(fib.len(), 1);
        assert_eq!(
            fib.find_longest_prefix_match(&name("/a/b/c/d"))
                .unwrap()
                .prefix(),
            &name("/a/b/c")
        );
        assert!(fib.find_longest_prefix_match(&name("/a/b")).is_none());
    }

    #[test]
    fn test_remove_face_from_all_entries() {
        let mut fib = Fib::new();
        fib.add_next_hop(&name("/a"), FaceId(1), 0);
        fib.add_next_hop(&name("/a"), FaceId(2), 0);
        fib.add_next_hop(&name("/a/b"), FaceId(1), 0);
        fib.add_next_hop(&name("/c"), FaceId(2), 0);

        assert_eq!(fib.remove_next_hop_from_all_entries(FaceId(1)), 2);
        assert_eq!(fib.len(), 2);
        assert!(fib.find_exact_match(&name("/a/b")).is_none());
        assert!(fib.iter().all(|e| !e.has_next_hop(FaceId(1))));

        let prefixes: Vec<String> = fib.iter().map(|e| e.prefix().to_string()).collect();
        assert_eq!(prefixes, vec!["/a", "/c"]);
    }
}
