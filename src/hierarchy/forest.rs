//! Read-side reconstruction of the association forest.
//!
//! Only `parent_id` links are followed; the materialized path is never read,
//! which makes the built forest an independent check of the write side.
//!
//! Nodes live in one arena in depth-first pre-order, so no operation here
//! recurses, however deep the forest.

use std::io::Write;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{Association, Club};
use crate::storage::{self, AssociationFilter, ClubFilter, RecordStore};
use crate::types::{AssociationId, ClubId};

/// One linked association with its club leaves.
#[derive(Clone, Debug)]
pub struct ForestNode {
    /// The association record.
    pub association: Association,
    /// Clubs attached to this association.
    pub clubs: Vec<Club>,
    parent: Option<usize>,
    children: Vec<usize>,
    depth: usize,
    subtree_size: usize,
    subtree_clubs: usize,
}

impl ForestNode {
    /// Distance from the root of its tree; roots are at 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of direct child associations.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Number of associations in this subtree, including this one.
    pub fn subtree_size(&self) -> usize {
        self.subtree_size
    }

    /// Number of clubs in this subtree.
    pub fn subtree_clubs(&self) -> usize {
        self.subtree_clubs
    }
}

/// Fully linked forest built from flat records.
#[derive(Clone, Debug, Default)]
pub struct Forest {
    nodes: Vec<ForestNode>,
    roots: Vec<usize>,
    positions: FxHashMap<AssociationId, usize>,
    /// Clubs without id or whose parent could not be resolved.
    pub orphan_clubs: Vec<ClubId>,
    /// Associations unreachable from any root (their `parent_id` links form a cycle).
    pub detached: Vec<AssociationId>,
}

impl Forest {
    /// Loads every association and club and links them.
    pub fn load(store: &dyn RecordStore) -> storage::Result<Self> {
        let associations = store.find_associations(&AssociationFilter::all())?;
        let clubs = store.find_clubs(&ClubFilter::all())?;
        Ok(Self::build(associations, clubs))
    }

    /// Links already loaded records in O(associations + clubs).
    pub fn build(associations: Vec<Association>, clubs: Vec<Club>) -> Self {
        let mut index: FxHashMap<AssociationId, usize> = FxHashMap::default();
        index.reserve(associations.len());
        for (slot, association) in associations.iter().enumerate() {
            if index.insert(association.id.clone(), slot).is_some() {
                warn!(association = %association.id, "duplicate association id while building forest");
            }
        }

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); associations.len()];
        let mut root_slots = Vec::new();
        for (slot, association) in associations.iter().enumerate() {
            match association.parent_id.as_ref().and_then(|parent| index.get(parent)) {
                Some(&parent) => children[parent].push(slot),
                None => root_slots.push(slot),
            }
        }

        let mut leaves: Vec<Vec<Club>> = vec![Vec::new(); associations.len()];
        let mut orphan_clubs = Vec::new();
        for club in clubs {
            if club.id.is_blank() {
                warn!(parent = %club.parent_id, "club without id skipped");
                orphan_clubs.push(club.id);
                continue;
            }
            match index.get(&club.parent_id) {
                Some(&parent) => leaves[parent].push(club),
                None => {
                    debug!(club = %club.id, parent = %club.parent_id, "orphaned club");
                    orphan_clubs.push(club.id);
                }
            }
        }

        let mut slots: Vec<Option<Association>> = associations.into_iter().map(Some).collect();
        let mut nodes: Vec<ForestNode> = Vec::with_capacity(slots.len());
        let mut positions = FxHashMap::default();
        positions.reserve(slots.len());
        let mut roots = Vec::with_capacity(root_slots.len());
        let mut pending: Vec<(usize, Option<usize>, usize)> =
            root_slots.iter().rev().map(|&slot| (slot, None, 0)).collect();
        while let Some((slot, parent, depth)) = pending.pop() {
            let Some(association) = slots[slot].take() else {
                continue;
            };
            let position = nodes.len();
            match parent {
                Some(parent) => nodes[parent].children.push(position),
                None => roots.push(position),
            }
            positions.insert(association.id.clone(), position);
            let clubs = std::mem::take(&mut leaves[slot]);
            nodes.push(ForestNode {
                association,
                subtree_clubs: clubs.len(),
                clubs,
                parent,
                children: Vec::with_capacity(children[slot].len()),
                depth,
                subtree_size: 1,
            });
            pending.extend(
                children[slot]
                    .iter()
                    .rev()
                    .map(|&child| (child, Some(position), depth + 1)),
            );
        }

        // pre-order puts every child after its parent
        for position in (0..nodes.len()).rev() {
            let node = &nodes[position];
            let (parent, size, clubs) = (node.parent, node.subtree_size, node.subtree_clubs);
            if let Some(parent) = parent {
                nodes[parent].subtree_size += size;
                nodes[parent].subtree_clubs += clubs;
            }
        }

        let detached: Vec<AssociationId> = slots
            .into_iter()
            .flatten()
            .map(|association| association.id)
            .collect();
        if !detached.is_empty() {
            warn!(count = detached.len(), "associations unreachable from any root");
        }

        Self {
            nodes,
            roots,
            positions,
            orphan_clubs,
            detached,
        }
    }

    /// Root nodes in storage order.
    pub fn roots(&self) -> impl Iterator<Item = &ForestNode> + '_ {
        self.roots.iter().map(|&position| &self.nodes[position])
    }

    /// Number of trees in the forest.
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Direct children of `node` in storage order.
    pub fn children_of<'a>(&'a self, node: &'a ForestNode) -> impl Iterator<Item = &'a ForestNode> + 'a {
        node.children.iter().map(|&position| &self.nodes[position])
    }

    /// Number of linked associations.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of attached clubs.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().map(|node| node.clubs.len()).sum()
    }

    /// Looks up a linked association.
    pub fn find(&self, id: &AssociationId) -> Option<&ForestNode> {
        self.positions.get(id).map(|&position| &self.nodes[position])
    }

    /// Ancestor ids of `id` as linked in this forest, root first.
    pub fn ancestors_of(&self, id: &AssociationId) -> Option<Vec<AssociationId>> {
        let node = self.find(id)?;
        let mut ancestors = Vec::with_capacity(node.depth);
        let mut cursor = node.parent;
        while let Some(position) = cursor {
            let parent = &self.nodes[position];
            ancestors.push(parent.association.id.clone());
            cursor = parent.parent;
        }
        ancestors.reverse();
        Some(ancestors)
    }

    /// Depth-first, pre-order traversal yielding `(depth, node)`.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            nodes: self.nodes.iter(),
        }
    }

    /// Writes the forest as nested JSON:
    /// `{"roots":[{"association":..,"clubs":[..],"children":[..]}],"orphan_clubs":[..],"detached":[..]}`.
    pub fn write_json<W: Write>(&self, writer: W, pretty: bool) -> serde_json::Result<()> {
        let mut out = JsonOut { writer, pretty };
        out.raw("{")?;
        out.line(1)?;
        out.key("roots")?;
        out.raw("[")?;

        let mut open: Vec<usize> = Vec::new();
        let mut first = true;
        for node in &self.nodes {
            while let Some(&depth) = open.last() {
                if depth < node.depth {
                    break;
                }
                open.pop();
                out.close_node(depth)?;
                first = false;
            }
            if !first {
                out.raw(",")?;
            }
            let indent = 3 + 2 * node.depth;
            out.line(indent - 1)?;
            out.raw("{")?;
            out.line(indent)?;
            out.key("association")?;
            out.value(&node.association, indent)?;
            out.raw(",")?;
            out.line(indent)?;
            out.key("clubs")?;
            out.value(&node.clubs, indent)?;
            out.raw(",")?;
            out.line(indent)?;
            out.key("children")?;
            if node.children.is_empty() {
                out.raw("[]")?;
                out.line(indent - 1)?;
                out.raw("}")?;
                first = false;
            } else {
                out.raw("[")?;
                open.push(node.depth);
                first = true;
            }
        }
        while let Some(depth) = open.pop() {
            out.close_node(depth)?;
        }

        if !self.nodes.is_empty() {
            out.line(1)?;
        }
        out.raw("],")?;
        out.line(1)?;
        out.key("orphan_clubs")?;
        out.value(&self.orphan_clubs, 1)?;
        out.raw(",")?;
        out.line(1)?;
        out.key("detached")?;
        out.value(&self.detached, 1)?;
        out.line(0)?;
        out.raw("}")
    }
}

/// Iterator returned by [`Forest::walk`].
pub struct Walk<'a> {
    nodes: std::slice::Iter<'a, ForestNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a ForestNode);

    fn next(&mut self) -> Option<Self::Item> {
        self.nodes.next().map(|node| (node.depth, node))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.nodes.size_hint()
    }
}

struct JsonOut<W> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonOut<W> {
    fn raw(&mut self, text: &str) -> serde_json::Result<()> {
        self.writer
            .write_all(text.as_bytes())
            .map_err(serde_json::Error::io)
    }

    fn line(&mut self, indent: usize) -> serde_json::Result<()> {
        if !self.pretty {
            return Ok(());
        }
        let mut text = String::with_capacity(1 + 2 * indent);
        text.push('\n');
        text.push_str(&"  ".repeat(indent));
        self.raw(&text)
    }

    fn key(&mut self, name: &str) -> serde_json::Result<()> {
        self.raw(&format!("\"{name}\":"))?;
        if self.pretty {
            self.raw(" ")?;
        }
        Ok(())
    }

    fn value<T: Serialize>(&mut self, value: &T, indent: usize) -> serde_json::Result<()> {
        if !self.pretty {
            return serde_json::to_writer(&mut self.writer, value);
        }
        // JSON strings never hold raw newlines, so re-indenting is safe
        let text = serde_json::to_string_pretty(value)?;
        let nested = format!("\n{}", "  ".repeat(indent));
        self.raw(&text.replace('\n', &nested))
    }

    fn close_node(&mut self, depth: usize) -> serde_json::Result<()> {
        let indent = 3 + 2 * depth;
        self.line(indent)?;
        self.raw("]")?;
        self.line(indent - 1)?;
        self.raw("}")
    }
}
