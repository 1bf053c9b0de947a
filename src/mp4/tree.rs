use serde::Serialize;

use crate::mp4::data::BoxData;
use crate::mp4::fourcc::{self, FourCC};

/// Index of a node inside a [`BoxArena`].
pub type NodeId = usize;

/// One box in the tree. Linked to its relatives by arena indices: ownership
/// flows strictly downward, the parent index is a non-owning back-reference
/// used for upward path navigation and handler lookup only.
#[derive(Debug)]
pub struct BoxNode {
    pub box_type: FourCC,
    /// 16-byte extended type, present when `box_type` is the `uuid` escape.
    pub uuid: Option<[u8; 16]>,
    /// Resolved size including the header; 0 means "extends to end of the
    /// enclosing stream" and is only legal on the root.
    pub size: u64,
    pub header_size: u64,
    /// Stream position of the first header byte.
    pub pos: u64,
    /// Leading index value, for boxes enumerated from an indexed container.
    pub index: u32,
    /// Set when the box is recognized but kept as an opaque placeholder.
    pub incomplete: bool,
    pub data: BoxData,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
}

impl BoxNode {
    /// End position of the declared extent; `None` for the unbounded case.
    pub fn end(&self) -> Option<u64> {
        if self.size == 0 {
            None
        } else {
            Some(self.pos + self.size)
        }
    }
}

/// Arena-backed box tree. The root is a virtual container covering the whole
/// stream; all other nodes are appended in stream order during building.
#[derive(Debug)]
pub struct BoxArena {
    nodes: Vec<BoxNode>,
    root: NodeId,
}

impl BoxArena {
    /// Create an arena holding only the virtual root. `size` 0 marks a root
    /// of unknown total length (live/fragmented stream).
    pub fn new(pos: u64, size: u64) -> Self {
        let root = BoxNode {
            box_type: fourcc::ROOT,
            uuid: None,
            size,
            header_size: 0,
            pos,
            index: 0,
            incomplete: false,
            data: BoxData::Empty,
            parent: None,
            first_child: None,
            last_child: None,
            next_sibling: None,
        };
        Self {
            nodes: vec![root],
            root: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &BoxNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut BoxNode {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate a detached node; it becomes part of the tree only once
    /// appended to a parent.
    pub fn alloc(&mut self, node: BoxNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Detach `child` from `parent` and drop it when it is still the most
    /// recent allocation. Used by the builder to discard nodes whose decode
    /// failed; descendants allocated under a failed container stay in the
    /// arena but become unreachable.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if self.nodes[child].parent != Some(parent) {
            return;
        }
        let prev = self
            .children(parent)
            .take_while(|&id| id != child)
            .last();
        match prev {
            Some(p) => self.nodes[p].next_sibling = self.nodes[child].next_sibling,
            None => self.nodes[parent].first_child = self.nodes[child].next_sibling,
        }
        if self.nodes[parent].last_child == Some(child) {
            self.nodes[parent].last_child = prev;
        }
        self.nodes[child].parent = None;
        self.nodes[child].next_sibling = None;
        if child == self.nodes.len() - 1 {
            self.nodes.pop();
        }
    }

    /// Append `child` as the last child of `parent`, in stream order.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child].parent = Some(parent);
        match self.nodes[parent].last_child {
            Some(last) => self.nodes[last].next_sibling = Some(child),
            None => self.nodes[parent].first_child = Some(child),
        }
        self.nodes[parent].last_child = Some(child);
    }

    /// Detach all children of `parent`. The nodes stay allocated but become
    /// unreachable; used by the decompression splice to replace a subtree.
    pub fn clear_children(&mut self, parent: NodeId) {
        let mut child = self.nodes[parent].first_child;
        self.nodes[parent].first_child = None;
        self.nodes[parent].last_child = None;
        while let Some(id) = child {
            child = self.nodes[id].next_sibling;
            self.nodes[id].parent = None;
            self.nodes[id].next_sibling = None;
        }
    }

    /// Iterate the children of `parent` in stream order.
    pub fn children(&self, parent: NodeId) -> ChildIter<'_> {
        ChildIter {
            arena: self,
            next: self.nodes[parent].first_child,
        }
    }

    /// Find the `n`-th child of `parent` with the given type.
    pub fn nth_child_of_type(&self, parent: NodeId, t: FourCC, n: usize) -> Option<NodeId> {
        self.children(parent)
            .filter(|&id| self.nodes[id].box_type == t)
            .nth(n)
    }

    /// Navigate a path from `from`. Segments are separated by `/`; a leading
    /// `/` restarts at the root. `.` stays in place, `..` moves to the
    /// parent, and `name` or `name[n]` selects the first or n-th child with
    /// that 4-byte type code.
    pub fn get(&self, from: NodeId, path: &str) -> Option<NodeId> {
        let mut current = if path.starts_with('/') {
            self.root
        } else {
            from
        };
        for segment in path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => current = self.nodes[current].parent?,
                _ => {
                    let (name, n) = parse_segment(segment)?;
                    current = self.nth_child_of_type(current, name, n)?;
                }
            }
        }
        Some(current)
    }

    /// Count the children matching the final segment of `path`; the leading
    /// segments are navigated as in [`BoxArena::get`].
    pub fn count(&self, from: NodeId, path: &str) -> usize {
        let (dir, leaf) = match path.rfind('/') {
            Some(i) => (&path[..i], &path[i + 1..]),
            None => ("", path),
        };
        let base = if dir.is_empty() && !path.starts_with('/') {
            Some(from)
        } else if dir.is_empty() {
            Some(self.root)
        } else {
            self.get(from, dir)
        };
        let base = match base {
            Some(b) => b,
            None => return 0,
        };
        let t = match FourCC::from_str(leaf) {
            Some(t) => t,
            None => return 0,
        };
        self.children(base)
            .filter(|&id| self.nodes[id].box_type == t)
            .count()
    }

    /// Serializable summary of the subtree rooted at `id`.
    pub fn dump(&self, id: NodeId) -> BoxSummary {
        let node = &self.nodes[id];
        BoxSummary {
            box_type: node.box_type.to_string(),
            size: node.size,
            pos: node.pos,
            incomplete: node.incomplete,
            children: self.children(id).map(|c| self.dump(c)).collect(),
        }
    }
}

fn parse_segment(segment: &str) -> Option<(FourCC, usize)> {
    match segment.find('[') {
        Some(open) => {
            let close = segment.rfind(']')?;
            if close != segment.len() - 1 || close <= open {
                return None;
            }
            let n = segment[open + 1..close].parse().ok()?;
            Some((FourCC::from_str(&segment[..open])?, n))
        }
        None => Some((FourCC::from_str(segment)?, 0)),
    }
}

pub struct ChildIter<'a> {
    arena: &'a BoxArena,
    next: Option<NodeId>,
}

impl Iterator for ChildIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.arena.nodes[id].next_sibling;
        Some(id)
    }
}

/// Serializable structure dump of a box subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    #[serde(rename = "type")]
    pub box_type: String,
    pub size: u64,
    pub pos: u64,
    pub incomplete: bool,
    pub children: Vec<BoxSummary>,
}
