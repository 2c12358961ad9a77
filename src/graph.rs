//! Circular doubly-linked list cells over a generational arena.
//!
//! Every list is a ring of cells anchored at a header sentinel. Cells are one
//! of three kinds: the header, a datum holding a text token, or a link naming
//! another list. Links do not own their target: any number of link cells, in
//! any number of lists, may name the same list, and a mutation made through
//! one of them is visible through all of them.
//!
//! # Invariants
//! - An empty list has `header.left == header.right == header`.
//! - Every non-header cell sits in exactly one ring. Cells leave a ring only
//!   by being freed (`pop_top`, `pop_bottom`, `remove`) or by being relinked
//!   wholesale into a fresh list (`split_before`, `split_after`).
//! - `substitute` changes a cell's payload, never its position.
//!
//! # Reclamation
//! Lists are never freed one by one. `collect_garbage` marks everything
//! reachable from a root set through links and description lists and sweeps
//! the rest. Stale handles are caught by the arena's generation check and
//! surface as [`GraphError::StaleList`] / [`GraphError::StaleCell`].

use crate::arena::{Arena, ArenaId};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Handle to a cell in a [`CellGraph`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId(ArenaId);

/// Handle to a list in a [`CellGraph`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListId(ArenaId);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell{}", self.0)
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "list{}", self.0)
    }
}

/// What a non-header cell carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A text token.
    Datum(String),
    /// A non-owning reference to another list.
    Link(ListId),
}

impl Payload {
    /// Shorthand for a datum payload.
    pub fn datum(token: impl Into<String>) -> Self {
        Payload::Datum(token.into())
    }

    fn into_kind(self) -> CellKind {
        match self {
            Payload::Datum(token) => CellKind::Datum(token),
            Payload::Link(list) => CellKind::Link(list),
        }
    }
}

/// Kind of a cell as seen through [`CellGraph::kind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellKind {
    /// Sentinel of the named list.
    Header(ListId),
    /// A text token.
    Datum(String),
    /// A sublist reference.
    Link(ListId),
}

impl CellKind {
    fn into_payload(self) -> Option<Payload> {
        match self {
            CellKind::Header(_) => None,
            CellKind::Datum(token) => Some(Payload::Datum(token)),
            CellKind::Link(list) => Some(Payload::Link(list)),
        }
    }
}

#[derive(Debug, Clone)]
struct Cell {
    kind: CellKind,
    left: CellId,
    right: CellId,
}

#[derive(Debug, Clone)]
struct ListData {
    header: CellId,
    description: Option<ListId>,
}

/// Errors raised by cell graph operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The list handle no longer resolves.
    #[error("{0} is no longer live")]
    StaleList(ListId),
    /// The cell handle no longer resolves.
    #[error("{0} is no longer live")]
    StaleCell(CellId),
    /// The cell is not part of the given list's ring.
    #[error("{cell} does not belong to {list}")]
    NotMember {
        /// List that was searched.
        list: ListId,
        /// Cell that was not found.
        cell: CellId,
    },
    /// The operation needs a non-header cell.
    #[error("{0} is a list header")]
    HeaderCell(CellId),
}

/// Owner of every cell and list of one engine instance.
#[derive(Debug, Default)]
pub struct CellGraph {
    cells: Arena<Cell>,
    lists: Arena<ListData>,
}

impl CellGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Construction and lookup
    // ------------------------------------------------------------------

    /// Creates a new empty list and returns its handle.
    pub fn new_list(&mut self) -> ListId {
        let list = ListId(self.lists.allocate(ListData {
            header: CellId(ArenaId::DANGLING),
            description: None,
        }));
        let header = CellId(self.cells.allocate_with(|id| Cell {
            kind: CellKind::Header(list),
            left: CellId(id),
            right: CellId(id),
        }));
        if let Some(data) = self.lists.get_mut(list.0) {
            data.header = header;
        }
        list
    }

    /// Creates a flat list holding `tokens` in order.
    pub fn list_from_tokens<I, S>(&mut self, tokens: I) -> Result<ListId, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = self.new_list();
        for token in tokens {
            self.push_datum(list, token)?;
        }
        Ok(list)
    }

    fn list(&self, list: ListId) -> Result<&ListData, GraphError> {
        self.lists.get(list.0).ok_or(GraphError::StaleList(list))
    }

    fn list_mut(&mut self, list: ListId) -> Result<&mut ListData, GraphError> {
        self.lists.get_mut(list.0).ok_or(GraphError::StaleList(list))
    }

    fn cell(&self, cell: CellId) -> Result<&Cell, GraphError> {
        self.cells.get(cell.0).ok_or(GraphError::StaleCell(cell))
    }

    fn cell_mut(&mut self, cell: CellId) -> Result<&mut Cell, GraphError> {
        self.cells.get_mut(cell.0).ok_or(GraphError::StaleCell(cell))
    }

    /// Returns `true` if `list` still resolves.
    pub fn contains_list(&self, list: ListId) -> bool {
        self.lists.contains(list.0)
    }

    /// Returns `true` if `cell` still resolves.
    pub fn contains_cell(&self, cell: CellId) -> bool {
        self.cells.contains(cell.0)
    }

    /// Number of live lists.
    pub fn live_lists(&self) -> usize {
        self.lists.live_count()
    }

    /// Number of live cells, headers included.
    pub fn live_cells(&self) -> usize {
        self.cells.live_count()
    }

    /// Returns the header sentinel of `list`.
    pub fn header(&self, list: ListId) -> Result<CellId, GraphError> {
        Ok(self.list(list)?.header)
    }

    /// Returns `true` if `list` has no cells besides its header.
    pub fn is_empty(&self, list: ListId) -> Result<bool, GraphError> {
        let header = self.header(list)?;
        Ok(self.cell(header)?.right == header)
    }

    /// Returns the leftmost cell, or `None` for an empty list.
    pub fn top(&self, list: ListId) -> Result<Option<CellId>, GraphError> {
        let header = self.header(list)?;
        let top = self.cell(header)?.right;
        Ok((top != header).then_some(top))
    }

    /// Returns the rightmost cell, or `None` for an empty list.
    pub fn bottom(&self, list: ListId) -> Result<Option<CellId>, GraphError> {
        let header = self.header(list)?;
        let bottom = self.cell(header)?.left;
        Ok((bottom != header).then_some(bottom))
    }

    /// Right neighbour of `cell` (the header after the bottom cell).
    pub fn right(&self, cell: CellId) -> Result<CellId, GraphError> {
        Ok(self.cell(cell)?.right)
    }

    /// Left neighbour of `cell` (the header before the top cell).
    pub fn left(&self, cell: CellId) -> Result<CellId, GraphError> {
        Ok(self.cell(cell)?.left)
    }

    /// Kind and payload of `cell`.
    pub fn kind(&self, cell: CellId) -> Result<&CellKind, GraphError> {
        Ok(&self.cell(cell)?.kind)
    }

    /// Token held by `cell`, if it is a live datum cell.
    pub fn datum(&self, cell: CellId) -> Option<&str> {
        match self.cells.get(cell.0).map(|c| &c.kind) {
            Some(CellKind::Datum(token)) => Some(token.as_str()),
            _ => None,
        }
    }

    /// Target of `cell`, if it is a live link cell.
    pub fn link(&self, cell: CellId) -> Option<ListId> {
        match self.cells.get(cell.0).map(|c| &c.kind) {
            Some(CellKind::Link(list)) => Some(*list),
            _ => None,
        }
    }

    /// Returns `true` if `cell` is a live header.
    pub fn is_header(&self, cell: CellId) -> bool {
        matches!(
            self.cells.get(cell.0).map(|c| &c.kind),
            Some(CellKind::Header(_))
        )
    }

    /// Top-level cells of `list`, left to right.
    pub fn cells(&self, list: ListId) -> Result<Vec<CellId>, GraphError> {
        let header = self.header(list)?;
        let mut out = Vec::new();
        let mut current = self.cell(header)?.right;
        // A ring can never hold more cells than are alive.
        let limit = self.cells.live_count();
        while current != header && out.len() < limit {
            out.push(current);
            current = self.cell(current)?.right;
        }
        Ok(out)
    }

    /// Number of top-level cells in `list`.
    pub fn len(&self, list: ListId) -> Result<usize, GraphError> {
        Ok(self.cells(list)?.len())
    }

    /// Top-level datum tokens of `list`, skipping links.
    pub fn tokens(&self, list: ListId) -> Result<Vec<String>, GraphError> {
        Ok(self
            .cells(list)?
            .into_iter()
            .filter_map(|cell| self.datum(cell).map(str::to_owned))
            .collect())
    }

    fn ensure_member(&self, list: ListId, cell: CellId) -> Result<(), GraphError> {
        if self.is_header(cell) {
            return Err(GraphError::HeaderCell(cell));
        }
        if self.cells(list)?.contains(&cell) {
            Ok(())
        } else {
            Err(GraphError::NotMember { list, cell })
        }
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    fn splice_between(
        &mut self,
        left: CellId,
        right: CellId,
        payload: Payload,
    ) -> Result<CellId, GraphError> {
        let cell = CellId(self.cells.allocate(Cell {
            kind: payload.into_kind(),
            left,
            right,
        }));
        self.cell_mut(left)?.right = cell;
        self.cell_mut(right)?.left = cell;
        Ok(cell)
    }

    /// Inserts a new cell immediately to the right of `anchor`.
    pub fn insert_after(&mut self, anchor: CellId, payload: Payload) -> Result<CellId, GraphError> {
        let right = self.right(anchor)?;
        self.splice_between(anchor, right, payload)
    }

    /// Inserts a new cell immediately to the left of `anchor`.
    pub fn insert_before(&mut self, anchor: CellId, payload: Payload) -> Result<CellId, GraphError> {
        let left = self.left(anchor)?;
        self.splice_between(left, anchor, payload)
    }

    /// Inserts a new cell at the top (left end) of `list`.
    pub fn insert_top(&mut self, list: ListId, payload: Payload) -> Result<CellId, GraphError> {
        let header = self.header(list)?;
        self.insert_after(header, payload)
    }

    /// Inserts a new cell at the bottom (right end) of `list`.
    pub fn insert_bottom(&mut self, list: ListId, payload: Payload) -> Result<CellId, GraphError> {
        let header = self.header(list)?;
        self.insert_before(header, payload)
    }

    /// Appends a datum cell to the bottom of `list`.
    pub fn push_datum(&mut self, list: ListId, token: impl Into<String>) -> Result<CellId, GraphError> {
        self.insert_bottom(list, Payload::Datum(token.into()))
    }

    /// Appends a link to `target` at the bottom of `list`.
    pub fn push_link(&mut self, list: ListId, target: ListId) -> Result<CellId, GraphError> {
        self.insert_bottom(list, Payload::Link(target))
    }

    /// Creates a fresh list and links it at the bottom of `list`.
    pub fn new_sublist(&mut self, list: ListId) -> Result<ListId, GraphError> {
        self.header(list)?;
        let sublist = self.new_list();
        self.push_link(list, sublist)?;
        Ok(sublist)
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Detaches `cell` from its ring and returns its payload.
    ///
    /// Removing a header is refused: the list is left untouched and `None`
    /// is returned.
    pub fn remove(&mut self, cell: CellId) -> Result<Option<Payload>, GraphError> {
        let (left, right, is_header) = {
            let c = self.cell(cell)?;
            (c.left, c.right, matches!(c.kind, CellKind::Header(_)))
        };
        if is_header {
            tracing::warn!(%cell, "attempt to remove a list header, operation cancelled");
            return Ok(None);
        }
        self.cell_mut(left)?.right = right;
        self.cell_mut(right)?.left = left;
        let detached = self.cells.deallocate(cell.0).ok_or(GraphError::StaleCell(cell))?;
        Ok(detached.kind.into_payload())
    }

    /// Removes and returns the top cell's payload, or `None` if empty.
    pub fn pop_top(&mut self, list: ListId) -> Result<Option<Payload>, GraphError> {
        match self.top(list)? {
            Some(top) => self.remove(top),
            None => Ok(None),
        }
    }

    /// Removes and returns the bottom cell's payload, or `None` if empty.
    pub fn pop_bottom(&mut self, list: ListId) -> Result<Option<Payload>, GraphError> {
        match self.bottom(list)? {
            Some(bottom) => self.remove(bottom),
            None => Ok(None),
        }
    }

    /// Frees every cell of `list`, leaving it empty.
    pub fn clear(&mut self, list: ListId) -> Result<(), GraphError> {
        let header = self.header(list)?;
        for cell in self.cells(list)? {
            self.cells.deallocate(cell.0);
        }
        let h = self.cell_mut(header)?;
        h.left = header;
        h.right = header;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structural operations
    // ------------------------------------------------------------------

    /// Copies `list` one level deep.
    ///
    /// Datum cells are copied by value; link cells are copied as new links
    /// to the *same* target lists. A description list is copied the same way.
    pub fn copy(&mut self, list: ListId) -> Result<ListId, GraphError> {
        let payloads: Vec<Payload> = self
            .cells(list)?
            .into_iter()
            .filter_map(|cell| self.cells.get(cell.0).and_then(|c| c.kind.clone().into_payload()))
            .collect();
        let description = self.list(list)?.description;
        let copy = self.new_list();
        for payload in payloads {
            self.insert_bottom(copy, payload)?;
        }
        if let Some(description) = description {
            let description = self.copy(description)?;
            self.list_mut(copy)?.description = Some(description);
        }
        Ok(copy)
    }

    /// Moves every cell from the top of `list` through `cell` (inclusive)
    /// into a new list, which is returned.
    pub fn split_before(&mut self, list: ListId, cell: CellId) -> Result<ListId, GraphError> {
        self.ensure_member(list, cell)?;
        let header = self.header(list)?;
        let first = self.right(header)?;
        let after = self.right(cell)?;

        let fresh = self.new_list();
        let fresh_header = self.header(fresh)?;

        self.cell_mut(header)?.right = after;
        self.cell_mut(after)?.left = header;

        self.cell_mut(fresh_header)?.right = first;
        self.cell_mut(first)?.left = fresh_header;
        self.cell_mut(fresh_header)?.left = cell;
        self.cell_mut(cell)?.right = fresh_header;
        Ok(fresh)
    }

    /// Moves every cell from `cell` (inclusive) through the bottom of `list`
    /// into a new list, which is returned.
    pub fn split_after(&mut self, list: ListId, cell: CellId) -> Result<ListId, GraphError> {
        self.ensure_member(list, cell)?;
        let header = self.header(list)?;
        let before = self.left(cell)?;
        let last = self.left(header)?;

        let fresh = self.new_list();
        let fresh_header = self.header(fresh)?;

        self.cell_mut(header)?.left = before;
        self.cell_mut(before)?.right = header;

        self.cell_mut(fresh_header)?.right = cell;
        self.cell_mut(cell)?.left = fresh_header;
        self.cell_mut(fresh_header)?.left = last;
        self.cell_mut(last)?.right = fresh_header;
        Ok(fresh)
    }

    /// Replaces the payload of `cell` in place.
    ///
    /// A header cannot change kind; substituting one splices a new cell with
    /// the payload at the top of its list instead.
    pub fn substitute(&mut self, cell: CellId, payload: Payload) -> Result<(), GraphError> {
        if let CellKind::Header(list) = *self.kind(cell)? {
            tracing::debug!(%list, "substitute on header, splicing a new top cell");
            self.insert_top(list, payload)?;
            return Ok(());
        }
        self.cell_mut(cell)?.kind = payload.into_kind();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Description lists
    // ------------------------------------------------------------------

    /// Description list attached to `list`, if any.
    pub fn description(&self, list: ListId) -> Result<Option<ListId>, GraphError> {
        Ok(self.list(list)?.description)
    }

    /// Returns the description list of `list`, creating an empty one if
    /// none is attached.
    pub fn make_description(&mut self, list: ListId) -> Result<ListId, GraphError> {
        if let Some(existing) = self.list(list)?.description {
            return Ok(existing);
        }
        let description = self.new_list();
        self.list_mut(list)?.description = Some(description);
        Ok(description)
    }

    /// Attaches `description` to `list`, replacing any previous one.
    pub fn attach_description(&mut self, list: ListId, description: ListId) -> Result<(), GraphError> {
        self.header(description)?;
        self.list_mut(list)?.description = Some(description);
        Ok(())
    }

    /// Detaches and returns the description list of `list`.
    pub fn drop_description(&mut self, list: ListId) -> Result<Option<ListId>, GraphError> {
        Ok(self.list_mut(list)?.description.take())
    }

    // ------------------------------------------------------------------
    // Comparison and reclamation
    // ------------------------------------------------------------------

    /// Deep structural comparison of two lists, description lists included.
    ///
    /// Tokens compare exactly. Cyclic structures are handled by assuming a
    /// pair already under comparison is equal.
    pub fn structurally_equal(&self, a: ListId, b: ListId) -> Result<bool, GraphError> {
        let mut in_progress = HashSet::new();
        self.equal_inner(a, b, &mut in_progress)
    }

    fn equal_inner(
        &self,
        a: ListId,
        b: ListId,
        in_progress: &mut HashSet<(ListId, ListId)>,
    ) -> Result<bool, GraphError> {
        if a == b || !in_progress.insert((a, b)) {
            return Ok(true);
        }
        match (self.description(a)?, self.description(b)?) {
            (None, None) => {}
            (Some(da), Some(db)) => {
                if !self.equal_inner(da, db, in_progress)? {
                    return Ok(false);
                }
            }
            _ => return Ok(false),
        }
        let left = self.cells(a)?;
        let right = self.cells(b)?;
        if left.len() != right.len() {
            return Ok(false);
        }
        for (ca, cb) in left.into_iter().zip(right) {
            let same = match (self.kind(ca)?, self.kind(cb)?) {
                (CellKind::Datum(x), CellKind::Datum(y)) => x == y,
                (CellKind::Link(x), CellKind::Link(y)) => self.equal_inner(*x, *y, in_progress)?,
                _ => false,
            };
            if !same {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Frees every list not reachable from `roots`, returning how many were
    /// freed.
    ///
    /// Reachability follows link cells and description lists.
    pub fn collect_garbage(&mut self, roots: &[ListId]) -> usize {
        let mut marked: HashSet<ListId> = HashSet::new();
        let mut stack: Vec<ListId> = roots
            .iter()
            .copied()
            .filter(|list| self.contains_list(*list))
            .collect();
        while let Some(list) = stack.pop() {
            if !marked.insert(list) {
                continue;
            }
            if let Ok(Some(description)) = self.description(list) {
                stack.push(description);
            }
            for cell in self.cells(list).unwrap_or_default() {
                if let Some(target) = self.link(cell) {
                    if self.contains_list(target) && !marked.contains(&target) {
                        stack.push(target);
                    }
                }
            }
        }

        let dead: Vec<ListId> = self
            .lists
            .iter()
            .map(|(id, _)| ListId(id))
            .filter(|list| !marked.contains(list))
            .collect();
        for list in &dead {
            let cells = self.cells(*list).unwrap_or_default();
            for cell in cells {
                self.cells.deallocate(cell.0);
            }
            if let Some(data) = self.lists.deallocate(list.0) {
                self.cells.deallocate(data.header.0);
            }
        }
        if !dead.is_empty() {
            tracing::trace!(freed = dead.len(), live = self.lists.live_count(), "collected unreachable lists");
        }
        dead.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(graph: &CellGraph, list: ListId) -> Vec<String> {
        graph.tokens(list).unwrap()
    }

    #[test]
    fn empty_list_header_points_to_itself() {
        let mut graph = CellGraph::new();
        let list = graph.new_list();
        let header = graph.header(list).unwrap();
        assert!(graph.is_empty(list).unwrap());
        assert_eq!(graph.left(header).unwrap(), header);
        assert_eq!(graph.right(header).unwrap(), header);
        assert_eq!(graph.top(list).unwrap(), None);
        assert_eq!(graph.bottom(list).unwrap(), None);
    }

    #[test]
    fn insert_top_and_bottom() {
        let mut graph = CellGraph::new();
        let a = graph.new_list();
        graph.insert_top(a, Payload::datum("5")).unwrap();
        graph.insert_bottom(a, Payload::datum("13")).unwrap();
        let b = graph.new_list();
        graph.insert_top(a, Payload::Link(b)).unwrap();
        graph.insert_top(b, Payload::datum("10")).unwrap();

        let cells = graph.cells(a).unwrap();
        assert_eq!(cells.len(), 3);
        assert_eq!(graph.link(cells[0]), Some(b));
        assert_eq!(tokens(&graph, a), vec!["5", "13"]);
        assert_eq!(tokens(&graph, b), vec!["10"]);
    }

    #[test]
    fn pop_top_moves_to_bottom() {
        let mut graph = CellGraph::new();
        let a = graph.list_from_tokens(["5", "10"]).unwrap();
        let popped = graph.pop_top(a).unwrap().unwrap();
        graph.insert_bottom(a, popped).unwrap();
        assert_eq!(tokens(&graph, a), vec!["10", "5"]);
    }

    #[test]
    fn pop_on_empty_signals_none() {
        let mut graph = CellGraph::new();
        let a = graph.new_list();
        assert_eq!(graph.pop_top(a).unwrap(), None);
        assert_eq!(graph.pop_bottom(a).unwrap(), None);
    }

    #[test]
    fn removed_cell_handle_goes_stale() {
        let mut graph = CellGraph::new();
        let a = graph.list_from_tokens(["X", "Y", "Z"]).unwrap();
        let middle = graph.cells(a).unwrap()[1];
        assert_eq!(graph.remove(middle).unwrap(), Some(Payload::datum("Y")));
        assert_eq!(tokens(&graph, a), vec!["X", "Z"]);
        assert_eq!(graph.kind(middle), Err(GraphError::StaleCell(middle)));
    }

    #[test]
    fn removing_header_is_refused() {
        let mut graph = CellGraph::new();
        let a = graph.list_from_tokens(["X"]).unwrap();
        let header = graph.header(a).unwrap();
        assert_eq!(graph.remove(header).unwrap(), None);
        assert_eq!(tokens(&graph, a), vec!["X"]);
    }

    #[test]
    fn copy_aliases_sublists() {
        let mut graph = CellGraph::new();
        let shared = graph.list_from_tokens(["INNER"]).unwrap();
        let outer = graph.list_from_tokens(["A"]).unwrap();
        graph.push_link(outer, shared).unwrap();

        let copy = graph.copy(outer).unwrap();
        assert_ne!(copy, outer);
        let link = graph.cells(copy).unwrap()[1];
        assert_eq!(graph.link(link), Some(shared));

        // Mutation through the alias is visible from the original.
        graph.push_datum(shared, "MORE").unwrap();
        assert_eq!(tokens(&graph, shared), vec!["INNER", "MORE"]);
        assert!(graph.structurally_equal(outer, copy).unwrap());
    }

    #[test]
    fn list_from_tokens_builds_a_flat_list() {
        let mut graph = CellGraph::new();
        let list = graph.list_from_tokens(["I", "SEE"]).unwrap();
        assert_eq!(graph.tokens(list).unwrap(), vec!["I", "SEE"]);
        assert_eq!(graph.len(list).unwrap(), 2);
        let empty = graph.list_from_tokens(Vec::<String>::new()).unwrap();
        assert!(graph.is_empty(empty).unwrap());
    }

    #[test]
    fn split_before_takes_prefix_through_cell() {
        let mut graph = CellGraph::new();
        let a = graph.list_from_tokens(["WELL", ",", "I", "THINK"]).unwrap();
        let comma = graph.cells(a).unwrap()[1];
        let junk = graph.split_before(a, comma).unwrap();
        assert_eq!(tokens(&graph, junk), vec!["WELL", ","]);
        assert_eq!(tokens(&graph, a), vec!["I", "THINK"]);
    }

    #[test]
    fn split_after_takes_suffix_from_cell() {
        let mut graph = CellGraph::new();
        let a = graph.list_from_tokens(["I", "THINK", ".", "MORE"]).unwrap();
        let dot = graph.cells(a).unwrap()[2];
        let junk = graph.split_after(a, dot).unwrap();
        assert_eq!(tokens(&graph, junk), vec![".", "MORE"]);
        assert_eq!(tokens(&graph, a), vec!["I", "THINK"]);
    }

    #[test]
    fn split_of_whole_list_leaves_source_empty() {
        let mut graph = CellGraph::new();
        let a = graph.list_from_tokens(["ONLY"]).unwrap();
        let only = graph.top(a).unwrap().unwrap();
        let moved = graph.split_after(a, only).unwrap();
        assert!(graph.is_empty(a).unwrap());
        assert_eq!(tokens(&graph, moved), vec!["ONLY"]);
        let header = graph.header(a).unwrap();
        assert_eq!(graph.left(header).unwrap(), header);
    }

    #[test]
    fn split_rejects_foreign_cell() {
        let mut graph = CellGraph::new();
        let a = graph.list_from_tokens(["A"]).unwrap();
        let b = graph.list_from_tokens(["B"]).unwrap();
        let foreign = graph.top(b).unwrap().unwrap();
        assert_eq!(
            graph.split_before(a, foreign),
            Err(GraphError::NotMember { list: a, cell: foreign })
        );
    }

    #[test]
    fn substitute_keeps_position() {
        let mut graph = CellGraph::new();
        let a = graph.list_from_tokens(["A", "B", "C"]).unwrap();
        let target = graph.list_from_tokens(["SUB"]).unwrap();
        let middle = graph.cells(a).unwrap()[1];
        graph.substitute(middle, Payload::Link(target)).unwrap();
        let cells = graph.cells(a).unwrap();
        assert_eq!(cells[1], middle);
        assert_eq!(graph.link(middle), Some(target));
        graph.substitute(middle, Payload::datum("B2")).unwrap();
        assert_eq!(tokens(&graph, a), vec!["A", "B2", "C"]);
    }

    #[test]
    fn substitute_header_splices_top_cell() {
        let mut graph = CellGraph::new();
        let a = graph.new_list();
        let header = graph.header(a).unwrap();
        graph.substitute(header, Payload::datum("NEW")).unwrap();
        assert_eq!(tokens(&graph, a), vec!["NEW"]);
        assert!(graph.is_header(header));
    }

    #[test]
    fn description_list_created_on_demand() {
        let mut graph = CellGraph::new();
        let a = graph.new_list();
        assert_eq!(graph.description(a).unwrap(), None);
        let d = graph.make_description(a).unwrap();
        assert_eq!(graph.make_description(a).unwrap(), d);
        assert_eq!(graph.drop_description(a).unwrap(), Some(d));
        assert_eq!(graph.description(a).unwrap(), None);
    }

    #[test]
    fn garbage_collection_keeps_reachable_lists() {
        let mut graph = CellGraph::new();
        let root = graph.new_list();
        let kept = graph.new_sublist(root).unwrap();
        let described = graph.make_description(kept).unwrap();
        let orphan = graph.list_from_tokens(["GONE"]).unwrap();
        let orphan_cell = graph.top(orphan).unwrap().unwrap();

        let freed = graph.collect_garbage(&[root]);
        assert_eq!(freed, 1);
        assert!(graph.contains_list(root));
        assert!(graph.contains_list(kept));
        assert!(graph.contains_list(described));
        assert!(!graph.contains_list(orphan));
        assert!(!graph.contains_cell(orphan_cell));
        assert_eq!(graph.is_empty(orphan), Err(GraphError::StaleList(orphan)));
    }

    #[test]
    fn garbage_collection_handles_cycles() {
        let mut graph = CellGraph::new();
        let a = graph.new_list();
        let b = graph.new_list();
        graph.push_link(a, b).unwrap();
        graph.push_link(b, a).unwrap();
        assert_eq!(graph.collect_garbage(&[a]), 0);
        assert_eq!(graph.collect_garbage(&[]), 2);
        assert_eq!(graph.live_lists(), 0);
        assert_eq!(graph.live_cells(), 0);
    }
}
