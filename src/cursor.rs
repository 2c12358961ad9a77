//! Position-tracking walker over one list.
//!
//! A [`Cursor`] is a plain `(list, position)` pair and holds no borrow on the
//! graph, so the engine can walk a list and mutate it in between steps. The
//! position starts at the header; stepping off either end lands back on the
//! header and yields `None`. Stepping again from the header re-enters the
//! list from the opposite end.
//!
//! A cursor is only meaningful while its current cell stays in its list.
//! If the cell is removed the next step reports [`GraphError::StaleCell`].

use crate::graph::{CellGraph, CellId, GraphError, ListId};

/// Walker over the top-level cells of one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    list: ListId,
    position: CellId,
}

impl Cursor {
    /// Creates a cursor positioned at the header of `list`.
    pub fn new(graph: &CellGraph, list: ListId) -> Result<Self, GraphError> {
        Ok(Self {
            list,
            position: graph.header(list)?,
        })
    }

    /// Creates a cursor positioned at `cell`, which must belong to `list`.
    pub fn at(list: ListId, cell: CellId) -> Self {
        Self { list, position: cell }
    }

    /// List being walked.
    pub fn list(&self) -> ListId {
        self.list
    }

    /// Current cell (the header before the first step).
    pub fn position(&self) -> CellId {
        self.position
    }

    /// Returns `true` if the cursor rests on the header.
    pub fn at_header(&self, graph: &CellGraph) -> bool {
        graph.is_header(self.position)
    }

    /// Independent copy of this cursor.
    pub fn fork(&self) -> Self {
        *self
    }

    /// Moves the cursor back onto the header.
    pub fn reset(&mut self, graph: &CellGraph) -> Result<(), GraphError> {
        self.position = graph.header(self.list)?;
        Ok(())
    }

    /// Steps right. Returns the new cell, or `None` on reaching the header.
    pub fn right(&mut self, graph: &CellGraph) -> Result<Option<CellId>, GraphError> {
        self.position = graph.right(self.position)?;
        Ok((!graph.is_header(self.position)).then_some(self.position))
    }

    /// Steps left. Returns the new cell, or `None` on reaching the header.
    pub fn left(&mut self, graph: &CellGraph) -> Result<Option<CellId>, GraphError> {
        self.position = graph.left(self.position)?;
        Ok((!graph.is_header(self.position)).then_some(self.position))
    }

    /// Advances to the next datum cell, skipping links, and returns its token.
    pub fn next_token<'g>(&mut self, graph: &'g CellGraph) -> Result<Option<&'g str>, GraphError> {
        while let Some(cell) = self.right(graph)? {
            if let Some(token) = graph.datum(cell) {
                return Ok(Some(token));
            }
        }
        Ok(None)
    }

    /// Backs up to the previous datum cell, skipping links.
    pub fn prev_token<'g>(&mut self, graph: &'g CellGraph) -> Result<Option<&'g str>, GraphError> {
        while let Some(cell) = self.left(graph)? {
            if let Some(token) = graph.datum(cell) {
                return Ok(Some(token));
            }
        }
        Ok(None)
    }

    /// Advances to the next link cell, skipping data, and returns its target.
    pub fn next_sublist(&mut self, graph: &CellGraph) -> Result<Option<ListId>, GraphError> {
        while let Some(cell) = self.right(graph)? {
            if let Some(list) = graph.link(cell) {
                return Ok(Some(list));
            }
        }
        Ok(None)
    }

    /// Backs up to the previous link cell, skipping data.
    pub fn prev_sublist(&mut self, graph: &CellGraph) -> Result<Option<ListId>, GraphError> {
        while let Some(cell) = self.left(graph)? {
            if let Some(list) = graph.link(cell) {
                return Ok(Some(list));
            }
        }
        Ok(None)
    }

    /// Counts the datum cells to the right of the cursor without moving it.
    pub fn remaining_tokens(&self, graph: &CellGraph) -> Result<usize, GraphError> {
        let mut probe = self.fork();
        let mut count = 0;
        while probe.next_token(graph)?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Payload;

    #[test]
    fn walks_right_and_stops_at_header() {
        let mut graph = CellGraph::new();
        let list = graph.list_from_tokens(["A", "B"]).unwrap();
        let mut cursor = Cursor::new(&graph, list).unwrap();
        assert_eq!(cursor.next_token(&graph).unwrap(), Some("A"));
        assert_eq!(cursor.next_token(&graph).unwrap(), Some("B"));
        assert_eq!(cursor.next_token(&graph).unwrap(), None);
        assert!(cursor.at_header(&graph));
        // Re-enters from the top.
        assert_eq!(cursor.next_token(&graph).unwrap(), Some("A"));
    }

    #[test]
    fn walks_left_from_header() {
        let mut graph = CellGraph::new();
        let list = graph.list_from_tokens(["A", "B"]).unwrap();
        let mut cursor = Cursor::new(&graph, list).unwrap();
        assert_eq!(cursor.prev_token(&graph).unwrap(), Some("B"));
        assert_eq!(cursor.prev_token(&graph).unwrap(), Some("A"));
        assert_eq!(cursor.prev_token(&graph).unwrap(), None);
    }

    #[test]
    fn token_and_sublist_steps_skip_each_other() {
        let mut graph = CellGraph::new();
        let list = graph.new_list();
        graph.push_datum(list, "X").unwrap();
        let inner = graph.new_sublist(list).unwrap();
        graph.push_datum(list, "Y").unwrap();

        let mut tokens = Cursor::new(&graph, list).unwrap();
        assert_eq!(tokens.next_token(&graph).unwrap(), Some("X"));
        assert_eq!(tokens.next_token(&graph).unwrap(), Some("Y"));

        let mut links = Cursor::new(&graph, list).unwrap();
        assert_eq!(links.next_sublist(&graph).unwrap(), Some(inner));
        assert_eq!(links.next_sublist(&graph).unwrap(), None);
        assert_eq!(links.prev_sublist(&graph).unwrap(), Some(inner));
    }

    #[test]
    fn forked_cursor_moves_independently() {
        let mut graph = CellGraph::new();
        let list = graph.list_from_tokens(["A", "B", "C"]).unwrap();
        let mut cursor = Cursor::new(&graph, list).unwrap();
        cursor.next_token(&graph).unwrap();
        let mut fork = cursor.fork();
        fork.next_token(&graph).unwrap();
        assert_ne!(fork.position(), cursor.position());
        assert_eq!(cursor.remaining_tokens(&graph).unwrap(), 2);
        assert_eq!(fork.remaining_tokens(&graph).unwrap(), 1);
    }

    #[test]
    fn edits_between_steps_are_observed() {
        let mut graph = CellGraph::new();
        let list = graph.list_from_tokens(["A", "C"]).unwrap();
        let mut cursor = Cursor::new(&graph, list).unwrap();
        let a = cursor.right(&graph).unwrap().unwrap();
        graph.insert_after(a, Payload::datum("B")).unwrap();
        assert_eq!(cursor.next_token(&graph).unwrap(), Some("B"));
        assert_eq!(cursor.next_token(&graph).unwrap(), Some("C"));
    }

    #[test]
    fn removed_position_reports_stale() {
        let mut graph = CellGraph::new();
        let list = graph.list_from_tokens(["A", "B"]).unwrap();
        let mut cursor = Cursor::new(&graph, list).unwrap();
        let a = cursor.right(&graph).unwrap().unwrap();
        graph.remove(a).unwrap();
        assert_eq!(cursor.right(&graph), Err(GraphError::StaleCell(a)));
    }
}
