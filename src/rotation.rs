//! Round-robin reassembly alternatives with state kept in the script.
//!
//! A decomposition entry is laid out as
//! `((pattern) [counter] (alternative 1) (alternative 2) ...)`. The optional
//! counter is a plain datum holding the 1-based index of the alternative
//! used last. Selecting an alternative advances the counter and writes it
//! back into the entry, so the rotation survives a script dump and is shared
//! by every keyword that reaches the entry through a link.
//!
//! An entry that has never been used has no counter; the first selection
//! inserts one right after the pattern.

use crate::graph::{CellGraph, CellId, GraphError, ListId, Payload};

/// How an entry chooses among its reassemblies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alternatives {
    /// Exactly one reassembly, always used.
    SingleAlternative,
    /// Several reassemblies used in turn.
    RotatingAlternatives {
        /// Number of reassemblies.
        count: usize,
        /// 1-based index used last, 0 if never used.
        current_index: usize,
    },
}

/// The alternative picked by [`AlternativeSet::select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selected {
    /// 1-based position among the entry's reassemblies.
    pub index: usize,
    /// Reassembly spec to use.
    pub reassembly: ListId,
}

/// Typed view of one decomposition entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternativeSet {
    decomposition: ListId,
    pattern: ListId,
    pattern_cell: CellId,
    counter: Option<CellId>,
    reassemblies: Vec<ListId>,
    kind: Alternatives,
}

impl AlternativeSet {
    /// Reads the layout of `decomposition`.
    ///
    /// Returns `None` when the entry does not start with a pattern sublist or
    /// its counter is not a non-negative integer.
    pub fn read(graph: &CellGraph, decomposition: ListId) -> Result<Option<Self>, GraphError> {
        let cells = graph.cells(decomposition)?;
        let Some((&pattern_cell, rest)) = cells.split_first() else {
            return Ok(None);
        };
        let Some(pattern) = graph.link(pattern_cell) else {
            return Ok(None);
        };

        let mut counter = None;
        let mut current_index = 0;
        if let Some(&second) = rest.first() {
            if let Some(token) = graph.datum(second) {
                match token.parse::<usize>() {
                    Ok(value) => {
                        counter = Some(second);
                        current_index = value;
                    }
                    Err(_) => {
                        tracing::warn!(%decomposition, counter = token, "rotation counter is not a number");
                        return Ok(None);
                    }
                }
            }
        }

        let reassemblies: Vec<ListId> = rest.iter().filter_map(|&cell| graph.link(cell)).collect();
        let kind = if reassemblies.len() == 1 {
            Alternatives::SingleAlternative
        } else {
            Alternatives::RotatingAlternatives {
                count: reassemblies.len(),
                current_index,
            }
        };

        Ok(Some(Self {
            decomposition,
            pattern,
            pattern_cell,
            counter,
            reassemblies,
            kind,
        }))
    }

    /// Entry this view was read from.
    pub fn decomposition(&self) -> ListId {
        self.decomposition
    }

    /// Decomposition pattern.
    pub fn pattern(&self) -> ListId {
        self.pattern
    }

    /// Reassembly specs in order.
    pub fn reassemblies(&self) -> &[ListId] {
        &self.reassemblies
    }

    /// Rotation kind.
    pub fn kind(&self) -> Alternatives {
        self.kind
    }

    /// Index the next selection will use.
    pub fn next_index(&self) -> Option<usize> {
        match self.kind {
            Alternatives::SingleAlternative => Some(1),
            Alternatives::RotatingAlternatives { count: 0, .. } => None,
            Alternatives::RotatingAlternatives {
                count,
                current_index,
            } => Some(current_index % count + 1),
        }
    }

    /// Picks the next reassembly and writes the advanced counter back into
    /// the entry.
    ///
    /// Returns `None` if the entry has no reassemblies.
    pub fn select(&mut self, graph: &mut CellGraph) -> Result<Option<Selected>, GraphError> {
        let Some(index) = self.next_index() else {
            return Ok(None);
        };
        let marker = Payload::Datum(index.to_string());
        match self.counter {
            Some(counter) => graph.substitute(counter, marker)?,
            None => self.counter = Some(graph.insert_after(self.pattern_cell, marker)?),
        }
        if let Alternatives::RotatingAlternatives { current_index, .. } = &mut self.kind {
            *current_index = index;
        }
        Ok(Some(Selected {
            index,
            reassembly: self.reassemblies[index - 1],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{parse_list, print_list};
    use proptest::prelude::*;

    fn pick(graph: &mut CellGraph, entry: ListId) -> Option<Vec<String>> {
        let mut set = AlternativeSet::read(graph, entry).unwrap()?;
        let selected = set.select(graph).unwrap()?;
        Some(graph.tokens(selected.reassembly).unwrap())
    }

    #[test]
    fn single_alternative_gets_marker_once() {
        let mut graph = CellGraph::new();
        let entry = parse_list(&mut graph, "((0) (ONLY ONE))").unwrap();
        let set = AlternativeSet::read(&graph, entry).unwrap().unwrap();
        assert_eq!(set.kind(), Alternatives::SingleAlternative);

        assert_eq!(pick(&mut graph, entry), Some(vec!["ONLY".into(), "ONE".into()]));
        assert_eq!(print_list(&graph, entry).unwrap(), "((0) 1 (ONLY ONE))");
        assert_eq!(pick(&mut graph, entry), Some(vec!["ONLY".into(), "ONE".into()]));
        assert_eq!(print_list(&graph, entry).unwrap(), "((0) 1 (ONLY ONE))");
    }

    #[test]
    fn rotates_and_persists_counter() {
        let mut graph = CellGraph::new();
        let entry = parse_list(&mut graph, "((0) (A) (B) (C))").unwrap();
        let firsts: Vec<String> = (0..4)
            .map(|_| pick(&mut graph, entry).unwrap().remove(0))
            .collect();
        assert_eq!(firsts, vec!["A", "B", "C", "A"]);
        assert_eq!(print_list(&graph, entry).unwrap(), "((0) 1 (A) (B) (C))");
    }

    #[test]
    fn existing_counter_is_honoured() {
        let mut graph = CellGraph::new();
        let entry = parse_list(&mut graph, "((0) 2 (A) (B) (C))").unwrap();
        let set = AlternativeSet::read(&graph, entry).unwrap().unwrap();
        assert_eq!(
            set.kind(),
            Alternatives::RotatingAlternatives {
                count: 3,
                current_index: 2
            }
        );
        assert_eq!(pick(&mut graph, entry), Some(vec!["C".into()]));
    }

    #[test]
    fn shared_entry_rotates_once_for_all_aliases() {
        let mut graph = CellGraph::new();
        let entry = parse_list(&mut graph, "((0) (A) (B))").unwrap();
        let first = graph.new_list();
        graph.push_link(first, entry).unwrap();
        let second = graph.new_list();
        graph.push_link(second, entry).unwrap();

        let via_first = graph.link(graph.top(first).unwrap().unwrap()).unwrap();
        let via_second = graph.link(graph.top(second).unwrap().unwrap()).unwrap();
        assert_eq!(pick(&mut graph, via_first), Some(vec!["A".into()]));
        assert_eq!(pick(&mut graph, via_second), Some(vec!["B".into()]));
    }

    #[test]
    fn malformed_entries_are_not_rotations() {
        let mut graph = CellGraph::new();
        let no_pattern = parse_list(&mut graph, "(0 (A))").unwrap();
        assert_eq!(AlternativeSet::read(&graph, no_pattern).unwrap(), None);
        let bad_counter = parse_list(&mut graph, "((0) X (A))").unwrap();
        assert_eq!(AlternativeSet::read(&graph, bad_counter).unwrap(), None);
        let nothing = parse_list(&mut graph, "((0))").unwrap();
        assert_eq!(pick(&mut graph, nothing), None);
    }

    proptest! {
        #[test]
        fn rotation_returns_to_first_after_full_cycle(count in 1usize..7) {
            let mut graph = CellGraph::new();
            let alternatives: Vec<String> = (1..=count).map(|i| format!("(R{i})")).collect();
            let entry = parse_list(&mut graph, &format!("((0) {})", alternatives.join(" "))).unwrap();
            let mut seen = Vec::new();
            for _ in 0..=count {
                seen.push(pick(&mut graph, entry).unwrap().remove(0));
            }
            prop_assert_eq!(&seen[0], "R1");
            prop_assert_eq!(&seen[count], "R1");
            for (i, token) in seen.iter().take(count).enumerate() {
                prop_assert_eq!(token, &format!("R{}", i + 1));
            }
        }
    }
}
