//! Text codec between parenthesized script text and the cell graph.
//!
//! Lists are written as whitespace-delimited tokens inside parentheses;
//! nested parentheses open sublists. The token `DLIST` followed by a
//! parenthesized list attaches that list as the enclosing list's description.
//! Parentheses always end the token in progress, so `(A(B))` reads the same as
//! `(A (B))`.
//!
//! Printing is canonical: single spaces, no padding inside parentheses, the
//! description list first. `parse_list(print_list(l))` is structurally equal
//! to `l` for every acyclic list.

use crate::graph::{CellGraph, CellKind, GraphError, ListId};
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

/// Token announcing a description list.
pub const DESCRIPTION_PREFIX: &str = "DLIST";

/// Errors raised while reading or printing list text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A list was expected but something else was found.
    #[error("expected '(' at offset {offset}, found {found:?}")]
    ExpectedOpen {
        /// Byte offset into the input.
        offset: usize,
        /// Character found instead.
        found: char,
    },
    /// Input ended inside an unclosed list.
    #[error("unexpected end of input at offset {offset}, ')' expected")]
    UnexpectedEnd {
        /// Byte offset into the input.
        offset: usize,
    },
    /// `DLIST` was not followed by a list.
    #[error("no description list after DLIST at offset {offset}")]
    MissingDescription {
        /// Byte offset into the input.
        offset: usize,
    },
    /// The list refers back to itself and has no finite text form.
    #[error("{0} contains itself and cannot be printed")]
    Cycle(ListId),
    /// Graph access failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

fn is_description_prefix(token: &str) -> bool {
    token.eq_ignore_ascii_case(DESCRIPTION_PREFIX)
}

/// Streaming reader over a text holding any number of top-level lists.
pub struct ListReader<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> ListReader<'a> {
    /// Creates a reader positioned at the start of `text`.
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
        }
    }

    /// Byte offset of the next unread character.
    pub fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.text.len(), |&(offset, _)| offset)
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}
    }

    /// Reads the next top-level list into `graph`.
    ///
    /// Returns `Ok(None)` when only whitespace remains.
    pub fn read_list(&mut self, graph: &mut CellGraph) -> Result<Option<ListId>, CodecError> {
        self.skip_whitespace();
        match self.chars.next() {
            None => Ok(None),
            Some((_, '(')) => {
                let list = graph.new_list();
                self.read_body(graph, list)?;
                Ok(Some(list))
            }
            Some((offset, found)) => Err(CodecError::ExpectedOpen { offset, found }),
        }
    }

    /// Reads cells into `list` up to and including the closing parenthesis.
    fn read_body(&mut self, graph: &mut CellGraph, list: ListId) -> Result<(), CodecError> {
        let mut token = String::new();
        while let Some((offset, c)) = self.chars.next() {
            match c {
                c if c.is_whitespace() => {
                    if is_description_prefix(&token) {
                        token.clear();
                        self.read_description(graph, list)?;
                    } else {
                        flush(graph, list, &mut token)?;
                    }
                }
                '(' => {
                    let target = if is_description_prefix(&token) {
                        token.clear();
                        graph.make_description(list)?
                    } else {
                        flush(graph, list, &mut token)?;
                        graph.new_sublist(list)?
                    };
                    self.read_body(graph, target)?;
                }
                ')' => {
                    if is_description_prefix(&token) {
                        return Err(CodecError::MissingDescription { offset });
                    }
                    flush(graph, list, &mut token)?;
                    return Ok(());
                }
                c => token.push(c),
            }
        }
        Err(CodecError::UnexpectedEnd {
            offset: self.text.len(),
        })
    }

    fn read_description(&mut self, graph: &mut CellGraph, list: ListId) -> Result<(), CodecError> {
        self.skip_whitespace();
        match self.chars.next() {
            Some((_, '(')) => {
                let description = graph.make_description(list)?;
                self.read_body(graph, description)
            }
            Some((offset, _)) => Err(CodecError::MissingDescription { offset }),
            None => Err(CodecError::UnexpectedEnd {
                offset: self.text.len(),
            }),
        }
    }
}

fn flush(graph: &mut CellGraph, list: ListId, token: &mut String) -> Result<(), GraphError> {
    if !token.is_empty() {
        graph.push_datum(list, std::mem::take(token))?;
    }
    Ok(())
}

/// Parses exactly one parenthesized list from `text`.
pub fn parse_list(graph: &mut CellGraph, text: &str) -> Result<ListId, CodecError> {
    let mut reader = ListReader::new(text);
    reader
        .read_list(graph)?
        .ok_or(CodecError::UnexpectedEnd { offset: text.len() })
}

/// Reads flat user text into a new list, splitting on whitespace only.
///
/// Parentheses and punctuation are ordinary token characters here.
pub fn read_text(graph: &mut CellGraph, text: &str) -> Result<ListId, GraphError> {
    graph.list_from_tokens(text.split_whitespace())
}

/// Prints the top-level tokens of `list` separated by single spaces.
pub fn print_text(graph: &CellGraph, list: ListId) -> Result<String, GraphError> {
    Ok(graph.tokens(list)?.join(" "))
}

/// Prints `list` in parenthesized form, nested lists and description included.
pub fn print_list(graph: &CellGraph, list: ListId) -> Result<String, CodecError> {
    let mut out = String::new();
    let mut path = Vec::new();
    write_list(graph, list, &mut out, &mut path)?;
    Ok(out)
}

fn write_list(
    graph: &CellGraph,
    list: ListId,
    out: &mut String,
    path: &mut Vec<ListId>,
) -> Result<(), CodecError> {
    if path.contains(&list) {
        return Err(CodecError::Cycle(list));
    }
    path.push(list);
    out.push('(');
    let mut first = true;
    if let Some(description) = graph.description(list)? {
        out.push_str(DESCRIPTION_PREFIX);
        out.push(' ');
        write_list(graph, description, out, path)?;
        first = false;
    }
    for cell in graph.cells(list)? {
        if !first {
            out.push(' ');
        }
        first = false;
        match graph.kind(cell)? {
            CellKind::Datum(token) => out.push_str(token),
            CellKind::Link(target) => write_list(graph, *target, out, path)?,
            CellKind::Header(_) => {}
        }
    }
    out.push(')');
    path.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reads_nested_lists_and_description() {
        let mut graph = CellGraph::new();
        let list = parse_list(
            &mut graph,
            "(A B DLIST (COLOR RED SIZE GIGANTIC) C (DONE DTWO (EONE ETWO)))",
        )
        .unwrap();

        let cells = graph.cells(list).unwrap();
        assert_eq!(cells.len(), 4);
        assert_eq!(graph.tokens(list).unwrap(), vec!["A", "B", "C"]);

        let inner = graph.link(cells[3]).unwrap();
        assert_eq!(graph.tokens(inner).unwrap(), vec!["DONE", "DTWO"]);
        let innermost = graph.link(graph.bottom(inner).unwrap().unwrap()).unwrap();
        assert_eq!(graph.tokens(innermost).unwrap(), vec!["EONE", "ETWO"]);

        let description = graph.description(list).unwrap().unwrap();
        assert_eq!(
            graph.tokens(description).unwrap(),
            vec!["COLOR", "RED", "SIZE", "GIGANTIC"]
        );
    }

    #[test]
    fn parentheses_end_tokens() {
        let mut graph = CellGraph::new();
        let list = parse_list(&mut graph, "(A(B)C)").unwrap();
        assert_eq!(print_list(&graph, list).unwrap(), "(A (B) C)");
    }

    #[test]
    fn prints_canonically() {
        let mut graph = CellGraph::new();
        let list = parse_list(&mut graph, "  ( X   DLIST(K V)  ( )  Y )").unwrap();
        assert_eq!(print_list(&graph, list).unwrap(), "(DLIST (K V) X () Y)");
    }

    #[test]
    fn reader_streams_several_lists() {
        let mut graph = CellGraph::new();
        let mut reader = ListReader::new("(A) (B C)\n()\n");
        let a = reader.read_list(&mut graph).unwrap().unwrap();
        let b = reader.read_list(&mut graph).unwrap().unwrap();
        let empty = reader.read_list(&mut graph).unwrap().unwrap();
        assert_eq!(reader.read_list(&mut graph).unwrap(), None);
        assert_eq!(graph.tokens(a).unwrap(), vec!["A"]);
        assert_eq!(graph.tokens(b).unwrap(), vec!["B", "C"]);
        assert!(graph.is_empty(empty).unwrap());
    }

    #[test]
    fn malformed_input_is_reported() {
        let mut graph = CellGraph::new();
        assert_eq!(
            parse_list(&mut graph, "A B"),
            Err(CodecError::ExpectedOpen { offset: 0, found: 'A' })
        );
        assert_eq!(
            parse_list(&mut graph, "(A (B)"),
            Err(CodecError::UnexpectedEnd { offset: 6 })
        );
        assert_eq!(
            parse_list(&mut graph, "(A DLIST B)"),
            Err(CodecError::MissingDescription { offset: 9 })
        );
        assert_eq!(
            parse_list(&mut graph, "(A DLIST)"),
            Err(CodecError::MissingDescription { offset: 8 })
        );
        assert_eq!(
            parse_list(&mut graph, "   "),
            Err(CodecError::UnexpectedEnd { offset: 3 })
        );
    }

    #[test]
    fn flat_text_keeps_last_token() {
        let mut graph = CellGraph::new();
        let list = read_text(&mut graph, "  I REMEMBER (HER) ").unwrap();
        assert_eq!(graph.tokens(list).unwrap(), vec!["I", "REMEMBER", "(HER)"]);
        assert_eq!(print_text(&graph, list).unwrap(), "I REMEMBER (HER)");
        let last = read_text(&mut graph, "NO TRAILING").unwrap();
        assert_eq!(graph.len(last).unwrap(), 2);
    }

    #[test]
    fn flat_print_skips_sublists() {
        let mut graph = CellGraph::new();
        let list = parse_list(&mut graph, "(A (B) C)").unwrap();
        assert_eq!(print_text(&graph, list).unwrap(), "A C");
    }

    #[test]
    fn cycles_are_refused() {
        let mut graph = CellGraph::new();
        let list = graph.list_from_tokens(["LOOP"]).unwrap();
        graph.push_link(list, list).unwrap();
        assert_eq!(print_list(&graph, list), Err(CodecError::Cycle(list)));
    }

    #[derive(Debug, Clone)]
    enum Node {
        Token(String),
        List(Vec<Node>),
    }

    fn render(nodes: &[Node]) -> String {
        let parts: Vec<String> = nodes
            .iter()
            .map(|node| match node {
                Node::Token(token) => token.clone(),
                Node::List(children) => render(children),
            })
            .collect();
        format!("({})", parts.join(" "))
    }

    fn node() -> impl Strategy<Value = Node> {
        let leaf = "[A-Z0-9'=.,]{1,8}"
            .prop_filter("reserved token", |t| !is_description_prefix(t))
            .prop_map(Node::Token);
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop::collection::vec(inner, 0..6).prop_map(Node::List)
        })
    }

    proptest! {
        #[test]
        fn print_then_parse_round_trips(nodes in prop::collection::vec(node(), 0..8)) {
            let text = render(&nodes);
            let mut graph = CellGraph::new();
            let list = parse_list(&mut graph, &text).unwrap();
            let printed = print_list(&graph, list).unwrap();
            prop_assert_eq!(&printed, &text);
            let reparsed = parse_list(&mut graph, &printed).unwrap();
            prop_assert!(graph.structurally_equal(list, reparsed).unwrap());
        }
    }
}
