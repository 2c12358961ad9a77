//! Decomposition and reassembly of token lists.
//!
//! A decomposition pattern is a flat list of elements: literal tokens that
//! must appear verbatim (case-insensitively), positive counts that take that
//! many tokens, and `0` wildcards whose length is inferred from what follows.
//! Matching splits the input into one segment per element. A reassembly spec
//! then rebuilds a response from literals and 1-based segment references.
//!
//! A combined rule carries both halves separated by `=`:
//! `(0 YOUR 0 = WHY DO YOU SAY YOUR 3)`.
//!
//! # Wildcard length
//! A wildcard looks ahead over the run of counts that follows it. If the run
//! ends at a literal, the wildcard spans everything up to the literal's first
//! occurrence minus the tokens reserved by the counts. Otherwise it spans the
//! rest of the input minus the reserved tokens. A wildcard never backtracks.
//!
//! # Determinism
//! Matching reads the graph only. Segments are materialized into new lists
//! only once the whole pattern has matched, so a failed match leaves no
//! trace in the graph.

use crate::cursor::Cursor;
use crate::graph::{CellGraph, CellKind, GraphError, ListId};
use thiserror::Error;

/// Token separating a pattern from its reassembly spec.
pub const SEPARATOR: &str = "=";

/// One element of a decomposition pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternElement {
    /// A token matched case-insensitively.
    Literal(String),
    /// A fixed number of tokens.
    Count(usize),
    /// A run of tokens whose length is inferred.
    Wildcard,
    /// A negative count, which never matches.
    Negative(i64),
}

impl PatternElement {
    /// Classifies a pattern token.
    pub fn parse(token: &str) -> Self {
        match token.parse::<i64>() {
            Ok(0) => PatternElement::Wildcard,
            Ok(n) if n > 0 => match usize::try_from(n) {
                Ok(count) => PatternElement::Count(count),
                Err(_) => PatternElement::Literal(token.to_owned()),
            },
            Ok(n) => PatternElement::Negative(n),
            Err(_) => PatternElement::Literal(token.to_owned()),
        }
    }
}

/// Why a decomposition did not match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchFailure {
    /// The next input token differs from the pattern literal.
    #[error("expected {expected:?}, found {found:?}")]
    LiteralMismatch {
        /// Pattern literal.
        expected: String,
        /// Input token found instead.
        found: String,
    },
    /// Fewer input tokens remain than the pattern needs.
    #[error("pattern needs {wanted} more tokens, input has {available}")]
    InputExhausted {
        /// Tokens required.
        wanted: usize,
        /// Tokens left in the input.
        available: usize,
    },
    /// The pattern holds a negative count.
    #[error("negative segment length {0} in pattern")]
    NegativeLength(i64),
    /// The literal anchoring a wildcard never occurs in the rest of the input.
    #[error("literal {0:?} does not occur in the input")]
    LiteralNotFound(String),
    /// The anchoring literal occurs before the reserved counts fit.
    #[error("literal {literal:?} found {short} tokens too soon")]
    FoundTooSoon {
        /// Anchoring literal.
        literal: String,
        /// Missing tokens between the wildcard and the literal.
        short: usize,
    },
    /// Two wildcards separated only by counts cannot be split.
    #[error("adjacent wildcards in pattern")]
    AdjacentWildcards,
    /// A combined rule has no `=` separator.
    #[error("rule has no '=' separator")]
    MissingSeparator,
    /// Graph access failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl MatchFailure {
    /// Returns `true` if the failure comes from a malformed rule rather than
    /// from the input not fitting it.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            MatchFailure::NegativeLength(_)
                | MatchFailure::AdjacentWildcards
                | MatchFailure::MissingSeparator
                | MatchFailure::Graph(_)
        )
    }
}

/// A reassembly reference that named a missing segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOutOfRange {
    /// 1-based index named by the spec.
    pub index: usize,
    /// Number of segments available.
    pub available: usize,
}

/// Result of a reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    /// Newly built response list.
    pub output: ListId,
    /// References that were skipped because they were out of range.
    pub skipped: Vec<IndexOutOfRange>,
}

enum State {
    Read,
    Element(PatternElement),
    Take(usize),
    Done,
}

/// Explicit matcher state: rule position, input position, segments so far.
struct Decomposer<'g> {
    graph: &'g CellGraph,
    rule: Cursor,
    input: Cursor,
    segments: Vec<Vec<String>>,
}

impl<'g> Decomposer<'g> {
    fn new(graph: &'g CellGraph, rule: ListId, input: ListId) -> Result<Self, GraphError> {
        Ok(Self {
            graph,
            rule: Cursor::new(graph, rule)?,
            input: Cursor::new(graph, input)?,
            segments: Vec::new(),
        })
    }

    fn run(mut self) -> Result<Vec<Vec<String>>, MatchFailure> {
        let mut state = State::Read;
        loop {
            state = match state {
                State::Read => match next_element(self.graph, &mut self.rule)? {
                    Some(element) => State::Element(element),
                    None => State::Done,
                },
                State::Element(PatternElement::Literal(literal)) => {
                    self.match_literal(literal)?;
                    State::Read
                }
                State::Element(PatternElement::Count(n)) => State::Take(n),
                State::Element(PatternElement::Negative(n)) => {
                    return Err(MatchFailure::NegativeLength(n))
                }
                State::Element(PatternElement::Wildcard) => State::Take(self.wildcard_length()?),
                State::Take(n) => {
                    self.take(n)?;
                    State::Read
                }
                State::Done => return Ok(self.segments),
            };
        }
    }

    fn match_literal(&mut self, expected: String) -> Result<(), MatchFailure> {
        match self.input.next_token(self.graph)? {
            Some(found) if found.eq_ignore_ascii_case(&expected) => {
                self.segments.push(vec![found.to_owned()]);
                Ok(())
            }
            Some(found) => Err(MatchFailure::LiteralMismatch {
                expected,
                found: found.to_owned(),
            }),
            None => Err(MatchFailure::InputExhausted {
                wanted: 1,
                available: 0,
            }),
        }
    }

    fn take(&mut self, n: usize) -> Result<(), MatchFailure> {
        let mut segment = Vec::new();
        while segment.len() < n {
            match self.input.next_token(self.graph)? {
                Some(token) => segment.push(token.to_owned()),
                None => {
                    return Err(MatchFailure::InputExhausted {
                        wanted: n,
                        available: segment.len(),
                    })
                }
            }
        }
        self.segments.push(segment);
        Ok(())
    }

    fn wildcard_length(&self) -> Result<usize, MatchFailure> {
        let mut probe = self.rule.fork();
        let mut reserved = 0usize;
        let anchor = loop {
            match next_element(self.graph, &mut probe)? {
                None => break None,
                Some(PatternElement::Count(n)) => {
                    reserved = match reserved.checked_add(n) {
                        Some(total) => total,
                        None => {
                            return Err(MatchFailure::InputExhausted {
                                wanted: usize::MAX,
                                available: self.input.remaining_tokens(self.graph)?,
                            })
                        }
                    };
                }
                Some(PatternElement::Wildcard) => return Err(MatchFailure::AdjacentWildcards),
                Some(PatternElement::Negative(n)) => return Err(MatchFailure::NegativeLength(n)),
                Some(PatternElement::Literal(literal)) => break Some(literal),
            }
        };

        match anchor {
            Some(literal) => {
                let mut scan = self.input.fork();
                let mut skipped = 0usize;
                loop {
                    match scan.next_token(self.graph)? {
                        Some(token) if token.eq_ignore_ascii_case(&literal) => break,
                        Some(_) => skipped += 1,
                        None => return Err(MatchFailure::LiteralNotFound(literal)),
                    }
                }
                skipped
                    .checked_sub(reserved)
                    .ok_or_else(|| MatchFailure::FoundTooSoon {
                        short: reserved - skipped,
                        literal,
                    })
            }
            None => {
                let available = self.input.remaining_tokens(self.graph)?;
                available
                    .checked_sub(reserved)
                    .ok_or(MatchFailure::InputExhausted {
                        wanted: reserved,
                        available,
                    })
            }
        }
    }
}

/// Reads the next pattern element, treating `=` as the end of the pattern.
fn next_element(graph: &CellGraph, rule: &mut Cursor) -> Result<Option<PatternElement>, GraphError> {
    Ok(rule
        .next_token(graph)?
        .filter(|token| *token != SEPARATOR)
        .map(PatternElement::parse))
}

/// Matches `rule` against `input` and returns the segments as token vectors.
///
/// Only datum cells take part; links in either list are skipped. The rule is
/// read up to its first `=`.
pub fn match_segments(
    graph: &CellGraph,
    rule: ListId,
    input: ListId,
) -> Result<Vec<Vec<String>>, MatchFailure> {
    Decomposer::new(graph, rule, input)?.run()
}

/// Matches `rule` against `input` and materializes the segments.
///
/// On success returns a new list holding one link per segment, in pattern
/// order. On failure nothing is allocated.
pub fn decompose(graph: &mut CellGraph, rule: ListId, input: ListId) -> Result<ListId, MatchFailure> {
    let segments = match_segments(graph, rule, input)?;
    Ok(segments_to_list(graph, segments)?)
}

/// Builds a segment list from token vectors.
pub fn segments_to_list(graph: &mut CellGraph, segments: Vec<Vec<String>>) -> Result<ListId, GraphError> {
    let list = graph.new_list();
    for segment in segments {
        let sublist = graph.new_sublist(list)?;
        for token in segment {
            graph.push_datum(sublist, token)?;
        }
    }
    Ok(list)
}

/// Builds a response from `spec` and the `segments` list.
///
/// A spec token parsing as a positive integer `n` copies segment `n`: a
/// sublist segment is spliced flat, a datum segment is copied as is. Every
/// other token, `0` included, is copied literally. References past the last
/// segment are skipped and reported.
pub fn assemble(graph: &mut CellGraph, spec: ListId, segments: ListId) -> Result<Assembly, GraphError> {
    let spec_tokens = graph.tokens(spec)?;
    let segment_cells = graph.cells(segments)?;
    let output = graph.new_list();
    let mut skipped = Vec::new();

    for token in spec_tokens {
        let index = match token.parse::<usize>() {
            Ok(index) if index > 0 => index,
            _ => {
                graph.push_datum(output, token)?;
                continue;
            }
        };
        let Some(&cell) = segment_cells.get(index - 1) else {
            tracing::warn!(index, available = segment_cells.len(), "reassembly index out of range, skipped");
            skipped.push(IndexOutOfRange {
                index,
                available: segment_cells.len(),
            });
            continue;
        };
        let pieces = match graph.kind(cell)? {
            CellKind::Datum(token) => vec![token.clone()],
            CellKind::Link(sublist) => graph.tokens(*sublist)?,
            CellKind::Header(_) => Vec::new(),
        };
        for piece in pieces {
            graph.push_datum(output, piece)?;
        }
    }

    Ok(Assembly { output, skipped })
}

/// Runs a combined `pattern = reassembly` rule against `input`.
///
/// Works on a copy; the stored rule is left untouched.
pub fn apply_rule(graph: &mut CellGraph, rule: ListId, input: ListId) -> Result<Assembly, MatchFailure> {
    let working = graph.copy(rule)?;
    let separator = graph
        .cells(working)?
        .into_iter()
        .find(|&cell| graph.datum(cell) == Some(SEPARATOR))
        .ok_or(MatchFailure::MissingSeparator)?;
    let spec = graph.split_after(working, separator)?;
    graph.pop_top(spec)?;
    let segments = decompose(graph, working, input)?;
    Ok(assemble(graph, spec, segments)?)
}
