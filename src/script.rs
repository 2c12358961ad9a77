//! Script loading, the keyword index and typed views over rule entries.
//!
//! A script is a stream of parenthesized lists:
//!
//! ```text
//! (HOW DO YOU DO. PLEASE TELL ME YOUR PROBLEM)
//! (SORRY ((0) (PLEASE DON'T APOLOGIZE) (APOLOGIES ARE NOT NECESSARY)))
//! (I = YOU ((0 YOU WANT 0) (WHY DO YOU WANT 4)))
//! (MACHINE 50 (= COMPUTER))
//! (NONE ((0) (PLEASE GO ON)))
//! (MEMORY MY (0 YOUR 0 = EARLIER YOU SAID YOUR 3) ...)
//! ()
//! ```
//!
//! The first list is the greeting. Entries follow until an empty list or the
//! end of the text. Keyword entries are hashed into 32 buckets; `NONE` entries
//! form the fallback list; the `MEMORY` entry names the memory keyword and its
//! four rules.
//!
//! # Keyword entry layout
//! `(KEYWORD [= SUBSTITUTE] [PRECEDENCE] decomposition...)`. A decomposition
//! directly after the prefix gives the entry an implicit precedence. An
//! integer gives it an explicit one. An entry with neither only rewrites the
//! input and is never selected.

use crate::codec::{print_list, CodecError, ListReader};
use crate::config::EngineConfig;
use crate::graph::{CellGraph, CellId, CellKind, GraphError, ListId, Payload};
use crate::hash::{self, HashError, BUCKET_BITS};
use crate::pattern::{PatternElement, SEPARATOR};
use thiserror::Error;

/// Number of keyword buckets.
pub const BUCKET_COUNT: usize = 1 << BUCKET_BITS;

/// Number of memory rules.
pub const MEMORY_RULE_COUNT: usize = 4;

/// Errors raised while loading or extending a script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// The script text is not a well-formed list stream.
    #[error("malformed script text: {0}")]
    Codec(#[from] CodecError),
    /// Graph access failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The script holds no greeting list.
    #[error("script is empty, a greeting list is required")]
    MissingGreeting,
    /// An entry does not start with a keyword token.
    #[error("entry {0} does not start with a keyword")]
    MissingKeyword(usize),
    /// An entry added outside of a script load does not start with a keyword.
    #[error("added entry does not start with a keyword")]
    UnnamedEntry,
    /// A keyword contains a character without a Hollerith code.
    #[error("keyword {keyword:?} cannot be indexed: {source}")]
    UnhashableKeyword {
        /// Offending keyword.
        keyword: String,
        /// Hashing failure.
        #[source]
        source: HashError,
    },
    /// A pattern holds a negative segment length.
    #[error("pattern in entry {keyword:?} has negative segment length {length}")]
    NegativeLength {
        /// Entry holding the pattern.
        keyword: String,
        /// Offending length.
        length: i64,
    },
    /// A `(= KEYWORD)` redirect without the keyword.
    #[error("redirect in entry {0:?} names no keyword")]
    EmptyRedirect(String),
    /// The memory entry lacks its keyword.
    #[error("memory entry has no keyword")]
    MissingMemoryKeyword,
    /// The memory entry does not hold exactly four `=` rules.
    #[error("memory entry needs four rules containing '=', found {0} usable")]
    MemoryRules(usize),
}

/// Precedence of a selectable keyword entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// No number given: wins only if nothing was selected yet.
    Implicit,
    /// Explicit rank: replaces a candidate of lower rank.
    Explicit(u32),
}

/// Typed view of a keyword entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    /// Entry list.
    pub list: ListId,
    /// Keyword as written in the script.
    pub keyword: String,
    /// Replacement written into the input when the keyword occurs.
    pub substitution: Option<String>,
    /// `None` for substitution-only entries.
    pub precedence: Option<Precedence>,
    /// Cell holding an explicit precedence.
    pub precedence_cell: Option<CellId>,
    /// Last cell of the `KEYWORD [= SUBSTITUTE]` prefix.
    pub prefix_end: CellId,
}

impl RuleEntry {
    /// Reads the prefix of `list`. Returns `None` if it does not start with a
    /// keyword token.
    pub fn read(graph: &CellGraph, list: ListId) -> Result<Option<Self>, GraphError> {
        let Some(first) = graph.top(list)? else {
            return Ok(None);
        };
        let Some(keyword) = graph.datum(first).map(str::to_owned) else {
            return Ok(None);
        };

        let mut prefix_end = first;
        let mut substitution = None;
        let after_keyword = graph.right(first)?;
        if graph.datum(after_keyword) == Some(SEPARATOR) {
            prefix_end = after_keyword;
            let replacement = graph.right(after_keyword)?;
            if let Some(token) = graph.datum(replacement) {
                substitution = Some(token.to_owned());
                prefix_end = replacement;
            }
        }

        let next = graph.right(prefix_end)?;
        let (precedence, precedence_cell) = match graph.kind(next)? {
            CellKind::Link(_) => (Some(Precedence::Implicit), None),
            CellKind::Datum(token) => match token.parse::<u32>() {
                Ok(rank) => (Some(Precedence::Explicit(rank)), Some(next)),
                Err(_) => (None, None),
            },
            CellKind::Header(_) => (None, None),
        };

        Ok(Some(Self {
            list,
            keyword,
            substitution,
            precedence,
            precedence_cell,
            prefix_end,
        }))
    }

    /// Returns `true` if the entry can drive a turn.
    pub fn is_selectable(&self) -> bool {
        self.precedence.is_some()
    }

    /// Decomposition entries in order.
    pub fn decompositions(&self, graph: &CellGraph) -> Result<Vec<ListId>, GraphError> {
        Ok(graph
            .cells(self.list)?
            .into_iter()
            .filter_map(|cell| graph.link(cell))
            .collect())
    }
}

/// Target of a `(= KEYWORD)` decomposition entry, if it is one.
pub fn redirect_target(graph: &CellGraph, decomposition: ListId) -> Result<Option<String>, GraphError> {
    let Some(top) = graph.top(decomposition)? else {
        return Ok(None);
    };
    if graph.datum(top) != Some(SEPARATOR) {
        return Ok(None);
    }
    let mut cell = graph.right(top)?;
    while !graph.is_header(cell) {
        if let Some(token) = graph.datum(cell) {
            return Ok(Some(token.to_owned()));
        }
        cell = graph.right(cell)?;
    }
    Ok(None)
}

/// Thirty-two hash buckets of keyword entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordIndex {
    buckets: Vec<ListId>,
}

impl KeywordIndex {
    /// Creates an index with empty buckets.
    pub fn new(graph: &mut CellGraph) -> Self {
        Self {
            buckets: (0..BUCKET_COUNT).map(|_| graph.new_list()).collect(),
        }
    }

    /// Bucket lists in order.
    pub fn buckets(&self) -> &[ListId] {
        &self.buckets
    }

    /// Bucket number of `keyword`.
    pub fn bucket_of(keyword: &str) -> Result<usize, ScriptError> {
        hash::hash(keyword, BUCKET_BITS).map_err(|source| ScriptError::UnhashableKeyword {
            keyword: keyword.to_owned(),
            source,
        })
    }

    /// Appends `entry` to the bucket of its keyword and returns the bucket.
    pub fn insert(&self, graph: &mut CellGraph, entry: ListId) -> Result<usize, ScriptError> {
        let keyword = graph
            .top(entry)?
            .and_then(|cell| graph.datum(cell))
            .map(str::to_owned)
            .ok_or(ScriptError::UnnamedEntry)?;
        let bucket = Self::bucket_of(&keyword)?;
        graph.push_link(self.buckets[bucket], entry)?;
        tracing::trace!(keyword = %keyword, bucket, "indexed keyword entry");
        Ok(bucket)
    }

    /// First entry whose keyword equals `keyword`, ignoring case.
    pub fn lookup(&self, graph: &CellGraph, keyword: &str) -> Result<Option<ListId>, ScriptError> {
        let bucket = Self::bucket_of(keyword)?;
        for cell in graph.cells(self.buckets[bucket])? {
            let Some(entry) = graph.link(cell) else {
                continue;
            };
            let matches = graph
                .top(entry)?
                .and_then(|top| graph.datum(top))
                .is_some_and(|token| token.eq_ignore_ascii_case(keyword));
            if matches {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Every entry, bucket by bucket.
    pub fn entries(&self, graph: &CellGraph) -> Result<Vec<ListId>, GraphError> {
        let mut entries = Vec::new();
        for &bucket in &self.buckets {
            entries.extend(graph.cells(bucket)?.into_iter().filter_map(|cell| graph.link(cell)));
        }
        Ok(entries)
    }
}

/// Memory keyword and its rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRules {
    /// Keyword that triggers memorizing.
    pub keyword: String,
    /// Combined rules, chosen by `hash(last token, 2)`.
    pub rules: [ListId; MEMORY_RULE_COUNT],
}

/// A loaded script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    greeting: ListId,
    index: KeywordIndex,
    fallback: ListId,
    memory: Option<MemoryRules>,
}

impl Script {
    /// Parses `text` into `graph` and indexes its entries.
    pub fn load(graph: &mut CellGraph, text: &str, config: &EngineConfig) -> Result<Self, ScriptError> {
        let mut reader = ListReader::new(text);
        let greeting = reader.read_list(graph)?.ok_or(ScriptError::MissingGreeting)?;
        let mut script = Self {
            greeting,
            index: KeywordIndex::new(graph),
            fallback: graph.new_list(),
            memory: None,
        };

        let mut ordinal = 0;
        while let Some(entry) = reader.read_list(graph)? {
            ordinal += 1;
            if graph.is_empty(entry)? {
                break;
            }
            let Some(head) = graph.top(entry)?.and_then(|cell| graph.datum(cell)).map(str::to_owned) else {
                return Err(ScriptError::MissingKeyword(ordinal));
            };

            if head.eq_ignore_ascii_case(&config.fallback_prefix) {
                validate_decompositions(graph, entry, &head)?;
                graph.insert_top(script.fallback, Payload::Link(entry))?;
            } else if head.eq_ignore_ascii_case(&config.memory_prefix) {
                script.memory = Some(read_memory(graph, entry)?);
            } else {
                script.add_entry(graph, entry)?;
            }
        }

        tracing::debug!(
            entries = ordinal,
            keywords = script.index.entries(graph)?.len(),
            memory = script.memory.is_some(),
            "script loaded"
        );
        Ok(script)
    }

    /// Validates a keyword entry and adds it to the index.
    pub fn add_entry(&self, graph: &mut CellGraph, entry: ListId) -> Result<usize, ScriptError> {
        let Some(rule) = RuleEntry::read(graph, entry)? else {
            return Err(ScriptError::UnnamedEntry);
        };
        KeywordIndex::bucket_of(&rule.keyword)?;
        validate_decompositions(graph, entry, &rule.keyword)?;
        self.index.insert(graph, entry)
    }

    /// Greeting list.
    pub fn greeting(&self) -> ListId {
        self.greeting
    }

    /// Keyword index.
    pub fn index(&self) -> &KeywordIndex {
        &self.index
    }

    /// List of fallback entries, most recently loaded first.
    pub fn fallback(&self) -> ListId {
        self.fallback
    }

    /// Fallback entry in effect.
    pub fn fallback_entry(&self, graph: &CellGraph) -> Result<Option<ListId>, GraphError> {
        Ok(graph.top(self.fallback)?.and_then(|cell| graph.link(cell)))
    }

    /// Memory keyword and rules, if the script has them.
    pub fn memory(&self) -> Option<&MemoryRules> {
        self.memory.as_ref()
    }

    /// Lists that keep the script alive.
    pub fn roots(&self) -> Vec<ListId> {
        let mut roots = vec![self.greeting, self.fallback];
        roots.extend_from_slice(self.index.buckets());
        if let Some(memory) = &self.memory {
            roots.extend_from_slice(&memory.rules);
        }
        roots
    }

    /// Prints the script in loadable form, rotation counters included.
    pub fn dump(&self, graph: &CellGraph, config: &EngineConfig) -> Result<String, CodecError> {
        let mut lines = vec![print_list(graph, self.greeting)?];

        if let Some(memory) = &self.memory {
            let mut parts = vec![config.memory_prefix.clone(), memory.keyword.clone()];
            for &rule in &memory.rules {
                parts.push(print_list(graph, rule)?);
            }
            lines.push(format!("({})", parts.join(" ")));
        }

        for entry in self.index.entries(graph)? {
            lines.push(print_list(graph, entry)?);
        }

        // Loading pushes fallback entries on top, so write them bottom first.
        let fallbacks: Vec<ListId> = graph
            .cells(self.fallback)?
            .into_iter()
            .filter_map(|cell| graph.link(cell))
            .collect();
        for &entry in fallbacks.iter().rev() {
            lines.push(print_list(graph, entry)?);
        }

        lines.push("()".to_owned());
        let mut text = lines.join("\n");
        text.push('\n');
        Ok(text)
    }
}

fn read_memory(graph: &CellGraph, entry: ListId) -> Result<MemoryRules, ScriptError> {
    let cells = graph.cells(entry)?;
    let keyword = cells
        .get(1)
        .and_then(|&cell| graph.datum(cell))
        .map(str::to_owned)
        .ok_or(ScriptError::MissingMemoryKeyword)?;

    let mut rules = Vec::new();
    for &cell in cells.iter().skip(2) {
        let Some(rule) = graph.link(cell) else {
            continue;
        };
        if graph.tokens(rule)?.iter().any(|token| token == SEPARATOR) {
            check_pattern(graph, rule, &keyword)?;
            rules.push(rule);
        }
    }
    let found = rules.len();
    let rules: [ListId; MEMORY_RULE_COUNT] = rules.try_into().map_err(|_| ScriptError::MemoryRules(found))?;
    Ok(MemoryRules { keyword, rules })
}

fn validate_decompositions(graph: &CellGraph, entry: ListId, keyword: &str) -> Result<(), ScriptError> {
    for cell in graph.cells(entry)? {
        if let Some(decomposition) = graph.link(cell) {
            validate_decomposition(graph, decomposition, keyword)?;
        }
    }
    Ok(())
}

/// Checks one decomposition entry: a redirect must name a keyword and a
/// pattern must not hold negative lengths.
pub(crate) fn validate_decomposition(
    graph: &CellGraph,
    decomposition: ListId,
    keyword: &str,
) -> Result<(), ScriptError> {
    let Some(top) = graph.top(decomposition)? else {
        return Ok(());
    };
    if graph.datum(top) == Some(SEPARATOR) {
        if redirect_target(graph, decomposition)?.is_none() {
            return Err(ScriptError::EmptyRedirect(keyword.to_owned()));
        }
    } else if let Some(pattern) = graph.link(top) {
        check_pattern(graph, pattern, keyword)?;
    }
    Ok(())
}

pub(crate) fn check_pattern(graph: &CellGraph, pattern: ListId, keyword: &str) -> Result<(), ScriptError> {
    for token in graph.tokens(pattern)? {
        if token == SEPARATOR {
            break;
        }
        if let PatternElement::Negative(length) = PatternElement::parse(&token) {
            return Err(ScriptError::NegativeLength {
                keyword: keyword.to_owned(),
                length,
            });
        }
    }
    Ok(())
}
