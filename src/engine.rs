//! Turn pipeline over a loaded script.
//!
//! [`Engine`] owns the cell graph, the loaded script, the memory queue and
//! the turn counter. A turn runs through named stages:
//!
//! 1. **scan**: walk the input, split off the clause, apply substitutions and
//!    pick the keyword candidate by precedence;
//! 2. **memorize**: if the candidate is the memory keyword, build a deferred
//!    response from a memory rule;
//! 3. **decompose**: try the candidate's decomposition entries in order,
//!    following `(= KEYWORD)` redirects;
//! 4. **reassemble**: rotate to the next reassembly of the matching entry and
//!    build the response.
//!
//! Without a candidate the turn emits a queued memory on the last turn of the
//! cycle, otherwise a fallback response. When everything fails the response
//! is a fixed no-match phrase.
//!
//! # Invariants
//! - `process_turn` never fails; internal errors are logged and degrade to
//!   the no-match phrase.
//! - Garbage is collected after every turn. Roots are the script lists and
//!   the memory queue.

use crate::codec::{parse_list, print_list, print_text, read_text, CodecError};
use crate::config::{ConfigError, EngineConfig};
use crate::cursor::Cursor;
use crate::graph::{CellGraph, GraphError, ListId, Payload};
use crate::hash::{self, MEMORY_BITS};
use crate::pattern::{apply_rule, assemble, decompose, segments_to_list, MatchFailure};
use crate::rotation::AlternativeSet;
use crate::script::{redirect_target, Precedence, RuleEntry, Script, ScriptError};
use thiserror::Error;

/// Errors raised by engine construction and runtime additions.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The script could not be loaded or extended.
    #[error(transparent)]
    Script(#[from] ScriptError),
    /// Text could not be parsed or printed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Graph access failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Where a turn's response came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
    /// A keyword entry's decomposition matched.
    Keyword {
        /// Keyword of the entry whose decomposition matched.
        keyword: String,
        /// 1-based reassembly used.
        alternative: usize,
    },
    /// A queued memory was emitted.
    Memory,
    /// A fallback reassembly was used.
    Fallback {
        /// 1-based reassembly used.
        alternative: usize,
    },
    /// Nothing matched; a fixed phrase was used.
    NoMatch,
}

/// Outcome of one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /// Response text.
    pub response: String,
    /// How the response was produced.
    pub source: ResponseSource,
    /// Turn counter value for this turn (1-based, cycling).
    pub turn: u32,
    /// Whether a memory was queued during this turn.
    pub memorized: bool,
}

struct Candidate {
    keyword: String,
    entry: RuleEntry,
}

struct Matched {
    keyword: String,
    set: AlternativeSet,
    segments: ListId,
}

/// The script interpreter.
#[derive(Debug)]
pub struct Engine {
    pub(crate) graph: CellGraph,
    pub(crate) script: Script,
    pub(crate) config: EngineConfig,
    memory_queue: ListId,
    turn: u32,
}

impl Engine {
    /// Loads `script` with the given configuration.
    pub fn load(script: &str, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let mut graph = CellGraph::new();
        let script = Script::load(&mut graph, script, &config)?;
        let memory_queue = graph.new_list();
        let mut engine = Self {
            graph,
            script,
            config,
            memory_queue,
            turn: 1,
        };
        engine.collect_garbage();
        Ok(engine)
    }

    /// Loads `script` with the default configuration.
    pub fn with_defaults(script: &str) -> Result<Self, EngineError> {
        Self::load(script, EngineConfig::default())
    }

    /// Greeting text of the script.
    pub fn greeting(&self) -> String {
        print_text(&self.graph, self.script.greeting()).unwrap_or_default()
    }

    /// Cell graph holding the script.
    pub fn graph(&self) -> &CellGraph {
        &self.graph
    }

    /// Loaded script.
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current value of the turn counter.
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Number of memories waiting to be emitted.
    pub fn queued_memories(&self) -> usize {
        self.graph.len(self.memory_queue).unwrap_or(0)
    }

    /// Responds to one line of user text.
    pub fn process_turn(&mut self, text: &str) -> String {
        self.process_turn_traced(text).response
    }

    /// Responds to one line of user text and reports how the response was
    /// produced.
    pub fn process_turn_traced(&mut self, text: &str) -> TurnReport {
        self.turn = self.turn % self.config.turn_cycle + 1;
        tracing::debug!(turn = self.turn, input = text, "turn started");

        let report = match self.run_turn(text) {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(%err, "turn failed, answering with the no-match phrase");
                self.no_match(false)
            }
        };
        self.collect_garbage();
        report
    }

    fn run_turn(&mut self, text: &str) -> Result<TurnReport, EngineError> {
        let input = read_text(&mut self.graph, text)?;
        let Some(candidate) = self.scan_keywords(input)? else {
            return self.respond_without_keyword(input);
        };

        let memorized = self.is_memory_keyword(&candidate.keyword) && self.memorize(input)?;

        let Some(matched) = self.decompose_with_fallthrough(&candidate, input)? else {
            return Ok(self.no_match(memorized));
        };
        let keyword = matched.keyword.clone();
        match self.reassemble(matched)? {
            Some((response, alternative)) => Ok(TurnReport {
                response,
                source: ResponseSource::Keyword { keyword, alternative },
                turn: self.turn,
                memorized,
            }),
            None => Ok(self.no_match(memorized)),
        }
    }

    /// Scans the input, trimming it to the clause of the selected keyword.
    fn scan_keywords(&mut self, input: ListId) -> Result<Option<Candidate>, EngineError> {
        let mut cursor = Cursor::new(&self.graph, input)?;
        let mut candidate: Option<Candidate> = None;
        let mut best = 0u32;

        while let Some(word) = cursor.next_token(&self.graph)?.map(str::to_owned) {
            let cell = cursor.position();

            if self.config.is_clause_delimiter(&word) {
                if candidate.is_none() {
                    let discarded = self.graph.split_before(input, cell)?;
                    tracing::trace!(delimiter = %word, discarded = self.graph.len(discarded)?, "dropped clause before keyword");
                    cursor.reset(&self.graph)?;
                    continue;
                }
                let discarded = self.graph.split_after(input, cell)?;
                tracing::trace!(delimiter = %word, discarded = self.graph.len(discarded)?, "dropped text after keyword clause");
                break;
            }

            let entry = match self.script.index().lookup(&self.graph, &word) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(ScriptError::UnhashableKeyword { source, .. }) => {
                    tracing::warn!(token = %word, %source, "input token skipped as keyword");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let Some(rule) = RuleEntry::read(&self.graph, entry)? else {
                continue;
            };

            if let Some(substitution) = &rule.substitution {
                self.graph.substitute(cell, Payload::Datum(substitution.clone()))?;
            }
            if let Some(description) = self.graph.description(entry)? {
                self.graph.insert_after(cell, Payload::Link(description))?;
            }

            let selected = match rule.precedence {
                Some(Precedence::Implicit) => candidate.is_none(),
                Some(Precedence::Explicit(rank)) if rank > best => {
                    best = rank;
                    true
                }
                _ => false,
            };
            if selected {
                tracing::debug!(keyword = %word, precedence = ?rule.precedence, "keyword candidate");
                candidate = Some(Candidate {
                    keyword: word,
                    entry: rule,
                });
            }
        }
        Ok(candidate)
    }

    fn is_memory_keyword(&self, keyword: &str) -> bool {
        self.script
            .memory()
            .is_some_and(|memory| memory.keyword.eq_ignore_ascii_case(keyword))
    }

    /// Queues a memory built from the input's last token. Returns whether one
    /// was queued.
    fn memorize(&mut self, input: ListId) -> Result<bool, EngineError> {
        let Some(memory) = self.script.memory() else {
            return Ok(false);
        };
        let Some(last) = self
            .graph
            .bottom(input)?
            .and_then(|cell| self.graph.datum(cell))
            .map(str::to_owned)
        else {
            return Ok(false);
        };
        let slot = match hash::hash(&last, MEMORY_BITS) {
            Ok(slot) => slot,
            Err(err) => {
                tracing::warn!(%err, "memory skipped");
                return Ok(false);
            }
        };
        let rule = memory.rules[slot];

        match apply_rule(&mut self.graph, rule, input) {
            Ok(assembly) => {
                self.graph.push_link(self.memory_queue, assembly.output)?;
                tracing::debug!(
                    rule = slot,
                    queued = self.graph.len(self.memory_queue)?,
                    "memory queued"
                );
                Ok(true)
            }
            Err(MatchFailure::Graph(err)) => Err(err.into()),
            Err(failure) => {
                tracing::trace!(rule = slot, %failure, "memory rule did not match");
                Ok(false)
            }
        }
    }

    /// Tries decomposition entries in order, following redirects.
    fn decompose_with_fallthrough(
        &mut self,
        candidate: &Candidate,
        input: ListId,
    ) -> Result<Option<Matched>, EngineError> {
        let mut keyword = candidate.entry.keyword.clone();
        let mut decompositions = candidate.entry.decompositions(&self.graph)?;
        let mut redirects = 0;
        let mut next = 0;

        while let Some(&decomposition) = decompositions.get(next) {
            next += 1;

            if let Some(target) = redirect_target(&self.graph, decomposition)? {
                redirects += 1;
                if redirects > self.config.max_redirects {
                    tracing::warn!(keyword = %keyword, redirects, "redirect limit reached");
                    return Ok(None);
                }
                let entry = match self.script.index().lookup(&self.graph, &target) {
                    Ok(Some(entry)) => entry,
                    Ok(None) | Err(ScriptError::UnhashableKeyword { .. }) => {
                        tracing::warn!(from = %keyword, to = %target, "redirect to unknown keyword");
                        return Ok(None);
                    }
                    Err(err) => return Err(err.into()),
                };
                tracing::debug!(from = %keyword, to = %target, "redirect");
                keyword = RuleEntry::read(&self.graph, entry)?.map_or(target, |rule| rule.keyword);
                decompositions = self
                    .graph
                    .cells(entry)?
                    .into_iter()
                    .filter_map(|cell| self.graph.link(cell))
                    .collect();
                next = 0;
                continue;
            }

            let Some(set) = AlternativeSet::read(&self.graph, decomposition)? else {
                continue;
            };
            match decompose(&mut self.graph, set.pattern(), input) {
                Ok(segments) => {
                    return Ok(Some(Matched {
                        keyword,
                        set,
                        segments,
                    }))
                }
                Err(MatchFailure::Graph(err)) => return Err(err.into()),
                Err(failure) if failure.is_malformed() => {
                    tracing::warn!(keyword = %keyword, %failure, "malformed decomposition skipped");
                }
                Err(failure) => {
                    tracing::trace!(keyword = %keyword, %failure, "decomposition did not match");
                }
            }
        }
        Ok(None)
    }

    /// Rotates to the next reassembly and builds the response text.
    fn reassemble(&mut self, mut matched: Matched) -> Result<Option<(String, usize)>, EngineError> {
        let Some(selected) = matched.set.select(&mut self.graph)? else {
            return Ok(None);
        };
        let assembly = assemble(&mut self.graph, selected.reassembly, matched.segments)?;
        Ok(Some((print_text(&self.graph, assembly.output)?, selected.index)))
    }

    fn respond_without_keyword(&mut self, input: ListId) -> Result<TurnReport, EngineError> {
        if self.turn == self.config.turn_cycle {
            if let Some(Payload::Link(memory)) = self.graph.pop_top(self.memory_queue)? {
                tracing::debug!(remaining = self.graph.len(self.memory_queue)?, "memory emitted");
                return Ok(TurnReport {
                    response: print_text(&self.graph, memory)?,
                    source: ResponseSource::Memory,
                    turn: self.turn,
                    memorized: false,
                });
            }
        }

        let Some(entry) = self.script.fallback_entry(&self.graph)? else {
            return Ok(self.no_match(false));
        };
        let Some(decomposition) = self.graph.bottom(entry)?.and_then(|cell| self.graph.link(cell)) else {
            return Ok(self.no_match(false));
        };
        let Some(mut set) = AlternativeSet::read(&self.graph, decomposition)? else {
            return Ok(self.no_match(false));
        };

        let segments = match decompose(&mut self.graph, set.pattern(), input) {
            Ok(segments) => segments,
            Err(MatchFailure::Graph(err)) => return Err(err.into()),
            Err(_) => segments_to_list(&mut self.graph, Vec::new())?,
        };
        let Some(selected) = set.select(&mut self.graph)? else {
            return Ok(self.no_match(false));
        };
        let assembly = assemble(&mut self.graph, selected.reassembly, segments)?;
        Ok(TurnReport {
            response: print_text(&self.graph, assembly.output)?,
            source: ResponseSource::Fallback {
                alternative: selected.index,
            },
            turn: self.turn,
            memorized: false,
        })
    }

    fn no_match(&self, memorized: bool) -> TurnReport {
        TurnReport {
            response: self.config.no_match_phrase(self.turn).to_owned(),
            source: ResponseSource::NoMatch,
            turn: self.turn,
            memorized,
        }
    }

    /// Parses a keyword entry and adds it to the index. Returns its bucket.
    pub fn add_keyword_entry(&mut self, text: &str) -> Result<usize, EngineError> {
        let result = parse_list(&mut self.graph, text)
            .map_err(EngineError::from)
            .and_then(|entry| Ok(self.script.add_entry(&mut self.graph, entry)?));
        self.collect_garbage();
        let bucket = result?;
        tracing::debug!(bucket, "keyword entry added");
        Ok(bucket)
    }

    /// Prints the script in loadable form.
    pub fn dump_script(&self) -> Result<String, CodecError> {
        self.script.dump(&self.graph, &self.config)
    }

    /// Prints one list of the graph, for diagnostics.
    pub fn print(&self, list: ListId) -> Result<String, CodecError> {
        print_list(&self.graph, list)
    }

    /// Frees everything unreachable from the script and the memory queue.
    pub(crate) fn collect_garbage(&mut self) -> usize {
        let mut roots = self.script.roots();
        roots.push(self.memory_queue);
        self.graph.collect_garbage(&roots)
    }
}
