//! Runtime edits of keyword entries.
//!
//! These are the entry points an interactive editing shell drives: print an
//! entry, swap or extend one of its rules, add a decomposition, or change
//! its precedence. Every edit works in place on the loaded graph, so the
//! change is live for the next turn and part of the next dump.

use crate::codec::{parse_list, print_list, CodecError};
use crate::engine::Engine;
use crate::graph::{CellGraph, CellId, GraphError, ListId, Payload};
use crate::script::{check_pattern, validate_decomposition, RuleEntry, ScriptError};
use thiserror::Error;

/// One edit of a keyword entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Print the entry.
    Show,
    /// Replace the pattern or reassembly equal to `old` with `new`.
    Replace {
        /// Parenthesized list to look for.
        old: String,
        /// Parenthesized replacement.
        new: String,
    },
    /// Add `new` as a further reassembly of the decomposition holding `old`.
    Append {
        /// Parenthesized list to look for.
        old: String,
        /// Parenthesized reassembly to add.
        new: String,
    },
    /// Add a decomposition entry, keeping a trailing one last.
    Add {
        /// Parenthesized decomposition entry.
        rule: String,
    },
    /// Set the explicit precedence.
    SetPrecedence(u32),
}

/// What an edit produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// Printed entry, for [`EditOp::Show`].
    Shown(String),
    /// Entry as printed after the edit.
    Updated(String),
}

/// Errors raised by [`Engine::edit_rule`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// No entry has this keyword.
    #[error("no entry for keyword {0:?}")]
    UnknownKeyword(String),
    /// No pattern or reassembly of the entry equals the given list.
    #[error("entry {keyword:?} has no rule {rule}")]
    RuleNotFound {
        /// Entry searched.
        keyword: String,
        /// Rule looked for, as printed.
        rule: String,
    },
    /// The indexed list is not a keyword entry.
    #[error("{0:?} is not a keyword entry")]
    NotAnEntry(String),
    /// Argument text could not be parsed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The edit would break the script.
    #[error(transparent)]
    Script(#[from] ScriptError),
    /// Graph access failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Location of a rule inside an entry.
struct RuleSite {
    decomposition: ListId,
    cell: CellId,
    is_pattern: bool,
}

fn same_tokens(graph: &CellGraph, a: ListId, b: ListId) -> Result<bool, GraphError> {
    let left = graph.tokens(a)?;
    let right = graph.tokens(b)?;
    Ok(left.len() == right.len()
        && left.iter().zip(&right).all(|(x, y)| x.eq_ignore_ascii_case(y)))
}

/// First pattern or reassembly of `entry` whose tokens equal those of `old`.
fn find_rule(graph: &CellGraph, entry: ListId, old: ListId) -> Result<Option<RuleSite>, GraphError> {
    for outer in graph.cells(entry)? {
        let Some(decomposition) = graph.link(outer) else {
            continue;
        };
        for (position, cell) in graph.cells(decomposition)?.into_iter().enumerate() {
            let Some(rule) = graph.link(cell) else {
                continue;
            };
            if same_tokens(graph, rule, old)? {
                return Ok(Some(RuleSite {
                    decomposition,
                    cell,
                    is_pattern: position == 0,
                }));
            }
        }
    }
    Ok(None)
}

impl Engine {
    /// Applies `op` to the entry of `keyword`.
    pub fn edit_rule(&mut self, keyword: &str, op: EditOp) -> Result<EditOutcome, EditError> {
        let result = self.apply_edit(keyword, op);
        self.collect_garbage();
        if let Err(err) = &result {
            tracing::warn!(keyword, %err, "edit rejected");
        }
        result
    }

    fn apply_edit(&mut self, keyword: &str, op: EditOp) -> Result<EditOutcome, EditError> {
        let entry = self
            .script
            .index()
            .lookup(&self.graph, keyword)?
            .ok_or_else(|| EditError::UnknownKeyword(keyword.to_owned()))?;
        let rule = RuleEntry::read(&self.graph, entry)?
            .ok_or_else(|| EditError::NotAnEntry(keyword.to_owned()))?;

        match op {
            EditOp::Show => return Ok(EditOutcome::Shown(print_list(&self.graph, entry)?)),
            EditOp::Replace { old, new } => {
                let site = self.locate(&rule, &old)?;
                let replacement = parse_list(&mut self.graph, &new)?;
                if site.is_pattern {
                    check_pattern(&self.graph, replacement, &rule.keyword)?;
                }
                self.graph.substitute(site.cell, Payload::Link(replacement))?;
                tracing::debug!(keyword = %rule.keyword, old = %old, new = %new, "rule replaced");
            }
            EditOp::Append { old, new } => {
                let site = self.locate(&rule, &old)?;
                let reassembly = parse_list(&mut self.graph, &new)?;
                self.graph.push_link(site.decomposition, reassembly)?;
                tracing::debug!(keyword = %rule.keyword, new = %new, "reassembly appended");
            }
            EditOp::Add { rule: text } => {
                let decomposition = parse_list(&mut self.graph, &text)?;
                validate_decomposition(&self.graph, decomposition, &rule.keyword)?;
                let payload = Payload::Link(decomposition);
                match self.graph.bottom(entry)? {
                    Some(bottom) if self.graph.link(bottom).is_some() => {
                        self.graph.insert_before(bottom, payload)?;
                    }
                    _ => {
                        self.graph.insert_bottom(entry, payload)?;
                    }
                }
                tracing::debug!(keyword = %rule.keyword, rule = %text, "decomposition added");
            }
            EditOp::SetPrecedence(rank) => {
                let payload = Payload::Datum(rank.to_string());
                match rule.precedence_cell {
                    Some(cell) => self.graph.substitute(cell, payload)?,
                    None => {
                        self.graph.insert_after(rule.prefix_end, payload)?;
                    }
                }
                tracing::debug!(keyword = %rule.keyword, rank, "precedence set");
            }
        }
        Ok(EditOutcome::Updated(print_list(&self.graph, entry)?))
    }

    fn locate(&mut self, rule: &RuleEntry, old: &str) -> Result<RuleSite, EditError> {
        let old_list = parse_list(&mut self.graph, old)?;
        find_rule(&self.graph, rule.list, old_list)?.ok_or_else(|| EditError::RuleNotFound {
            keyword: rule.keyword.clone(),
            rule: old.to_owned(),
        })
    }
}
