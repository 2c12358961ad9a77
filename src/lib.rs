//! slipscript: a keyword-driven conversation engine over symmetric list
//! structures.
//!
//! A script is a sequence of parenthesized lists: a greeting, keyword
//! entries with decomposition patterns and rotating reassembly rules,
//! fallback entries and a memory entry. The engine loads the script into a
//! graph of circular doubly-linked cells and answers each line of user text
//! by selecting a keyword, decomposing the input and reassembling a
//! response.
//!
//! # Layers
//!
//! - [`arena`], [`graph`] and [`cursor`]: generational storage and the list
//!   primitives everything else is written in.
//! - [`hash`] and [`codec`]: keyword hashing and the text form of lists.
//! - [`pattern`] and [`rotation`]: decomposition, reassembly and the
//!   persisted alternative counters.
//! - [`script`], [`engine`] and [`edit`]: loading, turn processing and live
//!   editing of a script.
//!
//! # Example
//!
//! ```
//! use slipscript::prelude::*;
//!
//! let script = "
//!     (HELLO)
//!     (PERHAPS ((0) (YOU DON'T SEEM QUITE CERTAIN)))
//!     (NONE ((0) (PLEASE GO ON)))
//!     ()
//! ";
//! let mut engine = Engine::with_defaults(script).unwrap();
//! assert_eq!(engine.greeting(), "HELLO");
//! assert_eq!(engine.process_turn("perhaps"), "YOU DON'T SEEM QUITE CERTAIN");
//! assert_eq!(engine.process_turn("anything else"), "PLEASE GO ON");
//! ```

pub mod arena;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod edit;
pub mod engine;
pub mod graph;
pub mod hash;
pub mod pattern;
pub mod rotation;
pub mod script;

pub use config::{ConfigError, EngineConfig};
pub use edit::{EditError, EditOp, EditOutcome};
pub use engine::{Engine, EngineError, ResponseSource, TurnReport};
pub use graph::{CellGraph, CellId, GraphError, ListId, Payload};
pub use script::{Script, ScriptError};

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::arena::{Arena, ArenaId};
    pub use crate::codec::{parse_list, print_list, print_text, read_text, CodecError, ListReader};
    pub use crate::config::{ConfigError, EngineConfig};
    pub use crate::cursor::Cursor;
    pub use crate::edit::{EditError, EditOp, EditOutcome};
    pub use crate::engine::{Engine, EngineError, ResponseSource, TurnReport};
    pub use crate::graph::{CellGraph, CellId, CellKind, GraphError, ListId, Payload};
    pub use crate::hash::{hash, hash_word, HashError};
    pub use crate::pattern::{apply_rule, assemble, decompose, match_segments, Assembly, MatchFailure};
    pub use crate::rotation::{AlternativeSet, Alternatives, Selected};
    pub use crate::script::{KeywordIndex, MemoryRules, Precedence, RuleEntry, Script, ScriptError};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    const DOCTOR: &str = include_str!("../scripts/doctor.txt");

    fn doctor() -> Engine {
        Engine::with_defaults(DOCTOR).unwrap()
    }

    /// The bundled script loads with its greeting and memory entry.
    #[test]
    fn doctor_script_loads() {
        let engine = doctor();
        assert_eq!(engine.greeting(), "HOW DO YOU DO. PLEASE TELL ME YOUR PROBLEM");
        assert_eq!(engine.script().memory().map(|m| m.keyword.as_str()), Some("MY"));
        assert_eq!(engine.queued_memories(), 0);
    }

    /// Repeating a keyword walks through its reassemblies and wraps around.
    #[test]
    fn keyword_reassemblies_rotate() {
        let mut engine = doctor();
        assert_eq!(engine.process_turn("PERHAPS"), "YOU DON'T SEEM QUITE CERTAIN");
        assert_eq!(engine.process_turn("perhaps"), "WHY THE UNCERTAIN TONE");
        assert_eq!(engine.process_turn("Perhaps"), "YOU DON'T SEEM QUITE CERTAIN");
    }

    /// Input without keywords cycles through the fallback reassemblies.
    #[test]
    fn fallback_cycles_through_alternatives() {
        let mut engine = doctor();
        let alternatives: Vec<ResponseSource> = (0..5)
            .map(|_| engine.process_turn_traced("HELLO THERE").source)
            .collect();
        let expected: Vec<ResponseSource> = [1, 2, 3, 4, 1]
            .into_iter()
            .map(|alternative| ResponseSource::Fallback { alternative })
            .collect();
        assert_eq!(alternatives, expected);
    }

    /// A ranked keyword wins, and its alias shares the rotation.
    #[test]
    fn ranked_keyword_and_alias_share_rotation() {
        let mut engine = doctor();
        assert_eq!(
            engine.process_turn("PERHAPS THE COMPUTER IS BROKEN"),
            "DO COMPUTERS WORRY YOU"
        );
        assert_eq!(
            engine.process_turn("THAT MACHINE IS LOUD"),
            "WHY DO YOU MENTION COMPUTERS"
        );
    }

    /// Only the clause holding the first keyword is considered.
    #[test]
    fn clauses_are_trimmed_around_the_keyword() {
        let mut engine = doctor();
        assert_eq!(
            engine.process_turn("HELLO , PERHAPS IT RAINS . THE COMPUTER IS OFF"),
            "YOU DON'T SEEM QUITE CERTAIN"
        );
    }

    /// Substitutions rewrite the input before decomposition.
    #[test]
    fn substitution_then_reassembly() {
        let mut engine = doctor();
        assert_eq!(
            engine.process_turn("I WANT A DOG"),
            "WHAT WOULD IT MEAN TO YOU IF YOU GOT A DOG"
        );
    }

    /// Memory keyword turns queue a deferred response; the last turn of the
    /// cycle without a keyword emits it.
    #[test]
    fn memories_surface_on_the_cycle_turn() {
        let mut engine = doctor();

        let report = engine.process_turn_traced("MY MOTHER HATES ME");
        assert_eq!(report.response, "TELL ME MORE ABOUT YOUR FAMILY");
        assert!(report.memorized);

        let report = engine.process_turn_traced("MY FATHER IS KIND");
        assert_eq!(report.response, "YOUR FATHER IS KIND");
        assert!(report.memorized);
        assert_eq!(engine.queued_memories(), 2);

        let reports: Vec<TurnReport> = (0..4).map(|_| engine.process_turn_traced("HELLO THERE")).collect();
        let memories: Vec<&TurnReport> = reports
            .iter()
            .filter(|report| report.source == ResponseSource::Memory)
            .collect();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].response, "BUT YOUR MOTHER HATES YOU");
        assert_eq!(memories[0].turn, 4);
        assert_eq!(reports[0].source, ResponseSource::Memory);
        assert_eq!(engine.queued_memories(), 1);
    }

    /// A keyword whose patterns all fail answers with the no-match phrase.
    #[test]
    fn unmatched_keyword_uses_no_match_phrase() {
        let mut engine = doctor();
        let report = engine.process_turn_traced("REMEMBER THAT");
        assert_eq!(report.source, ResponseSource::NoMatch);
        assert_eq!(report.response, "Hmmm");
    }

    /// Dumping after some turns and reloading the dump reproduces it.
    #[test]
    fn dump_survives_a_reload() {
        let mut engine = doctor();
        engine.process_turn("PERHAPS");
        engine.process_turn("MY MOTHER HATES ME");
        engine.process_turn("HELLO THERE");

        let dumped = engine.dump_script().unwrap();
        assert!(dumped.contains("(PERHAPS ((0) 1 (YOU DON'T SEEM QUITE CERTAIN)"));

        let reloaded = Engine::with_defaults(&dumped).unwrap();
        assert_eq!(reloaded.dump_script().unwrap(), dumped);
    }

    /// Edits made at runtime are live for the next turn.
    #[test]
    fn edits_apply_to_the_next_turn() {
        let mut engine = doctor();
        engine
            .edit_rule(
                "ALWAYS",
                EditOp::Replace {
                    old: "(WHEN)".into(),
                    new: "(REALLY, ALWAYS)".into(),
                },
            )
            .unwrap();
        assert_eq!(engine.process_turn("ALWAYS"), "CAN YOU THINK OF A SPECIFIC EXAMPLE");
        assert_eq!(engine.process_turn("ALWAYS"), "REALLY, ALWAYS");
    }
}
