//! Completion Engine for tabgen_core
//!
//! In-process implementation of the state machine the generated script
//! runs in the shell. The script-level globals become an explicit
//! `CompletionState` threaded by mutable reference through the dispatch
//! units, and the script's name-computed function dispatch becomes an
//! exact-match lookup in an identifier -> unit registry. Resolution never
//! fails: input that matches nothing yields an empty candidate set.

use crate::command_spec::{CommandSpec, FlagSets, FlagSpec};
use crate::tree_walker::unit_identifier;
use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::fs;
use tracing::debug;

/// Per-invocation automaton state. Created fresh for every completion
/// request, mutated only by the dispatch unit currently executing, and
/// discarded when the request resolves.
#[derive(Clone, Debug)]
pub struct CompletionState {
    /// The command line split into words, program name first
    pub words: Vec<String>,
    /// Index of the word being completed; may equal `words.len()` when a
    /// fresh word is being started
    pub cursor_word_index: usize,
    /// Index of the word under dispatch resolution, always <= cursor
    pub scan_index: usize,
    /// Names of the commands descended through so far
    pub active_command_path: Vec<String>,
    /// Child-command candidates of the current level
    pub commands: Vec<String>,
    /// Flag candidates of the current level (long forms, boolean shorts)
    pub flags: Vec<String>,
    /// Value-taking short flags, completed as two words
    pub two_word_flags: Vec<String>,
    /// Flag spelling -> filename suffixes for value completion
    pub flags_with_completion: BTreeMap<String, Vec<String>>,
    /// Pending required-flag set; empty once satisfied
    pub must_have_one_flag: Vec<String>,
    /// Pending required-positional set; empty once satisfied
    pub must_have_one_noun: Vec<String>,
    /// Most recent scanned word that named neither a flag nor a command
    pub last_noun: Option<String>,
}

impl CompletionState {
    /// Fresh state for one completion request
    pub fn new(words: Vec<String>, cursor_word_index: usize) -> Self {
        Self {
            words,
            cursor_word_index,
            scan_index: 0,
            active_command_path: Vec::new(),
            commands: Vec::new(),
            flags: Vec::new(),
            two_word_flags: Vec::new(),
            flags_with_completion: BTreeMap::new(),
            must_have_one_flag: Vec::new(),
            must_have_one_noun: Vec::new(),
            last_noun: None,
        }
    }

    fn current_word(&self) -> &str {
        self.words
            .get(self.cursor_word_index)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// One compiled dispatch unit: the candidates one command level declares
#[derive(Clone, Debug)]
struct CompiledCommand {
    name: String,
    /// (child name, child identifier), declared order
    children: Vec<(String, String)>,
    flag_sets: FlagSets,
    must_have_one_flag: Vec<String>,
    must_have_one_noun: Vec<String>,
}

/// Registry of compiled dispatch units keyed by derived identifier
pub struct CompletionEngine {
    units: BTreeMap<String, CompiledCommand>,
    root: String,
}

impl CompletionEngine {
    /// Compile a command tree into a dispatch registry. Rejects invalid
    /// trees and identifier collisions, mirroring generation.
    pub fn compile(spec: &CommandSpec) -> Result<Self> {
        spec.validate()?;
        let mut units = BTreeMap::new();
        Self::compile_node(spec, &mut Vec::new(), &[], &mut units)?;
        Ok(Self {
            units,
            root: unit_identifier(std::slice::from_ref(&spec.name)),
        })
    }

    fn compile_node(
        node: &CommandSpec,
        path: &mut Vec<String>,
        inherited: &[&FlagSpec],
        units: &mut BTreeMap<String, CompiledCommand>,
    ) -> Result<()> {
        path.push(node.name.clone());
        let identifier = unit_identifier(path);

        let children = node
            .subcommands
            .iter()
            .map(|child| {
                path.push(child.name.clone());
                let child_identifier = unit_identifier(path);
                path.pop();
                (child.name.clone(), child_identifier)
            })
            .collect();

        let unit = CompiledCommand {
            name: node.name.clone(),
            children,
            flag_sets: FlagSets::classify(&node.flags, inherited.iter().copied()),
            must_have_one_flag: node.required_flags().to_vec(),
            must_have_one_noun: node.required_nouns().to_vec(),
        };
        if units.insert(identifier.clone(), unit).is_some() {
            bail!(
                "dispatch identifier {} is not unique (path {:?})",
                identifier,
                path.join(" ")
            );
        }

        let mut child_inherited: Vec<&FlagSpec> = node.flags.iter().collect();
        child_inherited.extend(inherited.iter().copied());
        for child in &node.subcommands {
            Self::compile_node(child, path, &child_inherited, units)?;
        }

        path.pop();
        Ok(())
    }

    /// Resolve the candidate set for a word list and cursor position
    pub fn complete(&self, words: &[String], cursor_word_index: usize) -> Vec<String> {
        let mut state = CompletionState::new(words.to_vec(), cursor_word_index);
        self.run(&mut state)
    }

    /// Run the automaton over caller-owned state; the state can be
    /// inspected afterwards (resolved command path, last noun).
    pub fn run(&self, state: &mut CompletionState) -> Vec<String> {
        debug!(
            cursor = state.cursor_word_index,
            words = ?state.words,
            "resolving completion"
        );
        let root = self.root.clone();
        self.enter_unit(&root, state)
    }

    fn enter_unit(&self, identifier: &str, state: &mut CompletionState) -> Vec<String> {
        let unit = match self.units.get(identifier) {
            Some(unit) => unit,
            None => return Vec::new(),
        };

        // Rebuild the candidate sets for this level, then advance past the
        // command's own word.
        state.active_command_path.push(unit.name.clone());
        state.scan_index += 1;
        state.commands = unit.children.iter().map(|(name, _)| name.clone()).collect();
        state.flags = unit.flag_sets.flags.clone();
        state.two_word_flags = unit.flag_sets.two_word_flags.clone();
        state.flags_with_completion = unit.flag_sets.completion_specs.iter().cloned().collect();
        state.must_have_one_flag = unit.must_have_one_flag.clone();
        state.must_have_one_noun = unit.must_have_one_noun.clone();

        self.handle_flags(state);

        if state.scan_index < state.cursor_word_index {
            let word = state.words[state.scan_index].clone();
            if let Some((_, child)) = unit.children.iter().find(|(name, _)| *name == word) {
                let child = child.clone();
                return self.enter_unit(&child, state);
            }
        }

        self.reply(state)
    }

    /// Scanning state: walk words up to the cursor, consuming flags and
    /// their values and retiring satisfied required sets.
    fn handle_flags(&self, state: &mut CompletionState) {
        while state.scan_index < state.cursor_word_index {
            let word = state.words[state.scan_index].clone();
            if !word.starts_with('-') {
                self.handle_nouns(state);
                return;
            }

            // any entry of the required-flag set satisfies the whole set
            let flagname = match word.find('=') {
                Some(idx) => format!("{}=", &word[..idx]),
                None => word.clone(),
            };
            let with_marker = format!("{}=", flagname);
            if state
                .must_have_one_flag
                .iter()
                .any(|f| *f == flagname || *f == with_marker)
            {
                state.must_have_one_flag.clear();
            }

            // a value-taking flag typed without `=` consumes the next word
            if state.two_word_flags.contains(&word)
                || state.flags.contains(&format!("{}=", word))
            {
                state.scan_index += 1;
                if state.scan_index == state.cursor_word_index {
                    // the cursor sits on the flag's value, not on a command
                    state.commands.clear();
                }
            }

            state.scan_index += 1;
        }
    }

    /// Noun handling: record non-command words and let a required
    /// positional unlock further flag scanning.
    fn handle_nouns(&self, state: &mut CompletionState) {
        if state.scan_index >= state.cursor_word_index {
            return;
        }
        let word = state.words[state.scan_index].clone();

        if !state.commands.contains(&word) {
            state.last_noun = Some(word.clone());
        }

        if state.must_have_one_noun.contains(&word) {
            state.must_have_one_noun.clear();
            state.scan_index += 1;
            self.handle_flags(state);
        }
    }

    /// Reply state: build the candidate set for the word under the cursor.
    fn reply(&self, state: &CompletionState) -> Vec<String> {
        let cur = state.current_word().to_string();

        if cur.starts_with('-') {
            // completing the value of a `--flag=`-joined word: restricted
            // filename candidates when registered, otherwise nothing
            if let Some(idx) = cur.find('=') {
                let flag_part = &cur[..idx];
                let value_part = &cur[idx + 1..];
                if state.flags.iter().any(|f| f == &format!("{}=", flag_part)) {
                    if let Some(extensions) = state.flags_with_completion.get(flag_part) {
                        return file_candidates(value_part, extensions)
                            .into_iter()
                            .map(|name| format!("{}={}", flag_part, name))
                            .collect();
                    }
                }
                return Vec::new();
            }

            let pool: Vec<String> = if !state.must_have_one_flag.is_empty() {
                state.must_have_one_flag.clone()
            } else if !state.must_have_one_noun.is_empty() {
                state.must_have_one_noun.clone()
            } else {
                state
                    .flags
                    .iter()
                    .chain(state.two_word_flags.iter())
                    .cloned()
                    .collect()
            };
            return prefix_filter(&pool, &cur);
        }

        // the previous word is a flag with a registered value completion
        if state.cursor_word_index >= 1 {
            if let Some(prev) = state.words.get(state.cursor_word_index - 1) {
                if let Some(extensions) = state.flags_with_completion.get(prev.as_str()) {
                    return file_candidates(&cur, extensions);
                }
            }
        }

        let pool = if !state.must_have_one_flag.is_empty() {
            &state.must_have_one_flag
        } else if !state.must_have_one_noun.is_empty() {
            &state.must_have_one_noun
        } else {
            &state.commands
        };
        prefix_filter(pool, &cur)
    }
}

fn prefix_filter(pool: &[String], prefix: &str) -> Vec<String> {
    pool.iter()
        .filter(|candidate| candidate.starts_with(prefix))
        .cloned()
        .collect()
}

/// Filename candidates for an extension-restricted flag value: entries of
/// the prefix's directory whose name keeps the prefix, keeping directories
/// (marked with a trailing `/`) and files with one of the given suffixes.
fn file_candidates(prefix: &str, extensions: &[String]) -> Vec<String> {
    let (dir, file_prefix) = match prefix.rfind('/') {
        Some(idx) => (&prefix[..=idx], &prefix[idx + 1..]),
        None => ("./", prefix),
    };

    let mut candidates = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(file_prefix) {
                continue;
            }
            let is_dir = entry.path().is_dir();
            let matches_suffix = extensions
                .iter()
                .any(|ext| name.ends_with(&format!(".{}", ext)));
            if !is_dir && !matches_suffix {
                continue;
            }
            let full = if dir == "./" {
                name
            } else {
                format!("{}{}", dir, name)
            };
            candidates.push(if is_dir { format!("{}/", full) } else { full });
        }
    }
    candidates.sort();
    candidates
}
