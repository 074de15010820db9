//! tabgen_core - shell completion generation from a declarative command tree
//!
//! Modules:
//! - command_spec: command/flag data model, annotations, validation, loading
//! - tree_walker: per-command dispatch function emission
//! - script_assembler: runtime prelude/epilogue assembly and persistence
//! - engine: in-process candidate resolution (the generated script's state
//!   machine, run natively)

pub mod command_spec;
pub mod engine;
pub mod script_assembler;
pub mod tree_walker;

// Re-export key types for convenience
pub use command_spec::{
    sample_spec, CommandSpec, FlagSets, FlagSpec, ANNOTATION_FILENAME_EXT,
    ANNOTATION_ONE_REQUIRED_FLAG, ANNOTATION_ONE_REQUIRED_NOUN,
};

pub use engine::{CompletionEngine, CompletionState};

pub use script_assembler::{generate, generate_to_file};

pub use tree_walker::{unit_identifier, TreeWalk, TreeWalker};
