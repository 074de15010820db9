//! Dispatch Unit Emission for tabgen_core
//!
//! Walks a command tree and emits one shell dispatch function per command.
//! Each function declares the candidates for its level (child commands,
//! classified flags, required sets, value-completion table), hands scanning
//! to the shared runtime helpers, and descends into child functions by
//! derived identifier.

use crate::command_spec::{CommandSpec, FlagSets, FlagSpec};
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// Dispatch identifier for a command path (root first): the segments joined
/// with `_`, with a leading `_`. Command names may not contain `_`, so
/// distinct paths always derive distinct identifiers.
pub fn unit_identifier(path: &[String]) -> String {
    format!("_{}", path.join("_"))
}

/// Fixed tail of every dispatch function: scan flags, descend into a child
/// function when one is named, otherwise build the reply.
const UNIT_TAIL: &str = r#"    __handle_flags
    __debug ${FUNCNAME} $c $cword
    if [[ $c -lt $cword ]]; then
        command_path="${command_path}_${words[c]}"
        __debug "looking for " ${command_path}
        declare -F $command_path >/dev/null && $command_path && return
    fi

    __handle_reply
}

"#;

/// Result of a tree walk: the concatenated dispatch functions and their
/// identifiers in emission order (children before parents).
#[derive(Debug)]
pub struct TreeWalk {
    /// Shell text of all dispatch functions
    pub script: String,
    /// Derived identifiers, one per command node
    pub identifiers: Vec<String>,
}

/// Recursive walker emitting one dispatch function per command node
pub struct TreeWalker {
    seen: BTreeMap<String, String>,
    out: String,
    identifiers: Vec<String>,
}

impl TreeWalker {
    /// Walk a command tree and emit its dispatch functions. Fails on
    /// identifier collisions; the caller is expected to have validated the
    /// tree first.
    pub fn walk(root: &CommandSpec) -> Result<TreeWalk> {
        let mut walker = Self {
            seen: BTreeMap::new(),
            out: String::new(),
            identifiers: Vec::new(),
        };
        walker.walk_node(root, &mut Vec::new(), &[])?;
        Ok(TreeWalk {
            script: walker.out,
            identifiers: walker.identifiers,
        })
    }

    fn walk_node(
        &mut self,
        node: &CommandSpec,
        path: &mut Vec<String>,
        inherited: &[&FlagSpec],
    ) -> Result<()> {
        path.push(node.name.clone());

        // Children first; flags stay completable below the command that
        // declares them, so each child inherits this level's flags.
        let mut child_inherited: Vec<&FlagSpec> = node.flags.iter().collect();
        child_inherited.extend(inherited.iter().copied());
        for child in &node.subcommands {
            self.walk_node(child, path, &child_inherited)?;
        }

        let identifier = unit_identifier(path);
        let display_path = path.join(" ");
        if let Some(previous) = self.seen.insert(identifier.clone(), display_path.clone()) {
            bail!(
                "dispatch identifier {} derived for {:?} collides with {:?}",
                identifier,
                display_path,
                previous
            );
        }

        debug!(identifier = %identifier, "emitting dispatch function");
        self.emit_unit(node, &identifier, inherited)?;
        self.identifiers.push(identifier);

        path.pop();
        Ok(())
    }

    fn emit_unit(
        &mut self,
        node: &CommandSpec,
        identifier: &str,
        inherited: &[&FlagSpec],
    ) -> Result<()> {
        let out = &mut self.out;
        out.push_str(&format!("{}()\n{{\n", identifier));
        out.push_str(&format!(
            "    last_command=\"{}\"\n",
            identifier.trim_start_matches('_')
        ));
        out.push_str("    c=$((c+1))\n");
        out.push_str(&format!("    command_path={}\n", identifier));

        out.push_str("    commands=()\n");
        for child in &node.subcommands {
            out.push_str(&format!("    commands+=(\"{}\")\n", child.name));
        }
        out.push('\n');

        out.push_str("    flags=()\n");
        out.push_str("    two_word_flags=()\n");
        out.push_str("    flags_with_completion=()\n");
        out.push_str("    flags_completion=()\n\n");

        let sets = FlagSets::classify(&node.flags, inherited.iter().copied());
        for flag in &sets.flags {
            out.push_str(&format!("    flags+=(\"{}\")\n", flag));
        }
        for flag in &sets.two_word_flags {
            out.push_str(&format!("    two_word_flags+=(\"{}\")\n", flag));
        }
        for (spelling, extensions) in &sets.completion_specs {
            let pattern = shlex::try_quote(&format!("@({})", extensions.join("|")))
                .with_context(|| format!("unquotable extension pattern for {}", spelling))?
                .into_owned();
            out.push_str(&format!("    flags_with_completion+=(\"{}\")\n", spelling));
            out.push_str(&format!("    flags_completion+=(\"_filedir {}\")\n", pattern));
        }
        out.push('\n');

        out.push_str("    must_have_one_flag=()\n");
        for spelling in node.required_flags() {
            let quoted = shlex::try_quote(spelling)
                .with_context(|| format!("unquotable required flag on {:?}", node.name))?;
            out.push_str(&format!("    must_have_one_flag+=({})\n", quoted));
        }
        out.push_str("    must_have_one_noun=()\n");
        for noun in node.required_nouns() {
            let quoted = shlex::try_quote(noun)
                .with_context(|| format!("unquotable required noun on {:?}", node.name))?;
            out.push_str(&format!("    must_have_one_noun+=({})\n", quoted));
        }

        out.push_str(UNIT_TAIL);
        Ok(())
    }
}
