//! Completion Script Assembly for tabgen_core
//!
//! Concatenates the fixed runtime prelude (the helpers shared by every
//! dispatch function), the per-command dispatch functions from the tree
//! walker, and the epilogue that initializes the per-invocation state and
//! registers the entry point with the shell.

use crate::command_spec::CommandSpec;
use crate::tree_walker::{unit_identifier, TreeWalker};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Shared runtime helpers. The generated script keeps its state in the
/// locals declared by the entry point: `words`/`cword` from the shell,
/// `c` as the scan index, the candidate arrays rebuilt by each dispatch
/// function, and the pending required sets.
const PRELUDE: &str = r#"#!/bin/bash


__debug()
{
    if [[ -n ${BASH_COMP_DEBUG_FILE} ]]; then
        echo "$*" >> ${BASH_COMP_DEBUG_FILE}
    fi
}

__index_of_word()
{
    local w word=$1
    shift
    index=0
    for w in "$@"; do
        [[ $w = "$word" ]] && return
        index=$((index+1))
    done
    index=-1
}

__contains_word()
{
    local w word=$1; shift
    for w in "$@"; do
        [[ $w = "$word" ]] && return
    done
    return 1
}

__handle_reply()
{
    __debug ${FUNCNAME}
    case $cur in
        -*)
            compopt -o nospace
            local allflags
            if [ ${#must_have_one_flag[@]} -ne 0 ]; then
                allflags=("${must_have_one_flag[@]}")
            elif [ ${#must_have_one_noun[@]} -ne 0 ]; then
                allflags=("${must_have_one_noun[@]}")
            else
                allflags=("${flags[*]} ${two_word_flags[*]}")
            fi
            COMPREPLY=( $(compgen -W "${allflags[*]}" -- "$cur") )
            [[ $COMPREPLY == *= ]] || compopt +o nospace
            return 0;
            ;;
    esac

    # flag value with a registered completion handler
    local index
    __index_of_word "${prev}" "${flags_with_completion[@]}"
    if [[ ${index} -ge 0 ]]; then
        ${flags_completion[${index}]}
        return
    fi

    # completing the value of a flag without a handler
    if [[ ${cur} != "${words[cword]}" ]]; then
        return
    fi

    local completions
    if [[ ${#must_have_one_flag[@]} -ne 0 ]]; then
        completions=("${must_have_one_flag[@]}")
    elif [[ ${#must_have_one_noun[@]} -ne 0 ]]; then
        completions=("${must_have_one_noun[@]}")
    else
        completions=("${commands[@]}")
    fi
    COMPREPLY=( $(compgen -W "${completions[*]}" -- "$cur") )

    if [[ ${#COMPREPLY[@]} -eq 0 ]]; then
        declare -F __custom_func >/dev/null && __custom_func
    fi
}

__handle_nouns()
{
    if [[ $c -ge $cword ]]; then
        return
    fi

    __debug ${FUNCNAME} "c is" $c "words[c] is" ${words[c]}

    if ! __contains_word "${words[c]}" "${commands[@]}"; then
        last_noun="${words[c]}"
    fi

    # a required positional unlocks further flag scanning
    if __contains_word "${words[c]}" "${must_have_one_noun[@]}"; then
        must_have_one_noun=()
        c=$((c+1))
        __handle_flags
    fi
}

__handle_flags()
{
    if [[ $c -ge $cword ]]; then
        return
    fi
    __debug ${FUNCNAME} "c is" $c "words[c] is" ${words[c]}
    case ${words[c]} in
        -*)
            ;;
        *)
            __handle_nouns
            return
            ;;
    esac

    # any entry of the required-flag set satisfies the whole set
    local flagname=${words[c]}
    if [[ ${words[c]} == *"="* ]]; then
        flagname=${flagname%=*}
        flagname="${flagname}="
    fi
    __debug "looking for ${flagname}"
    if __contains_word "${flagname}" "${must_have_one_flag[@]}" ||
       __contains_word "${flagname}=" "${must_have_one_flag[@]}"; then
        must_have_one_flag=()
    fi

    # skip the argument of a flag completed as two words
    if __contains_word "${words[c]}" "${two_word_flags[@]}" ||
       __contains_word "${words[c]}=" "${flags[@]}"; then
        c=$((c+1))
        # the cursor now sits on the flag's value, not on a command
        if [[ $c -eq $cword ]]; then
            commands=()
        fi
    fi

    # skip the flag itself
    c=$((c+1))
    __handle_flags
}

"#;

/// Entry point and registration for a program name: declares the
/// per-invocation state, invokes the root dispatch function, and binds the
/// entry point to the program via `complete -F`.
pub fn epilogue(program: &str) -> String {
    format!(
        r#"__start_{program}()
{{
    local cur prev words cword split
    _init_completion -s || return

    local completions_func command_path
    local c=0
    local flags=()
    local two_word_flags=()
    local flags_with_completion=()
    local flags_completion=()
    local commands=()
    local must_have_one_flag=()
    local must_have_one_noun=()
    local last_command
    local last_noun

    _{program}
}}

complete -F __start_{program} {program}
# ex: ts=4 sw=4 et filetype=sh
"#
    )
}

/// Generate the complete script for a command tree. The same tree always
/// yields byte-identical output.
pub fn generate(spec: &CommandSpec) -> Result<String> {
    spec.validate()?;
    let walk = TreeWalker::walk(spec)?;
    debug!(
        units = walk.identifiers.len(),
        root = %unit_identifier(std::slice::from_ref(&spec.name)),
        "assembling completion script"
    );

    let mut out = String::with_capacity(PRELUDE.len() + walk.script.len() + 512);
    out.push_str(PRELUDE);
    if let Some(custom) = &spec.custom_functions {
        out.push_str(custom);
        out.push('\n');
    }
    out.push_str(&walk.script);
    out.push_str(&epilogue(&spec.name));
    Ok(out)
}

/// Generate the script and persist it. An unwritable destination is a
/// fatal error surfaced to the caller; nothing is retried.
pub fn generate_to_file<P: AsRef<Path>>(spec: &CommandSpec, path: P) -> Result<()> {
    let path = path.as_ref();
    let script = generate(spec)?;
    fs::write(path, script)
        .with_context(|| format!("failed to write completion script {}", path.display()))?;
    debug!(path = %path.display(), "wrote completion script");
    Ok(())
}
