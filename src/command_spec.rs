//! Command Tree Model for tabgen_core
//!
//! Declarative description of a CLI's command hierarchy: commands, flags,
//! and the annotations the generator recognizes. Trees are loaded from JSON
//! or YAML, validated, and consumed read-only by the generator and the
//! completion engine.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Annotation key on a command: at least one of the listed flag spellings
/// must be seen before unrestricted completion resumes at that level.
pub const ANNOTATION_ONE_REQUIRED_FLAG: &str = "complete_one_required_flag";

/// Annotation key on a command: at least one of the listed positional words
/// must be seen before unrestricted completion resumes at that level.
pub const ANNOTATION_ONE_REQUIRED_NOUN: &str = "complete_one_required_noun";

/// Annotation key on a flag: restrict value completion to filenames with
/// the listed suffixes.
pub const ANNOTATION_FILENAME_EXT: &str = "complete_filename_ext";

/// A flag declaration on one command
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlagSpec {
    /// Long name without the leading dashes (e.g. "output")
    pub long_name: String,
    /// Optional single-character short form (e.g. 'o')
    #[serde(default)]
    pub short_name: Option<char>,
    /// Whether the flag consumes a value argument
    #[serde(default)]
    pub takes_value: bool,
    /// Open-ended metadata; unrecognized keys are ignored
    #[serde(default)]
    pub annotations: BTreeMap<String, Vec<String>>,
}

impl FlagSpec {
    /// Candidate spelling of the long form. Value-taking flags carry a
    /// trailing `=` so the runtime knows to expect a value.
    pub fn long_candidate(&self) -> String {
        if self.takes_value {
            format!("--{}=", self.long_name)
        } else {
            format!("--{}", self.long_name)
        }
    }

    /// Bare long spelling without the value marker (e.g. "--output")
    pub fn long_bare(&self) -> String {
        format!("--{}", self.long_name)
    }

    /// Candidate spelling of the short form, if declared
    pub fn short_candidate(&self) -> Option<String> {
        self.short_name.map(|c| format!("-{}", c))
    }

    /// Filename suffixes the flag's value completion is restricted to
    pub fn filename_extensions(&self) -> Option<&[String]> {
        self.annotations
            .get(ANNOTATION_FILENAME_EXT)
            .map(|v| v.as_slice())
    }
}

/// One command in the tree: its name, nested subcommands, flags, and
/// annotations. Sibling order is declaration order and is preserved in
/// every candidate list the generator emits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Command name, unique among siblings
    pub name: String,
    /// Nested subcommands, in declared order
    #[serde(default)]
    pub subcommands: Vec<CommandSpec>,
    /// Flags local to this command, in declared order
    #[serde(default)]
    pub flags: Vec<FlagSpec>,
    /// Open-ended metadata; unrecognized keys are ignored
    #[serde(default)]
    pub annotations: BTreeMap<String, Vec<String>>,
    /// Extra shell functions emitted verbatim into the generated script
    /// (root command only). `__handle_reply` falls back to `__custom_func`
    /// when a reply would otherwise be empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_functions: Option<String>,
}

impl CommandSpec {
    /// Create an empty command with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subcommands: Vec::new(),
            flags: Vec::new(),
            annotations: BTreeMap::new(),
            custom_functions: None,
        }
    }

    /// Flag spellings of which at least one must be scanned at this level
    pub fn required_flags(&self) -> &[String] {
        self.annotations
            .get(ANNOTATION_ONE_REQUIRED_FLAG)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Positional words of which at least one must be scanned at this level
    pub fn required_nouns(&self) -> &[String] {
        self.annotations
            .get(ANNOTATION_ONE_REQUIRED_NOUN)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Load a command tree from JSON
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a command tree from YAML
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a command tree from a file, picking the format by extension
    /// (`.yaml`/`.yml` parse as YAML, everything else as JSON)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read command tree {}", path.display()))?;

        let is_yaml = path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false);

        let spec = if is_yaml {
            Self::from_yaml(&content)
                .with_context(|| format!("invalid YAML command tree {}", path.display()))?
        } else {
            Self::from_json(&content)
                .with_context(|| format!("invalid JSON command tree {}", path.display()))?
        };

        Ok(spec)
    }

    /// Validate the whole tree: name charsets, sibling-name uniqueness, and
    /// short-flag uniqueness per command. Violations are fatal; generation
    /// must not proceed on an invalid tree.
    pub fn validate(&self) -> Result<()> {
        // Command and flag names may not contain the `_` identifier
        // separator or whitespace; dispatch identifiers stay collision-free.
        let name_re = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]*$").unwrap();
        self.validate_node(&name_re, &mut Vec::new())
    }

    fn validate_node(&self, name_re: &Regex, path: &mut Vec<String>) -> Result<()> {
        if !name_re.is_match(&self.name) {
            bail!(
                "invalid command name {:?} under {:?}: names are letters, digits, and dashes",
                self.name,
                path.join(" ")
            );
        }

        let mut flag_names = HashSet::new();
        let mut short_names = HashSet::new();
        for flag in &self.flags {
            if !name_re.is_match(&flag.long_name) {
                bail!(
                    "invalid flag name {:?} on command {:?}",
                    flag.long_name,
                    self.name
                );
            }
            if !flag_names.insert(flag.long_name.clone()) {
                bail!(
                    "duplicate flag --{} on command {:?}",
                    flag.long_name,
                    self.name
                );
            }
            if let Some(short) = flag.short_name {
                if !short.is_ascii_alphanumeric() {
                    bail!(
                        "invalid short flag {:?} for --{} on command {:?}",
                        short,
                        flag.long_name,
                        self.name
                    );
                }
                if !short_names.insert(short) {
                    bail!("duplicate short flag -{} on command {:?}", short, self.name);
                }
            }
        }

        let mut child_names = HashSet::new();
        path.push(self.name.clone());
        for child in &self.subcommands {
            if !child_names.insert(child.name.clone()) {
                bail!(
                    "duplicate subcommand {:?} under {:?}",
                    child.name,
                    path.join(" ")
                );
            }
            child.validate_node(name_re, path)?;
        }
        path.pop();

        Ok(())
    }
}

/// Classified flag candidate lists for one command level: the flag list
/// (long forms plus boolean shorts), the two-word list (value-taking
/// shorts), and the extension-restriction table. Own flags come first,
/// inherited flags follow in ancestor order.
#[derive(Clone, Debug, Default)]
pub struct FlagSets {
    /// Plain flag candidates; value-taking long forms end in `=`
    pub flags: Vec<String>,
    /// Value-taking short flags, completed as two separate words
    pub two_word_flags: Vec<String>,
    /// Flag spelling -> filename suffixes restricting its value completion
    pub completion_specs: Vec<(String, Vec<String>)>,
}

impl FlagSets {
    /// Classify a command's own flags followed by the flags it inherits
    /// from its ancestors.
    pub fn classify<'a, I>(own: &'a [FlagSpec], inherited: I) -> Self
    where
        I: IntoIterator<Item = &'a FlagSpec>,
    {
        let mut sets = Self::default();
        for flag in own.iter().chain(inherited) {
            sets.push(flag);
        }
        sets
    }

    fn push(&mut self, flag: &FlagSpec) {
        self.flags.push(flag.long_candidate());
        if let Some(exts) = flag.filename_extensions() {
            self.completion_specs
                .push((flag.long_bare(), exts.to_vec()));
        }

        if let Some(short) = flag.short_candidate() {
            if flag.takes_value {
                self.two_word_flags.push(short.clone());
            } else {
                self.flags.push(short.clone());
            }
            if let Some(exts) = flag.filename_extensions() {
                self.completion_specs.push((short, exts.to_vec()));
            }
        }
    }
}

/// Built-in sample tree: a small resource-control tool exercising nesting,
/// short and long flags, value flags, required-flag and required-noun sets,
/// and an extension-restricted file flag.
pub fn sample_spec() -> CommandSpec {
    CommandSpec {
        name: "resctl".into(),
        subcommands: vec![
            CommandSpec {
                name: "get".into(),
                subcommands: vec![CommandSpec::new("pod"), CommandSpec::new("service")],
                flags: vec![
                    FlagSpec {
                        long_name: "output".into(),
                        short_name: Some('o'),
                        takes_value: true,
                        annotations: BTreeMap::new(),
                    },
                    FlagSpec {
                        long_name: "watch".into(),
                        short_name: Some('w'),
                        takes_value: false,
                        annotations: BTreeMap::new(),
                    },
                ],
                annotations: BTreeMap::new(),
                custom_functions: None,
            },
            CommandSpec {
                name: "create".into(),
                subcommands: vec![],
                flags: vec![FlagSpec {
                    long_name: "filename".into(),
                    short_name: Some('f'),
                    takes_value: true,
                    annotations: BTreeMap::from([(
                        ANNOTATION_FILENAME_EXT.to_string(),
                        vec!["yaml".into(), "yml".into(), "json".into()],
                    )]),
                }],
                annotations: BTreeMap::from([(
                    ANNOTATION_ONE_REQUIRED_FLAG.to_string(),
                    vec!["--filename=".into(), "-f".into()],
                )]),
                custom_functions: None,
            },
            CommandSpec {
                name: "delete".into(),
                subcommands: vec![],
                flags: vec![
                    FlagSpec {
                        long_name: "force".into(),
                        short_name: None,
                        takes_value: false,
                        annotations: BTreeMap::new(),
                    },
                    FlagSpec {
                        long_name: "grace-period".into(),
                        short_name: None,
                        takes_value: true,
                        annotations: BTreeMap::new(),
                    },
                ],
                annotations: BTreeMap::from([(
                    ANNOTATION_ONE_REQUIRED_NOUN.to_string(),
                    vec!["pod".into(), "service".into()],
                )]),
                custom_functions: None,
            },
        ],
        flags: vec![
            FlagSpec {
                long_name: "namespace".into(),
                short_name: Some('n'),
                takes_value: true,
                annotations: BTreeMap::new(),
            },
            FlagSpec {
                long_name: "help".into(),
                short_name: Some('h'),
                takes_value: false,
                annotations: BTreeMap::new(),
            },
        ],
        annotations: BTreeMap::new(),
        custom_functions: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_candidate_marks_value_flags() {
        let flag = FlagSpec {
            long_name: "output".into(),
            short_name: Some('o'),
            takes_value: true,
            annotations: BTreeMap::new(),
        };
        assert_eq!(flag.long_candidate(), "--output=");
        assert_eq!(flag.short_candidate().unwrap(), "-o");

        let boolean = FlagSpec {
            long_name: "watch".into(),
            short_name: None,
            takes_value: false,
            annotations: BTreeMap::new(),
        };
        assert_eq!(boolean.long_candidate(), "--watch");
    }

    #[test]
    fn test_classify_partitions_flags() {
        let spec = sample_spec();
        let get = &spec.subcommands[0];
        let sets = FlagSets::classify(&get.flags, []);

        assert_eq!(sets.flags, vec!["--output=", "--watch", "-w"]);
        assert_eq!(sets.two_word_flags, vec!["-o"]);
        assert!(sets.completion_specs.is_empty());
    }

    #[test]
    fn test_classify_registers_extension_restrictions() {
        let spec = sample_spec();
        let create = &spec.subcommands[1];
        let sets = FlagSets::classify(&create.flags, []);

        assert_eq!(sets.flags, vec!["--filename="]);
        assert_eq!(sets.two_word_flags, vec!["-f"]);
        assert_eq!(
            sets.completion_specs,
            vec![
                (
                    "--filename".to_string(),
                    vec!["yaml".to_string(), "yml".to_string(), "json".to_string()]
                ),
                (
                    "-f".to_string(),
                    vec!["yaml".to_string(), "yml".to_string(), "json".to_string()]
                ),
            ]
        );
    }

    #[test]
    fn test_classify_appends_inherited_flags() {
        let spec = sample_spec();
        let get = &spec.subcommands[0];
        let sets = FlagSets::classify(&get.flags, spec.flags.iter());

        assert_eq!(
            sets.flags,
            vec!["--output=", "--watch", "-w", "--namespace=", "--help", "-h"]
        );
        assert_eq!(sets.two_word_flags, vec!["-o", "-n"]);
    }

    #[test]
    fn test_json_round_trip() {
        let spec = sample_spec();
        let json = serde_json::to_string(&spec).unwrap();
        let back = CommandSpec::from_json(&json).unwrap();
        assert_eq!(back.name, "resctl");
        assert_eq!(back.subcommands.len(), 3);
        assert_eq!(back.subcommands[0].subcommands[1].name, "service");
        assert!(back.subcommands[1].flags[0].takes_value);
    }

    #[test]
    fn test_yaml_loading() {
        let yaml = r#"
name: tool
subcommands:
  - name: sync
    flags:
      - long_name: dry-run
      - long_name: jobs
        short_name: j
        takes_value: true
"#;
        let spec = CommandSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.subcommands[0].name, "sync");
        assert!(!spec.subcommands[0].flags[0].takes_value);
        assert_eq!(spec.subcommands[0].flags[1].short_name, Some('j'));
    }

    #[test]
    fn test_unknown_annotations_are_ignored() {
        let json = r#"{
            "name": "tool",
            "annotations": {"future_feature": ["x"]},
            "flags": [{"long_name": "config", "takes_value": true,
                       "annotations": {"also_unknown": []}}]
        }"#;
        let spec = CommandSpec::from_json(json).unwrap();
        assert!(spec.validate().is_ok());
        assert!(spec.required_flags().is_empty());
        assert!(spec.flags[0].filename_extensions().is_none());
    }

    #[test]
    fn test_required_sets_from_annotations() {
        let spec = sample_spec();
        assert_eq!(spec.subcommands[1].required_flags(), ["--filename=", "-f"]);
        assert_eq!(spec.subcommands[2].required_nouns(), ["pod", "service"]);
        assert!(spec.required_flags().is_empty());
    }

    #[test]
    fn test_validate_accepts_sample() {
        assert!(sample_spec().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_siblings() {
        let mut spec = CommandSpec::new("tool");
        spec.subcommands.push(CommandSpec::new("sync"));
        spec.subcommands.push(CommandSpec::new("sync"));
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate subcommand"));
    }

    #[test]
    fn test_validate_rejects_separator_in_name() {
        let spec = CommandSpec::new("my_tool");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_short_flags() {
        let mut spec = CommandSpec::new("tool");
        spec.flags = vec![
            FlagSpec {
                long_name: "force".into(),
                short_name: Some('f'),
                takes_value: false,
                annotations: BTreeMap::new(),
            },
            FlagSpec {
                long_name: "file".into(),
                short_name: Some('f'),
                takes_value: true,
                annotations: BTreeMap::new(),
            },
        ];
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate short flag"));
    }
}
