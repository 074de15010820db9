// tests/generator_tests.rs
// End-to-end generation checks driving the tabgen_cli binary

use assert_cmd::Command;
use tabgen_core::command_spec::sample_spec;
use tabgen_core::tree_walker::TreeWalker;

fn generate_sample() -> String {
    let mut cmd = Command::cargo_bin("tabgen_cli").expect("tabgen_cli binary must be built");
    let output = cmd
        .arg("generate")
        .arg("--sample")
        .assert()
        .success()
        .get_output()
        .clone();
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn golden_sample_script_structure() {
    let script = generate_sample();
    assert!(script.starts_with("#!/bin/bash\n"));

    for unit in [
        "_resctl()",
        "_resctl_get()",
        "_resctl_get_pod()",
        "_resctl_get_service()",
        "_resctl_create()",
        "_resctl_delete()",
    ] {
        assert!(script.contains(unit), "missing dispatch unit {}", unit);
    }

    let registration = script
        .lines()
        .find(|line| line.starts_with("complete -F"))
        .unwrap()
        .to_string();
    insta::assert_snapshot!("registration_line", registration);
}

#[test]
fn golden_sample_identifiers() {
    let walk = TreeWalker::walk(&sample_spec()).unwrap();
    insta::assert_debug_snapshot!("sample_identifiers", walk.identifiers);
}

#[test]
fn generate_matches_library_output() {
    let script = generate_sample();
    let expected = tabgen_core::generate(&sample_spec()).unwrap();
    assert_eq!(script, expected);
}

#[test]
fn generate_from_json_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let tree_path = dir.path().join("tree.json");
    let json = serde_json::to_string_pretty(&sample_spec()).unwrap();
    std::fs::write(&tree_path, json).unwrap();

    let mut runs = Vec::new();
    for i in 0..2 {
        let out_path = dir.path().join(format!("completion-{}.bash", i));
        Command::cargo_bin("tabgen_cli")
            .unwrap()
            .arg("generate")
            .arg("--input")
            .arg(&tree_path)
            .arg("--output")
            .arg(&out_path)
            .assert()
            .success();
        runs.push(std::fs::read_to_string(&out_path).unwrap());
    }
    assert_eq!(runs[0], runs[1]);
    assert!(runs[0].contains("complete -F __start_resctl resctl"));
}

#[test]
fn generate_surfaces_unwritable_destination() {
    let output = Command::cargo_bin("tabgen_cli")
        .unwrap()
        .arg("generate")
        .arg("--sample")
        .arg("--output")
        .arg("/nonexistent-dir/completion.bash")
        .assert()
        .failure()
        .get_output()
        .clone();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to write completion script"));
}

#[test]
fn complete_subcommand_resolves_candidates() {
    let output = Command::cargo_bin("tabgen_cli")
        .unwrap()
        .arg("complete")
        .arg("--sample")
        .arg("--line")
        .arg("resctl ge")
        .assert()
        .success()
        .get_output()
        .clone();
    assert_eq!(String::from_utf8_lossy(&output.stdout), "get\n");
}

#[test]
fn complete_with_no_match_succeeds_with_empty_reply() {
    let output = Command::cargo_bin("tabgen_cli")
        .unwrap()
        .arg("complete")
        .arg("--sample")
        .arg("--line")
        .arg("resctl frobnicate xy")
        .assert()
        .success()
        .get_output()
        .clone();
    assert!(output.stdout.is_empty());
}

#[test]
fn validate_reports_unit_count() {
    let output = Command::cargo_bin("tabgen_cli")
        .unwrap()
        .arg("validate")
        .arg("--sample")
        .assert()
        .success()
        .get_output()
        .clone();
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "resctl: ok (6 dispatch units)\n"
    );
}
