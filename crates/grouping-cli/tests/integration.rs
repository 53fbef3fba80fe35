#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn grouping(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("grouping").unwrap();
    cmd.current_dir(dir.path())
        .env("GROUPING_ROOT", dir.path())
        .env("GROUPING_SEED", "42");
    cmd
}

fn init_event(dir: &TempDir) {
    grouping(dir).args(["init", "--name", "meetup"]).assert().success();
}

fn register(dir: &TempDir, name: &str) -> String {
    let output = grouping(dir)
        .args(["register", name, "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    value["id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// grouping init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_store() {
    let dir = TempDir::new().unwrap();
    grouping(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .grouping/config.yaml"));

    assert!(dir.path().join(".grouping/config.yaml").exists());
    assert!(dir.path().join(".grouping/store.redb").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);
    grouping(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .grouping/config.yaml"));
}

#[test]
fn commands_before_init_fail() {
    let dir = TempDir::new().unwrap();
    grouping(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

// ---------------------------------------------------------------------------
// grouping register / member
// ---------------------------------------------------------------------------

#[test]
fn register_and_list_members() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);

    grouping(&dir)
        .args(["register", "Mina", "--birth", "95"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Registered Mina"));
    grouping(&dir).args(["register", "Jun"]).assert().success();

    grouping(&dir)
        .args(["member", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Mina"))
        .stdout(predicate::str::contains("95"))
        .stdout(predicate::str::contains("Jun"));
}

#[test]
fn register_rejects_bad_birth_tag() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);
    grouping(&dir)
        .args(["register", "Mina", "--birth", "1995"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("two characters"));
}

#[test]
fn member_list_json_output() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);
    register(&dir, "Ari");

    let output = grouping(&dir)
        .args(["member", "list", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let members = value.as_array().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["name"], "Ari");
    assert!(members[0]["group"].is_null());
}

#[test]
fn member_delete_requires_confirmation() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);
    let id = register(&dir, "Ari");

    grouping(&dir)
        .args(["member", "delete", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));

    grouping(&dir)
        .args(["member", "delete", &id, "--yes"])
        .assert()
        .success();
    grouping(&dir)
        .args(["member", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No members registered."));
}

// ---------------------------------------------------------------------------
// grouping publish / status / view
// ---------------------------------------------------------------------------

#[test]
fn publish_regenerate_splits_into_near_equal_groups() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);
    for name in ["a", "b", "c", "d", "e"] {
        register(&dir, name);
    }

    grouping(&dir)
        .args(["publish", "--regenerate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Published 2 group(s), 5 member(s)"));

    grouping(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Group A"))
        .stdout(predicate::str::contains("Group B"))
        .stdout(predicate::str::contains("Next refresh:"));
}

#[test]
fn publish_regenerate_with_one_member_is_infeasible() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);
    register(&dir, "solo");

    grouping(&dir)
        .args(["publish", "--regenerate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot form groups"));
}

#[test]
fn participant_view_before_and_after_publish() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);
    for name in ["Mina", "Jun", "Ari"] {
        register(&dir, name);
    }

    grouping(&dir)
        .args(["view", "--name", "Mina"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Waiting"));

    grouping(&dir)
        .args(["publish", "--regenerate"])
        .assert()
        .success();

    grouping(&dir)
        .args(["view", "--name", "Mina"])
        .assert()
        .success()
        .stdout(predicate::str::contains("My group: Group A"))
        .stdout(predicate::str::contains("Jun"));
}

#[test]
fn status_json_reports_published_overview() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);
    for name in ["a", "b", "c", "d"] {
        register(&dir, name);
    }
    grouping(&dir)
        .args(["publish", "--regenerate"])
        .assert()
        .success();

    let output = grouping(&dir).args(["status", "--json"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["status"], "published");
    assert_eq!(value["groups"].as_array().unwrap().len(), 1);
    assert!(value["refresh"]["expires_at"].is_i64());
}

// ---------------------------------------------------------------------------
// grouping reset
// ---------------------------------------------------------------------------

#[test]
fn reset_requires_confirmation_then_clears() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);
    register(&dir, "a");
    register(&dir, "b");

    grouping(&dir).arg("reset").assert().failure();
    grouping(&dir).args(["reset", "--yes"]).assert().success();
    grouping(&dir)
        .args(["member", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No members registered."));
}

// ---------------------------------------------------------------------------
// grouping config
// ---------------------------------------------------------------------------

#[test]
fn config_set_and_show() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);

    grouping(&dir)
        .args(["config", "set", "group_size", "3"])
        .assert()
        .success();
    grouping(&dir)
        .args(["config", "set", "mode", "firstcome"])
        .assert()
        .success();
    grouping(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("policy.group_size:      3"))
        .stdout(predicate::str::contains("policy.mode:            firstcome"));
}

#[test]
fn config_set_rejects_zero_size() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);
    grouping(&dir)
        .args(["config", "set", "group_size", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid policy"));
    grouping(&dir).args(["config", "validate"]).assert().success();
}

// ---------------------------------------------------------------------------
// grouping admin
// ---------------------------------------------------------------------------

#[test]
fn admin_session_reads_commands_from_stdin() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);
    for name in ["a", "b", "c", "d"] {
        register(&dir, name);
    }

    grouping(&dir)
        .arg("admin")
        .write_stdin("size 2\nregenerate\npublish\nstatus\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Policy: mode batch, size 2"))
        .stdout(predicate::str::contains("Ready to publish."))
        .stdout(predicate::str::contains("Published. Next refresh:"))
        .stdout(predicate::str::contains("Group B"));

    // The size change was persisted.
    grouping(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("policy.group_size:      2"));
}

#[test]
fn admin_reports_errors_and_keeps_going() {
    let dir = TempDir::new().unwrap();
    init_event(&dir);

    grouping(&dir)
        .arg("admin")
        .write_stdin("size 0\nreset\nbogus\nstatus\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("invalid policy"))
        .stderr(predicate::str::contains("must be confirmed"))
        .stderr(predicate::str::contains("unrecognized command"))
        .stdout(predicate::str::contains("No groups published."));
}
