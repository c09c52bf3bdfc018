//! Integration tests for the pmboard CLI
//!
//! These drive the built binary against throwaway project directories.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a pmboard Command
fn pmboard() -> Command {
    cargo_bin_cmd!("pmboard")
}

/// A project directory with a fast-hashing config already in place.
fn create_temp_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(".pmboard")).unwrap();
    fs::write(
        dir.path().join(".pmboard/pmboard.toml"),
        "[auth]\nbcrypt_cost = 4\n\n[notifications]\nenabled = false\n",
    )
    .unwrap();
    dir
}

fn init_project(dir: &TempDir) {
    pmboard()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        pmboard()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("notify-overdue"));
    }

    #[test]
    fn test_version() {
        pmboard().arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_command_fails() {
        pmboard().arg("frobnicate").assert().failure();
    }

    #[test]
    fn test_init_creates_database() {
        let dir = create_temp_project();

        pmboard()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized pmboard project"));

        assert!(dir.path().join(".pmboard/pmboard.db").exists());
        // The existing config is kept.
        let config = fs::read_to_string(dir.path().join(".pmboard/pmboard.toml")).unwrap();
        assert!(config.contains("bcrypt_cost = 4"));
    }

    #[test]
    fn test_init_idempotent() {
        let dir = create_temp_project();
        init_project(&dir);

        pmboard()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Keeping existing"));
    }

    #[test]
    fn test_init_writes_default_config() {
        let dir = TempDir::new().unwrap();
        pmboard()
            .current_dir(dir.path())
            .args(["init", "--log-level", "warn"])
            .assert()
            .success();

        let config = fs::read_to_string(dir.path().join(".pmboard/pmboard.toml")).unwrap();
        assert!(config.contains("[server]"));
        assert!(config.contains("port = 5000"));
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".pmboard")).unwrap();
        fs::write(
            dir.path().join(".pmboard/pmboard.toml"),
            "[notifications]\nsend_at = \"nine o'clock\"\n",
        )
        .unwrap();

        pmboard()
            .current_dir(dir.path())
            .arg("export")
            .assert()
            .failure()
            .stderr(predicate::str::contains("notifications.send_at"));
    }

    #[test]
    fn test_env_overrides_json_dir() {
        let dir = create_temp_project();
        init_project(&dir);

        pmboard()
            .current_dir(dir.path())
            .env("PMBOARD_JSON_DIR", "snapshots")
            .arg("export")
            .assert()
            .success();

        assert!(dir.path().join("snapshots/projects.json").exists());
    }
}

// =============================================================================
// Snapshot import / export
// =============================================================================

mod snapshots {
    use super::*;

    #[test]
    fn test_export_writes_every_collection() {
        let dir = create_temp_project();
        init_project(&dir);

        pmboard()
            .current_dir(dir.path())
            .arg("export")
            .assert()
            .success()
            .stdout(predicate::str::contains("Exported 1 projects"));

        for name in [
            "users",
            "projects",
            "epics",
            "stories",
            "cards",
            "comments",
            "sprints",
            "notifications",
            "mindmaps",
        ] {
            let path = dir.path().join(format!("data/{}.json", name));
            let content = fs::read_to_string(&path).unwrap();
            let value: serde_json::Value = serde_json::from_str(&content).unwrap();
            assert!(value.is_array(), "{} is not an array", name);
        }
        let projects = fs::read_to_string(dir.path().join("data/projects.json")).unwrap();
        assert!(projects.contains("Sample Project"));
    }

    #[test]
    fn test_import_requires_force_on_populated_db() {
        let source = create_temp_project();
        init_project(&source);
        pmboard()
            .current_dir(source.path())
            .arg("export")
            .assert()
            .success();

        let target = create_temp_project();
        init_project(&target);
        let from = source.path().join("data");

        pmboard()
            .current_dir(target.path())
            .arg("import")
            .arg("--from")
            .arg(&from)
            .assert()
            .failure()
            .stderr(predicate::str::contains("--force"));

        pmboard()
            .current_dir(target.path())
            .arg("import")
            .arg("--from")
            .arg(&from)
            .arg("--force")
            .assert()
            .success()
            .stdout(predicate::str::contains("Imported 1 users, 1 projects"));
    }

    #[test]
    fn test_import_legacy_files() {
        let dir = create_temp_project();
        let data = dir.path().join("legacy");
        fs::create_dir_all(&data).unwrap();
        fs::write(
            data.join("projects.json"),
            r#"[{"id": 7, "name": "Legacy", "description": "", "created_at": "2023-01-01 10:00:00"}]"#,
        )
        .unwrap();
        fs::write(
            data.join("epics.json"),
            r#"[{"id": 3, "project_id": 7, "name": "Old epic", "status": "active"}]"#,
        )
        .unwrap();

        pmboard()
            .current_dir(dir.path())
            .args(["import", "--from", "legacy"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1 projects, 1 epics"));

        pmboard()
            .current_dir(dir.path())
            .args(["export", "--to", "out"])
            .assert()
            .success();
        let epics = fs::read_to_string(dir.path().join("out/epics.json")).unwrap();
        assert!(epics.contains("Old epic"));
    }

    #[test]
    fn test_import_missing_dir_fails() {
        let dir = create_temp_project();
        pmboard()
            .current_dir(dir.path())
            .args(["import", "--from", "nowhere"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No snapshot found"));
    }

    #[test]
    fn test_init_imports_existing_json_dir() {
        let source = create_temp_project();
        init_project(&source);
        pmboard()
            .current_dir(source.path())
            .arg("export")
            .assert()
            .success();

        // A fresh project with a data/ directory starts from it.
        let target = create_temp_project();
        let src = source.path().join("data");
        let dst = target.path().join("data");
        fs::create_dir_all(&dst).unwrap();
        for entry in fs::read_dir(&src).unwrap() {
            let path = entry.unwrap().path();
            if path.extension().is_some_and(|e| e == "json") {
                fs::copy(&path, dst.join(path.file_name().unwrap())).unwrap();
            }
        }
        init_project(&target);

        pmboard()
            .current_dir(target.path())
            .args(["export", "--to", "check"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Exported 1 projects"));
    }
}

// =============================================================================
// Global flags and mail
// =============================================================================

mod global_flags {
    use super::*;

    #[test]
    fn test_project_dir_flag() {
        let dir = create_temp_project();
        let elsewhere = TempDir::new().unwrap();

        pmboard()
            .current_dir(elsewhere.path())
            .arg("--project-dir")
            .arg(dir.path())
            .arg("init")
            .assert()
            .success();

        assert!(dir.path().join(".pmboard/pmboard.db").exists());
        assert!(!elsewhere.path().join(".pmboard").exists());
    }

    #[test]
    fn test_notify_overdue_with_nothing_due() {
        let dir = create_temp_project();
        init_project(&dir);

        pmboard()
            .current_dir(dir.path())
            .arg("notify-overdue")
            .assert()
            .success()
            .stdout(predicate::str::contains("0 overdue cards"));
    }
}
