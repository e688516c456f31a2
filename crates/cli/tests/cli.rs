use assert_cmd::Command;

fn shelf() -> Command {
    let mut cmd = Command::cargo_bin("shelf-cli").unwrap();
    cmd.env("SHELF_CONFIG_DIR", std::env::temp_dir().join("shelf-cli-no-config"))
        .env("SHELF_ENV", "local")
        .env("RUST_LOG", "error");
    cmd
}

#[test]
fn config_prints_resolved_settings() {
    let output = shelf().arg("config").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("environment = Local"));
    assert!(stdout.contains("server      = 0.0.0.0:8080"));
}

#[test]
fn migrate_applies_then_skips() {
    let path = std::env::temp_dir().join(format!("shelf-cli-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let run = || {
        shelf()
            .env("SHELF_DATABASE__PATH", &path)
            .arg("migrate")
            .output()
            .unwrap()
    };

    let first = run();
    assert!(first.status.success());
    assert!(String::from_utf8_lossy(&first.stdout).contains("applied 1 migration(s)"));

    let second = run();
    assert!(second.status.success());
    assert!(String::from_utf8_lossy(&second.stdout).contains("applied 0 migration(s)"));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn unknown_environment_fails() {
    shelf().env("SHELF_ENV", "qa").arg("config").assert().failure();
}
