use assert_cmd::Command;
use tempfile::tempdir;

fn pdfedit() -> Command {
    let mut cmd = Command::cargo_bin("pdfedit").unwrap();
    cmd.env("RUST_LOG", "off");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{:?}", output);
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn select_prints_one_based_pages() {
    pdfedit()
        .args(["select", "1,3-5,8", "--count", "6"])
        .assert()
        .success()
        .stdout("1,3,4,5\n");

    pdfedit()
        .args(["select", "odd", "-n", "5"])
        .assert()
        .success()
        .stdout("1,3,5\n");
}

#[test]
fn help_lists_subcommands() {
    let help = stdout_of(pdfedit().arg("--help"));
    for subcommand in ["view", "info", "select", "export", "edit", "thumbnails"] {
        assert!(help.contains(subcommand), "missing {subcommand} in {help}");
    }
}

#[test]
fn malformed_step_fails_without_writing_output() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.pdf");

    let output = pdfedit()
        .args(["edit", "missing.pdf", "-o"])
        .arg(&out)
        .arg("explode=1")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("explode"), "{stderr}");
    assert!(!out.exists());
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = tempdir().unwrap();
    pdfedit()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .args(["select", "1", "--count", "1"])
        .assert()
        .failure();
}

#[test]
fn malformed_config_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "zoom_step = 0.5\n").unwrap();

    let output = pdfedit()
        .arg("--config")
        .arg(&path)
        .args(["select", "1", "--count", "1"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid configuration"));
}

#[test]
fn non_finite_scale_is_rejected_before_opening() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.pdf");

    let output = pdfedit()
        .args(["export", "missing.pdf", "--scale", "nan", "-o"])
        .arg(&out)
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("export_scale"), "{stderr}");
    assert!(!out.exists());
}

#[test]
fn nan_zoom_bound_in_config_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "min_zoom = nan\n").unwrap();

    let output = pdfedit()
        .arg("--config")
        .arg(&path)
        .args(["select", "1", "--count", "1"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid configuration"));
}
