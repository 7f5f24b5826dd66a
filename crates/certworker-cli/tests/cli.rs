use assert_cmd::Command;
use predicates::prelude::*;

fn certworker() -> Command {
    let mut cmd = Command::cargo_bin("certworker").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("CERTWORKER_CONFIG")
        .env_remove("CERTWORKER_MEMCACHE_HOST")
        .env_remove("CERTWORKER_MEMCACHE_TTL")
        .env_remove("CERTWORKER_MEMORY_CACHE")
        .env_remove("CERTWORKER_LOADTEST_MODE");
    cmd
}

const DERIVE_JOB: &str = r#"derive_key::{"ikm":"0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b","salt":"","info":"","length":42,"hash_algorithm":"sha256"}"#;

#[test]
fn test_check_config_prints_effective_settings() {
    certworker()
        .args(["--memory-ttl", "15", "--loadtest", "check-config"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""memory_ttl": 15"#))
        .stdout(predicate::str::contains(r#""loadtest_mode": true"#));
}

#[test]
fn test_check_config_rejects_host_without_ttl() {
    certworker()
        .args(["--memcache-host", "cache:6379", "check-config"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("memcache_ttl"));
}

#[test]
fn test_check_config_loadtest_needs_memory_cache() {
    certworker()
        .args(["--no-memory-cache", "--loadtest", "check-config"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("memory cache"));
}

#[test]
fn test_exec_derive_key() {
    certworker()
        .args(["exec", DERIVE_JOB])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "8da4e775a563c18f715f802a063c5a31b8a11f5c5ee1879ec3454e5f3c738d2d9d201395faa4b61a96c8",
        ));
}

#[test]
fn test_exec_unknown_function_fails() {
    certworker()
        .args(["exec", "nope::{}"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_exec_bad_payload_is_a_decode_error() {
    certworker()
        .args(["exec", "derive_key::{}"])
        .assert()
        .code(2);
}

#[test]
fn test_run_answers_one_line_per_job() {
    let input = format!("{DERIVE_JOB}\nerror::{{\"message\":\"boom\"}}\n{DERIVE_JOB}\n");

    let output = certworker()
        .args(["--log-level", "error", "run"])
        .write_stdin(input)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "{stdout}");
    assert!(lines[0].starts_with(r#"{"value":"8da4e775"#));
    assert_eq!(lines[1], "");
    assert_eq!(lines[0], lines[2]);
}

#[test]
fn test_run_fail_fast_stops_on_handler_error() {
    certworker()
        .args(["run", "--fail-fast"])
        .write_stdin("error::{\"message\":\"boom\"}\n")
        .assert()
        .code(5)
        .stderr(predicate::str::contains("boom"));
}
