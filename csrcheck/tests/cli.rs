use assert_cmd::Command;
use predicates::str::contains;
use std::path::PathBuf;

fn cmd() -> Command {
    Command::cargo_bin("csrcheck").unwrap()
}

fn data(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../csrcheck-lib/tests/data")
        .join(name)
}

#[test]
fn validate_compliant_request_offline() {
    cmd()
        .args(["validate", "--no-whois", "--no-feeds"])
        .arg(data("good.csr"))
        .assert()
        .code(0)
        .stdout(contains("CSR validation: COMPLIANT"))
        .stdout(contains("[PASS] Baseline compliant"));
}

#[test]
fn validate_request_without_san_exits_one() {
    cmd()
        .args(["validate", "--no-whois", "--no-feeds"])
        .arg(data("no_san.csr"))
        .assert()
        .code(1)
        .stdout(contains("[SKIP] Subject Alternative Name (SAN) mandatory"));
}

#[test]
fn validate_empty_input_exits_two() {
    let empty = tempfile::NamedTempFile::new().unwrap();
    cmd()
        .args(["validate", "--no-whois", "--no-feeds"])
        .arg(empty.path())
        .assert()
        .code(2)
        .stdout(contains("CSR validation: UNREADABLE"))
        .stdout(contains("[FAIL] Valid CSR content"));
}

#[test]
fn validate_reads_stdin_and_prints_json() {
    let input = std::fs::read(data("private_ip.csr")).unwrap();
    let output = cmd()
        .args(["validate", "--json", "--no-whois", "--no-feeds"])
        .write_stdin(input)
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["terminal_failure"], false);
    assert_eq!(report["checks"].as_array().unwrap().len(), 20);
    let reserved = report["checks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "Reserved IPv4 addresses not present")
        .unwrap();
    assert_eq!(reserved["passed"], false);
}

#[test]
fn validate_with_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("policy.toml");
    std::fs::write(&config, "required_key_bits = 4096\n").unwrap();
    cmd()
        .args(["validate", "--no-whois", "--no-feeds", "--config"])
        .arg(&config)
        .arg(data("rsa4096.csr"))
        .assert()
        .code(0);
}

#[test]
fn validate_rejects_bad_timeout() {
    cmd()
        .args(["validate", "--no-whois", "--no-feeds", "--whois-timeout", "soon"])
        .arg(data("good.csr"))
        .assert()
        .failure()
        .stderr(contains("Invalid duration"));
}

#[test]
fn inspect_shows_subject_and_hashes() {
    let sha1 = std::fs::read_to_string(data("good.sha1")).unwrap();
    cmd()
        .args(["inspect", "--all"])
        .arg(data("good.csr"))
        .assert()
        .success()
        .stdout(contains("CN = a.example.com"))
        .stdout(contains("DNS: www.example.com"))
        .stdout(contains("Registrable Domains: example.com"))
        .stdout(contains(format!("Weak-key digest: {}", sha1.trim())))
        .stdout(contains("SHA-256: "));
}

#[test]
fn inspect_directory_reports_failures() {
    cmd()
        .args(["inspect", "--failures-only"])
        .arg(data(""))
        .assert()
        .code(1)
        .stderr(contains("no_san.csr: FAIL (no SAN entries)"))
        .stderr(contains("truncated.csr: FAIL (parse error"));
}

#[test]
fn inspect_unparseable_input_fails() {
    cmd()
        .arg("inspect")
        .write_stdin("not a request")
        .assert()
        .failure()
        .stderr(contains("Malformed certificate signing request"));
}

#[test]
fn weak_key_listed_and_clean() {
    cmd()
        .args(["weak-key", "--blacklist"])
        .arg(data("weak-keys.txt"))
        .arg(data("weak.csr"))
        .assert()
        .code(1)
        .stdout(contains("FAIL (known weak Debian key)"));

    cmd()
        .args(["weak-key", "--blacklist"])
        .arg(data("weak-keys.txt"))
        .arg(data("good.csr"))
        .assert()
        .code(0)
        .stdout(contains("PASS"));
}

#[test]
fn weak_key_missing_blacklist_is_an_error() {
    cmd()
        .args(["weak-key", "--blacklist", "/nonexistent/blacklist.txt"])
        .arg(data("good.csr"))
        .assert()
        .failure();
}
