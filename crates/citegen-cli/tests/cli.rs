use std::path::Path;
use std::process::Command;

use citegen_science::RawRecord;
use citegen_science::cache::encode_line;
use tempfile::TempDir;

const CACHED_ARXIV: &str = r#"{"0KEY_": "a:1234.5678", "GetRecord": {"record": {"header": {"identifier": "oai:arXiv.org:1234.5678"}, "metadata": {"arXiv": {"authors": {"author": {"forenames": "Jon", "keyname": "Smith"}}, "created": "2020-01-01", "doi": null, "title": "Foo\nBar"}}}}}"#;

fn citegen(dir: &Path, template: &str, cache: &Path) -> std::process::Output {
    let template_path = dir.join("README.tpl.md");
    std::fs::write(&template_path, template).unwrap();

    Command::new(env!("CARGO_BIN_EXE_citegen"))
        .arg("--readme-template")
        .arg(&template_path)
        .arg("--cache-fname")
        .arg(cache)
        .arg("--config")
        .arg(dir.join("missing-config.toml"))
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn expands_from_cache_and_leaves_it_untouched() {
    let dir = TempDir::new().unwrap();
    let cache = dir.path().join("cache.jsonl");
    std::fs::write(&cache, format!("{CACHED_ARXIV}\n")).unwrap();
    let template = "# Reading list\n\n+ {\"arxiv_id\": \"1234.5678\"}\ntrailing  \n";

    let first = citegen(dir.path(), template, &cache);
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    assert_eq!(
        String::from_utf8(first.stdout.clone()).unwrap(),
        "# Reading list\n\n+ (2020) Foo Bar by Jon Smith\n  + https://arxiv.org/pdf/1234.5678\ntrailing  \n"
    );
    assert_eq!(
        std::fs::read_to_string(&cache).unwrap(),
        format!("{CACHED_ARXIV}\n")
    );

    let second = citegen(dir.path(), template, &cache);
    assert!(second.status.success());
    assert_eq!(second.stdout, first.stdout);
}

#[test]
fn cached_line_matches_writer_format() {
    // The fixture above must be exactly what the cache writer produces.
    let record: RawRecord = serde_json::from_str(CACHED_ARXIV).unwrap();
    assert_eq!(encode_line(&record).unwrap(), CACHED_ARXIV);
}

#[test]
fn malformed_reference_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let cache = dir.path().join("cache.jsonl");

    let output = citegen(dir.path(), "intro\n+ {broken\"}\n", &cache);
    assert!(!output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap(), "intro\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("malformed reference"));
    assert!(!cache.exists());
}

#[test]
fn missing_template_is_an_error() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_citegen"))
        .arg("--readme-template")
        .arg(dir.path().join("nope.md"))
        .arg("--config")
        .arg(dir.path().join("missing-config.toml"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("opening template"));
}
