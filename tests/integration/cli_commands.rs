#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    db: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let db = dir.path().join("forest.db");
        Self { dir, db }
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("lineage");
        cmd.env("LINEAGE_CONFIG", self.dir.path().join("absent.toml"))
            .env_remove("LINEAGE_DB")
            .env_remove("RUST_LOG")
            .arg("--db")
            .arg(&self.db);
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self
            .cmd()
            .args(["--format", "json"])
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&output).expect("valid json")
    }

    fn write(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, body).expect("write fixture");
        path
    }

    fn seed(&self) {
        let associations = self.write(
            "associations.csv",
            "id,code,parent_id,name\nd,D,c,Dee\nc,C,b,Cee\nb,B,root,Bee\nroot,ROOT,,Root\nr,R,,Other\n",
        );
        let clubs = self.write("clubs.csv", "id,parent_id,name\nk1,d,First club\n");
        self.cmd()
            .arg("import")
            .arg("--associations")
            .arg(&associations)
            .arg("--clubs")
            .arg(&clubs)
            .assert()
            .success();
    }
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .expect("array")
        .iter()
        .map(|v| v.as_str().expect("string").to_string())
        .collect()
}

#[test]
fn create_reports_derived_path() {
    let ws = Workspace::new();
    ws.json(&["create", "ha", "--code", "HA", "--name", "National"]);
    let created = ws.json(&[
        "create", "hq", "--code", "HQ", "--name", "State", "--parent", "ha",
    ]);
    assert_eq!(created["level"], 1);
    assert_eq!(strings(&created["hierarchy"]), vec!["ha"]);
    assert_eq!(created["status"], "active");
}

#[test]
fn import_then_move_cascades() {
    let ws = Workspace::new();
    ws.seed();

    let moved = ws.json(&["move", "b", "--parent", "r"]);
    assert_eq!(moved["cascade"]["total"], 2);

    let shown = ws.json(&["show", "d"]);
    assert_eq!(strings(&shown["association"]["hierarchy"]), vec!["r", "b", "c"]);
    assert_eq!(strings(&shown["ancestors"]), vec!["r", "b", "c"]);
    assert_eq!(shown["clubs"][0]["id"], "k1");
}

#[test]
fn cycle_is_refused_with_message() {
    let ws = Workspace::new();
    ws.seed();
    let output = ws
        .cmd()
        .args(["move", "root", "--parent", "d"])
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(stderr.contains("is one of its descendants"), "{stderr}");
}

#[test]
fn delete_guard_message_is_actionable() {
    let ws = Workspace::new();
    ws.seed();
    let output = ws
        .cmd()
        .args(["delete", "c"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(
        stderr.contains("cannot delete c: 1 child associations exist"),
        "{stderr}"
    );

    let deleted = ws.json(&["delete", "r"]);
    assert_eq!(deleted["outcome"], "deactivated");
}

#[test]
fn verify_passes_on_engine_written_data() {
    let ws = Workspace::new();
    ws.seed();
    let report = ws.json(&["verify", "--level", "full"]);
    assert_eq!(report["success"], true);
    assert_eq!(report["counts"]["associations"], 5);
}

#[test]
fn export_writes_nested_forest() {
    let ws = Workspace::new();
    ws.seed();
    let out = ws.dir.path().join("forest.json");
    ws.cmd()
        .arg("export")
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    let forest: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let roots = forest["roots"].as_array().unwrap();
    assert_eq!(roots.len(), 2);
    let root = roots
        .iter()
        .find(|node| node["association"]["id"] == "root")
        .expect("root present");
    let d = &root["children"][0]["children"][0]["children"][0];
    assert_eq!(d["association"]["id"], "d");
    assert_eq!(d["clubs"][0]["name"], "First club");
}

#[test]
fn missing_database_argument_fails() {
    let dir = TempDir::new().unwrap();
    cargo_bin_cmd!("lineage")
        .env("LINEAGE_CONFIG", dir.path().join("absent.toml"))
        .env_remove("LINEAGE_DB")
        .arg("tree")
        .assert()
        .failure()
        .code(1);
}

#[test]
fn config_file_supplies_database_path() {
    let ws = Workspace::new();
    let config = ws.write(
        "cli.toml",
        &format!("[database]\ndefault = {:?}\n", path_str(&ws.db)),
    );
    cargo_bin_cmd!("lineage")
        .env("LINEAGE_CONFIG", &config)
        .env_remove("LINEAGE_DB")
        .args(["create", "solo", "--code", "SOLO", "--name", "Solo"])
        .assert()
        .success();
    let tree = ws.json(&["tree"]);
    assert_eq!(tree["roots"][0]["association"]["id"], "solo");
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
