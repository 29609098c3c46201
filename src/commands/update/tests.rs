use std::fs;
use std::path::{Path, PathBuf};

use super::run::{apply_updates, render_update_command};
use crate::cli::UpdateArgs;
use crate::config::ProjectConfig;
use crate::model::RunManifest;
use crate::reconcile::{CorrectionCache, Reconciler};
use crate::snapshot::{MergeIssue, load_snapshot};
use crate::vocabulary::Vocabulary;

const SNAPSHOT: &str = "document,record_id,speaker,text\n\
                        Smith,1,Smith,I never share,privacy\n\
                        Smith,2,Smith,I trust my bank,trust\n\
                        Lee,1,Lee,fine,privacy\n";

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write file");
    path
}

fn args(dir: &Path, updates: Vec<PathBuf>) -> UpdateArgs {
    UpdateArgs {
        output_dir: dir.join("out"),
        codebook: dir.join("codebook.csv"),
        config: None,
        snapshot: Some(dir.join("master.csv")),
        updates,
    }
}

#[test]
fn later_update_file_wins_for_same_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let snapshot_path = write_file(dir.path(), "master.csv", SNAPSHOT);
    let first = write_file(
        dir.path(),
        "first.csv",
        "document,record_id,speaker,text\nSmith,2,Smith,first edit,privacy\n",
    );
    let second = write_file(
        dir.path(),
        "second.csv",
        "document,record_id,speaker,text\nSmith,2,Smith,second edit,trust\nJones,7,Jones,x\n",
    );

    let vocabulary = Vocabulary::from_entries(["privacy", "trust"]);
    let config = ProjectConfig::default();
    let reconciler = Reconciler::new(&vocabulary, &config);
    let mut cache = CorrectionCache::new();
    let mut snapshot = load_snapshot(&snapshot_path).expect("snapshot");

    let report = apply_updates(&mut snapshot, &[first, second], &reconciler, &mut cache)
        .expect("apply updates");

    assert_eq!(report.applied, 2);
    assert_eq!(report.issues.len(), 1);
    assert!(matches!(
        &report.issues[0],
        MergeIssue::UnknownDocument { document, record_id: 7, .. } if document == "Jones"
    ));

    let record = &snapshot.documents[0].records[1];
    assert_eq!(record.text, "second edit");
    assert_eq!(record.tags, vec!["trust".to_string()]);
    assert_eq!(snapshot.documents[1].records[0].text, "fine");
}

#[test]
fn missing_update_file_fails_before_any_merge() {
    let dir = tempfile::tempdir().expect("tempdir");
    let snapshot_path = write_file(dir.path(), "master.csv", SNAPSHOT);
    let edits = write_file(
        dir.path(),
        "edits.csv",
        "document,record_id,speaker,text\nLee,1,Lee,changed\n",
    );

    let vocabulary = Vocabulary::from_entries(["privacy", "trust"]);
    let config = ProjectConfig::default();
    let reconciler = Reconciler::new(&vocabulary, &config);
    let mut cache = CorrectionCache::new();
    let mut snapshot = load_snapshot(&snapshot_path).expect("snapshot");
    let before = snapshot.clone();

    let err = apply_updates(
        &mut snapshot,
        &[edits, dir.path().join("missing.csv")],
        &reconciler,
        &mut cache,
    )
    .expect_err("missing update file");

    assert!(err.to_string().contains("failed to open update file"));
    assert_eq!(snapshot, before);
}

#[test]
fn run_rewrites_snapshot_and_aggregates() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "codebook.csv", "privacy\ntrust\n");
    write_file(dir.path(), "master.csv", SNAPSHOT);
    let edits = write_file(
        dir.path(),
        "edits.csv",
        "document,record_id,speaker,text\nLee,1,Lee,actually I worry,privacy concerns,Trust\n",
    );

    let args = args(dir.path(), vec![edits]);
    let output_dir = args.output_dir.clone();
    super::run(args).expect("update run");

    let snapshot = load_snapshot(&output_dir.join("master.csv")).expect("updated snapshot");
    assert_eq!(snapshot.record_count(), 3);
    let lee = &snapshot.documents[1].records[0];
    assert_eq!(lee.text, "actually I worry");
    assert_eq!(lee.tags, vec!["privacy".to_string(), "trust".to_string()]);

    let aggregates: serde_json::Value = serde_json::from_slice(
        &fs::read(output_dir.join("aggregates.json")).expect("aggregates"),
    )
    .expect("parse aggregates");
    assert_eq!(aggregates["codes"]["trust"]["record_count"], 2);

    let manifest_path = fs::read_dir(output_dir.join("manifests"))
        .expect("manifest dir")
        .map(|entry| entry.expect("entry").path())
        .next()
        .expect("manifest file");
    let manifest: RunManifest =
        serde_json::from_slice(&fs::read(manifest_path).expect("read manifest"))
            .expect("parse manifest");
    assert_eq!(manifest.mode, "update");
    assert_eq!(manifest.counts.updates_applied, 1);
    assert_eq!(manifest.counts.updates_skipped, 0);
    assert_eq!(manifest.sources.len(), 2);
    assert_eq!(manifest.resolutions.nearest, 1);
    assert_eq!(
        manifest.paths.source_snapshot_path,
        Some(dir.path().join("master.csv").display().to_string())
    );
    assert_eq!(
        manifest.paths.snapshot_path,
        output_dir.join("master.csv").display().to_string()
    );
}

#[test]
fn run_drops_snapshot_tags_outside_codebook() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "codebook.csv", "privacy\n");
    write_file(
        dir.path(),
        "master.csv",
        "document,record_id,speaker,text\nLee,1,Lee,fine,Privacy,old_code\n",
    );

    let args = args(dir.path(), Vec::new());
    let output_dir = args.output_dir.clone();
    super::run(args).expect("update run");

    let written = fs::read_to_string(output_dir.join("master.csv")).expect("snapshot");
    assert_eq!(written, "document,record_id,speaker,text\nLee,1,Lee,fine,privacy\n");
    assert!(output_dir.join("csv/codes/privacy.csv").exists());
    assert!(!output_dir.join("csv/codes/Privacy.csv").exists());
    assert!(!output_dir.join("csv/codes/old_code.csv").exists());

    let manifest_path = fs::read_dir(output_dir.join("manifests"))
        .expect("manifest dir")
        .map(|entry| entry.expect("entry").path())
        .next()
        .expect("manifest file");
    let manifest: RunManifest =
        serde_json::from_slice(&fs::read(manifest_path).expect("read manifest"))
            .expect("parse manifest");
    assert_eq!(manifest.counts.snapshot_tags_rewritten, 1);
    assert_eq!(manifest.counts.snapshot_tags_dropped, 1);
    assert_eq!(manifest.warnings.len(), 1);
}

#[test]
fn repeated_runs_keep_every_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "codebook.csv", "privacy\ntrust\n");
    write_file(dir.path(), "master.csv", SNAPSHOT);

    let output_dir = dir.path().join("out");
    super::run(args(dir.path(), Vec::new())).expect("first run");
    super::run(args(dir.path(), Vec::new())).expect("second run");

    let manifests = fs::read_dir(output_dir.join("manifests"))
        .expect("manifest dir")
        .count();
    assert_eq!(manifests, 2);
}

#[test]
fn run_without_updates_rebuilds_outputs_from_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "codebook.csv", "privacy\ntrust\n");
    write_file(dir.path(), "master.csv", SNAPSHOT);

    let args = args(dir.path(), Vec::new());
    let output_dir = args.output_dir.clone();
    super::run(args).expect("update run");

    let written = fs::read_to_string(output_dir.join("master.csv")).expect("snapshot");
    assert_eq!(written, SNAPSHOT);
}

#[test]
fn run_fails_when_snapshot_missing() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "codebook.csv", "privacy\n");

    let args = args(dir.path(), Vec::new());
    let output_dir = args.output_dir.clone();
    let err = super::run(args).expect_err("missing snapshot");

    assert!(format!("{err:#}").contains("failed to open snapshot"));
    assert!(!output_dir.exists());
}

#[test]
fn render_update_command_lists_snapshot_and_updates() {
    let args = args(Path::new("work"), vec![PathBuf::from("edits.csv")]);
    let command = render_update_command(&args);
    assert!(command.starts_with("codebook update --output-dir work/out"));
    assert!(command.contains("--snapshot work/master.csv"));
    assert!(command.ends_with(" edits.csv"));
}
