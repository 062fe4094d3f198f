use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

/// commit1 {A, B}, commit2 {A, B, src/C}, commit3 {A} by a second author.
const FULL_HISTORY: &str = "\
hash,author,timestamp,insertions,deletions,files_count,files
c3,bob,2024-01-03T00:00:00+00:00,1,1,1,\"[\"\"A\"\"]\"
c2,alice,2024-01-02T00:00:00+00:00,3,0,3,\"[\"\"A\"\",\"\"B\"\",\"\"src/C\"\"]\"
c1,alice,2024-01-01T00:00:00+00:00,2,0,2,\"[\"\"A\"\",\"\"B\"\"]\"
";

const SUMMARY_HISTORY: &str = "\
hash,author,timestamp,insertions,deletions,files_count
c1,alice,2024-01-01T00:00:00+00:00,2,0,2
";

fn gitrisk(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gitrisk"))
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "gitrisk failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn workspace(history: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("repo.csv"), history).unwrap();
    dir
}

#[test]
fn hotspot_json_ranks_shared_files_first() {
    let dir = workspace(FULL_HISTORY);
    let out = stdout(&gitrisk(
        dir.path(),
        &["hotspot", "-i", "repo.csv", "--format", "json"],
    ));
    let rows: serde_json::Value = serde_json::from_str(&out).unwrap();
    let rows = rows.as_array().unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["fileName"], "A");
    assert_eq!(rows[0]["commits"], 3);
    assert_eq!(rows[0]["authors"], 2);
    assert_eq!(rows[0]["hotspot"], 6.0);
    assert_eq!(rows[1]["fileName"], "B");
    assert_eq!(rows[2]["fileName"], "src/C");
}

#[test]
fn hotspot_csv_respects_file_filters() {
    let dir = workspace(FULL_HISTORY);
    let out = stdout(&gitrisk(
        dir.path(),
        &["hotspot", "-i", "repo.csv", "--csv", "--ignore-files", "src/*"],
    ));
    let lines: Vec<&str> = out.lines().collect();
    assert!(lines[0].starts_with("file_name,commits,authors,hotspot"));
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("A,3,2,"));
    assert!(!out.contains("src/C"));
}

#[test]
fn hotspot_limit_and_output_file() {
    let dir = workspace(FULL_HISTORY);
    let output = gitrisk(
        dir.path(),
        &["hotspot", "-i", "repo.csv", "-n", "1", "-o", "hot.txt"],
    );
    assert!(stdout(&output).is_empty());

    let report = std::fs::read_to_string(dir.path().join("hot.txt")).unwrap();
    assert!(report.contains("file_name"));
    assert!(report.lines().any(|l| l.ends_with(" A")));
    assert!(!report.contains(" B"));
}

#[test]
fn hotspot_reads_stdin_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_gitrisk"))
        .args(["hotspot", "--csv"])
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(FULL_HISTORY.as_bytes())
        .unwrap();
    let out = stdout(&child.wait_with_output().unwrap());
    assert_eq!(out.lines().count(), 4);
}

#[test]
fn hotspot_on_summary_history_suggests_full_mode() {
    let dir = workspace(SUMMARY_HISTORY);
    let output = gitrisk(dir.path(), &["hotspot", "-i", "repo.csv"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--full"), "unexpected stderr: {stderr}");
}

#[test]
fn hotgraph_rank_keeps_the_strongest_pair() {
    let dir = workspace(FULL_HISTORY);
    let out = stdout(&gitrisk(
        dir.path(),
        &["hotgraph", "-i", "repo.csv", "--rank", "1", "--csv"],
    ));
    assert_eq!(out, "file_a,file_b,weight\nA,B,2\n");
}

#[test]
fn hotgraph_writes_dot_by_default() {
    let dir = workspace(FULL_HISTORY);
    let out = stdout(&gitrisk(dir.path(), &["hotgraph", "-i", "repo.csv"]));
    assert!(out.starts_with("graph {"));
    assert!(out.contains("\"src/C\""));
    assert_eq!(out.matches(" -- ").count(), 3);
}

#[test]
fn hotgraph_json_reports_threshold() {
    let dir = workspace(FULL_HISTORY);
    let out = stdout(&gitrisk(
        dir.path(),
        &["hotgraph", "-i", "repo.csv", "--format", "json", "--stop-retry"],
    ));
    let graph: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(graph["threshold"], 1);
    assert_eq!(graph["edges"].as_array().unwrap().len(), 3);
}

#[test]
fn hotgraph_with_nothing_left_is_not_a_crash() {
    let dir = workspace(FULL_HISTORY);
    let output = gitrisk(
        dir.path(),
        &["hotgraph", "-i", "repo.csv", "--allow-files", "docs/*"],
    );
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Nothing to show"));
}

#[test]
fn missing_input_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = gitrisk(dir.path(), &["hotspot", "-i", "nope.csv"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope.csv"));
}

#[test]
fn plot_csv_has_one_row_per_bucket() {
    let dir = workspace(FULL_HISTORY);
    let out = stdout(&gitrisk(
        dir.path(),
        &["plot", "-i", "repo.csv", "-t", "7D", "--csv"],
    ));
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "start,end,commits,authors,insertions,deletions,net_lines");
    assert_eq!(lines.len(), 2);
    assert!(lines[1].ends_with(",3,2,6,1,5"));
}

#[test]
fn plot_rejects_bad_timeslot() {
    let dir = workspace(FULL_HISTORY);
    let output = gitrisk(dir.path(), &["plot", "-i", "repo.csv", "-t", "3Y"]);
    assert!(!output.status.success());
}

#[test]
fn info_json_summarizes_history() {
    let dir = workspace(FULL_HISTORY);
    let out = stdout(&gitrisk(
        dir.path(),
        &["info", "-i", "repo.csv", "--format", "json"],
    ));
    let summary: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(summary["commits"], 3);
    assert_eq!(summary["authors"], 2);
    assert_eq!(summary["files"], 3);
    assert_eq!(summary["insertions"], 6);
    assert_eq!(summary["topAuthors"][0]["author"], "alice");
}

#[test]
fn info_applies_file_filters() {
    let dir = workspace(FULL_HISTORY);
    let out = stdout(&gitrisk(
        dir.path(),
        &["info", "-i", "repo.csv", "--format", "json", "--allow-files", "src/*"],
    ));
    let summary: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(summary["commits"], 1);
    assert_eq!(summary["files"], 1);
}

fn commit(repo: &git2::Repository, files: &[(&str, &str)]) {
    let root = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    for (path, content) in files {
        std::fs::write(root.join(path), content).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = git2::Signature::now("alice", "alice@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, "change", &tree, &parents)
        .unwrap();
}

#[test]
fn log_then_hotspot_pipeline() {
    let repo_dir = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init(repo_dir.path()).unwrap();
    commit(&repo, &[("main.rs", "fn main() {}\n"), ("lib.rs", "\n")]);
    commit(&repo, &[("main.rs", "fn main() { run() }\n")]);

    let work = tempfile::tempdir().unwrap();
    let repo_arg = repo_dir.path().to_str().unwrap();
    let output = gitrisk(work.path(), &["log", repo_arg, "--full", "-o", "repo.csv"]);
    assert!(
        output.status.success(),
        "gitrisk log failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let history = std::fs::read_to_string(work.path().join("repo.csv")).unwrap();
    assert!(history.starts_with("hash,author,timestamp,insertions,deletions,files_count,files"));
    assert_eq!(history.lines().count(), 3);

    let out = stdout(&gitrisk(
        work.path(),
        &["hotspot", "-i", "repo.csv", "--format", "json"],
    ));
    let rows: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(rows[0]["fileName"], "main.rs");
    assert_eq!(rows[0]["commits"], 2);
}

#[test]
fn log_rejects_non_repository() {
    let dir = tempfile::tempdir().unwrap();
    let output = gitrisk(dir.path(), &["log", "."]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Not a git repository"));
}

#[test]
fn log_rejects_non_positive_months() {
    let repo_dir = tempfile::tempdir().unwrap();
    git2::Repository::init(repo_dir.path()).unwrap();
    let output = gitrisk(repo_dir.path(), &["log", ".", "--month", "0"]);
    assert!(!output.status.success());
}

#[test]
fn double_star_filter_is_accepted() {
    let dir = workspace(FULL_HISTORY);
    let out = stdout(&gitrisk(
        dir.path(),
        &["hotspot", "-i", "repo.csv", "--csv", "--ignore-files", "**C"],
    ));
    assert_eq!(out.lines().count(), 3);
    assert!(!out.contains("src/C"));
}

#[test]
fn info_survives_huge_line_counts() {
    let history = "\
hash,author,timestamp,insertions,deletions,files_count
c2,bob,2024-01-02T00:00:00+00:00,18446744073709551615,0,1
c1,bob,2024-01-01T00:00:00+00:00,18446744073709551615,0,1
";
    let dir = workspace(history);
    let out = stdout(&gitrisk(
        dir.path(),
        &["info", "-i", "repo.csv", "--format", "json"],
    ));
    let summary: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(summary["insertions"], u64::MAX);
}
