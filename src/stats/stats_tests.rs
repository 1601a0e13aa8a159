//! Unit tests for commit construction and aggregation.

use super::*;
use crate::test_utils::log_entry;

const TRUNK_URL: &str = "http://svn.example.com/repo/trunk";
const BRANCH_URL: &str = "http://svn.example.com/repo/branches/feature-x";

fn commit(
    revision: &str,
    author: &str,
    timestamp: &str,
    paths: &[&str],
    added: u64,
    deleted: u64,
) -> Commit {
    let mut c = commits_from_log(&[log_entry(revision, author, timestamp, paths)], TRUNK_URL)
        .pop()
        .unwrap();
    c.lines_added = added;
    c.lines_deleted = deleted;
    c
}

fn alice_and_bob() -> Vec<Commit> {
    vec![
        commit("100", "alice", "2024-03-05T10:00:00Z", &["/trunk/a.rs"], 10, 2),
        commit("101", "bob", "2024-03-06T11:00:00Z", &["/trunk/b.rs"], 3, 1),
    ]
}

// ─── Commit construction ────────────────────────────────────────────

#[test]
fn test_commits_from_log_labels_branches() {
    let entries = vec![log_entry(
        "7",
        "carol",
        "2024-01-01T00:00:00Z",
        &["/branches/rel-1/src/x.c", "/trunk/y.c", "/branches/rel-1/z.c"],
    )];
    let commits = commits_from_log(&entries, BRANCH_URL);
    assert_eq!(commits.len(), 1);
    let c = &commits[0];
    assert_eq!(c.revision, "7");
    assert_eq!(c.branch_url, BRANCH_URL);
    assert_eq!(c.files_changed, 3);
    assert_eq!(c.branches, vec!["rel-1", "trunk"]);
    assert_eq!(c.changed_files[1].branch, "trunk");
    assert_eq!((c.lines_added, c.lines_deleted), (0, 0));
    assert!(c.file_details.is_empty());
}

#[test]
fn test_commit_without_paths_has_no_branches() {
    let commits = commits_from_log(&[log_entry("9", "dave", "2024-01-01T00:00:00Z", &[])], TRUNK_URL);
    assert!(commits[0].branches.is_empty());
    assert_eq!(commits[0].files_changed, 0);
}

#[test]
fn test_period_keys_use_utc() {
    let c = commit("1", "a", "2024-02-29T23:30:00-02:00", &["/trunk/x"], 0, 0);
    assert_eq!(c.month_key(), "2024-03");
    assert_eq!(c.day_key(), "2024-03-01");
}

#[test]
fn test_apply_diff_attaches_counts() {
    let mut c = commit("1", "a", "2024-01-01T00:00:00Z", &["/trunk/x"], 0, 0);
    let mut diff = DiffResult {
        lines_added: 4,
        lines_deleted: 2,
        ..Default::default()
    };
    diff.files.insert("x".to_string(), FileDetail::default());
    c.apply_diff(diff);
    assert_eq!((c.lines_added, c.lines_deleted), (4, 2));
    assert!(c.file_details.contains_key("x"));
}

#[test]
fn test_merge_commits_sorts_numerically_and_dedups() {
    let trunk = commits_from_log(
        &[
            log_entry("9", "a", "2024-01-01T00:00:00Z", &["/trunk/x"]),
            log_entry("100", "a", "2024-01-02T00:00:00Z", &["/trunk/x"]),
        ],
        TRUNK_URL,
    );
    let branch = commits_from_log(
        &[
            log_entry("10", "b", "2024-01-01T12:00:00Z", &["/branches/f/x"]),
            log_entry("100", "a", "2024-01-02T00:00:00Z", &["/trunk/x"]),
        ],
        BRANCH_URL,
    );
    let merged = merge_commits(vec![trunk, branch]);
    let revs: Vec<&str> = merged.iter().map(|c| c.revision.as_str()).collect();
    assert_eq!(revs, vec!["9", "10", "100"]);
    // First batch wins for the duplicate.
    assert_eq!(merged[2].branch_url, TRUNK_URL);
}

#[test]
fn test_filter_by_date_is_inclusive() {
    let commits = vec![
        commit("1", "a", "2024-01-31T23:59:59Z", &["/trunk/x"], 0, 0),
        commit("2", "a", "2024-02-01T00:00:00Z", &["/trunk/x"], 0, 0),
        commit("3", "a", "2024-02-29T23:59:59Z", &["/trunk/x"], 0, 0),
        commit("4", "a", "2024-03-01T00:00:00Z", &["/trunk/x"], 0, 0),
    ];
    let filter = DateFilter::parse(Some("2024-02-01"), Some("2024-02-29")).unwrap();
    let kept: Vec<String> = filter_by_date(commits, &filter)
        .into_iter()
        .map(|c| c.revision)
        .collect();
    assert_eq!(kept, vec!["2", "3"]);
}

// ─── Aggregation ────────────────────────────────────────────────────

#[test]
fn test_alice_and_bob_on_trunk() {
    let results = aggregate(alice_and_bob(), Filter::default());

    assert_eq!(results.author_stats["alice"].lines_added, 10);
    assert_eq!(results.branch_stats["trunk"].commits, 2);
    assert_eq!(results.total_lines_added, 13);
    assert_eq!(results.total_lines_deleted, 3);
    assert_eq!(results.total_commits, 2);
    assert_eq!(results.total_files, 2);
    assert_eq!(results.branch_stats["trunk"].authors, vec!["alice", "bob"]);
}

#[test]
fn test_period_tables_accumulate_without_commit_counts() {
    let mut commits = alice_and_bob();
    commits.push(commit("102", "alice", "2024-03-20T09:00:00Z", &["/trunk/c.rs", "/trunk/d.rs"], 5, 0));
    let results = aggregate(commits, Filter::default());

    let march = results.monthly_stats.get("2024-03", "trunk", "alice").unwrap();
    assert_eq!(
        *march,
        PeriodStats {
            files_changed: 3,
            lines_added: 15,
            lines_deleted: 2,
        }
    );
    assert_eq!(results.daily_stats.get("2024-03-05", "trunk", "alice").unwrap().lines_added, 10);
    assert!(results.daily_stats.get("2024-03-05", "trunk", "bob").is_none());
    assert_eq!(results.daily_stats.len(), 3);
}

#[test]
fn test_multi_branch_commit_distributes_but_totals_once() {
    let commits = vec![commit(
        "200",
        "alice",
        "2024-04-01T00:00:00Z",
        &["/trunk/a.rs", "/branches/rel/a.rs", "/trunk/b.rs"],
        7,
        1,
    )];
    let results = aggregate(commits, Filter::default());

    // Each branch bucket sees the whole commit.
    for branch in ["trunk", "rel"] {
        let bucket = results.monthly_stats.get("2024-04", branch, "alice").unwrap();
        assert_eq!((bucket.files_changed, bucket.lines_added), (3, 7));
        assert_eq!(results.branch_stats[branch].commits, 1);
    }
    // Totals and the author table count it once.
    assert_eq!(results.total_lines_added, 7);
    assert_eq!(results.total_files, 3);
    assert_eq!(results.author_stats["alice"].commits, 1);
    assert_eq!(results.author_stats["alice"].lines_added, 7);
    assert_eq!(results.author_stats["alice"].branches, vec!["trunk", "rel"]);
}

#[test]
fn test_duplicate_branch_labels_count_once() {
    let mut c = commit("300", "bob", "2024-05-01T00:00:00Z", &["/trunk/x"], 2, 0);
    c.branches = vec!["trunk".to_string(), "trunk".to_string()];
    let results = aggregate(vec![c], Filter::default());
    assert_eq!(results.branch_stats["trunk"].commits, 1);
    assert_eq!(results.monthly_stats.get("2024-05", "trunk", "bob").unwrap().lines_added, 2);
}

#[test]
fn test_chart_series_are_sorted_and_aligned() {
    let commits = vec![
        commit("1", "zed", "2024-02-10T00:00:00Z", &["/trunk/a"], 4, 0),
        commit("2", "amy", "2024-01-15T00:00:00Z", &["/branches/b1/a"], 6, 0),
        commit("3", "amy", "2024-02-11T00:00:00Z", &["/trunk/a", "/branches/b1/a"], 1, 0),
    ];
    let chart = aggregate(commits, Filter::default()).chart_data;

    assert_eq!(chart.authors, vec!["amy", "zed"]);
    assert_eq!(chart.branches, vec!["b1", "trunk"]);
    assert_eq!(chart.months, vec!["2024-01", "2024-02"]);
    assert_eq!(chart.days, vec!["2024-01-15", "2024-02-10", "2024-02-11"]);

    let amy_lines = &chart.monthly_data_lines[0];
    assert_eq!(amy_lines.label, "amy");
    // r3 is on two branches and is summed across both.
    assert_eq!(amy_lines.data, vec![6, 2]);
    assert_eq!(chart.monthly_data_lines[1].data, vec![0, 4]);
    assert_eq!(chart.daily_data_files[1].data, vec![0, 1, 0]);
    for series in chart.daily_data_files.iter().chain(&chart.daily_data_lines) {
        assert_eq!(series.data.len(), chart.days.len());
    }
}

#[test]
fn test_empty_input() {
    let results = aggregate(Vec::new(), Filter::default());
    assert_eq!(results.total_commits, 0);
    assert!(results.monthly_stats.is_empty());
    assert!(results.chart_data.months.is_empty());
    assert!(results.chart_data.monthly_data_files.is_empty());
}

#[test]
fn test_filter_is_echoed() {
    let filter = Filter {
        start_date: Some("2024-01-01".to_string()),
        end_date: None,
        revision_range: Some("100:HEAD".to_string()),
    };
    let results = aggregate(alice_and_bob(), filter.clone());
    assert_eq!(results.filter, filter);
}

#[test]
fn test_period_table_serializes_as_rows() {
    let results = aggregate(alice_and_bob(), Filter::default());
    let json = serde_json::to_value(&results.monthly_stats).unwrap();
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["period"], "2024-03");
    assert_eq!(rows[0]["branch"], "trunk");
    assert_eq!(rows[0]["author"], "alice");
    assert_eq!(rows[0]["lines_added"], 10);
}

// ─── Property tests ─────────────────────────────────────────────────

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    const PATHS: [&str; 4] = ["/trunk/a", "/branches/x/a", "/branches/y/b", "/mod/src/main/c"];

    fn arb_commit() -> impl Strategy<Value = Commit> {
        (
            1u32..5000,
            prop::sample::select(vec!["amy", "bob", "cyd"]),
            0i64..(3 * 365 * 86_400),
            prop::sample::subsequence(PATHS.to_vec(), 0..=PATHS.len()),
            0u64..500,
            0u64..500,
        )
            .prop_map(|(rev, author, offset, paths, added, deleted)| {
                let ts = chrono::DateTime::from_timestamp(1_700_000_000 + offset, 0)
                    .unwrap()
                    .to_rfc3339();
                commit(&rev.to_string(), author, &ts, &paths, added, deleted)
            })
    }

    proptest! {
        #[test]
        fn totals_match_commit_sums(commits in prop::collection::vec(arb_commit(), 0..40)) {
            let expected_added: u64 = commits.iter().map(|c| c.lines_added).sum();
            let expected_deleted: u64 = commits.iter().map(|c| c.lines_deleted).sum();
            let expected_files: u64 = commits.iter().map(|c| c.files_changed).sum();
            let n = commits.len() as u64;

            let results = aggregate(commits, Filter::default());
            prop_assert_eq!(results.total_lines_added, expected_added);
            prop_assert_eq!(results.total_lines_deleted, expected_deleted);
            prop_assert_eq!(results.total_files, expected_files);
            prop_assert_eq!(results.total_commits, n);

            let author_commits: u64 = results.author_stats.values().map(|a| a.commits).sum();
            prop_assert_eq!(author_commits, n);
        }

        #[test]
        fn series_cover_every_axis_value(commits in prop::collection::vec(arb_commit(), 0..40)) {
            let chart = aggregate(commits, Filter::default()).chart_data;
            prop_assert_eq!(chart.monthly_data_files.len(), chart.authors.len());
            for s in chart.monthly_data_files.iter().chain(&chart.monthly_data_lines) {
                prop_assert_eq!(s.data.len(), chart.months.len());
            }
            for s in chart.daily_data_files.iter().chain(&chart.daily_data_lines) {
                prop_assert_eq!(s.data.len(), chart.days.len());
            }
            let mut sorted = chart.months.clone();
            sorted.sort();
            prop_assert_eq!(sorted, chart.months);
        }
    }
}
