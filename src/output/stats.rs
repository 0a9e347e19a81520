//! Terminal statistics
//!
//! This module renders a [`MonitorSummary`] as plain text for the `stats`
//! command.

use crate::output::MonitorSummary;

/// Keywords shown in the statistics listing
const TOP_KEYWORDS: usize = 10;

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `summary` - The summary to display
pub fn print_statistics(summary: &MonitorSummary) {
    print!("{}", format_statistics(summary));
}

/// Formats statistics as the text printed by [`print_statistics`]
pub fn format_statistics(summary: &MonitorSummary) -> String {
    let stats = &summary.task_stats;
    let counts = &summary.counts;
    let mut out = String::new();

    out.push_str("=== Crawl Statistics ===\n\n");

    out.push_str("Runs:\n");
    out.push_str(&format!("  Total runs: {}\n", stats.total_runs));
    out.push_str(&format!("  Completed: {}\n", stats.completed));
    out.push_str(&format!("  Failed: {}\n", stats.failed));
    out.push_str(&format!("  Stopped: {}\n", stats.stopped));
    out.push_str(&format!("  Running: {}\n", stats.running));
    out.push_str(&format!("  Pending: {}\n", stats.pending));
    match stats.average_duration_secs {
        Some(avg) => out.push_str(&format!("  Average duration: {:.1}s\n", avg)),
        None => out.push_str("  Average duration: n/a\n"),
    }
    if let Some(last) = stats.last_run_at {
        out.push_str(&format!("  Last run: {}\n", last.to_rfc3339()));
    }
    out.push('\n');

    out.push_str("Content:\n");
    out.push_str(&format!("  Groups: {}\n", counts.groups));
    out.push_str(&format!("  Posts: {}\n", counts.posts));
    out.push_str(&format!("  Comments: {}\n", counts.comments));
    out.push_str(&format!("  Keyword matches: {}\n", counts.keyword_matches));
    out.push('\n');

    let hit_rate = if stats.total_new_comments > 0 {
        (stats.total_keyword_matches as f64 / stats.total_new_comments as f64) * 100.0
    } else {
        0.0
    };
    out.push_str(&format!(
        "Matches per 100 new comments: {:.1} ({} matches / {} new comments)\n",
        hit_rate, stats.total_keyword_matches, stats.total_new_comments
    ));

    let matched: Vec<_> = summary
        .keywords
        .iter()
        .filter(|k| k.match_count > 0)
        .take(TOP_KEYWORDS)
        .collect();
    if !matched.is_empty() {
        out.push_str("\nTop Keywords:\n");
        for keyword in matched {
            out.push_str(&format!("  {}: {}\n", keyword.word, keyword.match_count));
        }
    }

    out
}
