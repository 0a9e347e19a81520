//! Markdown report generation
//!
//! This module generates a human-readable markdown report of the monitor:
//! run overview, monitored groups, recent tasks and keyword counters.

use crate::output::{MonitorSummary, OutputResult};
use crate::tasks::Task;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown report to `output_path`
///
/// # Arguments
///
/// * `summary` - The summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn generate_markdown_report(summary: &MonitorSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a summary as markdown
pub fn format_markdown_report(summary: &MonitorSummary) -> String {
    let stats = &summary.task_stats;
    let mut md = String::new();

    md.push_str("# Wallwatch Report\n\n");
    md.push_str(&format!(
        "Generated {}\n\n",
        summary.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    // Run overview
    md.push_str("## Run Overview\n\n");
    md.push_str(&format!("- **Total Runs**: {}\n", stats.total_runs));
    md.push_str(&format!("- **Completed**: {}\n", stats.completed));
    md.push_str(&format!("- **Failed**: {}\n", stats.failed));
    md.push_str(&format!("- **Stopped**: {}\n", stats.stopped));
    if let Some(avg) = stats.average_duration_secs {
        md.push_str(&format!("- **Average Duration**: {:.1} seconds\n", avg));
    }
    md.push_str(&format!("- **Posts Checked**: {}\n", stats.total_posts));
    if stats.total_posts_skipped > 0 {
        md.push_str(&format!(
            "- **Posts Skipped**: {}\n",
            stats.total_posts_skipped
        ));
    }
    md.push_str(&format!("- **New Comments**: {}\n", stats.total_new_comments));
    md.push_str(&format!(
        "- **Keyword Matches**: {}\n\n",
        stats.total_keyword_matches
    ));

    // Groups
    if !summary.groups.is_empty() {
        md.push_str("## Groups\n\n");
        md.push_str("| Group | Name | Active | Posts | Comments | Last Crawled |\n");
        md.push_str("|-------|------|--------|-------|----------|--------------|\n");
        for group in &summary.groups {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                group.id,
                group.name.as_deref().unwrap_or("-"),
                if group.is_active { "yes" } else { "no" },
                group.total_posts,
                group.total_comments,
                group.last_crawled_at.as_deref().unwrap_or("never"),
            ));
        }
        md.push('\n');
    }

    // Recent tasks
    if !summary.recent_tasks.is_empty() {
        md.push_str("## Recent Tasks\n\n");
        md.push_str("| Task | Status | Groups | Posts | New Comments | Matches | Error |\n");
        md.push_str("|------|--------|--------|-------|--------------|---------|-------|\n");
        for task in &summary.recent_tasks {
            md.push_str(&task_row(task));
        }
        md.push('\n');
    }

    // Keywords
    if !summary.keywords.is_empty() {
        md.push_str("## Keywords\n\n");
        md.push_str("| Keyword | Active | Matches |\n");
        md.push_str("|---------|--------|---------|\n");
        for keyword in &summary.keywords {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                keyword.word,
                if keyword.is_active { "yes" } else { "no" },
                keyword.match_count
            ));
        }
        md.push('\n');
    }

    md
}

fn task_row(task: &Task) -> String {
    let groups: Vec<String> = task.group_ids.iter().map(|g| g.to_string()).collect();
    format!(
        "| {} | {} | {} | {} | {} | {} | {} |\n",
        task.id,
        task.status,
        groups.join(", "),
        task.stats.posts_processed,
        task.stats.new_comments,
        task.stats.keyword_matches,
        task.error_message.as_deref().unwrap_or(""),
    )
}
