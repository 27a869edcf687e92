//! Per-run report files under `<reports_dir>/<run_id>/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

use crate::orchestrator::{CategoryState, RunSummary};

fn state_label(state: CategoryState) -> &'static str {
    match state {
        CategoryState::NotStarted => "not started",
        CategoryState::ListingFetched => "listing fetched",
        CategoryState::Processing => "processing",
        CategoryState::Completed => "completed",
        CategoryState::Checkpointed => "checkpointed",
        CategoryState::Failed => "failed",
    }
}

pub fn render_brief(summary: &RunSummary) -> String {
    let totals = &summary.totals;
    let mut out = format!(
        "# Candidate Registry Sync\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Processed: {}\n- Created: {}\n- Updated: {}\n- Skipped: {}\n- Errored: {}\n- Dropped: {}\n",
        summary.run_id,
        summary.started_at,
        summary.finished_at,
        totals.processed,
        totals.created,
        totals.updated,
        totals.skipped,
        totals.errored,
        totals.dropped,
    );

    out.push_str("\n## Categories\n");
    for category in &summary.categories {
        let c = &category.counts;
        out.push_str(&format!(
            "- {} (`{}`): {}{}; processed {}, created {}, updated {}, skipped {}, errored {}",
            category.display_name,
            category.key,
            state_label(category.state),
            if category.resumed { ", resumed" } else { "" },
            c.processed,
            c.created,
            c.updated,
            c.skipped,
            c.errored,
        ));
        if category.remaining > 0 {
            out.push_str(&format!(", {} remaining", category.remaining));
        }
        if let Some(error) = &category.error {
            out.push_str(&format!(" ({error})"));
        }
        out.push('\n');
    }

    let incomplete = summary.incomplete_categories();
    if !incomplete.is_empty() {
        out.push_str(&format!(
            "\nCheckpointed for the next run: {}\n",
            incomplete.join(", ")
        ));
    }

    if !summary.review_items.is_empty() {
        out.push_str("\n## Name-only matches to review\n");
        for item in &summary.review_items {
            out.push_str(&format!(
                "- [{}] {} (ref {}) merged into #{} {}\n",
                item.category,
                item.incoming_name,
                item.person_ref,
                item.candidate_id,
                item.candidate_name,
            ));
        }
    }
    out
}

/// Writes `summary.json` and `run_brief.md`; returns the run's report directory.
pub async fn write_run_report(reports_dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    let run_dir = reports_dir.join(summary.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .await
        .with_context(|| format!("creating {}", run_dir.display()))?;

    let json = serde_json::to_vec_pretty(&serde_json::json!({
        "run_id": summary.run_id,
        "started_at": summary.started_at,
        "finished_at": summary.finished_at,
        "totals": summary.totals,
        "categories": summary.categories,
        "incomplete_categories": summary.incomplete_categories(),
        "review_queue": summary.review_items,
    }))
    .context("serializing run summary")?;
    fs::write(run_dir.join("summary.json"), json)
        .await
        .context("writing summary.json")?;

    fs::write(run_dir.join("run_brief.md"), render_brief(summary))
        .await
        .context("writing run_brief.md")?;

    Ok(run_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{CategoryReport, ReviewItem, SyncCounts};
    use chrono::Utc;
    use uuid::Uuid;

    fn summary() -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            totals: SyncCounts {
                processed: 4,
                created: 3,
                errored: 1,
                ..SyncCounts::default()
            },
            categories: vec![
                CategoryReport {
                    key: "head_of_ticket".to_string(),
                    display_name: "Presidential formula".to_string(),
                    state: CategoryState::Completed,
                    resumed: false,
                    counts: SyncCounts {
                        processed: 3,
                        created: 3,
                        ..SyncCounts::default()
                    },
                    remaining: 0,
                    error: None,
                },
                CategoryReport {
                    key: "legislators".to_string(),
                    display_name: "Senate".to_string(),
                    state: CategoryState::Checkpointed,
                    resumed: true,
                    counts: SyncCounts {
                        processed: 1,
                        errored: 1,
                        ..SyncCounts::default()
                    },
                    remaining: 2,
                    error: None,
                },
            ],
            review_items: vec![ReviewItem {
                category: "head_of_ticket".to_string(),
                person_ref: "1003".to_string(),
                incoming_name: "JUAN PÉREZ LÓPEZ".to_string(),
                incoming_national_id: None,
                candidate_id: 7,
                candidate_name: "Juan Perez Lopez".to_string(),
            }],
        }
    }

    #[test]
    fn brief_lists_incomplete_categories_and_reviews() {
        let brief = render_brief(&summary());
        assert!(brief.contains("- Created: 3"));
        assert!(brief.contains("Senate (`legislators`): checkpointed, resumed"));
        assert!(brief.contains("2 remaining"));
        assert!(brief.contains("Checkpointed for the next run: legislators"));
        assert!(brief.contains("JUAN PÉREZ LÓPEZ (ref 1003) merged into #7 Juan Perez Lopez"));
    }

    #[tokio::test]
    async fn report_files_are_written_per_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let summary = summary();
        let run_dir = write_run_report(dir.path(), &summary).await.expect("report");

        assert_eq!(run_dir, dir.path().join(summary.run_id.to_string()));
        let json: serde_json::Value = serde_json::from_slice(
            &std::fs::read(run_dir.join("summary.json")).expect("summary.json"),
        )
        .expect("json");
        assert_eq!(json["totals"]["created"], 3);
        assert_eq!(json["incomplete_categories"][0], "legislators");
        assert_eq!(json["review_queue"][0]["candidate_id"], 7);
        assert!(run_dir.join("run_brief.md").exists());
    }
}
