//! Board display and operation edits.

use anyhow::Result;
use chrono::{DateTime, Utc};
use mfgsuite_schedule::{Board, BoardModel, DragOutcome, Operation, OperationPatch};
use mfgsuite_sync::{CommitOutcome, SchedulerSession};

use super::Backend;

/// Print the board as a table, or as JSON.
pub async fn show(backend: &Backend, json_output: bool) -> Result<()> {
    let ctx = backend.credentials.context().await?;
    let board = backend.source.get_board(&ctx, &backend.board_id).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&board)?);
        return Ok(());
    }
    for line in render(&board) {
        println!("{}", line);
    }
    Ok(())
}

/// Table lines: work centers in row order, each followed by its operations
/// sorted by start. Operations on unknown work centers are listed last.
pub fn render(board: &Board) -> Vec<String> {
    let model = BoardModel::new(board.clone());
    let mut lines = vec![format!(
        "Board {} ({} work centers, {} operations)",
        board.name.as_deref().unwrap_or(&board.id),
        board.work_centers.len(),
        board.operations.len()
    )];

    for (row, wc) in model.work_centers().iter().enumerate() {
        lines.push(String::new());
        lines.push(format!("{} {}", wc.id, wc.name));
        let mut ops: Vec<&Operation> = model
            .placed_operations()
            .filter(|(r, _)| *r == row)
            .map(|(_, op)| op)
            .collect();
        ops.sort_by_key(|op| op.start);
        if ops.is_empty() {
            lines.push("  -".to_string());
        }
        for op in ops {
            lines.push(operation_line(op));
        }
    }

    let unplaced: Vec<&Operation> = board
        .operations
        .iter()
        .filter(|op| model.row_index(&op.work_center_id).is_none())
        .collect();
    if !unplaced.is_empty() {
        lines.push(String::new());
        lines.push("Unplaced (unknown work center)".to_string());
        for op in unplaced {
            lines.push(format!("{} @ {}", operation_line(op), op.work_center_id));
        }
    }
    lines
}

fn operation_line(op: &Operation) -> String {
    format!(
        "  {:10} {:10} {} .. {}  {}",
        op.id,
        op.work_order_no,
        op.start.format("%Y-%m-%d %H:%M"),
        op.end.format("%H:%M"),
        op.status.as_str()
    )
}

/// Build a patch from `move` arguments.
pub fn parse_patch(
    start: Option<&str>,
    end: Option<&str>,
    work_center: Option<&str>,
) -> Result<OperationPatch> {
    let patch = OperationPatch {
        start: start.map(parse_time).transpose()?,
        end: end.map(parse_time).transpose()?,
        work_center_id: work_center.map(str::to_string),
        status: None,
    };
    if patch.is_empty() {
        anyhow::bail!("Nothing to change. Pass --start, --end, or --work-center.");
    }
    if let (Some(s), Some(e)) = (patch.start, patch.end) {
        if e <= s {
            anyhow::bail!("--end must be after --start.");
        }
    }
    Ok(patch)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| anyhow::anyhow!("invalid time \"{}\": {}", s, e))
}

/// Apply the change optimistically and write it through.
pub async fn move_operation(
    backend: &Backend,
    operation_id: &str,
    patch: OperationPatch,
    json_output: bool,
) -> Result<Operation> {
    let session = SchedulerSession::start(
        backend.session_config(true),
        backend.source.clone(),
        backend.credentials.clone(),
        None,
    )
    .await?;

    let outcome = session
        .commit(DragOutcome::Committed {
            operation_id: operation_id.to_string(),
            patch,
        })
        .await;
    session.shutdown().await;

    let op = match outcome {
        CommitOutcome::Confirmed(op) => op,
        CommitOutcome::Repaired { error } => {
            anyhow::bail!("Update rejected: {}. Local board re-read from server.", error)
        }
        CommitOutcome::Unrepaired { error } => {
            anyhow::bail!("Update failed: {}. Board could not be re-read.", error)
        }
        CommitOutcome::Skipped => anyhow::bail!(
            "Operation \"{}\" not found on board \"{}\".",
            operation_id,
            backend.board_id
        ),
        CommitOutcome::Abandoned => anyhow::bail!("Interrupted."),
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&op)?);
    } else {
        println!("Operation \"{}\" updated.", op.id);
        println!("{}", operation_line(&op));
    }
    Ok(op)
}

#[cfg(test)]
mod tests {
    use mfgsuite_schedule::{OperationStatus, WorkCenter};

    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn patch_from_arguments() {
        let patch = parse_patch(Some("2024-05-01T12:00:00+02:00"), None, Some("WC-40")).unwrap();
        assert_eq!(patch.start, Some(ts("2024-05-01T10:00:00Z")));
        assert_eq!(patch.end, None);
        assert_eq!(patch.work_center_id.as_deref(), Some("WC-40"));

        assert!(parse_patch(None, None, None).is_err());
        assert!(parse_patch(Some("noon"), None, None).is_err());
        assert!(parse_patch(Some("2024-05-01T12:00:00Z"), Some("2024-05-01T11:00:00Z"), None).is_err());
    }

    #[test]
    fn render_groups_by_work_center() {
        let op = |id: &str, wc: &str, start: &str| Operation {
            id: id.into(),
            work_order_no: "WO-1".into(),
            work_center_id: wc.into(),
            start: ts(start),
            end: ts(start) + chrono::TimeDelta::hours(1),
            status: OperationStatus::Planned,
            item: None,
            quantity: None,
            color: None,
        };
        let board = Board {
            id: "b".into(),
            name: Some("Line 1".into()),
            work_centers: vec![WorkCenter::new("WC-A", "Mill"), WorkCenter::new("WC-B", "Lathe")],
            operations: vec![
                op("OP-2", "WC-A", "2024-05-01T12:00:00Z"),
                op("OP-1", "WC-A", "2024-05-01T10:00:00Z"),
                op("OP-9", "WC-Z", "2024-05-01T10:00:00Z"),
            ],
        };

        let lines = render(&board);
        assert_eq!(lines[0], "Board Line 1 (2 work centers, 3 operations)");
        assert_eq!(lines[2], "WC-A Mill");
        assert!(lines[3].contains("OP-1"));
        assert!(lines[4].contains("OP-2"));
        assert_eq!(lines[6], "WC-B Lathe");
        assert_eq!(lines[7], "  -");
        assert!(lines.last().unwrap().ends_with("@ WC-Z"));
    }

    #[tokio::test]
    async fn move_on_demo_board() {
        let backend = Backend::demo(None);
        let patch = OperationPatch {
            work_center_id: Some("WC-40".into()),
            ..Default::default()
        };
        let op = move_operation(&backend, "OP-2001", patch, false).await.unwrap();
        assert_eq!(op.work_center_id, "WC-40");

        let bad = OperationPatch {
            work_center_id: Some("WC-99".into()),
            ..Default::default()
        };
        let err = move_operation(&backend, "OP-2001", bad.clone(), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rejected"), "{err}");
        assert!(move_operation(&backend, "OP-404", bad, false).await.is_err());
    }
}
