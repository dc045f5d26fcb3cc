use std::collections::VecDeque;

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Row, Transaction};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, parse_status, status_reason, to_i64},
};
use crate::models::{
    Action, ActionKind, Category, HistoryEntry, InterventionType, Priority, SupervisorState,
    SupervisorStatus,
};

fn row_to_history_entry(row: &Row) -> Result<HistoryEntry> {
    let timestamp: String = row.get("timestamp")?;
    let category: String = row.get("category")?;
    let kind: String = row.get("action_kind")?;
    let priority: String = row.get("priority")?;
    let intervention_type: String = row.get("intervention_type")?;

    Ok(HistoryEntry {
        timestamp: parse_datetime(&timestamp, "decision_history.timestamp")?,
        category: Category::parse(&category)?,
        action: Action {
            kind: ActionKind::parse(&kind)?,
            priority: Priority::parse(&priority)?,
            wait_seconds: row.get("wait_seconds")?,
            intervention_type: InterventionType::parse(&intervention_type)?,
        },
        fingerprint: row.get("fingerprint")?,
        delivered: row.get("delivered")?,
    })
}

fn write_history(tx: &Transaction<'_>, history: &VecDeque<HistoryEntry>) -> Result<()> {
    tx.execute("DELETE FROM decision_history", [])?;
    let mut stmt = tx.prepare(
        "INSERT INTO decision_history (
            position, timestamp, category, action_kind, priority,
            wait_seconds, intervention_type, fingerprint, delivered
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for (position, entry) in history.iter().enumerate() {
        stmt.execute(params![
            to_i64(position)?,
            entry.timestamp.to_rfc3339(),
            entry.category.as_str(),
            entry.action.kind.as_str(),
            entry.action.priority.as_str(),
            entry.action.wait_seconds,
            entry.action.intervention_type.as_str(),
            entry.fingerprint,
            entry.delivered,
        ])?;
    }
    Ok(())
}

fn write_markers(tx: &Transaction<'_>, markers: &VecDeque<String>) -> Result<()> {
    tx.execute("DELETE FROM completed_task_markers", [])?;
    let mut stmt = tx.prepare(
        "INSERT OR IGNORE INTO completed_task_markers (position, fingerprint) VALUES (?1, ?2)",
    )?;
    for (position, fingerprint) in markers.iter().enumerate() {
        stmt.execute(params![to_i64(position)?, fingerprint])?;
    }
    Ok(())
}

impl Database {
    /// The last checkpoint, or `None` on a fresh database.
    pub async fn load_state(&self) -> Result<Option<SupervisorState>> {
        self.execute(|conn| {
            let scalar = conn
                .query_row(
                    "SELECT run_id, project_context, last_instruction_at, last_instruction,
                            status, status_reason, updated_at
                     FROM supervisor_state WHERE id = 1",
                    [],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, Option<String>>(5)?,
                            row.get::<_, String>(6)?,
                        ))
                    },
                )
                .optional()
                .context("failed to read supervisor_state")?;

            let Some((run_id, project_context, last_at, last_instruction, status, reason, updated_at)) =
                scalar
            else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT timestamp, category, action_kind, priority, wait_seconds,
                        intervention_type, fingerprint, delivered
                 FROM decision_history ORDER BY position ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut decision_history = VecDeque::new();
            while let Some(row) = rows.next()? {
                decision_history.push_back(row_to_history_entry(row)?);
            }

            let mut stmt = conn.prepare(
                "SELECT fingerprint FROM completed_task_markers ORDER BY position ASC",
            )?;
            let completed_task_markers = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<VecDeque<_>, _>>()?;

            Ok(Some(SupervisorState {
                run_id,
                project_context,
                decision_history,
                completed_task_markers,
                last_instruction_at: parse_optional_datetime(last_at, "last_instruction_at")?,
                last_instruction,
                status: parse_status(&status, reason)?,
                updated_at: parse_datetime(&updated_at, "updated_at")?,
            }))
        })
        .await
    }

    /// Replace the checkpoint with `state` in a single transaction.
    pub async fn save_state(&self, state: &SupervisorState) -> Result<()> {
        let record = state.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO supervisor_state (
                    id, run_id, project_context, last_instruction_at, last_instruction,
                    status, status_reason, updated_at
                 ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    run_id = excluded.run_id,
                    project_context = excluded.project_context,
                    last_instruction_at = excluded.last_instruction_at,
                    last_instruction = excluded.last_instruction,
                    status = excluded.status,
                    status_reason = excluded.status_reason,
                    updated_at = excluded.updated_at",
                params![
                    record.run_id,
                    record.project_context,
                    record.last_instruction_at.map(|dt| dt.to_rfc3339()),
                    record.last_instruction,
                    record.status.as_str(),
                    status_reason(&record.status),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .context("failed to write supervisor_state")?;

            write_history(&tx, &record.decision_history)?;
            write_markers(&tx, &record.completed_task_markers)?;

            tx.commit().context("failed to commit state checkpoint")?;
            Ok(())
        })
        .await
    }

    /// Clears a persisted Halted status. Returns whether one was set.
    pub async fn clear_halt(&self) -> Result<bool> {
        self.execute(|conn| {
            let changed = conn.execute(
                "UPDATE supervisor_state
                 SET status = ?1, status_reason = NULL, updated_at = ?2
                 WHERE id = 1 AND status = 'Halted'",
                params![
                    SupervisorStatus::Stopped.as_str(),
                    chrono::Utc::now().to_rfc3339()
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn open(dir: &tempfile::TempDir) -> Database {
        Database::new(dir.path().join("state.sqlite3")).unwrap()
    }

    fn entry(category: Category, kind: ActionKind, fingerprint: &str) -> HistoryEntry {
        HistoryEntry {
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            category,
            action: Action {
                kind,
                priority: Priority::High,
                wait_seconds: 2.0,
                intervention_type: InterventionType::Continue,
            },
            fingerprint: Some(fingerprint.into()),
            delivered: kind == ActionKind::Intervene,
        }
    }

    #[tokio::test]
    async fn fresh_database_has_no_state() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open(&dir).load_state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn checkpoint_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = SupervisorState::new("REST API");
        state.record_decision(entry(Category::Complete, ActionKind::Intervene, "aa"), 10);
        state.record_decision(entry(Category::Processing, ActionKind::Wait, "bb"), 10);
        state.mark_completed("aa", 10);
        state.note_instruction(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 1).unwrap(),
            "Continue with the next endpoint",
        );

        {
            let db = open(&dir);
            db.save_state(&state).await.unwrap();
        }

        let loaded = open(&dir).load_state().await.unwrap().unwrap();
        assert_eq!(loaded.run_id, state.run_id);
        assert_eq!(loaded.project_context, "REST API");
        assert_eq!(loaded.decision_history, state.decision_history);
        assert_eq!(loaded.completed_task_markers, state.completed_task_markers);
        assert_eq!(loaded.last_instruction_at, state.last_instruction_at);
        assert_eq!(loaded.last_instruction, state.last_instruction);
        assert_eq!(loaded.status, SupervisorStatus::Running);
    }

    #[tokio::test]
    async fn later_snapshot_replaces_history() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);
        let mut state = SupervisorState::new("");
        for i in 0..3 {
            state.record_decision(entry(Category::Routine, ActionKind::Wait, &i.to_string()), 2);
            db.save_state(&state).await.unwrap();
        }
        let loaded = db.load_state().await.unwrap().unwrap();
        assert_eq!(loaded.decision_history.len(), 2);
        assert_eq!(loaded.decision_history[0].fingerprint.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn halt_is_persisted_and_clearable() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(&dir);
        let mut state = SupervisorState::new("");
        state.halt("5 consecutive capture failures");
        db.save_state(&state).await.unwrap();

        let loaded = db.load_state().await.unwrap().unwrap();
        assert_eq!(
            loaded.status,
            SupervisorStatus::Halted("5 consecutive capture failures".into())
        );

        assert!(db.clear_halt().await.unwrap());
        assert!(!db.clear_halt().await.unwrap());
        let loaded = db.load_state().await.unwrap().unwrap();
        assert_eq!(loaded.status, SupervisorStatus::Stopped);
    }
}
