use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;
use crate::models::SessionSnapshot;

// ═══════════════════════════════════════════
// Session snapshot
// ═══════════════════════════════════════════

/// Replace the stored session snapshot in one transaction.
pub fn save_snapshot(
    conn: &mut Connection,
    snapshot: &SessionSnapshot,
) -> Result<DateTime<Utc>, DatabaseError> {
    let json = serde_json::to_string(snapshot)?;
    let saved_at = Utc::now();

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT OR REPLACE INTO session_state (id, snapshot, saved_at) VALUES (1, ?1, ?2)",
        params![json, saved_at.to_rfc3339()],
    )?;
    tx.commit()?;

    tracing::debug!(
        assessments = snapshot.assessments.len(),
        bytes = json.len(),
        "Session snapshot saved"
    );
    Ok(saved_at)
}

/// Load the stored snapshot, or `None` on first run.
pub fn load_snapshot(conn: &Connection) -> Result<Option<SessionSnapshot>, DatabaseError> {
    let json: Option<String> = conn
        .query_row("SELECT snapshot FROM session_state WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    match json {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Remove the stored snapshot.
pub fn clear_snapshot(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM session_state WHERE id = 1", [])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::{open_database, open_memory_database};
    use crate::models::{Assessment, View};

    fn snapshot(names: &[&str]) -> SessionSnapshot {
        let assessments: Vec<Assessment> = names
            .iter()
            .map(|n| Assessment::new(*n, None, Utc::now()))
            .collect();
        SessionSnapshot {
            active_assessment_id: assessments.first().map(|a| a.id),
            assessments,
            view: View::Assessment,
        }
    }

    #[test]
    fn empty_database_has_no_snapshot() {
        let conn = open_memory_database().unwrap();
        assert!(load_snapshot(&conn).unwrap().is_none());
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let mut conn = open_memory_database().unwrap();
        save_snapshot(&mut conn, &snapshot(&["A"])).unwrap();
        let second = snapshot(&["B", "C"]);
        save_snapshot(&mut conn, &second).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM session_state", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(load_snapshot(&conn).unwrap(), Some(second));

        clear_snapshot(&conn).unwrap();
        assert!(load_snapshot(&conn).unwrap().is_none());
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("impactlens.db");
        let saved = snapshot(&["Skills"]);
        {
            let mut conn = open_database(&path).unwrap();
            save_snapshot(&mut conn, &saved).unwrap();
        }
        let conn = open_database(&path).unwrap();
        assert_eq!(load_snapshot(&conn).unwrap(), Some(saved));
    }

    #[test]
    fn corrupt_snapshot_is_a_serialization_error() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO session_state (id, snapshot, saved_at) VALUES (1, 'not json', 'x')",
            [],
        )
        .unwrap();
        assert!(matches!(
            load_snapshot(&conn),
            Err(DatabaseError::Serialization(_))
        ));
    }
}
