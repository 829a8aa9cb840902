use super::LoyaltyStore;
use crate::{command::OverrideAuditEntry, error::LoyaltyResult};
use chrono::{DateTime, Utc};
use rusqlite::params;

impl LoyaltyStore {
    // ── Override audit ────────────────────────────────────────────

    pub fn append_override_audit(&self, entry: &OverrideAuditEntry) -> LoyaltyResult<()> {
        self.conn.execute(
            "INSERT INTO override_audit (
                audit_id, client_id, kind, command, reason, actor, clamped, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.audit_id,
                entry.client_id,
                entry.command.kind(),
                serde_json::to_string(&entry.command)?,
                entry.reason,
                entry.actor,
                if entry.clamped { 1 } else { 0 },
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    /// Latest `limit` overrides for a client, oldest first.
    pub fn override_audit(&self, client_id: &str, limit: usize) -> LoyaltyResult<Vec<OverrideAuditEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT audit_id, client_id, command, reason, actor, clamped, created_at
             FROM override_audit WHERE client_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let raw = stmt
            .query_map(params![client_id, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i32>(5)? != 0,
                    row.get::<_, DateTime<Utc>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = raw
            .into_iter()
            .map(|(audit_id, client_id, command, reason, actor, clamped, created_at)| -> LoyaltyResult<OverrideAuditEntry> {
                Ok(OverrideAuditEntry {
                    audit_id,
                    client_id,
                    command: serde_json::from_str(&command)?,
                    reason,
                    actor,
                    clamped,
                    created_at,
                })
            })
            .collect::<LoyaltyResult<Vec<_>>>()?;
        entries.reverse();
        Ok(entries)
    }
}
