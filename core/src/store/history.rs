use super::LoyaltyStore;
use crate::{
    error::LoyaltyResult,
    state::{MonthlyHistoryEntry, ProtectionHistoryEntry},
    types::{TierId, YearMonth},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

fn monthly_from_row(row: &Row<'_>) -> rusqlite::Result<MonthlyHistoryEntry> {
    Ok(MonthlyHistoryEntry {
        month:              row.get(0)?,
        tier:               row.get(1)?,
        units:              row.get::<_, i64>(2)? as u64,
        price_per_unit:     row.get(3)?,
        total_billed:       row.get(4)?,
        protection_awarded: row.get::<_, i32>(5)? != 0,
        protection_used:    row.get::<_, i32>(6)? != 0,
    })
}

fn protection_from_row(row: &Row<'_>) -> rusqlite::Result<ProtectionHistoryEntry> {
    Ok(ProtectionHistoryEntry {
        month:                row.get(0)?,
        tier:                 row.get(1)?,
        units_submitted:      row.get::<_, i64>(2)? as u64,
        tier_minimum:         row.get::<_, i64>(3)? as u64,
        points_earned:        row.get::<_, i64>(4)? as u64,
        points_balance_after: row.get::<_, i64>(5)? as u64,
        protection_awarded:   row.get::<_, i32>(6)? != 0,
        protection_used:      row.get::<_, i32>(7)? != 0,
    })
}

impl LoyaltyStore {
    // ── Monthly history ───────────────────────────────────────────

    pub fn append_monthly_history(&self, client_id: &str, e: &MonthlyHistoryEntry) -> LoyaltyResult<()> {
        self.conn.execute(
            "INSERT INTO monthly_history (
                client_id, month, tier, units, price_per_unit, total_billed,
                protection_awarded, protection_used
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                client_id,
                e.month,
                e.tier,
                e.units as i64,
                e.price_per_unit,
                e.total_billed,
                if e.protection_awarded { 1 } else { 0 },
                if e.protection_used { 1 } else { 0 },
            ],
        )?;
        Ok(())
    }

    /// Latest `limit` entries, oldest first.
    pub fn monthly_history(&self, client_id: &str, limit: usize) -> LoyaltyResult<Vec<MonthlyHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT month, tier, units, price_per_unit, total_billed,
                    protection_awarded, protection_used
             FROM monthly_history WHERE client_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let mut rows = stmt
            .query_map(params![client_id, limit as i64], monthly_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    pub fn monthly_history_for(
        &self,
        client_id: &str,
        month: YearMonth,
    ) -> LoyaltyResult<Option<MonthlyHistoryEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT month, tier, units, price_per_unit, total_billed,
                        protection_awarded, protection_used
                 FROM monthly_history WHERE client_id = ?1 AND month = ?2
                 ORDER BY id DESC LIMIT 1",
                params![client_id, month],
                monthly_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn monthly_history_count(&self, client_id: &str) -> LoyaltyResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM monthly_history WHERE client_id = ?1",
            params![client_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Protection history ────────────────────────────────────────

    pub fn append_protection_history(&self, client_id: &str, e: &ProtectionHistoryEntry) -> LoyaltyResult<()> {
        self.conn.execute(
            "INSERT INTO protection_history (
                client_id, month, tier, units_submitted, tier_minimum, points_earned,
                points_balance_after, protection_awarded, protection_used
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                client_id,
                e.month,
                e.tier,
                e.units_submitted as i64,
                e.tier_minimum as i64,
                e.points_earned as i64,
                e.points_balance_after as i64,
                if e.protection_awarded { 1 } else { 0 },
                if e.protection_used { 1 } else { 0 },
            ],
        )?;
        Ok(())
    }

    /// Latest `limit` entries, oldest first.
    pub fn protection_history(&self, client_id: &str, limit: usize) -> LoyaltyResult<Vec<ProtectionHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT month, tier, units_submitted, tier_minimum, points_earned,
                    points_balance_after, protection_awarded, protection_used
             FROM protection_history WHERE client_id = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let mut rows = stmt
            .query_map(params![client_id, limit as i64], protection_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    // ── Evaluation marker ─────────────────────────────────────────

    pub fn evaluation_marker_exists(&self, client_id: &str, month: YearMonth) -> LoyaltyResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM evaluation_marker WHERE client_id = ?1 AND month = ?2",
                params![client_id, month],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Fails on a second insert for the same (client, month), which rolls
    /// back the surrounding evaluation.
    pub fn insert_evaluation_marker(
        &self,
        client_id: &str,
        month: YearMonth,
        final_tier: TierId,
        at: DateTime<Utc>,
    ) -> LoyaltyResult<()> {
        self.conn.execute(
            "INSERT INTO evaluation_marker (client_id, month, final_tier, evaluated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![client_id, month, final_tier, at],
        )?;
        Ok(())
    }
}
