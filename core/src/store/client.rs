use super::LoyaltyStore;
use crate::{
    error::{LoyaltyError, LoyaltyResult},
    protection_ledger::ProtectionLedger,
    state::{CashbackAward, ClientLoyaltyState},
    types::{ClientId, TierId, Units},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const CLIENT_COLUMNS: &str = "client_id, current_tier, previous_tier, tier_effective_date,
    protection_type, protection_months, protection_points, cashback_balance,
    current_month_units, lifetime_units_billed, meets_lifetime_minimum,
    enrolled_date, counter_reset_at, last_evaluated_month";

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<ClientLoyaltyState> {
    Ok(ClientLoyaltyState {
        client_id:           row.get(0)?,
        current_tier:        row.get(1)?,
        previous_tier:       row.get(2)?,
        tier_effective_date: row.get(3)?,
        ledger: ProtectionLedger {
            protection_type: row.get(4)?,
            months:          row.get::<_, i64>(5)? as u32,
            points:          row.get::<_, i64>(6)? as u64,
        },
        cashback_balance:       row.get(7)?,
        cashback_awards:        Vec::new(), // Filled from cashback_award
        current_month_units:    row.get::<_, i64>(8)? as u64,
        lifetime_units_billed:  row.get::<_, i64>(9)? as u64,
        meets_lifetime_minimum: row.get::<_, i32>(10)? != 0,
        enrolled_date:          row.get(11)?,
        counter_reset_at:       row.get(12)?,
        last_evaluated_month:   row.get(13)?,
    })
}

impl LoyaltyStore {
    // ── Client state ──────────────────────────────────────────────

    pub fn insert_client(&self, state: &ClientLoyaltyState, now: DateTime<Utc>) -> LoyaltyResult<()> {
        if self.client_exists(&state.client_id)? {
            return Err(LoyaltyError::ClientExists { client_id: state.client_id.clone() });
        }
        self.conn.execute(
            "INSERT INTO client_loyalty (client_id, current_tier, created_at) VALUES (?1, ?2, ?3)",
            params![state.client_id, state.current_tier, now],
        )?;
        self.save_client(state)
    }

    pub fn client_exists(&self, client_id: &str) -> LoyaltyResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM client_loyalty WHERE client_id = ?1",
                params![client_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn load_client(&self, client_id: &str) -> LoyaltyResult<Option<ClientLoyaltyState>> {
        let sql = format!("SELECT {CLIENT_COLUMNS} FROM client_loyalty WHERE client_id = ?1");
        let state = self
            .conn
            .query_row(&sql, params![client_id], client_from_row)
            .optional()?;

        match state {
            Some(mut s) => {
                s.cashback_awards = self.cashback_awards(client_id)?;
                Ok(Some(s))
            }
            None => Ok(None),
        }
    }

    pub fn require_client(&self, client_id: &str) -> LoyaltyResult<ClientLoyaltyState> {
        self.load_client(client_id)?
            .ok_or_else(|| LoyaltyError::ClientNotFound { client_id: client_id.to_string() })
    }

    /// Write every mutable column. Cashback awards are append-only and
    /// written separately through `insert_cashback_award`.
    pub fn save_client(&self, s: &ClientLoyaltyState) -> LoyaltyResult<()> {
        let updated = self.conn.execute(
            "UPDATE client_loyalty SET
                current_tier = ?2, previous_tier = ?3, tier_effective_date = ?4,
                protection_type = ?5, protection_months = ?6, protection_points = ?7,
                cashback_balance = ?8, current_month_units = ?9,
                lifetime_units_billed = ?10, meets_lifetime_minimum = ?11,
                enrolled_date = ?12, counter_reset_at = ?13, last_evaluated_month = ?14
             WHERE client_id = ?1",
            params![
                s.client_id,
                s.current_tier,
                s.previous_tier,
                s.tier_effective_date,
                s.ledger.protection_type,
                s.ledger.months as i64,
                s.ledger.points as i64,
                s.cashback_balance,
                s.current_month_units as i64,
                s.lifetime_units_billed as i64,
                if s.meets_lifetime_minimum { 1 } else { 0 },
                s.enrolled_date,
                s.counter_reset_at,
                s.last_evaluated_month,
            ],
        )?;
        if updated == 0 {
            return Err(LoyaltyError::ClientNotFound { client_id: s.client_id.clone() });
        }
        Ok(())
    }

    pub fn enrolled_client_ids(&self) -> LoyaltyResult<Vec<ClientId>> {
        let mut stmt = self.conn.prepare(
            "SELECT client_id FROM client_loyalty
             WHERE enrolled_date IS NOT NULL ORDER BY client_id",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn tier_counts(&self) -> LoyaltyResult<Vec<(TierId, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT current_tier, COUNT(*) FROM client_loyalty
             WHERE enrolled_date IS NOT NULL GROUP BY current_tier",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, TierId>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut counts = rows.collect::<Result<Vec<(TierId, i64)>, _>>()?;
        counts.sort_by_key(|(tier, _)| *tier);
        Ok(counts)
    }

    // ── Month rollover and rollout ────────────────────────────────

    /// Zero the in-progress counter for every enrolled client.
    pub fn reset_enrolled_counters(&self, now: DateTime<Utc>) -> LoyaltyResult<usize> {
        let updated = self.conn.execute(
            "UPDATE client_loyalty SET current_month_units = 0, counter_reset_at = ?1
             WHERE enrolled_date IS NOT NULL",
            params![now],
        )?;
        Ok(updated)
    }

    /// Enroll every client that has never been enrolled. Returns the ids
    /// that were enrolled by this call.
    pub fn enroll_unenrolled(
        &self,
        tier: TierId,
        protection_type: Option<TierId>,
        date: NaiveDate,
    ) -> LoyaltyResult<Vec<ClientId>> {
        let mut stmt = self.conn.prepare(
            "SELECT client_id FROM client_loyalty
             WHERE enrolled_date IS NULL ORDER BY client_id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<ClientId>, _>>()?;

        let effective = date.and_time(NaiveTime::MIN).and_utc();
        self.conn.execute(
            "UPDATE client_loyalty SET
                enrolled_date = ?1, current_tier = ?2, tier_effective_date = ?3,
                protection_type = ?4, protection_months = 0, protection_points = 0
             WHERE enrolled_date IS NULL",
            params![date, tier, effective, protection_type],
        )?;
        Ok(ids)
    }

    // ── Unit counter ──────────────────────────────────────────────

    /// Add (or with a negative delta, remove) units from the in-progress
    /// counter. The counter never drops below zero.
    pub fn adjust_current_month_units(&self, client_id: &str, delta: i64) -> LoyaltyResult<Units> {
        let updated = self.conn.execute(
            "UPDATE client_loyalty
             SET current_month_units = MAX(0, current_month_units + ?2)
             WHERE client_id = ?1",
            params![client_id, delta],
        )?;
        if updated == 0 {
            return Err(LoyaltyError::ClientNotFound { client_id: client_id.to_string() });
        }
        let units: i64 = self.conn.query_row(
            "SELECT current_month_units FROM client_loyalty WHERE client_id = ?1",
            params![client_id],
            |row| row.get(0),
        )?;
        Ok(units as u64)
    }

    // ── Cashback ──────────────────────────────────────────────────

    pub fn insert_cashback_award(&self, client_id: &str, award: &CashbackAward) -> LoyaltyResult<()> {
        self.conn.execute(
            "INSERT INTO cashback_award (award_id, client_id, from_tier, to_tier, awarded_at, amount)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                award.award_id,
                client_id,
                award.from_tier,
                award.to_tier,
                award.awarded_at,
                award.amount,
            ],
        )?;
        Ok(())
    }

    pub fn cashback_awards(&self, client_id: &str) -> LoyaltyResult<Vec<CashbackAward>> {
        let mut stmt = self.conn.prepare(
            "SELECT award_id, from_tier, to_tier, awarded_at, amount
             FROM cashback_award WHERE client_id = ?1
             ORDER BY awarded_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![client_id], |row| {
            Ok(CashbackAward {
                award_id:   row.get(0)?,
                from_tier:  row.get(1)?,
                to_tier:    row.get(2)?,
                awarded_at: row.get(3)?,
                amount:     row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}
