use super::LoyaltyStore;
use crate::{
    error::{LoyaltyError, LoyaltyResult},
    types::{Units, YearMonth},
    units::{checked_quantity, UnitRecord, UnitSource},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

impl LoyaltyStore {
    // ── Unit records ──────────────────────────────────────────────

    pub fn insert_unit_record(&self, rec: &UnitRecord, now: DateTime<Utc>) -> LoyaltyResult<()> {
        let quantity = rec.quantity.map(checked_quantity).transpose()?;
        self.conn.execute(
            "INSERT INTO unit_record (record_id, client_id, month, quantity, finalized, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rec.record_id,
                rec.client_id,
                rec.month,
                quantity,
                if rec.finalized { 1 } else { 0 },
                now,
            ],
        )?;
        Ok(())
    }

    pub fn unit_record(&self, record_id: &str) -> LoyaltyResult<Option<UnitRecord>> {
        let rec = self
            .conn
            .query_row(
                "SELECT record_id, client_id, month, quantity, finalized
                 FROM unit_record WHERE record_id = ?1",
                params![record_id],
                |row| {
                    Ok(UnitRecord {
                        record_id: row.get(0)?,
                        client_id: row.get(1)?,
                        month:     row.get(2)?,
                        quantity:  row.get::<_, Option<i64>>(3)?.map(|q| q as u64),
                        finalized: row.get::<_, i32>(4)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(rec)
    }

    /// Lock in a record's quantity. Returns the previous quantity.
    pub fn finalize_unit_record(&self, record_id: &str, quantity: Units) -> LoyaltyResult<Option<Units>> {
        let quantity = checked_quantity(quantity)?;
        let previous = self
            .unit_record(record_id)?
            .ok_or_else(|| LoyaltyError::Other(anyhow::anyhow!("unit record '{record_id}' not found")))?
            .quantity;
        self.conn.execute(
            "UPDATE unit_record SET quantity = ?2, finalized = 1 WHERE record_id = ?1",
            params![record_id, quantity],
        )?;
        Ok(previous)
    }
}

impl UnitSource for LoyaltyStore {
    fn month_records(&self, client_id: &str, month: YearMonth) -> LoyaltyResult<Vec<UnitRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_id, client_id, month, quantity, finalized
             FROM unit_record WHERE client_id = ?1 AND month = ?2
             ORDER BY submitted_at ASC, record_id ASC",
        )?;
        let rows = stmt.query_map(params![client_id, month], |row| {
            Ok(UnitRecord {
                record_id: row.get(0)?,
                client_id: row.get(1)?,
                month:     row.get(2)?,
                quantity:  row.get::<_, Option<i64>>(3)?.map(|q| q as u64),
                finalized: row.get::<_, i32>(4)? != 0,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn current_month_units(&self, client_id: &str) -> LoyaltyResult<Units> {
        let units: Option<i64> = self
            .conn
            .query_row(
                "SELECT current_month_units FROM client_loyalty WHERE client_id = ?1",
                params![client_id],
                |row| row.get(0),
            )
            .optional()?;
        units
            .map(|u| u as u64)
            .ok_or_else(|| LoyaltyError::ClientNotFound { client_id: client_id.to_string() })
    }
}
