// Copyright (c) 2024 The Botho Foundation

//! SQLite database for the local ledger: account sequence numbers,
//! transaction receipts and the committed hub state.

use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::sync::{Arc, Mutex};

use crate::ledger::{AccountAddress, TxHash, TxReceipt};

/// Hub state as last committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredState {
    /// JSON encoding of the hub state
    pub state_json: String,
    pub block_height: u64,
}

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database.
    pub fn open(path: &str) -> Result<Self, String> {
        let conn =
            Connection::open(path).map_err(|e| format!("Failed to open database: {}", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, String> {
        let conn = Connection::open_in_memory()
            .map_err(|e| format!("Failed to open in-memory database: {}", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run database migrations.
    pub fn migrate(&self) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| format!("Lock error: {}", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                address TEXT PRIMARY KEY,
                sequence_number INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS transactions (
                hash TEXT PRIMARY KEY,
                sender TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                function TEXT NOT NULL,
                version INTEGER NOT NULL UNIQUE,
                block_height INTEGER NOT NULL,
                success INTEGER NOT NULL,
                vm_status TEXT NOT NULL,
                gas_used INTEGER NOT NULL,
                events TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tx_sender ON transactions(sender, sequence_number);

            CREATE TABLE IF NOT EXISTS hub_state (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                state TEXT NOT NULL,
                block_height INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| format!("Migration failed: {}", e))?;

        Ok(())
    }

    /// Next sequence number for an account (0 for unknown accounts).
    pub fn sequence_number(&self, address: &AccountAddress) -> Result<u64, String> {
        let conn = self.conn.lock().map_err(|e| format!("Lock error: {}", e))?;

        let seq: Option<i64> = conn
            .query_row(
                "SELECT sequence_number FROM accounts WHERE address = ?1",
                params![address.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| format!("Query failed: {}", e))?;

        Ok(seq.unwrap_or(0) as u64)
    }

    /// Number of recorded transactions.
    pub fn transaction_count(&self) -> Result<u64, String> {
        let conn = self.conn.lock().map_err(|e| format!("Lock error: {}", e))?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))
            .map_err(|e| format!("Query failed: {}", e))?;

        Ok(count as u64)
    }

    /// Record an executed transaction in one database transaction: the
    /// receipt, the sender's bumped sequence number and, when the execution
    /// committed, the new hub state.
    pub fn commit_transaction(
        &self,
        receipt: &TxReceipt,
        state: Option<&StoredState>,
    ) -> Result<(), String> {
        let mut conn = self.conn.lock().map_err(|e| format!("Lock error: {}", e))?;
        let events = serde_json::to_string(&receipt.events)
            .map_err(|e| format!("Failed to encode events: {}", e))?;

        let tx = conn
            .transaction()
            .map_err(|e| format!("Begin failed: {}", e))?;

        tx.execute(
            r#"
            INSERT INTO transactions (
                hash, sender, sequence_number, function, version, block_height,
                success, vm_status, gas_used, events, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                receipt.hash.as_str(),
                receipt.sender.as_str(),
                receipt.sequence_number as i64,
                receipt.function,
                receipt.version as i64,
                receipt.block_height as i64,
                receipt.success,
                receipt.vm_status,
                receipt.gas_used as i64,
                events,
                receipt.timestamp.timestamp(),
            ],
        )
        .map_err(|e| format!("Insert failed: {}", e))?;

        tx.execute(
            r#"
            INSERT INTO accounts (address, sequence_number) VALUES (?1, ?2)
            ON CONFLICT(address) DO UPDATE SET sequence_number = excluded.sequence_number
            "#,
            params![
                receipt.sender.as_str(),
                (receipt.sequence_number + 1) as i64
            ],
        )
        .map_err(|e| format!("Update failed: {}", e))?;

        if let Some(state) = state {
            tx.execute(
                r#"
                INSERT INTO hub_state (id, state, block_height, updated_at) VALUES (0, ?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    state = excluded.state,
                    block_height = excluded.block_height,
                    updated_at = excluded.updated_at
                "#,
                params![
                    state.state_json,
                    state.block_height as i64,
                    Utc::now().timestamp()
                ],
            )
            .map_err(|e| format!("Update failed: {}", e))?;
        }

        tx.commit().map_err(|e| format!("Commit failed: {}", e))?;
        Ok(())
    }

    /// Get a receipt by transaction hash.
    pub fn get_receipt(&self, hash: &TxHash) -> Result<Option<TxReceipt>, String> {
        let conn = self.conn.lock().map_err(|e| format!("Lock error: {}", e))?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT hash, sender, sequence_number, function, version, block_height,
                       success, vm_status, gas_used, events, created_at
                FROM transactions WHERE hash = ?1
                "#,
            )
            .map_err(|e| format!("Prepare failed: {}", e))?;

        let receipt = stmt
            .query_row(params![hash.as_str()], Self::row_to_receipt)
            .optional()
            .map_err(|e| format!("Query failed: {}", e))?;

        Ok(receipt)
    }

    /// Load the last committed hub state.
    pub fn load_state(&self) -> Result<Option<StoredState>, String> {
        let conn = self.conn.lock().map_err(|e| format!("Lock error: {}", e))?;

        let state = conn
            .query_row(
                "SELECT state, block_height FROM hub_state WHERE id = 0",
                [],
                |row| {
                    let block_height: i64 = row.get(1)?;
                    Ok(StoredState {
                        state_json: row.get(0)?,
                        block_height: block_height as u64,
                    })
                },
            )
            .optional()
            .map_err(|e| format!("Query failed: {}", e))?;

        Ok(state)
    }

    /// Convert a database row to a receipt.
    fn row_to_receipt(row: &rusqlite::Row<'_>) -> SqliteResult<TxReceipt> {
        let hash: String = row.get(0)?;
        let sender: String = row.get(1)?;
        let sequence_number: i64 = row.get(2)?;
        let function: String = row.get(3)?;
        let version: i64 = row.get(4)?;
        let block_height: i64 = row.get(5)?;
        let success: bool = row.get(6)?;
        let vm_status: String = row.get(7)?;
        let gas_used: i64 = row.get(8)?;
        let events_json: String = row.get(9)?;
        let created_at: i64 = row.get(10)?;

        let events = serde_json::from_str(&events_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let sender = AccountAddress::parse(&sender).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let timestamp = Utc
            .timestamp_opt(created_at, 0)
            .single()
            .unwrap_or_default();

        Ok(TxReceipt {
            hash: TxHash::new(hash),
            sender,
            sequence_number: sequence_number as u64,
            function,
            version: version as u64,
            block_height: block_height as u64,
            success,
            vm_status,
            gas_used: gas_used as u64,
            events,
            timestamp,
        })
    }
}
