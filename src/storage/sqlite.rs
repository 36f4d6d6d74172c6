//! SQLite-backed store (sqlx).
//!
//! Timestamps are stored as RFC 3339 text. State merges are a single
//! upsert whose `COALESCE` keeps any column the patch leaves out. Placing
//! a decision and archiving one each run in a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{ArchiveResult, DecisionStore, StoreError};
use crate::types::{
    ArchivedDecision, Category, DecisionKind, FixtureId, MatchState, MatchStatePatch, Outcome,
    PendingDecision,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS match_states (
        fixture_id                 INTEGER PRIMARY KEY,
        checkpoint1_evaluated      INTEGER NOT NULL DEFAULT 0,
        checkpoint1_score          TEXT,
        checkpoint1_category       TEXT,
        checkpoint1_outcome_known  INTEGER NOT NULL DEFAULT 0,
        checkpoint1_won            INTEGER,
        checkpoint2_evaluated      INTEGER NOT NULL DEFAULT 0,
        checkpoint2_score          TEXT,
        last_update                TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pending_decisions (
        fixture_id         INTEGER NOT NULL,
        kind               TEXT NOT NULL,
        category           TEXT,
        match_name         TEXT NOT NULL,
        league_name        TEXT NOT NULL,
        league_id          INTEGER NOT NULL,
        checkpoint1_score  TEXT,
        checkpoint2_score  TEXT,
        placed_at          TEXT NOT NULL,
        PRIMARY KEY (fixture_id, kind)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS archived_decisions (
        id                 TEXT PRIMARY KEY,
        fixture_id         INTEGER NOT NULL,
        kind               TEXT NOT NULL,
        category           TEXT,
        match_name         TEXT NOT NULL,
        league_name        TEXT NOT NULL,
        league_id          INTEGER NOT NULL,
        checkpoint1_score  TEXT,
        checkpoint2_score  TEXT,
        placed_at          TEXT NOT NULL,
        outcome            TEXT NOT NULL,
        resolved_at        TEXT NOT NULL,
        UNIQUE (fixture_id, kind)
    )
    "#,
];

const DECISION_COLUMNS: &str = "fixture_id, kind, category, match_name, league_name, league_id, \
     checkpoint1_score, checkpoint2_score, placed_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    ///
    /// A single connection is used: there is one driver, and `sqlite::memory:`
    /// databases are per-connection.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!(url, "SQLite store ready");
        Ok(Self { pool })
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn parse_time(fixture_id: FixtureId, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            fixture_id,
            message: format!("bad timestamp {raw}: {e}"),
        })
}

fn decode_state(fixture_id: FixtureId, row: &SqliteRow) -> Result<MatchState, StoreError> {
    // An unknown category tag is dropped rather than failing the read; the
    // pending decision keeps the raw tag for the resolver to report.
    let category = row
        .try_get::<Option<String>, _>("checkpoint1_category")?
        .and_then(|raw| match Category::from_str(&raw) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(fixture_id, error = %e, "Ignoring unknown checkpoint-1 category");
                None
            }
        });

    Ok(MatchState {
        checkpoint1_evaluated: row.try_get("checkpoint1_evaluated")?,
        checkpoint1_score: row.try_get("checkpoint1_score")?,
        checkpoint1_category: category,
        checkpoint1_outcome_known: row.try_get("checkpoint1_outcome_known")?,
        checkpoint1_won: row.try_get("checkpoint1_won")?,
        checkpoint2_evaluated: row.try_get("checkpoint2_evaluated")?,
        checkpoint2_score: row.try_get("checkpoint2_score")?,
        last_update: parse_time(fixture_id, &row.try_get::<String, _>("last_update")?)?,
    })
}

fn decode_decision(row: &SqliteRow) -> Result<PendingDecision, StoreError> {
    let fixture_id: FixtureId = row.try_get("fixture_id")?;
    let kind_raw: String = row.try_get("kind")?;
    let kind = DecisionKind::from_str(&kind_raw)
        .map_err(|message| StoreError::Corrupt { fixture_id, message })?;

    Ok(PendingDecision {
        fixture_id,
        kind,
        category: row.try_get("category")?,
        match_name: row.try_get("match_name")?,
        league_name: row.try_get("league_name")?,
        league_id: row.try_get("league_id")?,
        checkpoint1_score: row.try_get("checkpoint1_score")?,
        checkpoint2_score: row.try_get("checkpoint2_score")?,
        placed_at: parse_time(fixture_id, &row.try_get::<String, _>("placed_at")?)?,
    })
}

fn decode_archived(row: &SqliteRow) -> Result<ArchivedDecision, StoreError> {
    let decision = decode_decision(row)?;
    let fixture_id = decision.fixture_id;
    let outcome_raw: String = row.try_get("outcome")?;
    let outcome = Outcome::from_str(&outcome_raw)
        .map_err(|message| StoreError::Corrupt { fixture_id, message })?;

    Ok(ArchivedDecision {
        id: row.try_get("id")?,
        decision,
        outcome,
        resolved_at: parse_time(fixture_id, &row.try_get::<String, _>("resolved_at")?)?,
    })
}

// ---------------------------------------------------------------------------
// Writes shared by single statements and transactions
// ---------------------------------------------------------------------------

async fn upsert_state(
    conn: &mut SqliteConnection,
    fixture_id: FixtureId,
    patch: &MatchStatePatch,
) -> Result<(), StoreError> {
    let inserted_at = patch.last_update.unwrap_or_else(Utc::now).to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO match_states (
            fixture_id, checkpoint1_evaluated, checkpoint1_score, checkpoint1_category,
            checkpoint1_outcome_known, checkpoint1_won, checkpoint2_evaluated,
            checkpoint2_score, last_update
        )
        VALUES (?1, COALESCE(?2, 0), ?3, ?4, COALESCE(?5, 0), ?6, COALESCE(?7, 0), ?8, COALESCE(?9, ?10))
        ON CONFLICT (fixture_id) DO UPDATE SET
            checkpoint1_evaluated     = COALESCE(?2, checkpoint1_evaluated),
            checkpoint1_score         = COALESCE(?3, checkpoint1_score),
            checkpoint1_category      = COALESCE(?4, checkpoint1_category),
            checkpoint1_outcome_known = COALESCE(?5, checkpoint1_outcome_known),
            checkpoint1_won           = COALESCE(?6, checkpoint1_won),
            checkpoint2_evaluated     = COALESCE(?7, checkpoint2_evaluated),
            checkpoint2_score         = COALESCE(?8, checkpoint2_score),
            last_update               = COALESCE(?9, last_update)
        "#,
    )
    .bind(fixture_id)
    .bind(patch.checkpoint1_evaluated)
    .bind(patch.checkpoint1_score.as_deref())
    .bind(patch.checkpoint1_category.map(|c| c.as_str()))
    .bind(patch.checkpoint1_outcome_known)
    .bind(patch.checkpoint1_won)
    .bind(patch.checkpoint2_evaluated)
    .bind(patch.checkpoint2_score.as_deref())
    .bind(patch.last_update.map(|t| t.to_rfc3339()))
    .bind(inserted_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_pending(conn: &mut SqliteConnection, decision: &PendingDecision) -> Result<(), StoreError> {
    sqlx::query(&format!(
        r#"
        INSERT INTO pending_decisions ({DECISION_COLUMNS})
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (fixture_id, kind) DO UPDATE SET
            category          = excluded.category,
            match_name        = excluded.match_name,
            league_name       = excluded.league_name,
            league_id         = excluded.league_id,
            checkpoint1_score = excluded.checkpoint1_score,
            checkpoint2_score = excluded.checkpoint2_score,
            placed_at         = excluded.placed_at
        "#
    ))
    .bind(decision.fixture_id)
    .bind(decision.kind.as_str())
    .bind(decision.category.as_deref())
    .bind(&decision.match_name)
    .bind(&decision.league_name)
    .bind(decision.league_id)
    .bind(decision.checkpoint1_score.as_deref())
    .bind(decision.checkpoint2_score.as_deref())
    .bind(decision.placed_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// DecisionStore
// ---------------------------------------------------------------------------

#[async_trait]
impl DecisionStore for SqliteStore {
    async fn get_state(&self, fixture_id: FixtureId) -> Result<Option<MatchState>, StoreError> {
        let row = sqlx::query("SELECT * FROM match_states WHERE fixture_id = ?")
            .bind(fixture_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| decode_state(fixture_id, &r)).transpose()
    }

    async fn merge_state(&self, fixture_id: FixtureId, patch: &MatchStatePatch) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        upsert_state(&mut *conn, fixture_id, patch).await?;
        debug!(fixture_id, ?patch, "Match state merged");
        Ok(())
    }

    async fn list_pending(&self, kind: Option<DecisionKind>) -> Result<Vec<PendingDecision>, StoreError> {
        let rows = match kind {
            Some(k) => {
                sqlx::query(&format!(
                    "SELECT {DECISION_COLUMNS} FROM pending_decisions WHERE kind = ? ORDER BY fixture_id"
                ))
                .bind(k.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {DECISION_COLUMNS} FROM pending_decisions ORDER BY fixture_id, kind DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(decode_decision).collect()
    }

    async fn get_pending(
        &self,
        fixture_id: FixtureId,
        kind: DecisionKind,
    ) -> Result<Option<PendingDecision>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {DECISION_COLUMNS} FROM pending_decisions WHERE fixture_id = ? AND kind = ?"
        ))
        .bind(fixture_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode_decision).transpose()
    }

    async fn put_pending(&self, decision: &PendingDecision) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT fixture_id FROM match_states WHERE fixture_id = ?")
            .bind(decision.fixture_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            tx.rollback().await?;
            return Err(StoreError::MissingState(decision.fixture_id));
        }

        upsert_pending(&mut *tx, decision).await?;

        tx.commit().await?;
        debug!(fixture_id = decision.fixture_id, kind = %decision.kind, "Pending decision stored");
        Ok(())
    }

    async fn place_decision(
        &self,
        fixture_id: FixtureId,
        patch: &MatchStatePatch,
        decision: &PendingDecision,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        upsert_state(&mut *tx, fixture_id, patch).await?;
        upsert_pending(&mut *tx, decision).await?;
        tx.commit().await?;

        debug!(fixture_id, kind = %decision.kind, "Decision placed");
        Ok(())
    }

    async fn move_to_archived(
        &self,
        fixture_id: FixtureId,
        kind: DecisionKind,
        outcome: Outcome,
        resolved_at: DateTime<Utc>,
    ) -> Result<ArchiveResult, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {DECISION_COLUMNS} FROM pending_decisions WHERE fixture_id = ? AND kind = ?"
        ))
        .bind(fixture_id)
        .bind(kind.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(ArchiveResult::NotPending);
        };
        let archived = ArchivedDecision::new(decode_decision(&row)?, outcome, resolved_at);
        let d = &archived.decision;

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO archived_decisions (id, {DECISION_COLUMNS}, outcome, resolved_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (fixture_id, kind) DO NOTHING
            "#
        ))
        .bind(&archived.id)
        .bind(d.fixture_id)
        .bind(d.kind.as_str())
        .bind(d.category.as_deref())
        .bind(&d.match_name)
        .bind(&d.league_name)
        .bind(d.league_id)
        .bind(d.checkpoint1_score.as_deref())
        .bind(d.checkpoint2_score.as_deref())
        .bind(d.placed_at.to_rfc3339())
        .bind(outcome.as_str())
        .bind(resolved_at.to_rfc3339())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM pending_decisions WHERE fixture_id = ? AND kind = ?")
            .bind(fixture_id)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if inserted == 0 {
            warn!(fixture_id, kind = %kind, "Decision already archived, dropped stale pending copy");
            return Ok(ArchiveResult::NotPending);
        }
        debug!(fixture_id, kind = %kind, outcome = %outcome, "Decision archived");
        Ok(ArchiveResult::Archived(archived))
    }

    async fn archived_for(&self, fixture_id: FixtureId) -> Result<Vec<ArchivedDecision>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT id, {DECISION_COLUMNS}, outcome, resolved_at FROM archived_decisions \
             WHERE fixture_id = ? ORDER BY resolved_at"
        ))
        .bind(fixture_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_archived).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
