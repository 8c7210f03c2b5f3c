use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::result::AnalysisResult;

/// A snapshot loaded back from Postgres.
#[derive(Debug, Clone)]
pub struct StoredRun {
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: AnalysisResult,
}

/// Listing entry for `show` without the snapshot body.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub id: Uuid,
    pub label: Option<String>,
    pub node_count: i32,
    pub edge_count: i32,
    pub community_count: i32,
    pub isolated_count: i32,
    pub created_at: DateTime<Utc>,
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn count(value: usize, field: &str) -> anyhow::Result<i32> {
    i32::try_from(value).with_context(|| format!("{field} {value} does not fit the schema"))
}

/// Stores a snapshot keyed by its fingerprint. Saving the same run twice
/// leaves one row.
pub async fn save_result(
    pool: &PgPool,
    result: &AnalysisResult,
    label: Option<&str>,
) -> anyhow::Result<Uuid> {
    let summary = result.summary();
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO cohort_network.analysis_runs
        (id, fingerprint, label, node_count, edge_count, community_count, isolated_count, density, snapshot)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (fingerprint) DO UPDATE
        SET label = COALESCE(EXCLUDED.label, cohort_network.analysis_runs.label),
            snapshot = EXCLUDED.snapshot,
            updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(result.run_id())
    .bind(result.fingerprint())
    .bind(label)
    .bind(count(summary.node_count, "node_count")?)
    .bind(count(summary.edge_count, "edge_count")?)
    .bind(count(summary.community_count, "community_count")?)
    .bind(count(summary.isolated_count, "isolated_count")?)
    .bind(summary.density)
    .bind(Json(result))
    .fetch_one(pool)
    .await
    .context("failed to save analysis run")?
    .get("id");

    tracing::info!(%id, fingerprint = result.fingerprint(), "analysis run saved");
    Ok(id)
}

pub async fn fetch_result(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<StoredRun>> {
    let row = sqlx::query(
        r#"
        SELECT label, snapshot, created_at, updated_at
        FROM cohort_network.analysis_runs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let Json(result): Json<AnalysisResult> = row
        .try_get("snapshot")
        .context("stored snapshot could not be decoded")?;

    Ok(Some(StoredRun {
        label: row.get("label"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        result,
    }))
}

pub async fn list_runs(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<RunSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT id, label, node_count, edge_count, community_count, isolated_count, created_at
        FROM cohort_network.analysis_runs
        ORDER BY created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut runs = Vec::new();
    for row in rows {
        runs.push(RunSummary {
            id: row.get("id"),
            label: row.get("label"),
            node_count: row.get("node_count"),
            edge_count: row.get("edge_count"),
            community_count: row.get("community_count"),
            isolated_count: row.get("isolated_count"),
            created_at: row.get("created_at"),
        });
    }

    Ok(runs)
}
