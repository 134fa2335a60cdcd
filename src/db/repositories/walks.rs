use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_i64, to_u64},
    models::WalkRecord,
};

const WALK_COLUMNS: &str = "id, username, started_at, stopped_at, distance_m, elapsed_secs, new_tiles, total_tiles, path_json, created_at";

fn row_to_walk(row: &Row) -> Result<WalkRecord> {
    let started_at: String = row.get("started_at")?;
    let stopped_at: String = row.get("stopped_at")?;
    let created_at: String = row.get("created_at")?;
    let elapsed_secs: i64 = row.get("elapsed_secs")?;
    let new_tiles: i64 = row.get("new_tiles")?;
    let total_tiles: i64 = row.get("total_tiles")?;
    let path_json: String = row.get("path_json")?;

    Ok(WalkRecord {
        id: row.get("id")?,
        username: row.get("username")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        stopped_at: parse_datetime(&stopped_at, "stopped_at")?,
        distance_m: row.get("distance_m")?,
        elapsed_secs: to_u64(elapsed_secs, "elapsed_secs")?,
        new_tiles: to_u64(new_tiles, "new_tiles")?,
        total_tiles: to_u64(total_tiles, "total_tiles")?,
        path: serde_json::from_str(&path_json).context("failed to parse path_json")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

impl Database {
    pub async fn insert_walk(&self, walk: &WalkRecord) -> Result<()> {
        let record = walk.clone();
        self.execute(move |conn| {
            let path_json = serde_json::to_string(&record.path)?;
            conn.execute(
                "INSERT INTO walks (id, username, started_at, stopped_at, distance_m, elapsed_secs, new_tiles, total_tiles, path_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.username,
                    record.started_at.to_rfc3339(),
                    record.stopped_at.to_rfc3339(),
                    record.distance_m,
                    to_i64(record.elapsed_secs)?,
                    to_i64(record.new_tiles)?,
                    to_i64(record.total_tiles)?,
                    path_json,
                    record.created_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert walk")?;
            Ok(())
        })
        .await
    }

    pub async fn get_walk(&self, walk_id: &str) -> Result<Option<WalkRecord>> {
        let walk_id = walk_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!("SELECT {WALK_COLUMNS} FROM walks WHERE id = ?1"))?;
            let walk = stmt
                .query_row(params![walk_id], |row| Ok(row_to_walk(row)))
                .optional()?
                .transpose()?;
            Ok(walk)
        })
        .await
    }

    /// Newest first.
    pub async fn list_walks(&self, limit: usize, offset: usize) -> Result<Vec<WalkRecord>> {
        let limit = limit as i64;
        let offset = offset as i64;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {WALK_COLUMNS}
                 FROM walks
                 ORDER BY started_at DESC
                 LIMIT ?1 OFFSET ?2"
            ))?;

            let mut rows = stmt.query(params![limit, offset])?;
            let mut walks = Vec::new();
            while let Some(row) = rows.next()? {
                walks.push(row_to_walk(row)?);
            }

            Ok(walks)
        })
        .await
    }

    pub async fn list_walks_for_user(&self, username: &str, limit: usize) -> Result<Vec<WalkRecord>> {
        let username = username.to_string();
        let limit = limit as i64;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {WALK_COLUMNS}
                 FROM walks
                 WHERE username = ?1
                 ORDER BY started_at DESC
                 LIMIT ?2"
            ))?;

            let mut rows = stmt.query(params![username, limit])?;
            let mut walks = Vec::new();
            while let Some(row) = rows.next()? {
                walks.push(row_to_walk(row)?);
            }

            Ok(walks)
        })
        .await
    }
}
