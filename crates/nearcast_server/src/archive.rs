use async_trait::async_trait;
use chrono::Utc;
use nearcast_core::{ArchiveStore, ClientId, CoreError, Location, TokenId};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

fn db_err(e: rusqlite::Error) -> CoreError {
    CoreError::Store(e.to_string())
}

/// SQLite-backed location archive. Writes are small single-row inserts
/// behind a mutex; the ingest path treats failures as non-fatal.
pub struct SqliteArchive {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteArchive {
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::init(&conn).map_err(db_err)?;
        info!("archive opened at {}", path.display());
        Ok(SqliteArchive {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(&conn).map_err(db_err)?;
        Ok(SqliteArchive {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entity (
                client_uuid TEXT NOT NULL,
                token_uuid  TEXT NOT NULL,
                user_agent  TEXT,
                created     INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS location_data (
                token_uuid TEXT NOT NULL,
                lat        REAL NOT NULL,
                lng        REAL NOT NULL,
                alt        REAL NOT NULL,
                heading    REAL NOT NULL,
                timestamp  INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_location_token ON location_data(token_uuid);
            "#,
        )
    }
}

#[async_trait]
impl ArchiveStore for SqliteArchive {
    async fn record_session(
        &self,
        client_id: ClientId,
        token_id: TokenId,
        user_agent: &str,
    ) -> Result<(), CoreError> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO entity (client_uuid, token_uuid, user_agent, created)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    client_id.to_string(),
                    token_id.to_string(),
                    user_agent,
                    Utc::now().timestamp()
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    async fn append_location(&self, token_id: TokenId, loc: &Location) -> Result<(), CoreError> {
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO location_data (token_uuid, lat, lng, alt, heading, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    token_id.to_string(),
                    loc.lat,
                    loc.lng,
                    f64::from(loc.alt),
                    f64::from(loc.heading),
                    loc.timestamp
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    async fn locations_by_token(&self, token_id: TokenId) -> Result<Vec<Location>, CoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT lat, lng, alt, heading, timestamp FROM location_data
                 WHERE token_uuid = ?1 ORDER BY rowid",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![token_id.to_string()], |row| {
                Ok(Location::new(
                    row.get(0)?,
                    row.get(1)?,
                    row.get::<_, f64>(2)? as f32,
                    row.get::<_, f64>(3)? as f32,
                    row.get(4)?,
                ))
            })
            .map_err(db_err)?;

        let mut locations = Vec::new();
        for row in rows {
            locations.push(row.map_err(db_err)?);
        }
        Ok(locations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_and_track_round_trip() {
        let archive = SqliteArchive::in_memory().unwrap();
        let token = TokenId::random();

        archive
            .record_session(ClientId::random(), token, "0")
            .await
            .unwrap();
        for i in 0..3 {
            let loc = Location::new(-34.9287, 138.5999, 86.45, 0.0, i);
            archive.append_location(token, &loc).await.unwrap();
        }

        let track = archive.locations_by_token(token).await.unwrap();
        assert_eq!(track.len(), 3);
        assert_eq!(track[0].timestamp, 0);
        assert_eq!(track[2].timestamp, 2);
        assert!((track[0].lat - -34.9287).abs() < 1e-9);

        // unknown tokens read back empty, not an error
        let empty = archive.locations_by_token(TokenId::random()).await.unwrap();
        assert!(empty.is_empty());
    }
}
