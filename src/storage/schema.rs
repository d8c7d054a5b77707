use rusqlite::Connection;
use tracing::info;

/// Owner assigned to models saved before rows carried a `user_id`.
pub const LEGACY_OWNER_ID: i64 = 1;

const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        username    TEXT    NOT NULL UNIQUE,
        created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
    );
    CREATE TABLE IF NOT EXISTS models (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id         INTEGER REFERENCES users(id),
        name            TEXT    NOT NULL,
        architecture    TEXT    NOT NULL,
        parameters      TEXT    NOT NULL DEFAULT '{}',
        weights_status  TEXT    NOT NULL DEFAULT 'pending',
        created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
    );
";

/// Creates missing tables and upgrades legacy `models` tables in place.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CREATE_TABLES)?;

    // Tables created before ownership or weight tracking existed.
    if !has_column(conn, "models", "user_id")? {
        conn.execute_batch("ALTER TABLE models ADD COLUMN user_id INTEGER REFERENCES users(id)")?;
        let adopted = adopt_legacy_rows(conn)?;
        info!(adopted, owner = LEGACY_OWNER_ID, "migrated models table: added user_id");
    }
    if !has_column(conn, "models", "weights_status")? {
        conn.execute_batch("ALTER TABLE models ADD COLUMN weights_status TEXT NOT NULL DEFAULT 'pending'")?;
        info!("migrated models table: added weights_status");
    }
    conn.execute_batch("CREATE INDEX IF NOT EXISTS idx_models_owner_name ON models(user_id, name)")?;
    Ok(())
}

/// Hands ownerless rows to `LEGACY_OWNER_ID`, creating that user if needed.
fn adopt_legacy_rows(conn: &Connection) -> rusqlite::Result<usize> {
    let orphans: i64 = conn.query_row("SELECT COUNT(*) FROM models WHERE user_id IS NULL", [], |r| r.get(0))?;
    if orphans == 0 {
        return Ok(0);
    }
    conn.execute(
        "INSERT INTO users (id, username)
         SELECT ?1, 'legacy-owner' WHERE NOT EXISTS (SELECT 1 FROM users WHERE id = ?1)",
        [LEGACY_OWNER_ID],
    )?;
    conn.execute("UPDATE models SET user_id = ?1 WHERE user_id IS NULL", [LEGACY_OWNER_ID])
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}
