//! Schema versioning for the skylog database.

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// The current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Metadata key holding the schema version.
const VERSION_KEY: &str = "schema_version";

/// Create all tables and indexes, then bring the schema up to
/// [`CURRENT_VERSION`].
///
/// # Errors
///
/// Returns an error if schema creation or a migration fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let version = schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {CURRENT_VERSION}"
            ),
        });
    }
    for next in (version + 1)..=CURRENT_VERSION {
        migrate(conn, next)?;
    }
    Ok(())
}

/// The stored schema version, 0 for a fresh database.
pub(crate) fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    value.map_or(Ok(0), |v| {
        v.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {v}"),
        })
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}

fn migrate(conn: &Connection, version: i32) -> Result<()> {
    match version {
        // Base schema comes from SCHEMA_STATEMENTS
        1 => {}
        _ => {
            return Err(Error::DatabaseMigration {
                message: format!("unknown migration version: {version}"),
            })
        }
    }
    debug!(version, "Applied schema migration");
    set_schema_version(conn, version)
}
