use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema scripts in order; entry `i` upgrades `user_version` from `i` to `i + 1`.
const MIGRATIONS: &[(&str, &str)] = &[("schema_v1.sql", include_str!("schemas/schema_v1.sql"))];

const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Bring the schema up to date in a single transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    match found {
        v if v == CURRENT_SCHEMA_VERSION => return Ok(()),
        v if v > CURRENT_SCHEMA_VERSION || v < 0 => bail!(
            "state database has schema version {v}, this build understands up to {CURRENT_SCHEMA_VERSION}"
        ),
        _ => {}
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    for (name, script) in &MIGRATIONS[found as usize..] {
        tx.execute_batch(script)
            .with_context(|| format!("failed to apply {name}"))?;
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to record schema version")?;
    tx.commit().context("failed to commit migrations")
}
