use crate::db::error::line_col_at;
use crate::db::{Database, DbError, DbErrorKind};
use crate::migration::NIL_VERSION;
use crate::urlparse;

use sqlx::postgres::{PgConnection, PgDatabaseError, PgErrorPosition};
use sqlx::{Connection, Row};

pub const DEFAULT_MIGRATIONS_TABLE: &str = "schema_migrations";

/// Postgres driver on a single pinned connection.
///
/// The same connection performs lock, run, set_version and unlock, so the
/// advisory lock stays attached to the session doing the work. The lock key
/// is derived from the database and schema names: concurrent migrators on the
/// same logical target collide, different schemas on one server do not.
#[derive(Debug)]
pub struct PostgresDriver {
    conn: PgConnection,
    migrations_table: String,
    lock_key: i64,
    locked: bool,
}

impl PostgresDriver {
    pub async fn open(url: &str) -> Result<Self, DbError> {
        let (clean_url, custom) =
            urlparse::strip_custom_query(url).map_err(|source| DbError {
                kind: DbErrorKind::InvalidUrl {
                    url: url.to_string(),
                    source,
                },
            })?;

        let mut conn = PgConnection::connect(&clean_url).await?;

        let database: Option<String> = sqlx::query_scalar("SELECT current_database()")
            .fetch_one(&mut conn)
            .await?;
        let database = database.ok_or(DbError {
            kind: DbErrorKind::MissingDatabaseName,
        })?;
        let schema: String = sqlx::query_scalar("SELECT current_schema()")
            .fetch_one(&mut conn)
            .await?;

        let migrations_table = custom
            .get("x-migrations-table")
            .cloned()
            .unwrap_or_else(|| DEFAULT_MIGRATIONS_TABLE.to_string());

        let mut driver = PostgresDriver {
            conn,
            migrations_table,
            lock_key: advisory_lock_key(&database, &schema),
            locked: false,
        };
        driver.ensure_version_table().await?;
        Ok(driver)
    }

    /// Creates the ledger table if missing. Safe to call repeatedly.
    async fn ensure_version_table(&mut self) -> Result<(), DbError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (version BIGINT NOT NULL PRIMARY KEY, dirty BOOLEAN NOT NULL)",
            self.quoted_table()
        );
        sqlx::query(&sql).execute(&mut self.conn).await?;
        Ok(())
    }

    fn quoted_table(&self) -> String {
        quote_ident(&self.migrations_table)
    }
}

impl Database for PostgresDriver {
    async fn lock(&mut self) -> Result<(), DbError> {
        if self.locked {
            return Err(DbError {
                kind: DbErrorKind::Locked,
            });
        }

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(self.lock_key)
            .fetch_one(&mut self.conn)
            .await?;
        if !acquired {
            return Err(DbError {
                kind: DbErrorKind::Locked,
            });
        }

        self.locked = true;
        Ok(())
    }

    async fn unlock(&mut self) -> Result<(), DbError> {
        if !self.locked {
            return Ok(());
        }

        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(self.lock_key)
            .execute(&mut self.conn)
            .await?;
        self.locked = false;
        Ok(())
    }

    async fn run(&mut self, script: &[u8]) -> Result<(), DbError> {
        let sql = std::str::from_utf8(script).map_err(|e| DbError {
            kind: DbErrorKind::Utf8(e),
        })?;

        // A multi-statement simple query runs in one implicit transaction
        // unless the script manages its own.
        sqlx::raw_sql(sql)
            .execute(&mut self.conn)
            .await
            .map_err(|e| script_error(sql, e))?;
        Ok(())
    }

    async fn set_version(&mut self, version: i64, dirty: bool) -> Result<(), DbError> {
        let table = self.quoted_table();
        let mut tx = self.conn.begin().await?;

        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?;

        if version >= 0 || (version == NIL_VERSION && dirty) {
            sqlx::query(&format!(
                "INSERT INTO {table} (version, dirty) VALUES ($1, $2)"
            ))
            .bind(version)
            .bind(dirty)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn version(&mut self) -> Result<(i64, bool), DbError> {
        let sql = format!("SELECT version, dirty FROM {} LIMIT 1", self.quoted_table());
        let row = match sqlx::query(&sql).fetch_optional(&mut self.conn).await {
            Ok(row) => row,
            // An absent ledger table reads as "nothing applied".
            Err(e) if is_undefined_table(&e) => return Ok((NIL_VERSION, false)),
            Err(e) => return Err(e.into()),
        };

        match row {
            Some(row) => Ok((row.try_get(0)?, row.try_get(1)?)),
            None => Ok((NIL_VERSION, false)),
        }
    }

    async fn drop_all(&mut self) -> Result<(), DbError> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'",
        )
        .fetch_all(&mut self.conn)
        .await?;

        for table in tables {
            let sql = format!("DROP TABLE IF EXISTS {} CASCADE", quote_ident(&table));
            sqlx::raw_sql(&sql).execute(&mut self.conn).await?;
        }

        self.ensure_version_table().await
    }

    async fn close(self) -> Result<(), DbError> {
        self.conn.close().await?;
        Ok(())
    }
}

fn script_error(sql: &str, error: sqlx::Error) -> DbError {
    let position = error
        .as_database_error()
        .and_then(|db| db.try_downcast_ref::<PgDatabaseError>())
        .and_then(|pg| pg.position())
        .and_then(|position| match position {
            // The server reports a 1-based offset into the query text.
            PgErrorPosition::Original(offset) => Some(offset),
            _ => None,
        });

    let (line, column) = match position {
        Some(offset) => {
            let (line, column) = line_col_at(sql.as_bytes(), offset.saturating_sub(1));
            (Some(line), Some(column))
        }
        None => (None, None),
    };

    DbError {
        kind: DbErrorKind::Script {
            query: sql.to_string(),
            line,
            column,
            source: error,
        },
    }
}

fn is_undefined_table(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "42P01")
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn advisory_lock_key(database: &str, schema: &str) -> i64 {
    const CRC_IEEE: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
    let mut digest = CRC_IEEE.digest();
    digest.update(database.as_bytes());
    digest.update(schema.as_bytes());
    0x3d32ad9e * (digest.finalize() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_keys_separate_schemas_on_one_server() {
        let a = advisory_lock_key("app", "public");
        let b = advisory_lock_key("app", "tenant_1");
        let c = advisory_lock_key("other", "public");
        assert_ne!(a, b);
        assert_ne!(a, c);
        // Same logical target, same key.
        assert_eq!(a, advisory_lock_key("app", "public"));
    }

    #[test]
    fn identifiers_are_quoted_for_ddl() {
        assert_eq!(quote_ident("schema_migrations"), "\"schema_migrations\"");
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }
}
