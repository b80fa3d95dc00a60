use crate::database::models::LocalStateRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

pub(super) struct SqliteLocalStateRepository<'conn> {
    pub(super) conn: &'conn Connection,
}

impl<'conn> super::LocalStateRepository for SqliteLocalStateRepository<'conn> {
    fn put(&self, record: &LocalStateRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO local_state (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![record.key, record.value, record.updated_at],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<LocalStateRecord>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT key, value, updated_at
                FROM local_state
                WHERE key = ?1
                "#,
                params![key],
                |row| {
                    Ok(LocalStateRecord {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn list_with_prefix(&self, prefix: &str) -> Result<Vec<LocalStateRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT key, value, updated_at
            FROM local_state
            WHERE substr(key, 1, length(?1)) = ?1
            ORDER BY key ASC
            "#,
        )?;
        let rows = stmt.query_map(params![prefix], |row| {
            Ok(LocalStateRecord {
                key: row.get(0)?,
                value: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::models::LocalStateRecord;
    use crate::database::repositories::LocalStateRepository;
    use crate::database::Database;

    fn record(key: &str, value: &str) -> LocalStateRecord {
        LocalStateRecord {
            key: key.into(),
            value: value.into(),
            updated_at: None,
        }
    }

    #[test]
    fn put_overwrites_existing_value() {
        let db = Database::open_in_memory().expect("db");
        db.with_repositories(|repos| {
            let store = repos.local_state();
            store.put(&record("vibes_earned_a", "{}"))?;
            store.put(&record("vibes_earned_a", "{\"posts\":[]}"))?;
            let stored = store.get("vibes_earned_a")?.expect("row");
            assert_eq!(stored.value, "{\"posts\":[]}");
            Ok(())
        })
        .expect("repository calls");
    }

    #[test]
    fn prefix_listing_skips_other_keys() {
        let db = Database::open_in_memory().expect("db");
        db.with_repositories(|repos| {
            let store = repos.local_state();
            store.put(&record("vibes_earned_a", "1"))?;
            store.put(&record("vibes_earned_b", "2"))?;
            store.put(&record("theme", "dark"))?;
            let keys: Vec<String> = store
                .list_with_prefix("vibes_earned_")?
                .into_iter()
                .map(|record| record.key)
                .collect();
            assert_eq!(keys, vec!["vibes_earned_a", "vibes_earned_b"]);
            assert!(store.get("missing")?.is_none());
            Ok(())
        })
        .expect("repository calls");
    }
}
