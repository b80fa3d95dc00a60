mod local_state;

use super::models::LocalStateRecord;
use anyhow::Result;
use rusqlite::Connection;

pub trait LocalStateRepository {
    fn put(&self, record: &LocalStateRecord) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<LocalStateRecord>>;
    fn list_with_prefix(&self, prefix: &str) -> Result<Vec<LocalStateRecord>>;
}

pub struct SqliteRepositories<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRepositories<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn local_state(&self) -> impl LocalStateRepository + '_ {
        local_state::SqliteLocalStateRepository { conn: self.conn }
    }
}
