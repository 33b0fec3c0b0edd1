use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::{
    AssociationFilter, AssociationPatch, ClubFilter, ClubPatch, RecordStore, ReferenceCounter,
    Result, StorageError,
};
use crate::model::{Association, Club};
use crate::types::{AssociationId, ClubId, Collection, Status, UniqueField};

/// How long a connection waits for another process's writer claim.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const ASSOCIATION_COLUMNS: &str = "id, code, parent_id, level, hierarchy, status, name, \
                                   contact, settings, created_at, updated_at";

/// SQLite-backed record store.
///
/// `hierarchy` is kept as a JSON array so descendant queries can use `json_each`.
/// The connection is serialized behind a mutex. Engine locks only cover one
/// process; writers in separate processes must hold a [`WriterClaim`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a database file and ensures the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.as_ref().display(), journal_mode = %mode, "opened sqlite store");
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS associations (
                id TEXT PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                parent_id TEXT,
                level INTEGER NOT NULL,
                hierarchy TEXT NOT NULL,
                status TEXT NOT NULL,
                name TEXT NOT NULL,
                contact TEXT NOT NULL,
                settings TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_associations_parent ON associations (parent_id);
            CREATE TABLE IF NOT EXISTS clubs (
                id TEXT PRIMARY KEY,
                parent_id TEXT NOT NULL,
                name TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_clubs_parent ON clubs (parent_id);
            CREATE TABLE IF NOT EXISTS downstream_references (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                association_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                active INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_references_association
                ON downstream_references (association_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Changes how long this connection waits for a competing writer.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.lock().busy_timeout(timeout)?;
        Ok(())
    }

    /// Takes the database-wide write lock (`BEGIN IMMEDIATE`).
    ///
    /// Blocks up to the busy timeout while another process holds a claim.
    /// Writes made through this store while the claim is held become visible
    /// to other connections when it is released. Only one claim per store
    /// may be open at a time.
    pub fn claim_writer(&self) -> Result<WriterClaim<'_>> {
        self.conn.lock().execute_batch("BEGIN IMMEDIATE")?;
        debug!("writer claim acquired");
        Ok(WriterClaim {
            store: self,
            released: false,
        })
    }

    /// Records a downstream reference (registration, licence...) to an association.
    pub fn record_reference(&self, association: &AssociationId, kind: &str, active: bool) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO downstream_references (association_id, kind, active) VALUES (?1, ?2, ?3)",
            params![association.as_str(), kind, active],
        )?;
        Ok(())
    }

    /// Marks every reference of `kind` to `association` inactive.
    pub fn release_references(&self, association: &AssociationId, kind: &str) -> Result<u64> {
        let changed = self.conn.lock().execute(
            "UPDATE downstream_references SET active = 0 WHERE association_id = ?1 AND kind = ?2",
            params![association.as_str(), kind],
        )?;
        Ok(changed as u64)
    }
}

/// Cross-process write lock returned by [`SqliteStore::claim_writer`].
///
/// Dropping the claim commits as well, so writes made before an error are
/// kept, matching the store's non-transactional semantics.
pub struct WriterClaim<'a> {
    store: &'a SqliteStore,
    released: bool,
}

impl WriterClaim<'_> {
    /// Commits and releases the claim.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.store.conn.lock().execute_batch("COMMIT")?;
        debug!("writer claim released");
        Ok(())
    }
}

impl Drop for WriterClaim<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.store.conn.lock().execute_batch("COMMIT") {
            warn!(error = %err, "releasing writer claim failed");
        }
    }
}

struct AssociationRow {
    id: String,
    code: String,
    parent_id: Option<String>,
    level: i64,
    hierarchy: String,
    status: String,
    name: String,
    contact: String,
    settings: String,
    created_at: String,
    updated_at: String,
}

impl AssociationRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            code: row.get(1)?,
            parent_id: row.get(2)?,
            level: row.get(3)?,
            hierarchy: row.get(4)?,
            status: row.get(5)?,
            name: row.get(6)?,
            contact: row.get(7)?,
            settings: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<Association> {
        let level = u32::try_from(self.level)
            .map_err(|_| StorageError::Corruption(format!("negative level on {}", self.id)))?;
        let status = self
            .status
            .parse::<Status>()
            .map_err(|err| StorageError::Corruption(err.to_string()))?;
        Ok(Association {
            hierarchy: serde_json::from_str(&self.hierarchy)?,
            contact: serde_json::from_str(&self.contact)?,
            settings: serde_json::from_str(&self.settings)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: AssociationId(self.id),
            code: self.code,
            parent_id: self.parent_id.map(AssociationId),
            level,
            status,
            name: self.name,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|err| StorageError::Corruption(format!("bad timestamp '{raw}': {err}")))
}

fn format_timestamp(at: OffsetDateTime) -> Result<String> {
    at.format(&Rfc3339)
        .map_err(|err| StorageError::Corruption(format!("unformattable timestamp: {err}")))
}

fn association_where(filter: &AssociationFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    match &filter.parent {
        Some(Some(parent)) => {
            clauses.push("parent_id = ?");
            values.push(Value::Text(parent.to_string()));
        }
        Some(None) => clauses.push("parent_id IS NULL"),
        None => {}
    }
    if let Some(ancestor) = &filter.hierarchy_contains {
        clauses.push(
            "EXISTS (SELECT 1 FROM json_each(associations.hierarchy) WHERE json_each.value = ?)",
        );
        values.push(Value::Text(ancestor.to_string()));
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(status) = filter.exclude_status {
        clauses.push("status <> ?");
        values.push(Value::Text(status.as_str().to_string()));
    }
    if let Some(code) = &filter.code {
        clauses.push("code = ?");
        values.push(Value::Text(code.clone()));
    }
    let clause = if clauses.is_empty() {
        "1 = 1".to_string()
    } else {
        clauses.join(" AND ")
    };
    (clause, values)
}

fn club_where(filter: &ClubFilter) -> (String, Vec<Value>) {
    match &filter.parent {
        Some(parent) => (
            "parent_id = ?".to_string(),
            vec![Value::Text(parent.to_string())],
        ),
        None => ("1 = 1".to_string(), Vec::new()),
    }
}

fn unique_violation(err: rusqlite::Error, collection: Collection, id: &str, code: Option<&str>) -> StorageError {
    if let rusqlite::Error::SqliteFailure(inner, Some(message)) = &err {
        if inner.code == ErrorCode::ConstraintViolation {
            let (field, value) = match code {
                Some(code) if message.contains(".code") => (UniqueField::Code, code),
                _ => (UniqueField::Id, id),
            };
            return StorageError::Duplicate {
                collection,
                field,
                value: value.to_string(),
            };
        }
    }
    StorageError::Sqlite(err)
}

impl RecordStore for SqliteStore {
    fn find_association(&self, id: &AssociationId) -> Result<Option<Association>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                &format!("SELECT {ASSOCIATION_COLUMNS} FROM associations WHERE id = ?1"),
                [id.as_str()],
                AssociationRow::read,
            )
            .optional()?;
        row.map(AssociationRow::into_record).transpose()
    }

    fn find_associations(&self, filter: &AssociationFilter) -> Result<Vec<Association>> {
        let (clause, values) = association_where(filter);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ASSOCIATION_COLUMNS} FROM associations WHERE {clause} ORDER BY id"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), AssociationRow::read)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    fn count_associations(&self, filter: &AssociationFilter) -> Result<u64> {
        let (clause, values) = association_where(filter);
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM associations WHERE {clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn insert_association(&self, record: &Association) -> Result<()> {
        let hierarchy = serde_json::to_string(&record.hierarchy)?;
        let contact = serde_json::to_string(&record.contact)?;
        let settings = serde_json::to_string(&record.settings)?;
        let created_at = format_timestamp(record.created_at)?;
        let updated_at = format_timestamp(record.updated_at)?;
        let conn = self.conn.lock();
        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT id, code FROM associations WHERE id = ?1 OR code = ?2 LIMIT 1",
                params![record.id.as_str(), record.code],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((id, _)) = existing {
            let (field, value) = if id == record.id.as_str() {
                (UniqueField::Id, record.id.to_string())
            } else {
                (UniqueField::Code, record.code.clone())
            };
            return Err(StorageError::Duplicate {
                collection: Collection::Associations,
                field,
                value,
            });
        }
        conn.execute(
            &format!(
                "INSERT INTO associations ({ASSOCIATION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                record.id.as_str(),
                record.code,
                record.parent_id.as_ref().map(AssociationId::as_str),
                i64::from(record.level),
                hierarchy,
                record.status.as_str(),
                record.name,
                contact,
                settings,
                created_at,
                updated_at,
            ],
        )
        .map_err(|err| {
            unique_violation(
                err,
                Collection::Associations,
                record.id.as_str(),
                Some(&record.code),
            )
        })?;
        Ok(())
    }

    fn update_association(&self, id: &AssociationId, patch: &AssociationPatch) -> Result<()> {
        let mut sets = Vec::new();
        let mut values = Vec::new();
        if let Some(parent_id) = &patch.parent_id {
            sets.push("parent_id = ?");
            values.push(match parent_id {
                Some(parent) => Value::Text(parent.to_string()),
                None => Value::Null,
            });
        }
        if let Some(level) = patch.level {
            sets.push("level = ?");
            values.push(Value::Integer(i64::from(level)));
        }
        if let Some(hierarchy) = &patch.hierarchy {
            sets.push("hierarchy = ?");
            values.push(Value::Text(serde_json::to_string(hierarchy)?));
        }
        if let Some(status) = patch.status {
            sets.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(name) = &patch.name {
            sets.push("name = ?");
            values.push(Value::Text(name.clone()));
        }
        if let Some(contact) = &patch.contact {
            sets.push("contact = ?");
            values.push(Value::Text(serde_json::to_string(contact)?));
        }
        if let Some(settings) = &patch.settings {
            sets.push("settings = ?");
            values.push(Value::Text(serde_json::to_string(settings)?));
        }
        if let Some(at) = patch.updated_at {
            sets.push("updated_at = ?");
            values.push(Value::Text(format_timestamp(at)?));
        }

        let conn = self.conn.lock();
        let changed = if sets.is_empty() {
            conn.query_row(
                "SELECT COUNT(*) FROM associations WHERE id = ?1",
                [id.as_str()],
                |row| row.get::<_, i64>(0),
            )? as usize
        } else {
            values.push(Value::Text(id.to_string()));
            conn.execute(
                &format!("UPDATE associations SET {} WHERE id = ?", sets.join(", ")),
                params_from_iter(values.iter()),
            )?
        };
        if changed == 0 {
            return Err(StorageError::Missing {
                collection: Collection::Associations,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn find_club(&self, id: &ClubId) -> Result<Option<Club>> {
        let conn = self.conn.lock();
        let club = conn
            .query_row(
                "SELECT id, parent_id, name FROM clubs WHERE id = ?1",
                [id.as_str()],
                |row| {
                    Ok(Club {
                        id: ClubId(row.get(0)?),
                        parent_id: AssociationId(row.get(1)?),
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(club)
    }

    fn find_clubs(&self, filter: &ClubFilter) -> Result<Vec<Club>> {
        let (clause, values) = club_where(filter);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, parent_id, name FROM clubs WHERE {clause} ORDER BY id"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok(Club {
                id: ClubId(row.get(0)?),
                parent_id: AssociationId(row.get(1)?),
                name: row.get(2)?,
            })
        })?;
        let mut clubs = Vec::new();
        for row in rows {
            clubs.push(row?);
        }
        Ok(clubs)
    }

    fn count_clubs(&self, filter: &ClubFilter) -> Result<u64> {
        let (clause, values) = club_where(filter);
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM clubs WHERE {clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn insert_club(&self, record: &Club) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO clubs (id, parent_id, name) VALUES (?1, ?2, ?3)",
                params![record.id.as_str(), record.parent_id.as_str(), record.name],
            )
            .map_err(|err| unique_violation(err, Collection::Clubs, record.id.as_str(), None))?;
        Ok(())
    }

    fn update_club(&self, id: &ClubId, patch: &ClubPatch) -> Result<()> {
        let mut sets = Vec::new();
        let mut values = Vec::new();
        if let Some(parent_id) = &patch.parent_id {
            sets.push("parent_id = ?");
            values.push(Value::Text(parent_id.to_string()));
        }
        if let Some(name) = &patch.name {
            sets.push("name = ?");
            values.push(Value::Text(name.clone()));
        }
        let conn = self.conn.lock();
        let changed = if sets.is_empty() {
            conn.query_row(
                "SELECT COUNT(*) FROM clubs WHERE id = ?1",
                [id.as_str()],
                |row| row.get::<_, i64>(0),
            )? as usize
        } else {
            values.push(Value::Text(id.to_string()));
            conn.execute(
                &format!("UPDATE clubs SET {} WHERE id = ?", sets.join(", ")),
                params_from_iter(values.iter()),
            )?
        };
        if changed == 0 {
            return Err(StorageError::Missing {
                collection: Collection::Clubs,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

impl ReferenceCounter for SqliteStore {
    fn count_active_references(&self, id: &AssociationId) -> Result<u64> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM downstream_references WHERE association_id = ?1 AND active = 1",
            [id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
