//! Contact repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the persistence interface consumed by identity resolution.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Every read excludes soft-deleted rows.
//! - Write paths validate the model before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - List results are ordered by `created_at ASC, id ASC`.
//! - Soft-deleting a primary never leaves secondaries linked to a deleted
//!   row: the oldest active secondary is promoted and the rest relinked.

use crate::db::DbError;
use crate::model::contact::{
    Contact, ContactId, ContactValidationError, LinkPrecedence, LinkUpdate, NewContact,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    email,
    phone_number,
    linked_id,
    link_precedence,
    created_at,
    updated_at,
    deleted_at
FROM contacts";

const NOW_MS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

const SOFT_DELETE_SAVEPOINT: &str = "contact_soft_delete";

const REQUIRED_COLUMNS: [&str; 8] = [
    "id",
    "email",
    "phone_number",
    "linked_id",
    "link_precedence",
    "created_at",
    "updated_at",
    "deleted_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for contact persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ContactValidationError),
    Db(DbError),
    NotFound(ContactId),
    InvalidData(String),
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "contact not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted contact data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ContactValidationError> for RepoError {
    fn from(value: ContactValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Predicate forms understood by `ContactRepository::find_contacts`.
///
/// Soft-deleted rows are always excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactFilter {
    /// `email = ? OR phone_number = ?`; an absent side is not matched.
    Identifiers {
        email: Option<String>,
        phone_number: Option<String>,
    },
    /// `id IN (...)`, optionally narrowed to one precedence.
    IdIn {
        ids: Vec<ContactId>,
        precedence: Option<LinkPrecedence>,
    },
    /// `linked_id IN (...)`, optionally narrowed to one precedence.
    LinkedIdIn {
        ids: Vec<ContactId>,
        precedence: Option<LinkPrecedence>,
    },
}

/// Persistence interface for contact fragments.
pub trait ContactRepository {
    fn find_contacts(&self, filter: &ContactFilter) -> RepoResult<Vec<Contact>>;
    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>>;
    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact>;
    fn update_link(&self, id: ContactId, update: &LinkUpdate) -> RepoResult<()>;
    fn soft_delete_contact(&self, id: ContactId) -> RepoResult<()>;
}

impl<R: ContactRepository + ?Sized> ContactRepository for &R {
    fn find_contacts(&self, filter: &ContactFilter) -> RepoResult<Vec<Contact>> {
        (**self).find_contacts(filter)
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        (**self).get_contact(id)
    }

    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
        (**self).create_contact(contact)
    }

    fn update_link(&self, id: ContactId, update: &LinkUpdate) -> RepoResult<()> {
        (**self).update_link(id, update)
    }

    fn soft_delete_contact(&self, id: ContactId) -> RepoResult<()> {
        (**self).soft_delete_contact(id)
    }
}

/// SQLite-backed contact repository.
///
/// Works on a plain connection or on a `Transaction` (through deref), so the
/// identify pipeline can run every query inside one write transaction.
pub struct SqliteContactRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the schema is
    ///   not the one this binary migrates to.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_contact_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ContactRepository for SqliteContactRepository<'_> {
    fn find_contacts(&self, filter: &ContactFilter) -> RepoResult<Vec<Contact>> {
        let mut sql = format!("{CONTACT_SELECT_SQL} WHERE deleted_at IS NULL");
        let mut bind_values: Vec<Value> = Vec::new();

        match filter {
            ContactFilter::Identifiers {
                email,
                phone_number,
            } => {
                let mut clauses = Vec::new();
                if let Some(email) = email {
                    clauses.push("email = ?");
                    bind_values.push(Value::Text(email.clone()));
                }
                if let Some(phone_number) = phone_number {
                    clauses.push("phone_number = ?");
                    bind_values.push(Value::Text(phone_number.clone()));
                }
                if clauses.is_empty() {
                    return Ok(Vec::new());
                }
                sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
            }
            ContactFilter::IdIn { ids, precedence } => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                push_id_set(&mut sql, &mut bind_values, "id", ids);
                push_precedence(&mut sql, &mut bind_values, *precedence);
            }
            ContactFilter::LinkedIdIn { ids, precedence } => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                push_id_set(&mut sql, &mut bind_values, "linked_id", ids);
                push_precedence(&mut sql, &mut bind_values, *precedence);
            }
        }

        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut contacts = Vec::new();
        while let Some(row) = rows.next()? {
            contacts.push(parse_contact_row(row)?);
        }

        Ok(contacts)
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONTACT_SELECT_SQL}
             WHERE id = ?1
               AND deleted_at IS NULL;"
        ))?;

        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_contact_row(row)?));
        }

        Ok(None)
    }

    fn create_contact(&self, contact: &NewContact) -> RepoResult<Contact> {
        contact.validate()?;

        self.conn.execute(
            "INSERT INTO contacts (
                email,
                phone_number,
                linked_id,
                link_precedence
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                contact.email.as_deref(),
                contact.phone_number.as_deref(),
                contact.linked_id,
                contact.link_precedence.as_str(),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_contact(id)?
            .ok_or_else(|| RepoError::InvalidData(format!("created contact {id} not readable")))
    }

    fn update_link(&self, id: ContactId, update: &LinkUpdate) -> RepoResult<()> {
        update.validate(id)?;

        let changed = self.conn.execute(
            &format!(
                "UPDATE contacts
                 SET
                    link_precedence = ?1,
                    linked_id = ?2,
                    updated_at = {NOW_MS_SQL}
                 WHERE id = ?3
                   AND deleted_at IS NULL;"
            ),
            params![update.link_precedence.as_str(), update.linked_id, id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn soft_delete_contact(&self, id: ContactId) -> RepoResult<()> {
        self.conn
            .execute_batch(&format!("SAVEPOINT {SOFT_DELETE_SAVEPOINT};"))?;
        match self.soft_delete_with_handover(id) {
            Ok(()) => {
                self.conn
                    .execute_batch(&format!("RELEASE {SOFT_DELETE_SAVEPOINT};"))?;
                Ok(())
            }
            Err(err) => {
                let _ = self.conn.execute_batch(&format!(
                    "ROLLBACK TO {SOFT_DELETE_SAVEPOINT}; RELEASE {SOFT_DELETE_SAVEPOINT};"
                ));
                Err(err)
            }
        }
    }
}

impl SqliteContactRepository<'_> {
    /// Marks `id` deleted. An active primary first hands its cluster to the
    /// oldest active secondary, so no secondary is left linked to a deleted
    /// row.
    fn soft_delete_with_handover(&self, id: ContactId) -> RepoResult<()> {
        let state = self
            .conn
            .query_row(
                "SELECT link_precedence, deleted_at FROM contacts WHERE id = ?1;",
                [id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .optional()?;
        let Some((precedence_text, deleted_at)) = state else {
            return Err(RepoError::NotFound(id));
        };

        let is_active_primary = deleted_at.is_none()
            && LinkPrecedence::parse(&precedence_text) == Some(LinkPrecedence::Primary);
        if is_active_primary {
            let secondaries = self.find_contacts(&ContactFilter::LinkedIdIn {
                ids: vec![id],
                precedence: Some(LinkPrecedence::Secondary),
            })?;
            if let Some((heir, rest)) = secondaries.split_first() {
                self.update_link(heir.id, &LinkUpdate::promote())?;
                for contact in rest {
                    self.update_link(contact.id, &LinkUpdate::link_to(heir.id))?;
                }
            }
        }

        self.conn.execute(
            &format!(
                "UPDATE contacts
                 SET
                    deleted_at = COALESCE(deleted_at, {NOW_MS_SQL}),
                    updated_at = {NOW_MS_SQL}
                 WHERE id = ?1;"
            ),
            [id],
        )?;

        Ok(())
    }
}

fn push_id_set(sql: &mut String, bind_values: &mut Vec<Value>, column: &str, ids: &[ContactId]) {
    let placeholders = vec!["?"; ids.len()].join(", ");
    sql.push_str(&format!(" AND {column} IN ({placeholders})"));
    bind_values.extend(ids.iter().map(|id| Value::Integer(*id)));
}

fn push_precedence(
    sql: &mut String,
    bind_values: &mut Vec<Value>,
    precedence: Option<LinkPrecedence>,
) {
    if let Some(precedence) = precedence {
        sql.push_str(" AND link_precedence = ?");
        bind_values.push(Value::Text(precedence.as_str().to_string()));
    }
}

fn parse_contact_row(row: &Row<'_>) -> RepoResult<Contact> {
    let precedence_text: String = row.get("link_precedence")?;
    let link_precedence = LinkPrecedence::parse(&precedence_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid link precedence `{precedence_text}` in contacts.link_precedence"
        ))
    })?;

    let contact = Contact {
        id: row.get("id")?,
        email: row.get("email")?,
        phone_number: row.get("phone_number")?,
        linked_id: row.get("linked_id")?,
        link_precedence,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    };
    contact.validate()?;
    Ok(contact)
}

fn ensure_contact_connection_ready(conn: &Connection) -> RepoResult<()> {
    let table_exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'contacts';",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if !table_exists {
        return Err(RepoError::MissingRequiredTable("contacts"));
    }

    let mut stmt = conn.prepare("PRAGMA table_info(contacts);")?;
    let mut rows = stmt.query([])?;
    let mut present = Vec::new();
    while let Some(row) = rows.next()? {
        present.push(row.get::<_, String>(1)?);
    }

    match REQUIRED_COLUMNS
        .iter()
        .find(|column| !present.iter().any(|name| name.as_str() == **column))
    {
        Some(column) => Err(RepoError::MissingRequiredColumn {
            table: "contacts",
            column: *column,
        }),
        None => Ok(()),
    }
}
