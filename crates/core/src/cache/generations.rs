//! Cache generation operations.
//!
//! A generation is a named, versioned map from request identity (method +
//! URL) to a stored response. Only successful responses to GET requests are
//! ever written; everything else is rejected before touching the database.

use super::connection::CacheDb;
use super::hash::compute_request_key;
use crate::Error;
use crate::http::{RequestDescriptor, StoredResponse};
use chrono::Utc;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};
use tokio_rusqlite::{Connection, params};

/// Handle to one named generation, returned by [`CacheDb::open_generation`].
#[derive(Clone, Debug)]
pub struct CacheHandle {
    db: CacheDb,
    name: String,
}

/// Reject anything that must never enter a generation.
fn ensure_cacheable(request: &RequestDescriptor, response: &StoredResponse) -> Result<(), Error> {
    if !request.is_get() {
        return Err(Error::NotCacheable(format!("{} {}", request.method, request.url)));
    }
    if !response.is_success() {
        return Err(Error::NotCacheable(format!("status {} for {}", response.status, request.url)));
    }
    Ok(())
}

/// Row ready for insertion, computed outside the connection thread.
struct EntryRow {
    request_key: String,
    method: String,
    url: String,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn new(request: &RequestDescriptor, response: &StoredResponse) -> Result<Self, Error> {
        ensure_cacheable(request, response)?;
        Ok(Self {
            request_key: compute_request_key(&request.method, &request.url),
            method: request.method.to_ascii_uppercase(),
            url: request.url.clone(),
            status: response.status,
            headers_json: serde_json::to_string(&response.headers)?,
            body: response.body.clone(),
        })
    }
}

fn ensure_generation(conn: &rusqlite::Connection, name: &str, now: &str) -> rusqlite::Result<()> {
    conn.execute("INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)", params![name, now])?;
    Ok(())
}

fn upsert_entry(conn: &rusqlite::Connection, generation: &str, row: &EntryRow, now: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO cache_entries
            (generation, request_key, method, url, status, headers_json, body, stored_at, write_seq)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            COALESCE((SELECT write_seq FROM cache_entries ORDER BY write_seq DESC LIMIT 1), 0) + 1)
        ON CONFLICT(generation, request_key) DO UPDATE SET
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at,
            write_seq = excluded.write_seq",
        params![generation, row.request_key, row.method, row.url, row.status, row.headers_json, row.body, now],
    )?;
    Ok(())
}

/// Look up a request key, optionally restricted to one generation.
///
/// Without a restriction, the most recently written entry across all
/// generations wins, so a refreshed dynamic copy shadows an older precached one.
async fn lookup(conn: &Connection, generation: Option<String>, key: String) -> Result<Option<StoredResponse>, Error> {
    conn.call(move |conn| -> Result<Option<StoredResponse>, Error> {
        let row: Option<(u16, String, Vec<u8>)> = match generation {
            Some(name) => conn
                .query_row(
                    "SELECT status, headers_json, body FROM cache_entries
                    WHERE generation = ?1 AND request_key = ?2",
                    params![name, key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?,
            None => conn
                .query_row(
                    "SELECT status, headers_json, body FROM cache_entries
                    WHERE request_key = ?1
                    ORDER BY write_seq DESC LIMIT 1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?,
        };

        match row {
            Some((status, headers_json, body)) => {
                let headers = serde_json::from_str(&headers_json)?;
                Ok(Some(StoredResponse { status, headers, body }))
            }
            None => Ok(None),
        }
    })
    .await
    .map_err(Error::from)
}

impl CacheDb {
    /// Open a generation, creating it if absent. Idempotent.
    pub async fn open_generation(&self, name: &str) -> Result<CacheHandle, Error> {
        let owned = name.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                ensure_generation(conn, &owned, &now)?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(CacheHandle { db: self.clone(), name: name.to_string() })
    }

    /// Names of every existing generation, oldest first.
    pub async fn generation_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Match a request against every generation.
    ///
    /// Non-GET requests are never looked up and always miss.
    pub async fn match_request(&self, request: &RequestDescriptor) -> Result<Option<StoredResponse>, Error> {
        if !request.is_get() {
            return Ok(None);
        }
        lookup(&self.conn, None, compute_request_key(&request.method, &request.url)).await
    }

    /// Store a response in `generation`, creating the generation lazily.
    ///
    /// Last writer wins for an existing key.
    ///
    /// # Errors
    ///
    /// `Error::NotCacheable` for non-GET requests or non-2xx responses; nothing is written.
    pub async fn put(
        &self, generation: &str, request: &RequestDescriptor, response: &StoredResponse,
    ) -> Result<(), Error> {
        let row = EntryRow::new(request, response)?;
        let generation = generation.to_string();
        let now = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_generation(&tx, &generation, &now)?;
                upsert_entry(&tx, &generation, &row, &now)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Store every entry in one transaction: either all land or none do.
    ///
    /// The generation is created as part of the same transaction. Returns the
    /// number of entries written.
    pub async fn put_all(
        &self, generation: &str, entries: &[(RequestDescriptor, StoredResponse)],
    ) -> Result<usize, Error> {
        let rows = entries
            .iter()
            .map(|(request, response)| EntryRow::new(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        let generation = generation.to_string();
        let now = Utc::now().to_rfc3339();

        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                ensure_generation(&tx, &generation, &now)?;
                for row in &rows {
                    upsert_entry(&tx, &generation, row, &now)?;
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation and all of its entries.
    ///
    /// Returns whether the generation existed.
    pub async fn delete_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM cache_entries WHERE generation = ?1", params![name])?;
                let deleted = tx.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every generation whose name satisfies `predicate`.
    ///
    /// Enumeration and deletion happen in one transaction on the connection
    /// thread, so no put can land between them. Returns the deleted names,
    /// oldest first. Irreversible.
    pub async fn purge<F>(&self, predicate: F) -> Result<Vec<String>, Error>
    where
        F: Fn(&str) -> bool + Send + 'static,
    {
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let names = {
                    let mut stmt = tx.prepare("SELECT name FROM generations ORDER BY rowid ASC")?;
                    stmt.query_map([], |row| row.get::<_, String>(0))?
                        .collect::<Result<Vec<_>, _>>()?
                };

                let doomed: Vec<String> = names.into_iter().filter(|name| predicate(name.as_str())).collect();
                for name in &doomed {
                    tx.execute("DELETE FROM cache_entries WHERE generation = ?1", params![name])?;
                    tx.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                }
                tx.commit()?;
                Ok(doomed)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries held by a generation (0 if it does not exist).
    pub async fn entry_count(&self, generation: &str) -> Result<u64, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE generation = ?1",
                    params![generation],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

impl CacheHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Match a request in this generation only.
    pub async fn match_request(&self, request: &RequestDescriptor) -> Result<Option<StoredResponse>, Error> {
        if !request.is_get() {
            return Ok(None);
        }
        lookup(&self.db.conn, Some(self.name.clone()), compute_request_key(&request.method, &request.url)).await
    }

    /// Store a response in this generation. See [`CacheDb::put`].
    pub async fn put(&self, request: &RequestDescriptor, response: &StoredResponse) -> Result<(), Error> {
        self.db.put(&self.name, request, response).await
    }

    /// Remove one entry. Returns whether it existed.
    pub async fn delete(&self, request: &RequestDescriptor) -> Result<bool, Error> {
        let name = self.name.clone();
        let key = compute_request_key(&request.method, &request.url);
        self.db
            .conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM cache_entries WHERE generation = ?1 AND request_key = ?2",
                    params![name, key],
                )?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// URLs stored in this generation, in insertion order.
    pub async fn keys(&self) -> Result<Vec<String>, Error> {
        let name = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt =
                    conn.prepare("SELECT url FROM cache_entries WHERE generation = ?1 ORDER BY rowid ASC")?;
                let urls = stmt
                    .query_map(params![name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }
}
