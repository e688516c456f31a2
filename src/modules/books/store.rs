//! Persistence of books in the `books` table, keyed by ISBN.

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, types::Value as SqlValue, OptionalExtension, Row};
use serde_json::json;
use thiserror::Error;

use shelf_db::{Database, DbError};
use shelf_http::AppError;

use super::models::{Book, BookFilter, BookUpdate, FilterValue, NewBook};

const COLUMNS: &str = "isbn, amazon_url, author, language, pages, publisher, title, year";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("book {0} not found")]
    NotFound(String),

    #[error("book {0} already exists")]
    Conflict(String),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(isbn) => {
                AppError::not_found(format!("no book with isbn '{}'", isbn))
            }
            StoreError::Conflict(isbn) => AppError::conflict(
                vec![json!({ "field": "isbn", "value": isbn })],
                format!("a book with isbn '{}' already exists", isbn),
            ),
            StoreError::Database(e) => AppError::Internal(anyhow::Error::new(e)),
        }
    }
}

/// Book persistence. Every write touches exactly one row in one statement.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Rows matching every set filter, in insertion order
    async fn find_all(&self, filter: &BookFilter) -> Result<Vec<Book>, StoreError>;

    async fn find_one(&self, isbn: &str) -> Result<Book, StoreError>;

    /// Insert a new row; a taken ISBN is a [`StoreError::Conflict`]
    async fn create(&self, book: NewBook) -> Result<Book, StoreError>;

    /// Replace every non-key column of an existing row
    async fn update(&self, isbn: &str, update: BookUpdate) -> Result<Book, StoreError>;

    async fn remove(&self, isbn: &str) -> Result<(), StoreError>;
}

/// [`BookStore`] backed by the shared SQLite handle
#[derive(Clone)]
pub struct SqliteBookStore {
    db: Database,
}

impl SqliteBookStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        isbn: row.get(0)?,
        amazon_url: row.get(1)?,
        author: row.get(2)?,
        language: row.get(3)?,
        pages: row.get(4)?,
        publisher: row.get(5)?,
        title: row.get(6)?,
        year: row.get(7)?,
    })
}

fn select_sql(filter: &BookFilter) -> (String, Vec<SqlValue>) {
    let conditions = filter.conditions();
    let mut sql = format!("SELECT {} FROM books", COLUMNS);
    let mut values = Vec::with_capacity(conditions.len());

    for (index, (column, value)) in conditions.into_iter().enumerate() {
        sql.push_str(if index == 0 { " WHERE " } else { " AND " });
        sql.push_str(&format!("{} = ?{}", column, index + 1));
        values.push(match value {
            FilterValue::Text(text) => SqlValue::Text(text),
            FilterValue::Integer(number) => SqlValue::Integer(number),
        });
    }
    sql.push_str(" ORDER BY rowid");

    (sql, values)
}

#[async_trait]
impl BookStore for SqliteBookStore {
    async fn find_all(&self, filter: &BookFilter) -> Result<Vec<Book>, StoreError> {
        let (sql, values) = select_sql(filter);
        tracing::debug!(filters = values.len(), "listing books");

        let books = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(values), book_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;

        Ok(books)
    }

    async fn find_one(&self, isbn: &str) -> Result<Book, StoreError> {
        let key = isbn.to_owned();
        let found = self
            .db
            .call(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM books WHERE isbn = ?1", COLUMNS),
                    params![key],
                    book_from_row,
                )
                .optional()
            })
            .await?;

        found.ok_or_else(|| StoreError::NotFound(isbn.to_owned()))
    }

    async fn create(&self, book: NewBook) -> Result<Book, StoreError> {
        let isbn = book.isbn.clone();
        tracing::debug!(isbn = %isbn, "creating book");

        let created = self
            .db
            .call(move |conn| {
                conn.query_row(
                    &format!(
                        "INSERT INTO books ({cols}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                         RETURNING {cols}",
                        cols = COLUMNS
                    ),
                    params![
                        book.isbn,
                        book.amazon_url,
                        book.author,
                        book.language,
                        book.pages,
                        book.publisher,
                        book.title,
                        book.year
                    ],
                    book_from_row,
                )
            })
            .await;

        match created {
            Ok(book) => Ok(book),
            Err(e) if e.is_unique_violation() => Err(StoreError::Conflict(isbn)),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, isbn: &str, update: BookUpdate) -> Result<Book, StoreError> {
        let row = Book::from_update(isbn, update);
        tracing::debug!(isbn = %row.isbn, "updating book");

        let updated = self
            .db
            .call(move |conn| {
                conn.query_row(
                    &format!(
                        "UPDATE books SET amazon_url = ?2, author = ?3, language = ?4, \
                         pages = ?5, publisher = ?6, title = ?7, year = ?8 \
                         WHERE isbn = ?1 RETURNING {}",
                        COLUMNS
                    ),
                    params![
                        row.isbn,
                        row.amazon_url,
                        row.author,
                        row.language,
                        row.pages,
                        row.publisher,
                        row.title,
                        row.year
                    ],
                    book_from_row,
                )
                .optional()
            })
            .await?;

        updated.ok_or_else(|| StoreError::NotFound(isbn.to_owned()))
    }

    async fn remove(&self, isbn: &str) -> Result<(), StoreError> {
        let key = isbn.to_owned();
        tracing::debug!(isbn = %key, "removing book");

        let deleted = self
            .db
            .call(move |conn| conn.execute("DELETE FROM books WHERE isbn = ?1", params![key]))
            .await?;

        if deleted == 0 {
            return Err(StoreError::NotFound(isbn.to_owned()));
        }
        Ok(())
    }
}
