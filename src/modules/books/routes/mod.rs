//! HTTP handlers for `/books`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use shelf_http::{AppError, JsonBody};

use super::models::{
    BookFilter, BookResponse, BookUpdate, BooksResponse, MessageResponse, NewBook,
};
use super::schema::{self, Schema};
use super::store::BookStore;

pub type SharedStore = Arc<dyn BookStore>;

/// Router for the books resource, mounted by the module registry.
pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route(
            "/{isbn}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .with_state(store)
}

/// Run the schema gate, then decode into the typed input.
fn validated<T: DeserializeOwned>(payload: Value, schema: &Schema) -> Result<T, AppError> {
    let outcome = schema::validate(&payload, schema);
    if !outcome.valid {
        return Err(AppError::validation(
            outcome.errors.into_iter().map(Value::String).collect(),
            format!("payload does not match schema {}", schema.name),
        ));
    }

    serde_json::from_value(schema::normalize(payload, schema))
        .map_err(|e| AppError::bad_request(e.to_string()))
}

/// GET / => {books: [book, ...]}
async fn list_books(
    State(store): State<SharedStore>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<BooksResponse>, AppError> {
    let filter = BookFilter::from_query(query).map_err(|errors| {
        AppError::validation(
            errors.into_iter().map(Value::String).collect(),
            "invalid book filters",
        )
    })?;

    let books = store.find_all(&filter).await?;
    Ok(Json(BooksResponse { books }))
}

/// GET /{isbn} => {book: book}
async fn get_book(
    State(store): State<SharedStore>,
    Path(isbn): Path<String>,
) -> Result<Json<BookResponse>, AppError> {
    let book = store.find_one(&isbn).await?;
    Ok(Json(BookResponse { book }))
}

/// POST / bookData => 201 {book: newBook}
async fn create_book(
    State(store): State<SharedStore>,
    JsonBody(payload): JsonBody<Value>,
) -> Result<(StatusCode, Json<BookResponse>), AppError> {
    let new_book: NewBook = validated(payload, &schema::CREATE_SCHEMA)?;

    let book = store.create(new_book).await?;
    tracing::info!(isbn = %book.isbn, "book created");

    Ok((StatusCode::CREATED, Json(BookResponse { book })))
}

/// PUT /{isbn} bookData => {book: updatedBook}
async fn update_book(
    State(store): State<SharedStore>,
    Path(isbn): Path<String>,
    JsonBody(payload): JsonBody<Value>,
) -> Result<Json<BookResponse>, AppError> {
    let update: BookUpdate = validated(payload, &schema::UPDATE_SCHEMA)?;

    let book = store.update(&isbn, update).await?;
    tracing::info!(isbn = %book.isbn, "book updated");

    Ok(Json(BookResponse { book }))
}

/// DELETE /{isbn} => {message: "Book deleted"}
async fn delete_book(
    State(store): State<SharedStore>,
    Path(isbn): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    store.remove(&isbn).await?;
    tracing::info!(isbn = %isbn, "book deleted");

    Ok(Json(MessageResponse {
        message: "Book deleted".to_string(),
    }))
}
