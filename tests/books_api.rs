//! End-to-end tests of the `/books` resource through the full router.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use shelf_app::modules::books::models::Book;
use shelf_db::Database;
use shelf_kernel::settings::Settings;

struct TestApp {
    router: Router,
    db: Database,
}

impl TestApp {
    async fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let registry = shelf_app::build_registry(&db);
        registry.run_migrations(&db).await.unwrap();
        let router = shelf_http::build_router(&registry, &Settings::default());
        Self { router, db }
    }

    async fn with_book(book: &Value) -> Self {
        let app = Self::new().await;
        let (status, _) = app.request(Method::POST, "/books", Some(book.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        app
    }

    async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    /// Rows straight from the table, bypassing the HTTP layer
    async fn rows(&self) -> Vec<Book> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT isbn, amazon_url, author, language, pages, publisher, title, year \
                     FROM books ORDER BY rowid",
                )?;
                let rows = stmt.query_map([], |row| {
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
                })?;
                rows.collect::<rusqlite::Result<Vec<Book>>>()
            })
            .await
            .unwrap()
    }
}

fn book1() -> Value {
    json!({
        "isbn": "0691161518",
        "amazon_url": "http://a.co/eobPtX2",
        "author": "Matthew Lane",
        "language": "english",
        "pages": 264,
        "publisher": "Princeton University Press",
        "title": "Power-Up: Unlocking the Hidden Mathematics in Video Games",
        "year": 2017
    })
}

fn stored(value: &Value) -> Book {
    serde_json::from_value(value.clone()).unwrap()
}

fn without_isbn(mut value: Value) -> Value {
    value.as_object_mut().unwrap().remove("isbn");
    value
}

#[tokio::test]
async fn lists_all_books() {
    let app = TestApp::with_book(&book1()).await;

    let (status, body) = app.request(Method::GET, "/books", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "books": [book1()] }));
}

#[tokio::test]
async fn lists_empty_table_as_empty_array() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/books", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "books": [] }));
}

#[tokio::test]
async fn filters_books_by_equality() {
    let app = TestApp::with_book(&book1()).await;
    let mut other = book1();
    other["isbn"] = json!("0262033844");
    other["author"] = json!("Thomas H. Cormen");
    other["year"] = json!(2009);
    app.request(Method::POST, "/books", Some(other.clone())).await;

    let (status, body) = app
        .request(Method::GET, "/books?author=Thomas%20H.%20Cormen", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "books": [other] }));

    let (_, body) = app
        .request(Method::GET, "/books?language=english&year=2017", None)
        .await;
    assert_eq!(body, json!({ "books": [book1()] }));

    let (_, body) = app.request(Method::GET, "/books?year=1999", None).await;
    assert_eq!(body, json!({ "books": [] }));
}

#[tokio::test]
async fn rejects_unknown_filters() {
    let app = TestApp::with_book(&book1()).await;

    let (status, body) = app
        .request(Method::GET, "/books?colour=red&pages=lots", None)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["details"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn gets_a_single_book() {
    let app = TestApp::with_book(&book1()).await;

    let (status, body) = app.request(Method::GET, "/books/0691161518", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "book": book1() }));
}

#[tokio::test]
async fn get_missing_book_is_404() {
    let app = TestApp::with_book(&book1()).await;

    let (status, body) = app.request(Method::GET, "/books/99", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn creates_a_book() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::POST, "/books", Some(book1())).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "book": book1() }));
    assert_eq!(app.rows().await, vec![stored(&book1())]);
}

#[tokio::test]
async fn create_without_isbn_is_400_and_stores_nothing() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(Method::POST, "/books", Some(without_isbn(book1())))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["details"],
        json!(["instance requires property \"isbn\""])
    );
    assert!(app.rows().await.is_empty());
}

#[tokio::test]
async fn create_with_malformed_json_is_400() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/books")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"isbn\": "))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.rows().await.is_empty());
}

#[tokio::test]
async fn duplicate_isbn_is_409() {
    let app = TestApp::with_book(&book1()).await;
    let mut duplicate = book1();
    duplicate["title"] = json!("Another Title");

    let (status, body) = app.request(Method::POST, "/books", Some(duplicate)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");
    assert_eq!(app.rows().await, vec![stored(&book1())]);
}

#[tokio::test]
async fn updates_existing_book() {
    let app = TestApp::with_book(&book1()).await;
    let mut updated = book1();
    updated["year"] = json!(2024);

    let (status, body) = app
        .request(
            Method::PUT,
            "/books/0691161518",
            Some(without_isbn(updated.clone())),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "book": updated }));
    assert_eq!(app.rows().await, vec![stored(&updated)]);
}

#[tokio::test]
async fn repeated_update_is_idempotent() {
    let app = TestApp::with_book(&book1()).await;
    let mut updated = without_isbn(book1());
    updated["pages"] = json!(300);

    app.request(Method::PUT, "/books/0691161518", Some(updated.clone()))
        .await;
    let after_first = app.rows().await;
    let (status, _) = app
        .request(Method::PUT, "/books/0691161518", Some(updated.clone()))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.rows().await, after_first);
    assert_eq!(after_first[0].pages, 300);
}

#[tokio::test]
async fn update_missing_book_is_404_and_leaves_rows() {
    let app = TestApp::with_book(&book1()).await;
    let mut update = without_isbn(book1());
    update["year"] = json!(2024);

    let (status, _) = app.request(Method::PUT, "/books/99", Some(update)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.rows().await, vec![stored(&book1())]);
}

#[tokio::test]
async fn update_out_of_range_year_is_400_and_leaves_row() {
    let app = TestApp::with_book(&book1()).await;
    let mut update = without_isbn(book1());
    update["year"] = json!(3000);

    let (status, body) = app
        .request(Method::PUT, "/books/0691161518", Some(update))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(app.rows().await, vec![stored(&book1())]);
}

#[tokio::test]
async fn update_with_isbn_in_body_is_400() {
    let app = TestApp::with_book(&book1()).await;
    let mut update = book1();
    update["isbn"] = json!("1111111111");

    let (status, body) = app
        .request(Method::PUT, "/books/0691161518", Some(update))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["details"],
        json!(["instance is not allowed to have the additional property \"isbn\""])
    );
    assert_eq!(app.rows().await, vec![stored(&book1())]);
}

#[tokio::test]
async fn deletes_a_book() {
    let app = TestApp::with_book(&book1()).await;

    let (status, body) = app.request(Method::DELETE, "/books/0691161518", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Book deleted" }));
    assert!(app.rows().await.is_empty());

    let (status, _) = app.request(Method::GET, "/books/0691161518", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_missing_book_is_404_and_leaves_rows() {
    let app = TestApp::with_book(&book1()).await;

    let (status, _) = app.request(Method::DELETE, "/books/99", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.rows().await, vec![stored(&book1())]);
}

#[tokio::test]
async fn serves_health_and_openapi() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));

    let (status, spec) = app.request(Method::GET, "/docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(spec["paths"]["/books"]["post"].is_object());
    assert!(spec["paths"]["/books/{isbn}"]["put"].is_object());
}

#[tokio::test]
async fn update_round_trips_through_from_update() {
    let app = TestApp::with_book(&book1()).await;
    let mut update = without_isbn(book1());
    update["title"] = json!("Power-Up, Second Edition");

    let (_, body) = app
        .request(Method::PUT, "/books/0691161518", Some(update.clone()))
        .await;

    let expected = Book::from_update("0691161518", serde_json::from_value(update).unwrap());
    assert_eq!(stored(&body["book"]), expected);
}

#[tokio::test]
async fn isbn_health_is_an_ordinary_book() {
    let mut book = book1();
    book["isbn"] = json!("health");
    let app = TestApp::with_book(&book).await;

    let (status, body) = app.request(Method::GET, "/books/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "book": book }));

    let mut updated = book.clone();
    updated["pages"] = json!(300);
    let (status, body) = app
        .request(Method::PUT, "/books/health", Some(without_isbn(updated.clone())))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "book": updated }));

    let (status, _) = app.request(Method::DELETE, "/books/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.rows().await.is_empty());
}

#[tokio::test]
async fn whole_valued_floats_are_stored_as_integers() {
    let app = TestApp::new().await;
    let mut book = book1();
    book["pages"] = json!(264.0);
    book["year"] = json!(2017.0);

    let (status, body) = app.request(Method::POST, "/books", Some(book)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({ "book": book1() }));
    assert_eq!(app.rows().await, vec![stored(&book1())]);
}

#[tokio::test]
async fn create_before_printing_is_400_and_stores_nothing() {
    let app = TestApp::new().await;
    let mut book = book1();
    book["year"] = json!(1449);

    let (status, body) = app.request(Method::POST, "/books", Some(book)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"]["details"],
        json!(["instance.year must be greater than or equal to 1450"])
    );
    assert!(app.rows().await.is_empty());
}

#[tokio::test]
async fn unsupported_method_is_405_envelope() {
    let app = TestApp::with_book(&book1()).await;

    let (status, body) = app.request(Method::PATCH, "/books/0691161518", None).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"]["code"], "method_not_allowed");
    assert_eq!(app.rows().await, vec![stored(&book1())]);
}
