pub mod models;
pub mod routes;
pub mod schema;
pub mod store;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use serde_json::json;
use shelf_db::Database;
use shelf_kernel::{InitCtx, Migration, Module};

use routes::SharedStore;
use store::SqliteBookStore;

/// Book catalogue module: CRUD over the `books` table.
pub struct BooksModule {
    store: SharedStore,
}

impl BooksModule {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

pub(crate) fn migrations() -> Vec<Migration> {
    vec![Migration {
        id: "001_init",
        up: r#"
            CREATE TABLE IF NOT EXISTS books (
                isbn       TEXT PRIMARY KEY,
                amazon_url TEXT NOT NULL,
                author     TEXT NOT NULL,
                language   TEXT NOT NULL,
                pages      INTEGER NOT NULL,
                publisher  TEXT NOT NULL,
                title      TEXT NOT NULL,
                year       INTEGER NOT NULL
            );
            "#,
    }]
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            database = ctx.db.location(),
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(Arc::clone(&self.store))
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        let error = |description: &str| {
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                    }
                }
            })
        };
        let book_envelope = |description: &str| {
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": {
                            "type": "object",
                            "properties": { "book": { "$ref": "#/components/schemas/Book" } },
                            "required": ["book"]
                        }
                    }
                }
            })
        };
        let isbn_param = json!({
            "name": "isbn",
            "in": "path",
            "required": true,
            "schema": { "type": "string" }
        });
        let book_properties = json!({
            "isbn": { "type": "string", "minLength": 1 },
            "amazon_url": { "type": "string", "minLength": 1 },
            "author": { "type": "string", "minLength": 1 },
            "language": { "type": "string", "minLength": 1 },
            "pages": { "type": "integer", "minimum": 1 },
            "publisher": { "type": "string", "minLength": 1 },
            "title": { "type": "string", "minLength": 1 },
            "year": { "type": "integer", "minimum": schema::MIN_YEAR }
        });
        let mut update_properties = book_properties.clone();
        if let Some(properties) = update_properties.as_object_mut() {
            properties.remove("isbn");
        }
        let all_fields: Vec<&str> = schema::CREATE_SCHEMA.fields.iter().map(|f| f.name).collect();
        let update_fields: Vec<&str> = schema::UPDATE_SCHEMA.fields.iter().map(|f| f.name).collect();

        Some(json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "List books, optionally filtered by field equality",
                        "tags": ["Books"],
                        "responses": {
                            "200": {
                                "description": "Matching books",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "object",
                                            "properties": {
                                                "books": {
                                                    "type": "array",
                                                    "items": { "$ref": "#/components/schemas/Book" }
                                                }
                                            },
                                            "required": ["books"]
                                        }
                                    }
                                }
                            },
                            "400": error("Unknown or malformed filter"),
                            "500": error("Internal server error")
                        }
                    },
                    "post": {
                        "summary": "Create a book",
                        "tags": ["Books"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/NewBook" }
                                }
                            }
                        },
                        "responses": {
                            "201": book_envelope("Created book"),
                            "400": error("Payload does not match the create schema"),
                            "409": error("ISBN already exists"),
                            "500": error("Internal server error")
                        }
                    }
                },
                "/{isbn}": {
                    "parameters": [isbn_param],
                    "get": {
                        "summary": "Get a book by ISBN",
                        "tags": ["Books"],
                        "responses": {
                            "200": book_envelope("The book"),
                            "404": error("Book not found")
                        }
                    },
                    "put": {
                        "summary": "Replace every field of a book except its ISBN",
                        "tags": ["Books"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/BookUpdate" }
                                }
                            }
                        },
                        "responses": {
                            "200": book_envelope("Updated book"),
                            "400": error("Payload does not match the update schema"),
                            "404": error("Book not found")
                        }
                    },
                    "delete": {
                        "summary": "Delete a book",
                        "tags": ["Books"],
                        "responses": {
                            "200": {
                                "description": "Book deleted",
                                "content": {
                                    "application/json": {
                                        "schema": {
                                            "type": "object",
                                            "properties": { "message": { "type": "string" } },
                                            "required": ["message"]
                                        }
                                    }
                                }
                            },
                            "404": error("Book not found")
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Book": {
                        "type": "object",
                        "properties": book_properties,
                        "required": all_fields
                    },
                    "NewBook": {
                        "type": "object",
                        "properties": book_properties,
                        "required": all_fields,
                        "additionalProperties": false
                    },
                    "BookUpdate": {
                        "type": "object",
                        "properties": update_properties,
                        "required": update_fields,
                        "additionalProperties": false
                    }
                }
            }
        }))
    }

    fn migrations(&self) -> Vec<Migration> {
        migrations()
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create the books module over the shared database handle
pub fn create_module(db: &Database) -> Arc<dyn Module> {
    let store: SharedStore = Arc::new(SqliteBookStore::new(db.clone()));
    Arc::new(BooksModule::new(store))
}
