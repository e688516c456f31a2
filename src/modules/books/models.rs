use serde::{Deserialize, Serialize};

/// A book as stored in the `books` table. Field order is the JSON order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Natural key; never changes after creation
    pub isbn: String,
    pub amazon_url: String,
    pub author: String,
    pub language: String,
    pub pages: i64,
    pub publisher: String,
    pub title: String,
    pub year: i64,
}

impl Book {
    /// Rebuild the full row from the path key and an update payload.
    pub fn from_update(isbn: impl Into<String>, update: BookUpdate) -> Self {
        Self {
            isbn: isbn.into(),
            amazon_url: update.amazon_url,
            author: update.author,
            language: update.language,
            pages: update.pages,
            publisher: update.publisher,
            title: update.title,
            year: update.year,
        }
    }
}

/// Request model for creating a new book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewBook {
    pub isbn: String,
    pub amazon_url: String,
    pub author: String,
    pub language: String,
    pub pages: i64,
    pub publisher: String,
    pub title: String,
    pub year: i64,
}

impl From<NewBook> for Book {
    fn from(new: NewBook) -> Self {
        Self {
            isbn: new.isbn,
            amazon_url: new.amazon_url,
            author: new.author,
            language: new.language,
            pages: new.pages,
            publisher: new.publisher,
            title: new.title,
            year: new.year,
        }
    }
}

/// Request model for replacing a book. The key comes from the path only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookUpdate {
    pub amazon_url: String,
    pub author: String,
    pub language: String,
    pub pages: i64,
    pub publisher: String,
    pub title: String,
    pub year: i64,
}

/// Value compared against a column in an equality filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
}

/// Equality filters for listing books; every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    pub isbn: Option<String>,
    pub amazon_url: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub pages: Option<i64>,
    pub publisher: Option<String>,
    pub title: Option<String>,
    pub year: Option<i64>,
}

impl BookFilter {
    /// Build a filter from raw query pairs.
    ///
    /// Unknown keys and non-integer `pages`/`year` values are reported, one
    /// message each. A repeated key keeps its last value.
    pub fn from_query<I, K, V>(pairs: I) -> Result<Self, Vec<String>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut filter = Self::default();
        let mut errors = Vec::new();

        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.into();
            match key {
                "isbn" => filter.isbn = Some(value),
                "amazon_url" => filter.amazon_url = Some(value),
                "author" => filter.author = Some(value),
                "language" => filter.language = Some(value),
                "publisher" => filter.publisher = Some(value),
                "title" => filter.title = Some(value),
                "pages" | "year" => match value.parse::<i64>() {
                    Ok(number) if key == "pages" => filter.pages = Some(number),
                    Ok(number) => filter.year = Some(number),
                    Err(_) => errors.push(format!("filter \"{}\" must be an integer", key)),
                },
                other => errors.push(format!("unknown filter \"{}\"", other)),
            }
        }

        if errors.is_empty() {
            Ok(filter)
        } else {
            Err(errors)
        }
    }

    /// Column/value pairs for the set filters, in table column order.
    pub fn conditions(&self) -> Vec<(&'static str, FilterValue)> {
        let text = |column: &'static str, value: &Option<String>| {
            value.clone().map(|v| (column, FilterValue::Text(v)))
        };
        let integer = |column: &'static str, value: &Option<i64>| {
            value.map(|v| (column, FilterValue::Integer(v)))
        };

        [
            text("isbn", &self.isbn),
            text("amazon_url", &self.amazon_url),
            text("author", &self.author),
            text("language", &self.language),
            integer("pages", &self.pages),
            text("publisher", &self.publisher),
            text("title", &self.title),
            integer("year", &self.year),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// `{ "book": ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookResponse {
    pub book: Book,
}

/// `{ "books": [...] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BooksResponse {
    pub books: Vec<Book>,
}

/// `{ "message": ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
