use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;

use crate::{
    db::RequestStore,
    error::AppResult,
    models::{BookCandidate, BookRequestRecord, PopularBook},
};

/// Catalog rows older than this are refetched instead of reused
const REFETCH_DAYS: i64 = 7;

const RECORD_COLUMNS: &str = "asin, title, subtitle, authors, narrators, cover_image, \
     release_date, runtime_length_min, user_username, downloaded, updated_at";

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Request store backed by the `book_requests` table
///
/// Expected columns: `asin text`, `title text`, `subtitle text null`,
/// `authors text[]`, `narrators text[]`, `cover_image text null`,
/// `release_date timestamptz null`, `runtime_length_min int`,
/// `user_username text null`, `downloaded bool`, `updated_at timestamptz`.
#[derive(Clone)]
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PopularRow {
    #[sqlx(flatten)]
    record: BookRequestRecord,
    requester_count: i64,
}

#[async_trait::async_trait]
impl RequestStore for PgRequestStore {
    async fn history(&self, username: &str, limit: i64) -> AppResult<Vec<BookRequestRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM book_requests \
             WHERE user_username = $1 \
             ORDER BY updated_at DESC \
             LIMIT $2"
        );

        let rows = sqlx::query_as::<_, BookRequestRecord>(&sql)
            .bind(username)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(username = %username, records = rows.len(), "Loaded request history");

        Ok(rows)
    }

    async fn popularity(&self, limit: i64) -> AppResult<Vec<PopularBook>> {
        let sql = format!(
            "WITH counts AS ( \
                 SELECT asin, COUNT(DISTINCT user_username) AS requester_count, \
                        MAX(updated_at) AS last_requested \
                 FROM book_requests \
                 WHERE user_username IS NOT NULL AND NOT downloaded \
                 GROUP BY asin \
             ) \
             SELECT b.*, c.requester_count \
             FROM counts c \
             JOIN LATERAL ( \
                 SELECT {RECORD_COLUMNS} FROM book_requests r \
                 WHERE r.asin = c.asin AND r.user_username IS NOT NULL \
                 ORDER BY r.updated_at DESC \
                 LIMIT 1 \
             ) b ON TRUE \
             ORDER BY c.requester_count DESC, c.last_requested DESC \
             LIMIT $1"
        );

        let rows = sqlx::query_as::<_, PopularRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| PopularBook {
                book: row.record.into(),
                requester_count: row.requester_count,
            })
            .collect())
    }

    async fn catalog_items(&self, limit: i64) -> AppResult<Vec<BookCandidate>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM book_requests \
             WHERE user_username IS NULL AND NOT downloaded \
             ORDER BY updated_at DESC \
             LIMIT $1"
        );

        let rows = sqlx::query_as::<_, BookRequestRecord>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(BookCandidate::from).collect())
    }

    async fn existing_books(&self, asins: &[String]) -> AppResult<HashMap<String, BookCandidate>> {
        if asins.is_empty() {
            return Ok(HashMap::new());
        }

        // downloaded rows are kept regardless of age so the flag is never lost
        let cutoff: DateTime<Utc> = Utc::now() - Duration::days(REFETCH_DAYS);
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM book_requests \
             WHERE asin = ANY($1) AND (updated_at >= $2 OR downloaded)"
        );

        let rows = sqlx::query_as::<_, BookRequestRecord>(&sql)
            .bind(asins)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        let mut books: HashMap<String, BookCandidate> = HashMap::new();
        for row in rows {
            let downloaded = row.downloaded;
            books
                .entry(row.asin.clone())
                .or_insert_with(|| BookCandidate::from(row))
                .downloaded |= downloaded;
        }

        Ok(books)
    }

    async fn store_books(&self, books: &[BookCandidate]) -> AppResult<()> {
        if books.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        let mut inserted = 0;

        for book in books {
            let result = sqlx::query(
                "UPDATE book_requests \
                 SET title = $2, subtitle = $3, authors = $4, narrators = $5, \
                     cover_image = $6, release_date = $7, runtime_length_min = $8, \
                     updated_at = now() \
                 WHERE asin = $1 AND user_username IS NULL",
            )
            .bind(&book.asin)
            .bind(&book.title)
            .bind(&book.subtitle)
            .bind(&book.authors)
            .bind(&book.narrators)
            .bind(&book.cover_image)
            .bind(book.release_date)
            .bind(book.runtime_length_min)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                updated += 1;
                continue;
            }

            sqlx::query(
                "INSERT INTO book_requests \
                 (asin, title, subtitle, authors, narrators, cover_image, release_date, \
                  runtime_length_min, user_username, downloaded, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL, false, now())",
            )
            .bind(&book.asin)
            .bind(&book.title)
            .bind(&book.subtitle)
            .bind(&book.authors)
            .bind(&book.narrators)
            .bind(&book.cover_image)
            .bind(book.release_date)
            .bind(book.runtime_length_min)
            .execute(&mut *tx)
            .await?;
            inserted += 1;
        }

        tx.commit().await?;

        tracing::info!(
            to_add_count = inserted,
            to_update_count = updated,
            "Stored catalog books"
        );

        Ok(())
    }

    async fn mark_downloaded(&self, asins: &[String]) -> AppResult<()> {
        if asins.is_empty() {
            return Ok(());
        }

        let result = sqlx::query(
            "UPDATE book_requests SET downloaded = true \
             WHERE asin = ANY($1) AND NOT downloaded",
        )
        .bind(asins)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            asins = asins.len(),
            rows = result.rows_affected(),
            "Marked books as downloaded"
        );

        Ok(())
    }
}
