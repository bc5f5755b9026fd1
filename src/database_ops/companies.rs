use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sqlx::QueryBuilder;
use tracing::{info, instrument};

use super::db::Db;

/// One normalized company, ready for insertion.
///
/// `cin` is the registry's corporate identification number and the natural
/// unique key of the companies table; `slug` is derived from the name plus a
/// checksum fragment of the cin and is unique as well.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyRecord {
    pub cin: String,
    pub name: String,
    pub slug: String,
    pub status: Option<String>,
    pub class: Option<String>,
    pub category: Option<String>,
    pub date_of_registration: Option<NaiveDate>,
    pub authorized_capital: Option<BigDecimal>,
    pub paidup_capital: Option<BigDecimal>,
    pub registered_state: Option<String>,
    pub registered_office_address: Option<String>,
    pub email: Option<String>,
}

/// Storage backend for the company importer.
///
/// The pipeline talks to the store only through this trait, so the import
/// logic runs unchanged against Postgres or the in-memory backend used in
/// tests. Conflict policy is fixed: an existing row with the same cin is
/// left untouched, never overwritten.
#[async_trait]
pub trait CompanyStore: Send + Sync {
    /// All cins currently present, fetched in pages of `page_size` to bound
    /// per-query memory on large tables.
    async fn load_existing_cins(&self, page_size: i64) -> Result<HashSet<String>>;

    /// Insert the whole batch with do-nothing-on-conflict semantics on cin.
    /// All-or-nothing: any other constraint failure aborts the entire batch.
    /// Returns the number of rows actually inserted.
    async fn bulk_insert(&self, batch: &[CompanyRecord]) -> Result<u64>;

    /// Insert a single record with the same conflict semantics.
    /// Returns true when a row was inserted, false on a cin conflict.
    async fn insert_one(&self, record: &CompanyRecord) -> Result<bool>;

    /// Number of stored companies.
    async fn count(&self) -> Result<i64>;
}

/// Postgres-backed [`CompanyStore`] over the shared [`Db`] pool.
#[derive(Clone)]
pub struct PgCompanyStore {
    db: Db,
}

impl PgCompanyStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

const INSERT_PREFIX: &str = "INSERT INTO companies (cin, name, slug, status, class, category, \
     date_of_registration, authorized_capital, paidup_capital, registered_state, \
     registered_office_address, email) ";

#[async_trait]
impl CompanyStore for PgCompanyStore {
    #[instrument(skip(self))]
    async fn load_existing_cins(&self, page_size: i64) -> Result<HashSet<String>> {
        let mut cins: HashSet<String> = HashSet::new();
        let mut after = String::new();
        loop {
            let page: Vec<String> =
                sqlx::query_scalar("SELECT cin FROM companies WHERE cin > $1 ORDER BY cin LIMIT $2")
                    .bind(&after)
                    .bind(page_size)
                    .fetch_all(&self.db.pool)
                    .await?;
            let Some(last) = page.last().cloned() else {
                break;
            };
            cins.extend(page);
            after = last;
        }
        info!(existing = cins.len(), "preloaded existing cins");
        Ok(cins)
    }

    #[instrument(skip(self, batch), fields(batch_len = batch.len()))]
    async fn bulk_insert(&self, batch: &[CompanyRecord]) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(INSERT_PREFIX);
        qb.push_values(batch, |mut b, r| {
            b.push_bind(&r.cin)
                .push_bind(&r.name)
                .push_bind(&r.slug)
                .push_bind(r.status.as_ref())
                .push_bind(r.class.as_ref())
                .push_bind(r.category.as_ref())
                .push_bind(r.date_of_registration)
                .push_bind(r.authorized_capital.as_ref())
                .push_bind(r.paidup_capital.as_ref())
                .push_bind(r.registered_state.as_ref())
                .push_bind(r.registered_office_address.as_ref())
                .push_bind(r.email.as_ref());
        });
        qb.push(" ON CONFLICT (cin) DO NOTHING");
        let res = qb.build().persistent(false).execute(&self.db.pool).await?;
        Ok(res.rows_affected())
    }

    async fn insert_one(&self, record: &CompanyRecord) -> Result<bool> {
        let res = sqlx::query(
            "INSERT INTO companies (cin, name, slug, status, class, category, \
             date_of_registration, authorized_capital, paidup_capital, registered_state, \
             registered_office_address, email) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (cin) DO NOTHING",
        )
        .persistent(false)
        .bind(&record.cin)
        .bind(&record.name)
        .bind(&record.slug)
        .bind(record.status.as_ref())
        .bind(record.class.as_ref())
        .bind(record.category.as_ref())
        .bind(record.date_of_registration)
        .bind(record.authorized_capital.as_ref())
        .bind(record.paidup_capital.as_ref())
        .bind(record.registered_state.as_ref())
        .bind(record.registered_office_address.as_ref())
        .bind(record.email.as_ref())
        .execute(&self.db.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM companies")
            .persistent(false)
            .fetch_one(&self.db.pool)
            .await?;
        Ok(n)
    }
}
