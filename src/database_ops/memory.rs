//! In-memory [`CompanyStore`] for tests and local experiments.
//!
//! Enforces the same uniqueness constraints as the Postgres schema (unique
//! cin, unique slug), including batch atomicity on a slug violation, so the
//! committer's fallback path behaves the way it does against the real store.

use std::collections::HashSet;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::companies::{CompanyRecord, CompanyStore};

#[derive(Default)]
pub struct MemoryCompanyStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    // rows keeps commit order
    rows: Vec<CompanyRecord>,
    cins: HashSet<String>,
    slugs: HashSet<String>,
}

impl MemoryCompanyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored rows in commit order.
    pub fn rows(&self) -> Vec<CompanyRecord> {
        self.inner.read().unwrap().rows.clone()
    }
}

#[async_trait]
impl CompanyStore for MemoryCompanyStore {
    async fn load_existing_cins(&self, _page_size: i64) -> Result<HashSet<String>> {
        Ok(self.inner.read().unwrap().cins.clone())
    }

    async fn bulk_insert(&self, batch: &[CompanyRecord]) -> Result<u64> {
        let mut inner = self.inner.write().unwrap();
        // All-or-nothing: a slug violation anywhere rejects the whole batch,
        // mirroring a failed multi-row INSERT.
        let mut batch_slugs: HashSet<&str> = HashSet::new();
        for r in batch {
            if inner.cins.contains(&r.cin) {
                continue;
            }
            if inner.slugs.contains(&r.slug) || !batch_slugs.insert(&r.slug) {
                bail!("unique constraint violation on slug {:?}", r.slug);
            }
        }
        let mut inserted = 0u64;
        for r in batch {
            if inner.cins.contains(&r.cin) {
                continue;
            }
            inner.cins.insert(r.cin.clone());
            inner.slugs.insert(r.slug.clone());
            inner.rows.push(r.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn insert_one(&self, record: &CompanyRecord) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        if inner.cins.contains(&record.cin) {
            return Ok(false);
        }
        if inner.slugs.contains(&record.slug) {
            bail!("unique constraint violation on slug {:?}", record.slug);
        }
        inner.cins.insert(record.cin.clone());
        inner.slugs.insert(record.slug.clone());
        inner.rows.push(record.clone());
        Ok(true)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.inner.read().unwrap().rows.len() as i64)
    }
}
