//! Retry wrapper for catalog and object-store backends.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tidemark_core::{CatalogResult, RetryConfig};

use crate::{
    ops, CatalogClient, DatabaseInput, DatabaseRecord, ObjectStore, PartitionInput, PartitionRecord,
    TableInput, TableRecord,
};

/// Time source and sleep used between retries.
pub trait Sleeper: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Retries `Transient` failures of the wrapped backend.
///
/// Each call gets at most `max_retries` retries, with exponential backoff,
/// and gives up early once the next sleep would exceed `max_elapsed`.
/// Every other error kind is returned as is.
pub struct RetryingClient<C> {
    inner: C,
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl<C> RetryingClient<C> {
    pub fn new(inner: C, config: RetryConfig) -> Self {
        Self::with_sleeper(inner, config, Arc::new(ThreadSleeper))
    }

    pub fn with_sleeper(inner: C, config: RetryConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { inner, config, sleeper }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn run<T>(&self, operation: &str, mut call: impl FnMut(&C) -> CatalogResult<T>) -> CatalogResult<T> {
        let started = self.sleeper.now();
        let mut retry = 0;
        loop {
            match call(&self.inner) {
                Err(e) if e.is_transient() && retry < self.config.max_retries => {
                    retry += 1;
                    let backoff = self.config.backoff_for(retry);
                    let elapsed = self.sleeper.now().saturating_duration_since(started);
                    if elapsed + backoff > self.config.max_elapsed() {
                        tracing::warn!(
                            operation = %operation,
                            attempts = retry,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Retry budget exhausted"
                        );
                        return Err(e);
                    }
                    tracing::warn!(
                        operation = %operation,
                        retry = retry,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient catalog error, retrying"
                    );
                    self.sleeper.sleep(backoff);
                }
                result => return result,
            }
        }
    }
}

impl<C: CatalogClient> CatalogClient for RetryingClient<C> {
    fn create_database(&self, input: &DatabaseInput) -> CatalogResult<()> {
        self.run(ops::CREATE_DATABASE, |c| c.create_database(input))
    }

    fn get_database(&self, name: &str) -> CatalogResult<DatabaseRecord> {
        self.run(ops::GET_DATABASE, |c| c.get_database(name))
    }

    fn delete_database(&self, name: &str) -> CatalogResult<()> {
        self.run(ops::DELETE_DATABASE, |c| c.delete_database(name))
    }

    fn create_table(&self, database: &str, input: &TableInput) -> CatalogResult<()> {
        self.run(ops::CREATE_TABLE, |c| c.create_table(database, input))
    }

    fn get_table(&self, database: &str, name: &str) -> CatalogResult<TableRecord> {
        self.run(ops::GET_TABLE, |c| c.get_table(database, name))
    }

    fn update_table(&self, database: &str, input: &TableInput) -> CatalogResult<()> {
        self.run(ops::UPDATE_TABLE, |c| c.update_table(database, input))
    }

    fn delete_table(&self, database: &str, name: &str) -> CatalogResult<()> {
        self.run(ops::DELETE_TABLE, |c| c.delete_table(database, name))
    }

    fn create_partition(&self, database: &str, table: &str, input: &PartitionInput) -> CatalogResult<()> {
        self.run(ops::CREATE_PARTITION, |c| c.create_partition(database, table, input))
    }

    fn get_partition(&self, database: &str, table: &str, values: &[String]) -> CatalogResult<PartitionRecord> {
        self.run(ops::GET_PARTITION, |c| c.get_partition(database, table, values))
    }

    fn update_partition(
        &self,
        database: &str,
        table: &str,
        values: &[String],
        input: &PartitionInput,
    ) -> CatalogResult<()> {
        self.run(ops::UPDATE_PARTITION, |c| c.update_partition(database, table, values, input))
    }

    fn delete_partition(&self, database: &str, table: &str, values: &[String]) -> CatalogResult<()> {
        self.run(ops::DELETE_PARTITION, |c| c.delete_partition(database, table, values))
    }
}

impl<C: ObjectStore> ObjectStore for RetryingClient<C> {
    fn has_objects(&self, location: &str) -> CatalogResult<bool> {
        self.run(ops::LIST_OBJECTS, |c| c.has_objects(location))
    }
}
