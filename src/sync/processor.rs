//! Deduplicating concurrent fetcher, bound to a single sync invocation.

use std::collections::HashMap;

use futures::future::try_join_all;
use tokio::sync::RwLock;

use crate::error::SyncError;
use crate::model::{SecretQuery, SecretRef, SecretSource, SourceSelector};
use crate::provider::StoreReader;

/// Per-source fetch result for multi-source actions.
#[derive(Debug)]
pub(crate) enum SourceData {
    /// Raw value of a ref selector.
    Ref(Vec<u8>),
    /// Values of every ref a query selector produced.
    Query(HashMap<SecretRef, Vec<u8>>),
}

/// Caches source reads for the duration of one invocation.
///
/// Concurrent fetches of the same ref may each issue a read; values for
/// identical refs are equal by contract, so the last write into the cache
/// wins.
pub(crate) struct Processor<'a> {
    source: &'a dyn StoreReader,
    fetched: RwLock<HashMap<SecretRef, Vec<u8>>>,
}

impl<'a> Processor<'a> {
    pub(crate) fn new(source: &'a dyn StoreReader) -> Self {
        Self {
            source,
            fetched: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached value for a ref, fetching on first use.
    pub(crate) async fn fetch_from_ref(
        &self,
        secret_ref: &SecretRef,
    ) -> Result<Vec<u8>, SyncError> {
        if let Some(value) = self.fetched.read().await.get(secret_ref) {
            return Ok(value.clone());
        }

        let value = self.source.get_secret(secret_ref).await?;
        self.fetched
            .write()
            .await
            .insert(secret_ref.clone(), value.clone());
        Ok(value)
    }

    /// Lists the query, then fetches every listed ref concurrently.
    /// The first error cancels the remaining fetches.
    pub(crate) async fn fetch_from_query(
        &self,
        query: &SecretQuery,
    ) -> Result<HashMap<SecretRef, Vec<u8>>, SyncError> {
        let refs = self.source.list_secret_keys(query).await?;

        let fetches = refs.into_iter().map(|secret_ref| async move {
            let value = self.fetch_from_ref(&secret_ref).await?;
            Ok::<_, SyncError>((secret_ref, value))
        });
        let pairs = try_join_all(fetches).await?;
        Ok(pairs.into_iter().collect())
    }

    /// Fetches every source concurrently under one fail-fast scope.
    pub(crate) async fn fetch_from_sources(
        &self,
        sources: &[SecretSource],
    ) -> Result<Vec<(String, SourceData)>, SyncError> {
        let fetches = sources.iter().map(|source| async move {
            let data = match source.selector()? {
                SourceSelector::Ref(secret_ref) => {
                    SourceData::Ref(self.fetch_from_ref(secret_ref).await?)
                }
                SourceSelector::Query(query) => {
                    SourceData::Query(self.fetch_from_query(query).await?)
                }
            };
            Ok::<_, SyncError>((source.name.clone(), data))
        });
        try_join_all(fetches).await
    }
}
