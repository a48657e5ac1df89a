//! Lazily created, process-wide embedding model and vector store client.
//!
//! Both resources are expensive (a model load, a network handshake), so the
//! [`EmbeddingCache`] creates each at most once and hands out shared `Arc`s
//! afterwards. Creation is single-flight: concurrent first callers wait on
//! the same initialization. A failed creation leaves the slot empty, so the
//! next call tries again. There is no invalidation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use allure_rag_core::embedding::Embedder;
use allure_rag_core::store::VectorStore;
use allure_rag_core::{RagError, Result};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::qdrant::QdrantStore;

/// Builds the embedding model on first use.
#[async_trait]
pub trait EmbedderFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn Embedder>>;
}

/// Connects the vector store client on first use.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn VectorStore>>;
}

/// Factory backed by the application config: the configured embedding
/// provider and a Qdrant client.
pub struct ConfigFactory {
    config: Arc<Config>,
}

impl ConfigFactory {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EmbedderFactory for ConfigFactory {
    async fn create(&self) -> Result<Arc<dyn Embedder>> {
        create_embedder(&self.config.embedding).await
    }
}

#[async_trait]
impl StoreFactory for ConfigFactory {
    async fn connect(&self) -> Result<Arc<dyn VectorStore>> {
        Ok(Arc::new(QdrantStore::connect(&self.config.qdrant).await?))
    }
}

pub struct EmbeddingCache {
    embedders: Arc<dyn EmbedderFactory>,
    stores: Arc<dyn StoreFactory>,
    model: OnceCell<Arc<dyn Embedder>>,
    client: OnceCell<Arc<dyn VectorStore>>,
}

impl EmbeddingCache {
    pub fn new(embedders: Arc<dyn EmbedderFactory>, stores: Arc<dyn StoreFactory>) -> Self {
        Self {
            embedders,
            stores,
            model: OnceCell::new(),
            client: OnceCell::new(),
        }
    }

    pub fn from_config(config: Arc<Config>) -> Self {
        let factory = Arc::new(ConfigFactory::new(config));
        Self::new(factory.clone(), factory)
    }

    /// Cache around already-built resources.
    pub fn with_instances(model: Arc<dyn Embedder>, client: Arc<dyn VectorStore>) -> Self {
        Self {
            embedders: Arc::new(Prebuilt(model.clone())),
            stores: Arc::new(Prebuilt(client.clone())),
            model: OnceCell::new_with(Some(model)),
            client: OnceCell::new_with(Some(client)),
        }
    }

    /// The shared embedding model, created on first call.
    pub async fn get_model(&self) -> Result<Arc<dyn Embedder>> {
        self.model
            .get_or_try_init(|| async {
                let model = self.embedders.create().await?;
                tracing::info!(model = model.model_name(), dims = model.dims(), "embedding model ready");
                Ok(model)
            })
            .await
            .cloned()
    }

    /// The shared vector store client, connected on first call.
    ///
    /// Any construction failure is reported as [`RagError::StoreUnreachable`].
    pub async fn get_client(&self) -> Result<Arc<dyn VectorStore>> {
        self.client
            .get_or_try_init(|| async {
                self.stores.connect().await.map_err(|e| match e {
                    RagError::StoreUnreachable(_) => e,
                    other => RagError::StoreUnreachable(other.to_string()),
                })
            })
            .await
            .cloned()
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model.initialized()
    }

    pub fn is_client_connected(&self) -> bool {
        self.client.initialized()
    }
}

struct Prebuilt<T: ?Sized>(Arc<T>);

#[async_trait]
impl EmbedderFactory for Prebuilt<dyn Embedder> {
    async fn create(&self) -> Result<Arc<dyn Embedder>> {
        Ok(self.0.clone())
    }
}

#[async_trait]
impl StoreFactory for Prebuilt<dyn VectorStore> {
    async fn connect(&self) -> Result<Arc<dyn VectorStore>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allure_rag_core::store::memory::InMemoryVectorStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Constant;

    #[async_trait]
    impl Embedder for Constant {
        fn model_name(&self) -> &str {
            "constant"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    #[derive(Default)]
    struct Counting {
        models: AtomicUsize,
        connects: AtomicUsize,
        fail_first_connect: bool,
    }

    #[async_trait]
    impl EmbedderFactory for Counting {
        async fn create(&self) -> Result<Arc<dyn Embedder>> {
            self.models.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Arc::new(Constant))
        }
    }

    #[async_trait]
    impl StoreFactory for Counting {
        async fn connect(&self) -> Result<Arc<dyn VectorStore>> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_first_connect && n == 0 {
                return Err(RagError::RetrievalFailed("connection refused".to_string()));
            }
            Ok(Arc::new(InMemoryVectorStore::new()))
        }
    }

    #[tokio::test]
    async fn test_sequential_calls_construct_once() {
        let factory = Arc::new(Counting::default());
        let cache = EmbeddingCache::new(factory.clone(), factory.clone());

        let a = cache.get_model().await.unwrap();
        let b = cache.get_model().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        cache.get_client().await.unwrap();
        cache.get_client().await.unwrap();

        assert_eq!(factory.models.load(Ordering::SeqCst), 1);
        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_are_single_flight() {
        let factory = Arc::new(Counting::default());
        let cache = Arc::new(EmbeddingCache::new(factory.clone(), factory.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_model().await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(factory.models.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_is_unreachable_and_retried() {
        let factory = Arc::new(Counting {
            fail_first_connect: true,
            ..Default::default()
        });
        let cache = EmbeddingCache::new(factory.clone(), factory.clone());

        let err = cache.get_client().await.err().unwrap();
        assert!(matches!(err, RagError::StoreUnreachable(_)));
        assert!(!cache.is_client_connected());

        cache.get_client().await.unwrap();
        assert!(cache.is_client_connected());
        assert_eq!(factory.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_instances_is_preinitialized() {
        let cache =
            EmbeddingCache::with_instances(Arc::new(Constant), Arc::new(InMemoryVectorStore::new()));
        assert!(cache.is_model_loaded());
        assert_eq!(cache.get_model().await.unwrap().model_name(), "constant");
    }
}
