//! Discovery and lifecycle of all knowledge bases.
//!
//! The registry is constructed explicitly and passed by handle; there is no
//! process-global instance. `discover()` and `shutdown_all()` are explicit
//! calls at process start/stop.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use quarry_core::RetrievalSettings;

use crate::config::KnowledgeBaseConfig;
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::eviction::EvictionQueue;
use crate::instance::KnowledgeBaseInstance;
use crate::paths;

pub struct KnowledgeBaseRegistry {
    root: PathBuf,
    cache_dir: PathBuf,
    settings: RetrievalSettings,
    api_key: Option<String>,
    eviction: Arc<EvictionQueue>,
    instances: RwLock<HashMap<String, Arc<KnowledgeBaseInstance>>>,
    /// Names in discovery order. Directory listing order, not sorted;
    /// callers needing determinism must sort.
    order: RwLock<Vec<String>>,
}

impl KnowledgeBaseRegistry {
    pub fn new(
        settings: RetrievalSettings,
        api_key: Option<String>,
        eviction: Arc<EvictionQueue>,
    ) -> KnowledgeResult<Self> {
        let root = paths::kb_root(&settings)?;
        let cache_dir = paths::cache_root(&settings)?;
        Ok(Self {
            root,
            cache_dir,
            settings,
            api_key,
            eviction,
            instances: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        })
    }

    /// Scan the root directory: one subdirectory = one knowledge base. A
    /// missing root is created. Safe to call repeatedly: already-known
    /// instances (activated or not) are left untouched, and a knowledge
    /// base with a broken config is skipped with a warning, never aborting
    /// discovery of its siblings. Returns how many new instances appeared.
    pub async fn discover(&self) -> KnowledgeResult<usize> {
        tokio::fs::create_dir_all(&self.root).await?;

        let mut added = 0;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if self.instances.read().await.contains_key(&name) {
                continue;
            }

            let dir = entry.path();
            let config_path = paths::config_path(&dir);
            let config = if config_path.exists() {
                match KnowledgeBaseConfig::load(&config_path).await {
                    Ok(config) => {
                        if config.name != name {
                            warn!(
                                "config name '{}' differs from directory '{name}'; using directory",
                                config.name
                            );
                        }
                        config
                    }
                    Err(err) => {
                        warn!("skipping knowledge base '{name}': {err}");
                        continue;
                    }
                }
            } else {
                match KnowledgeBaseConfig::new(&name) {
                    Ok(config) => config,
                    Err(err) => {
                        warn!("skipping knowledge base '{name}': {err}");
                        continue;
                    }
                }
            };

            let instance = Arc::new(KnowledgeBaseInstance::discovered(
                config,
                dir,
                self.cache_dir.clone(),
                self.settings.clone(),
                self.api_key.clone(),
                Arc::clone(&self.eviction),
            ));
            self.instances.write().await.insert(name.clone(), instance);
            self.order.write().await.push(name);
            added += 1;
        }

        info!("discovered {added} new knowledge base(s)");
        Ok(added)
    }

    /// All known names, in discovery order.
    pub async fn list(&self) -> Vec<String> {
        self.order.read().await.clone()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<KnowledgeBaseInstance>> {
        self.instances.read().await.get(name).cloned()
    }

    /// Like [`get`](Self::get), but an unknown name is a typed error.
    pub async fn require(&self, name: &str) -> KnowledgeResult<Arc<KnowledgeBaseInstance>> {
        self.get(name)
            .await
            .ok_or_else(|| KnowledgeError::UnknownKnowledgeBase(name.to_string()))
    }

    /// Create a new knowledge base: directory, persisted config, registered
    /// instance. The name must be unused.
    pub async fn create(
        &self,
        config: KnowledgeBaseConfig,
    ) -> KnowledgeResult<Arc<KnowledgeBaseInstance>> {
        config.validate()?;
        let name = config.name.clone();
        if self.instances.read().await.contains_key(&name) {
            return Err(KnowledgeError::ConfigValidation(format!(
                "knowledge base '{name}' already exists"
            )));
        }

        let dir = paths::kb_dir(&self.root, &name);
        tokio::fs::create_dir_all(&dir).await?;
        config.save(&paths::config_path(&dir)).await?;

        let instance = Arc::new(KnowledgeBaseInstance::discovered(
            config,
            dir,
            self.cache_dir.clone(),
            self.settings.clone(),
            self.api_key.clone(),
            Arc::clone(&self.eviction),
        ));
        self.instances
            .write()
            .await
            .insert(name.clone(), Arc::clone(&instance));
        self.order.write().await.push(name.clone());

        info!("created knowledge base '{name}'");
        Ok(instance)
    }

    /// Persist and deactivate every instance, best effort: a failure is
    /// logged for its instance and the loop continues to the next one.
    pub async fn shutdown_all(&self) {
        for name in self.list().await {
            let Some(instance) = self.get(&name).await else {
                continue;
            };
            if let Err(err) = instance.persist().await {
                warn!("persist failed for knowledge base '{name}': {err}");
            }
            instance.deactivate().await;
        }
        info!("knowledge base registry shut down");
    }
}
