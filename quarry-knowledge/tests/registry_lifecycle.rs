//! Integration tests for knowledge base discovery and lifecycle.
//!
//! Everything here runs against temp directories with the `ollama` provider,
//! which constructs an embedding client without touching the network; tests
//! that actually embed live in `live_search.rs` behind the `live-tests`
//! feature.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use quarry_knowledge::{
    ActivationState, EvictionQueue, KnowledgeBaseConfig, KnowledgeBaseRegistry, KnowledgeError,
    RetrievalSettings,
};

// -- Fixture -----------------------------------------------------------------

struct Fixture {
    registry: KnowledgeBaseRegistry,
    kb_root: PathBuf,
    settings: RetrievalSettings,
    eviction: Arc<EvictionQueue>,
    _temp: TempDir,
}

impl Fixture {
    async fn setup() -> Self {
        let temp = TempDir::new().expect("tempdir");
        let kb_root = temp.path().join("knowledge-bases");
        let cache_dir = temp.path().join("document-cache");

        let settings = RetrievalSettings {
            kb_root_override: Some(kb_root.clone()),
            cache_dir_override: Some(cache_dir.clone()),
            ..Default::default()
        };

        let eviction = Arc::new(EvictionQueue::new(
            cache_dir,
            Duration::from_secs(3600),
            1024 * 1024,
            Duration::from_secs(60),
        ));

        let registry =
            KnowledgeBaseRegistry::new(settings.clone(), None, Arc::clone(&eviction))
                .expect("registry");

        Self {
            registry,
            kb_root,
            settings,
            eviction,
            _temp: temp,
        }
    }

    /// Create a knowledge base directory with a persisted config, as an
    /// external tool would.
    async fn seed_kb(&self, name: &str, provider: &str) {
        let dir = self.kb_root.join(name);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let mut config = KnowledgeBaseConfig::new(name).unwrap();
        config.embedding_provider = provider.to_string();
        config.save(&dir.join("config.toml")).await.unwrap();
    }
}

// -- Discovery ---------------------------------------------------------------

#[tokio::test]
async fn discover_creates_a_missing_root() {
    let fixture = Fixture::setup().await;
    assert!(!fixture.kb_root.exists());

    let added = fixture.registry.discover().await.unwrap();
    assert_eq!(added, 0);
    assert!(fixture.kb_root.exists());
}

#[tokio::test]
async fn discover_finds_one_kb_per_directory() {
    let fixture = Fixture::setup().await;
    fixture.seed_kb("manuals", "ollama").await;
    fixture.seed_kb("notes", "ollama").await;

    let added = fixture.registry.discover().await.unwrap();
    assert_eq!(added, 2);

    let mut names = fixture.registry.list().await;
    names.sort();
    assert_eq!(names, vec!["manuals".to_string(), "notes".to_string()]);
}

#[tokio::test]
async fn a_directory_without_config_gets_defaults() {
    let fixture = Fixture::setup().await;
    tokio::fs::create_dir_all(fixture.kb_root.join("fresh"))
        .await
        .unwrap();

    fixture.registry.discover().await.unwrap();
    let instance = fixture.registry.require("fresh").await.unwrap();
    assert_eq!(instance.config().await.name, "fresh");
}

#[tokio::test]
async fn a_broken_config_skips_only_that_kb() {
    let fixture = Fixture::setup().await;
    fixture.seed_kb("good", "ollama").await;

    let bad_dir = fixture.kb_root.join("bad");
    tokio::fs::create_dir_all(&bad_dir).await.unwrap();
    tokio::fs::write(bad_dir.join("config.toml"), "name = \"\"\n")
        .await
        .unwrap();

    let added = fixture.registry.discover().await.unwrap();
    assert_eq!(added, 1);
    assert!(fixture.registry.get("good").await.is_some());
    assert!(fixture.registry.get("bad").await.is_none());
}

#[tokio::test]
async fn rediscover_is_additive_and_preserves_live_instances() {
    let fixture = Fixture::setup().await;
    fixture.seed_kb("first", "ollama").await;
    fixture.registry.discover().await.unwrap();

    let first = fixture.registry.require("first").await.unwrap();
    first.activate_before_use().await.unwrap();
    assert_eq!(first.state().await, ActivationState::Activated);

    // a new KB appears externally
    fixture.seed_kb("second", "ollama").await;
    let added = fixture.registry.discover().await.unwrap();
    assert_eq!(added, 1);

    // the handle the registry serves is still the same live instance
    let again = fixture.registry.require("first").await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(again.state().await, ActivationState::Activated);
}

// -- Activation --------------------------------------------------------------

#[tokio::test]
async fn activation_is_idempotent() {
    let fixture = Fixture::setup().await;
    fixture.seed_kb("docs", "ollama").await;
    fixture.registry.discover().await.unwrap();

    let instance = fixture.registry.require("docs").await.unwrap();
    assert_eq!(instance.state().await, ActivationState::Discovered);

    instance.activate_before_use().await.unwrap();
    let chunk_count = instance.chunk_count().await;
    instance.activate_before_use().await.unwrap();

    assert_eq!(instance.state().await, ActivationState::Activated);
    assert_eq!(instance.chunk_count().await, chunk_count);
    assert_eq!(
        instance.active_embedding_model().await.as_deref(),
        Some("bge-m3")
    );
}

#[tokio::test]
async fn unknown_provider_degrades_but_stays_listed() {
    let fixture = Fixture::setup().await;
    fixture.seed_kb("degraded", "unknown").await;
    fixture.registry.discover().await.unwrap();

    let instance = fixture.registry.require("degraded").await.unwrap();
    // activation reports Ok: the failure is a status, not an error
    instance.activate_before_use().await.unwrap();

    assert_eq!(instance.state().await, ActivationState::Degraded);
    let status = instance.status_message().await.unwrap();
    assert!(status.contains("unsupported embedding provider"));
    assert!(status.contains("unknown"));

    // still listable
    assert!(fixture.registry.list().await.contains(&"degraded".to_string()));

    // queries fail with a clear typed error, not a generic one
    let err = instance.invoke("anything").await.unwrap_err();
    assert!(matches!(err, KnowledgeError::Unavailable { name, .. } if name == "degraded"));
}

#[tokio::test]
async fn deactivate_releases_resources_but_keeps_chunks() {
    let fixture = Fixture::setup().await;
    fixture.seed_kb("docs", "ollama").await;
    fixture.registry.discover().await.unwrap();

    let instance = fixture.registry.require("docs").await.unwrap();
    instance.activate_before_use().await.unwrap();

    let doc = fixture._temp.path().join("guide.md");
    tokio::fs::write(&doc, "# Guide\nHow to use the thing.")
        .await
        .unwrap();
    instance.add_documents(&[doc]).await.unwrap();
    let chunk_count = instance.chunk_count().await;
    assert!(chunk_count > 0);

    instance.deactivate().await;
    assert_eq!(instance.state().await, ActivationState::Deactivated);
    assert!(instance.active_embedding_model().await.is_none());
    // the registry stays resident across deactivation
    assert_eq!(instance.chunk_count().await, chunk_count);

    // and reactivation must not clobber it with the (absent) blob
    instance.activate_before_use().await.unwrap();
    assert_eq!(instance.chunk_count().await, chunk_count);
}

// -- Create / shutdown -------------------------------------------------------

#[tokio::test]
async fn create_persists_a_config_that_round_trips() {
    let fixture = Fixture::setup().await;

    let mut config = KnowledgeBaseConfig::new("built").unwrap();
    config.description = "created through the registry".to_string();
    config.fusion_weights = [0.2, 0.8];
    fixture.registry.create(config.clone()).await.unwrap();

    let on_disk =
        KnowledgeBaseConfig::load(&fixture.kb_root.join("built").join("config.toml"))
            .await
            .unwrap();
    assert_eq!(on_disk, config);

    // creating the same name again is rejected
    let err = fixture.registry.create(config).await.unwrap_err();
    assert!(matches!(err, KnowledgeError::ConfigValidation(_)));
}

#[tokio::test]
async fn shutdown_all_persists_every_instance() {
    let fixture = Fixture::setup().await;
    fixture.seed_kb("docs", "ollama").await;
    fixture.registry.discover().await.unwrap();

    let instance = fixture.registry.require("docs").await.unwrap();
    instance.activate_before_use().await.unwrap();

    let doc = fixture._temp.path().join("guide.md");
    tokio::fs::write(&doc, "# Guide\nPersist me before shutdown.")
        .await
        .unwrap();
    instance.add_documents(&[doc]).await.unwrap();
    let chunk_count = instance.chunk_count().await;

    fixture.registry.shutdown_all().await;
    assert_eq!(instance.state().await, ActivationState::Deactivated);
    assert!(fixture.kb_root.join("docs").join("chunks.blob").exists());

    // a fresh registry (new process) sees the persisted state
    let reborn = KnowledgeBaseRegistry::new(
        fixture.settings.clone(),
        None,
        Arc::clone(&fixture.eviction),
    )
    .unwrap();
    reborn.discover().await.unwrap();
    let reloaded = reborn.require("docs").await.unwrap();
    reloaded.activate_before_use().await.unwrap();
    assert_eq!(reloaded.chunk_count().await, chunk_count);
    assert_eq!(reloaded.list_docs().await, vec!["guide.md".to_string()]);
}

#[tokio::test]
async fn shutdown_all_survives_a_failing_instance() {
    let fixture = Fixture::setup().await;
    fixture.seed_kb("healthy", "ollama").await;
    fixture.seed_kb("doomed", "ollama").await;
    fixture.registry.discover().await.unwrap();

    // make the doomed KB's directory unwritable-by-replacement: turn its
    // chunks.blob path into a directory so the blob write fails
    let blob_path = fixture.kb_root.join("doomed").join("chunks.blob");
    tokio::fs::create_dir_all(&blob_path).await.unwrap();

    // must not panic or abort the loop; the healthy KB still persists
    fixture.registry.shutdown_all().await;
    assert!(fixture.kb_root.join("healthy").join("chunks.blob").exists());
}
