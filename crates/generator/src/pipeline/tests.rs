use super::*;
use crate::hook::LinkHook;
use crate::producer::error::{ErrorKind as ProducerErrorKind, Result as ProducerResult};
use crate::producer::{DataSetStream, UrlProducer};
use async_stream::stream;
use async_trait::async_trait;
use serde_json::{Value, json};
use sitemap_model::{ChunkStatus, ContentStatus, SitemapType, UrlRecord, Variant, WorkUnit};
use sitemap_store::{LockService, QueueStore};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Work units are JSON arrays of site paths, or the strings `"fail"` and
/// `"skip"`. A data set of `"abort"` ends enumeration with an error.
#[derive(Default)]
struct ListProducer {
    sets: Mutex<BTreeMap<String, Vec<Value>>>,
    delay: Duration,
}
impl ListProducer {
    const ID: &'static str = "list";

    fn with(variant: &str, sets: Vec<Value>) -> Arc<Self> {
        let producer = Self::default();
        producer.set(variant, sets);
        Arc::new(producer)
    }

    fn slow(variant: &str, sets: Vec<Value>, delay: Duration) -> Arc<Self> {
        let producer = Self { delay, ..Self::default() };
        producer.set(variant, sets);
        Arc::new(producer)
    }

    fn set(&self, variant: &str, sets: Vec<Value>) {
        self.sets.lock().unwrap().insert(variant.to_string(), sets);
    }
}

#[async_trait]
impl UrlProducer for ListProducer {
    fn id(&self) -> &str {
        Self::ID
    }

    fn data_sets<'a>(&'a self, variant: &'a Variant) -> DataSetStream<'a> {
        let sets = self.sets.lock().unwrap().get(&variant.id).cloned().unwrap_or_default();
        Box::pin(stream! {
            for set in sets {
                if set == "abort" {
                    yield Err(exn::Exn::from(ProducerErrorKind::Failed));
                    return;
                }
                yield ProducerResult::Ok(set);
            }
        })
    }

    async fn generate(&self, _variant: &Variant, data: &Value) -> ProducerResult<Vec<UrlRecord>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match data {
            Value::String(s) if s == "fail" => exn::bail!(ProducerErrorKind::Failed),
            Value::String(s) if s == "skip" => exn::bail!(ProducerErrorKind::Skip),
            Value::Array(paths) => Ok(paths
                .iter()
                .filter_map(Value::as_str)
                .map(|path| UrlRecord::new(format!("https://example.com{path}")).with_dedup_key(path))
                .collect()),
            _ => exn::bail!(ProducerErrorKind::InvalidData),
        }
    }
}

struct PriorityHook;
impl LinkHook for PriorityHook {
    fn alter(&self, _variant: &Variant, links: &mut Vec<UrlRecord>) {
        links.retain(|link| !link.url.ends_with("/drop"));
        for link in links.iter_mut() {
            link.priority = Some(0.5);
        }
    }
}

/// `count` work units of `per_set` consecutive paths each.
fn sets(count: usize, per_set: usize) -> Vec<Value> {
    (0..count)
        .map(|set| Value::from((0..per_set).map(|n| format!("/page/{}", set * per_set + n)).collect::<Vec<_>>()))
        .collect()
}

fn options(max_links: Option<usize>) -> Options {
    Options {
        base_url: "https://example.com".to_string(),
        stylesheet: None,
        time_budget: None,
        max_links,
        ..Options::default()
    }
}

fn pipeline(db: &Database, producer: Arc<ListProducer>, options: Options) -> Pipeline {
    let registry = Registry::default()
        .with_producer(producer)
        .with_type(SitemapType {
            id: "test".to_string(),
            producers: vec![ListProducer::ID.to_string()],
            serializer: "default".to_string(),
        })
        .with_variant(Variant::new("default", "test"))
        .with_variant(Variant::new("news", "test").with_weight(1));
    Pipeline::new(registry, Stores::from(db), options).unwrap()
}

async fn memory() -> Database {
    Database::connect_in_memory().await.unwrap()
}

async fn live(pipeline: &Pipeline, variant: &str) -> Vec<sitemap_model::Chunk> {
    pipeline.content().chunks(variant, ChunkStatus::Live).await.unwrap()
}

async fn live_documents(pipeline: &Pipeline, variant: &str) -> Vec<String> {
    live(pipeline, variant).await.into_iter().map(|chunk| chunk.document).collect()
}

async fn live_link_counts(pipeline: &Pipeline, variant: &str) -> Vec<u32> {
    live(pipeline, variant).await.iter().map(|chunk| chunk.link_count).collect()
}

#[tokio::test]
async fn test_chunks_and_index() {
    let db = memory().await;
    let pipeline = pipeline(&db, ListProducer::with("default", sets(5, 5)), options(Some(10)));
    assert_eq!(pipeline.generate(None, Some(10)).await.unwrap(), GenerateOutcome::Completed);

    assert_eq!(live_link_counts(&pipeline, "default").await, [10, 10, 5]);
    let index = pipeline.content().index("default", ChunkStatus::Live).await.unwrap().unwrap();
    assert_eq!(index.link_count, 3);
    assert!(index.document.contains("<sitemapindex"));
    for page in 1..=3 {
        assert!(index.document.contains(&format!("<loc>https://example.com/sitemap.xml?page={page}</loc>")));
    }
    // The index is what gets served without a page number.
    let served = pipeline.content().document("default", ChunkStatus::Live, None).await.unwrap().unwrap();
    assert!(served.is_index());
    assert_eq!(pipeline.content().status("default").await.unwrap(), ContentStatus::Published);
    assert!(pipeline.content().chunks("default", ChunkStatus::Staged).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_index_urls_of_non_default_variant() {
    let db = memory().await;
    let pipeline = pipeline(&db, ListProducer::with("news", sets(3, 4)), options(Some(5)));
    pipeline.generate(None, Some(5)).await.unwrap();

    assert_eq!(live_link_counts(&pipeline, "news").await, [5, 5, 2]);
    let index = pipeline.content().index("news", ChunkStatus::Live).await.unwrap().unwrap();
    assert!(index.document.contains("<loc>https://example.com/news/sitemap.xml?page=2</loc>"));
}

#[tokio::test]
async fn test_single_chunk_without_limit() {
    let db = memory().await;
    let pipeline = pipeline(&db, ListProducer::with("default", sets(30, 100)), options(None));
    pipeline.generate(None, None).await.unwrap();

    assert_eq!(live_link_counts(&pipeline, "default").await, [3000]);
    assert!(!pipeline.content().has_index("default", ChunkStatus::Live).await.unwrap());
}

#[tokio::test]
async fn test_automatic_rebuild() {
    let db = memory().await;
    let pipeline = pipeline(&db, ListProducer::with("default", sets(4, 3)), options(Some(10)));
    assert_eq!(pipeline.generate(None, Some(10)).await.unwrap(), GenerateOutcome::Completed);
    assert_eq!(pipeline.progress().await.unwrap().initial, 4);
    assert_eq!(live_link_counts(&pipeline, "default").await, [10, 2]);

    // A completed run leaves nothing behind, so the next one starts over.
    assert_eq!(pipeline.generate(None, Some(5)).await.unwrap(), GenerateOutcome::Completed);
    assert_eq!(live_link_counts(&pipeline, "default").await, [5, 5, 2]);
}

#[rstest::rstest]
#[case::deduplicated(true, 6)]
#[case::kept(false, 9)]
#[tokio::test]
async fn test_duplicates(#[case] remove_duplicates: bool, #[case] expected: u64) {
    let db = memory().await;
    let sets = vec![json!(["/a", "/b", "/c"]), json!(["/c", "/d", "/a"]), json!(["/e", "/f", "/b"])];
    let options = Options { remove_duplicates, ..options(Some(4)) };
    let pipeline = pipeline(&db, ListProducer::with("default", sets), options);
    pipeline.generate(None, Some(4)).await.unwrap();

    let links = pipeline.content().link_count("default", ChunkStatus::Live).await.unwrap();
    assert_eq!(links, expected);
}

#[tokio::test]
async fn test_duplicates_are_per_variant() {
    let db = memory().await;
    let producer = ListProducer::with("default", vec![json!(["/a", "/b"])]);
    producer.set("news", vec![json!(["/a", "/b"])]);
    let pipeline = pipeline(&db, producer, options(Some(10)));
    pipeline.generate(None, Some(10)).await.unwrap();

    assert_eq!(live_link_counts(&pipeline, "default").await, [2]);
    assert_eq!(live_link_counts(&pipeline, "news").await, [2]);
}

#[tokio::test]
async fn test_seen_keys_reset_on_variant_switch() {
    let db = memory().await;
    let pipeline = pipeline(&db, Arc::new(ListProducer::default()), options(None));
    SqliteQueue::from(&db)
        .enqueue(&[
            WorkUnit::new("default", ListProducer::ID, json!(["/a", "/b"])),
            WorkUnit::new("news", ListProducer::ID, json!(["/x"])),
            WorkUnit::new("default", ListProducer::ID, json!(["/a", "/c"])),
        ])
        .await
        .unwrap();
    pipeline.generate(None, None).await.unwrap();

    // Coming back to a variant starts a fresh pass that replaces the first.
    let documents = live_documents(&pipeline, "default").await;
    assert_eq!(live_link_counts(&pipeline, "default").await, [2]);
    assert!(documents[0].contains("<loc>https://example.com/a</loc>"));
    assert!(!documents[0].contains("<loc>https://example.com/b</loc>"));
    assert_eq!(live_link_counts(&pipeline, "news").await, [1]);
}

#[tokio::test]
async fn test_resume_matches_single_run() {
    let sets: Vec<Value> = (0..20).map(|i| json!([format!("/p/{i}"), format!("/p/{}", i + 1), "/shared"])).collect();

    let db = memory().await;
    let single = pipeline(&db, ListProducer::with("default", sets.clone()), options(Some(4)));
    single.generate(None, Some(4)).await.unwrap();
    let expected = live_documents(&single, "default").await;
    assert_eq!(live_link_counts(&single, "default").await.iter().sum::<u32>(), 22);

    // A zero budget stops before the first item.
    let db = memory().await;
    let resumed = pipeline(&db, ListProducer::with("default", sets.clone()), options(Some(4)));
    let outcome = resumed.generate(Some(Duration::ZERO), Some(4)).await.unwrap();
    assert_eq!(outcome, GenerateOutcome::Suspended { remaining: 20 });
    assert!(resumed.load_stash().await.unwrap().is_some());
    assert!(resumed.generation_in_progress().await.unwrap());
    assert_eq!(resumed.generate(None, Some(4)).await.unwrap(), GenerateOutcome::Completed);
    assert_eq!(live_documents(&resumed, "default").await, expected);

    // Suspended part way through, several times over.
    let db = memory().await;
    let slow = pipeline(&db, ListProducer::slow("default", sets, Duration::from_millis(10)), options(Some(4)));
    let mut passes = 0;
    loop {
        passes += 1;
        assert!(passes < 200, "generation never completed");
        match slow.generate(Some(Duration::from_millis(45)), Some(4)).await.unwrap() {
            GenerateOutcome::Completed => break,
            GenerateOutcome::Suspended { remaining } => assert!(remaining > 0),
        }
    }
    assert!(passes > 1);
    assert_eq!(live_documents(&slow, "default").await, expected);
    assert!(!slow.generation_in_progress().await.unwrap());
}

#[tokio::test]
async fn test_progress_counters() {
    let db = memory().await;
    let producer = ListProducer::slow("default", sets(10, 1), Duration::from_millis(10));
    let pipeline = pipeline(&db, producer, options(None));
    assert_eq!(pipeline.progress().await.unwrap(), Progress::default());
    assert!(!pipeline.generation_in_progress().await.unwrap());

    assert_eq!(pipeline.rebuild_queue(None).await.unwrap(), 10);
    let progress = pipeline.progress().await.unwrap();
    assert_eq!(progress, Progress { initial: 10, remaining: 10, processed: 0, stashed: 0 });
    assert!(progress.in_progress());

    let outcome = pipeline.generate(Some(Duration::from_millis(35)), None).await.unwrap();
    let GenerateOutcome::Suspended { remaining } = outcome else {
        panic!("expected the pass to be suspended");
    };
    let progress = pipeline.progress().await.unwrap();
    assert_eq!(progress.remaining, remaining);
    assert_eq!(progress.processed + progress.remaining, 10);
    // Without a chunk size nothing is written before the end.
    assert_eq!(progress.stashed, progress.processed);

    pipeline.generate(None, None).await.unwrap();
    let progress = pipeline.progress().await.unwrap();
    assert_eq!(progress, Progress { initial: 10, remaining: 0, processed: 10, stashed: 0 });
}

#[tokio::test]
async fn test_live_content_survives_regeneration() {
    let db = memory().await;
    let producer = ListProducer::slow("default", sets(6, 2), Duration::from_millis(10));
    let pipeline = pipeline(&db, producer.clone(), options(Some(2)));
    pipeline.generate(None, Some(2)).await.unwrap();
    assert_eq!(live_link_counts(&pipeline, "default").await, [2; 6]);

    producer.set("default", sets(12, 2));
    pipeline.rebuild_queue(None).await.unwrap();
    let outcome = pipeline.generate(Some(Duration::from_millis(35)), Some(2)).await.unwrap();
    assert!(matches!(outcome, GenerateOutcome::Suspended { .. }));
    assert_eq!(pipeline.content().status("default").await.unwrap(), ContentStatus::PublishedAndRegenerating);
    assert_eq!(live_link_counts(&pipeline, "default").await, [2; 6]);

    pipeline.generate(None, Some(2)).await.unwrap();
    assert_eq!(live_link_counts(&pipeline, "default").await, [2; 12]);
    assert_eq!(pipeline.content().status("default").await.unwrap(), ContentStatus::Published);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readers_never_see_partial_publish() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::connect(dir.path().join("sitemap.sqlite")).await.unwrap();
    let producer = ListProducer::with("default", sets(30, 1));
    let pipeline = pipeline(&db, producer.clone(), options(Some(10)));
    pipeline.generate(None, Some(10)).await.unwrap();

    producer.set("default", sets(50, 1));
    let reader = ContentStorage::from(&db);
    let done = AtomicBool::new(false);
    let (outcome, observed) = tokio::join!(
        async {
            let outcome = pipeline.generate(None, Some(10)).await;
            done.store(true, Ordering::SeqCst);
            outcome
        },
        async {
            let mut observed = Vec::new();
            while !done.load(Ordering::SeqCst) {
                let chunks = reader.chunks("default", ChunkStatus::Live).await.unwrap();
                observed.push(chunks.iter().map(|chunk| chunk.link_count).sum::<u32>());
                tokio::task::yield_now().await;
            }
            observed
        },
    );
    assert_eq!(outcome.unwrap(), GenerateOutcome::Completed);
    assert!(observed.iter().all(|links| *links == 30 || *links == 50), "{observed:?}");
    assert_eq!(live_link_counts(&pipeline, "default").await, [10; 5]);
}

#[tokio::test]
async fn test_variant_without_work_units_is_removed() {
    let db = memory().await;
    let producer = ListProducer::with("default", sets(2, 2));
    let pipeline = pipeline(&db, producer.clone(), options(Some(10)));
    pipeline.generate(None, Some(10)).await.unwrap();
    assert_eq!(pipeline.content().status("default").await.unwrap(), ContentStatus::Published);

    producer.set("default", Vec::new());
    assert_eq!(pipeline.rebuild_queue(None).await.unwrap(), 0);
    assert_eq!(pipeline.content().status("default").await.unwrap(), ContentStatus::Unpublished);
    assert_eq!(pipeline.content().chunk_count("default", ChunkStatus::Live).await.unwrap(), 0);
    assert_eq!(pipeline.content().chunk_count("default", ChunkStatus::Staged).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failing_items_are_dropped() {
    let mut sets = sets(100, 1);
    sets[42] = json!("fail");
    sets[7] = json!("skip");
    sets[8] = json!({ "unexpected": true });
    let db = memory().await;
    let pipeline = pipeline(&db, ListProducer::with("default", sets), options(None));
    assert_eq!(pipeline.generate(None, None).await.unwrap(), GenerateOutcome::Completed);

    assert_eq!(live_link_counts(&pipeline, "default").await, [97]);
    assert_eq!(pipeline.progress().await.unwrap().remaining, 0);
}

#[tokio::test]
async fn test_items_for_unknown_producers_and_variants() {
    let db = memory().await;
    let pipeline = pipeline(&db, ListProducer::with("default", sets(3, 1)), options(None));
    pipeline.rebuild_queue(None).await.unwrap();
    SqliteQueue::from(&db)
        .enqueue(&[
            WorkUnit::new("default", "ghost", json!(["/ghost"])),
            WorkUnit::new("gone", ListProducer::ID, json!(["/gone"])),
        ])
        .await
        .unwrap();

    assert_eq!(pipeline.generate(None, None).await.unwrap(), GenerateOutcome::Completed);
    assert_eq!(live_link_counts(&pipeline, "default").await, [3]);
    assert_eq!(pipeline.progress().await.unwrap().remaining, 0);
}

#[tokio::test]
async fn test_lock_contention() {
    let db = memory().await;
    let pipeline = pipeline(&db, ListProducer::with("default", sets(3, 1)), options(None));
    let other = SqliteLock::from(&db);
    assert!(other.acquire(LOCK_ID, Duration::from_secs(60)).await.unwrap());

    let err = pipeline.generate(None, None).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::LockUnavailable));
    assert!(err.is_retryable());
    let err = pipeline.rebuild_queue(None).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::LockUnavailable));

    other.release(LOCK_ID).await.unwrap();
    assert_eq!(pipeline.generate(None, None).await.unwrap(), GenerateOutcome::Completed);
    // The pipeline let go of the lease once it was done.
    assert!(other.may_be_available(LOCK_ID).await.unwrap());
}

#[tokio::test]
async fn test_rebuild_selected_variants() {
    let db = memory().await;
    let producer = ListProducer::with("default", sets(3, 1));
    producer.set("news", sets(2, 1));
    let pipeline = pipeline(&db, producer, options(None));

    assert_eq!(pipeline.rebuild_queue(Some(&["news".to_string()])).await.unwrap(), 2);
    assert_eq!(pipeline.rebuild_queue(None).await.unwrap(), 5);
    let err = pipeline.rebuild_queue(Some(&["nope".to_string()])).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::UnknownVariant(id) if id == "nope"));
}

#[tokio::test]
async fn test_delete_queue() {
    let db = memory().await;
    let pipeline = pipeline(&db, ListProducer::with("default", sets(10, 2)), options(Some(2)));
    pipeline.rebuild_queue(None).await.unwrap();
    pipeline.generate(Some(Duration::ZERO), Some(2)).await.unwrap();
    assert!(pipeline.generation_in_progress().await.unwrap());

    pipeline.delete_queue().await.unwrap();
    assert_eq!(pipeline.progress().await.unwrap(), Progress::default());
    assert!(pipeline.content().chunks("default", ChunkStatus::Staged).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_hooks_alter_records() {
    let db = memory().await;
    let sets = vec![json!(["/a", "/drop", "/b"]), json!(["/c"])];
    let pipeline = pipeline(&db, ListProducer::with("default", sets), options(None)).with_hook(Arc::new(PriorityHook));
    pipeline.generate(None, None).await.unwrap();

    let documents = live_documents(&pipeline, "default").await;
    assert_eq!(live_link_counts(&pipeline, "default").await, [3]);
    assert!(!documents[0].contains("/drop"));
    assert_eq!(documents[0].matches("<priority>0.5</priority>").count(), 3);
}

#[tokio::test]
async fn test_stylesheet_reference() {
    let db = memory().await;
    let options = Options { stylesheet: Some("/sitemap.xsl".to_string()), ..options(Some(1)) };
    let pipeline = pipeline(&db, ListProducer::with("default", sets(2, 1)), options);
    pipeline.generate(None, Some(1)).await.unwrap();

    let pi = r#"<?xml-stylesheet type="text/xsl" href="/sitemap.xsl"?>"#;
    assert!(live_documents(&pipeline, "default").await.iter().all(|document| document.contains(pi)));
    let index = pipeline.content().index("default", ChunkStatus::Live).await.unwrap().unwrap();
    assert!(index.document.contains(pi));
}

#[tokio::test]
async fn test_rebuild_index() {
    let db = memory().await;
    let pipeline = pipeline(&db, ListProducer::with("default", sets(3, 1)), options(Some(1)));
    pipeline.generate(None, Some(1)).await.unwrap();

    let before = pipeline.content().index("default", ChunkStatus::Live).await.unwrap().unwrap();
    assert!(pipeline.rebuild_index("default", ChunkStatus::Live).await.unwrap());
    assert_eq!(pipeline.content().index("default", ChunkStatus::Live).await.unwrap().unwrap().document, before.document);
    assert!(!pipeline.rebuild_index("default", ChunkStatus::Staged).await.unwrap());
}

#[tokio::test]
async fn test_from_settings() {
    let db = memory().await;
    let settings = sitemap_config::Settings { base_url: "https://example.org/".to_string(), ..Default::default() };
    let pipeline = Pipeline::from_settings(&settings, &db).unwrap();
    assert_eq!(pipeline.run().await.unwrap(), GenerateOutcome::Completed);

    let documents = live_documents(&pipeline, "default").await;
    assert_eq!(documents.len(), 1);
    assert!(documents[0].contains("<loc>https://example.org/</loc>"));
    assert!(documents[0].contains("<changefreq>daily</changefreq>"));
    assert!(documents[0].contains(r#"href="/sitemap.xsl""#));
}

#[tokio::test]
async fn test_invalid_chunk_url_template() {
    let db = memory().await;
    let options = Options { chunk_url_template: "{{ base_url ".to_string(), ..options(None) };
    let registry = Registry::default();
    let err = Pipeline::new(registry, Stores::from(&db), options).err().unwrap();
    assert!(matches!(&*err, ErrorKind::Template));
}

#[tokio::test]
async fn test_failed_rebuild_leaves_no_partial_queue() {
    let db = memory().await;
    let producer = ListProducer::with("default", sets(10, 1));
    let options = Options { queue_batch_size: 3, ..options(None) };
    let pipeline = pipeline(&db, producer.clone(), options);
    pipeline.generate(None, None).await.unwrap();
    assert_eq!(live_link_counts(&pipeline, "default").await, [10]);

    let mut broken = sets(10, 1);
    broken[7] = json!("abort");
    producer.set("default", broken);
    let err = pipeline.rebuild_queue(None).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::Producer(id) if id == ListProducer::ID));
    let progress = pipeline.progress().await.unwrap();
    assert_eq!(progress, Progress::default());

    // The next pass rebuilds from scratch instead of publishing six links.
    assert!(pipeline.generate(None, None).await.is_err());
    assert_eq!(live_link_counts(&pipeline, "default").await, [10]);

    producer.set("default", sets(12, 1));
    assert_eq!(pipeline.generate(None, None).await.unwrap(), GenerateOutcome::Completed);
    assert_eq!(live_link_counts(&pipeline, "default").await, [12]);
}

#[tokio::test]
async fn test_undecodable_queue_item_is_dropped() {
    let db = memory().await;
    let pipeline = pipeline(&db, ListProducer::with("default", sets(5, 1)), options(None));
    pipeline.rebuild_queue(None).await.unwrap();
    sqlx::query("UPDATE sitemap_queue SET payload = '{\"bogus\":1}' WHERE item_id = (SELECT MIN(item_id) FROM sitemap_queue)")
        .execute(db.pool())
        .await
        .unwrap();

    assert_eq!(pipeline.generate(None, None).await.unwrap(), GenerateOutcome::Completed);
    assert_eq!(pipeline.progress().await.unwrap().remaining, 0);
    assert_eq!(live_link_counts(&pipeline, "default").await, [4]);
}
