use recall::{CacheKey, IterableCache, IterableCacheConfig, ToCacheKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Sentence {
    index: usize,
    text: String,
}

fn cache_in(root: &std::path::Path) -> IterableCache {
    IterableCache::new(IterableCacheConfig {
        root: root.to_path_buf(),
        ..IterableCacheConfig::default()
    })
    .unwrap()
}

#[test]
fn replay_matches_the_source_element_for_element() {
    let dir = tempdir().unwrap();
    let cache = cache_in(dir.path());
    let key = ("segment", "corpus-1").to_cache_key().unwrap();

    let source: Vec<Sentence> = (0..500)
        .map(|index| Sentence {
            index,
            text: format!("sentence {index}"),
        })
        .collect();

    let generator_runs = Arc::new(AtomicUsize::new(0));
    let runs = Arc::clone(&generator_runs);
    let expected = source.clone();

    let recorded: Vec<Sentence> = cache
        .fetch(&key, move || {
            runs.fetch_add(1, Ordering::SeqCst);
            source.into_iter()
        })
        .unwrap()
        .collect::<recall::Result<_>>()
        .unwrap();
    assert_eq!(recorded, expected);
    assert_eq!(generator_runs.load(Ordering::SeqCst), 1);

    // The replay path never re-invokes the generator.
    let replayed: Vec<Sentence> = cache
        .fetch::<Sentence, std::vec::IntoIter<Sentence>, _>(&key, || {
            panic!("generator must not rerun")
        })
        .unwrap()
        .collect::<recall::Result<_>>()
        .unwrap();
    assert_eq!(replayed, expected);
    assert_eq!(generator_runs.load(Ordering::SeqCst), 1);
}

#[test]
fn consumption_can_start_before_the_source_finishes() {
    let dir = tempdir().unwrap();
    let cache = cache_in(dir.path());
    let key = ("stream", "live").to_cache_key().unwrap();

    let mut stream = cache.fetch(&key, || (0..1000u64).map(|i| i * i)).unwrap();

    // Elements arrive one by one while recording is still in progress.
    assert_eq!(stream.next().unwrap().unwrap(), 0);
    assert_eq!(stream.next().unwrap().unwrap(), 1);
    assert_eq!(stream.next().unwrap().unwrap(), 4);
    assert!(stream.is_recording());
    assert!(!cache.contains_key(&key));

    // Exhaustion publishes the stream.
    let rest: Vec<u64> = stream.map(|r| r.unwrap()).collect();
    assert_eq!(rest.len(), 997);
    assert!(cache.contains_key(&key));
}

#[test]
fn interrupted_recordings_recover_on_the_next_fetch() {
    let dir = tempdir().unwrap();
    let cache = cache_in(dir.path());
    let key = ("resume", 1u8).to_cache_key().unwrap();

    {
        let mut stream = cache.fetch(&key, || 0..50u32).unwrap();
        for _ in 0..10 {
            stream.next().unwrap().unwrap();
        }
    } // dropped unexhausted

    assert!(!cache.contains_key(&key));

    let complete: Vec<u32> = cache
        .fetch(&key, || 0..50u32)
        .unwrap()
        .collect::<recall::Result<_>>()
        .unwrap();
    assert_eq!(complete, (0..50u32).collect::<Vec<_>>());
    assert!(cache.contains_key(&key));

    let stats = cache.stats();
    assert_eq!(stats.misses, 2);
}

#[test]
fn deleted_streams_are_recorded_anew() {
    let dir = tempdir().unwrap();
    let cache = cache_in(dir.path());
    let key = ("redo",).to_cache_key().unwrap();

    let _: Vec<u8> = cache
        .fetch(&key, || (0..5u8))
        .unwrap()
        .collect::<recall::Result<_>>()
        .unwrap();
    assert!(cache.contains_key(&key));

    cache.delete_key(&key).unwrap();
    assert!(!cache.contains_key(&key));

    let again: Vec<u8> = cache
        .fetch(&key, || (0..5u8))
        .unwrap()
        .collect::<recall::Result<_>>()
        .unwrap();
    assert_eq!(again, vec![0, 1, 2, 3, 4]);
}
