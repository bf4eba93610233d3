use criterion::{Criterion, black_box, criterion_group, criterion_main};
use recall::{Cache, CacheKey, Codec, MemoryCache, ToCacheKey};

fn bench_key_digest(c: &mut Criterion) {
    let key = ("parse", "Der schnelle braune Fuchs", 42u64)
        .to_cache_key()
        .unwrap();
    c.bench_function("key_digest", |b| b.iter(|| black_box(&key).digest()));
}

fn bench_memory_hit(c: &mut Criterion) {
    let cache: MemoryCache<CacheKey, String> = MemoryCache::new(0);
    let key = ("hit",).to_cache_key().unwrap();
    cache.fetch(&key, || Ok(Some("value".to_string()))).unwrap();

    c.bench_function("memory_hit", |b| {
        b.iter(|| {
            cache
                .fetch(black_box(&key), || Ok(Some("value".to_string())))
                .unwrap()
        })
    });
}

fn bench_codec_roundtrip(c: &mut Criterion) {
    let codec = Codec::default();
    let tokens: Vec<String> = (0..256).map(|i| format!("token-{i}")).collect();
    let payload = codec.encode(&tokens).unwrap();

    c.bench_function("codec_encode", |b| {
        b.iter(|| codec.encode(black_box(&tokens)).unwrap())
    });
    c.bench_function("codec_decode", |b| {
        b.iter(|| codec.decode::<Vec<String>>(black_box(&payload)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_key_digest,
    bench_memory_hit,
    bench_codec_roundtrip
);
criterion_main!(benches);
