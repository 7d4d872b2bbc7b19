use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ormlens_sql::{AnalysisCache, SqlExtractor, normalize};

fn make_sql(i: usize) -> String {
    format!("SELECT id, body, created_at FROM comments_{i} WHERE post_id = {i} ORDER BY created_at LIMIT 20")
}

fn bench_cache_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis_cache/hit");

    for prefill in [64, 256, 1024] {
        let cache = AnalysisCache::new();
        let sqls: Vec<String> = (0..prefill).map(make_sql).collect();
        cache.warm_up(sqls.iter().map(String::as_str));

        let hit_sql = make_sql(0);
        group.bench_with_input(BenchmarkId::from_parameter(prefill), &hit_sql, |b, sql| {
            b.iter(|| black_box(cache.classify_load(sql)));
        });
    }

    group.finish();
}

fn bench_warm_up(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis_cache/warm_up");

    // 1000 records, varying number of distinct texts.
    for unique in [1, 10, 100] {
        let log: Vec<String> = (0..1000).map(|i| make_sql(i % unique)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(unique), &log, |b, log| {
            b.iter(|| {
                let cache = AnalysisCache::new();
                black_box(cache.warm_up(log.iter().map(String::as_str)))
            });
        });
    }

    group.finish();
}

fn bench_uncached(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis_cache/uncached");
    let extractor = SqlExtractor::new();

    for complexity in ["simple", "complex", "fallback"] {
        let sql = match complexity {
            "simple" => "SELECT * FROM users WHERE id = ?".to_string(),
            "complex" => {
                "SELECT u.id, u.name, o.total, p.name AS product FROM users u JOIN orders o ON o.user_id = u.id JOIN order_items oi ON oi.order_id = o.id JOIN products p ON p.id = oi.product_id WHERE u.status = ? AND o.created_at > ? GROUP BY u.id, u.name, o.total, p.name ORDER BY o.total DESC LIMIT 50".to_string()
            }
            "fallback" => "SELECT * FROM `users` WHERE `id` = 1 LIMIT 0, 10".to_string(),
            _ => unreachable!(),
        };

        group.bench_with_input(BenchmarkId::new("facts", complexity), &sql, |b, sql| {
            b.iter(|| black_box(extractor.facts(sql)));
        });
        group.bench_with_input(BenchmarkId::new("normalize", complexity), &sql, |b, sql| {
            b.iter(|| black_box(normalize(sql)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cache_hit, bench_warm_up, bench_uncached);
criterion_main!(benches);
