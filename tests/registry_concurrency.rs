//! Concurrency tests for the shortcode registry
//!
//! These tests hammer a shared registry from many tasks and threads and check
//! that creation never hands out a duplicate code and that no click is lost.

use std::collections::HashSet;
use std::sync::Arc;
use tinylink::models::{NewLink, Visit};
use tinylink::registry::{CodeGenerator, Registry, RegistryError};
use tinylink::telemetry::Telemetry;

fn create_test_registry() -> Arc<Registry> {
    Arc::new(Registry::default().with_telemetry(Telemetry::disabled()))
}

fn visit(i: usize) -> Visit {
    Visit {
        referrer: None,
        source_address: format!("10.0.{}.{}", i / 256, i % 256),
    }
}

/// Always proposes the same handful of codes, forcing collisions.
struct NarrowGenerator;

impl CodeGenerator for NarrowGenerator {
    fn generate(&self) -> String {
        use rand::RngExt;
        let n: u8 = rand::rng().random_range(0..64);
        format!("c{n}")
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_generated_codes_are_distinct() {
    let registry = create_test_registry();

    let mut handles = vec![];
    for i in 0..200 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry.create(NewLink::new(format!("https://example.com/{i}")))
        }));
    }

    let mut codes = HashSet::new();
    for handle in handles {
        let created = handle.await.unwrap().expect("creation should succeed");
        assert!(codes.insert(created.code), "duplicate code handed out");
    }

    assert_eq!(codes.len(), 200);
    assert_eq!(registry.len(), 200);

    // Every code resolves, each for the first time.
    for (i, code) in codes.iter().enumerate() {
        assert_eq!(registry.stats(code).unwrap().click_count, 0);
        registry.resolve(code, visit(i)).unwrap();
        assert_eq!(registry.stats(code).unwrap().click_count, 1);
    }
}

#[test]
fn test_colliding_generator_never_overwrites() {
    let registry = Arc::new(
        Registry::default()
            .with_generator(Arc::new(NarrowGenerator))
            .with_telemetry(Telemetry::disabled()),
    );

    // 64 possible codes shared by 8 threads creating 8 links each.
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                scope.spawn(move || {
                    (0..8)
                        .map(|i| {
                            let url = format!("https://example.com/{t}/{i}");
                            registry.create(NewLink::new(url.clone())).map(|c| (c.code, url))
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let mut seen = HashSet::new();
    for result in results {
        let (code, url) = result.expect("a free code exists for every link");
        assert!(seen.insert(code.clone()));
        assert_eq!(registry.stats(&code).unwrap().original_url, url);
    }
    assert_eq!(registry.len(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requested_code_single_winner() {
    let registry = create_test_registry();

    let mut handles = vec![];
    for i in 0..10 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry.create(
                NewLink::new(format!("https://example.com/{i}")).shortcode("same_code"),
            )
        }));
    }

    let mut success_count = 0;
    let mut conflict_count = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => success_count += 1,
            Err(RegistryError::CodeConflict(code)) => {
                assert_eq!(code, "same_code");
                conflict_count += 1;
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    assert_eq!(success_count, 1, "Exactly one creation should succeed");
    assert_eq!(conflict_count, 9, "All others should conflict");
    assert_eq!(registry.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clicks_are_not_lost() {
    let registry = create_test_registry();
    registry
        .create(NewLink::new("https://example.com/hot").shortcode("hot"))
        .unwrap();

    let mut handles = vec![];
    for i in 0..500 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move { registry.resolve("hot", visit(i)) }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "https://example.com/hot");
    }

    let stats = registry.stats("hot").unwrap();
    assert_eq!(stats.click_count, 500);
    assert_eq!(stats.click_events.len(), 500);

    let sources: HashSet<_> = stats
        .click_events
        .iter()
        .map(|e| e.source_address.clone())
        .collect();
    assert_eq!(sources.len(), 500);

    // Events are appended in the order they were recorded.
    assert!(stats
        .click_events
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn test_stats_readers_see_consistent_records() {
    let registry = create_test_registry();
    registry
        .create(NewLink::new("https://example.com").shortcode("busy"))
        .unwrap();

    std::thread::scope(|scope| {
        for t in 0..4 {
            let registry = Arc::clone(&registry);
            scope.spawn(move || {
                for i in 0..250 {
                    registry.resolve("busy", visit(t * 250 + i)).unwrap();
                }
            });
        }
        for _ in 0..2 {
            let registry = Arc::clone(&registry);
            scope.spawn(move || {
                for _ in 0..500 {
                    let stats = registry.stats("busy").unwrap();
                    assert_eq!(stats.click_count as usize, stats.click_events.len());
                }
            });
        }
    });

    assert_eq!(registry.stats("busy").unwrap().click_count, 1000);
}
