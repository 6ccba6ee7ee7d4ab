//! Performance benchmarks for the hot paths of the server

use server::{AdmissionGate, ClientRegistry};
use shared::{deduplicate, format_report, parse_values};
use std::net::SocketAddr;
use std::time::Instant;

/// Benchmarks deduplication of a large array with many repeats
#[test]
fn benchmark_deduplicate() {
    let values: Vec<f64> = (0..100_000).map(|i| (i % 1000) as f64 * 0.25).collect();

    let start = Instant::now();
    let unique = deduplicate(&values);
    let duration = start.elapsed();

    println!(
        "Deduplicate: {} values -> {} unique in {:?}",
        values.len(),
        unique.len(),
        duration
    );

    assert_eq!(unique.len(), 1000);
    // Should complete well under a second even in debug builds
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks parsing and formatting a request of maximum size
#[test]
fn benchmark_parse_and_format() {
    let request = (0..800)
        .map(|i| (i % 37).to_string())
        .collect::<Vec<_>>()
        .join(" ");
    assert!(request.len() < shared::MAX_REQUEST_BYTES);

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let values = parse_values(&request).unwrap();
        let unique = deduplicate(&values);
        let _ = format_report(&values, &unique);
    }

    let duration = start.elapsed();
    println!(
        "Parse + deduplicate + format: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 5000);
}

/// Benchmarks uncontended permit acquire/release cycles
#[test]
fn benchmark_gate_cycles() {
    let gate = AdmissionGate::new(4);
    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let permit = gate.try_acquire().unwrap();
        permit.release();
    }

    let duration = start.elapsed();
    println!(
        "Gate acquire/release: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(gate.available_permits(), 4);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks register/deregister churn on the client registry
#[test]
fn benchmark_registry_churn() {
    let registry = ClientRegistry::new();
    let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
    let iterations = 50_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let id = registry.register(addr);
        registry.deregister(id);
    }

    let duration = start.elapsed();
    println!(
        "Registry churn: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(registry.is_empty());
    assert_eq!(registry.total_served(), iterations as u64);
    assert!(duration.as_millis() < 2000);
}
