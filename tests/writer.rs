mod common;

use common::{COLL, DB};
use nppes_sync::config::WriterTuning;
use nppes_sync::store::MemoryStore;
use nppes_sync::{BatchWriter, DocumentStore, Fields, PendingDocument};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

async fn store(latency: Duration) -> anyhow::Result<Arc<MemoryStore>> {
    let store = MemoryStore::new().with_latency(latency);
    store.create_database(DB, DB).await?;
    store.create_collection(DB, COLL, COLL).await?;
    Ok(Arc::new(store))
}

fn doc(i: usize) -> PendingDocument {
    let key = format!("K{i}");
    let mut fields = Fields::new();
    fields.insert("NPI".into(), json!(key));
    PendingDocument { key, fields }
}

#[tokio::test(start_paused = true)]
async fn batch_count_is_ceiling_of_records_over_batch_size() -> anyhow::Result<()> {
    for n in [1usize, 499, 500, 501, 1234, 5001] {
        let store = store(Duration::from_millis(5)).await?;
        let mut writer = BatchWriter::new(Arc::clone(&store), DB, COLL, WriterTuning::default());
        for i in 0..n {
            writer.submit(doc(i)).await?;
        }
        let report = writer.finish().await?;

        assert_eq!(report.batches, n.div_ceil(500), "n = {n}");
        assert!(report.largest_batch <= 500);
        assert_eq!(report.written, n as u64);
        assert_eq!(store.documents(DB, COLL).len(), n);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_writes_stay_under_slots_times_chunk() -> anyhow::Result<()> {
    let store = store(Duration::from_millis(50)).await?;
    let mut writer = BatchWriter::new(Arc::clone(&store), DB, COLL, WriterTuning::default());
    for i in 0..12_000 {
        writer.submit(doc(i)).await?;
        assert!(writer.in_flight() <= 10);
    }
    let report = writer.finish().await?;

    assert_eq!(report.batches, 24);
    assert_eq!(report.written, 12_000);
    let peak = store.stats().max_concurrent_creates;
    assert!(peak <= 10 * 50, "peak {peak}");
    assert!(peak > 50, "batches never overlapped: {peak}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn chunks_are_paced() -> anyhow::Result<()> {
    let store = store(Duration::from_millis(1)).await?;
    let tuning = WriterTuning {
        batch_size: 500,
        max_parallel_batches: 1,
        chunk_size: 50,
        chunk_delay: Duration::from_millis(200),
    };
    let mut writer = BatchWriter::new(Arc::clone(&store), DB, COLL, tuning);

    let started = Instant::now();
    for i in 0..120 {
        writer.submit(doc(i)).await?;
    }
    let report = writer.finish().await?;

    // three chunks, two pauses between them
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(400), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
    assert_eq!(report.batches, 1);
    assert_eq!(report.written, 120);
    assert_eq!(store.stats().max_concurrent_creates, 50);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_writes_are_reported_and_not_counted() -> anyhow::Result<()> {
    let store = store(Duration::from_millis(1)).await?;
    store.fail_writes_where("NPI", "K7");
    store.fail_writes_where("NPI", "K42");
    let tuning = WriterTuning {
        batch_size: 50,
        chunk_size: 10,
        ..WriterTuning::default()
    };
    let mut writer = BatchWriter::new(Arc::clone(&store), DB, COLL, tuning);
    for i in 0..120 {
        writer.submit(doc(i)).await?;
    }
    let mut report = writer.finish().await?;
    report.failed_keys.sort();

    assert_eq!(report.batches, 3);
    assert_eq!(report.written, 118);
    assert_eq!(report.failed, 2);
    assert_eq!(report.failed_keys, ["K42", "K7"]);
    assert_eq!(store.documents(DB, COLL).len(), 118);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn zero_sizes_are_clamped() -> anyhow::Result<()> {
    let store = store(Duration::ZERO).await?;
    let tuning = WriterTuning {
        batch_size: 0,
        max_parallel_batches: 0,
        chunk_size: 0,
        chunk_delay: Duration::ZERO,
    };
    let mut writer = BatchWriter::new(Arc::clone(&store), DB, COLL, tuning);
    for i in 0..3 {
        writer.submit(doc(i)).await?;
    }
    let report = writer.finish().await?;
    assert_eq!(report.batches, 3);
    assert_eq!(report.written, 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn single_chunk_batch_does_not_wait() -> anyhow::Result<()> {
    let store = store(Duration::ZERO).await?;
    let mut writer = BatchWriter::new(Arc::clone(&store), DB, COLL, WriterTuning::default());

    let started = Instant::now();
    for i in 0..10 {
        writer.submit(doc(i)).await?;
    }
    writer.finish().await?;
    assert!(started.elapsed() < WriterTuning::default().chunk_delay);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dead_letter_file_lists_failed_keys() -> anyhow::Result<()> {
    let store = store(Duration::ZERO).await?;
    store.fail_writes_where("NPI", "K3");
    let mut writer = BatchWriter::new(Arc::clone(&store), DB, COLL, WriterTuning::default());
    for i in 0..5 {
        writer.submit(doc(i)).await?;
    }
    let report = writer.finish().await?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("failed.txt");
    report.write_dead_letter(&path).await?;
    assert_eq!(std::fs::read_to_string(&path)?, "K3\n");

    let clean = nppes_sync::WriteReport::default();
    clean.write_dead_letter(&path).await?;
    assert_eq!(std::fs::read_to_string(&path)?, "");
    Ok(())
}
