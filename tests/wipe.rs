mod common;

use common::{COLL, DB};
use nppes_sync::config::DeleteTuning;
use nppes_sync::store::MemoryStore;
use nppes_sync::{BulkDeleter, Fields};
use serde_json::json;
use std::time::Duration;

fn seeded(count: usize) -> MemoryStore {
    let store = MemoryStore::new().with_latency(Duration::from_millis(20));
    store.seed_collection(DB, COLL, &["NPI"]);
    for i in 0..count {
        let mut fields = Fields::new();
        fields.insert("NPI".into(), json!(format!("{i:010}")));
        store.seed_document(DB, COLL, &format!("doc-{i:05}"), fields);
    }
    store
}

#[tokio::test(start_paused = true)]
async fn pages_and_paces_a_large_collection() -> anyhow::Result<()> {
    let store = seeded(2500);
    let tuning = DeleteTuning::default();

    let report = BulkDeleter::new(&store, tuning).delete_all(DB, COLL).await?;

    assert_eq!(report.pages, [1000, 1000, 500]);
    assert_eq!(report.deleted, 2500);
    assert_eq!(report.failed, 0);
    assert!(report.failed_ids.is_empty());
    assert!(store.documents(DB, COLL).is_empty());

    let stats = store.stats();
    assert_eq!(stats.list_sizes, [1000, 1000, 500, 0]);
    assert!(stats.max_concurrent_deletes <= 60);

    // sub-batch sizes in the order they ran: 16x60 + 40 per full page, 8x60 + 20 for the last
    let mut groups: Vec<(usize, bool)> = Vec::new();
    for page in [1000usize, 1000, 500] {
        let mut remaining = page;
        let mut first = true;
        while remaining > 0 {
            let size = remaining.min(60);
            groups.push((size, first));
            remaining -= size;
            first = false;
        }
    }
    assert_eq!(groups.iter().map(|g| g.0).sum::<usize>(), stats.delete_starts.len());

    let mut offset = 0;
    let mut previous = None;
    let mut paced_gaps = 0;
    for (size, first_in_page) in groups {
        let starts = &stats.delete_starts[offset..offset + size];
        offset += size;
        // a sub-batch fires all of its deletes together
        assert!(starts.iter().all(|s| *s == starts[0]));

        if let Some(prev) = previous {
            let gap = starts[0] - prev;
            if first_in_page {
                assert!(gap < tuning.rate_limit_delay, "no pause between pages");
            } else {
                assert!(gap >= tuning.rate_limit_delay, "gap {gap:?}");
                paced_gaps += 1;
            }
        }
        previous = Some(starts[0]);
    }
    assert_eq!(paced_gaps, 16 + 16 + 8);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_collection_is_a_single_listing() -> anyhow::Result<()> {
    let store = seeded(0);

    let report = BulkDeleter::new(&store, DeleteTuning::default())
        .delete_all(DB, COLL)
        .await?;

    assert!(report.pages.is_empty());
    assert_eq!(report.deleted, 0);
    assert_eq!(store.stats().list_sizes, [0]);
    Ok(())
}

fn small_pages() -> DeleteTuning {
    DeleteTuning {
        page_size: 4,
        batch_size: 2,
        rate_limit_delay: Duration::from_secs(1),
    }
}

#[tokio::test(start_paused = true)]
async fn failed_delete_is_attempted_once() -> anyhow::Result<()> {
    let store = seeded(10);
    store.fail_delete("doc-00000");

    let report = BulkDeleter::new(&store, small_pages()).delete_all(DB, COLL).await?;

    assert_eq!(report.deleted, 9);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_ids, ["doc-00000"]);
    assert_eq!(report.pages, [4, 4, 2]);
    assert_eq!(store.stats().document_deletes, 10);
    let left: Vec<String> = store.documents(DB, COLL).into_iter().map(|d| d.id).collect();
    assert_eq!(left, ["doc-00000"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failure_in_the_middle_of_a_page_is_skipped_later() -> anyhow::Result<()> {
    let store = seeded(10);
    store.fail_delete("doc-00003");

    let report = BulkDeleter::new(&store, small_pages()).delete_all(DB, COLL).await?;

    assert_eq!(report.deleted, 9);
    assert_eq!(report.failed, 1);
    assert_eq!(report.pages, [4, 4, 2]);
    assert_eq!(store.stats().list_sizes, [4, 4, 2, 0]);
    assert_eq!(store.documents(DB, COLL).len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn undeletable_first_page_does_not_block_the_rest() -> anyhow::Result<()> {
    let store = seeded(10);
    for i in 0..4 {
        store.fail_delete(&format!("doc-{i:05}"));
    }

    let report = BulkDeleter::new(&store, small_pages()).delete_all(DB, COLL).await?;

    assert_eq!(report.deleted, 6);
    assert_eq!(report.failed, 4);
    assert_eq!(
        report.failed_ids,
        ["doc-00000", "doc-00001", "doc-00002", "doc-00003"]
    );
    assert_eq!(store.stats().document_deletes, 10);
    assert_eq!(store.documents(DB, COLL).len(), 4);
    Ok(())
}
