mod common;

use common::{providers, write_csv, write_csv_gz, COLL, DB, PROVIDER_HEADER};
use nppes_sync::schema::{provider_schema, INITIALIZED_FLAG};
use nppes_sync::store::MemoryStore;
use nppes_sync::{LogRefreshHook, RecordSource, RunOutcome, SyncError, SyncRun, Targets, Tuning};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

fn stored_keys(store: &MemoryStore) -> BTreeSet<String> {
    store
        .documents(DB, COLL)
        .into_iter()
        .filter_map(|d| d.fields.get("NPI").and_then(Value::as_str).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn parses_gzip_and_counts_rows() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let keys: Vec<String> = (0..20_000).map(|i| format!("{:010}", 1_000_000_000u64 + i)).collect();
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    let gz_path = write_csv_gz(dir.path(), "npidata_pfile.csv.gz", PROVIDER_HEADER, &providers(&keys)).await?;

    let source = RecordSource::new(&gz_path, "NPI");
    let mut stream = source.open().await?;
    assert_eq!(stream.columns(), PROVIDER_HEADER);

    let mut rows = 0u64;
    while let Some(record) = stream.next_record().await? {
        assert_eq!(record.len(), 3);
        rows += 1;
    }
    assert_eq!(rows, 20_000);
    assert_eq!(stream.rows_read(), 20_000);
    Ok(())
}

#[tokio::test]
async fn projection_keeps_key_first_and_drops_unknown_columns() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_csv(dir.path(), "p.csv", PROVIDER_HEADER, &providers(&["1", "2"]))?;

    let source = RecordSource::new(&path, "NPI")
        .with_columns(["Provider Last Name (Legal Name)", "Not In File", "NPI"]);
    let mut stream = source.open().await?;
    assert_eq!(stream.columns(), ["NPI", "Provider Last Name (Legal Name)"]);

    let first = stream.next_record().await?.expect("one row");
    assert_eq!(first.get("NPI"), Some(Some("1")));
    assert_eq!(first.get("Provider First Name"), None);
    Ok(())
}

#[tokio::test]
async fn missing_key_column_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_csv(dir.path(), "p.csv", &["Id", "Name"], &[vec!["1".into(), "x".into()]])?;

    let err = RecordSource::new(&path, "NPI").open().await.err().expect("no NPI header");
    assert!(matches!(err, SyncError::MissingHeader(ref h) if h == "NPI"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn duplicate_keys_in_one_file_are_written_once() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_csv(dir.path(), "p.csv", PROVIDER_HEADER, &providers(&["A", "B", "A", ""]))?;
    let store = Arc::new(MemoryStore::new());
    let sync = SyncRun::new(Arc::clone(&store), Targets::default(), Tuning::default());

    let outcome = sync.execute(&sync.source(&path), &LogRefreshHook).await?;
    let RunOutcome::Imported { provision, ingest } = outcome else {
        panic!("expected an import");
    };

    assert_eq!(provision.rebuilds, 0);
    assert_eq!(ingest.processed, 4);
    assert_eq!(ingest.queued, 2);
    assert_eq!(ingest.skipped, 1);
    assert_eq!(ingest.keyless, 1);
    assert_eq!(ingest.write.written, 2);
    assert_eq!(stored_keys(&store), BTreeSet::from(["A".to_string(), "B".to_string()]));

    // first occurrence wins
    let a = store
        .documents(DB, COLL)
        .into_iter()
        .find(|d| d.fields.get("NPI") == Some(&json!("A")))
        .expect("A stored");
    assert_eq!(a.fields.get("Provider_First_Name"), Some(&json!("FIRST0")));

    let flags = store.documents(DB, "IsInitialized");
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0].fields.get(INITIALIZED_FLAG), Some(&Value::Bool(true)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn second_run_hands_off_without_importing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_csv(dir.path(), "p.csv", PROVIDER_HEADER, &providers(&["A", "B"]))?;
    let store = Arc::new(MemoryStore::new());
    let sync = SyncRun::new(Arc::clone(&store), Targets::default(), Tuning::default());

    sync.execute(&sync.source(&path), &LogRefreshHook).await?;
    let creates = store.stats().document_creates;
    let attribute_creates = store.stats().attribute_creates;

    let outcome = sync.execute(&sync.source(&path), &LogRefreshHook).await?;
    assert_eq!(outcome, RunOutcome::AlreadyInitialized);
    assert_eq!(store.stats().document_creates, creates);
    assert_eq!(store.stats().attribute_creates, attribute_creates);
    assert_eq!(store.documents(DB, "IsInitialized").len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn keys_already_in_the_store_are_skipped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_csv(dir.path(), "p.csv", PROVIDER_HEADER, &providers(&["A", "B", "C"]))?;

    let store = Arc::new(MemoryStore::new());
    let schema = provider_schema();
    let names: Vec<&str> = schema.attribute_names().collect();
    store.seed_collection(DB, COLL, &names);
    for (id, npi) in [("doc-1", "B"), ("doc-2", "Z")] {
        let mut fields = nppes_sync::Fields::new();
        fields.insert("NPI".into(), json!(npi));
        store.seed_document(DB, COLL, id, fields);
    }

    let mut tuning = Tuning::default();
    // force several cache pages
    tuning.cache_page_size = 1;
    let sync = SyncRun::new(Arc::clone(&store), Targets::default(), tuning);

    let outcome = sync.execute(&sync.source(&path), &LogRefreshHook).await?;
    let RunOutcome::Imported { provision, ingest } = outcome else {
        panic!("expected an import");
    };
    assert!(provision.created.is_empty());
    assert_eq!(ingest.cached, 2);
    assert_eq!(ingest.skipped, 1);
    assert_eq!(ingest.write.written, 2);
    assert_eq!(
        stored_keys(&store),
        ["A", "B", "C", "Z"].into_iter().map(String::from).collect::<BTreeSet<_>>()
    );
    Ok(())
}
