use dwh_storage::{LocalStorage, StorageError, StorageProvider};

type TestResult<T> = anyhow::Result<T>;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|index| (index % 251) as u8).collect()
}

#[tokio::test]
async fn empty_inbox_lists_nothing() -> TestResult<()> {
    let root = tempfile::tempdir()?;
    std::fs::create_dir_all(root.path().join("in"))?;
    let storage = LocalStorage::new(root.path().join("in"), root.path().join("out"));
    assert!(storage.list_inbox().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn file_reaches_outbox_byte_identical() -> TestResult<()> {
    let root = tempfile::tempdir()?;
    let inbox = root.path().join("in");
    let outbox = root.path().join("out");
    std::fs::create_dir_all(&inbox)?;
    let original = payload(50_000);
    std::fs::write(inbox.join("acme_20240101.csv"), &original)?;

    let storage = LocalStorage::new(&inbox, &outbox);
    let files = storage.list_inbox().await;
    assert_eq!(files.len(), 1);
    let file = &files[0];
    assert_eq!(file.size, 50_000);

    storage.stage_for_load(file).await?;
    storage.reclaim_after_load(file).await?;
    storage.move_to_outbox(file).await?;

    assert!(!inbox.join("acme_20240101.csv").exists());
    assert_eq!(std::fs::read(outbox.join("acme_20240101.csv"))?, original);
    assert!(storage.list_inbox().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn logs_are_written_next_to_the_delivery() -> TestResult<()> {
    let root = tempfile::tempdir()?;
    let inbox = root.path().join("in");
    std::fs::create_dir_all(&inbox)?;
    std::fs::write(inbox.join("a.csv"), b"1")?;
    let storage = LocalStorage::new(&inbox, root.path().join("out"));
    let file = storage.list_inbox().await.remove(0);

    storage.write_log(&file.name, b"first\n").await?;
    storage.write_log(&file.name, b"second\n").await?;

    assert_eq!(storage.read_log(&file).await?, b"second\n");
    assert!(root.path().join("out").join("a.csv.log").is_file());
    Ok(())
}

#[tokio::test]
async fn moving_a_vanished_file_fails() -> TestResult<()> {
    let root = tempfile::tempdir()?;
    let inbox = root.path().join("in");
    std::fs::create_dir_all(&inbox)?;
    std::fs::write(inbox.join("gone.csv"), b"1")?;
    let storage = LocalStorage::new(&inbox, root.path().join("out"));
    let file = storage.list_inbox().await.remove(0);
    std::fs::remove_file(inbox.join("gone.csv"))?;

    let result = storage.move_to_outbox(&file).await;
    assert!(matches!(
        result,
        Err(StorageError::Io {
            operation: "move_to_outbox",
            ..
        })
    ));
    Ok(())
}
