use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tagqueue::media::{tags, MediaBackend, MediaFile, SidecarBackend};
use tagqueue::{
    Action, ActionServices, History, ItemFactory, ItemStatus, Queue, QueueConfig, QueueItem,
    QueueStore, RunSummary,
};

fn media(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, b"media").unwrap();
    path
}

fn names(queue: &Queue) -> Vec<String> {
    queue.snapshot().iter().map(|item| item.file_name()).collect()
}

#[tokio::test]
async fn test_one_item_completes_and_one_fails() {
    let dir = tempfile::tempdir().unwrap();
    let a_source = media(dir.path(), "a.m4v");
    let mut tagged = MediaFile::default();
    tagged.metadata.insert(tags::NAME.to_string(), "Alpha".to_string());
    SidecarBackend::new().write(&tagged, &a_source, &a_source).unwrap();

    let mut genre = BTreeMap::new();
    genre.insert("Genre".to_string(), "Drama".to_string());
    let a = QueueItem::new(&a_source).with_actions(vec![
        Action::SetOutputFilename {
            movie_format: "{Name}".to_string(),
            tv_format: "{TV Show}".to_string(),
        },
        Action::ApplyPreset {
            name: "drama".to_string(),
            tags: genre,
        },
    ]);
    // Nothing in the offline catalog matches, so the search fails
    let b = QueueItem::new(media(dir.path(), "Unknown.Film.2001.m4v")).with_actions(vec![Action::SearchMetadata {
        movie_language: "en".to_string(),
        tv_language: "en".to_string(),
    }]);

    let store = QueueStore::new(dir.path().join("queue.json"));
    let (queue, mut events) = Queue::new(store.clone(), vec![a, b], ActionServices::offline());

    assert!(queue.start());
    let summary = events.until_completed(|_| {}).await.unwrap();
    queue.wait_idle().await;

    assert_eq!(summary, RunSummary { completed: 1, failed: 1 });
    let items = queue.snapshot();
    assert_eq!(items[0].status, ItemStatus::Completed);
    assert_eq!(items[0].destination, dir.path().join("Alpha.m4v"));
    assert_eq!(items[1].status, ItemStatus::Failed);
    let failure = items[1].last_error.as_ref().unwrap();
    assert_eq!(failure.step, "search_metadata");

    let written = SidecarBackend::new().open(&items[0].destination).unwrap();
    assert_eq!(written.tag("Genre"), Some("Drama"));
    assert_eq!(written.tag(tags::NAME), Some("Alpha"));

    let reloaded = store.load();
    assert!(reloaded.error.is_none());
    assert_eq!(reloaded.items, items);
}

#[test]
fn test_remove_then_undo_restores_order() {
    let dir = tempfile::tempdir().unwrap();
    let (queue, _events) = Queue::new(
        QueueStore::new(dir.path().join("queue.json")),
        Vec::new(),
        ActionServices::offline(),
    );
    let mut history = History::new();
    let items: Vec<QueueItem> = ["item0", "item1", "item2"].iter().map(QueueItem::new).collect();
    let ids: Vec<_> = items.iter().map(|item| item.id).collect();

    history.insert(&queue, items, &[0, 1, 2]).unwrap();
    history.remove(&queue, &[1]).unwrap();
    assert_eq!(names(&queue), vec!["item0", "item2"]);

    history.undo(&queue).unwrap();
    assert_eq!(names(&queue), vec!["item0", "item1", "item2"]);
    let restored: Vec<_> = queue.snapshot().iter().map(|item| item.id).collect();
    assert_eq!(restored, ids);
}

#[test]
fn test_reload_puts_working_item_back_to_ready() {
    let dir = tempfile::tempdir().unwrap();
    let store = QueueStore::new(dir.path().join("queue.json"));
    let mut working = QueueItem::new("/media/a.mkv")
        .with_destination("/media/a.m4v")
        .with_actions(vec![Action::ClearMetadata, Action::Optimize]);
    working.transition(ItemStatus::Working).unwrap();
    store.save(&[working.clone()]).unwrap();

    let outcome = store.load();
    assert_eq!(outcome.recovered, 1);
    let reloaded = &outcome.items[0];
    assert_eq!(reloaded.status, ItemStatus::Ready);

    let mut expected = working;
    expected.status = ItemStatus::Ready;
    assert_eq!(*reloaded, expected);
}

#[tokio::test]
async fn test_added_folder_runs_with_configured_actions() {
    let dir = tempfile::tempdir().unwrap();
    let library = dir.path().join("library");
    fs::create_dir(&library).unwrap();
    media(&library, "clip.mkv");
    media(&library, "notes.txt");

    let config = QueueConfig {
        queue_file: dir.path().join("queue.json"),
        destination: Some(dir.path().join("out")),
        ..QueueConfig::default()
    };
    let sources = tagqueue::scan::candidates(&[library.clone()], &config);
    assert_eq!(sources, vec![library.join("clip.mkv")]);

    let mut config = config;
    config.actions.search_metadata = false;
    let items = ItemFactory::new(&config).create_items(&sources);
    let (queue, mut events) = Queue::new(
        QueueStore::new(&config.queue_file),
        Vec::new(),
        config.services().unwrap(),
    );
    queue.add(items, None).unwrap();

    assert!(queue.start());
    let summary = events.until_completed(|_| {}).await.unwrap();
    queue.wait_idle().await;

    assert_eq!(summary.completed, 1);
    let out = dir.path().join("out/clip.m4v");
    assert!(out.exists());
    assert!(SidecarBackend::new().open(&out).unwrap().optimized);
}
