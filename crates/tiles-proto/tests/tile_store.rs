use tiles_proto::protocol::Tile;
use tiles_proto::store::TileStore;
use tempfile::TempDir;

fn store_in(dir: &TempDir) -> TileStore {
    TileStore::new(dir.path().join("nested").join("tiles.json"))
}

#[tokio::test]
async fn missing_file_loads_as_empty() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    assert!(store.load().await.is_empty());
}

#[tokio::test]
async fn empty_and_corrupt_files_load_as_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiles.json");
    let store = TileStore::new(path.clone());

    std::fs::write(&path, "").unwrap();
    assert!(store.load().await.is_empty());

    std::fs::write(&path, "[{\"label\": ").unwrap();
    assert!(store.load().await.is_empty());
}

#[tokio::test]
async fn save_then_load_preserves_order_and_unicode() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let tiles = vec![
        Tile::new("Café", "cafe.example", "/static/icons/cafe.example.png"),
        Tile::new("Router", "http://192.168.1.1", ""),
    ];
    store.save(&tiles).await.unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains("Café"));
    assert!(raw.contains("\n  {"));
    assert!(!dir.path().join("nested").join("tiles.json.tmp").exists());

    assert_eq!(store.load().await, tiles);
}

#[tokio::test]
async fn remove_drops_every_duplicate() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    store
        .save(&[
            Tile::new("One", "dup.example", ""),
            Tile::new("Keep", "keep.example", ""),
            Tile::new("Two", "dup.example", ""),
        ])
        .await
        .unwrap();

    assert_eq!(store.remove_url("dup.example").await.unwrap(), 2);
    let tiles = store.load().await;
    assert_eq!(tiles, vec![Tile::new("Keep", "keep.example", "")]);

    assert_eq!(store.remove_url("absent.example").await.unwrap(), 0);
    assert_eq!(store.load().await.len(), 1);
}

#[tokio::test]
async fn edit_touches_only_first_match() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    store
        .save(&[
            Tile::new("First", "same.example", ""),
            Tile::new("Second", "same.example", ""),
        ])
        .await
        .unwrap();

    let matched = store
        .edit_first("same.example", |t| t.label = "Edited".to_string())
        .await
        .unwrap();
    assert!(matched);

    let tiles = store.load().await;
    assert_eq!(tiles[0].label, "Edited");
    assert_eq!(tiles[1].label, "Second");
}

#[tokio::test]
async fn edit_without_match_leaves_tiles_unchanged() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let tiles = vec![Tile::new("Only", "only.example", "/static/icons/default.png")];
    store.save(&tiles).await.unwrap();

    let matched = store
        .edit_first("nope.example", |t| t.label = "Changed".to_string())
        .await
        .unwrap();
    assert!(!matched);
    assert_eq!(store.load().await, tiles);
}

#[tokio::test]
async fn concurrent_appends_are_not_lost() {
    let dir = TempDir::new().unwrap();
    let store = std::sync::Arc::new(store_in(&dir));

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .append(Tile::new(format!("t{}", i), format!("t{}.example", i), ""))
                .await
                .unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(store.load().await.len(), 16);
}
