use super::MarkerCache;
use crate::markers::Marker;
use tempfile::tempdir;

fn marker(id: i32) -> Marker {
    Marker {
        id,
        x: "19.94".to_string(),
        y: "50.06".to_string(),
        marker_type: 1,
        title: Some(format!("marker {id}")),
        volume: 40,
        audio_status: 1,
    }
}

#[test]
fn test_store_and_load_markers_ordered_by_id() {
    let dir = tempdir().unwrap();
    let cache = MarkerCache::open(dir.path().to_str().unwrap(), None).unwrap();

    for id in [12, -3, 5] {
        cache.store(&marker(id)).unwrap();
    }

    let ids: Vec<i32> = cache.load_all().unwrap().iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![-3, 5, 12]);
}

#[test]
fn test_store_overwrites_and_remove_deletes() {
    let dir = tempdir().unwrap();
    let cache = MarkerCache::open(dir.path().to_str().unwrap(), None).unwrap();

    cache.store(&marker(1)).unwrap();
    let mut renamed = marker(1);
    renamed.title = Some("renamed".to_string());
    cache.store(&renamed).unwrap();

    let loaded = cache.load_all().unwrap();
    assert_eq!(loaded, vec![renamed]);

    cache.remove(1).unwrap();
    assert!(cache.load_all().unwrap().is_empty());
}

#[test]
fn test_max_age_drops_stale_entries() {
    let dir = tempdir().unwrap();
    // a negative age puts the expiry in the future, so everything is stale
    let cache = MarkerCache::open(dir.path().to_str().unwrap(), Some(-10)).unwrap();
    cache.store(&marker(1)).unwrap();

    assert!(cache.load_all().unwrap().is_empty());
}
