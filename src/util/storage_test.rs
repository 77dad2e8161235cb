use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_FILE: AtomicU32 = AtomicU32::new(0);

fn temp_path(label: &str) -> PathBuf {
    let n = NEXT_FILE.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir()
        .join(format!("chatdesk-storage-{}-{n}", std::process::id()))
        .join(format!("{label}.json"))
}

fn bot(id: i64, name: &str) -> Chatbot {
    Chatbot {
        id,
        name: name.to_owned(),
        description: Some("helps".to_owned()),
        system_prompt: "be kind".to_owned(),
        is_active: true,
        settings: None,
        created_at: None,
        updated_at: None,
    }
}

#[test]
fn memory_storage_round_trips_selected_chatbot() {
    let storage = MemoryStorage::new();
    assert!(load_selected_chatbot(&storage).is_none());

    save_selected_chatbot(&storage, &bot(7, "Docs")).unwrap();
    let loaded = load_selected_chatbot(&storage).unwrap();
    assert_eq!(loaded.id, 7);
    assert_eq!(loaded.name, "Docs");

    storage.remove_item(SELECTED_CHATBOT_KEY).unwrap();
    assert!(load_selected_chatbot(&storage).is_none());
}

#[test]
fn unparsable_record_reads_as_absent() {
    let storage = MemoryStorage::new();
    storage.set_item(SELECTED_CHATBOT_KEY, "{not json").unwrap();
    assert!(load_selected_chatbot(&storage).is_none());

    storage.set_item(SELECTED_CHATBOT_KEY, r#"{"name":"no id"}"#).unwrap();
    assert!(load_selected_chatbot(&storage).is_none());
}

#[test]
fn file_storage_persists_across_instances() {
    let path = temp_path("persist");
    {
        let storage = FileStorage::new(&path);
        save_selected_chatbot(&storage, &bot(3, "Sales")).unwrap();
        storage.set_item("other", "1").unwrap();
    }

    let reopened = FileStorage::new(&path);
    assert_eq!(load_selected_chatbot(&reopened).map(|b| b.id), Some(3));
    assert_eq!(reopened.get_item("other").as_deref(), Some("1"));

    reopened.remove_item(SELECTED_CHATBOT_KEY).unwrap();
    assert!(load_selected_chatbot(&reopened).is_none());
    assert_eq!(reopened.get_item("other").as_deref(), Some("1"));

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn file_storage_missing_or_corrupt_file_is_empty() {
    let path = temp_path("corrupt");
    let storage = FileStorage::new(&path);
    assert!(storage.get_item(SELECTED_CHATBOT_KEY).is_none());
    storage.remove_item(SELECTED_CHATBOT_KEY).unwrap();

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "garbage").unwrap();
    assert!(load_selected_chatbot(&storage).is_none());

    save_selected_chatbot(&storage, &bot(1, "Fresh")).unwrap();
    assert_eq!(load_selected_chatbot(&storage).map(|b| b.name), Some("Fresh".to_owned()));

    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
