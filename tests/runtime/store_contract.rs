use chrono::Utc;
use devtunnel::runtime::state::{BackendHandle, TunnelRecord, TunnelStore};
use devtunnel::runtime::tunnel::TunnelMethod;
use devtunnel::TunnelError;
use tempfile::TempDir;

fn funnel_record(name: &str) -> TunnelRecord {
    TunnelRecord {
        name: name.into(),
        method: TunnelMethod::OverlayFunnel,
        local_port: 5173,
        public_url: "https://ci-box.tail0000.ts.net".into(),
        handle: BackendHandle::Funnel {
            funnel_port: 443,
            hostname: "ci-box.tail0000.ts.net".into(),
        },
        config_path: None,
        log_path: None,
        created_at: Utc::now(),
    }
}

#[test]
fn records_survive_reopening_the_store() {
    let tmp = TempDir::new().unwrap();
    let original = funnel_record("vite");
    let store = TunnelStore::open(tmp.path()).unwrap();
    store.put(&original).unwrap();
    drop(store);

    let reopened = TunnelStore::open(tmp.path()).unwrap();
    assert_eq!(reopened.get("vite").unwrap(), Some(original));
}

#[test]
fn put_replaces_and_list_is_sorted() {
    let tmp = TempDir::new().unwrap();
    let store = TunnelStore::open(tmp.path()).unwrap();
    for name in ["zeta", "alpha", "mid"] {
        store.put(&funnel_record(name)).unwrap();
    }
    let mut replacement = funnel_record("mid");
    replacement.local_port = 9000;
    store.put(&replacement).unwrap();

    let records = store.list().unwrap();
    let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    assert_eq!(records[1].local_port, 9000);
}

#[test]
fn delete_and_clear_report_what_they_removed() {
    let tmp = TempDir::new().unwrap();
    let store = TunnelStore::open(tmp.path()).unwrap();
    store.put(&funnel_record("a")).unwrap();
    store.put(&funnel_record("b")).unwrap();

    assert!(store.delete("a").unwrap());
    assert!(!store.delete("a").unwrap());
    assert_eq!(store.clear().unwrap(), 1);
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn invalid_names_never_touch_disk() {
    let tmp = TempDir::new().unwrap();
    let store = TunnelStore::open(tmp.path()).unwrap();
    let err = store.put(&funnel_record("../escape")).unwrap_err();
    assert!(matches!(err, TunnelError::InvalidName { .. }));
    assert!(!tmp.path().join("escape.json").exists());
}
