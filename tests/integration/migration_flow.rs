use super::common::Spectrum;
use nodestash::codec::record;
use nodestash::migration::{seconds_to_micros, stamp_version, stored_version};
use nodestash::{AttrValue, Container, Migrator, Node, SchemaVersion};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_legacy_container_is_upgraded_once() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store");
    let applied = Arc::new(Mutex::new(Vec::new()));

    let build = |applied: Arc<Mutex<Vec<&'static str>>>| {
        let mut migrator = Migrator::new();
        let log = applied.clone();
        migrator
            .register("1.1", move |root: &Node| {
                log.lock().push("1.1");
                seconds_to_micros(&["exposure"])(root)
            })
            .unwrap();
        let log = applied.clone();
        migrator
            .register("1.0", move |_: &Node| {
                log.lock().push("1.0");
                Ok(())
            })
            .unwrap();
        migrator
    };

    {
        let container = Container::open_sled(&path).unwrap();
        let root = container.root();
        record::write(&root, "legacy", &Spectrum::sample("legacy", 1)).unwrap();
        // Seconds-resolution exposure as written by older releases
        root.child("legacy")
            .unwrap()
            .set_attr("exposure", AttrValue::Float(1.5))
            .unwrap();
        container.flush().unwrap();
        assert_eq!(stored_version(&root).unwrap(), SchemaVersion::default());
    }

    {
        let container = Container::open_sled(&path).unwrap();
        let migrator = build(applied.clone());
        assert!(migrator.need_update(&stored_version(&container.root()).unwrap()));
        assert!(migrator.update(&container.root()).unwrap());
        assert_eq!(*applied.lock(), vec!["1.0", "1.1"]);

        let back: Spectrum = record::read(&container.root(), "legacy").unwrap();
        assert_eq!(back.exposure, Spectrum::sample("legacy", 1).exposure);
    }

    let container = Container::open_sled(&path).unwrap();
    assert_eq!(
        stored_version(&container.root()).unwrap(),
        SchemaVersion::new(1, 1, 0)
    );
    let migrator = build(applied.clone());
    assert!(!migrator.update(&container.root()).unwrap());
    assert_eq!(applied.lock().len(), 2);
}

#[test]
fn test_only_newer_steps_run() {
    let root = Container::in_memory().root();
    stamp_version(&root, &"2.0".parse().unwrap()).unwrap();
    let applied = Arc::new(Mutex::new(Vec::new()));
    let mut migrator = Migrator::new();
    for version in ["1.5", "2.0", "2.1", "3.0"] {
        let log = applied.clone();
        migrator
            .register(version, move |_: &Node| {
                log.lock().push(version);
                Ok(())
            })
            .unwrap();
    }

    assert!(migrator.update(&root).unwrap());
    assert_eq!(*applied.lock(), vec!["2.1", "3.0"]);
    assert_eq!(stored_version(&root).unwrap().to_string(), "3.0.0");
}
