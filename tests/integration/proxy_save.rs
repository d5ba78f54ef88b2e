use super::common::{Peak, Spectrum};
use nodestash::codec::columnar;
use nodestash::views::{COLLECTION_ATTR, DIRTY_ATTR, MANIFEST};
use nodestash::{Container, DiskData, FieldDecl};

fn fields() -> Vec<FieldDecl> {
    vec![FieldDecl::dict("spectra"), FieldDecl::list("peaks")]
}

#[test]
fn test_deleted_keys_leave_permanent_on_save() {
    let permanent = Container::in_memory().root();
    let scratch = Container::in_memory().root();
    let data = DiskData::proxied(permanent.clone(), scratch.clone(), fields()).unwrap();
    let spectra = data.dict::<Spectrum>("spectra").unwrap();

    for i in 0..10 {
        let key = i.to_string();
        spectra.set(&key, &Spectrum::sample(&key, i)).unwrap();
    }
    assert!(data.save_to_disk().unwrap());

    for i in (0..10).step_by(2) {
        spectra.delete(&i.to_string()).unwrap();
    }
    // Nothing permanent changes before the save
    assert_eq!(
        columnar::read_strings(&permanent.child("spectra").unwrap(), MANIFEST)
            .unwrap()
            .unwrap()
            .len(),
        10
    );
    assert!(data.save_to_disk().unwrap());

    let stored = permanent.child("spectra").unwrap();
    let manifest = columnar::read_strings(&stored, MANIFEST).unwrap().unwrap();
    assert_eq!(manifest, vec!["1", "3", "5", "7", "9"]);
    let mut children: Vec<String> = stored
        .children()
        .unwrap()
        .into_iter()
        .filter(|name| name != MANIFEST)
        .collect();
    children.sort();
    assert_eq!(children, vec!["1", "3", "5", "7", "9"]);
    assert_eq!(stored.str_attr(COLLECTION_ATTR).unwrap().as_deref(), Some("dict"));
    assert!(!stored.has_attr(DIRTY_ATTR).unwrap());
    assert!(scratch.children().unwrap().is_empty());

    assert_eq!(spectra.get("3").unwrap(), Spectrum::sample("3", 3));
    assert_eq!(spectra.keys().unwrap(), manifest);
}

#[test]
fn test_save_is_idempotent() {
    let permanent = Container::in_memory().root();
    let data = DiskData::open(permanent.clone(), true, fields()).unwrap();
    let peaks = data.list::<Peak>("peaks").unwrap();
    peaks.append(&Peak::new(1.0, 2.0, "a")).unwrap();
    peaks.append(&Peak::new(3.0, 4.0, "b")).unwrap();

    assert!(data.save_to_disk().unwrap());
    let first = permanent.child("peaks").unwrap();
    let first_keys = columnar::read_strings(&first, MANIFEST).unwrap();

    assert!(!data.save_to_disk().unwrap());
    assert!(!data.save_to_disk().unwrap());
    assert_eq!(columnar::read_strings(&first, MANIFEST).unwrap(), first_keys);
    assert_eq!(peaks.len().unwrap(), 2);
    assert_eq!(peaks.max_index().unwrap(), 1);
}

#[test]
fn test_direct_placement_writes_through() {
    let root = Container::in_memory().root();
    let data = DiskData::direct(root.clone(), fields()).unwrap();
    assert!(data.is_direct());
    data.dict::<Spectrum>("spectra")
        .unwrap()
        .set("only", &Spectrum::sample("only", 2))
        .unwrap();
    assert!(root.child("spectra").unwrap().has_child("only").unwrap());
    assert!(!data.save_to_disk().unwrap());
}
