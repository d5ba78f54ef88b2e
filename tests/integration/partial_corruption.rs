use super::common::Spectrum;
use chrono::TimeDelta;
use nodestash::codec::columnar;
use nodestash::codec::record::{broken_entries, BrokenEntry};
use nodestash::views::Placement;
use nodestash::{AttrValue, Container, DiskDict};

fn broken_below(prefix: &str) -> Vec<BrokenEntry> {
    let mut entries: Vec<BrokenEntry> = broken_entries()
        .into_iter()
        .filter(|entry| entry.path.starts_with(prefix))
        .collect();
    entries.sort_by(|a, b| (&a.path, &a.field).cmp(&(&b.path, &b.field)));
    entries
}

#[test]
fn test_corrupt_fields_fall_back_to_defaults() {
    let root = Container::in_memory().root();
    let node = root.child("corruption_suite").unwrap();
    let spectra: DiskDict<Spectrum> = DiskDict::open(Placement::Direct(node.clone())).unwrap();
    let original = Spectrum::sample("damaged", 3);
    spectra.set("damaged", &original).unwrap();
    spectra.set("healthy", &Spectrum::sample("healthy", 2)).unwrap();

    let damaged = node.child("damaged").unwrap();
    damaged
        .set_attr("exposure", AttrValue::Str("ninety seconds".into()))
        .unwrap();
    let peaks = damaged.child("peaks").unwrap();
    columnar::write_strings(&peaks, "rows", &["not a compound row".to_string()]).unwrap();

    let back = spectra.get("damaged").unwrap();
    assert_eq!(back.exposure, TimeDelta::zero());
    assert!(back.peaks.is_empty());
    assert_eq!(back.name, original.name);
    assert_eq!(back.acquired, original.acquired);
    assert_eq!(back.intensities, original.intensities);
    assert_eq!(back.traces, original.traces);

    assert_eq!(spectra.get("healthy").unwrap(), Spectrum::sample("healthy", 2));

    let damaged_path = damaged.path().to_string();
    assert_eq!(
        broken_below(node.path()),
        vec![
            BrokenEntry {
                path: damaged_path.clone(),
                field: "exposure".into(),
            },
            BrokenEntry {
                path: damaged_path,
                field: "peaks".into(),
            },
        ]
    );
}

#[test]
fn test_missing_type_attribute_is_not_recovered() {
    let root = Container::in_memory().root();
    let node = root.child("untyped_suite").unwrap();
    let spectra: DiskDict<Spectrum> = DiskDict::open(Placement::Direct(node.clone())).unwrap();
    spectra.set("entry", &Spectrum::sample("entry", 1)).unwrap();
    node.child("entry").unwrap().del_attr("type").unwrap();

    let err = spectra.get("entry").unwrap_err();
    assert!(matches!(err, nodestash::StoreError::Schema { .. }));
    assert!(broken_below(node.path()).is_empty());
}
