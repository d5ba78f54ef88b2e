use super::common::{Peak, Spectrum};
use nodestash::config::{BackendKind, StorageConfig};
use nodestash::{Container, DiskData, FieldDecl};
use tempfile::TempDir;

fn fields() -> Vec<FieldDecl> {
    vec![FieldDecl::dict("spectra"), FieldDecl::list("peaks")]
}

#[test]
fn test_records_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store");
    let mut annotated = Spectrum::sample("annotated", 4);
    annotated.note = Some("baseline corrected".to_string());

    {
        let container = Container::open_sled(&path).unwrap();
        let data = DiskData::direct(container.root(), fields()).unwrap();
        let spectra = data.dict::<Spectrum>("spectra").unwrap();
        spectra.set("plain", &Spectrum::sample("plain", 0)).unwrap();
        spectra.set("annotated", &annotated).unwrap();
        data.list::<Peak>("peaks")
            .unwrap()
            .extend(&[Peak::new(1.5, 9.0, "x"), Peak::new(2.5, 8.0, "y")])
            .unwrap();
        data.save_to_disk().unwrap();
    }

    let container = Container::open_sled(&path).unwrap();
    let data = DiskData::direct(container.root(), fields()).unwrap();
    let spectra = data.dict::<Spectrum>("spectra").unwrap();
    assert_eq!(spectra.keys().unwrap(), vec!["plain", "annotated"]);
    assert_eq!(spectra.get("annotated").unwrap(), annotated);
    assert_eq!(spectra.get("plain").unwrap(), Spectrum::sample("plain", 0));
    let peaks = data.list::<Peak>("peaks").unwrap();
    assert_eq!(peaks.max_index().unwrap(), 1);
    assert_eq!(peaks.get(1).unwrap(), Peak::new(2.5, 8.0, "y"));
}

#[test]
fn test_proxied_save_into_sled() {
    let temp = TempDir::new().unwrap();
    let config = StorageConfig {
        path: Some(temp.path().join("store")),
        backend: BackendKind::Sled,
        flush_every_ms: None,
        ..StorageConfig::default()
    };

    {
        let container = Container::open(&config).unwrap();
        let data = DiskData::open(container.root(), true, fields()).unwrap();
        let spectra = data.dict::<Spectrum>("spectra").unwrap();
        spectra.set("kept", &Spectrum::sample("kept", 1)).unwrap();
        assert!(data.save_to_disk().unwrap());
        spectra.set("unsaved", &Spectrum::sample("unsaved", 1)).unwrap();
    }

    let container = Container::open(&config).unwrap();
    let data = DiskData::direct(container.root(), fields()).unwrap();
    assert_eq!(
        data.dict::<Spectrum>("spectra").unwrap().keys().unwrap(),
        vec!["kept"]
    );
}
