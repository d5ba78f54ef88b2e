use super::common::Spectrum;
use nodestash::codec::columnar::{self, RAGGED_DATA, RAGGED_INDEX, START_INDEX, STOP_INDEX};
use nodestash::codec::record;
use nodestash::types::ArrayValue;
use nodestash::Container;

#[test]
fn test_rows_of_every_length_round_trip() {
    let root = Container::in_memory().root();
    let mut spectrum = Spectrum::sample("ragged", 0);
    spectrum.traces = (0..10)
        .map(|len| (0..len).map(|i| (len * 10 + i) as f64).collect())
        .collect();

    record::write(&root, "spectrum", &spectrum).unwrap();
    let back: Spectrum = record::read(&root, "spectrum").unwrap();
    assert_eq!(back.traces, spectrum.traces);
    assert_eq!(back.traces[0], Vec::<f64>::new());
    assert_eq!(back.traces[9].len(), 9);

    let group = root.child("spectrum").unwrap().child("traces").unwrap();
    let flat = columnar::read_array(&group, RAGGED_DATA).unwrap().unwrap();
    assert_eq!(flat.len(), 45);
    let mut index = columnar::read_columns_at(&group, RAGGED_INDEX).unwrap().unwrap();
    assert_eq!(index.len(), 10);
    let starts = index.take(START_INDEX);
    let stops = index.take(STOP_INDEX);
    let expected_starts: Vec<i64> = (0..10).map(|n| n * (n - 1) / 2).collect();
    let expected_stops: Vec<i64> = (0..10).map(|n| n * (n + 1) / 2).collect();
    assert!(matches!(starts, Some(columnar::Column::Scalar(ArrayValue::I64(ref s))) if *s == expected_starts));
    assert!(matches!(stops, Some(columnar::Column::Scalar(ArrayValue::I64(ref s))) if *s == expected_stops));
}

#[test]
fn test_empty_ragged_column() {
    let root = Container::in_memory().root();
    let mut spectrum = Spectrum::sample("empty", 0);
    spectrum.traces = Vec::new();
    record::write(&root, "spectrum", &spectrum).unwrap();
    let back: Spectrum = record::read(&root, "spectrum").unwrap();
    assert!(back.traces.is_empty());
}
