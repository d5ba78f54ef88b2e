use super::common::Peak;
use nodestash::codec::columnar;
use nodestash::views::{Placement, MANIFEST};
use nodestash::{Container, DiskData, DiskList, FieldDecl};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Append(i64),
    Insert(usize, i64),
    Delete(usize),
    Clear,
    Save,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<i16>().prop_map(|v| Op::Append(v as i64)),
        2 => (0usize..12, any::<i16>()).prop_map(|(p, v)| Op::Insert(p, v as i64)),
        2 => (0usize..12).prop_map(Op::Delete),
        1 => Just(Op::Clear),
        1 => Just(Op::Save),
    ]
}

fn peak(value: i64) -> Peak {
    Peak::new(value as f64, 0.0, "p")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// The manifest always matches a plain Vec model and indices only grow
    #[test]
    fn test_list_tracks_model(ops in proptest::collection::vec(op(), 1..40), proxied in any::<bool>()) {
        let root = Container::in_memory().root();
        let data = DiskData::open(root.clone(), proxied, vec![FieldDecl::list("peaks")]).unwrap();
        let list: DiskList<Peak> = data.list("peaks").unwrap();
        let mut model: Vec<i64> = Vec::new();
        let mut last_index = -1i64;

        for op in ops {
            match op {
                Op::Append(v) => {
                    let index = list.append(&peak(v)).unwrap();
                    prop_assert!(index > last_index);
                    last_index = index;
                    model.push(v);
                }
                Op::Insert(position, v) => {
                    if position <= model.len() {
                        let index = list.insert(position, &peak(v)).unwrap();
                        prop_assert!(index > last_index);
                        last_index = index;
                        model.insert(position, v);
                    } else {
                        prop_assert!(list.insert(position, &peak(v)).is_err());
                    }
                }
                Op::Delete(position) => {
                    if position < model.len() {
                        list.delete(position).unwrap();
                        model.remove(position);
                    } else {
                        prop_assert!(list.delete(position).is_err());
                    }
                }
                Op::Clear => {
                    list.clear().unwrap();
                    model.clear();
                }
                Op::Save => {
                    data.save_to_disk().unwrap();
                }
            }

            prop_assert_eq!(list.max_index().unwrap(), last_index);
            let values: Vec<i64> = list
                .iter_values()
                .unwrap()
                .into_iter()
                .map(|p| p.position as i64)
                .collect();
            prop_assert_eq!(&values, &model);

            let indices = list.indices().unwrap();
            let mut unique = indices.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(unique.len(), indices.len());
        }

        data.save_to_disk().unwrap();
        let stored = root.child("peaks").unwrap();
        let manifest = columnar::read_strings(&stored, MANIFEST).unwrap().unwrap_or_default();
        prop_assert_eq!(manifest.len(), model.len());
        let mut children: Vec<String> = stored
            .children()
            .unwrap()
            .into_iter()
            .filter(|name| name != MANIFEST)
            .collect();
        children.sort();
        let mut expected = manifest.clone();
        expected.sort();
        prop_assert_eq!(children, expected);
    }
}

#[test]
fn test_direct_list_reopens_with_same_order() {
    let root = Container::in_memory().root();
    let node = root.child("ordered").unwrap();
    let list: DiskList<Peak> = DiskList::open(Placement::Direct(node.clone())).unwrap();
    list.extend(&[peak(1), peak(2), peak(3)]).unwrap();
    list.insert(0, &peak(0)).unwrap();

    let reopened: DiskList<Peak> = DiskList::open(Placement::Direct(node)).unwrap();
    let values: Vec<i64> = reopened
        .iter_values()
        .unwrap()
        .into_iter()
        .map(|p| p.position as i64)
        .collect();
    assert_eq!(values, vec![0, 1, 2, 3]);
    assert_eq!(reopened.indices().unwrap(), vec!["3", "0", "1", "2"]);
}
