//! Integration tests for the index layer

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use tempfile::TempDir;

    use crate::file::{FileHandle, PageCounters, PageNum};
    use crate::index::{
        IndexError, IndexManager, InternalNode, Key, MAX_KEY_SIZE, Node, ROOT_PAGE, read_leaf,
        read_node,
    };
    use crate::record::{Attribute, RecordId, Value};

    fn setup_test_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn open_index(dir: &TempDir, name: &str) -> (IndexManager, FileHandle, PathBuf) {
        let im = IndexManager::new();
        let path = dir.path().join(name);
        im.create_file(&path).unwrap();
        let mut handle = FileHandle::new();
        im.open_file(&path, &mut handle).unwrap();
        (im, handle, path)
    }

    fn int_key(i: i32) -> Vec<u8> {
        Value::Int(i).to_key_bytes(&Attribute::int("k")).unwrap()
    }

    fn real_key(r: f32) -> Vec<u8> {
        Value::Real(r).to_key_bytes(&Attribute::real("k")).unwrap()
    }

    fn varchar_key(s: &str) -> Vec<u8> {
        let attr = Attribute::varchar("k", s.len() as u32);
        Value::VarChar(s.to_string()).to_key_bytes(&attr).unwrap()
    }

    fn rid(n: u32) -> RecordId {
        RecordId::new(n, (n % 100) as u16)
    }

    fn scan_ints(
        im: &IndexManager,
        handle: &mut FileHandle,
        attr: &Attribute,
        low: Option<i32>,
        high: Option<i32>,
        low_inclusive: bool,
        high_inclusive: bool,
    ) -> Vec<i32> {
        let low = low.map(int_key);
        let high = high.map(int_key);
        im.scan(
            handle,
            attr,
            low.as_deref(),
            high.as_deref(),
            low_inclusive,
            high_inclusive,
        )
        .unwrap()
        .map(|entry| {
            let (_, key) = entry.unwrap();
            i32::from_le_bytes(key.try_into().unwrap())
        })
        .collect()
    }

    /// Walk the whole tree checking separator bounds, uniform leaf depth
    /// and that the leaf chain visits leaves in tree order
    fn check_tree(handle: &mut FileHandle, attr: &Attribute) -> usize {
        let mut leaves = Vec::new();
        check_subtree(handle, attr, ROOT_PAGE, None, None, 0, &mut leaves);

        let depth = leaves[0].1;
        assert!(leaves.iter().all(|&(_, d)| d == depth), "leaves at mixed depths");

        let mut prev: Option<PageNum> = None;
        let mut page_num = Some(leaves[0].0);
        let mut chain = Vec::new();
        let mut entries = 0;
        while let Some(current) = page_num {
            let leaf = read_leaf(handle, attr, current).unwrap();
            assert_eq!(leaf.prev, prev, "bad prev link on page {}", current);
            entries += leaf.len();
            chain.push(current);
            prev = Some(current);
            page_num = leaf.next;
        }
        let in_order: Vec<PageNum> = leaves.iter().map(|&(p, _)| p).collect();
        assert_eq!(chain, in_order);
        entries
    }

    fn check_subtree(
        handle: &mut FileHandle,
        attr: &Attribute,
        page_num: PageNum,
        low: Option<&Key>,
        high: Option<&Key>,
        depth: usize,
        leaves: &mut Vec<(PageNum, usize)>,
    ) {
        match read_node(handle, attr, page_num).unwrap() {
            Node::Leaf(leaf) => {
                assert!(leaf.keys.windows(2).all(|w| w[0] <= w[1]));
                for key in &leaf.keys {
                    assert!(low.is_none_or(|low| key >= low), "{} below bound", key);
                    assert!(high.is_none_or(|high| key <= high), "{} above bound", key);
                }
                leaves.push((page_num, depth));
            }
            Node::Internal(node) => {
                assert_eq!(node.children.len(), node.keys.len() + 1);
                assert!(node.keys.windows(2).all(|w| w[0] <= w[1]));
                for (i, &child) in node.children.iter().enumerate() {
                    let child_low = if i == 0 { low } else { Some(&node.keys[i - 1]) };
                    let child_high = node.keys.get(i).or(high);
                    check_subtree(handle, attr, child, child_low, child_high, depth + 1, leaves);
                }
            }
        }
    }

    fn root(handle: &mut FileHandle, attr: &Attribute) -> InternalNode {
        match read_node(handle, attr, ROOT_PAGE).unwrap() {
            Node::Internal(node) => node,
            Node::Leaf(_) => panic!("root must be internal"),
        }
    }

    #[test]
    fn test_fresh_index_layout() {
        let dir = setup_test_dir();
        let (im, mut handle, _) = open_index(&dir, "fresh.idx");
        let attr = Attribute::int("k");

        assert_eq!(handle.page_count().unwrap(), 2);
        assert_eq!(root(&mut handle, &attr), InternalNode::new(1));
        let leaf = read_leaf(&mut handle, &attr, 1).unwrap();
        assert!(leaf.is_empty());
        assert_eq!((leaf.prev, leaf.next), (None, None));

        let dump = im.dump(&mut handle, &attr).unwrap();
        assert_eq!(dump.to_json().unwrap(), r#"{"keys":[],"children":[{"keys":[]}]}"#);
        assert!(scan_ints(&im, &mut handle, &attr, None, None, true, true).is_empty());
    }

    #[test]
    fn test_create_existing_index_fails() {
        let dir = setup_test_dir();
        let (im, mut handle, path) = open_index(&dir, "dup.idx");
        assert!(matches!(im.create_file(&path), Err(IndexError::File(_))));

        im.close_file(&mut handle).unwrap();
        im.destroy_file(&path).unwrap();
        assert!(!path.exists());
        assert!(im.destroy_file(&path).is_err());
    }

    #[test]
    fn test_shuffled_inserts_scan_ascending() {
        let dir = setup_test_dir();
        let (im, mut handle, _) = open_index(&dir, "shuffled.idx");
        let attr = Attribute::int("k");

        let mut keys: Vec<i32> = (0..1000).collect();
        keys.shuffle(&mut StdRng::seed_from_u64(7));
        for &k in &keys {
            im.insert_entry(&mut handle, &attr, &int_key(k), rid(k as u32))
                .unwrap();
        }

        let scanned = scan_ints(&im, &mut handle, &attr, None, None, true, true);
        assert_eq!(scanned.len(), 1000);
        assert!(scanned.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(check_tree(&mut handle, &attr), 1000);

        // Each key's rid survives the splits
        let entries: Vec<(RecordId, Vec<u8>)> = im
            .scan(&mut handle, &attr, None, None, true, true)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for (found, key) in entries {
            let k = i32::from_le_bytes(key.try_into().unwrap());
            assert_eq!(found, rid(k as u32));
        }
    }

    #[test]
    fn test_leaf_split_updates_parent_and_links() {
        let dir = setup_test_dir();
        let (im, mut handle, _) = open_index(&dir, "split.idx");
        let attr = Attribute::int("k");

        // 12-byte entries: one leaf holds 340 of them
        for k in 0..340 {
            im.insert_entry(&mut handle, &attr, &int_key(k), rid(k as u32))
                .unwrap();
        }
        assert!(root(&mut handle, &attr).keys.is_empty());
        assert_eq!(handle.page_count().unwrap(), 2);

        im.insert_entry(&mut handle, &attr, &int_key(340), rid(340))
            .unwrap();
        let after = root(&mut handle, &attr);
        assert_eq!(after.keys, vec![Key::Int(170)]);
        assert_eq!(after.children, vec![1, 2]);

        let left = read_leaf(&mut handle, &attr, 1).unwrap();
        let right = read_leaf(&mut handle, &attr, 2).unwrap();
        assert_eq!(left.len(), 170);
        assert_eq!(right.len(), 171);
        assert_eq!((left.prev, left.next), (None, Some(2)));
        assert_eq!((right.prev, right.next), (Some(1), None));

        assert_eq!(im.search(&mut handle, &attr, &int_key(169)).unwrap(), vec![0, 1]);
        assert_eq!(im.search(&mut handle, &attr, &int_key(170)).unwrap(), vec![0, 2]);

        // Split the left leaf again: the new page goes between 1 and 2
        for k in 1..=171 {
            im.insert_entry(&mut handle, &attr, &int_key(-k), rid(1000 + k as u32))
                .unwrap();
        }
        let after = root(&mut handle, &attr);
        assert_eq!(after.keys.len(), 2);
        assert_eq!(after.children, vec![1, 3, 2]);

        let left = read_leaf(&mut handle, &attr, 1).unwrap();
        let middle = read_leaf(&mut handle, &attr, 3).unwrap();
        let right = read_leaf(&mut handle, &attr, 2).unwrap();
        assert_eq!(left.next, Some(3));
        assert_eq!((middle.prev, middle.next), (Some(1), Some(2)));
        assert_eq!(right.prev, Some(3));
        assert_eq!(check_tree(&mut handle, &attr), 512);

        let dump = im.dump(&mut handle, &attr).unwrap();
        assert_eq!(dump.keys.len(), 2);
        assert_eq!(dump.children.len(), 3);
        assert_eq!(dump.leaf_key_count(), 512);
    }

    #[test]
    fn test_root_split_grows_tree() {
        let dir = setup_test_dir();
        let (im, mut handle, path) = open_index(&dir, "tall.idx");
        let attr = Attribute::varchar("name", 1000);

        // 904-byte keys: four per leaf and four separators per internal node
        let name = |i: u32| format!("{:04}{}", i, "x".repeat(896));
        let mut ids: Vec<u32> = (0..60).collect();
        ids.shuffle(&mut StdRng::seed_from_u64(11));
        for &i in &ids {
            im.insert_entry(&mut handle, &attr, &varchar_key(&name(i)), rid(i))
                .unwrap();
        }

        let top = root(&mut handle, &attr);
        assert!(matches!(
            read_node(&mut handle, &attr, top.children[0]).unwrap(),
            Node::Internal(_)
        ));
        assert_eq!(check_tree(&mut handle, &attr), 60);

        // Survives reopening
        im.close_file(&mut handle).unwrap();
        im.open_file(&path, &mut handle).unwrap();

        let scanned: Vec<RecordId> = im
            .scan(&mut handle, &attr, None, None, true, true)
            .unwrap()
            .map(|entry| entry.unwrap().0)
            .collect();
        let expected: Vec<RecordId> = (0..60).map(rid).collect();
        assert_eq!(scanned, expected);

        for i in (0..60).filter(|i| i % 3 == 0) {
            im.delete_entry(&mut handle, &attr, &varchar_key(&name(i)), rid(i))
                .unwrap();
        }
        assert_eq!(check_tree(&mut handle, &attr), 40);
    }

    #[test]
    fn test_scan_bounds() {
        let dir = setup_test_dir();
        let (im, mut handle, _) = open_index(&dir, "bounds.idx");
        let attr = Attribute::int("k");

        let mut keys: Vec<i32> = (0..1000).collect();
        keys.shuffle(&mut StdRng::seed_from_u64(3));
        for &k in &keys {
            im.insert_entry(&mut handle, &attr, &int_key(k), rid(k as u32))
                .unwrap();
        }
        let mut scan = |low, high, li, hi| scan_ints(&im, &mut handle, &attr, low, high, li, hi);

        assert_eq!(scan(Some(10), Some(20), true, true), (10..=20).collect::<Vec<_>>());
        assert_eq!(scan(Some(10), Some(20), false, false), (11..20).collect::<Vec<_>>());
        assert_eq!(scan(Some(10), Some(20), false, true), (11..=20).collect::<Vec<_>>());
        assert_eq!(scan(None, Some(5), true, false), (0..5).collect::<Vec<_>>());
        assert_eq!(scan(Some(995), None, true, true), (995..1000).collect::<Vec<_>>());
        assert_eq!(scan(Some(300), Some(700), true, true).len(), 401);
        assert!(scan(Some(50), Some(40), true, true).is_empty());
        assert!(scan(Some(7), Some(7), false, true).is_empty());
        assert_eq!(scan(Some(7), Some(7), true, true), vec![7]);
        assert!(scan(Some(1000), None, true, true).is_empty());
        assert_eq!(scan(Some(-50), Some(1), true, true), vec![0, 1]);
    }

    #[test]
    fn test_duplicate_keys_across_leaves() {
        let dir = setup_test_dir();
        let (im, mut handle, _) = open_index(&dir, "dups.idx");
        let attr = Attribute::int("k");

        im.insert_entry(&mut handle, &attr, &int_key(5), rid(5000))
            .unwrap();
        for n in 0..1000 {
            im.insert_entry(&mut handle, &attr, &int_key(7), rid(n))
                .unwrap();
        }
        im.insert_entry(&mut handle, &attr, &int_key(9), rid(9000))
            .unwrap();
        im.insert_entry(&mut handle, &attr, &int_key(6), rid(6000))
            .unwrap();
        assert_eq!(check_tree(&mut handle, &attr), 1003);

        let sevens: HashSet<RecordId> = im
            .scan(&mut handle, &attr, Some(&int_key(7)), Some(&int_key(7)), true, true)
            .unwrap()
            .map(|entry| entry.unwrap().0)
            .collect();
        assert_eq!(sevens, (0..1000).map(rid).collect::<HashSet<_>>());

        assert_eq!(
            scan_ints(&im, &mut handle, &attr, Some(7), None, false, true),
            vec![9]
        );
        assert_eq!(
            scan_ints(&im, &mut handle, &attr, None, Some(7), true, false),
            vec![5, 6]
        );

        // Entries left of the separator are still found by delete
        im.delete_entry(&mut handle, &attr, &int_key(7), rid(3))
            .unwrap();
        im.delete_entry(&mut handle, &attr, &int_key(7), rid(999))
            .unwrap();
        assert!(matches!(
            im.delete_entry(&mut handle, &attr, &int_key(7), rid(3)),
            Err(IndexError::EntryNotFound { .. })
        ));
        let remaining = scan_ints(&im, &mut handle, &attr, Some(7), Some(7), true, true);
        assert_eq!(remaining.len(), 998);
    }

    #[test]
    fn test_delete_entries() {
        let dir = setup_test_dir();
        let (im, mut handle, _) = open_index(&dir, "delete.idx");
        let attr = Attribute::int("k");

        let mut keys: Vec<i32> = (0..500).collect();
        keys.shuffle(&mut StdRng::seed_from_u64(5));
        for &k in &keys {
            im.insert_entry(&mut handle, &attr, &int_key(k), rid(k as u32))
                .unwrap();
        }
        for k in (0..500).filter(|k| k % 2 == 0) {
            im.delete_entry(&mut handle, &attr, &int_key(k), rid(k as u32))
                .unwrap();
        }

        let odds: Vec<i32> = (0..500).filter(|k| k % 2 == 1).collect();
        assert_eq!(scan_ints(&im, &mut handle, &attr, None, None, true, true), odds);

        assert!(matches!(
            im.delete_entry(&mut handle, &attr, &int_key(4), rid(4)),
            Err(IndexError::EntryNotFound { .. })
        ));
        // Right key, wrong record
        assert!(matches!(
            im.delete_entry(&mut handle, &attr, &int_key(5), rid(6)),
            Err(IndexError::EntryNotFound { .. })
        ));
        assert!(matches!(
            im.delete_entry(&mut handle, &attr, &int_key(10_000), rid(1)),
            Err(IndexError::EntryNotFound { .. })
        ));

        // Emptied leaves stay in the chain and can be refilled
        for &k in &odds {
            im.delete_entry(&mut handle, &attr, &int_key(k), rid(k as u32))
                .unwrap();
        }
        assert!(scan_ints(&im, &mut handle, &attr, None, None, true, true).is_empty());
        assert_eq!(check_tree(&mut handle, &attr), 0);

        im.insert_entry(&mut handle, &attr, &int_key(42), rid(42))
            .unwrap();
        assert_eq!(scan_ints(&im, &mut handle, &attr, None, None, true, true), vec![42]);
    }

    #[test]
    fn test_varchar_keys() {
        let dir = setup_test_dir();
        let (im, mut handle, _) = open_index(&dir, "names.idx");
        let attr = Attribute::varchar("name", 20);

        for (n, name) in ["banana", "apple", "cherry", "app", ""].into_iter().enumerate() {
            im.insert_entry(&mut handle, &attr, &varchar_key(name), rid(n as u32))
                .unwrap();
        }

        let names = |handle: &mut FileHandle, low: Option<&str>| -> Vec<String> {
            let low = low.map(varchar_key);
            im.scan(handle, &attr, low.as_deref(), None, true, true)
                .unwrap()
                .map(|entry| {
                    let (_, key) = entry.unwrap();
                    String::from_utf8(key[4..].to_vec()).unwrap()
                })
                .collect()
        };
        assert_eq!(names(&mut handle, None), vec!["", "app", "apple", "banana", "cherry"]);
        assert_eq!(names(&mut handle, Some("b")), vec!["banana", "cherry"]);

        let dump = im.dump(&mut handle, &attr).unwrap();
        assert_eq!(dump.children[0].keys[1], "app:[(3,3)]");
    }

    #[test]
    fn test_real_keys() {
        let dir = setup_test_dir();
        let (im, mut handle, _) = open_index(&dir, "reals.idx");
        let attr = Attribute::real("score");

        for (n, r) in [3.25f32, -1e6, 0.0, 1e6, -5.5].into_iter().enumerate() {
            im.insert_entry(&mut handle, &attr, &real_key(r), rid(n as u32))
                .unwrap();
        }

        let scanned: Vec<f32> = im
            .scan(&mut handle, &attr, Some(&real_key(-5.5)), Some(&real_key(3.25)), false, true)
            .unwrap()
            .map(|entry| f32::from_le_bytes(entry.unwrap().1.try_into().unwrap()))
            .collect();
        assert_eq!(scanned, vec![0.0, 3.25]);
    }

    #[test]
    fn test_rejected_keys() {
        let dir = setup_test_dir();
        let (im, mut handle, _) = open_index(&dir, "reject.idx");

        let int = Attribute::int("k");
        assert!(matches!(
            im.insert_entry(&mut handle, &int, &[1, 2, 3], rid(1)),
            Err(IndexError::MalformedKey(_))
        ));

        let text = Attribute::varchar("text", 2000);
        let long = "z".repeat(1500);
        assert!(matches!(
            im.insert_entry(&mut handle, &text, &varchar_key(&long), rid(1)),
            Err(IndexError::KeyTooLarge { size: 1504, max: MAX_KEY_SIZE })
        ));
        assert!(matches!(
            im.scan(&mut handle, &int, Some(&[0u8][..]), None, true, true),
            Err(IndexError::MalformedKey(_))
        ));
    }

    #[test]
    fn test_counters() {
        let dir = setup_test_dir();
        let (im, mut handle, _) = open_index(&dir, "counters.idx");
        let attr = Attribute::int("k");
        assert_eq!(im.collect_counter_values(&handle), PageCounters::default());

        im.insert_entry(&mut handle, &attr, &int_key(1), rid(1))
            .unwrap();
        let counters = im.collect_counter_values(&handle);
        assert_eq!(
            counters,
            PageCounters {
                reads: 3,
                writes: 1,
                appends: 0,
            }
        );

        // A fresh handle starts from zero
        let mut other = FileHandle::new();
        im.open_file(handle.path().unwrap().to_path_buf(), &mut other)
            .unwrap();
        assert_eq!(im.collect_counter_values(&other), PageCounters::default());
    }
}
