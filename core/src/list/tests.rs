//! Scenario suite for the list repository over the record-engine adapter

use crate::domain::{AmountRecord, CurrencyPairRecord};
use crate::error::LedgerError;
use crate::list::node::{Direction, LinkedRecord, NodeKey};
use crate::list::repository::ListRepository;
use crate::list::store::{EngineNodeStore, NodeReadTxn, NodeStore, NodeWriteTxn};
use crate::storage::RecordEngine;
use crate::Config;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

fn amounts_store() -> (EngineNodeStore<AmountRecord>, ListRepository<AmountRecord>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let engine = Arc::new(RecordEngine::in_memory());
    let store = EngineNodeStore::attach(engine, "amounts").unwrap();
    (store, ListRepository::new())
}

fn amount(comment: &str) -> AmountRecord {
    AmountRecord::new(10.0, "EUR".to_string(), comment.to_string())
}

fn seed(
    store: &EngineNodeStore<AmountRecord>,
    repo: &ListRepository<AmountRecord>,
    comments: &[&str],
) -> Vec<NodeKey> {
    comments
        .iter()
        .map(|comment| repo.add_to_end(store, amount(comment)).unwrap())
        .collect()
}

fn comments(
    store: &EngineNodeStore<AmountRecord>,
    repo: &ListRepository<AmountRecord>,
) -> Vec<String> {
    repo.get_all(store, Direction::Ascending)
        .unwrap()
        .into_iter()
        .map(|(_, node)| node.comment)
        .collect()
}

/// Full store contents in store-native order, link fields included
fn dump<N: LinkedRecord, S: NodeStore<N>>(store: &S) -> BTreeMap<NodeKey, N> {
    let txn = store.begin_read().unwrap();
    let mut nodes = BTreeMap::new();
    txn.for_each(&mut |key, node| {
        nodes.insert(key, node);
        Ok(())
    })
    .unwrap();
    nodes
}

/// Assert the full list invariant set: unique head and tail, complete
/// symmetric chain, no dangling links, forward and reverse agree.
fn assert_valid_chain<N: LinkedRecord, S: NodeStore<N>>(store: &S) {
    let txn = store.begin_read().unwrap();
    let mut nodes = BTreeMap::new();
    txn.for_each(&mut |key, node| {
        nodes.insert(key, node);
        Ok(())
    })
    .unwrap();

    if nodes.is_empty() {
        assert_eq!(txn.first_node_key().unwrap(), NodeKey::NULLISH);
        assert_eq!(txn.last_node_key().unwrap(), NodeKey::NULLISH);
        return;
    }

    let heads: Vec<NodeKey> = nodes
        .iter()
        .filter(|(_, node)| node.prev_key().is_nullish())
        .map(|(key, _)| *key)
        .collect();
    let tails: Vec<NodeKey> = nodes
        .iter()
        .filter(|(_, node)| node.next_key().is_nullish())
        .map(|(key, _)| *key)
        .collect();

    assert_eq!(heads.len(), 1, "exactly one head");
    assert_eq!(tails.len(), 1, "exactly one tail");
    assert_eq!(txn.first_node_key().unwrap(), heads[0]);
    assert_eq!(txn.last_node_key().unwrap(), tails[0]);

    let mut forward = Vec::new();
    let mut key = heads[0];
    while !key.is_nullish() {
        assert!(forward.len() < nodes.len(), "chain has a cycle");
        let node = nodes.get(&key).expect("link points at a missing node");

        if !node.next_key().is_nullish() {
            let successor = nodes
                .get(&node.next_key())
                .expect("next link points at a missing node");
            assert_eq!(successor.prev_key(), key, "link symmetry");
        }

        forward.push(key);
        key = node.next_key();
    }
    assert_eq!(forward.len(), nodes.len(), "chain visits every node once");

    let mut backward = Vec::new();
    let mut key = tails[0];
    while !key.is_nullish() {
        assert!(backward.len() < nodes.len(), "reverse chain has a cycle");
        backward.push(key);
        key = nodes[&key].prev_key();
    }
    backward.reverse();
    assert_eq!(backward, forward, "reverse traversal is the exact reverse");
}

#[test]
fn get_all_on_empty_list() {
    let (store, repo) = amounts_store();

    assert!(repo.get_all(&store, Direction::Ascending).unwrap().is_empty());
    assert!(repo.get_all(&store, Direction::Descending).unwrap().is_empty());
    assert_valid_chain(&store);
}

#[test]
fn add_to_end_on_empty_list_has_sentinel_links() {
    let (store, repo) = amounts_store();

    let key = repo.add_to_end(&store, amount("lunch")).unwrap();

    let all = repo.get_all(&store, Direction::Ascending).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].0, key);
    assert!(all[0].1.prev_key().is_nullish());
    assert!(all[0].1.next_key().is_nullish());
    assert_valid_chain(&store);
}

#[test]
fn ascending_and_descending_are_exact_reverses() {
    let (store, repo) = amounts_store();
    seed(&store, &repo, &["a", "b", "c", "d", "e"]);

    let mut ascending: Vec<NodeKey> = repo
        .get_all(&store, Direction::Ascending)
        .unwrap()
        .into_iter()
        .map(|(key, _)| key)
        .collect();
    let descending: Vec<NodeKey> = repo
        .get_all(&store, Direction::Descending)
        .unwrap()
        .into_iter()
        .map(|(key, _)| key)
        .collect();

    ascending.reverse();
    assert_eq!(ascending, descending);
}

#[test]
fn append_keeps_insertion_order() {
    let (store, repo) = amounts_store();
    seed(&store, &repo, &["rent", "groceries", "fuel"]);

    assert_eq!(comments(&store, &repo), vec!["rent", "groceries", "fuel"]);
    assert_valid_chain(&store);
}

#[test]
fn move_up_on_head_is_a_noop() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b", "c"]);

    let before = dump(&store);
    repo.move_up(&store, keys[0]).unwrap();
    assert_eq!(dump(&store), before);
}

#[test]
fn move_down_on_tail_is_a_noop() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b", "c"]);

    let before = dump(&store);
    repo.move_down(&store, keys[2]).unwrap();
    assert_eq!(dump(&store), before);
}

#[test]
fn move_up_swaps_a_two_node_list() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b"]);
    let (a, b) = (keys[0], keys[1]);

    repo.move_up(&store, b).unwrap();

    let nodes = dump(&store);
    assert!(nodes[&b].prev_key().is_nullish());
    assert_eq!(nodes[&b].next_key(), a);
    assert_eq!(nodes[&a].prev_key(), b);
    assert!(nodes[&a].next_key().is_nullish());
    assert_eq!(comments(&store, &repo), vec!["b", "a"]);
    assert_valid_chain(&store);
}

#[test]
fn move_down_touches_only_the_affected_span() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b", "c", "d", "e", "f"]);
    let before = dump(&store);

    repo.move_down(&store, keys[2]).unwrap();

    assert_eq!(comments(&store, &repo), vec!["a", "b", "d", "c", "e", "f"]);
    assert_valid_chain(&store);

    // The ends of the list were not rewritten
    let after = dump(&store);
    assert_eq!(after[&keys[0]], before[&keys[0]]);
    assert_eq!(after[&keys[5]], before[&keys[5]]);
}

#[test]
fn delete_head_promotes_the_successor() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b", "c"]);

    repo.delete(&store, keys[0]).unwrap();

    let all = repo.get_all(&store, Direction::Ascending).unwrap();
    assert_eq!(all.len(), 2);
    assert!(!all.iter().any(|(key, _)| *key == keys[0]));
    assert_eq!(all[0].0, keys[1]);
    assert!(all[0].1.prev_key().is_nullish());
    assert_valid_chain(&store);
}

#[test]
fn delete_middle_and_tail() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b", "c", "d"]);

    repo.delete(&store, keys[1]).unwrap();
    assert_eq!(comments(&store, &repo), vec!["a", "c", "d"]);
    assert_valid_chain(&store);

    repo.delete(&store, keys[3]).unwrap();
    assert_eq!(comments(&store, &repo), vec!["a", "c"]);
    assert_valid_chain(&store);
}

#[test]
fn deleting_the_only_node_empties_the_list() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a"]);

    repo.delete(&store, keys[0]).unwrap();

    assert!(repo.get_all(&store, Direction::Ascending).unwrap().is_empty());
    assert_valid_chain(&store);
}

#[test]
fn place_after_self_is_always_a_noop() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b"]);

    let before = dump(&store);
    repo.place_after(&store, keys[1], keys[1]).unwrap();
    assert_eq!(dump(&store), before);

    // Even for a key that resolves to nothing
    repo.place_after(&store, NodeKey(99), NodeKey(99)).unwrap();
    assert_eq!(dump(&store), before);
}

#[test]
fn place_after_relocates_across_the_list() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b", "c", "d"]);

    repo.place_after(&store, keys[0], keys[2]).unwrap();

    assert_eq!(comments(&store, &repo), vec!["b", "c", "a", "d"]);
    assert_valid_chain(&store);
}

#[test]
fn place_after_onto_the_tail() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b", "c"]);

    repo.place_after(&store, keys[0], keys[2]).unwrap();

    assert_eq!(comments(&store, &repo), vec!["b", "c", "a"]);
    assert_valid_chain(&store);
}

#[test]
fn place_after_on_adjacent_nodes_keeps_order() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b", "c"]);

    // b already follows a
    repo.place_after(&store, keys[1], keys[0]).unwrap();

    assert_eq!(comments(&store, &repo), vec!["a", "b", "c"]);
    assert_valid_chain(&store);
}

#[test]
fn place_before_swaps_an_adjacent_pair() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b"]);

    repo.place_before(&store, keys[1], keys[0]).unwrap();

    assert_eq!(comments(&store, &repo), vec!["b", "a"]);
    assert_valid_chain(&store);
}

#[test]
fn place_before_relocates_across_the_list() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b", "c", "d"]);

    repo.place_before(&store, keys[3], keys[1]).unwrap();

    assert_eq!(comments(&store, &repo), vec!["a", "d", "b", "c"]);
    assert_valid_chain(&store);
}

#[test]
fn put_without_key_appends() {
    let (store, repo) = amounts_store();
    seed(&store, &repo, &["a", "b"]);

    repo.put(&store, amount("c"), None).unwrap();

    assert_eq!(comments(&store, &repo), vec!["a", "b", "c"]);
    assert_valid_chain(&store);
}

#[test]
fn put_with_key_overwrites_payload_in_place() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b", "c"]);
    let before = dump(&store);

    let mut replacement = amount("b2");
    replacement.value = 99.0;
    // Whatever links the caller hands over are ignored
    replacement.set_prev_key(NodeKey(77));
    replacement.set_next_key(NodeKey(78));

    repo.put(&store, replacement, Some(keys[1])).unwrap();

    let after = dump(&store);
    assert_eq!(after[&keys[1]].comment, "b2");
    assert_eq!(after[&keys[1]].value, 99.0);
    assert_eq!(after[&keys[1]].prev_key(), before[&keys[1]].prev_key());
    assert_eq!(after[&keys[1]].next_key(), before[&keys[1]].next_key());
    assert_eq!(comments(&store, &repo), vec!["a", "b2", "c"]);
    assert_valid_chain(&store);
}

#[test]
fn every_operation_on_a_missing_key_is_not_found_and_leaves_the_store_unchanged() {
    let (store, repo) = amounts_store();
    let keys = seed(&store, &repo, &["a", "b", "c"]);
    let missing = NodeKey(99);
    let before = dump(&store);

    let failures: Vec<crate::LedgerResult<()>> = vec![
        repo.delete(&store, missing),
        repo.move_up(&store, missing),
        repo.move_down(&store, missing),
        repo.place_after(&store, missing, keys[0]),
        repo.place_after(&store, keys[0], missing),
        repo.place_before(&store, missing, keys[0]),
        repo.put(&store, amount("x"), Some(missing)).map(|_| ()),
        repo.put(&store, amount("x"), Some(NodeKey::NULLISH)).map(|_| ()),
    ];

    for result in failures {
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    assert_eq!(dump(&store), before);
    assert_valid_chain(&store);
}

#[test]
fn migration_links_unordered_records_in_store_order() {
    let (store, repo) = amounts_store();

    // Records created before ordering existed: no valid links at all
    let mut txn = store.begin_write().unwrap();
    for comment in ["a", "b", "c", "d", "e"] {
        txn.create(&amount(comment)).unwrap();
    }
    txn.commit().unwrap();

    let mut txn = store.begin_write().unwrap();
    repo.link_nodes_in_store_order(&mut txn).unwrap();
    txn.commit().unwrap();

    assert_valid_chain(&store);
    let all = repo.get_all(&store, Direction::Ascending).unwrap();
    assert_eq!(all.len(), 5);

    // List order equals store-native enumeration order
    let mut store_order = Vec::new();
    store
        .begin_read()
        .unwrap()
        .for_each(&mut |key, _| {
            store_order.push(key);
            Ok(())
        })
        .unwrap();
    let list_order: Vec<NodeKey> = all.into_iter().map(|(key, _)| key).collect();
    assert_eq!(list_order, store_order);
}

#[test]
fn migration_of_an_empty_store_is_a_noop() {
    let (store, repo) = amounts_store();

    let mut txn = store.begin_write().unwrap();
    repo.link_nodes_in_store_order(&mut txn).unwrap();
    txn.commit().unwrap();

    assert!(repo.get_all(&store, Direction::Ascending).unwrap().is_empty());
}

#[test]
fn mixed_operation_sequence_preserves_the_invariants() {
    let (store, repo) = amounts_store();
    let mut keys = seed(&store, &repo, &["a", "b", "c", "d", "e"]);

    repo.move_down(&store, keys[0]).unwrap();
    assert_valid_chain(&store);

    repo.move_up(&store, keys[4]).unwrap();
    assert_valid_chain(&store);

    repo.place_after(&store, keys[1], keys[3]).unwrap();
    assert_valid_chain(&store);

    repo.delete(&store, keys[2]).unwrap();
    assert_valid_chain(&store);

    keys.push(repo.add_to_end(&store, amount("f")).unwrap());
    assert_valid_chain(&store);

    repo.place_before(&store, keys[5], keys[0]).unwrap();
    assert_valid_chain(&store);

    repo.move_up(&store, keys[3]).unwrap();
    assert_valid_chain(&store);

    let remaining = repo.get_all(&store, Direction::Ascending).unwrap();
    assert_eq!(remaining.len(), 5);
    assert!(!remaining.iter().any(|(key, _)| *key == keys[2]));
}

#[test]
fn two_collections_on_one_engine_stay_independent() {
    let engine = Arc::new(RecordEngine::in_memory());
    let amounts: EngineNodeStore<AmountRecord> =
        EngineNodeStore::attach(Arc::clone(&engine), "amounts").unwrap();
    let pairs: EngineNodeStore<CurrencyPairRecord> =
        EngineNodeStore::attach(Arc::clone(&engine), "currency_pairs").unwrap();
    let amount_repo: ListRepository<AmountRecord> = ListRepository::new();
    let pair_repo: ListRepository<CurrencyPairRecord> = ListRepository::new();

    amount_repo.add_to_end(&amounts, amount("rent")).unwrap();
    let eur_usd = pair_repo
        .add_to_end(
            &pairs,
            CurrencyPairRecord::new("EUR".to_string(), "USD".to_string()),
        )
        .unwrap();
    pair_repo
        .add_to_end(
            &pairs,
            CurrencyPairRecord::new("EUR".to_string(), "GBP".to_string()),
        )
        .unwrap();

    pair_repo.delete(&pairs, eur_usd).unwrap();

    assert_eq!(
        amount_repo.get_all(&amounts, Direction::Ascending).unwrap().len(),
        1
    );
    assert_eq!(
        pair_repo.get_all(&pairs, Direction::Ascending).unwrap().len(),
        1
    );
    assert_valid_chain(&amounts);
    assert_valid_chain(&pairs);
}

#[test]
fn reordering_survives_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_string_lossy().into_owned(),
        wal_enabled: true,
        checkpoint_on_open: false,
    };
    let repo: ListRepository<AmountRecord> = ListRepository::new();

    let keys = {
        let engine = Arc::new(RecordEngine::open(&config).unwrap());
        let store = EngineNodeStore::attach(engine, "amounts").unwrap();
        let keys: Vec<NodeKey> = ["a", "b", "c"]
            .iter()
            .map(|comment| repo.add_to_end(&store, amount(comment)).unwrap())
            .collect();
        repo.move_up(&store, keys[2]).unwrap();
        keys
    };

    let engine = Arc::new(RecordEngine::open(&config).unwrap());
    let store = EngineNodeStore::attach(engine, "amounts").unwrap();

    let all = repo.get_all(&store, Direction::Ascending).unwrap();
    let order: Vec<NodeKey> = all.iter().map(|(key, _)| *key).collect();
    assert_eq!(order, vec![keys[0], keys[2], keys[1]]);
    assert_valid_chain(&store);
}
