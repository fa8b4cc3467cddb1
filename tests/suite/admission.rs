//! Serialized admission across tasks.

use std::time::Duration;

use tokio::task;

use sam::puzzle::{Puzzle, SOLUTION};
use sam_engine::{EngineConfig, Proposal};

use crate::common::{Entry, jugs, ledger};

#[tokio::test]
async fn synchronized_puzzle_applies_pours_once_settled() {
    let puzzle =
        Puzzle::new(EngineConfig::named("queued").synchronized(Duration::ZERO)).unwrap();
    for pour in SOLUTION {
        puzzle.invoke(pour);
    }
    assert_eq!(jugs(&puzzle), [0, 0]);

    puzzle.engine.settle().await;
    assert_eq!(jugs(&puzzle), [3, 4]);
    assert_eq!(puzzle.engine.trace().len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_keep_their_own_order() {
    let engine = ledger(EngineConfig::named("ledger").synchronized(Duration::ZERO));

    let producers: Vec<_> = (0..4_u32)
        .map(|producer| {
            let engine = engine.clone();
            tokio::spawn(async move {
                for step in 0..25 {
                    engine.present(Proposal::action(Entry::Append(producer * 100 + step)));
                    task::yield_now().await;
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }
    engine.settle().await;

    let entries = engine.state().entries;
    assert_eq!(entries.len(), 100);
    for producer in 0..4 {
        let own: Vec<u32> = entries
            .iter()
            .copied()
            .filter(|entry| entry / 100 == producer)
            .collect();
        let expected: Vec<u32> = (0..25).map(|step| producer * 100 + step).collect();
        assert_eq!(own, expected);
    }
}

#[tokio::test]
async fn cleared_queue_stops_admitting() {
    let engine = ledger(EngineConfig::named("ledger").synchronized(Duration::from_millis(1)));
    engine.present(Proposal::action(Entry::Append(1)));
    engine.settle().await;

    engine.clear_queue();
    engine.present(Proposal::action(Entry::Append(2)));
    engine.settle().await;

    assert_eq!(engine.state().entries, [1]);
}
