//! History-backed navigation over a played puzzle.

use sam::puzzle::{Jugs, SOLUTION};
use sam_engine::Travel;

use crate::common::{jugs, puzzle, puzzle_with_history};

fn at(contents: [u32; 2]) -> Jugs {
    Jugs {
        jugs: contents.to_vec(),
        ..Jugs::default()
    }
}

#[test]
fn reset_and_index_restore_earlier_states() {
    let puzzle = puzzle_with_history(16);
    for pour in SOLUTION {
        puzzle.invoke(pour);
    }
    assert_eq!(puzzle.engine.trace().len(), 6);

    puzzle.engine.reset();
    assert_eq!(jugs(&puzzle), [0, 0]);
    assert!(puzzle.engine.trace().is_empty());

    puzzle.engine.travel(Travel::Index(4));
    assert_eq!(jugs(&puzzle), [2, 0]);
}

#[test]
fn last_returns_to_the_end_of_time() {
    let puzzle = puzzle_with_history(16);
    for pour in SOLUTION {
        puzzle.invoke(pour);
    }
    puzzle.engine.last();
    assert_eq!(jugs(&puzzle), [3, 4]);
}

#[test]
fn eviction_keeps_the_newest_snapshots() {
    let puzzle = puzzle_with_history(3);
    for pour in SOLUTION {
        puzzle.invoke(pour);
    }

    puzzle.engine.reset();
    assert_eq!(jugs(&puzzle), [2, 0]);
}

#[test]
fn seeded_history_replays_in_order() {
    let puzzle = puzzle();
    assert!(!puzzle.engine.has_history());
    puzzle
        .engine
        .set_history(vec![at([0, 5]), at([3, 2]), at([0, 2])]);
    assert!(puzzle.engine.status().has_next);

    puzzle.engine.next();
    assert_eq!(jugs(&puzzle), [0, 5]);
    puzzle.engine.next();
    assert_eq!(jugs(&puzzle), [3, 2]);
    puzzle.engine.next();
    assert_eq!(jugs(&puzzle), [0, 2]);
    assert!(puzzle.engine.has_history());
}
