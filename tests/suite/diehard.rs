//! The bucket-transfer puzzle driven through real intents.

use sam::puzzle::{EMPTY, FILL, Pour, SOLUTION, TRANSFER};

use crate::common::{jugs, puzzle, record_renders};

#[test]
fn solution_reaches_goal_on_last_render() {
    let puzzle = puzzle();
    let renders = record_renders(&puzzle);

    for pour in SOLUTION {
        puzzle.invoke(pour);
    }

    let renders = renders.lock().unwrap().clone();
    assert_eq!(renders.len(), 6);
    assert!(renders[..5].iter().all(|jugs| !jugs.contains(&4)));
    assert_eq!(renders[5], [3, 4]);
    assert!(puzzle.engine.state().goal_reached());
}

#[test]
fn solution_trace_lists_every_pour() {
    let puzzle = puzzle();
    for pour in SOLUTION {
        puzzle.invoke(pour);
    }

    insta::assert_snapshot!(puzzle.engine.trace().to_string(), @r"
    fill(1) ==> [0,5], [3,5], 4
    transfer(1, 0) ==> [3,2], [3,5], 4
    empty(0) ==> [0,2], [3,5], 4
    transfer(1, 0) ==> [2,0], [3,5], 4
    fill(1) ==> [2,5], [3,5], 4
    transfer(1, 0) ==> [3,4], [3,5], 4
    ");
}

#[test]
fn out_of_range_pours_are_no_ops() {
    let puzzle = puzzle();
    let renders = record_renders(&puzzle);

    puzzle.invoke(Pour::Fill(2));
    puzzle.invoke(Pour::Transfer(0, 0));

    assert_eq!(jugs(&puzzle), [0, 0]);
    assert_eq!(renders.lock().unwrap().len(), 2);
    assert!(!puzzle.engine.status().has_error);
}

#[test]
fn allow_list_admits_only_listed_pours() {
    let puzzle = puzzle();
    puzzle.engine.allow([FILL]);
    let renders = record_renders(&puzzle);

    puzzle.invoke(Pour::Empty(0));
    puzzle.invoke(Pour::Fill(1));
    puzzle.invoke(Pour::Transfer(1, 0));

    assert_eq!(jugs(&puzzle), [0, 5]);
    let status = puzzle.engine.status();
    assert!(status.has_error);
    assert_eq!(
        status.error_message.as_deref(),
        Some("unexpected action: transfer")
    );
    let changes = renders
        .lock()
        .unwrap()
        .windows(2)
        .filter(|pair| pair[0] != pair[1])
        .count();
    assert_eq!(changes, 1);
    assert!(!puzzle.engine.is_allowed(EMPTY.as_str()));
    assert!(!puzzle.engine.is_allowed(TRANSFER.as_str()));

    puzzle.engine.clear_allowed_actions();
    puzzle.invoke(Pour::Transfer(1, 0));
    assert_eq!(jugs(&puzzle), [3, 2]);
}
