//! Exhaustive checking of the bucket puzzle.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use sam::puzzle::{EMPTY, Puzzle, TRANSFER};
use sam_checker::{CheckOptions, CheckerError};
use sam_engine::EngineConfig;

use crate::common::{puzzle, record_renders};

#[test]
fn finds_the_six_step_solution() {
    let puzzle = puzzle();
    let found = Rc::new(RefCell::new(0));
    let count = Rc::clone(&found);

    let report = puzzle
        .checker(Puzzle::check_options())
        .on_liveness(move |_| *count.borrow_mut() += 1)
        .run()
        .unwrap();

    // One starting action, two choices per later step, two arguments each.
    assert_eq!(report.replays, 32 * 64);
    assert_eq!(report.safety().count(), 0);
    assert_eq!(report.liveness().count(), *found.borrow());

    let solution = ["fill", "transfer", "empty", "transfer", "fill", "transfer"];
    let traces: Vec<_> = report.liveness().collect();
    assert!(
        traces
            .iter()
            .any(|trace| trace.actions().eq(solution.iter().copied()))
    );
    assert!(traces.iter().all(|trace| trace.len() == 6));
}

#[test]
fn repeats_widen_the_search() {
    let puzzle = puzzle();
    let options = CheckOptions {
        depth_max: 2,
        no_duplicate_action: false,
        do_not_start_with: Vec::new(),
    };
    let checker = puzzle.checker(options);
    assert_eq!(checker.search_space().unwrap(), 9 * 4);

    let filtered = puzzle.checker(CheckOptions {
        depth_max: 2,
        no_duplicate_action: true,
        do_not_start_with: vec![EMPTY, TRANSFER],
    });
    assert_eq!(filtered.search_space().unwrap(), 2 * 4);
}

#[test]
fn overflow_is_reported_as_a_safety_finding() {
    let puzzle = puzzle();
    let report = puzzle
        .checker(CheckOptions {
            depth_max: 1,
            no_duplicate_action: false,
            do_not_start_with: vec![EMPTY, TRANSFER],
        })
        .safety(|model| model.jugs.iter().any(|content| *content == 5))
        .run()
        .unwrap();

    assert_eq!(report.replays, 2);
    let safety: Vec<String> = report.safety().map(ToString::to_string).collect();
    assert_eq!(safety, ["fill(1) ==> [0,5], [3,5], 4"]);
    assert_eq!(report.liveness().count(), 0);
}

#[test]
fn user_render_survives_a_check() {
    let puzzle = puzzle();
    let renders = record_renders(&puzzle);

    puzzle
        .checker(CheckOptions {
            depth_max: 2,
            ..Puzzle::check_options()
        })
        .run()
        .unwrap();
    assert!(renders.lock().unwrap().is_empty());

    puzzle.fill.invoke(0);
    assert_eq!(renders.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn synchronized_engines_are_rejected() {
    let puzzle =
        Puzzle::new(EngineConfig::named("queued").synchronized(Duration::from_millis(1))).unwrap();
    let result = puzzle.checker(Puzzle::check_options()).run();
    assert!(matches!(result, Err(CheckerError::SynchronizedEngine)));
}
