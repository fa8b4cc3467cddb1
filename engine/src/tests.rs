//! Unit tests for the engine crate.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::time;

use super::*;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
struct Counter {
    counter: i64,
    status: String,
}

impl Counter {
    fn at(counter: i64) -> Self {
        Self {
            counter,
            status: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
enum Op {
    Inc(i64),
    Set(i64),
    Quiet(i64),
    Fail,
    Noop,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Palette {
    hits: u32,
    seen: i64,
}

fn label(value: &'static str) -> ActionLabel {
    ActionLabel::from_static(value)
}

fn engine() -> Engine<Counter, Op> {
    Engine::new(EngineConfig::named("test")).unwrap()
}

fn engine_with_history() -> Engine<Counter, Op> {
    Engine::new(EngineConfig::named("test").with_max_snapshots(16)).unwrap()
}

fn counting() -> Component<Counter, Op> {
    Component::<Counter, Op>::new().acceptor(|model, op| {
        match op {
            Op::Inc(n) => model.counter += *n,
            Op::Set(n) => model.counter = *n,
            Op::Quiet(n) => {
                model.counter = *n;
                model.do_not_render();
            }
            Op::Fail => anyhow::bail!("acceptor failed"),
            Op::Noop => {}
        }
        Ok(())
    })
}

fn renders(engine: &Engine<Counter, Op>) -> Arc<Mutex<Vec<i64>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.set_render(move |model| sink.lock().unwrap().push(model.counter));
    seen
}

fn seen(renders: &Arc<Mutex<Vec<i64>>>) -> Vec<i64> {
    renders.lock().unwrap().clone()
}

// ============================================================================
// Cycle
// ============================================================================

#[test]
fn present_runs_accept_and_render() {
    let engine = engine();
    engine.add_component(counting()).unwrap();
    let renders = renders(&engine);

    engine.present(Proposal::action(Op::Inc(2)));
    engine.present(Proposal::action(Op::Inc(3)));

    assert_eq!(seen(&renders), [2, 5]);
    assert_eq!(engine.state().counter, 5);
    assert!(!engine.status().has_error);
}

#[test]
fn noop_proposal_leaves_fields_unchanged() {
    let engine = engine();
    engine.add_initial_state(Counter {
        counter: 7,
        status: "ready".to_string(),
    });
    engine.add_component(counting()).unwrap();
    let before = engine.state();

    engine.present(Proposal::action(Op::Noop));

    assert_eq!(engine.state(), before);
}

#[test]
fn acceptor_failure_becomes_error_proposal() {
    let engine = engine();
    engine.add_component(counting()).unwrap();
    let renders = renders(&engine);

    engine.present(Proposal::action(Op::Fail));

    let status = engine.status();
    assert!(status.has_error);
    assert_eq!(status.error_message.as_deref(), Some("acceptor failed"));
    // Only the follow-up error cycle renders.
    assert_eq!(seen(&renders), [0]);

    engine.with_model_mut(|model| model.clear_error());
    assert!(!engine.status().has_error);
}

#[test]
fn reactor_failure_aborts_render() {
    let engine = engine();
    engine
        .add_component(counting().reactor(|model| {
            anyhow::ensure!(model.counter < 10, "counter overflow");
            Ok(())
        }))
        .unwrap();
    let renders = renders(&engine);

    engine.present(Proposal::action(Op::Set(12)));

    assert_eq!(engine.status().error_message.as_deref(), Some("counter overflow"));
    // The error cycle trips the same reactor and is recorded without rendering.
    assert!(seen(&renders).is_empty());
}

#[test]
fn tagged_proposals_are_traced() {
    let engine = engine();
    engine.add_component(counting()).unwrap();

    engine.present(Proposal::action(Op::Inc(1)).named(label("inc")));
    engine.present(Proposal::action(Op::Inc(1)));
    engine.present(Proposal::action(Op::Set(4)).named(label("set")));

    insta::assert_snapshot!(engine.trace().to_string(), @r#"
    inc(1) ==> 1, ""
    set(4) ==> 4, ""
    "#);

    engine.present(Proposal::clear_trace());
    assert!(engine.trace().is_empty());
}

#[test]
fn trace_formatter_writes_the_line() {
    let engine = engine();
    engine.add_component(counting()).unwrap();
    engine.present(Proposal::action(Op::Inc(1)).named(label("inc")));
    engine.set_trace_formatter(|action, proposal, model| {
        format!("{action} {proposal} -> {}", model.counter)
    });

    engine.present(Proposal::action(Op::Inc(2)).named(label("inc")));
    engine.present(Proposal::action(Op::Set(7)).named(label("set")));

    insta::assert_snapshot!(engine.trace().to_string(), @r#"
    inc(1) ==> 1, ""
    inc {"Inc":2} -> 3
    set {"Set":7} -> 7
    "#);
    assert_eq!(engine.trace().entries()[1].state()["counter"], 3);
}

#[test]
fn do_not_render_is_one_shot() {
    let engine = engine();
    engine.add_component(counting()).unwrap();
    let renders = renders(&engine);

    engine.present(Proposal::action(Op::Quiet(3)));
    engine.present(Proposal::action(Op::Inc(1)));

    assert_eq!(seen(&renders), [4]);
}

#[test]
fn stale_stamps_are_dropped() {
    let engine = engine();
    engine.add_component(counting()).unwrap();

    engine.present(Proposal::action(Op::Set(2)).stamped(Stamp::new(2)));
    engine.present(Proposal::action(Op::Set(1)).stamped(Stamp::new(1)));

    assert_eq!(engine.state().counter, 2);
}

// ============================================================================
// Guards
// ============================================================================

#[test]
fn safety_violation_rolls_back_with_history() {
    let engine = engine_with_history();
    engine
        .add_component(counting().safety("negative", |model| model.counter < 0))
        .unwrap();
    let renders = renders(&engine);
    let logged = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&logged);
    engine.set_logger(move |condition: &str, model: &Model<Counter>| {
        log.lock().unwrap().push((condition.to_string(), model.counter));
    });

    engine.present(Proposal::action(Op::Inc(1)));
    engine.present(Proposal::action(Op::Inc(-5)));

    assert_eq!(engine.state().counter, 1);
    assert_eq!(seen(&renders), [1, 1]);
    assert_eq!(*logged.lock().unwrap(), [("negative".to_string(), -4)]);
}

#[test]
fn safety_violation_without_history_only_logs() {
    let engine = engine();
    engine
        .add_component(counting().safety("negative", |model| model.counter < 0))
        .unwrap();
    let renders = renders(&engine);
    let logged = Arc::new(AtomicU32::new(0));
    let log = Arc::clone(&logged);
    engine.set_logger(move |_: &str, _: &Model<Counter>| {
        log.fetch_add(1, Ordering::SeqCst);
    });

    engine.present(Proposal::action(Op::Inc(-1)));

    assert_eq!(engine.state().counter, -1);
    assert_eq!(seen(&renders), [-1]);
    assert_eq!(logged.load(Ordering::SeqCst), 1);
}

#[test]
fn nap_schedules_follow_up_after_cycle() {
    let engine = engine();
    engine
        .add_component(counting().nap(|model| {
            if model.counter == 1 {
                Nap::Next(Proposal::action(Op::Inc(10)))
            } else {
                Nap::Continue
            }
        }))
        .unwrap();
    let renders = renders(&engine);

    engine.present(Proposal::action(Op::Inc(1)));

    assert_eq!(engine.state().counter, 11);
    assert_eq!(seen(&renders), [11]);
}

#[test]
fn nap_suppress_skips_render() {
    let engine = engine();
    engine
        .add_component(counting().nap(|model| {
            if model.counter % 2 == 0 {
                Nap::Suppress
            } else {
                Nap::Continue
            }
        }))
        .unwrap();
    let renders = renders(&engine);

    engine.present(Proposal::action(Op::Inc(2)));
    engine.present(Proposal::action(Op::Inc(1)));

    assert_eq!(seen(&renders), [3]);
}

// ============================================================================
// Components
// ============================================================================

#[test]
fn local_acceptor_sees_parent_state() {
    let engine = engine();
    engine.add_component(counting()).unwrap();
    engine
        .add_component(
            Component::named("palette", Palette::default())
                .local_acceptor(|mut local: Local<'_, Counter, Palette>, op: &Op| {
                    if let Op::Inc(_) = op {
                        local.hits += 1;
                        local.seen = local.parent().counter;
                    }
                    Ok(())
                })
                .local_reactor(|mut local: Local<'_, Counter, Palette>| {
                    local.seen *= 10;
                    Ok(())
                }),
        )
        .unwrap();

    engine.present(Proposal::action(Op::Inc(3)));

    let palette = engine.with_model(|model| {
        assert!(model.parent_of("palette").is_some());
        model.local_state::<Palette>("palette").cloned()
    });
    assert_eq!(palette, Some(Palette { hits: 1, seen: 30 }));
}

#[test]
fn duplicate_component_is_rejected() {
    let engine = engine();
    engine
        .add_component(Component::named("palette", Palette::default()))
        .unwrap();
    let err = engine
        .add_component(Component::named("palette", Palette::default()))
        .err();
    assert!(matches!(err, Some(EngineError::DuplicateComponent { .. })));
}

#[tokio::test]
async fn async_acceptor_patches_after_resolution() {
    let engine = engine();
    engine
        .add_component(Component::new().async_acceptor(|op: &Op| match op {
            Op::Set(n) => {
                let n = *n;
                Some(
                    async move {
                        time::sleep(Duration::from_millis(5)).await;
                        Ok::<Patch<Counter>, anyhow::Error>(Box::new(move |state: &mut Counter| {
                            state.counter = n;
                        }))
                    }
                    .boxed(),
                )
            }
            _ => None,
        }))
        .unwrap();
    let renders = renders(&engine);

    engine.present(Proposal::action(Op::Set(5)));
    assert_eq!(engine.state().counter, 0);

    engine.settle().await;
    assert_eq!(engine.state().counter, 5);
    assert_eq!(seen(&renders), [5]);
}

#[test]
fn async_acceptor_without_runtime_sets_error() {
    let engine = engine();
    engine
        .add_component(Component::new().async_acceptor(|_: &Op| {
            Some(async { Ok::<Patch<Counter>, anyhow::Error>(Box::new(|_: &mut Counter| {})) }.boxed())
        }))
        .unwrap();

    engine.present(Proposal::action(Op::Noop));

    assert!(engine.status().has_error);
}

// ============================================================================
// Intents
// ============================================================================

#[test]
fn allow_list_admits_only_listed_actions() {
    let engine = engine();
    let mounted = engine.add_component(counting()).unwrap();
    let a = mounted
        .intent(Action::new(label("a"), |(): ()| Ok(Op::Inc(1))))
        .unwrap();
    let b = mounted
        .intent(Action::new(label("b"), |(): ()| Ok(Op::Inc(10))))
        .unwrap();
    engine.allow([label("b")]);

    a.invoke(());
    b.invoke(());
    a.invoke(());

    assert_eq!(engine.state().counter, 10);
    assert_eq!(
        engine.status().error_message.as_deref(),
        Some("unexpected action: a")
    );
    assert_eq!(engine.allowed_actions(), [label("b")]);

    engine.clear_allowed_actions();
    a.invoke(());
    assert_eq!(engine.state().counter, 11);
}

#[tokio::test(start_paused = true)]
async fn debounce_swallows_invocations_inside_window() {
    let engine = engine();
    let mounted = engine
        .add_component(
            counting().options(ComponentOptions::default().debounce(Duration::from_millis(100))),
        )
        .unwrap();
    let inc = mounted
        .intent(Action::new(label("inc"), |n: i64| Ok(Op::Inc(n))))
        .unwrap();

    inc.invoke(1);
    inc.invoke(1);
    time::advance(Duration::from_millis(50)).await;
    inc.invoke(1);
    assert_eq!(engine.state().counter, 1);

    time::advance(Duration::from_millis(50)).await;
    inc.invoke(1);
    assert_eq!(engine.state().counter, 2);
}

#[test]
fn retry_recovers_before_max() {
    let engine = engine();
    let mounted = engine
        .add_component(
            counting().options(ComponentOptions::default().retry(RetryPolicy::new(3, Duration::ZERO))),
        )
        .unwrap();
    let renders = renders(&engine);
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let flaky = mounted
        .intent(Action::new(label("flaky"), move |(): ()| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                anyhow::bail!("flaky");
            }
            Ok(Op::Inc(1))
        }))
        .unwrap();

    flaky.invoke(());

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(seen(&renders), [1]);
    assert!(!engine.status().has_error);
}

#[test]
fn retry_exhaustion_presents_error() {
    let engine = engine();
    let mounted = engine
        .add_component(
            counting().options(ComponentOptions::default().retry(RetryPolicy::new(2, Duration::ZERO))),
        )
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let broken = mounted
        .intent(Action::new(label("broken"), move |(): ()| {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("still broken")
        }))
        .unwrap();

    broken.invoke(());

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(engine.state().counter, 0);
    assert_eq!(
        engine.status().error_message.as_deref(),
        Some("still broken")
    );

    // The counter was reset, so the next invocation gets a full budget again.
    broken.invoke(());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn async_retry_waits_between_attempts() {
    let engine = engine();
    let mounted = engine
        .add_component(counting().options(
            ComponentOptions::default().retry(RetryPolicy::new(3, Duration::from_millis(50))),
        ))
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let fetch = mounted
        .intent(Action::new_async(label("fetch"), move |(): ()| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<Op, _>(anyhow::anyhow!("offline"))
            }
            .boxed()
        }))
        .unwrap();

    let started = time::Instant::now();
    fetch.dispatch(()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(started.elapsed(), Duration::from_millis(100));
    assert_eq!(engine.status().error_message.as_deref(), Some("offline"));
}

#[tokio::test(start_paused = true)]
async fn sync_retry_waits_between_attempts() {
    let engine = engine();
    let mounted = engine
        .add_component(counting().options(
            ComponentOptions::default().retry(RetryPolicy::new(3, Duration::from_millis(50))),
        ))
        .unwrap();
    let started = time::Instant::now();
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&attempts);
    let flaky = mounted
        .intent(Action::new(label("flaky"), move |(): ()| {
            record.lock().unwrap().push(started.elapsed());
            anyhow::bail!("offline")
        }))
        .unwrap();

    flaky.invoke(());
    assert_eq!(attempts.lock().unwrap().len(), 1);
    engine.settle().await;

    assert_eq!(
        *attempts.lock().unwrap(),
        [0, 50, 100].map(Duration::from_millis)
    );
    assert_eq!(engine.status().error_message.as_deref(), Some("offline"));
}

fn delayed_set() -> Action<Op, (i64, u64)> {
    Action::new_async(label("load"), |(value, delay_ms): (i64, u64)| {
        async move {
            time::sleep(Duration::from_millis(delay_ms)).await;
            Ok::<_, anyhow::Error>(Op::Set(value))
        }
        .boxed()
    })
}

#[tokio::test(start_paused = true)]
async fn outdated_proposals_are_ignored() {
    let engine = engine();
    let mounted = engine
        .add_component(counting().options(ComponentOptions::default().ignore_outdated_proposals()))
        .unwrap();
    let renders = renders(&engine);
    let load = mounted.intent(delayed_set()).unwrap();

    tokio::join!(load.dispatch((1, 100)), load.dispatch((2, 10)));

    assert_eq!(engine.state().counter, 2);
    assert_eq!(seen(&renders), [2]);
}

#[tokio::test(start_paused = true)]
async fn serialized_order_runs_dispatches_in_call_order() {
    let engine = engine();
    let mounted = engine
        .add_component(counting().options(ComponentOptions::default().serialized_order()))
        .unwrap();
    let renders = renders(&engine);
    let load = mounted.intent(delayed_set()).unwrap();

    tokio::join!(load.dispatch((1, 100)), load.dispatch((2, 10)));

    assert_eq!(seen(&renders), [1, 2]);
}

#[tokio::test]
async fn invoke_spawns_async_actions() {
    let engine = engine();
    let mounted = engine.add_component(counting()).unwrap();
    let load = mounted.intent(delayed_set()).unwrap();

    load.invoke((9, 1));
    engine.settle().await;

    assert_eq!(engine.state().counter, 9);
}

#[test]
fn async_actions_can_be_disabled() {
    let engine: Engine<Counter, Op> =
        Engine::new(EngineConfig::named("strict").synchronous()).unwrap();
    let mounted = engine.add_component(counting()).unwrap();

    let err = mounted.intent(delayed_set()).err();
    assert!(matches!(
        err,
        Some(EngineError::AsyncActionsDisabled { ref instance, .. }) if instance == "strict"
    ));
    assert!(
        mounted
            .intent(Action::new(label("inc"), |n: i64| Ok(Op::Inc(n))))
            .is_ok()
    );
}

#[test]
fn untraced_actions_leave_no_trace() {
    let engine = engine();
    engine.add_component(counting()).unwrap();
    let inc = engine
        .intent(Action::new(label("inc"), |n: i64| Ok(Op::Inc(n))).untraced())
        .unwrap();

    inc.invoke(1);

    assert_eq!(engine.state().counter, 1);
    assert!(engine.trace().is_empty());
}

// ============================================================================
// Serialized admission
// ============================================================================

fn appending_acceptor() -> Component<Counter, Op> {
    Component::new().async_acceptor(|op: &Op| match op {
        Op::Set(n) => {
            let n = *n;
            Some(
                async move {
                    time::sleep(Duration::from_millis(10 * (4 - n).unsigned_abs())).await;
                    Ok::<Patch<Counter>, anyhow::Error>(Box::new(move |state: &mut Counter| {
                        state.status.push_str(&n.to_string());
                    }))
                }
                .boxed(),
            )
        }
        _ => None,
    })
}

#[tokio::test(start_paused = true)]
async fn synchronized_engine_admits_in_fifo_order() {
    let engine: Engine<Counter, Op> =
        Engine::new(EngineConfig::named("sync").synchronized(Duration::from_millis(5))).unwrap();
    engine.add_component(appending_acceptor()).unwrap();

    for n in 1..=3 {
        engine.present(Proposal::action(Op::Set(n)));
    }
    assert_eq!(engine.state().status, "");

    engine.settle().await;
    assert_eq!(engine.state().status, "123");
}

#[tokio::test(start_paused = true)]
async fn direct_engine_admits_as_acceptors_resolve() {
    let engine = engine();
    engine.add_component(appending_acceptor()).unwrap();

    for n in 1..=3 {
        engine.present(Proposal::action(Op::Set(n)));
    }

    engine.settle().await;
    assert_eq!(engine.state().status, "321");
}

#[tokio::test]
async fn clear_queue_drops_later_proposals() {
    let engine: Engine<Counter, Op> =
        Engine::new(EngineConfig::named("sync").synchronized(Duration::ZERO)).unwrap();
    engine.add_component(counting()).unwrap();

    engine.present(Proposal::action(Op::Inc(1)));
    engine.settle().await;
    engine.clear_queue();
    engine.present(Proposal::action(Op::Inc(1)));
    engine.settle().await;

    assert_eq!(engine.state().counter, 1);
}

#[tokio::test]
async fn clearing_twice_keeps_queue_closed() {
    let engine: Engine<Counter, Op> =
        Engine::new(EngineConfig::named("sync").synchronized(Duration::ZERO)).unwrap();
    engine.add_component(counting()).unwrap();

    engine.clear_queue();
    engine.present(Proposal::action(Op::Inc(1)));
    engine.settle().await;
    engine.clear_queue();
    engine.present(Proposal::action(Op::Inc(1)));
    engine.settle().await;

    assert_eq!(engine.state().counter, 0);
}

#[test]
fn synchronized_engine_needs_runtime() {
    let result: Result<Engine<Counter, Op>, _> =
        Engine::new(EngineConfig::default().synchronized(Duration::from_millis(5)));
    assert!(matches!(result, Err(EngineError::NoRuntime)));
}

// ============================================================================
// History and envelope
// ============================================================================

#[test]
fn next_replays_seeded_history() {
    let engine = engine();
    let renders = renders(&engine);
    engine.set_history(vec![Counter::at(10), Counter::at(11)]);
    assert!(engine.status().has_next);

    engine.next();
    engine.next();

    assert_eq!(seen(&renders), [10, 11]);
}

#[test]
fn reset_restores_initial_snapshot_and_clears_trace() {
    let engine = engine_with_history();
    engine.add_initial_state(Counter::at(3));
    engine.add_component(counting()).unwrap();
    engine.present(Proposal::action(Op::Inc(1)).named(label("inc")));
    engine.present(Proposal::action(Op::Inc(1)).named(label("inc")));
    assert_eq!(engine.trace().len(), 2);

    engine.reset();
    assert_eq!(engine.state().counter, 3);
    assert!(engine.trace().is_empty());

    engine.last();
    assert_eq!(engine.state().counter, 3);
    engine.travel(Travel::Index(2));
    assert_eq!(engine.state().counter, 5);
}

#[test]
fn apply_processes_history_before_initial_state() {
    let engine = engine();
    let response = engine
        .apply(
            Request::new()
                .initial_state(Counter::at(3))
                .history(Vec::new())
                .component(counting())
                .allowed(Allowed::Query),
        )
        .unwrap();

    assert!(response.mounted.is_some());
    assert_eq!(response.allowed_actions, Some(Vec::new()));
    assert!(response.status.has_next);

    engine.present(Proposal::action(Op::Inc(1)));
    engine.reset();
    assert_eq!(engine.state().counter, 3);
}

#[test]
fn check_mode_parks_the_render_sink() {
    let engine = engine();
    engine.add_component(counting()).unwrap();
    let renders = renders(&engine);
    let observed = Arc::new(Mutex::new(Vec::new()));
    let observer = Arc::clone(&observed);

    engine.begin_check(Box::new(move |model: &Model<Counter>| {
        observer.lock().unwrap().push(model.counter);
    }));
    engine.present(Proposal::action(Op::Inc(1)));
    engine.end_check();
    engine.present(Proposal::action(Op::Inc(1)));

    assert_eq!(*observed.lock().unwrap(), [1]);
    assert_eq!(seen(&renders), [2]);
}
