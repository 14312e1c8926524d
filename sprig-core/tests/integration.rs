//! Integration Tests
//!
//! These tests drive the reactive system, the scheduler and the renderer
//! together through the public API only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sprig_core::error::RenderError;
use sprig_core::reactive::{
    computed, effect, has_entries, reactive, watch, RawObject, Ref, Value, WatchOptions,
};
use sprig_core::render::{
    create_app, h, props, Component, MemoryHost, NodeHandle, Props, Renderer, VNode,
};
use sprig_core::scheduler::{
    clear_flush_requester, flush_jobs, install_local_flush, queue_job, Job,
};

fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
    let count = Arc::new(AtomicUsize::new(0));
    let read = {
        let count = count.clone();
        move || count.load(Ordering::SeqCst)
    };
    (count, read)
}

fn renderer() -> (Renderer<MemoryHost>, NodeHandle) {
    let mut host = MemoryHost::new();
    let root = host.create_root("div");
    (Renderer::new(host), root)
}

fn list(keys: &[&str]) -> VNode {
    h(
        "ul",
        Props::new(),
        keys.iter()
            .map(|key| h("li", props([("key", *key)]), *key))
            .collect::<Vec<_>>(),
    )
}

// ----------------------------------------------------------------------------
// Reactivity
// ----------------------------------------------------------------------------

/// Wrapping the same object twice yields the same wrapper.
#[test]
fn reactive_identity_is_stable() {
    let raw = RawObject::from_pairs([("a", 1)]);
    let first = reactive(&raw);
    let second = reactive(&raw);

    assert!(first.ptr_eq(&second));
    assert!(first.to_raw().ptr_eq(&raw));
}

/// An effect re-runs once per change and sees the new value.
#[test]
fn effect_follows_reactive_property() {
    let state = reactive(&RawObject::from_pairs([("count", 0)]));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let _effect = {
        let state = state.clone();
        let seen = seen.clone();
        effect(move || seen.lock().push(state.get("count").as_i64()))
    };

    state.set("count", 1);
    state.set("count", 2);

    assert_eq!(*seen.lock(), vec![Some(0), Some(1), Some(2)]);
}

/// Once every handle is gone, neither the object nor the effect lingers.
#[test]
fn short_lived_reactive_object_is_released() {
    let raw = RawObject::from_pairs([("x", 1)]);
    let id = raw.id();
    let (drops, read_drops) = counter();

    struct DropCounter(Arc<AtomicUsize>);
    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let state = reactive(&raw);
    let handle = {
        let state = state.clone();
        let guard = DropCounter(drops);
        effect(move || {
            let _ = &guard;
            state.get("x");
        })
    };
    assert!(has_entries(id));

    drop(handle);
    drop(state);
    drop(raw);
    assert_eq!(read_drops(), 1);

    // A later track sweeps retirements deferred by a busy store.
    let other = reactive(&RawObject::from_pairs([("y", 0)]));
    let sweeper = effect(move || {
        other.get("y");
    });
    sweeper.stop();

    assert!(!has_entries(id));
}

/// Setting a ref to an identical value does not notify.
#[test]
fn ref_ignores_identical_writes() {
    let value = Ref::new(5);
    let (runs, read_runs) = counter();

    let _effect = {
        let value = value.clone();
        effect(move || {
            value.get();
            runs.fetch_add(1, Ordering::SeqCst);
        })
    };

    value.set(5);
    assert_eq!(read_runs(), 1);

    value.set(6);
    assert_eq!(read_runs(), 2);
}

/// A computed cell recomputes at most once per change, however often read.
#[test]
fn computed_recomputes_once_per_change() {
    let base = Ref::new(2);
    let (computes, read_computes) = counter();

    let doubled = {
        let base = base.clone();
        computed(move || {
            computes.fetch_add(1, Ordering::SeqCst);
            base.get().as_i64().unwrap_or(0) * 2
        })
    };

    assert_eq!(read_computes(), 0);
    assert_eq!(doubled.get(), 4);
    assert_eq!(doubled.get(), 4);
    assert_eq!(read_computes(), 1);

    base.set(10);
    base.set(20);
    assert_eq!(read_computes(), 1);
    assert_eq!(doubled.get(), 40);
    assert_eq!(read_computes(), 2);
}

// ----------------------------------------------------------------------------
// Scheduler and watch
// ----------------------------------------------------------------------------

/// Queueing the same job repeatedly in one turn runs it once.
#[test]
fn repeated_job_runs_once_per_flush() {
    let (runs, read_runs) = counter();
    let job = Job::new(move || {
        runs.fetch_add(1, Ordering::SeqCst);
    });

    queue_job(job.clone());
    queue_job(job.clone());
    queue_job(job);
    assert_eq!(read_runs(), 0);

    let report = flush_jobs();
    assert_eq!(read_runs(), 1);
    assert_eq!(report.executed, 1);
    assert!(report.is_clean());
}

/// An immediate watch fires synchronously with a placeholder old value.
#[test]
fn immediate_watch_reports_sentinel_then_changes() {
    let value = Ref::new(5);
    let calls: Arc<Mutex<Vec<(Value, Value)>>> = Arc::new(Mutex::new(Vec::new()));

    let handle = {
        let calls = calls.clone();
        watch(
            &value,
            move |old: &Value, new: &Value| calls.lock().push((old.clone(), new.clone())),
            WatchOptions::immediate(),
        )
    };

    {
        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.is_object());
        assert_eq!(calls[0].1.as_i64(), Some(5));
    }

    value.set(6);
    value.set(7);
    assert_eq!(calls.lock().len(), 1);

    flush_jobs();
    {
        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].0.as_i64(), Some(5));
        assert_eq!(calls[1].1.as_i64(), Some(7));
    }

    handle.stop();
}

/// Stopping a watcher drops a callback that is already queued.
#[test]
fn stopped_watch_skips_queued_callback() {
    let value = Ref::new(0);
    let (calls, read_calls) = counter();

    let handle = watch(
        &value,
        move |_: &Value, _: &Value| {
            calls.fetch_add(1, Ordering::SeqCst);
        },
        WatchOptions::default(),
    );

    value.set(1);
    handle.stop();
    let report = flush_jobs();

    assert_eq!(read_calls(), 0);
    assert_eq!(report.skipped, 1);
}

/// Inside a `LocalSet`, queued jobs flush on their own after the turn.
#[tokio::test(flavor = "current_thread")]
async fn local_set_flushes_automatically() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            install_local_flush();

            let value = Ref::new(0);
            let seen = Arc::new(Mutex::new(Vec::new()));
            let handle = {
                let seen = seen.clone();
                watch(
                    &value,
                    move |_: &Value, new: &Value| seen.lock().push(new.as_i64()),
                    WatchOptions::default(),
                )
            };

            value.set(1);
            value.set(2);
            assert!(seen.lock().is_empty());

            for _ in 0..10 {
                if !seen.lock().is_empty() {
                    break;
                }
                tokio::task::yield_now().await;
            }

            assert_eq!(*seen.lock(), vec![Some(2)]);
            handle.stop();
            clear_flush_requester();
        })
        .await;
}

// ----------------------------------------------------------------------------
// Keyed diff
// ----------------------------------------------------------------------------

/// Re-rendering an identical tree performs no host mutations.
#[test]
fn identical_rerender_is_free() {
    let (renderer, root) = renderer();
    renderer.render(Some(list(&["a", "b", "c"])), root);
    renderer.with_host(MemoryHost::clear_ops);

    renderer.render(Some(list(&["a", "b", "c"])), root);

    assert_eq!(renderer.with_host(|host| host.stats()).mutations(), 0);
}

#[test]
fn swapping_two_keys_is_one_move() {
    let (renderer, root) = renderer();
    renderer.render(Some(list(&["a", "b", "c", "d"])), root);
    renderer.with_host(MemoryHost::clear_ops);

    renderer.render(Some(list(&["a", "c", "b", "d"])), root);

    let stats = renderer.with_host(|host| host.stats());
    assert_eq!(stats.moved, 1);
    assert_eq!(stats.created, 0);
    assert_eq!(stats.removed, 0);
    assert_eq!(renderer.with_host(|host| host.text_content(root)), "acbd");
}

#[test]
fn inserting_a_key_mounts_without_moves() {
    let (renderer, root) = renderer();
    renderer.render(Some(list(&["a", "b", "c"])), root);
    renderer.with_host(MemoryHost::clear_ops);

    renderer.render(Some(list(&["a", "b", "x", "c"])), root);

    let stats = renderer.with_host(|host| host.stats());
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.moved, 0);
    assert_eq!(stats.removed, 0);
    assert_eq!(renderer.with_host(|host| host.text_content(root)), "abxc");
}

#[test]
fn removing_a_key_is_one_removal() {
    let (renderer, root) = renderer();
    renderer.render(Some(list(&["a", "b", "c"])), root);
    renderer.with_host(MemoryHost::clear_ops);

    renderer.render(Some(list(&["a", "c"])), root);

    let stats = renderer.with_host(|host| host.stats());
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.moved, 0);
    assert_eq!(stats.inserted, 0);
    assert_eq!(renderer.with_host(|host| host.text_content(root)), "ac");
}

// ----------------------------------------------------------------------------
// Components
// ----------------------------------------------------------------------------

/// Several writes in one turn re-render a component once.
#[test]
fn component_updates_are_batched() {
    let (renders, read_renders) = counter();
    let label = Component::builder("Label")
        .data_json(serde_json::json!({ "first": "a", "second": "b" }))
        .render(move |ctx| {
            renders.fetch_add(1, Ordering::SeqCst);
            let text = format!(
                "{}{}",
                ctx.data().get("first").to_display_string(),
                ctx.data().get("second").to_display_string()
            );
            Ok(h("span", Props::new(), text))
        });

    let (renderer, root) = renderer();
    let mut app = create_app(&renderer, label);
    app.mount(root);
    assert_eq!(read_renders(), 1);

    let instance = app.root_instance().expect("mounted root");
    instance.data().set("first", "x");
    instance.data().set("second", "y");
    assert_eq!(read_renders(), 1);

    flush_jobs();
    assert_eq!(read_renders(), 2);
    assert_eq!(
        renderer.with_host(|host| host.inner_html(root)),
        "<span>xy</span>"
    );
}

/// A failing child renders a placeholder; its sibling renders normally.
#[test]
fn render_error_stays_inside_component() {
    let broken = Component::new("Broken", |_| Err(RenderError::failed("Broken", "no data")));
    let working = Component::new("Working", |_| Ok(h("p", Props::new(), "ok")));
    let parent = {
        let broken = broken.clone();
        let working = working.clone();
        Component::new("Parent", move |_| {
            Ok(h(
                "section",
                Props::new(),
                vec![
                    VNode::component(&broken, Props::new()),
                    VNode::component(&working, Props::new()),
                ],
            ))
        })
    };

    let (renderer, root) = renderer();
    let mut app = create_app(&renderer, parent);
    app.mount(root);

    assert_eq!(
        renderer.with_host(|host| host.inner_html(root)),
        "<section><!--render error--><p>ok</p></section>"
    );
}

/// Unmounting the app tears down every host node and stops re-rendering.
#[test]
fn app_unmount_cleans_up() {
    let (renders, read_renders) = counter();
    let shared = Ref::new("first");
    let view = {
        let shared = shared.clone();
        Component::new("View", move |_| {
            renders.fetch_add(1, Ordering::SeqCst);
            Ok(h("b", Props::new(), shared.get().to_display_string()))
        })
    };

    let (renderer, root) = renderer();
    let mut app = create_app(&renderer, view);
    app.mount(root);
    assert_eq!(renderer.with_host(|host| host.inner_html(root)), "<b>first</b>");

    app.unmount();
    assert_eq!(renderer.with_host(|host| host.inner_html(root)), "");
    assert!(!renderer.has_root(root));

    shared.set("second");
    flush_jobs();
    assert_eq!(read_renders(), 1);
}
