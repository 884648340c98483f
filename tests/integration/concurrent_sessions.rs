use crate::support::{digest, leftover_workdirs, mirror_environment, plugin_cache, FakeRuntime};
use plugin_cache::runtime::MirrorRuntime;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn distinct_environments_stage_concurrently() {
    let (_temp, cache) = plugin_cache(Arc::new(FakeRuntime::default()));
    let barrier = Barrier::new(2);

    let (e1, e2) = thread::scope(|s| {
        let first = s.spawn(|| {
            barrier.wait();
            cache.stage("e1").unwrap()
        });
        let second = s.spawn(|| {
            barrier.wait();
            cache.stage("e2").unwrap()
        });
        (first.join().unwrap(), second.join().unwrap())
    });

    assert_ne!(e1, e2);
    assert_eq!(e1, cache.root().path().join("e1"));
    assert_eq!(e2, cache.root().path().join("e2"));
    assert!(e1.is_dir() && e2.is_dir());
}

#[test]
fn same_environment_staged_from_many_threads_yields_one_directory() {
    let (_temp, cache) = plugin_cache(Arc::new(FakeRuntime::default()));
    let threads = 12;
    let barrier = Barrier::new(threads);

    let paths: HashSet<PathBuf> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    cache.stage("prod").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(paths.len(), 1);
    let listed = cache.root().environments().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].environment.as_str(), "prod");
}

#[test]
fn concurrent_sessions_each_see_a_complete_plugin_tree() {
    let mirror = tempfile::tempdir().unwrap();
    let files: Vec<(String, Vec<u8>)> = (0..40)
        .map(|i| {
            (
                format!("lib/puppet/type/t{:02}.rb", i),
                format!("Puppet::Type.newtype(:t{})\n", i).repeat(64).into_bytes(),
            )
        })
        .collect();
    let borrowed: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(p, b)| (p.as_str(), b.as_slice()))
        .collect();
    let source = mirror_environment(mirror.path(), "prod", &borrowed);
    let expected = digest(&source);

    let (temp, cache) = plugin_cache(Arc::new(MirrorRuntime::new(mirror.path())));
    let sessions = 2;
    let barrier = Barrier::new(sessions);

    let results: Vec<(PathBuf, String)> = thread::scope(|s| {
        let handles: Vec<_> = (0..sessions)
            .map(|i| {
                let cache = &cache;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    cache
                        .with_synced_plugin_dir("prod", &format!("node{}", i), |ctx| {
                            let lib_dir = ctx.lib_dir().unwrap();
                            Ok((lib_dir.to_path_buf(), digest(lib_dir)))
                        })
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_ne!(results[0].0, results[1].0);
    for (lib_dir, seen) in &results {
        assert_eq!(seen, &expected);
        assert!(!lib_dir.exists());
    }
    assert_eq!(digest(&cache.root().path().join("prod/plugins")), expected);
    assert!(leftover_workdirs(&temp).is_empty());
}

#[test]
fn every_created_pool_is_closed_under_contention() {
    let runtime = Arc::new(
        FakeRuntime::default()
            .with_environment("prod", &[("lib/foo.rb", b"foo")])
            .with_environment("test", &[("lib/bar.rb", b"bar")])
            .failing_download("test"),
    );
    let (temp, cache) = plugin_cache(runtime.clone());
    let sessions = 8;
    let barrier = Barrier::new(sessions);

    let outcomes: Vec<bool> = thread::scope(|s| {
        let handles: Vec<_> = (0..sessions)
            .map(|i| {
                let cache = &cache;
                let barrier = &barrier;
                s.spawn(move || {
                    let environment = if i % 2 == 0 { "prod" } else { "test" };
                    barrier.wait();
                    cache
                        .with_synced_plugin_dir(environment, "node", |_| Ok(()))
                        .is_ok()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), sessions / 2);
    assert_eq!(runtime.counters.created.load(Ordering::SeqCst), sessions);
    assert_eq!(runtime.counters.closed.load(Ordering::SeqCst), sessions);
    assert!(leftover_workdirs(&temp).is_empty());
}
