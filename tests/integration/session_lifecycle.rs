use crate::support::{
    digest, leftover_workdirs, plugin_cache, plugin_cache_with_workdir_parent, FakeRuntime,
};
use plugin_cache::{SyncError, SyncStage};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const FOO_RB: &[u8] = b"module Foo\n  VERSION = '1.2.3'\nend\n";

fn prod_runtime() -> FakeRuntime {
    FakeRuntime::default().with_environment(
        "prod",
        &[("lib/foo.rb", FOO_RB), ("lib/facter/os.rb", b"Facter.add(:os) {}\n")],
    )
}

#[test]
fn callback_observes_downloaded_bytes_from_fresh_cache() {
    let (temp, cache) = plugin_cache(Arc::new(prod_runtime()));
    let prod_dir = cache.root().path().join("prod");
    assert!(!prod_dir.exists());

    let (seen, lib_dir) = cache
        .with_synced_plugin_dir("prod", "node1.example.com", |ctx| {
            let lib_dir = ctx.lib_dir().expect("lib dir set").to_path_buf();
            Ok((std::fs::read(lib_dir.join("lib/foo.rb"))?, lib_dir))
        })
        .unwrap();

    assert_eq!(seen, FOO_RB);
    assert!(prod_dir.is_dir());
    assert!(!lib_dir.exists());
    assert!(leftover_workdirs(&temp).is_empty());
}

#[test]
fn active_configuration_points_into_staged_environment() {
    let (_temp, cache) = plugin_cache(Arc::new(prod_runtime()));
    let prod_dir = cache.root().path().join("prod");

    cache
        .with_synced_plugin_dir("prod", "node1", |ctx| {
            let paths = ctx.active_config().paths.clone().expect("paths staged");
            assert_eq!(paths.var_dir, prod_dir);
            assert_eq!(paths.conf_dir, prod_dir.join("conf"));
            assert_eq!(paths.run_dir, prod_dir.join("run"));
            assert_eq!(paths.log_dir, prod_dir.join("log"));
            assert_eq!(paths.code_dir, prod_dir.join("code"));
            assert_eq!(paths.plugin_dest_dir, prod_dir.join("plugins"));

            let lib_dir = ctx.lib_dir().unwrap();
            assert_eq!(ctx.module_search_path(), &[lib_dir.to_path_buf()]);
            assert!(!lib_dir.starts_with(&prod_dir));
            assert_eq!(digest(lib_dir), digest(&paths.plugin_dest_dir));

            let pool = ctx.network_pool().expect("pool installed");
            assert!(!pool.is_closed());
            assert_eq!(ctx.environment().as_str(), "prod");
            assert_eq!(ctx.identity().as_str(), "node1");
            Ok(())
        })
        .unwrap();
}

#[test]
fn callback_failure_is_propagated_after_teardown() {
    let runtime = Arc::new(prod_runtime());
    let (temp, cache) = plugin_cache(runtime.clone());
    let mut lib_dir = PathBuf::new();

    let err = cache
        .with_synced_plugin_dir("prod", "node1", |ctx| -> anyhow::Result<()> {
            lib_dir = ctx.lib_dir().unwrap().to_path_buf();
            anyhow::bail!("catalog apply failed")
        })
        .unwrap_err();

    assert_eq!(err.stage(), SyncStage::UnitOfWork);
    assert_eq!(err.to_string(), "catalog apply failed");
    assert!(!lib_dir.as_os_str().is_empty());
    assert!(!lib_dir.exists());
    assert!(leftover_workdirs(&temp).is_empty());
    assert_eq!(runtime.counters.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn download_failure_leaves_no_workdir_and_closes_pool() {
    let runtime = Arc::new(prod_runtime().failing_download("prod"));
    let (temp, cache) = plugin_cache(runtime.clone());
    let mut called = false;

    let err = cache
        .with_synced_plugin_dir("prod", "node1", |_| {
            called = true;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, SyncError::Download { .. }));
    assert_eq!(err.stage(), SyncStage::DownloadPlugins);
    assert!(!called);
    assert!(leftover_workdirs(&temp).is_empty());
    assert_eq!(runtime.counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.counters.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn unknown_environment_fails_resolution_without_staging() {
    let runtime = Arc::new(prod_runtime());
    let (temp, cache) = plugin_cache(runtime.clone());

    let err = cache
        .with_synced_plugin_dir("staging", "node1", |_| Ok(()))
        .unwrap_err();

    assert!(matches!(err, SyncError::EnvironmentResolution { .. }));
    assert!(!cache.root().path().join("staging").exists());
    assert!(leftover_workdirs(&temp).is_empty());
    assert_eq!(runtime.counters.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn repeated_sessions_reuse_environment_directory() {
    let runtime = Arc::new(prod_runtime());
    let (temp, cache) = plugin_cache(runtime.clone());

    let first = cache
        .with_synced_plugin_dir("prod", "node1", |ctx| Ok(ctx.lib_dir().unwrap().to_path_buf()))
        .unwrap();
    let second = cache
        .with_synced_plugin_dir("prod", "node2", |ctx| Ok(ctx.lib_dir().unwrap().to_path_buf()))
        .unwrap();

    assert_ne!(first, second);
    assert!(cache.root().path().join("prod/plugins/lib/foo.rb").is_file());
    assert!(leftover_workdirs(&temp).is_empty());
    assert_eq!(runtime.counters.created.load(Ordering::SeqCst), 2);
    assert_eq!(runtime.counters.closed.load(Ordering::SeqCst), 2);
}

#[test]
fn staging_failure_stops_before_download() {
    let runtime = Arc::new(prod_runtime());
    let (temp, cache) = plugin_cache(runtime.clone());
    let blocker = cache.root().path().join("prod");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let err = cache
        .with_synced_plugin_dir("prod", "node1", |_| Ok(()))
        .unwrap_err();

    assert!(matches!(err, SyncError::Staging { .. }));
    assert_eq!(err.stage(), SyncStage::StageEnvironment);
    assert!(blocker.is_file());
    assert!(leftover_workdirs(&temp).is_empty());
    assert_eq!(runtime.counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.counters.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_plugin_tree_fails_provisioning_and_cleans_up() {
    // Downloading an environment without plugins leaves no plugin dir behind
    let runtime = Arc::new(FakeRuntime::default().with_environment("empty", &[]));
    let (temp, cache) = plugin_cache(runtime.clone());
    let mut called = false;

    let err = cache
        .with_synced_plugin_dir("empty", "node1", |_| {
            called = true;
            Ok(())
        })
        .unwrap_err();

    match &err {
        SyncError::Staging { path, .. } => {
            assert_eq!(path, &cache.root().path().join("empty/plugins"))
        }
        other => panic!("expected staging error, got {:?}", other),
    }
    assert_eq!(err.stage(), SyncStage::ProvisionWorkdir);
    assert!(!called);
    assert!(leftover_workdirs(&temp).is_empty());
    assert_eq!(runtime.counters.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn unusable_workdir_parent_fails_provisioning_and_closes_pool() {
    let runtime = Arc::new(prod_runtime());
    let (temp, cache) = plugin_cache_with_workdir_parent(runtime.clone(), "missing/parent");

    let err = cache
        .with_synced_plugin_dir("prod", "node1", |_| Ok(()))
        .unwrap_err();

    assert!(matches!(err, SyncError::Provisioning { .. }));
    assert_eq!(err.stage(), SyncStage::ProvisionWorkdir);
    assert!(!temp.path().join("missing").exists());
    assert!(cache.root().path().join("prod/plugins/lib/foo.rb").is_file());
    assert_eq!(runtime.counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.counters.closed.load(Ordering::SeqCst), 1);
}

#[cfg(unix)]
#[test]
fn unreadable_plugin_tree_is_a_staging_error_naming_the_source() {
    use crate::support::{modes_enforced, set_mode};

    if !modes_enforced() {
        return;
    }
    let runtime = Arc::new(prod_runtime().with_mode_after_download("", 0o000));
    let (temp, cache) = plugin_cache(runtime.clone());
    let plugins = cache.root().path().join("prod/plugins");

    let err = cache
        .with_synced_plugin_dir("prod", "node1", |_| Ok(()))
        .unwrap_err();
    set_mode(&plugins, 0o755);

    match &err {
        SyncError::Staging { path, .. } => assert_eq!(path, &plugins),
        other => panic!("expected staging error, got {:?}", other),
    }
    assert_eq!(err.stage(), SyncStage::ProvisionWorkdir);
    assert!(leftover_workdirs(&temp).is_empty());
    assert_eq!(runtime.counters.closed.load(Ordering::SeqCst), 1);
}

#[cfg(unix)]
#[test]
fn read_only_plugin_directories_do_not_outlive_the_session() {
    use crate::support::set_mode;
    use std::os::unix::fs::PermissionsExt;

    let runtime = Arc::new(prod_runtime().with_mode_after_download("lib", 0o555));
    let (temp, cache) = plugin_cache(runtime);

    let lib_dir = cache
        .with_synced_plugin_dir("prod", "node1", |ctx| {
            let lib_dir = ctx.lib_dir().unwrap().to_path_buf();
            let mode = std::fs::metadata(lib_dir.join("lib"))?.permissions().mode();
            assert_eq!(mode & 0o777, 0o555);
            Ok(lib_dir)
        })
        .unwrap();
    set_mode(&cache.root().path().join("prod/plugins/lib"), 0o755);

    assert!(!lib_dir.exists());
    assert!(leftover_workdirs(&temp).is_empty());
}
