use crate::support::mirror_environment;
use plugin_cache::config::PluginCacheConfig;
use plugin_cache::tooling::{CliContext, Commands};
use plugin_cache::SyncError;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct Fixture {
    temp: TempDir,
    context: CliContext,
}

impl Fixture {
    fn new(with_mirror: bool) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let work = temp.path().join("work");
        fs::create_dir_all(&work).unwrap();

        let mut config = PluginCacheConfig {
            cache_root: temp.path().join("cache"),
            workdir_parent: Some(work),
            ..PluginCacheConfig::default()
        };
        if with_mirror {
            let mirror = temp.path().join("mirror");
            mirror_environment(&mirror, "prod", &[("lib/foo.rb", b"module Foo; end\n")]);
            config.mirror_root = Some(mirror);
        }

        let context = CliContext::with_config(config).unwrap();
        Self { temp, context }
    }

    fn work_entries(&self) -> usize {
        fs::read_dir(self.temp.path().join("work")).unwrap().count()
    }
}

fn list_json(context: &CliContext, digest: bool) -> serde_json::Value {
    let output = context
        .execute(&Commands::List {
            format: "json".to_string(),
            digest,
        })
        .unwrap();
    serde_json::from_str(&output).unwrap()
}

#[test]
fn stage_prints_existing_environment_path() {
    let fixture = Fixture::new(false);
    let output = fixture
        .context
        .execute(&Commands::Stage {
            environment: "prod".to_string(),
        })
        .unwrap();

    let path = PathBuf::from(output.trim());
    assert!(path.is_dir());
    assert_eq!(path.file_name().unwrap(), "prod");
}

#[test]
fn stage_rejects_invalid_environment_name() {
    let fixture = Fixture::new(false);
    let err = fixture
        .context
        .execute(&Commands::Stage {
            environment: "../escape".to_string(),
        })
        .unwrap_err();

    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn list_json_reports_staged_environments() {
    let fixture = Fixture::new(false);
    for environment in ["prod", "dev"] {
        fixture
            .context
            .execute(&Commands::Stage {
                environment: environment.to_string(),
            })
            .unwrap();
    }

    let listing = list_json(&fixture.context, false);
    assert_eq!(listing["total"], 2);
    let mut names: Vec<&str> = listing["environments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["environment"].as_str().unwrap())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["dev", "prod"]);

    let first = &listing["environments"][0];
    assert!(first["path"].is_string());
    assert!(first["last_touched"].is_string());
    assert_eq!(first["plugin_files"], 0);
    assert!(first.get("digest").is_none());
}

#[test]
fn list_text_rejects_unknown_format() {
    let fixture = Fixture::new(false);
    let err = fixture
        .context
        .execute(&Commands::List {
            format: "yaml".to_string(),
            digest: false,
        })
        .unwrap_err();

    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn sync_without_mirror_is_a_configuration_error() {
    let fixture = Fixture::new(false);
    let err = fixture
        .context
        .execute(&Commands::Sync {
            environment: "prod".to_string(),
            identity: "node1".to_string(),
            label: None,
            command: vec!["true".to_string()],
        })
        .unwrap_err();

    assert!(matches!(err, SyncError::Config(_)));
    assert_eq!(fixture.work_entries(), 0);
}

#[cfg(unix)]
#[test]
fn sync_runs_command_against_ephemeral_copy() {
    let fixture = Fixture::new(true);
    fixture
        .context
        .execute(&Commands::Sync {
            environment: "prod".to_string(),
            identity: "node1".to_string(),
            label: Some("agent-run".to_string()),
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                r#"test -f "$PLUGIN_CACHE_LIBDIR/lib/foo.rb" && test "$PLUGIN_CACHE_ENVIRONMENT" = prod"#
                    .to_string(),
            ],
        })
        .unwrap();

    assert_eq!(fixture.work_entries(), 0);

    let listing = list_json(&fixture.context, true);
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["environments"][0]["plugin_files"], 1);
    assert!(listing["environments"][0]["digest"].is_string());
}

#[cfg(unix)]
#[test]
fn sync_surfaces_child_exit_code() {
    let fixture = Fixture::new(true);
    let err = fixture
        .context
        .execute(&Commands::Sync {
            environment: "prod".to_string(),
            identity: "node1".to_string(),
            label: None,
            command: vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
        })
        .unwrap_err();

    let failed = match &err {
        SyncError::Callback(inner) => inner
            .downcast_ref::<plugin_cache::tooling::CommandFailed>()
            .expect("child failure"),
        other => panic!("unexpected error {:?}", other),
    };
    assert_eq!(failed.code, Some(3));
    assert_eq!(fixture.work_entries(), 0);
}
