use jarforge::archive::write_archive;
use jarforge::patcher::{ClosureFix, NoTransformPatcher};
use jarforge::{BasePatcher, ClassNode, Environment, Patcher, PipelineConfig, Project, ProjectBuilder};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn write_client_jar(path: &Path) {
    let node = ClassNode::new("a").with_method("tick", "()V");
    write_archive(path, |w| w.write_entry("a.class", &serde_json::to_vec(&node)?)).unwrap();
}

fn project(root: &Path, config: PipelineConfig, fixes_run: &Arc<AtomicUsize>) -> Project {
    let counter = Arc::clone(fixes_run);
    let fix = ClosureFix::new("count", move |_, bytes| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Some(bytes))
    });
    let mut builder = ProjectBuilder::new("1.20.1", config);
    builder
        .namespace("official", false, &[])
        .unwrap()
        .raw_jar(Environment::Client, root.join("client.jar"))
        .unwrap()
        .patcher(NoTransformPatcher::new(BasePatcher::new().with_fix(Arc::new(fix))))
        .unwrap()
        .dev_namespace("official", "official")
        .unwrap();
    builder.finalize().unwrap()
}

/// A second project over the same cache reuses the fixed jar
#[test]
fn test_cache_hit_across_projects() {
    let temp_dir = TempDir::new().unwrap();
    write_client_jar(&temp_dir.path().join("client.jar"));
    let fixes_run = Arc::new(AtomicUsize::new(0));
    let config = PipelineConfig::with_cache_root(temp_dir.path().join("cache"));

    let first = project(temp_dir.path(), config.clone(), &fixes_run);
    let built = first.dev_artifact(Environment::Client).unwrap();
    assert_eq!(built.patches().tags(), &["fixed"]);
    assert_eq!(first.pipeline().context().builds(), 1);
    assert_eq!(fixes_run.load(Ordering::SeqCst), 1);

    let second = project(temp_dir.path(), config, &fixes_run);
    let reused = second.dev_artifact(Environment::Client).unwrap();
    assert_eq!(reused.path(), built.path());
    assert_eq!(second.pipeline().context().builds(), 0);
    assert_eq!(fixes_run.load(Ordering::SeqCst), 1);
}

/// Forced reloads rebuild once per project, then hit the cache
#[test]
fn test_force_reload_rebuilds_once() {
    let temp_dir = TempDir::new().unwrap();
    write_client_jar(&temp_dir.path().join("client.jar"));
    let fixes_run = Arc::new(AtomicUsize::new(0));
    let mut config = PipelineConfig::with_cache_root(temp_dir.path().join("cache"));

    project(temp_dir.path(), config.clone(), &fixes_run).dev_artifact(Environment::Client).unwrap();
    assert_eq!(fixes_run.load(Ordering::SeqCst), 1);

    config.force_reload = true;
    let forced = project(temp_dir.path(), config, &fixes_run);
    let official = forced.namespace("official").unwrap();
    let ctx = forced.pipeline().context();
    let fixed = forced.pipeline().patcher().fix(ctx, &forced.pipeline().raw(Environment::Client).unwrap()).unwrap();
    assert!(fixed.exists());
    assert_eq!(fixes_run.load(Ordering::SeqCst), 2);

    forced.pipeline().provide(Environment::Client, &official, &official).unwrap();
    assert_eq!(ctx.builds(), 1);
    assert_eq!(fixes_run.load(Ordering::SeqCst), 2);
}

/// Deleting a cached jar makes the next project rebuild it
#[test]
fn test_deleted_artifact_is_rebuilt() {
    let temp_dir = TempDir::new().unwrap();
    write_client_jar(&temp_dir.path().join("client.jar"));
    let fixes_run = Arc::new(AtomicUsize::new(0));
    let config = PipelineConfig::with_cache_root(temp_dir.path().join("cache"));

    let built = project(temp_dir.path(), config.clone(), &fixes_run).dev_artifact(Environment::Client).unwrap();
    std::fs::remove_file(built.path()).unwrap();

    let again = project(temp_dir.path(), config, &fixes_run);
    let rebuilt = again.dev_artifact(Environment::Client).unwrap();
    assert!(rebuilt.exists());
    assert_eq!(again.pipeline().context().builds(), 1);
    assert_eq!(fixes_run.load(Ordering::SeqCst), 2);
}
