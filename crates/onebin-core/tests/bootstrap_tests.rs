//! Integration tests for the launch bootstrap
//!
//! Runs the full state machine against in-memory resources and a recording
//! runtime, with the install tree redirected into a temporary directory.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Barrier;
use std::thread;

use onebin_core::{
    Bootstrap, EntryPoints, LaunchError, LaunchSettings, LoadError, MemoryResources,
    ResourceLayout, RuntimeInstall, RuntimeLibrary, RuntimeLoader, Stage, WideString,
};
use tempfile::TempDir;

#[derive(Debug, Default)]
struct Calls {
    loaded: Vec<PathBuf>,
    home: Option<String>,
    path: Option<String>,
    args: Vec<String>,
    released: bool,
}

#[derive(Clone, Default)]
struct RecordingLoader {
    calls: Rc<RefCell<Calls>>,
    exit_code: i32,
    fail: bool,
}

struct RecordingRuntime {
    calls: Rc<RefCell<Calls>>,
    exit_code: i32,
}

impl RuntimeLoader for RecordingLoader {
    type Library = RecordingRuntime;

    fn load(&self, path: &Path, _entry_points: &EntryPoints) -> Result<RecordingRuntime, LoadError> {
        if self.fail {
            return Err(LoadError::NotFound {
                path: path.display().to_string(),
                reason: "not a shared library".to_string(),
            });
        }
        self.calls.borrow_mut().loaded.push(path.to_path_buf());
        Ok(RecordingRuntime {
            calls: self.calls.clone(),
            exit_code: self.exit_code,
        })
    }
}

impl RuntimeLibrary for RecordingRuntime {
    fn set_home(&mut self, home: WideString) {
        self.calls.borrow_mut().home = Some(home.to_string_lossy());
    }

    fn set_path(&mut self, path: WideString) {
        self.calls.borrow_mut().path = Some(path.to_string_lossy());
    }

    fn run_main(&mut self, args: Vec<WideString>) -> i32 {
        self.calls.borrow_mut().args = args.iter().map(|a| a.to_string_lossy()).collect();
        self.exit_code
    }
}

impl Drop for RecordingRuntime {
    fn drop(&mut self) {
        self.calls.borrow_mut().released = true;
    }
}

fn put_named(res: &mut MemoryResources, name_id: u16, data_id: u16, name: &str, data: &[u8]) {
    res.insert(onebin_core::ResourceKind::RawData, name_id, name.as_bytes().to_vec());
    res.insert(onebin_core::ResourceKind::RawData, data_id, data.to_vec());
}

/// Bundle with three runtime files and the given application archive contents.
fn bundle(app: &[u8]) -> MemoryResources {
    let layout = ResourceLayout::standard();
    let mut res = MemoryResources::new()
        .with_raw(layout.short_version, b"py311".to_vec())
        .with_raw(layout.long_version, b"py311_64".to_vec())
        .with_raw(layout.runtime_file_count, vec![3]);

    put_named(&mut res, 36, 37, "launch.py", b"import main");
    put_named(&mut res, 38, 39, "lib.zip", b"lib");
    put_named(&mut res, 42, 43, "main.pyz", app);
    put_named(&mut res, 46, 47, "py311hash.json", b"{}");
    put_named(&mut res, 48, 49, "py311x.zip", b"stdlib");

    let runtime_files: [(&str, &[u8]); 3] = [
        ("py311.dll", b"runtime"),
        ("py311.zip", b"modules"),
        ("_ctypes.pyd", b"ext"),
    ];
    for (index, (name, data)) in runtime_files.iter().enumerate() {
        let slot = layout.runtime_file_slot(index).unwrap();
        put_named(&mut res, slot.name, slot.data, name, data);
    }
    res
}

fn settings(root: &Path) -> LaunchSettings {
    LaunchSettings::default().with_install_root(root)
}

#[test]
fn test_first_launch_installs_and_runs() {
    let tmp = TempDir::new().unwrap();
    let res = bundle(b"app v1");
    let loader = RecordingLoader {
        exit_code: 7,
        ..RecordingLoader::default()
    };

    let outcome = Bootstrap::new(&res, loader.clone())
        .with_settings(settings(tmp.path()))
        .run(&["--verbose"])
        .unwrap();

    assert_eq!(outcome.exit_code, 7);
    assert_eq!(outcome.prepared.runtime, RuntimeInstall::Installed { files: 3 });
    assert_eq!(outcome.prepared.payload.len(), 5);

    let base = tmp.path().join("app");
    let home = base.join("py311_64");
    for name in ["py311.dll", "py311.zip", "_ctypes.pyd"] {
        assert!(home.join(name).is_file(), "missing runtime file {}", name);
    }
    assert_eq!(fs::read(base.join("main.pyz")).unwrap(), b"app v1");
    assert_eq!(fs::read(base.join("launch.py")).unwrap(), b"import main");

    let calls = loader.calls.borrow();
    assert_eq!(calls.loaded.len(), 1);
    assert_eq!(calls.loaded[0].parent(), Some(home.as_path()));
    assert_eq!(calls.home.as_deref().map(PathBuf::from), Some(home.clone()));

    let search = calls.path.clone().unwrap();
    let segments: Vec<PathBuf> = search.split(';').map(PathBuf::from).collect();
    assert_eq!(
        segments,
        vec![
            base.clone(),
            home.clone(),
            home.join("py311.zip"),
            base.join("lib.zip"),
        ]
    );

    assert_eq!(calls.args.len(), 4);
    assert_eq!(calls.args[0], "");
    assert_eq!(calls.args[1], "-I");
    assert_eq!(PathBuf::from(&calls.args[2]), base.join("launch.py"));
    assert_eq!(calls.args[3], "--verbose");
    assert!(calls.released);
}

#[test]
fn test_second_launch_reuses_runtime_and_refreshes_payload() {
    let tmp = TempDir::new().unwrap();
    let home = tmp.path().join("app").join("py311_64");

    Bootstrap::new(&bundle(b"app v1"), RecordingLoader::default())
        .with_settings(settings(tmp.path()))
        .run::<&str>(&[])
        .unwrap();

    // a locally modified runtime file must survive later launches
    fs::write(home.join("py311.zip"), b"patched").unwrap();

    let outcome = Bootstrap::new(&bundle(b"app v2, longer"), RecordingLoader::default())
        .with_settings(settings(tmp.path()))
        .run::<&str>(&[])
        .unwrap();

    assert_eq!(outcome.prepared.runtime, RuntimeInstall::Reused { filled: 0 });
    assert_eq!(fs::read(home.join("py311.zip")).unwrap(), b"patched");
    assert_eq!(
        fs::read(tmp.path().join("app").join("main.pyz")).unwrap(),
        b"app v2, longer"
    );
}

#[test]
fn test_missing_runtime_file_is_filled_in() {
    let tmp = TempDir::new().unwrap();
    let home = tmp.path().join("app").join("py311_64");
    let res = bundle(b"app");

    let bootstrap = Bootstrap::new(&res, RecordingLoader::default()).with_settings(settings(tmp.path()));
    bootstrap.prepare().unwrap();
    fs::remove_file(home.join("_ctypes.pyd")).unwrap();

    let prepared = bootstrap.prepare().unwrap();
    assert_eq!(prepared.runtime, RuntimeInstall::Reused { filled: 1 });
    assert_eq!(fs::read(home.join("_ctypes.pyd")).unwrap(), b"ext");
}

#[test]
fn test_repeated_preparation_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let res = bundle(b"same");
    let bootstrap = Bootstrap::new(&res, RecordingLoader::default()).with_settings(settings(tmp.path()));

    let snapshot = |dir: &Path| -> Vec<(PathBuf, Vec<u8>)> {
        let mut files = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let data = fs::read(&path).unwrap();
                    files.push((path, data));
                }
            }
        }
        files.sort();
        files
    };

    bootstrap.prepare().unwrap();
    let first = snapshot(tmp.path());
    bootstrap.prepare().unwrap();
    assert_eq!(snapshot(tmp.path()), first);
}

#[test]
fn test_concurrent_first_launches_share_one_install() {
    let tmp = TempDir::new().unwrap();
    let res = bundle(b"app");
    let start = Barrier::new(2);
    let launch = || {
        let bootstrap =
            Bootstrap::new(&res, onebin_core::DynamicLoader).with_settings(settings(tmp.path()));
        start.wait();
        bootstrap.prepare().map(|prepared| prepared.runtime)
    };

    let results = thread::scope(|scope| {
        let first = scope.spawn(|| launch());
        let second = scope.spawn(|| launch());
        [first.join().unwrap(), second.join().unwrap()]
    });

    for result in &results {
        assert!(result.is_ok(), "launch failed: {:?}", result);
    }
    let installed = results
        .iter()
        .filter(|r| matches!(r, Ok(RuntimeInstall::Installed { files: 3 })))
        .count();
    assert!(installed >= 1);

    let base = tmp.path().join("app");
    let mut home: Vec<_> = fs::read_dir(base.join("py311_64"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    home.sort();
    assert_eq!(home, vec!["_ctypes.pyd", "py311.dll", "py311.zip"]);
    assert_eq!(fs::read(base.join("py311_64").join("py311.dll")).unwrap(), b"runtime");

    let leftovers: Vec<_> = fs::read_dir(&base)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".partial") || name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "left behind: {:?}", leftovers);
}

#[test]
fn test_missing_version_fails_at_init() {
    let tmp = TempDir::new().unwrap();
    let mut res = bundle(b"app");
    res.remove(onebin_core::ResourceKind::RawData, ResourceLayout::standard().short_version);
    let loader = RecordingLoader::default();

    let err = Bootstrap::new(&res, loader.clone())
        .with_settings(settings(tmp.path()))
        .run::<&str>(&[])
        .unwrap_err();

    assert_eq!(err.stage, Stage::Init);
    assert!(matches!(err.source, LaunchError::Configuration(_)));
    assert!(!tmp.path().join("app").exists());
    assert!(loader.calls.borrow().loaded.is_empty());
}

#[test]
fn test_load_failure_reports_stage_and_never_runs() {
    let tmp = TempDir::new().unwrap();
    let res = bundle(b"app");
    let loader = RecordingLoader {
        fail: true,
        ..RecordingLoader::default()
    };

    let err = Bootstrap::new(&res, loader.clone())
        .with_settings(settings(tmp.path()))
        .run::<&str>(&[])
        .unwrap_err();

    assert_eq!(err.stage, Stage::LoadRuntimeLibrary);
    assert!(matches!(err.source, LaunchError::DynamicLoad(_)));
    assert!(loader.calls.borrow().args.is_empty());
    assert!(err.to_string().starts_with("loading runtime library failed"));
}

#[test]
fn test_too_many_arguments_fails_before_running() {
    let tmp = TempDir::new().unwrap();
    let res = bundle(b"app");
    let loader = RecordingLoader::default();
    let forwarded: Vec<String> = (0..40).map(|i| format!("arg{}", i)).collect();

    let err = Bootstrap::new(&res, loader.clone())
        .with_settings(settings(tmp.path()))
        .run(&forwarded)
        .unwrap_err();

    assert_eq!(err.stage, Stage::BuildArgs);
    assert!(matches!(
        err.source,
        LaunchError::ArgumentOverflow { given: 43, limit: 32 }
    ));
    assert!(loader.calls.borrow().args.is_empty());
    assert!(loader.calls.borrow().released);
}

#[test]
fn test_runtime_file_with_unsafe_name_rejected() {
    let tmp = TempDir::new().unwrap();
    let layout = ResourceLayout::standard();
    let mut res = bundle(b"app");
    let slot = layout.runtime_file_slot(0).unwrap();
    put_named(&mut res, slot.name, slot.data, "../escape.dll", b"x");

    let err = Bootstrap::new(&res, RecordingLoader::default())
        .with_settings(settings(tmp.path()))
        .prepare()
        .unwrap_err();

    assert_eq!(err.stage, Stage::ExtractRuntime);
    assert!(!tmp.path().join("app").join("escape.dll").exists());
    assert!(!tmp.path().join("app").join("py311_64").exists());
}

#[test]
fn test_zero_runtime_files_still_launches() {
    let tmp = TempDir::new().unwrap();
    let layout = ResourceLayout::standard();
    let mut res = bundle(b"app");
    res.insert(onebin_core::ResourceKind::RawData, layout.runtime_file_count, vec![0]);

    let outcome = Bootstrap::new(&res, RecordingLoader::default())
        .with_settings(settings(tmp.path()))
        .run::<&str>(&[])
        .unwrap();

    assert_eq!(outcome.prepared.runtime, RuntimeInstall::Installed { files: 0 });
    assert!(tmp.path().join("app").join("py311_64").is_dir());
}
