#![allow(clippy::disallowed_methods)]

use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use pretty_assertions::assert_eq;
use pyfold::{
    BundleError, BundleOrchestrator, Config, OutputMode, emit::WRITE_MODULE_FN, write_bundle,
};
use tempfile::TempDir;

/// Lay out a small project and return its root.
fn project(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for (path, contents) in files {
        let target = temp_dir.path().join(path);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, contents).unwrap();
    }
    temp_dir
}

fn python3() -> Option<&'static str> {
    Command::new("python3")
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|_| "python3")
}

/// Bundle `entry`, write the result outside the project and run it to
/// completion, whatever its exit status.
///
/// Returns `None` when no `python3` is available to run the bundle.
fn run_bundle(entry: &Path, config: Config) -> Option<Output> {
    let python = python3()?;
    let bundle = BundleOrchestrator::new(config).bundle(entry).unwrap();

    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join(match bundle.mode {
        OutputMode::Inline => "bundle.py",
        OutputMode::Archive => "bundle.pyz",
    });
    write_bundle(&bundle, &output).unwrap();

    Some(Command::new(python).arg(&output).output().unwrap())
}

/// Like [`run_bundle`], but the bundle must succeed; returns its stdout.
fn bundle_and_run(entry: &Path, config: Config) -> Option<String> {
    let result = run_bundle(entry, config)?;
    assert!(
        result.status.success(),
        "bundle failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    Some(String::from_utf8(result.stdout).unwrap())
}

/// Relative paths passed to the module-write calls of an inline bundle
fn written_modules(script: &str) -> Vec<String> {
    let marker = format!("{WRITE_MODULE_FN}('");
    script
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix(&marker))
        .filter_map(|rest| rest.split('\'').next())
        .map(str::to_owned)
        .collect()
}

fn inline_script(entry: &Path, config: Config) -> String {
    let bundle = BundleOrchestrator::new(config).bundle(entry).unwrap();
    String::from_utf8(bundle.contents).unwrap()
}

const GREETING: &str = "def message():\n    return 'Hello'\n";

#[test]
fn test_hello_scenario() {
    let project = project(&[
        ("hello.py", "import greeting\nprint(greeting.message())\n"),
        ("greeting.py", GREETING),
    ]);
    let entry = project.path().join("hello.py");

    let script = inline_script(&entry, Config::default());
    assert_eq!(written_modules(&script), vec!["greeting.py".to_owned()]);

    if let Some(stdout) = bundle_and_run(&entry, Config::default()) {
        assert_eq!(stdout, "Hello\n");
    }
}

#[test]
fn test_stdlib_modules_are_not_embedded() {
    let project = project(&[
        (
            "main.py",
            "import xml.etree.ElementTree as ET\nimport greeting\n\n\
             root = ET.fromstring('<a><b>text</b></a>')\n\
             print(root.find('b').text)\nprint(greeting.message())\n",
        ),
        ("greeting.py", GREETING),
    ]);
    let entry = project.path().join("main.py");

    let script = inline_script(&entry, Config::default());
    assert_eq!(written_modules(&script), vec!["greeting.py".to_owned()]);

    if let Some(stdout) = bundle_and_run(&entry, Config::default()) {
        assert_eq!(stdout, "text\nHello\n");
    }
}

#[test]
fn test_forced_module_is_bundled() {
    let project = project(&[
        (
            "main.py",
            "import importlib\n\nmodule = importlib.import_module('gree' + 'ting')\nprint(module.message())\n",
        ),
        ("greeting.py", GREETING),
    ]);
    let entry = project.path().join("main.py");

    // Invisible to static scanning
    assert!(written_modules(&inline_script(&entry, Config::default())).is_empty());

    let config = Config {
        python_modules: vec!["greeting".to_owned()],
        ..Default::default()
    };
    let script = inline_script(&entry, config.clone());
    assert_eq!(written_modules(&script), vec!["greeting.py".to_owned()]);

    if let Some(stdout) = bundle_and_run(&entry, config) {
        assert_eq!(stdout, "Hello\n");
    }
}

#[test]
fn test_unresolved_forced_module_is_fatal() {
    let project = project(&[("main.py", "print('hi')\n")]);
    let config = Config {
        python_modules: vec!["does_not_exist".to_owned()],
        ..Default::default()
    };

    let err = BundleOrchestrator::new(config)
        .bundle(&project.path().join("main.py"))
        .unwrap_err();
    match err.downcast_ref::<BundleError>() {
        Some(BundleError::UnresolvedForcedModule { name, .. }) => {
            assert_eq!(name, "does_not_exist");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_syntax_error_names_the_file() {
    let project = project(&[
        ("main.py", "import broken\n"),
        ("broken.py", "x = 1\ndef oops(:\n"),
    ]);

    let err = BundleOrchestrator::new(Config::default())
        .bundle(&project.path().join("main.py"))
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("broken.py"), "{message}");
    assert!(message.contains(":2"), "{message}");
}

#[test]
fn test_circular_imports_terminate_and_run() {
    let project = project(&[
        ("main.py", "import a\nprint(a.value())\n"),
        (
            "a.py",
            "import b\n\ndef value():\n    return 'a+' + b.NAME\n",
        ),
        ("b.py", "import a\n\nNAME = 'b'\n"),
    ]);
    let entry = project.path().join("main.py");

    let script = inline_script(&entry, Config::default());
    assert_eq!(
        written_modules(&script),
        vec!["a.py".to_owned(), "b.py".to_owned()]
    );

    if let Some(stdout) = bundle_and_run(&entry, Config::default()) {
        assert_eq!(stdout, "a+b\n");
    }
}

#[test]
fn test_quote_delimiters_round_trip() {
    let tricky = "A = '''x'''\nB = \"\"\"y\"\"\"\nC = 'it\\'s'\nD = \"\\\\n\"\n";
    let project = project(&[
        (
            "main.py",
            "import os\nimport tricky\n\n\
             with open(os.path.join(os.path.dirname(tricky.__file__), 'tricky.py'), 'rb') as f:\n    \
             print(repr(f.read()))\n",
        ),
        ("tricky.py", tricky),
    ]);
    let entry = project.path().join("main.py");

    if let Some(stdout) = bundle_and_run(&entry, Config::default()) {
        let expected = Command::new("python3")
            .args(["-c", "import sys; print(repr(open(sys.argv[1], 'rb').read()))"])
            .arg(project.path().join("tricky.py"))
            .output()
            .unwrap();
        assert_eq!(stdout, String::from_utf8(expected.stdout).unwrap());
    }
}

#[test]
fn test_entry_multiline_strings_keep_their_contents() {
    let project = project(&[(
        "main.py",
        "from __future__ import annotations\n\nTEXT = \"\"\"first\nsecond\n  third\"\"\"\nprint(TEXT)\n",
    )]);
    let entry = project.path().join("main.py");

    let script = inline_script(&entry, Config::default());
    assert!(script.contains("from __future__ import annotations\n"));
    assert!(script.contains("\nsecond\n  third\"\"\"\n"));

    if let Some(stdout) = bundle_and_run(&entry, Config::default()) {
        assert_eq!(stdout, "first\nsecond\n  third\n");
    }
}

#[test]
fn test_relative_imports_resolve_to_absolute_identities() {
    let project = project(&[
        ("main.py", "import p\nprint(p.a.describe())\n"),
        ("p/__init__.py", "from . import a\n"),
        (
            "p/a.py",
            "from .. import b\n\ndef describe():\n    return 'a uses ' + b.NAME\n",
        ),
        ("b.py", "NAME = 'b'\n"),
    ]);
    let entry = project.path().join("main.py");

    // `from .. import b` inside `p.a` climbs to the top level
    let script = inline_script(&entry, Config::default());
    assert_eq!(
        written_modules(&script),
        vec![
            "p/__init__.py".to_owned(),
            "p/a.py".to_owned(),
            "b.py".to_owned()
        ]
    );
}

#[test]
fn test_shared_dependency_is_embedded_once() {
    let project = project(&[
        ("main.py", "import a\nimport b\nprint(a.X + b.X)\n"),
        ("a.py", "import shared\nX = shared.X\n"),
        ("b.py", "from shared import X\n"),
        ("shared.py", "X = 21\n"),
    ]);
    let entry = project.path().join("main.py");

    let script = inline_script(&entry, Config::default());
    assert_eq!(
        written_modules(&script),
        vec!["a.py".to_owned(), "shared.py".to_owned(), "b.py".to_owned()]
    );

    if let Some(stdout) = bundle_and_run(&entry, Config::default()) {
        assert_eq!(stdout, "42\n");
    }
}

#[test]
fn test_copy_shebang() {
    let project = project(&[("main.py", "#!/opt/custom/python -u\nprint('hi')\n")]);
    let entry = project.path().join("main.py");

    let default_script = inline_script(&entry, Config::default());
    assert!(default_script.starts_with("#!/usr/bin/env python\n"));

    let copied = inline_script(
        &entry,
        Config {
            copy_shebang: true,
            ..Default::default()
        },
    );
    assert!(copied.starts_with("#!/opt/custom/python -u\n"));
}

#[test]
fn test_archive_mode_runs() {
    let project = project(&[
        ("main.py", "from app.ns import deep\nprint(deep.VALUE)\n"),
        ("app/__init__.py", ""),
        ("app/ns/deep.py", "VALUE = 'deep'\n"),
    ]);
    let entry = project.path().join("main.py");
    let config = Config {
        mode: OutputMode::Archive,
        shebang: "/usr/bin/env python3".to_owned(),
        ..Default::default()
    };

    let bundle = BundleOrchestrator::new(config.clone())
        .bundle(&entry)
        .unwrap();
    assert!(bundle.contents.starts_with(b"#!/usr/bin/env python3\n"));
    let identities: Vec<&str> = bundle.modules.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(identities, vec!["app", "app.ns.deep"]);

    if let Some(stdout) = bundle_and_run(&entry, config) {
        assert_eq!(stdout, "deep\n");
    }
}

#[test]
fn test_bundling_is_deterministic() {
    let project = project(&[
        ("main.py", "import a\nfrom pkg import b, c\n"),
        ("a.py", "import pkg.c\n"),
        ("pkg/__init__.py", ""),
        ("pkg/b.py", ""),
        ("pkg/c.py", "from . import b\n"),
    ]);
    let entry: PathBuf = project.path().join("main.py");

    let first = BundleOrchestrator::new(Config::default())
        .bundle(&entry)
        .unwrap();
    let second = BundleOrchestrator::new(Config::default())
        .bundle(&entry)
        .unwrap();

    assert_eq!(first.modules, second.modules);
    assert_eq!(first.contents, second.contents);
}

/// Prints the staging directory, which the prelude put first on `sys.path`
const PRINT_STAGING_DIR: &str = "import sys\nprint(sys.path[0], flush=True)\n";

fn staging_dir(stdout: &[u8]) -> PathBuf {
    let stdout = String::from_utf8_lossy(stdout);
    let first_line = stdout.lines().next().unwrap_or_default().trim();
    let dir = PathBuf::from(first_line);
    // `tempfile.mkdtemp()` names start with `tmp`
    assert!(
        dir.is_absolute()
            && dir
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with("tmp")),
        "unexpected staging directory {dir:?}"
    );
    dir
}

fn run_entry(entry_source: &str) -> Option<Output> {
    let project = project(&[("main.py", entry_source), ("lazy.py", "VALUE = 'lazy'\n")]);
    run_bundle(&project.path().join("main.py"), Config::default())
}

#[test]
fn test_staging_dir_removed_after_normal_exit() {
    let entry = format!("{PRINT_STAGING_DIR}import lazy\nprint(lazy.VALUE)\n");
    let Some(result) = run_entry(&entry) else {
        return;
    };

    assert!(result.status.success());
    assert_eq!(
        String::from_utf8_lossy(&result.stdout).lines().nth(1),
        Some("lazy")
    );
    assert!(!staging_dir(&result.stdout).exists());
}

#[test]
fn test_staging_dir_removed_after_system_exit() {
    let entry = format!("{PRINT_STAGING_DIR}raise SystemExit(3)\n");
    let Some(result) = run_entry(&entry) else {
        return;
    };

    assert_eq!(result.status.code(), Some(3));
    assert!(!staging_dir(&result.stdout).exists());
}

#[test]
fn test_staging_dir_removed_after_uncaught_exception() {
    let entry = format!("{PRINT_STAGING_DIR}raise RuntimeError('boom')\n");
    let Some(result) = run_entry(&entry) else {
        return;
    };

    assert_eq!(result.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&result.stderr).contains("RuntimeError: boom"));
    assert!(!staging_dir(&result.stdout).exists());
}

#[cfg(unix)]
#[test]
fn test_staging_dir_removed_after_sigterm() {
    use std::os::unix::process::ExitStatusExt;

    let entry = format!(
        "{PRINT_STAGING_DIR}import os\nimport signal\nimport time\n\n\
         os.kill(os.getpid(), signal.SIGTERM)\ntime.sleep(10)\nprint('not reached')\n"
    );
    let Some(result) = run_entry(&entry) else {
        return;
    };

    assert_eq!(result.status.signal(), Some(15));
    assert!(!String::from_utf8_lossy(&result.stdout).contains("not reached"));
    assert!(!staging_dir(&result.stdout).exists());
}

/// Lazily imports the bundled `lazy` module after a forked child has gone.
const LAZY_IMPORT_AFTER_CHILD: &str = "
def load_lazily():
    import lazy
    return lazy.VALUE

print(os.path.isdir(sys.path[0]))
print(load_lazily())
";

#[cfg(unix)]
#[test]
fn test_terminated_forked_child_keeps_parent_staging_dir() {
    let entry = format!(
        "{PRINT_STAGING_DIR}import multiprocessing\nimport os\nimport time\n\n\
         def wait_forever():\n    time.sleep(30)\n\n\
         child = multiprocessing.get_context('fork').Process(target=wait_forever)\n\
         child.start()\nchild.terminate()\nchild.join()\n{LAZY_IMPORT_AFTER_CHILD}"
    );
    let Some(result) = run_entry(&entry) else {
        return;
    };

    assert!(
        result.status.success(),
        "bundle failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert_eq!(stdout.lines().skip(1).collect::<Vec<_>>(), vec!["True", "lazy"]);
    assert!(!staging_dir(&result.stdout).exists());
}

#[cfg(unix)]
#[test]
fn test_exiting_forked_child_keeps_parent_staging_dir() {
    let entry = format!(
        "{PRINT_STAGING_DIR}import os\n\n\
         pid = os.fork()\nif pid == 0:\n    sys.exit(0)\nos.waitpid(pid, 0)\n{LAZY_IMPORT_AFTER_CHILD}"
    );
    let Some(result) = run_entry(&entry) else {
        return;
    };

    assert!(
        result.status.success(),
        "bundle failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert_eq!(stdout.lines().skip(1).collect::<Vec<_>>(), vec!["True", "lazy"]);
    assert!(!staging_dir(&result.stdout).exists());
}
