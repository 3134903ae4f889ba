//! Loading fails fast and reports every broken configuration layer.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use cradle_config::Config;
use once_cell::sync::Lazy;
use ortho_config::{OrthoConfig, OrthoError};
use rstest::{fixture, rstest};
use tempfile::TempDir;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Temporary directory plus environment overrides, restored on drop.
struct Sandbox {
    dir: TempDir,
    restore: Vec<(&'static str, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl Sandbox {
    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write config file");
        path
    }

    fn set_env(&mut self, key: &'static str, value: impl AsRef<std::ffi::OsStr>) {
        self.restore.push((key, std::env::var_os(key)));
        // Environment mutation is unsafe on edition 2024; the mutex keeps
        // sandboxes from interleaving within this binary.
        unsafe { std::env::set_var(key, value) };
    }

    fn load_with_file(&self, path: &Path) -> Result<Config, std::sync::Arc<OrthoError>> {
        Config::load_from_iter([
            OsString::from("cradle"),
            OsString::from("--config-path"),
            path.as_os_str().to_owned(),
        ])
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        while let Some((key, previous)) = self.restore.pop() {
            match previous {
                Some(value) => unsafe { std::env::set_var(key, value) },
                None => unsafe { std::env::remove_var(key) },
            }
        }
    }
}

#[fixture]
fn sandbox() -> Sandbox {
    Sandbox {
        _guard: ENV_MUTEX.lock().unwrap_or_else(PoisonError::into_inner),
        dir: TempDir::new().expect("create temp dir"),
        restore: Vec::new(),
    }
}

#[rstest]
fn both_broken_files_are_reported_together(mut sandbox: Sandbox) {
    let cli_path = sandbox.write("cli.toml", r#"engine_binary = "cassandra" cleanup = true"#);
    let env_path = sandbox.write("env.toml", "startup_timeout_secs = not_a_number");
    sandbox.set_env("CRADLE_CONFIG_PATH", &env_path);

    let error = sandbox
        .load_with_file(&cli_path)
        .expect_err("loading must fail");
    assert!(
        error.to_string().contains("multiple configuration errors"),
        "expected aggregate message, got {error}"
    );

    let OrthoError::Aggregate(aggregate) = error.as_ref() else {
        panic!("expected aggregated error, got {error:?}");
    };
    let mut reported: Vec<PathBuf> = aggregate
        .iter()
        .filter_map(|err| match err {
            OrthoError::File { path, .. } => Some(path.clone()),
            _ => None,
        })
        .collect();
    reported.sort();
    let mut expected = vec![cli_path, env_path];
    expected.sort();
    assert_eq!(reported, expected);
}

#[rstest]
#[case::auto_fix_mode("jvm_auto_fix = \"sometimes\"\n")]
#[case::baseline("baseline = \"nightly\"\n")]
#[case::port_mode("port_mode = \"sequential\"\n")]
#[case::negative_timeout("startup_timeout_secs = -1\n")]
#[case::log_format("log_format = \"yaml\"\n")]
fn out_of_vocabulary_file_values_are_rejected(sandbox: Sandbox, #[case] contents: &str) {
    let path = sandbox.write("cradle.toml", contents);
    assert!(sandbox.load_with_file(&path).is_err());
}

#[rstest]
fn unknown_auto_fix_mode_in_environment_is_rejected(mut sandbox: Sandbox) {
    sandbox.set_env("CRADLE_JVM_AUTO_FIX", "sometimes");
    assert!(Config::load_from_iter([OsString::from("cradle")]).is_err());
}
