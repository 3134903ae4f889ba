//! Engine configuration file rendering.
//!
//! The engine reads YAML. JSON is a subset of YAML, so the file is written
//! with `serde_json` and needs no extra serialiser.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};

use super::LaunchPlan;
use super::errors::EngineLaunchError;

/// File name of the rendered engine configuration, relative to `conf/`.
pub const ENGINE_CONFIG_FILE: &str = "cassandra.yaml";

const SEED_PROVIDER_CLASS: &str = "org.apache.cassandra.locator.SimpleSeedProvider";

/// Renders the engine configuration for `plan` into its working directory.
///
/// Data directories default to subdirectories of the working directory so
/// concurrent instances never share state.
///
/// # Errors
///
/// Returns [`EngineLaunchError::Prepare`] when the file cannot be written.
pub fn write_engine_config(plan: &LaunchPlan) -> Result<PathBuf, EngineLaunchError> {
    let conf_dir = plan.working_directory().join("conf");
    fs::create_dir_all(&conf_dir).map_err(|source| EngineLaunchError::Prepare {
        path: conf_dir.clone(),
        source,
    })?;

    let path = conf_dir.join(ENGINE_CONFIG_FILE);
    let document = render(plan);
    write_json(&path, &document).map_err(|source| EngineLaunchError::Prepare {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn render(plan: &LaunchPlan) -> Value {
    let workdir = plan.working_directory();
    let mut document = Map::new();
    document.insert("cluster_name".into(), json!("cradle"));
    document.insert("listen_address".into(), json!(plan.host().to_string()));
    document.insert("rpc_address".into(), json!(plan.host().to_string()));
    document.insert(
        "data_file_directories".into(),
        json!([display(&workdir.join("data"))]),
    );
    document.insert(
        "commitlog_directory".into(),
        json!(display(&workdir.join("commitlog"))),
    );
    document.insert(
        "saved_caches_directory".into(),
        json!(display(&workdir.join("saved_caches"))),
    );
    document.insert(
        "hints_directory".into(),
        json!(display(&workdir.join("hints"))),
    );
    document.insert(
        "cdc_raw_directory".into(),
        json!(display(&workdir.join("cdc_raw"))),
    );
    for (key, value) in plan.config_properties() {
        document.insert(key.clone(), json!(value));
    }
    document.insert(
        "seed_provider".into(),
        json!([{
            "class_name": SEED_PROVIDER_CLASS,
            "parameters": [{ "seeds": plan.seeds() }],
        }]),
    );
    Value::Object(document)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn write_json(path: &Path, document: &Value) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, document)?;
    writer.write_all(b"\n")?;
    writer.flush()
}
