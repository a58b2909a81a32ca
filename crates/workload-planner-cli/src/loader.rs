//! Reading inventories and plans from disk.
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu};
use tracing::debug;
use workload_planner::value::{self, Value};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse {path:?} as YAML"))]
    ParseYaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse {path:?} as JSON"))]
    ParseJson {
        source: serde_json::Error,
        path: PathBuf,
    },
}

/// Reads every inventory file and deep-merges them, later files taking precedence.
pub fn load_inventory(paths: &[PathBuf]) -> Result<Value> {
    let layers = paths
        .iter()
        .map(|path| read_document::<Value>(path))
        .collect::<Result<Vec<_>>>()?;
    debug!(layers = layers.len(), "loaded inventory");
    Ok(value::merge_chain(&layers))
}

/// Reads a YAML or JSON document, depending on the file extension. Anything but `.json` is read as YAML.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).context(ReadFileSnafu { path })?;
    let is_json = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&contents).context(ParseJsonSnafu { path })
    } else {
        serde_yaml::from_str(&contents).context(ParseYamlSnafu { path })
    }
}
