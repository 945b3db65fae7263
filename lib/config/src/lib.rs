//! Multi-file layered config loader.
//!
//! Both binaries load config the same way: a set of search paths (files or
//! directories), each filtered by keyword, parsed (toml/yaml/json by
//! extension) into a JSON value tree, and merged into one document that is
//! finally deserialized into the caller's config struct. Environment
//! variables and CLI flags are layered on top of the result by the caller.

use std::path::Path;

use anyhow::{Context, anyhow};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub struct ConfigLoader<'a> {
  /// File or directory paths to search, in order. Later paths override
  /// earlier ones on key collision.
  pub paths: &'a [&'a Path],
  /// When non-empty, only files whose name contains one of these
  /// (case-insensitive) are loaded out of a directory path.
  pub match_wildcards: &'a [&'a str],
  /// A marker file inside a directory path naming additional files (one per
  /// line, relative to the directory) to include regardless of
  /// `match_wildcards`.
  pub include_file_name: &'a str,
  /// Merge nested objects key-by-key instead of replacing the whole value.
  pub merge_nested: bool,
  /// Concatenate arrays instead of replacing them, when `merge_nested`.
  pub extend_array: bool,
  pub debug_print: bool,
}

impl ConfigLoader<'_> {
  pub fn load<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
    let mut merged = Value::Object(Default::default());

    for path in self.paths {
      for file in self.resolve_files(path)? {
        let value = parse_file(&file).with_context(|| {
          format!("failed to parse config file {file:?}")
        })?;
        if self.debug_print {
          println!("loaded config file {file:?}: {value:#?}");
        }
        merge(&mut merged, value, self.merge_nested, self.extend_array);
      }
    }

    serde_json::from_value(merged)
      .context("failed to deserialize merged config document")
  }

  fn resolve_files(
    &self,
    path: &Path,
  ) -> anyhow::Result<Vec<std::path::PathBuf>> {
    if path.is_file() {
      return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
      return Err(anyhow!("config path {path:?} does not exist"));
    }

    let mut files = Vec::new();
    let include_marker = path.join(self.include_file_name);
    if include_marker.is_file() {
      let contents = std::fs::read_to_string(&include_marker)
        .with_context(|| format!("failed to read {include_marker:?}"))?;
      for line in contents.lines().map(str::trim).filter(|l| !l.is_empty())
      {
        files.push(path.join(line));
      }
    }

    for entry in std::fs::read_dir(path)
      .with_context(|| format!("failed to read dir {path:?}"))?
    {
      let entry = entry?;
      let entry_path = entry.path();
      if !entry_path.is_file() {
        continue;
      }
      if files.contains(&entry_path) {
        continue;
      }
      let name = entry_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
      if name == self.include_file_name {
        continue;
      }
      let matches = self.match_wildcards.is_empty()
        || self.match_wildcards.iter().any(|kw| {
          name.to_lowercase().contains(&kw.to_lowercase())
        });
      if matches && is_config_extension(&entry_path) {
        files.push(entry_path);
      }
    }

    files.sort();
    Ok(files)
  }
}

fn is_config_extension(path: &Path) -> bool {
  matches!(
    path.extension().and_then(|e| e.to_str()),
    Some("toml" | "yaml" | "yml" | "json")
  )
}

fn parse_file(path: &Path) -> anyhow::Result<Value> {
  let contents = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read {path:?}"))?;
  match path.extension().and_then(|e| e.to_str()) {
    Some("toml") => {
      let toml_value: toml::Value = toml::from_str(&contents)?;
      Ok(serde_json::to_value(toml_value)?)
    }
    Some("yaml" | "yml") => {
      Ok(serde_yaml_ng::from_str(&contents)?)
    }
    Some("json") => Ok(serde_json::from_str(&contents)?),
    other => Err(anyhow!("unsupported config extension: {other:?}")),
  }
}

fn merge(base: &mut Value, incoming: Value, nested: bool, extend_array: bool) {
  match (base, incoming) {
    (Value::Object(base_map), Value::Object(incoming_map)) if nested => {
      for (key, value) in incoming_map {
        match base_map.get_mut(&key) {
          Some(existing) => merge(existing, value, nested, extend_array),
          None => {
            base_map.insert(key, value);
          }
        }
      }
    }
    (Value::Array(base_arr), Value::Array(mut incoming_arr))
      if nested && extend_array =>
    {
      base_arr.append(&mut incoming_arr);
    }
    (base, incoming) => {
      *base = incoming;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn shallow_merge_overrides_whole_key() {
    let mut base = json!({"a": {"x": 1, "y": 2}});
    let incoming = json!({"a": {"y": 3}});
    merge(&mut base, incoming, false, false);
    assert_eq!(base, json!({"a": {"y": 3}}));
  }

  #[test]
  fn nested_merge_preserves_sibling_keys() {
    let mut base = json!({"a": {"x": 1, "y": 2}});
    let incoming = json!({"a": {"y": 3}});
    merge(&mut base, incoming, true, false);
    assert_eq!(base, json!({"a": {"x": 1, "y": 3}}));
  }

  #[test]
  fn extend_array_concatenates() {
    let mut base = json!({"a": [1, 2]});
    let incoming = json!({"a": [3]});
    merge(&mut base, incoming, true, true);
    assert_eq!(base, json!({"a": [1, 2, 3]}));
  }
}
