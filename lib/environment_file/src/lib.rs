//! Helpers to let secret-shaped config fields (API keys, SMTP passwords,
//! webhook tokens) be supplied either inline or via a mounted file, matching
//! the `*_FILE` env var convention used by Docker / Kubernetes secrets.

use std::path::Path;

/// Reads a single value, preferring the file if given.
/// Logs and falls through to `item` if the file can't be read.
pub fn maybe_read_item_from_file(
  file: Option<impl AsRef<Path>>,
  item: Option<String>,
) -> Option<String> {
  match file {
    Some(path) => match std::fs::read_to_string(path.as_ref()) {
      Ok(contents) => Some(contents.trim().to_string()),
      Err(e) => {
        eprintln!(
          "failed to read secret file {:?} | {e:#} | falling back to inline value",
          path.as_ref()
        );
        item
      }
    },
    None => item,
  }
}

/// Reads a newline-delimited list, preferring the file if given.
pub fn maybe_read_list_from_file(
  file: Option<impl AsRef<Path>>,
  list: Option<Vec<String>>,
) -> Option<Vec<String>> {
  match file {
    Some(path) => match std::fs::read_to_string(path.as_ref()) {
      Ok(contents) => Some(
        contents
          .lines()
          .map(str::trim)
          .filter(|line| !line.is_empty())
          .map(String::from)
          .collect(),
      ),
      Err(e) => {
        eprintln!(
          "failed to read secret list file {:?} | {e:#} | falling back to inline value",
          path.as_ref()
        );
        list
      }
    },
    None => list,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn falls_back_when_no_file_given() {
    assert_eq!(
      maybe_read_item_from_file(None::<&str>, Some("inline".to_string())),
      Some("inline".to_string())
    );
  }

  #[test]
  fn reads_and_trims_file_contents() {
    let dir = std::env::temp_dir();
    let path = dir.join("environment_file_test_item.txt");
    std::fs::write(&path, "secret-value\n").unwrap();
    assert_eq!(
      maybe_read_item_from_file(Some(&path), None),
      Some("secret-value".to_string())
    );
    std::fs::remove_file(path).ok();
  }
}
