use regex::{Regex, RegexBuilder};

/// Compiles a filter string into a matcher, per the redesign flag in §9:
/// a leading `^` means the string is already a regex; otherwise a `*` is
/// treated as a glob wildcard and converted to `.*`, anchored at both ends.
/// Matching is always case-insensitive. An empty or absent pattern matches
/// everything.
pub fn compile_filter_pattern(
  pattern: Option<&str>,
) -> anyhow::Result<FilterPattern> {
  let Some(pattern) = pattern.filter(|p| !p.is_empty()) else {
    return Ok(FilterPattern::MatchAll);
  };

  let regex = if let Some(stripped) = pattern.strip_prefix('^') {
    RegexBuilder::new(&format!("^{stripped}"))
      .case_insensitive(true)
      .build()?
  } else if pattern.contains('*') {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    RegexBuilder::new(&format!("^{escaped}$"))
      .case_insensitive(true)
      .build()?
  } else {
    RegexBuilder::new(&format!("^{}$", regex::escape(pattern)))
      .case_insensitive(true)
      .build()?
  };

  Ok(FilterPattern::Regex(regex))
}

pub enum FilterPattern {
  MatchAll,
  Regex(Regex),
}

impl FilterPattern {
  pub fn matches(&self, candidate: &str) -> bool {
    match self {
      FilterPattern::MatchAll => true,
      FilterPattern::Regex(regex) => regex.is_match(candidate),
    }
  }
}

pub fn matches_filter(pattern: Option<&str>, candidate: &str) -> bool {
  match compile_filter_pattern(pattern) {
    Ok(compiled) => compiled.matches(candidate),
    Err(_) => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_or_none_matches_everything() {
    assert!(matches_filter(None, "anything"));
    assert!(matches_filter(Some(""), "anything"));
  }

  #[test]
  fn glob_star_is_anchored_and_case_insensitive() {
    assert!(matches_filter(Some("web-*"), "WEB-frontend"));
    assert!(!matches_filter(Some("web-*"), "the-web-frontend"));
  }

  #[test]
  fn leading_caret_is_treated_as_regex() {
    assert!(matches_filter(Some("^web-.*"), "web-frontend-1"));
    assert!(matches_filter(Some("^web-.*"), "WEB-frontend-1"));
  }

  #[test]
  fn literal_pattern_requires_exact_match() {
    assert!(matches_filter(Some("alpha"), "alpha"));
    assert!(!matches_filter(Some("alpha"), "alphabeta"));
  }
}
