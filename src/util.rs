//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces `{key}` placeholders in one left-to-right pass. Substituted text is
/// never re-scanned, so values may themselves contain braces. Unknown or
/// unterminated placeholders are kept verbatim.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let value = after
      .find('}')
      .and_then(|close| pairs.iter().find(|(k, _)| *k == &after[..close]).map(|(_, v)| (close, *v)));
    match value {
      Some((close, v)) => {
        out.push_str(v);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Models occasionally wrap JSON in a markdown fence even when asked not to.
/// Returns the fenced body when present, the trimmed input otherwise.
pub fn strip_code_fence(s: &str) -> &str {
  let t = s.trim();
  let Some(rest) = t.strip_prefix("```") else { return t };
  // Drop the info string ("json", "python", ...) on the opening line.
  let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
  body.strip_suffix("```").unwrap_or(body).trim()
}

/// Log-safe truncation for large strings (char-boundary aware).
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut end = max;
  while !s.is_char_boundary(end) {
    end -= 1;
  }
  format!("{}… ({} bytes total)", &s[..end], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_every_occurrence() {
    let out = fill_template("{a} and {a} but not {b", &[("a", "x")]);
    assert_eq!(out, "x and x but not {b");
  }

  #[test]
  fn substituted_values_are_never_rescanned() {
    let out = fill_template("{language}: {code}", &[("language", "Hindi"), ("code", "print('{language}')")]);
    assert_eq!(out, "Hindi: print('{language}')");

    // A model-written title naming a later placeholder stays literal.
    let out = fill_template(
      "{title} / {description} / {code}",
      &[("title", "Echo {code}"), ("description", "uses {title}"), ("code", "x = 1")],
    );
    assert_eq!(out, "Echo {code} / uses {title} / x = 1");
  }

  #[test]
  fn unknown_and_json_braces_are_kept() {
    let out = fill_template("Return JSON: {\"a\": {n}} {missing}", &[("n", "1")]);
    assert_eq!(out, "Return JSON: {\"a\": 1} {missing}");
  }

  #[test]
  fn strip_code_fence_handles_fenced_and_plain_json() {
    assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
  }

  #[test]
  fn trunc_for_log_respects_char_boundaries() {
    let s = "नमस्ते दुनिया";
    let t = trunc_for_log(s, 4);
    assert!(t.contains("bytes total"));
    assert_eq!(trunc_for_log("short", 10), "short");
  }
}
