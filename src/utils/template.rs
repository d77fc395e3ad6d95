//! String template rendering utilities.
//!
//! Placeholders use `{{KEY}}` (surrounding whitespace inside the braces is
//! allowed). Unknown keys are left in place so callers can report them.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").unwrap());

pub fn render_map(template: &str, variables: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            variables
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Placeholder keys still present in a rendered string, in order of
/// appearance and without duplicates.
pub fn unresolved(rendered: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(rendered) {
        let key = caps[1].to_string();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_map_replaces_known_keys() {
        let mut vars = HashMap::new();
        vars.insert("topsrcdir".to_string(), "/opt/src/invenio".to_string());
        vars.insert("targets".to_string(), "all install".to_string());
        let out = render_map("cd {{topsrcdir}} && make {{ targets }}", &vars);
        assert_eq!(out, "cd /opt/src/invenio && make all install");
    }

    #[test]
    fn render_map_keeps_unknown_placeholders() {
        let mut vars = HashMap::new();
        vars.insert("CFG_INVENIO_PREFIX".to_string(), "/opt/invenio".to_string());
        let out = render_map("{{CFG_INVENIO_PREFIX}}/bin/{{TOOL}}", &vars);
        assert_eq!(out, "/opt/invenio/bin/{{TOOL}}");
        assert_eq!(unresolved(&out), vec!["TOOL".to_string()]);
    }

    #[test]
    fn unresolved_deduplicates() {
        assert_eq!(unresolved("{{a}} {{b}} {{a}}"), vec!["a", "b"]);
    }
}
