//! Task-spec argument splitting.
//!
//! Supports the `name:arg1,arg2,key=value` syntax used on the command line
//! for tasks and environments. A backslash escapes the next character, so
//! `\,`, `\=` and `\:` can appear inside values.

/// One argument of a task spec, either positional or `key=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecArg {
    Positional(String),
    Keyword(String, String),
}

/// Split `name:args` into the name and its raw arguments.
pub fn split_spec(spec: &str) -> (String, Vec<SpecArg>) {
    let mut name = String::new();
    let mut chars = spec.chars();
    let mut rest = None;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    name.push(next);
                }
            }
            ':' => {
                rest = Some(chars.as_str().to_string());
                break;
            }
            _ => name.push(c),
        }
    }

    let args = match rest {
        Some(raw) if !raw.is_empty() => split_args(&raw),
        _ => Vec::new(),
    };

    (name.trim().to_string(), args)
}

fn split_args(raw: &str) -> Vec<SpecArg> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut key: Option<String> = None;
    let mut chars = raw.chars();

    let mut flush = |current: &mut String, key: &mut Option<String>| {
        let value = std::mem::take(current);
        match key.take() {
            Some(k) => args.push(SpecArg::Keyword(k, value)),
            None => args.push(SpecArg::Positional(value)),
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '=' if key.is_none() => {
                key = Some(std::mem::take(&mut current));
            }
            ',' => flush(&mut current, &mut key),
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut key);

    args
}

/// Parse a `KEY=VALUE` pair (used by `--set`).
pub fn split_assignment(raw: &str) -> Option<(String, String)> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// Interpret a string as a boolean flag.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(s: &str) -> SpecArg {
        SpecArg::Positional(s.to_string())
    }

    fn kw(k: &str, v: &str) -> SpecArg {
        SpecArg::Keyword(k.to_string(), v.to_string())
    }

    #[test]
    fn bare_name_has_no_args() {
        assert_eq!(split_spec("apache_restart"), ("apache_restart".to_string(), vec![]));
        assert_eq!(split_spec("apache_restart:"), ("apache_restart".to_string(), vec![]));
    }

    #[test]
    fn mixed_positional_and_keyword() {
        let (name, args) = split_spec("repo_make:invenio,all,install");
        assert_eq!(name, "repo_make");
        assert_eq!(args, vec![pos("invenio"), pos("all"), pos("install")]);

        let (_, args) = split_spec("loc:py=2.7,ref=origin/maint-1.1");
        assert_eq!(args, vec![kw("py", "2.7"), kw("ref", "origin/maint-1.1")]);
    }

    #[test]
    fn escapes_protect_separators() {
        let (_, args) = split_spec(r"redis_flushdb:a\,b,k=x\=y");
        assert_eq!(args, vec![pos("a,b"), kw("k", "x=y")]);
    }

    #[test]
    fn value_may_contain_equals_after_key() {
        let (_, args) = split_spec("x:sql=a=b");
        assert_eq!(args, vec![kw("sql", "a=b")]);
    }

    #[test]
    fn colon_in_value_is_kept() {
        let (name, args) = split_spec("haproxy_disable_server:web1:8080");
        assert_eq!(name, "haproxy_disable_server");
        assert_eq!(args, vec![pos("web1:8080")]);
    }

    #[test]
    fn assignment_requires_key() {
        assert_eq!(
            split_assignment("database.name=atlantis"),
            Some(("database.name".to_string(), "atlantis".to_string()))
        );
        assert_eq!(split_assignment("=x"), None);
        assert_eq!(split_assignment("novalue"), None);
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
