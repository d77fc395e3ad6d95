//! Shell escaping and quoting utilities.

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a single argument for shell execution.
/// - Empty strings become `''`
/// - Strings with shell metacharacters are wrapped in single quotes
/// - Embedded single quotes are escaped
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}',
        '<', '>', '|', '&', ';', '#', '~',
    ];

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", escape_single_quote_content(arg))
}

/// Quote and join multiple arguments for shell execution.
pub fn quote_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| quote_arg(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Wrap a complete command line (operators included) for `sh -c`.
pub fn escape_command_for_shell(command: &str) -> String {
    format!("'{}'", escape_single_quote_content(command))
}

/// Quote a path for shell execution (always quotes).
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}

/// Escape the `/` delimiter for a `sed s/.../.../` expression.
pub fn escape_sed_delimiter(expr: &str) -> String {
    let mut escaped = String::with_capacity(expr.len());
    let mut prev_backslash = false;
    for c in expr.chars() {
        if c == '/' && !prev_backslash {
            escaped.push('\\');
        }
        prev_backslash = c == '\\' && !prev_backslash;
        escaped.push(c);
    }
    escaped
}

/// Escape characters with special meaning inside a double-quoted SQL
/// string passed through `mysql -e "..."`.
pub fn escape_double_quote_content(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_arg_simple() {
        assert_eq!(quote_arg("restart"), "restart");
        assert_eq!(quote_arg("/etc/init.d/httpd"), "/etc/init.d/httpd");
    }

    #[test]
    fn quote_arg_with_spaces() {
        assert_eq!(quote_arg("hello world"), "'hello world'");
    }

    #[test]
    fn quote_arg_with_single_quote() {
        assert_eq!(quote_arg("it's"), "'it'\\''s'");
    }

    #[test]
    fn quote_arg_empty() {
        assert_eq!(quote_arg(""), "''");
    }

    #[test]
    fn quote_args_regex_permissions() {
        let args = vec!["set_permissions", "-p", "/", "guest", ".*"];
        assert_eq!(quote_args(&args), "set_permissions -p / guest '.*'");
    }

    #[test]
    fn quote_path_always_quotes() {
        assert_eq!(quote_path("/opt/invenio"), "'/opt/invenio'");
        assert_eq!(quote_path("/opt/it's"), "'/opt/it'\\''s'");
    }

    #[test]
    fn escape_command_for_shell_wraps_operators() {
        assert_eq!(
            escape_command_for_shell("cd /tmp && make"),
            "'cd /tmp && make'"
        );
    }

    #[test]
    fn escape_sed_delimiter_escapes_slashes_once() {
        assert_eq!(escape_sed_delimiter("Alias /error/ .+"), "Alias \\/error\\/ .+");
        assert_eq!(escape_sed_delimiter("a\\/b"), "a\\/b");
    }

    #[test]
    fn escape_double_quote_content_escapes_specials() {
        assert_eq!(escape_double_quote_content("my123p$ss"), "my123p\\$ss");
        assert_eq!(escape_double_quote_content("a\"b"), "a\\\"b");
    }
}
