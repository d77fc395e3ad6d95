//! Remote file editing primitives.
//!
//! Builds the shell lines behind `exists`, `contains`, `append`, `sed`,
//! `comment` and `uncomment`, and splices marked blocks into existing file
//! content. Execution goes through [`crate::context::TaskContext`].

use crate::utils::shell;

/// Suffix of the backup `sed -i` leaves next to edited files.
pub const SED_BACKUP: &str = ".bak";

pub fn exists_cmd(path: &str) -> String {
    format!("test -e {}", shell::quote_path(path))
}

/// `grep` for `text` in `file`; `whole_line` requires an exact line match.
pub fn contains_cmd(file: &str, text: &str, whole_line: bool) -> String {
    let flags = if whole_line { "-q -x -F" } else { "-q -F" };
    format!(
        "grep {} -e {} {}",
        flags,
        shell::quote_arg(text),
        shell::quote_path(file)
    )
}

pub fn append_line_cmd(file: &str, line: &str) -> String {
    format!(
        "echo {} >> {}",
        shell::quote_arg(line),
        shell::quote_path(file)
    )
}

pub fn write_stdin_cmd(file: &str) -> String {
    format!("cat > {}", shell::quote_path(file))
}

pub fn read_cmd(file: &str) -> String {
    format!("cat {}", shell::quote_path(file))
}

/// In-place `sed -r` substitution of `before` with `after` on every line,
/// optionally restricted to lines matching `limit`.
pub fn sed_cmd(file: &str, before: &str, after: &str, limit: Option<&str>) -> String {
    let before = shell::escape_sed_delimiter(before);
    let after = shell::escape_sed_delimiter(after);
    let address = match limit {
        Some(limit) if !limit.is_empty() => format!("/{}/ ", shell::escape_sed_delimiter(limit)),
        _ => String::new(),
    };
    let expr = format!("{}s/{}/{}/g", address, before, after);

    format!(
        "sed -i{} -r -e {} {}",
        SED_BACKUP,
        shell::quote_path(&expr),
        shell::quote_path(file)
    )
}

/// Prefix lines matching `regex` with `#`.
pub fn comment_cmd(file: &str, regex: &str) -> String {
    let (caret, body) = match regex.strip_prefix('^') {
        Some(rest) => ("^", rest),
        None => ("", regex),
    };
    let (body, dollar) = match body.strip_suffix('$') {
        Some(rest) => (rest, "$"),
        None => (body, ""),
    };
    let before = format!("{}({}){}", caret, body, dollar);
    sed_cmd(file, &before, "#\\1", None)
}

/// Remove a leading `#` from lines matching `regex`.
pub fn uncomment_cmd(file: &str, regex: &str) -> String {
    sed_cmd(file, "^([[:space:]]*)#[[:space:]]?", "\\1", Some(regex))
}

/// Replace the block between `# BEGIN <mark>` and `# END <mark>` in
/// `existing` with `content`, or append a new block when none exists.
pub fn splice_marked_block(existing: &str, mark: &str, content: &str) -> String {
    let begin = format!("# BEGIN {}", mark);
    let end = format!("# END {}", mark);

    let mut block = String::new();
    block.push_str(&begin);
    block.push('\n');
    block.push_str(content.trim_end_matches('\n'));
    block.push('\n');
    block.push_str(&end);
    block.push('\n');

    let lines: Vec<&str> = existing.lines().collect();
    let start = lines.iter().position(|l| l.trim() == begin);
    let stop = start.and_then(|s| {
        lines[s..]
            .iter()
            .position(|l| l.trim() == end)
            .map(|offset| s + offset)
    });

    match (start, stop) {
        (Some(start), Some(stop)) => {
            let mut out = String::new();
            for line in &lines[..start] {
                out.push_str(line);
                out.push('\n');
            }
            out.push_str(&block);
            for line in &lines[stop + 1..] {
                out.push_str(line);
                out.push('\n');
            }
            out
        }
        _ => {
            let mut out = existing.to_string();
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&block);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_and_append_quote_their_arguments() {
        assert_eq!(
            contains_cmd("/etc/sudoers", "NOPASSWD: /opt/invenio/bin/inveniounoconv", false),
            "grep -q -F -e 'NOPASSWD: /opt/invenio/bin/inveniounoconv' '/etc/sudoers'"
        );
        assert_eq!(
            append_line_cmd("/etc/httpd/conf/httpd.conf", "TraceEnable off"),
            "echo 'TraceEnable off' >> '/etc/httpd/conf/httpd.conf'"
        );
    }

    #[test]
    fn sed_escapes_delimiters() {
        assert_eq!(
            sed_cmd("/etc/httpd/conf/httpd.conf", "Include /opt/x.conf", "", None),
            "sed -i.bak -r -e 's/Include \\/opt\\/x.conf//g' '/etc/httpd/conf/httpd.conf'"
        );
    }

    #[test]
    fn comment_wraps_regex_in_group() {
        assert_eq!(
            comment_cmd("/etc/httpd/conf/httpd.conf", "^Alias /error/ .+"),
            "sed -i.bak -r -e 's/^(Alias \\/error\\/ .+)/#\\1/g' '/etc/httpd/conf/httpd.conf'"
        );
    }

    #[test]
    fn uncomment_limits_to_matching_lines() {
        assert_eq!(
            uncomment_cmd("/etc/httpd/conf/httpd.conf", "Alias \\/error\\/ .+"),
            "sed -i.bak -r -e '/Alias \\/error\\/ .+/ s/^([[:space:]]*)#[[:space:]]?/\\1/g' '/etc/httpd/conf/httpd.conf'"
        );
    }

    #[test]
    fn splice_appends_new_block() {
        let out = splice_marked_block("export A=1\n", "ACTIVATE_PROFILE", "export B=2\n");
        assert_eq!(
            out,
            "export A=1\n# BEGIN ACTIVATE_PROFILE\nexport B=2\n# END ACTIVATE_PROFILE\n"
        );
    }

    #[test]
    fn splice_replaces_existing_block() {
        let existing = "a\n# BEGIN M\nold\nolder\n# END M\nz\n";
        assert_eq!(splice_marked_block(existing, "M", "new"), "a\n# BEGIN M\nnew\n# END M\nz\n");
    }

    #[test]
    fn splice_handles_missing_trailing_newline() {
        assert_eq!(splice_marked_block("a", "M", "x"), "a\n# BEGIN M\nx\n# END M\n");
        assert_eq!(splice_marked_block("", "M", "x"), "# BEGIN M\nx\n# END M\n");
    }
}
