//! "Did you mean" suggestions for unknown task and environment names.

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = if a_char == b_char { 0 } else { 1 };
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Find names similar to `target`.
/// Prefix matches rank first, then suffix matches, then edit distance <= 3.
/// Returns up to 3 names.
pub fn find_similar<I, S>(target: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let target_lower = target.to_lowercase();
    let mut matches: Vec<(String, usize)> = Vec::new();

    for candidate in candidates {
        let id = candidate.as_ref();
        let id_lower = id.to_lowercase();

        if id_lower.starts_with(&target_lower) && id_lower != target_lower {
            matches.push((id.to_string(), 0));
            continue;
        }

        if id_lower.ends_with(&target_lower) && id_lower != target_lower {
            matches.push((id.to_string(), 1));
            continue;
        }

        let dist = levenshtein(&target_lower, &id_lower);
        if dist <= 3 && dist > 0 {
            matches.push((id.to_string(), dist + 10));
        }
    }

    matches.sort_by_key(|(_, priority)| *priority);
    matches.dedup_by(|a, b| a.0 == b.0);
    matches.into_iter().take(3).map(|(id, _)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("mysql_dump", "mysql_dump"), 0);
        assert_eq!(levenshtein("mysql_dmp", "mysql_dump"), 1);
    }

    #[test]
    fn prefix_matches_rank_first() {
        let names = ["apache_restart", "apache_prepare", "mysql_prepare"];
        let found = find_similar("apache", names);
        assert_eq!(found, vec!["apache_restart", "apache_prepare"]);
    }

    #[test]
    fn typo_is_suggested() {
        let names = ["haproxy_start", "redis_flushdb"];
        assert_eq!(find_similar("redis_flushbd", names), vec!["redis_flushdb"]);
    }

    #[test]
    fn unrelated_names_yield_nothing() {
        assert!(find_similar("zzz", ["venv_create"]).is_empty());
    }
}
