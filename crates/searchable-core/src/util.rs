/// Backslash-escape `\`, `'`, `"` and NUL.
pub fn add_slashes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' | '\'' | '"' => {
                out.push('\\');
                out.push(c);
            }
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out
}

/// Escaped then lower-cased search term.
pub fn normalize_term(raw: &str) -> String {
    add_slashes(raw).to_lowercase()
}

pub fn contains_pattern(normalized: &str) -> String {
    format!("%{normalized}%")
}

/// Quote each dot-separated segment: `orders.status` -> `"orders"."status"`.
pub fn wrap_identifier(name: &str) -> String {
    name.split('.')
        .map(|seg| format!("\"{}\"", seg.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn escapes_quotes_and_backslashes() {
        assert_eq!(add_slashes(r#"O"Brien"#), r#"O\"Brien"#);
        assert_eq!(add_slashes("O'Brien"), r"O\'Brien");
        assert_eq!(add_slashes(r"a\b"), r"a\\b");
        assert_eq!(add_slashes("a\0b"), r"a\0b");
        assert_eq!(add_slashes("100%"), "100%");
    }

    #[test]
    fn normalize_lowercases_after_escaping() {
        assert_eq!(normalize_term("O'Brien"), r"o\'brien");
        assert_eq!(contains_pattern(&normalize_term("Smith")), "%smith%");
    }

    #[test]
    fn wraps_each_segment() {
        assert_eq!(wrap_identifier("name"), r#""name""#);
        assert_eq!(wrap_identifier("orders.status"), r#""orders"."status""#);
        assert_eq!(wrap_identifier(r#"we"ird"#), r#""we""ird""#);
    }

    proptest! {
        // Every quote in the escaped output is preceded by an odd run of backslashes.
        #[test]
        fn quotes_never_terminate_a_literal(raw in any::<String>()) {
            let escaped = add_slashes(&raw);
            let chars: Vec<char> = escaped.chars().collect();
            for (i, c) in chars.iter().enumerate() {
                if *c == '\'' || *c == '"' {
                    let run = chars[..i].iter().rev().take_while(|p| **p == '\\').count();
                    prop_assert!(run % 2 == 1);
                }
            }
        }
    }
}
