use std::fmt::{Display, Write};

/// Joins [`Display`]able items with `delim`.
pub(crate) fn iter_join<I, T>(iter: I, delim: &str) -> String
where
    I: IntoIterator<Item = T>,
    T: Display,
{
    let mut out = String::new();
    for (i, item) in iter.into_iter().enumerate() {
        if i > 0 {
            out.push_str(delim);
        }
        let _ = write!(out, "{}", item);
    }
    out
}

/// Compile a `LIST` mailbox pattern: `*` matches anything, `%` matches anything but the
/// hierarchy delimiter. Everything else is literal.
#[cfg(any(test, feature = "test_helpers"))]
pub(crate) fn list_pattern(
    pattern: &str,
    delimiter: Option<char>,
) -> Result<regex::Regex, regex::Error> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match (c, delimiter) {
            ('*', _) => re.push_str(".*"),
            ('%', Some(d)) => {
                re.push_str("[^");
                re.push_str(&regex::escape(&d.to_string()));
                re.push_str("]*");
            }
            ('%', None) => re.push_str(".*"),
            (c, _) => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    regex::Regex::new(&re)
}
