//! Entity name rules.

use std::sync::LazyLock;

use regex::Regex;

static DNS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid label pattern")
});

/// Maximum length of a DNS-1123 label.
pub const MAX_NAME_LEN: usize = 63;

/// True if `name` is a DNS-1123 label: lowercase alphanumerics and `-`,
/// starting and ending with an alphanumeric, at most 63 characters.
pub fn is_valid_name(name: &str) -> bool {
    name.len() <= MAX_NAME_LEN && DNS_LABEL.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_labels() {
        assert!(is_valid_name("mysql"));
        assert!(is_valid_name("mysql-pv-claim"));
        assert!(is_valid_name("a1"));
        assert!(is_valid_name(&"a".repeat(63)));
    }

    #[test]
    fn rejects_non_labels() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("MySQL"));
        assert!(!is_valid_name("-mysql"));
        assert!(!is_valid_name("mysql-"));
        assert!(!is_valid_name("my_sql"));
        assert!(!is_valid_name("my.sql"));
        assert!(!is_valid_name(&"a".repeat(64)));
    }
}
