//! Shared driver utilities: server version parsing and gating.
//!
//! Version strings arrive with vendor decorations, e.g.
//! `5.7.27-0ubuntu0.18.04.1` (MySQL), `5.5.5-10.2.26-MariaDB-1:10.2.26`
//! (MariaDB behind its MySQL-compatibility prefix) or
//! `14.9 (Debian 14.9-1.pgdg120+1)` (PostgreSQL). Comparison only considers
//! the leading dotted numeric segments.

use crate::error::{DriverError, Result};

/// Extract the leading dotted numeric segments of a version string.
pub(crate) fn parse_version(raw: &str) -> Vec<u64> {
    raw.trim()
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .next()
        .unwrap_or("")
        .split('.')
        .filter_map(|part| part.parse().ok())
        .collect()
}

/// Numeric component-wise comparison; missing components count as zero.
pub(crate) fn version_at_least(current: &str, min: &str) -> bool {
    let current = parse_version(current);
    let min = parse_version(min);

    for i in 0..current.len().max(min.len()) {
        let c = current.get(i).copied().unwrap_or(0);
        let m = min.get(i).copied().unwrap_or(0);
        if c != m {
            return c > m;
        }
    }
    true
}

/// Detect a MariaDB server and return its real version string. MariaDB
/// behind the MySQL protocol may prepend a `5.5.5-` compatibility version
/// ahead of its own.
pub(crate) fn mariadb_version(raw: &str) -> Option<&str> {
    if !raw.contains("MariaDB") {
        return None;
    }
    Some(raw.strip_prefix("5.5.5-").unwrap_or(raw))
}

/// Fail driver construction when the server is older than the minimum.
pub(crate) fn assert_version_supported(server: &str, current: &str, min: &str) -> Result<()> {
    if version_at_least(current, min) {
        return Ok(());
    }
    Err(DriverError::config(format!(
        "{} driver requires server version >= {}, got {}",
        server, min, current
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_version_strips_decorations() {
        assert_eq!(parse_version("5.7.27-0ubuntu0.18.04.1"), vec![5, 7, 27]);
        assert_eq!(parse_version("14.9 (Debian 14.9-1.pgdg120+1)"), vec![14, 9]);
        assert_eq!(parse_version("10.3.15-MariaDB"), vec![10, 3, 15]);
        assert_eq!(parse_version("  9.5  "), vec![9, 5]);
        assert_eq!(parse_version("garbage"), Vec::<u64>::new());
    }

    #[test]
    fn test_version_at_least() {
        assert!(version_at_least("5.7.27", "5.7.9"));
        assert!(version_at_least("8.0.36", "5.7.9"));
        assert!(version_at_least("9.5", "9.5"));
        assert!(!version_at_least("9.4.26", "9.5"));
        assert!(!version_at_least("5.6.51", "5.7.9"));
        // 5.7.10 > 5.7.9 even though "10" < "9" lexically
        assert!(version_at_least("5.7.10", "5.7.9"));
    }

    #[test]
    fn test_mariadb_detection_strips_compat_prefix() {
        assert_eq!(
            mariadb_version("5.5.5-10.2.26-MariaDB-1:10.2.26+maria~bionic"),
            Some("10.2.26-MariaDB-1:10.2.26+maria~bionic")
        );
        assert_eq!(
            mariadb_version("10.3.15-MariaDB"),
            Some("10.3.15-MariaDB")
        );
        assert_eq!(mariadb_version("5.7.27-0ubuntu0.18.04.1"), None);
    }

    #[test]
    fn test_assert_version_supported() {
        assert!(assert_version_supported("MySQL", "5.7.27", "5.7.9").is_ok());
        let err = assert_version_supported("MariaDB", "10.2.3", "10.2.6").unwrap_err();
        assert!(err.to_string().contains("10.2.6"));
    }
}
