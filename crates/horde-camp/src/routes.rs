//! `routes.jsonl`: the routing table of the external issue store.
//!
//! One JSON object per line, fields `prefix` (ends with `-`) and `path`
//! (relative POSIX path from the encampment root). Blank and malformed
//! lines are skipped on read. The encampment reserves `hq- → .` and the
//! raid namespace `hq-cv- → .`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::fsio::{FsWriteError, write_atomic};

/// Reserved route for the encampment store itself.
pub const ENCAMPMENT_ROUTE: (&str, &str) = ("hq-", ".");

/// Reserved route for the raid namespace.
pub const RAID_ROUTE: (&str, &str) = ("hq-cv-", ".");

/// Errors from reading or writing routes.
#[derive(Debug, thiserror::Error)]
pub enum RoutesError {
    #[error("{path}: {message}")]
    Io { path: String, message: String },

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error(transparent)]
    Write(#[from] FsWriteError),
}

/// A `(prefix, path)` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub prefix: String,
    pub path: String,
}

impl Route {
    pub fn new(prefix: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            path: path.into(),
        }
    }
}

/// The two reserved routes, in canonical order.
pub fn reserved_routes() -> [Route; 2] {
    [
        Route::new(ENCAMPMENT_ROUTE.0, ENCAMPMENT_ROUTE.1),
        Route::new(RAID_ROUTE.0, RAID_ROUTE.1),
    ]
}

/// The canonical route path for a warband's store.
pub fn warband_route_path(warband: &str) -> String {
    format!("{warband}/warchief/warband")
}

/// Read routes, skipping blank and malformed lines.
///
/// A missing file reads as an empty table.
pub fn read_routes(path: impl AsRef<Path>) -> Result<Vec<Route>, RoutesError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).map_err(|e| RoutesError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let mut routes = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(route) = serde_json::from_str::<Route>(trimmed) {
            routes.push(route);
        }
    }
    Ok(routes)
}

/// Rewrite the whole table atomically, preserving the given order.
pub fn write_routes(path: impl AsRef<Path>, routes: &[Route]) -> Result<(), RoutesError> {
    let mut text = String::new();
    for route in routes {
        let line = serde_json::to_string(route).map_err(|e| RoutesError::Serialize(e.to_string()))?;
        text.push_str(&line);
        text.push('\n');
    }
    write_atomic(path, &text)?;
    Ok(())
}

/// The route whose path is the canonical store path of `warband`.
pub fn route_for_warband<'r>(routes: &'r [Route], warband: &str) -> Option<&'r Route> {
    let expected = warband_route_path(warband);
    routes.iter().find(|r| r.path == expected)
}

/// Prefixes that appear more than once, sorted.
pub fn duplicate_prefixes(routes: &[Route]) -> Vec<String> {
    let mut seen = std::collections::BTreeMap::new();
    for route in routes {
        *seen.entry(route.prefix.clone()).or_insert(0u32) += 1;
    }
    seen.into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(prefix, _)| prefix)
        .collect()
}

/// Shape check for a record prefix: lowercase alphanumeric segments,
/// trailing dash.
pub fn prefix_is_valid(prefix: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*-$").expect("static pattern"));
    pattern.is_match(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "horde-routes-{prefix}-{}-{unique}.jsonl",
            std::process::id()
        ))
    }

    #[test]
    fn read_skips_blank_and_malformed_lines() {
        let path = temp_path("read");
        fs::write(
            &path,
            "{\"prefix\":\"hd-\",\"path\":\"foo/warchief/warband\"}\n\nnot json\n{\"prefix\":\"hq-\",\"path\":\".\"}\n",
        )
        .unwrap();

        let routes = read_routes(&path).unwrap();
        assert_eq!(
            routes,
            vec![
                Route::new("hd-", "foo/warchief/warband"),
                Route::new("hq-", "."),
            ]
        );

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_reads_empty() {
        assert!(read_routes(temp_path("missing")).unwrap().is_empty());
    }

    #[test]
    fn write_emits_one_line_per_route() {
        let path = temp_path("write");
        write_routes(&path, &reserved_routes()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "{\"prefix\":\"hq-\",\"path\":\".\"}\n{\"prefix\":\"hq-cv-\",\"path\":\".\"}\n"
        );
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn duplicate_prefixes_are_reported() {
        let routes = vec![
            Route::new("hd-", "foo/warchief/warband"),
            Route::new("hd-", "bar/warchief/warband"),
            Route::new("ga-", "baz/warchief/warband"),
        ];
        assert_eq!(duplicate_prefixes(&routes), vec!["hd-".to_string()]);
    }

    #[test]
    fn prefix_shapes() {
        assert!(prefix_is_valid("hd-"));
        assert!(prefix_is_valid("hq-cv-"));
        assert!(!prefix_is_valid("hd"));
        assert!(!prefix_is_valid("-hd-"));
        assert!(!prefix_is_valid("HD-"));
    }
}
