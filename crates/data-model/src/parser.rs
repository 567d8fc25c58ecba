//! Parser for delimited rating files.
//!
//! One rating per line: `user<sep>item<sep>rating[<sep>anything else]`.
//! MovieLens `ratings.dat` (`userId::movieId::rating::timestamp`) is read
//! with separator `::`, CSV exports with `,`. Blank lines and lines
//! starting with `#` are skipped.

use crate::error::{DataModelError, Result};
use crate::types::Rating;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Parse every rating of a file
pub fn parse_ratings(path: &Path, separator: &str) -> Result<Vec<Rating>> {
    let file = File::open(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => DataModelError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => DataModelError::IoError(err),
    })?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut ratings = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if let Some(rating) = parse_line(&line, separator, &file_name, idx + 1)? {
            ratings.push(rating);
        }
    }

    debug!(file = %file_name, ratings = ratings.len(), "Parsed ratings file");
    Ok(ratings)
}

/// Parse one line; `Ok(None)` for lines that carry no rating
pub fn parse_line(
    line: &str,
    separator: &str,
    file: &str,
    line_no: usize,
) -> Result<Option<Rating>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let parse_error = |reason: String| DataModelError::ParseError {
        file: file.to_string(),
        line: line_no,
        reason,
    };

    let mut parts = trimmed.split(separator).map(str::trim);
    let user_code = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| parse_error("Missing user code".to_string()))?;
    let item_code = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| parse_error("Missing item code".to_string()))?;
    let value = parts
        .next()
        .ok_or_else(|| parse_error("Missing rating".to_string()))?;
    let value: f64 = value
        .parse()
        .map_err(|_| parse_error(format!("Invalid rating value: {}", value)))?;

    Ok(Some(Rating::new(user_code, item_code, value)))
}
