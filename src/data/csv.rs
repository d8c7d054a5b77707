//! CSV parsing for classification datasets.
//!
//! Supported format:
//! - UTF-8, comma-separated
//! - Optional header row (auto-detected: the first row is a header if it
//!   contains any non-numeric, non-empty cell)
//! - Double-quoted fields with embedded commas
//! - The last column is a 0-based integer class index; every other column
//!   is a feature

use crate::error::DataError;

/// Parses CSV bytes into feature rows and class indices of equal length.
pub fn parse_csv(data: &[u8]) -> Result<(Vec<Vec<f64>>, Vec<usize>), DataError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| DataError::Row { row: 0, reason: "CSV file is not valid UTF-8".into() })?;

    let mut lines = text.lines().peekable();
    if let Some(first) = lines.peek() {
        if is_header(first) {
            lines.next();
        }
    }

    let mut features: Vec<Vec<f64>> = Vec::new();
    let mut classes: Vec<usize> = Vec::new();

    for (row_idx, line) in lines.enumerate() {
        let row = row_idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let cells = parse_csv_row(line);
        let Some((label_cell, feature_cells)) = cells.split_last() else {
            continue;
        };
        if feature_cells.is_empty() {
            return Err(DataError::Row {
                row,
                reason: format!("expected at least 2 columns (features + class index), got {}", cells.len()),
            });
        }

        let feats = parse_floats(feature_cells, row)?;
        let class = label_cell.trim().parse::<usize>().map_err(|_| DataError::Row {
            row,
            reason: format!("class index '{}' is not a non-negative integer", label_cell),
        })?;

        if let Some(first) = features.first() {
            if first.len() != feats.len() {
                return Err(DataError::Row {
                    row,
                    reason: format!("feature count {} does not match first row's {}", feats.len(), first.len()),
                });
            }
        }
        features.push(feats);
        classes.push(class);
    }

    if features.is_empty() {
        return Err(DataError::Empty);
    }
    Ok((features, classes))
}

fn is_header(line: &str) -> bool {
    parse_csv_row(line).iter().any(|c| {
        let t = c.trim();
        !t.is_empty() && t.parse::<f64>().is_err()
    })
}

/// Splits one row on commas outside double quotes; `""` inside quotes is a
/// literal quote.
fn parse_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_floats(cells: &[String], row: usize) -> Result<Vec<f64>, DataError> {
    cells.iter()
        .map(|c| {
            c.trim().parse::<f64>().map_err(|_| DataError::Row {
                row,
                reason: format!("'{}' is not a valid number", c),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Built-in toy datasets
// ---------------------------------------------------------------------------

/// XOR: 4 samples, 2 features, 2 classes.
pub fn builtin_xor() -> (Vec<Vec<f64>>, Vec<usize>) {
    let features = vec![
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ];
    (features, vec![0, 1, 1, 0])
}

/// `n` samples of two 2-d blobs centred at (0.3, 0.3) and (0.7, 0.7).
pub fn builtin_blobs(n: usize) -> (Vec<Vec<f64>>, Vec<usize>) {
    let centers = [(0.3f64, 0.3f64), (0.7f64, 0.7f64)];
    let mut features = Vec::with_capacity(n);
    let mut classes = Vec::with_capacity(n);
    for i in 0..n {
        let class = i % 2;
        let (cx, cy) = centers[class];
        // Deterministic spread from the sample index.
        let angle = i as f64 * 2.399;
        let r = 0.12 * (i as f64 * 0.31).sin().abs();
        features.push(vec![
            (cx + r * angle.cos()).clamp(0.0, 1.0),
            (cy + r * angle.sin()).clamp(0.0, 1.0),
        ]);
        classes.push(class);
    }
    (features, classes)
}
