//! Input reader for label files.
//!
//! Line format:
//! `(<k1>, <k2>, ...)=[(<class>;<flag>),(<class>;<flag>),...]`
//!
//! K_i: The tuple is the item key; flag `t` marks a gold observation.
//! K_i: Every label is attributed to the single default observer.
//! B_i: Any line may be malformed → ParseError with its line number.

use crate::em::check_classes;
use crate::models::{EmError, ItemId, Observation, ObserverId, Responses, Result};
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Parsed label file.
#[derive(Debug, Clone)]
pub struct InputData {
    pub responses: Responses,

    /// Gold observations per class index
    pub review_counts: Vec<usize>,
}

/// Read and parse a label file.
pub fn read_responses(path: &Path, classes: &[i64]) -> Result<InputData> {
    let file = File::open(path).map_err(|e| EmError::io("opening input file", e))?;
    let data = parse_responses(BufReader::new(file), classes)?;

    info!(
        items = data.responses.len(),
        observations = data.responses.observation_count(),
        review_counts = ?data.review_counts,
        "Loaded responses"
    );
    Ok(data)
}

/// Parse label lines from any buffered reader.
pub fn parse_responses<R: BufRead>(reader: R, classes: &[i64]) -> Result<InputData> {
    check_classes(classes)?;
    let line_re = Regex::new(r"^\((?P<key>[^)]*)\)\s*=\s*\[(?P<labels>.*)\]$")
        .map_err(|e| EmError::Internal(format!("Invalid line pattern: {e}")))?;
    let label_re = Regex::new(r"^\(\s*(?P<class>-?\d+)\s*;\s*(?P<flag>\w*)\s*\)$")
        .map_err(|e| EmError::Internal(format!("Invalid label pattern: {e}")))?;

    let mut responses = Responses::new();
    let mut review_counts = vec![0usize; classes.len()];

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| EmError::io("reading input file", e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let parse_error = |msg: String| EmError::ParseError(format!("Line {}: {msg}", line_num + 1));

        let caps = line_re
            .captures(line)
            .ok_or_else(|| parse_error(format!("expected '(key)=[labels]', got '{line}'")))?;

        let item = parse_key(&caps["key"]).map_err(parse_error)?;
        let entry_labels = caps["labels"].trim();
        if entry_labels.is_empty() {
            responses.insert_item(item);
            continue;
        }

        for raw in entry_labels.split(',') {
            let raw = raw.trim();
            let label = label_re
                .captures(raw)
                .ok_or_else(|| parse_error(format!("malformed label '{raw}'")))?;

            let class: i64 = label["class"]
                .parse()
                .map_err(|e| parse_error(format!("class in '{raw}': {e}")))?;
            let gold = &label["flag"] == "t";

            if gold {
                let idx = classes
                    .iter()
                    .position(|&c| c == class)
                    .ok_or_else(|| EmError::UnknownClass {
                        item: item.to_string(),
                        label: class,
                    })?;
                review_counts[idx] += 1;
            }

            responses.record(item.clone(), ObserverId::DEFAULT, Observation { class, gold });
        }
    }

    Ok(InputData {
        responses,
        review_counts,
    })
}

fn parse_key(key: &str) -> std::result::Result<ItemId, String> {
    key.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<i64>()
                .map_err(|e| format!("item key component '{part}': {e}"))
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(ItemId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
(1, 2)=[(0;f),(1;t),(0;f)]
(3, 4)=[(1;f)]

(1, 2)=[(1;f)]
";

    #[test]
    fn test_parse_sample() {
        let data = parse_responses(Cursor::new(SAMPLE), &[0, 1]).unwrap();

        assert_eq!(data.responses.len(), 2);
        assert_eq!(data.responses.observation_count(), 5);
        assert_eq!(data.review_counts, vec![0, 1]);

        let first = data.responses.iter().next().unwrap();
        assert_eq!(first.item, ItemId(vec![1, 2]));
        assert_eq!(first.observers.len(), 1);
        assert_eq!(first.observers[0].0, ObserverId::DEFAULT);
        assert_eq!(
            first.observers[0].1,
            vec![
                Observation::noisy(0),
                Observation::gold(1),
                Observation::noisy(0),
                Observation::noisy(1),
            ]
        );
    }

    #[test]
    fn test_only_t_marks_gold() {
        let data = parse_responses(Cursor::new("(1)=[(1;true),(1;T),(0;t)]\n"), &[0, 1]).unwrap();
        assert_eq!(data.review_counts, vec![1, 0]);

        let labels = &data.responses.iter().next().unwrap().observers[0].1;
        assert!(!labels[0].gold);
        assert!(!labels[1].gold);
        assert!(labels[2].gold);
    }

    #[test]
    fn test_empty_label_list_registers_item() {
        let data = parse_responses(Cursor::new("(5)=[]\n(6)=[(0;f)]\n"), &[0, 1]).unwrap();
        assert_eq!(data.responses.len(), 2);
        assert!(data.responses.get(&ItemId(vec![5])).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_lines() {
        for bad in ["1, 2=[(0;f)]", "(1, x)=[(0;f)]", "(1)=[(0,f)]", "(1)=[(a;f)]", "()=[(0;f)]"] {
            let err = parse_responses(Cursor::new(format!("(9)=[(0;f)]\n{bad}\n")), &[0, 1])
                .unwrap_err();
            match err {
                EmError::ParseError(msg) => assert!(msg.starts_with("Line 2:"), "{msg}"),
                other => panic!("expected ParseError for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_gold_label_outside_classes() {
        let err = parse_responses(Cursor::new("(1)=[(3;t)]\n"), &[0, 1]).unwrap_err();
        assert!(matches!(err, EmError::UnknownClass { label: 3, .. }));
    }

    #[test]
    fn test_review_counts_need_dense_classes() {
        let err = parse_responses(Cursor::new("(1)=[(1;t)]\n"), &[1, 0]).unwrap_err();
        assert!(matches!(err, EmError::InvalidInput(_)));

        let data = parse_responses(Cursor::new("(1)=[(1;t),(2;t),(2;t)]\n"), &[0, 1, 2]).unwrap();
        assert_eq!(data.review_counts, vec![0, 1, 2]);
    }

    #[test]
    fn test_read_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("labels.txt");
        std::fs::write(&path, SAMPLE).unwrap();

        let data = read_responses(&path, &[0, 1]).unwrap();
        assert_eq!(data.responses.len(), 2);

        let missing = read_responses(&temp_dir.path().join("missing.txt"), &[0, 1]);
        assert!(matches!(missing, Err(EmError::Io { .. })));
    }
}
