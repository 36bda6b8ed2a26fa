//! Reader for LIBSVM text data
//!
//! One element per line, `label idx:val idx:val ...`, for example
//!
//! ```text
//! +1 1:0.6 2:0.4
//! -1 1:0.5 3:0.5
//! ```
//!
//! Labels are kept exactly as written. Feature indices are 1-based in the
//! file and 0-based in memory. Blank lines and `#` comments are skipped.

use crate::core::{Problem, Result, SVMError, SparseVector};
use log::debug;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// A problem read from a LibSVM file
#[derive(Debug, Clone)]
pub struct LibSVMDataset {
    problem: Problem,
    dimensions: usize,
}

impl LibSVMDataset {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let dataset = Self::from_reader(BufReader::new(File::open(path)?))?;
        debug!(
            "Read {} elements of dimension {} from {}",
            dataset.len(),
            dataset.dim(),
            path.display()
        );
        Ok(dataset)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut elements = Vec::new();
        let mut labels = Vec::new();

        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (label, element) = Self::parse_line(line).map_err(|e| {
                SVMError::ParseError(format!("line {}: {}", number + 1, e))
            })?;
            labels.push(label);
            elements.push(element);
        }

        if elements.is_empty() {
            return Err(SVMError::EmptyDataset);
        }

        let dimensions = elements.iter().map(SparseVector::dim).max().unwrap_or(0);
        Ok(LibSVMDataset {
            problem: Problem::new(elements, labels)?,
            dimensions,
        })
    }

    fn parse_line(line: &str) -> Result<(f32, SparseVector)> {
        let mut fields = line.split_whitespace();
        let label = fields
            .next()
            .ok_or_else(|| SVMError::ParseError("missing label".to_string()))
            .and_then(|field| parse_field::<f32>(field, "label"))?;

        let (indices, values): (Vec<usize>, Vec<f32>) = fields
            .map(parse_feature)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip();

        let element = SparseVector::try_new(indices, values)
            .map_err(|e| SVMError::ParseError(e.to_string()))?;
        Ok((label, element))
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn into_problem(self) -> Problem {
        self.problem
    }

    pub fn len(&self) -> usize {
        self.problem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problem.is_empty()
    }

    /// Largest 0-based index plus one
    pub fn dim(&self) -> usize {
        self.dimensions
    }
}

/// `idx:val` with a 1-based index, returned 0-based
fn parse_feature(field: &str) -> Result<(usize, f32)> {
    let (index, value) = field
        .split_once(':')
        .ok_or_else(|| SVMError::ParseError(format!("expected idx:val, got '{field}'")))?;
    let index = parse_field::<usize>(index, "feature index")?;
    let value = parse_field::<f32>(value, "feature value")?;
    match index.checked_sub(1) {
        Some(index) => Ok((index, value)),
        None => Err(SVMError::ParseError(
            "feature indices start at 1".to_string(),
        )),
    }
}

fn parse_field<T: FromStr>(text: &str, what: &str) -> Result<T> {
    text.parse()
        .map_err(|_| SVMError::ParseError(format!("invalid {what} '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HISTOGRAMS: &str = "+1 1:0.6 2:0.4\n-1 1:0.5 3:0.5\n";

    #[test]
    fn test_parse_histogram_line() {
        let (label, element) = LibSVMDataset::parse_line("+1 1:0.6 2:0.4").unwrap();

        assert_eq!(label, 1.0);
        assert_eq!(element.indices, vec![0, 1]);
        assert_eq!(element.values, vec![0.6, 0.4]);
    }

    #[test]
    fn test_labels_kept_as_read() {
        assert_eq!(LibSVMDataset::parse_line("3 1:1.0").unwrap().0, 3.0);
        assert_eq!(LibSVMDataset::parse_line("-0.5 1:1.0").unwrap().0, -0.5);
    }

    #[test]
    fn test_unsorted_features_are_sorted() {
        let (_, element) = LibSVMDataset::parse_line("1 5:2.0 2:1.0").unwrap();
        assert_eq!(element.indices, vec![1, 4]);
        assert_eq!(element.values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_malformed_lines() {
        for line in ["+1 1", "+1 abc:1.0", "+1 1:abc", "+1 0:1.0", "+1 2:1.0 2:3.0", "x 1:1"] {
            assert!(
                matches!(LibSVMDataset::parse_line(line), Err(SVMError::ParseError(_))),
                "{line}"
            );
        }
    }

    #[test]
    fn test_reader_builds_problem() {
        let dataset = LibSVMDataset::from_reader(Cursor::new(HISTOGRAMS)).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.dim(), 3);

        let problem = dataset.problem();
        assert_eq!(problem.labels(), &[1.0, -1.0]);
        assert_eq!(problem.elements()[1].indices, vec![0, 2]);
    }

    #[test]
    fn test_label_only_line_is_empty_element() {
        let dataset = LibSVMDataset::from_reader(Cursor::new("1\n-1 1:1.0\n")).unwrap();
        assert!(dataset.problem().elements()[0].is_empty());
    }

    #[test]
    fn test_comments_and_blank_lines_skipped() {
        let data = format!("# histograms\n\n{HISTOGRAMS}   \n# end\n");
        let dataset = LibSVMDataset::from_reader(Cursor::new(data)).unwrap();

        assert_eq!(dataset.into_problem().labels(), &[1.0, -1.0]);
    }

    #[test]
    fn test_only_comments_is_empty_dataset() {
        let result = LibSVMDataset::from_reader(Cursor::new("# nothing\n\n"));
        assert!(matches!(result, Err(SVMError::EmptyDataset)));
    }

    #[test]
    fn test_error_names_line() {
        let result = LibSVMDataset::from_reader(Cursor::new("1 1:1.0\n1 x:2\n"));
        match result {
            Err(SVMError::ParseError(msg)) => assert!(msg.contains("line 2"), "{msg}"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_sparse_high_indices() {
        let data = "+1 4096:0.5 7:0.5\n-1 300:1.0\n";
        let dataset = LibSVMDataset::from_reader(Cursor::new(data)).unwrap();

        assert_eq!(dataset.dim(), 4096);
        assert_eq!(dataset.problem().elements()[0].indices, vec![6, 4095]);
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        write!(file, "{HISTOGRAMS}").expect("Failed to write");
        file.flush().expect("Failed to flush");

        let dataset = LibSVMDataset::from_file(file.path()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.dim(), 3);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = LibSVMDataset::from_file("/does/not/exist.libsvm");
        assert!(matches!(result, Err(SVMError::IoError(_))));
    }
}
