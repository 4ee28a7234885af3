//! Text formats for benchmark inputs and results.
//!
//! GEMM input is `N K M` followed by A (M×K) and B (K×N), row-major and
//! whitespace-separated. Prefix-sum input is `N` followed by N values.

use std::fmt::Write as _;
use std::path::Path;
use std::str::SplitWhitespace;

use clmark_core::{ClError, Matrix, Result};

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| ClError::file_access(path, e))
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).map_err(|e| ClError::file_access(path, e))
}

struct Tokens<'a> {
    inner: SplitWhitespace<'a>,
    consumed: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self { inner: text.split_whitespace(), consumed: 0 }
    }

    fn next<T: std::str::FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.inner.next().ok_or_else(|| {
            ClError::InvalidInput(format!(
                "expected {} after {} values, found end of input",
                what, self.consumed
            ))
        })?;
        self.consumed += 1;
        token
            .parse()
            .map_err(|_| ClError::InvalidInput(format!("cannot parse {:?} as {}", token, what)))
    }

    fn floats(&mut self, count: usize, what: &str) -> Result<Vec<f32>> {
        (0..count).map(|_| self.next::<f32>(what)).collect()
    }
}

/// Operands of one GEMM run.
#[derive(Debug, Clone, PartialEq)]
pub struct GemmInput {
    pub a: Matrix,
    pub b: Matrix,
}

pub fn read_gemm_input(path: &Path) -> Result<GemmInput> {
    parse_gemm_input(&read_text(path)?)
}

fn parse_gemm_input(text: &str) -> Result<GemmInput> {
    let mut tokens = Tokens::new(text);
    let n: usize = tokens.next("N")?;
    let k: usize = tokens.next("K")?;
    let m: usize = tokens.next("M")?;
    if m == 0 || n == 0 || k == 0 {
        return Err(ClError::InvalidInput(format!(
            "dimensions must be positive, got N={} K={} M={}",
            n, k, m
        )));
    }
    let a = Matrix::new(m, k, tokens.floats(element_count(m, k)?, "element of A")?)?;
    let b = Matrix::new(k, n, tokens.floats(element_count(k, n)?, "element of B")?)?;
    Ok(GemmInput { a, b })
}

fn element_count(rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols).ok_or_else(|| {
        ClError::InvalidInput(format!("a {}x{} matrix does not fit in memory", rows, cols))
    })
}

/// Write `c` as an `N M` header followed by one line per row.
pub fn write_gemm_output(path: &Path, c: &Matrix) -> Result<()> {
    write_text(path, &format_gemm_output(c))
}

fn format_gemm_output(c: &Matrix) -> String {
    let mut out = format!("{} {}\n", c.cols(), c.rows());
    for i in 0..c.rows() {
        let row: Vec<String> = c.row(i).iter().map(|v| v.to_string()).collect();
        let _ = writeln!(out, "{}", row.join(" "));
    }
    out
}

pub fn read_scan_input(path: &Path) -> Result<Vec<f32>> {
    parse_scan_input(&read_text(path)?)
}

fn parse_scan_input(text: &str) -> Result<Vec<f32>> {
    let mut tokens = Tokens::new(text);
    let n: usize = tokens.next("N")?;
    tokens.floats(n, "input value")
}

pub fn write_scan_output(path: &Path, values: &[f32]) -> Result<()> {
    write_text(path, &format_scan_output(values))
}

fn format_scan_output(values: &[f32]) -> String {
    let mut out = values.iter().map(|v| format!("{:.1}", v)).collect::<Vec<_>>().join(" ");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_gemm_header(path: &Path) -> Result<(usize, usize)> {
        let text = read_text(path)?;
        let mut tokens = Tokens::new(&text);
        Ok((tokens.next("N")?, tokens.next("M")?))
    }

    #[test]
    fn test_parse_gemm_input() {
        // N=2 K=3 M=1: A is 1x3, B is 3x2
        let input = parse_gemm_input("2 3 1\n1 2 3\n1 0\n0 1\n1 1\n").unwrap();
        assert_eq!((input.a.rows(), input.a.cols()), (1, 3));
        assert_eq!((input.b.rows(), input.b.cols()), (3, 2));
        assert_eq!(input.b.get(2, 0), 1.0);
    }

    #[test]
    fn test_short_gemm_input() {
        let err = parse_gemm_input("2 2 2\n1 2 3 4\n5 6").unwrap_err();
        assert!(matches!(err, ClError::InvalidInput(_)));
        assert!(err.to_string().contains("element of B"));
    }

    #[test]
    fn test_bad_token() {
        let err = parse_gemm_input("2 x 2").unwrap_err();
        assert!(err.to_string().contains("\"x\""));
        assert!(parse_gemm_input("0 1 1").is_err());
    }

    #[test]
    fn test_oversized_dimensions() {
        let huge = format!("{0} {0} {0}\n1 2 3", usize::MAX / 2 + 1);
        let err = parse_gemm_input(&huge).unwrap_err();
        assert!(matches!(err, ClError::InvalidInput(_)));
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn test_gemm_output_header_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.txt");
        let c = Matrix::new(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.5]).unwrap();
        write_gemm_output(&path, &c).unwrap();

        assert_eq!(read_gemm_header(&path).unwrap(), (2, 3));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "2 3\n1 2\n3 4\n5 6.5\n");
    }

    #[test]
    fn test_scan_io() {
        assert_eq!(parse_scan_input("4\n1 2 3 4").unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(parse_scan_input("0").unwrap().is_empty());
        assert!(parse_scan_input("3 1 2").is_err());
        assert_eq!(format_scan_output(&[1.0, 3.0, 6.26]), "1.0 3.0 6.3\n");
    }

    #[test]
    fn test_missing_file() {
        let err = read_scan_input(Path::new("/nonexistent/clmark/input.txt")).unwrap_err();
        assert!(matches!(err, ClError::FileAccess { .. }));
    }
}
