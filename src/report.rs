//! Progress rows written by the driver.
//!
//! Two sink styles share one logical column layout: a fixed-width console table whose
//! rows overwrite each other in place, and a `;`-delimited record stream with one line
//! per row for offline analysis. The driver never owns the underlying writers.

use std::io::{self, Write};

use crate::problem::Point;

/// A method-specific trailing column (e.g. the last accepted line-search step).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub name: &'static str,
    pub value: f64,
}

impl Column {
    pub const fn new(name: &'static str, value: f64) -> Self {
        Self { name, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStyle {
    Console,
    Delimited,
}

impl SinkStyle {
    const fn delimiter(self) -> &'static str {
        match self {
            SinkStyle::Console => " ",
            SinkStyle::Delimited => ";",
        }
    }
}

/// One progress snapshot.
pub struct Row<'a> {
    pub time: f64,
    pub iter: usize,
    pub point: &'a Point,
    pub f_count: usize,
    pub g_count: usize,
    pub extra: &'a [Column],
}

const METHOD_NAME: &str = "method";
const TIME_WIDTH: usize = 8;
const ITER_WIDTH: usize = 9;
const F_WIDTH: usize = 23;
const NORM_WIDTH: usize = 13;
const COUNT_WIDTH: usize = 9;
const EXTRA_WIDTH: usize = 11;

/// Formats `value` in scientific notation the way C's `%.*e` does (`1.500000e-03`).
pub fn sci(value: f64, precision: usize) -> String {
    let raw = format!("{value:.precision$e}");
    match raw.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(rest) => ('-', rest),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => raw,
    }
}

// Leading space for non-negative values so columns stay aligned with negative ones.
fn signed_sci(value: f64, precision: usize) -> String {
    let text = sci(value, precision);
    if text.starts_with('-') {
        text
    } else {
        format!(" {text}")
    }
}

pub(crate) struct RowWriter<'w> {
    out: &'w mut dyn Write,
    style: SinkStyle,
    method: String,
    gradient: bool,
}

impl<'w> RowWriter<'w> {
    pub(crate) fn new(out: &'w mut dyn Write, style: SinkStyle, method: &str, gradient: bool) -> Self {
        Self {
            out,
            style,
            method: method.to_owned(),
            gradient,
        }
    }

    fn method_width(&self) -> usize {
        self.method.len().max(METHOD_NAME.len())
    }

    fn delimiter(&mut self) -> io::Result<()> {
        self.out.write_all(self.style.delimiter().as_bytes())
    }

    fn begin(&mut self) -> io::Result<()> {
        if self.style == SinkStyle::Console {
            self.out.write_all(b"\r")?;
        }
        Ok(())
    }

    fn end(&mut self) -> io::Result<()> {
        if self.style == SinkStyle::Delimited {
            self.new_line()?;
        }
        Ok(())
    }

    pub(crate) fn new_line(&mut self) -> io::Result<()> {
        self.out.write_all(b"\n")
    }

    /// Writes a free-form line (e.g. the exit reason).
    pub(crate) fn message(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub(crate) fn header(&mut self, extra: &[Column]) -> io::Result<()> {
        self.begin()?;
        let console = self.style == SinkStyle::Console;
        let width = self.method_width();

        if console {
            write!(self.out, "{METHOD_NAME:<width$}")?;
        } else {
            write!(self.out, "{METHOD_NAME}")?;
        }
        self.delimiter()?;
        if console {
            write!(self.out, "{:>TIME_WIDTH$}", "time")?;
        } else {
            write!(self.out, "time")?;
        }
        self.delimiter()?;
        if console {
            write!(self.out, "{:>ITER_WIDTH$}", "iter")?;
        } else {
            write!(self.out, "iter")?;
        }
        self.delimiter()?;
        self.left_name("f", F_WIDTH)?;
        if self.gradient {
            for name in ["g_nrm_1", "g_nrm_2", "g_nrm_inf"] {
                self.delimiter()?;
                self.left_name(name, NORM_WIDTH)?;
            }
        }
        self.delimiter()?;
        self.right_name("f_count", COUNT_WIDTH)?;
        if self.gradient {
            self.delimiter()?;
            self.right_name("g_count", COUNT_WIDTH)?;
        }
        for column in extra {
            self.delimiter()?;
            self.left_name(column.name, EXTRA_WIDTH)?;
        }
        self.end()
    }

    pub(crate) fn row(&mut self, row: &Row<'_>) -> io::Result<()> {
        self.begin()?;
        let width = self.method_width();
        match self.style {
            SinkStyle::Console => {
                write!(self.out, "{:<width$}", self.method)?;
                self.delimiter()?;
                write!(self.out, "{:>TIME_WIDTH$.3}", row.time)?;
                self.delimiter()?;
                write!(self.out, "{:>ITER_WIDTH$}", row.iter)?;
            }
            SinkStyle::Delimited => {
                write!(self.out, "{}", self.method)?;
                self.delimiter()?;
                write!(self.out, "{}", sci(row.time, 6))?;
                self.delimiter()?;
                write!(self.out, "{}", row.iter)?;
            }
        }
        self.delimiter()?;
        self.float(row.point.f, F_WIDTH, 16)?;
        if self.gradient {
            let norms = [row.point.g_norm_1, row.point.g_norm_2, row.point.g_norm_inf];
            for norm in norms {
                self.delimiter()?;
                self.float(norm, NORM_WIDTH, 6)?;
            }
        }
        self.delimiter()?;
        self.count(row.f_count)?;
        if self.gradient {
            self.delimiter()?;
            self.count(row.g_count)?;
        }
        for column in row.extra {
            self.delimiter()?;
            self.float(column.value, EXTRA_WIDTH, 4)?;
        }
        self.end()
    }

    fn left_name(&mut self, name: &str, width: usize) -> io::Result<()> {
        match self.style {
            SinkStyle::Console => write!(self.out, " {:<w$}", name, w = width - 1),
            SinkStyle::Delimited => write!(self.out, "{name}"),
        }
    }

    fn right_name(&mut self, name: &str, width: usize) -> io::Result<()> {
        match self.style {
            SinkStyle::Console => write!(self.out, "{name:>width$}"),
            SinkStyle::Delimited => write!(self.out, "{name}"),
        }
    }

    fn float(&mut self, value: f64, width: usize, console_precision: usize) -> io::Result<()> {
        match self.style {
            SinkStyle::Console => {
                write!(self.out, "{:<width$}", signed_sci(value, console_precision))
            }
            SinkStyle::Delimited => write!(self.out, "{}", sci(value, 6)),
        }
    }

    fn count(&mut self, value: usize) -> io::Result<()> {
        match self.style {
            SinkStyle::Console => write!(self.out, "{value:>COUNT_WIDTH$}"),
            SinkStyle::Delimited => write!(self.out, "{value}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_point() -> Point {
        let mut p = Point::with_size(2, true);
        p.f = 1.5;
        p.g = array![3.0, -4.0];
        p.refresh_gradient_norms();
        p
    }

    #[test]
    fn sci_matches_c_exponent_layout() {
        assert_eq!(sci(1.5e-3, 6), "1.500000e-03");
        assert_eq!(sci(-2.0, 2), "-2.00e+00");
        assert_eq!(sci(1.0e120, 1), "1.0e+120");
        assert_eq!(sci(f64::NAN, 3), "NaN");
    }

    #[test]
    fn delimited_rows_are_one_line_each() {
        let mut buf: Vec<u8> = Vec::new();
        {
            let mut w = RowWriter::new(&mut buf, SinkStyle::Delimited, "GDM", true);
            let extra = [Column::new("ls_step", 0.25)];
            w.header(&extra).unwrap();
            let point = sample_point();
            w.row(&Row {
                time: 0.5,
                iter: 3,
                point: &point,
                f_count: 7,
                g_count: 4,
                extra: &extra,
            })
            .unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "method;time;iter;f;g_nrm_1;g_nrm_2;g_nrm_inf;f_count;g_count;ls_step"
        );
        assert_eq!(
            lines[1],
            "GDM;5.000000e-01;3;1.500000e+00;7.000000e+00;5.000000e+00;4.000000e+00;7;4;2.500000e-01"
        );
    }

    #[test]
    fn console_rows_overwrite_in_place() {
        let mut buf: Vec<u8> = Vec::new();
        {
            let mut w = RowWriter::new(&mut buf, SinkStyle::Console, "FGM", false);
            let point = sample_point();
            w.row(&Row {
                time: 1.0,
                iter: 10,
                point: &point,
                f_count: 11,
                g_count: 0,
                extra: &[],
            })
            .unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with('\r'));
        assert!(!text.contains('\n'));
        assert!(text.contains("FGM   "));
        assert!(text.contains(" 1.5000000000000000e+00"));
        assert!(!text.contains("g_nrm"));
        assert!(text.ends_with("       11"));
    }
}
