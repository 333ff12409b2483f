use crate::matrix::SymbolicMatrix;
use crate::traits::{MatrixLabel, MatrixPrinter};
use std::io::{self, Write};

/// Writes labelled matrices as aligned text rows.
///
/// ```text
/// B[0] (1x2) =
///   [ -x3  x1*x3_dot ]
/// ```
pub struct TextPrinter<W> {
    out: W,
}

impl<W: Write> TextPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> MatrixPrinter for TextPrinter<W> {
    fn print_matrix(&mut self, label: &MatrixLabel, m: &SymbolicMatrix) -> io::Result<()> {
        writeln!(self.out, "{label} ({}x{}) =", m.nrows(), m.ncols())?;
        if m.is_empty() {
            return writeln!(self.out, "  [ ]");
        }

        let cells: Vec<Vec<String>> = m
            .rows()
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect();
        let widths: Vec<usize> = (0..m.ncols())
            .map(|j| cells.iter().map(|row| row[j].chars().count()).max().unwrap_or(0))
            .collect();

        for row in &cells {
            write!(self.out, "  [")?;
            for (cell, width) in row.iter().zip(&widths) {
                write!(self.out, " {cell:>width$}")?;
            }
            writeln!(self.out, " ]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rational::RationalFunction;
    use crate::symbol::Symbol;

    #[test]
    fn aligns_columns() {
        let m = SymbolicMatrix::from_rows(vec![
            vec![RationalFunction::integer(1), RationalFunction::from_symbol(Symbol::new("x"))],
            vec![
                RationalFunction::from_symbol(Symbol::with_order("x", 1)),
                RationalFunction::integer(0),
            ],
        ])
        .expect("rows");
        let mut printer = TextPrinter::new(Vec::new());
        printer
            .print_matrix(&MatrixLabel::new("A", 2), &m)
            .expect("write to Vec");
        let text = String::from_utf8(printer.into_inner()).expect("utf8");
        assert_eq!(text, "A[2] (2x2) =\n  [     1 x ]\n  [ x_dot 0 ]\n");
    }

    #[test]
    fn prints_empty_matrices() {
        let mut printer = TextPrinter::new(Vec::new());
        printer
            .print_matrix(&MatrixLabel::new("P1_roc", 0), &SymbolicMatrix::zeros(2, 0))
            .expect("write to Vec");
        let text = String::from_utf8(printer.into_inner()).expect("utf8");
        assert_eq!(text, "P1_roc[0] (2x0) =\n  [ ]\n");
    }
}
