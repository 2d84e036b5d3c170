/// Dense row-major `f32` grid.
///
/// Used for every intermediate of the engine: the power spectrogram
/// (`[frequency bins][frames]`), the filterbank weights (`[mel bands][bins]`),
/// mel energies and decibels (`[mel bands][frames]`).
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Test fixture constructor; panics on ragged input.
    #[cfg(test)]
    pub(crate) fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        let num_rows = rows.len();
        let mut data = Vec::with_capacity(num_rows * cols);
        for row in rows {
            assert_eq!(row.len(), cols, "ragged rows");
            data.extend(row);
        }
        Self {
            rows: num_rows,
            cols,
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn iter(&self) -> impl Iterator<Item = &f32> {
        self.data.iter()
    }

    /// Largest cell, or `None` for an empty matrix.
    pub fn max(&self) -> Option<f32> {
        self.data.iter().copied().reduce(f32::max)
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Mean of one row.
    pub fn row_mean(&self, row: usize) -> f32 {
        if self.cols == 0 {
            return 0.0;
        }
        self.row(row).iter().sum::<f32>() / self.cols as f32
    }
}
