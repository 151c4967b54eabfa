//! Compressed sparse row matrices for Markov generators.
//!
//! Matrices are assembled from `(row, column, value)` triplets and stored in compressed row form.
//! Duplicate triplets are summed, which mirrors how rate contributions accumulate when several
//! transition types connect the same pair of states.

use ndarray::Array2;

/// Accumulator for sparse matrix entries.
#[derive(Clone, Debug, Default)]
pub struct Triplets {
    n_rows: usize,
    n_cols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl Triplets {
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            ..Default::default()
        }
    }

    pub fn with_capacity(n_rows: usize, n_cols: usize, capacity: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: Vec::with_capacity(capacity),
            cols: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// Add a value at `(row, col)`. Out of range entries are a caller bug.
    pub fn push(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n_rows && col < self.n_cols);
        self.rows.push(row);
        self.cols.push(col);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Set the diagonal to the negative off-diagonal row sums and compress.
    ///
    /// The result has rows summing to zero, i.e. it is a Markov generator if all pushed values were
    /// non-negative off-diagonal rates.
    pub fn into_generator(mut self) -> SparseMatrix {
        let mut row_sums = vec![0.; self.n_rows];
        for ((&row, &col), &value) in self.rows.iter().zip(&self.cols).zip(&self.values) {
            if row != col {
                row_sums[row] += value;
            }
        }
        for (row, sum) in row_sums.into_iter().enumerate() {
            self.push(row, row, -sum);
        }
        self.build()
    }

    /// Compress into a CSR matrix, summing duplicates.
    pub fn build(self) -> SparseMatrix {
        // counting sort by row
        let mut row_offsets = vec![0; self.n_rows + 1];
        for &row in self.rows.iter() {
            row_offsets[row + 1] += 1;
        }
        for i in 0..self.n_rows {
            row_offsets[i + 1] += row_offsets[i];
        }

        let mut next = row_offsets.clone();
        let mut order = vec![0; self.values.len()];
        for (entry, &row) in self.rows.iter().enumerate() {
            order[next[row]] = entry;
            next[row] += 1;
        }

        let mut offsets = Vec::with_capacity(self.n_rows + 1);
        let mut columns = Vec::with_capacity(self.values.len());
        let mut values = Vec::with_capacity(self.values.len());
        offsets.push(0);

        for row in 0..self.n_rows {
            let segment = &mut order[row_offsets[row]..row_offsets[row + 1]];
            segment.sort_unstable_by_key(|&entry| self.cols[entry]);

            let row_start = columns.len();
            for &entry in segment.iter() {
                let col = self.cols[entry];
                match columns.last() {
                    Some(&last) if columns.len() > row_start && last == col => {
                        if let Some(value) = values.last_mut() {
                            *value += self.values[entry];
                        }
                    }
                    _ => {
                        columns.push(col);
                        values.push(self.values[entry]);
                    }
                }
            }
            offsets.push(columns.len());
        }

        SparseMatrix {
            n_rows: self.n_rows,
            n_cols: self.n_cols,
            row_offsets: offsets,
            columns,
            values,
        }
    }
}

/// Sparse matrix in compressed row storage.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseMatrix {
    n_rows: usize,
    n_cols: usize,
    row_offsets: Vec<usize>,
    columns: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// Square matrix without any stored entries.
    pub fn zeros(size: usize) -> Self {
        Triplets::new(size, size).build()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols)
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Iterate over the stored `(column, value)` pairs of a row.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_offsets[row]..self.row_offsets[row + 1];
        self.columns[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        let range = self.row_offsets[row]..self.row_offsets[row + 1];
        match self.columns[range.clone()].binary_search(&col) {
            Ok(pos) => self.values[range.start + pos],
            Err(_) => 0.,
        }
    }

    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.n_rows)
            .map(|row| self.row(row).map(|(_, value)| value).sum())
            .collect()
    }

    /// Compute `vᵗ · A` and add it to `out`.
    pub fn left_mul_add(&self, vector: &[f64], out: &mut [f64]) {
        debug_assert_eq!(vector.len(), self.n_rows);
        debug_assert_eq!(out.len(), self.n_cols);
        for (row, &weight) in vector.iter().enumerate() {
            if weight == 0. {
                continue;
            }
            for (col, value) in self.row(row) {
                out[col] += weight * value;
            }
        }
    }

    /// Compute `vᵗ · A`.
    pub fn left_mul(&self, vector: &[f64]) -> Vec<f64> {
        let mut out = vec![0.; self.n_cols];
        self.left_mul_add(vector, &mut out);
        out
    }

    /// Place square blocks along the diagonal of a new matrix.
    pub fn block_diagonal(blocks: &[SparseMatrix]) -> SparseMatrix {
        let size: usize = blocks.iter().map(|block| block.n_rows).sum();
        let nnz: usize = blocks.iter().map(|block| block.nnz()).sum();

        let mut row_offsets = Vec::with_capacity(size + 1);
        let mut columns = Vec::with_capacity(nnz);
        let mut values = Vec::with_capacity(nnz);
        row_offsets.push(0);

        let mut offset = 0;
        for block in blocks {
            debug_assert_eq!(block.n_rows, block.n_cols);
            for row in 0..block.n_rows {
                for (col, value) in block.row(row) {
                    columns.push(col + offset);
                    values.push(value);
                }
                row_offsets.push(columns.len());
            }
            offset += block.n_rows;
        }

        SparseMatrix {
            n_rows: size,
            n_cols: size,
            row_offsets,
            columns,
            values,
        }
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.n_rows, self.n_cols));
        for row in 0..self.n_rows {
            for (col, value) in self.row(row) {
                dense[[row, col]] += value;
            }
        }
        dense
    }
}
