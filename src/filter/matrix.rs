use crate::error::{reserve, Result};
use log::debug;

/// One row of match, delete and insert cells, borrowed out of a `FilterMatrix`.
/// Avoids repeated offset arithmetic and bounds checks on the shared buffer.
pub struct Cells<'a, T> {
    pub m: &'a mut [T],
    pub d: &'a mut [T],
    pub i: &'a mut [T],
}

/// The rolling row of the filter: `q` cells per state class, the previous row is overwritten in
/// place while the current one is computed.
/// Growing it moves the buffer, so cells are borrowed again after every `reinit`.
#[derive(Debug, Clone)]
pub struct FilterMatrix<T> {
    cells: Vec<T>,
    q: usize,
}

impl<T> Default for FilterMatrix<T> {
    fn default() -> Self {
        Self {
            cells: Vec::new(),
            q: 0,
        }
    }
}

impl<T: Copy> FilterMatrix<T> {
    /// Size the row for `q` cells per class, all set to `fill`. Never shrinks the allocation.
    pub fn reinit(&mut self, q: usize, fill: T) -> Result<()> {
        let needed = 3 * q;
        if needed > self.cells.capacity() {
            debug!(
                "growing filter matrix from {} to {} cells per class",
                self.capacity(),
                q
            );
        }
        self.cells.clear();
        reserve(&mut self.cells, needed, "filter matrix reallocation")?;
        self.cells.resize(needed, fill);
        self.q = q;
        Ok(())
    }

    /// Cells per class of the current row.
    #[inline]
    pub fn q(&self) -> usize {
        self.q
    }

    /// Cells per class the matrix holds without growing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cells.capacity() / 3
    }

    /// Split the row into its three classes.
    pub fn cells(&mut self) -> Cells<'_, T> {
        let (m, rest) = self.cells.split_at_mut(self.q);
        let (d, i) = rest.split_at_mut(self.q);
        Cells { m, d, i }
    }
}
