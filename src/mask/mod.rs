//! Observation masks.
//!
//! A [`Mask`] describes which model variables, and which coordinates within
//! them, carry observed values at one observation time. The filter's
//! correction and bridging steps read the mask to know where the model's
//! log-densities apply; the model builds one mask per observation and hands
//! it out by reference.
//!
//! Per-variable metadata is packed into a single 3×V integer matrix rather
//! than three separate vectors: one contiguous allocation keeps the mask
//! small enough to pass by value through the tight argument-size limits of
//! accelerator kernels, and it is cache-friendly on the host for free.
//! Row 0 holds the dense size per variable, row 1 the sparse size, row 2 the
//! starting offset into the serialised coordinate vector for sparse
//! variables.

use nalgebra::DMatrix;

const ROW_DENSE: usize = 0;
const ROW_SPARSE: usize = 1;
const ROW_OFFSET: usize = 2;

/// Active-coordinate description for a single observation time.
///
/// A variable is either dense (all `size` coordinates observed), sparse
/// (an explicit coordinate list observed), or absent. Rows 0 and 1 of the
/// info matrix are never both non-zero for the same variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    /// 3×V metadata matrix: dense sizes, sparse sizes, sparse offsets.
    info: DMatrix<usize>,

    /// Serialised coordinate indices for sparsely masked variables.
    ixs: Vec<usize>,

    /// Total dense mask size.
    dense_size: usize,

    /// Total sparse mask size.
    sparse_size: usize,
}

impl Mask {
    /// Create an empty mask over `num_vars` variables.
    pub fn new(num_vars: usize) -> Self {
        Self {
            info: DMatrix::zeros(3, num_vars),
            ixs: Vec::new(),
            dense_size: 0,
            sparse_size: 0,
        }
    }

    /// Number of variables the mask covers.
    #[inline]
    pub fn num_vars(&self) -> usize {
        self.info.ncols()
    }

    /// Total mask size, dense plus sparse.
    #[inline]
    pub fn size(&self) -> usize {
        self.dense_size + self.sparse_size
    }

    /// Total size of the dense part.
    #[inline]
    pub fn dense_size(&self) -> usize {
        self.dense_size
    }

    /// Total size of the sparse part.
    #[inline]
    pub fn sparse_size(&self) -> usize {
        self.sparse_size
    }

    /// Reset all counters and metadata; truncates the coordinate vector.
    pub fn clear(&mut self) {
        self.info.fill(0);
        self.ixs.clear();
        self.dense_size = 0;
        self.sparse_size = 0;
    }

    /// Record variable `id` as dense over `size` coordinates.
    ///
    /// The variable must not already be recorded in the mask.
    pub fn add_dense(&mut self, id: usize, size: usize) {
        debug_assert!(id < self.num_vars());
        debug_assert!(
            !self.is_dense(id) && !self.is_sparse(id),
            "variable {} already recorded",
            id
        );

        self.info[(ROW_DENSE, id)] = size;
        self.dense_size += size;
    }

    /// Record each variable in `ids` as sparse over the shared coordinate
    /// list `indices`.
    ///
    /// The coordinate list is appended to the serialised index vector once
    /// and all listed variables reference it. None of the variables may
    /// already be recorded in the mask.
    pub fn add_sparse(&mut self, ids: &[usize], indices: &[usize]) {
        let start = self.ixs.len();
        let size = indices.len();

        self.ixs.extend_from_slice(indices);
        self.sparse_size += ids.len() * size;

        for &id in ids {
            debug_assert!(id < self.num_vars());
            debug_assert!(
                !self.is_dense(id) && !self.is_sparse(id),
                "variable {} already recorded",
                id
            );

            self.info[(ROW_OFFSET, id)] = start;
            self.info[(ROW_SPARSE, id)] = size;
        }
    }

    /// Is the variable active in the mask and dense?
    #[inline]
    pub fn is_dense(&self, id: usize) -> bool {
        self.info[(ROW_DENSE, id)] > 0
    }

    /// Is the variable active in the mask and sparse?
    #[inline]
    pub fn is_sparse(&self, id: usize) -> bool {
        self.info[(ROW_SPARSE, id)] > 0
    }

    /// Number of active coordinates of a variable, zero if absent.
    #[inline]
    pub fn get_size(&self, id: usize) -> usize {
        if self.is_dense(id) {
            self.info[(ROW_DENSE, id)]
        } else if self.is_sparse(id) {
            self.info[(ROW_SPARSE, id)]
        } else {
            0
        }
    }

    /// Translate the `i`th active coordinate of a variable into its dense
    /// index: the identity for dense variables, a serialised-index lookup
    /// for sparse ones.
    #[inline]
    pub fn get_index(&self, id: usize, i: usize) -> usize {
        if self.is_sparse(id) {
            self.ixs[self.info[(ROW_OFFSET, id)] + i]
        } else {
            i
        }
    }

    /// Serialised coordinate indices of a sparse variable.
    ///
    /// The returned view borrows the mask and is valid only while the mask
    /// is unmodified. Empty for dense or absent variables.
    pub fn indices(&self, id: usize) -> &[usize] {
        let start = self.info[(ROW_OFFSET, id)];
        let size = self.info[(ROW_SPARSE, id)];
        &self.ixs[start..start + size]
    }

    /// Deep copy from another mask, resizing storage to match.
    ///
    /// This is the cross-location assignment: metadata and coordinates are
    /// copied element-wise into this mask's own allocations.
    pub fn assign_from(&mut self, other: &Mask) {
        if self.info.ncols() != other.info.ncols() {
            self.info = DMatrix::zeros(3, other.info.ncols());
        }
        self.info.copy_from(&other.info);
        self.ixs.clear();
        self.ixs.extend_from_slice(&other.ixs);
        self.dense_size = other.dense_size;
        self.sparse_size = other.sparse_size;
    }
}
