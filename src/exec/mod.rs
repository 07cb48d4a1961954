//! Per-execution iteration state. A [`RangeIterator`] walks the rows
//! of one bound range variable; a [`JoinedRowIterator`] composes one
//! iterator per range variable into nested-loop join output, including
//! the second pass that recovers unmatched rows of right/full outer
//! joins. All state here is freshly allocated per execution; the bound
//! plan itself is never mutated.

mod join;
mod range;

pub use join::JoinedRowIterator;
pub use range::RangeIterator;
