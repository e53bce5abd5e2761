mod element;
pub use element::*;

mod storage;
pub use storage::Storage;

mod dense;
pub use dense::*;

mod array;
pub use array::*;

mod array2d;
pub use array2d::*;

mod shared;
pub use shared::*;

mod varray;
pub use varray::*;

mod sparse;
pub use sparse::*;

mod host;
pub use host::*;
