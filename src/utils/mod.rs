pub mod dct_ops;
pub mod luma;
