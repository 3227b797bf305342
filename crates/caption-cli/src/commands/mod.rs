pub mod batches;
pub mod caption;
pub mod extract;
pub mod preprocess;
