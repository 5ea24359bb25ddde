pub mod align;
pub mod batch;
pub mod export;
pub mod info;
pub mod validate;
