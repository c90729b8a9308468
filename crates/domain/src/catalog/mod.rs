//! Catalog records: categories and the products they group.

mod category;
mod product;

pub use category::Category;
pub use product::Product;
