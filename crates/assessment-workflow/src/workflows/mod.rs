pub mod assessment;
pub mod catalog_import;
