//! docseal-storage: content-addressed document store over OpenDAL

pub mod operator;
pub mod store;

pub use operator::{build_operator, S3Credentials};
pub use store::{content_id, ContentStore};
