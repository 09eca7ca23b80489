//! keepsake-storage: opaque ciphertext blobs behind an OpenDAL operator

pub mod blob;
pub mod operator;

pub use blob::{BlobError, BlobStore};
pub use operator::{build_from_core_config, build_memory_operator, S3Credentials};
