pub mod fs_ops;
pub mod path_lock;
pub mod records;
pub mod transform;
pub mod upload_service;
