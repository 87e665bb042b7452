pub mod array;
pub mod broadcast;
pub mod checksum;
pub mod cluster;
pub mod datastore;
pub mod error;
pub mod host_dump;
pub mod id;
pub mod memmap;
pub mod task;
pub mod task_manager;
pub mod topology;
pub mod worker;
