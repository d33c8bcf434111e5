//! CLI Commands

pub mod init;
pub mod notes;
pub mod scan;
pub mod sync;
