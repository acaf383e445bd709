pub mod config;
pub mod init;
pub mod results;
pub mod speaking;
pub mod writing;
