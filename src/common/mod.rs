pub mod error;
pub mod process;
pub mod response;
pub mod upload;
