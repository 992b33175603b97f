pub mod info;
pub mod process;
