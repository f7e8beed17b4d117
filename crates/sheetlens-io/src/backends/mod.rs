#[cfg(feature = "json")]
pub mod json;
pub mod memory;

#[cfg(feature = "json")]
pub use json::JsonWorkbook;
pub use memory::MemoryWorkbook;
