mod file;
mod memory;

pub use file::FileByteStore;
pub use memory::InMemoryByteStore;
