pub mod memory;
pub mod traits;

pub use memory::MemoryProvider;
pub use traits::{LibraryProvider, ProviderChanges, ProviderPage};
