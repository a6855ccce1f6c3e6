pub mod aggregate;
pub mod catalog;
pub mod deobfuscate;
pub mod fetch;

pub use aggregate::*;
pub use catalog::*;
pub use deobfuscate::*;
pub use fetch::*;
