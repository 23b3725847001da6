// # Resolver Implementations
//
// This module provides implementations of the Resolver trait.

pub mod system;

pub use system::SystemResolver;
