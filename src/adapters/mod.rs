// Adapters layer: concrete implementations for external systems.

pub mod azure;
pub mod wire;

pub use azure::AzureAnalyzer;
