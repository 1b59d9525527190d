//! Settings representation and translation for the device view plugin
//!
//! This crate provides:
//! - The persisted, JSON-safe settings document (SettingsDocument)
//! - Structured values used by the RPC surface (Series, CornerTable)
//! - The codec between the two representations, plus document merge

pub mod codec;
pub mod document;
pub mod error;
pub mod values;

pub use codec::{merge, to_document, to_structured, StructuredSettings, StructuredValue};
pub use document::{keys, SettingValue, SettingsDocument};
pub use error::SettingsError;
pub use values::{CornerTable, Series};
