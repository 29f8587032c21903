//! Derive macros binding native types to managed classes.
//!
//! # Macros
//!
//! - `#[derive(DataClass)]` - marshal a type by value, field by field
//! - `#[derive(NativeClass)]` - keep a type on the native heap behind a handle
//!
//! # Example
//!
//! ```ignore
//! use ktbind_macros::{DataClass, NativeClass};
//!
//! #[derive(Default, DataClass)]
//! #[ktbind(class = "com.example.Data")]
//! pub struct Data {
//!     pub i: i32,
//!     pub str: String,
//! }
//!
//! #[derive(Clone, NativeClass)]
//! #[ktbind(class = "com.example.Sample", clone)]
//! pub struct Sample {
//!     name: String,
//! }
//! ```

use proc_macro::TokenStream;

mod attrs;
mod derive_class;

use derive_class::ClassKind;

/// Binds a type to a managed data class.
///
/// The type must implement `Default`. Fields are registered at load time
/// with `data_class::<T>().field(..)`.
///
/// # Attributes
///
/// - `#[ktbind(class = "...")]` - dotted name of the managed class (required)
#[proc_macro_derive(DataClass, attributes(ktbind))]
pub fn derive_data_class(input: TokenStream) -> TokenStream {
    derive_class::derive_class_impl(input, ClassKind::Data)
}

/// Binds a type to a managed class deriving from `NativeObject`.
///
/// # Attributes
///
/// - `#[ktbind(class = "...")]` - dotted name of the managed class (required)
/// - `#[ktbind(clone)]` - allow functions to take the type by value; the
///   object behind the handle is cloned
#[proc_macro_derive(NativeClass, attributes(ktbind))]
pub fn derive_native_class(input: TokenStream) -> TokenStream {
    derive_class::derive_class_impl(input, ClassKind::Native)
}
