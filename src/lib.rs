//! Native extensions for Kotlin on the JVM.
//!
//! `ktbind` binds Rust functions and types to Kotlin classes through the
//! native interface of the runtime: primitives, strings, collections,
//! callbacks, value-copied data classes and handle-owning native classes.
//!
//! ```ignore
//! use ktbind::prelude::*;
//!
//! #[derive(NativeClass)]
//! #[ktbind(class = "com.example.Sample")]
//! pub struct Sample {
//!     name: String,
//! }
//!
//! fn bindings() {
//!     native_class::<Sample>()
//!         .constructor("create", |name: String| Sample { name })
//!         .method("name", |s: &Sample| s.name.clone());
//! }
//!
//! ktbind::extension_module!(bindings);
//! ```

pub use ktbind_core::*;

#[doc(inline)]
pub use ktbind_macros::{DataClass, NativeClass};

/// Items needed to declare bindings.
pub mod prelude {
    pub use ktbind_core::{
        ArgType, DataClass, Error, Function, JavaException, JavaOutput, NativeClass, Result,
        data_class, extension_module, java_print, java_println, native_class,
    };
    pub use ktbind_macros::{DataClass, NativeClass};
}
