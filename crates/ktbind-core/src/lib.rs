//! Binding engine between native Rust code and a JVM-style managed runtime.
//!
//! This crate provides:
//! - the boundary ABI the engine consumes ([`NativeInterface`], [`JavaVm`])
//! - compile-time type bindings ([`ArgType`]) for primitives, strings,
//!   collections, callbacks, data classes and native classes
//! - exception-safe trampolines for bound functions
//! - scoped and shared reference management
//! - the load-time registration protocol and binding introspection

// Boundary ABI
pub mod sys;
pub use sys::{
    Env, JArray, JClass, JNI_EDETACHED, JNI_ERR, JNI_EVERSION, JNI_OK, JNI_VERSION_1_6, JObject,
    JString, JThrowable, JValue, JavaVm, JniEnv, JniStatus, MethodId, FieldId, NativeCallable,
    NativeFn, NativeInterface, NativeMethod, PrimitiveKind, Region, RegionMut,
};

// Error types
mod error;
pub use error::{Error, JavaException, RegistrationError, Result, check_pending};

// Signatures and Kotlin names
pub mod signature;
pub use signature::{FunctionDescriptor, TypeDescriptor, TypeTag};

// Type bindings
mod arg_type;
pub use arg_type::ArgType;

pub mod collections;

mod callback;
pub use callback::Function;

// Reference and environment management
pub mod env;
mod refs;
pub use refs::{
    Field, GlobalRef, LocalClassRef, LocalRef, Method, StaticField, StaticMethod,
    skipped_global_releases,
};

// Class bindings
pub mod bindings;
pub mod data_class;
pub use data_class::{DataClass, DataClassBuilder, data_class};
pub mod native_class;
pub use native_class::NativeClass;
mod class_builder;
pub use class_builder::{NativeClassBuilder, native_class};

// Trampolines
mod trampoline;
pub use trampoline::{
    Fallible, MemberFunction, NativeFunction, Plain, ReturnValue, guarded, raise,
};

// Registration
mod registration;
pub use registration::{on_load, on_unload};

/// Defines the `on_load`/`on_unload` pair for a registration function.
///
/// ```ignore
/// fn bindings() {
///     native_class::<Sample>().function("answer", || 42);
/// }
///
/// ktbind_core::extension_module!(bindings);
/// ```
#[macro_export]
macro_rules! extension_module {
    ($initializer:path) => {
        pub fn on_load(vm: ::std::sync::Arc<dyn $crate::JavaVm>) -> i32 {
            $crate::on_load(vm, $initializer)
        }

        pub fn on_unload(vm: &::std::sync::Arc<dyn $crate::JavaVm>) {
            $crate::on_unload(vm)
        }
    };
}

// Output and introspection
pub mod output;
pub use output::JavaOutput;
mod introspection;
pub use introspection::{print_registered_bindings, registered_bindings, write_registered_bindings};
