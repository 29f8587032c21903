//! In-process managed runtime for exercising bindings without a JVM.
//!
//! [`Jvm`] implements the process-wide [`JavaVm`](ktbind_core::JavaVm) handle
//! and [`ThreadEnv`] the per-thread native interface. Classes are declared
//! with [`ClassDef`]; the standard library surface the binding engine uses is
//! predefined.
//!
//! ```ignore
//! let vm = Jvm::new();
//! vm.define_class(ClassDef::new("com/example/Sample").native_static("answer", "()I"))?;
//! let status = ktbind_core::on_load(vm.clone(), bindings);
//! let env = vm.attach();
//! let answer = env.invoke_static("com/example/Sample", "answer", "()I", &[])?;
//! ```

// Runtime
mod vm;
pub use vm::{Jvm, VmStats};

mod env;
pub use env::ThreadEnv;

mod builtins;
pub use builtins::MAX_LAMBDA_ARITY;

// Classes
mod class;
pub use class::{Builtin, ClassDef, ClassFlags, ClassId, MethodFlags};

// Values and objects
mod value;
pub use value::{Key, ObjId, Val};

mod heap;
pub use heap::{ArrayError, PrimArray};

mod refs;

// Errors
mod error;
pub use error::{Throw, Thrown, VmError};
