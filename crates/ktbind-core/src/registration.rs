//! Load and unload routines.
//!
//! The runtime calls [`on_load`] once when the extension library is loaded.
//! User registration code runs inside it, after which every bound class is
//! resolved and its trampolines are installed. Failures are reported as a
//! status code with a descriptive exception left pending; nothing unwinds into
//! the runtime.

use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;

use crate::bindings::{self, FunctionBinding};
use crate::env;
use crate::error::{Error, RegistrationError};
use crate::refs::LocalClassRef;
use crate::sys::{JNI_ERR, JNI_VERSION_1_6, JavaVm, JniEnv, NativeMethod};
use crate::trampoline::{self, panic_message};

/// Registers the extension with the runtime.
///
/// Runs `initializer`, which declares bindings with
/// [`native_class`](crate::native_class) and [`data_class`](crate::data_class),
/// then installs them. Returns [`JNI_VERSION_1_6`] on success, the runtime's
/// status when no environment is available, and [`JNI_ERR`] otherwise.
pub fn on_load<F: FnOnce()>(vm: Arc<dyn JavaVm>, initializer: F) -> i32 {
    let env = match vm.get_env(JNI_VERSION_1_6) {
        Ok(env) => env,
        Err(status) => {
            let err = RegistrationError::Environment(status);
            log::error!("{}", err);
            return err.status();
        }
    };

    env::load(vm);
    env::set_env(Rc::clone(&env));

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        bindings::clear();
        initializer();
        register_all(&*env)
    }));

    match outcome {
        Ok(Ok(())) => {
            log::debug!("extension loaded");
            JNI_VERSION_1_6
        }
        Ok(Err(err)) => {
            log::error!("extension failed to load: {}", err);
            err.status()
        }
        Err(payload) => {
            let err = RegistrationError::Panic(panic_message(payload.as_ref()));
            log::error!("extension failed to load: {}", err);
            JNI_ERR
        }
    }
}

/// Forgets the runtime handle recorded by [`on_load`].
pub fn on_unload(vm: &Arc<dyn JavaVm>) {
    let same = env::java_vm().is_some_and(|loaded| Arc::ptr_eq(&loaded, vm));
    if !same {
        log::warn!("unloading a runtime that was not the one loaded");
    }
    env::unload();
    log::debug!("extension unloaded");
}

fn register_all(env: &JniEnv) -> Result<(), RegistrationError> {
    for (class_name, functions) in bindings::function_bindings() {
        let Some(class) = LocalClassRef::find_optional(env, &class_name) else {
            return Err(fail(env, RegistrationError::NativeClassNotFound(class_name)));
        };

        let methods: Vec<NativeMethod> = functions
            .iter()
            .map(FunctionBinding::native_method)
            .collect();
        let status = env.register_natives(class.as_obj(), &methods);
        if !status.is_ok() {
            return Err(RegistrationError::RegisterNatives {
                class: class_name,
                status,
            });
        }
        log::debug!("registered {} native method(s) on {}", methods.len(), class_name);
    }

    if env.exception_check() {
        return Err(RegistrationError::PendingException);
    }

    for data in bindings::data_class_bindings().into_values() {
        let Some(class) = LocalClassRef::find_optional(env, data.class_name) else {
            return Err(fail(
                env,
                RegistrationError::DataClassNotFound(data.class_name.to_owned()),
            ));
        };

        for field in data.fields.iter() {
            if env
                .get_field_id(class.as_obj(), &field.name, &field.signature)
                .is_some()
            {
                continue;
            }
            return Err(fail(
                env,
                RegistrationError::FieldNotFound {
                    class: data.class_name.to_owned(),
                    name: field.name.clone(),
                    signature: field.signature.clone(),
                },
            ));
        }
        log::debug!("verified {} field(s) of {}", data.fields.len(), data.qualified_name);
    }

    Ok(())
}

/// Replaces whatever the failed lookup left pending with a descriptive exception.
fn fail(env: &JniEnv, err: RegistrationError) -> RegistrationError {
    env.exception_clear();
    trampoline::raise(env, &Error::native(err.to_string()));
    err
}
