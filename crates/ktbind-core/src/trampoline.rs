//! Exception-safe entry points.
//!
//! A trampoline is the native entry installed into the runtime for one bound
//! function. It converts the incoming boundary values, runs the native body and
//! converts the result back. Nothing unwinds across the boundary: every native
//! error and every panic becomes a pending managed exception, and the runtime
//! receives the zero value of the declared return type.
//!
//! Managed exceptions captured while the body ran ([`Error::Java`]) are
//! re-thrown unchanged. Any other failure raises `java.lang.Exception` with the
//! error's message, unless an exception is already pending, which then wins.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::arg_type::ArgType;
use crate::error::{Error, Result};
use crate::native_class::{self, NativeClass};
use crate::refs::LocalClassRef;
use crate::signature::{FunctionDescriptor, TypeDescriptor};
use crate::sys::{JObject, JValue, JniEnv, NativeFn};

const EXCEPTION_CLASS: &str = "java/lang/Exception";

/// Marks bodies returning a plain value.
pub struct Plain;
/// Marks bodies returning `Result<T, E>`.
pub struct Fallible;

/// Return types a bound function may declare.
///
/// The marker keeps the plain and fallible impls apart: `T` covers any bound
/// type and `Result<T, E>` covers any error convertible into [`Error`].
pub trait ReturnValue<Marker> {
    type Output: ArgType;

    fn into_result(self) -> Result<Self::Output>;
}

impl<T: ArgType> ReturnValue<Plain> for T {
    type Output = T;

    fn into_result(self) -> Result<T> {
        Ok(self)
    }
}

impl<T: ArgType, E: Into<Error>> ReturnValue<Fallible> for std::result::Result<T, E> {
    type Output = T;

    fn into_result(self) -> Result<T> {
        self.map_err(Into::into)
    }
}

/// A native callable bound as a free or companion function.
pub trait NativeFunction<Marker>: Send + Sync + 'static {
    type Output: ArgType;

    fn descriptor() -> FunctionDescriptor;

    fn invoke(&self, env: &JniEnv, args: &[JValue]) -> Result<Self::Output>;
}

/// A native callable bound as an instance method of `T`. The first parameter
/// receives the object behind the handle the method was called on.
pub trait MemberFunction<T, Marker>: Send + Sync + 'static {
    type Output: ArgType;

    fn descriptor() -> FunctionDescriptor;

    fn invoke(&self, env: &JniEnv, this: JObject, args: &[JValue]) -> Result<Self::Output>;
}

fn check_arity(args: &[JValue], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(Error::ArgumentCount {
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

macro_rules! impl_native_function {
    ($arity:literal; $($arg:ident $val:ident $idx:tt),*) => {
        impl<Func, R, RM, $($arg),*> NativeFunction<(RM, fn($($arg),*) -> R)> for Func
        where
            Func: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: ReturnValue<RM>,
            $($arg: ArgType,)*
        {
            type Output = R::Output;

            fn descriptor() -> FunctionDescriptor {
                FunctionDescriptor::new(
                    vec![$(TypeDescriptor::of::<$arg>()),*],
                    TypeDescriptor::of::<R::Output>(),
                )
            }

            #[allow(unused_variables)]
            fn invoke(&self, env: &JniEnv, args: &[JValue]) -> Result<R::Output> {
                check_arity(args, $arity)?;
                (self)($($arg::native_value(env, args[$idx])?),*).into_result()
            }
        }

        impl<T, Func, R, RM, $($arg),*> MemberFunction<T, (RM, fn(&T, $($arg),*) -> R)> for Func
        where
            T: NativeClass,
            Func: Fn(&T, $($arg),*) -> R + Send + Sync + 'static,
            R: ReturnValue<RM>,
            $($arg: ArgType,)*
        {
            type Output = R::Output;

            fn descriptor() -> FunctionDescriptor {
                FunctionDescriptor::new(
                    vec![$(TypeDescriptor::of::<$arg>()),*],
                    TypeDescriptor::of::<R::Output>(),
                )
            }

            #[allow(unused_variables)]
            fn invoke(&self, env: &JniEnv, this: JObject, args: &[JValue]) -> Result<R::Output> {
                check_arity(args, $arity)?;
                $(let $val = $arg::native_value(env, args[$idx])?;)*
                native_class::with_instance::<T, _>(env, this, |obj| (self)(obj, $($val),*))?
                    .into_result()
            }
        }

        impl<T, Func, R, RM, $($arg),*> MemberFunction<T, (RM, fn(&mut T, $($arg),*) -> R)> for Func
        where
            T: NativeClass,
            Func: Fn(&mut T, $($arg),*) -> R + Send + Sync + 'static,
            R: ReturnValue<RM>,
            $($arg: ArgType,)*
        {
            type Output = R::Output;

            fn descriptor() -> FunctionDescriptor {
                FunctionDescriptor::new(
                    vec![$(TypeDescriptor::of::<$arg>()),*],
                    TypeDescriptor::of::<R::Output>(),
                )
            }

            #[allow(unused_variables)]
            fn invoke(&self, env: &JniEnv, this: JObject, args: &[JValue]) -> Result<R::Output> {
                check_arity(args, $arity)?;
                $(let $val = $arg::native_value(env, args[$idx])?;)*
                native_class::with_instance_mut::<T, _>(env, this, |obj| (self)(obj, $($val),*))?
                    .into_result()
            }
        }
    };
}

impl_native_function!(0;);
impl_native_function!(1; A0 a0 0);
impl_native_function!(2; A0 a0 0, A1 a1 1);
impl_native_function!(3; A0 a0 0, A1 a1 1, A2 a2 2);
impl_native_function!(4; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3);
impl_native_function!(5; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4);
impl_native_function!(6; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4, A5 a5 5);
impl_native_function!(7; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4, A5 a5 5, A6 a6 6);
impl_native_function!(8; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4, A5 a5 5, A6 a6 6, A7 a7 7);
impl_native_function!(9; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4, A5 a5 5, A6 a6 6, A7 a7 7, A8 a8 8);
impl_native_function!(10; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4, A5 a5 5, A6 a6 6, A7 a7 7, A8 a8 8, A9 a9 9);
impl_native_function!(11; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4, A5 a5 5, A6 a6 6, A7 a7 7, A8 a8 8, A9 a9 9, A10 a10 10);
impl_native_function!(12; A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4, A5 a5 5, A6 a6 6, A7 a7 7, A8 a8 8, A9 a9 9, A10 a10 10, A11 a11 11);

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Makes `err` pending on `env` as a managed exception.
pub fn raise(env: &JniEnv, err: &Error) {
    if let Error::Java(ex) = err {
        let status = ex.rethrow(env);
        if !status.is_ok() {
            log::error!("failed to re-throw managed exception '{}': {}", ex, status);
        }
        return;
    }

    if env.exception_check() {
        log::warn!("exception already pending, native error not raised: {}", err);
        return;
    }

    match LocalClassRef::find(env, EXCEPTION_CLASS) {
        Ok(class) => {
            let status = env.throw_new(class.as_obj(), &err.to_string());
            if !status.is_ok() {
                log::error!("failed to raise '{}': {}", err, status);
            }
        }
        Err(lookup) => log::error!("cannot raise '{}': {}", err, lookup),
    }
}

/// Runs `body` with errors and panics translated into managed exceptions.
///
/// Returns the converted result, or the zero value of `R` when an exception
/// was raised.
pub fn guarded<R: ArgType>(env: &JniEnv, name: &str, body: impl FnOnce() -> Result<R>) -> JValue {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        body().and_then(|value| R::java_value(env, value))
    }));

    match outcome {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            log::debug!("native function '{}' failed: {}", name, err);
            raise(env, &err);
            R::TAG.zero_value()
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("native function '{}' panicked: {}", name, message);
            raise(env, &Error::native(message));
            R::TAG.zero_value()
        }
    }
}

/// Entry point for a companion function.
pub(crate) fn static_entry<F, M>(name: String, f: F) -> NativeFn
where
    F: NativeFunction<M>,
    M: 'static,
{
    NativeFn::new(move |env: &JniEnv, _class: JObject, args: &[JValue]| {
        #[cfg(feature = "profiling")]
        profiling::scope!("native function", name.as_str());
        guarded::<F::Output>(env, &name, || f.invoke(env, args))
    })
}

/// Entry point for an instance method of `T`.
pub(crate) fn member_entry<T, F, M>(name: String, f: F) -> NativeFn
where
    T: NativeClass,
    F: MemberFunction<T, M>,
    M: 'static,
{
    NativeFn::new(move |env: &JniEnv, this: JObject, args: &[JValue]| {
        #[cfg(feature = "profiling")]
        profiling::scope!("native method", name.as_str());
        guarded::<F::Output>(env, &name, || f.invoke(env, this, args))
    })
}

/// Entry point for `close()`, which destroys the native object.
pub(crate) fn destroy_entry<T: NativeClass>() -> NativeFn {
    NativeFn::new(|env: &JniEnv, this: JObject, args: &[JValue]| {
        guarded::<()>(env, "close", || {
            check_arity(args, 0)?;
            native_class::destroy::<T>(env, this)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_of<F: NativeFunction<M>, M>(_: &F) -> FunctionDescriptor {
        F::descriptor()
    }

    fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    fn parse(text: String) -> std::result::Result<i64, Error> {
        text.parse::<i64>()
            .map_err(|e| Error::Conversion(e.to_string()))
    }

    #[test]
    fn plain_and_fallible_returns_share_descriptors() {
        let plain = descriptor_of(&add);
        assert_eq!(plain.signature(), "(II)I");
        assert_eq!(plain.kotlin_member(), "(arg0: Int, arg1: Int): Int");

        let fallible = descriptor_of(&parse);
        assert_eq!(fallible.signature(), "(Ljava/lang/String;)J");
        assert_eq!(fallible.kotlin_member(), "(arg0: String): Long");
    }

    #[test]
    fn unit_return() {
        let desc = descriptor_of(&|| {});
        assert_eq!(desc.signature(), "()V");
        assert_eq!(desc.kotlin_member(), "(): Unit");
    }

    #[test]
    fn anyhow_errors_are_accepted() {
        fn fails() -> anyhow::Result<bool> {
            anyhow::bail!("nope")
        }
        assert_eq!(descriptor_of(&fails).signature(), "()Z");
    }

    #[test]
    fn panic_payloads() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom 1");
        let payload = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let err = check_arity(&[JValue::Int(1)], 2).unwrap_err();
        assert!(matches!(err, Error::ArgumentCount { expected: 2, actual: 1 }));
    }
}
