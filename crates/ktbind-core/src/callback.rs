//! Managed function objects callable from native code.
//!
//! A [`Function`] wraps a Kotlin `FunctionN` object passed into native code.
//! The object is held through a [`GlobalRef`], so the wrapper may be stored,
//! cloned and invoked later from any thread, including threads the runtime has
//! never seen. The reverse direction is not supported: a native function
//! object cannot be returned to managed code.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::arg_type::{ArgType, non_null};
use crate::env;
use crate::error::{Error, JavaException, Result};
use crate::refs::{GlobalRef, LocalClassRef, LocalRef};
use crate::signature::{TypeDescriptor, TypeTag, FunctionDescriptor, erased_invoke_sig};
use crate::sys::{JValue, JniEnv, MethodId};

/// A managed function object with native signature `F`, e.g.
/// `Function<fn(String) -> i32>`.
pub struct Function<F> {
    inner: Arc<Callback>,
    _signature: PhantomData<F>,
}

struct Callback {
    object: GlobalRef,
    invoke: MethodId,
}

impl<F> Function<F> {
    fn bind(env: &JniEnv, value: JValue, arity: usize, kotlin: impl FnOnce() -> String) -> Result<Self> {
        let object = non_null(value, kotlin)?;
        let class = LocalClassRef::of_object(env, object)?;
        let invoke = class.method("invoke", &erased_invoke_sig(arity))?;
        Ok(Self {
            inner: Arc::new(Callback {
                object: GlobalRef::new(env, object),
                invoke: invoke.id(),
            }),
            _signature: PhantomData,
        })
    }

    /// The retained function object.
    pub fn object(&self) -> &GlobalRef {
        &self.inner.object
    }

    /// Invokes `invoke(Object...)` with already boxed arguments.
    fn invoke_boxed<'env>(&self, env: &'env JniEnv, args: &[JValue]) -> Result<LocalRef<'env>> {
        let result = env.call_method(self.inner.object.as_obj(), self.inner.invoke, args);
        if let Some(ex) = JavaException::from_pending(env) {
            return Err(Error::Java(ex));
        }
        Ok(LocalRef::new(env, result.l()?))
    }
}

impl<F> Clone for Function<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _signature: PhantomData,
        }
    }
}

impl<F> fmt::Debug for Function<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Function").field(&self.inner.object).finish()
    }
}

macro_rules! impl_function {
    ($arity:literal; $($arg:ident $val:ident),*) => {
        impl<R: ArgType, $($arg: ArgType),*> Function<fn($($arg),*) -> R> {
            /// Calls the managed function on the current thread.
            ///
            /// Attaches the thread if needed. When no environment can be obtained
            /// the call is skipped and `R::default()` is returned. A managed
            /// exception surfaces as [`Error::Java`] and is no longer pending.
            pub fn call(&self, $($val: $arg),*) -> Result<R>
            where
                R: Default,
            {
                let Some(env) = env::this_thread() else {
                    log::error!("no runtime environment on this thread; callback skipped");
                    return Ok(R::default());
                };
                let env: &JniEnv = &*env;

                let boxed: Vec<LocalRef<'_>> = vec![
                    $(LocalRef::new(env, <$arg as ArgType>::java_box(env, $val)?)),*
                ];
                let args: Vec<JValue> = boxed.iter().map(|b| JValue::Object(b.as_obj())).collect();

                let result = self.invoke_boxed(env, &args)?;
                R::java_unbox(env, result.as_obj())
            }

            fn descriptor() -> FunctionDescriptor {
                FunctionDescriptor::new(
                    vec![$(TypeDescriptor::of::<$arg>()),*],
                    TypeDescriptor::of::<R>(),
                )
            }
        }

        impl<R: ArgType, $($arg: ArgType),*> ArgType for Function<fn($($arg),*) -> R> {
            const TAG: TypeTag = TypeTag::Object;

            fn type_sig() -> Cow<'static, str> {
                Cow::Borrowed(concat!("Lkotlin/jvm/functions/Function", $arity, ";"))
            }

            fn kotlin_type() -> Cow<'static, str> {
                Cow::Owned(Self::descriptor().kotlin_lambda())
            }

            fn native_value(env: &JniEnv, value: JValue) -> Result<Self> {
                Self::bind(env, value, $arity, || Self::kotlin_type().into_owned())
            }

            fn java_value(_env: &JniEnv, _value: Self) -> Result<JValue> {
                Err(Error::Unsupported(
                    "native functions returning a function object to managed code are not supported"
                        .into(),
                ))
            }
        }
    };
}

impl_function!(0;);
impl_function!(1; A0 a0);
impl_function!(2; A0 a0, A1 a1);
impl_function!(3; A0 a0, A1 a1, A2 a2);
impl_function!(4; A0 a0, A1 a1, A2 a2, A3 a3);
impl_function!(5; A0 a0, A1 a1, A2 a2, A3 a3, A4 a4);
impl_function!(6; A0 a0, A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_function!(7; A0 a0, A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);
impl_function!(8; A0 a0, A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6, A7 a7);
