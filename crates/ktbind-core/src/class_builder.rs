//! Registration builder for native classes.

use std::marker::PhantomData;

use crate::bindings::{self, FunctionBinding};
use crate::native_class::NativeClass;
use crate::trampoline::{self, MemberFunction, NativeFunction};

/// Binds functions of a native class. Created by [`native_class`].
pub struct NativeClassBuilder<T> {
    _marker: PhantomData<fn() -> T>,
}

/// Starts binding `T`.
///
/// Every native class gets a `close()` member that destroys the native
/// object; further functions are added through the builder.
///
/// ```ignore
/// native_class::<Sample>()
///     .constructor("create", Sample::new)
///     .function("version", || 3)
///     .method("value", Sample::value);
/// ```
pub fn native_class<T: NativeClass>() -> NativeClassBuilder<T> {
    bindings::register_function(
        T::CLASS_NAME,
        FunctionBinding {
            name: "close".to_owned(),
            signature: "()V".to_owned(),
            is_member: true,
            entry: trampoline::destroy_entry::<T>(),
            kotlin_signature: "(): Unit".to_owned(),
        },
    );
    NativeClassBuilder {
        _marker: PhantomData,
    }
}

impl<T: NativeClass> NativeClassBuilder<T> {
    /// Binds a companion factory returning a new instance.
    pub fn constructor<F, M>(self, name: &str, factory: F) -> Self
    where
        F: NativeFunction<M, Output = T>,
        M: 'static,
    {
        self.function(name, factory)
    }

    /// Binds a companion `@JvmStatic` function.
    pub fn function<F, M>(self, name: &str, f: F) -> Self
    where
        F: NativeFunction<M>,
        M: 'static,
    {
        let descriptor = F::descriptor();
        self.register(FunctionBinding {
            name: name.to_owned(),
            signature: descriptor.signature(),
            is_member: false,
            entry: trampoline::static_entry::<F, M>(name.to_owned(), f),
            kotlin_signature: descriptor.kotlin_member(),
        })
    }

    /// Binds an instance method. The first parameter of `f` is the receiver,
    /// `&T` or `&mut T`.
    pub fn method<F, M>(self, name: &str, f: F) -> Self
    where
        F: MemberFunction<T, M>,
        M: 'static,
    {
        let descriptor = F::descriptor();
        self.register(FunctionBinding {
            name: name.to_owned(),
            signature: descriptor.signature(),
            is_member: true,
            entry: trampoline::member_entry::<T, F, M>(name.to_owned(), f),
            kotlin_signature: descriptor.kotlin_member(),
        })
    }

    fn register(self, binding: FunctionBinding) -> Self {
        log::trace!(
            "binding {}.{}{}",
            T::QUALIFIED_NAME,
            binding.name,
            binding.signature
        );
        bindings::register_function(T::CLASS_NAME, binding);
        self
    }
}
