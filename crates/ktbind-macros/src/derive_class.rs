//! Implementation of `#[derive(DataClass)]` and `#[derive(NativeClass)]`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

use crate::attrs::{TypeAttrs, class_name_of, class_sig, validate_class_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Data,
    Native,
}

pub fn derive_class_impl(input: TokenStream, kind: ClassKind) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_class_inner(&input, kind) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_class_inner(input: &DeriveInput, kind: ClassKind) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let attrs = TypeAttrs::from_attrs(&input.attrs)?;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "a bound class maps to exactly one managed class and cannot be generic",
        ));
    }

    let Some(class) = &attrs.class else {
        return Err(syn::Error::new_spanned(
            name,
            "missing `#[ktbind(class = \"...\")]` naming the managed class",
        ));
    };
    let qualified_name = validate_class_name(class)?;
    let class_name = class_name_of(&qualified_name);
    let type_sig = class_sig(&class_name);

    let (trait_impl, module) = match kind {
        ClassKind::Data => {
            if attrs.clone {
                return Err(syn::Error::new_spanned(
                    class,
                    "`clone` applies to native classes only; data classes are always copied",
                ));
            }
            (
                quote! {
                    impl ::ktbind_core::DataClass for #name {
                        const CLASS_NAME: &'static str = #class_name;
                        const QUALIFIED_NAME: &'static str = #qualified_name;
                    }
                },
                quote! { ::ktbind_core::data_class },
            )
        }
        ClassKind::Native => {
            let copy_out = attrs.clone.then(|| {
                quote! {
                    fn copy_out(&self) -> ::std::option::Option<Self> {
                        ::std::option::Option::Some(::std::clone::Clone::clone(self))
                    }
                }
            });
            (
                quote! {
                    impl ::ktbind_core::NativeClass for #name {
                        const CLASS_NAME: &'static str = #class_name;
                        const QUALIFIED_NAME: &'static str = #qualified_name;
                        #copy_out
                    }
                },
                quote! { ::ktbind_core::native_class },
            )
        }
    };

    Ok(quote! {
        #trait_impl

        impl ::ktbind_core::ArgType for #name {
            const TAG: ::ktbind_core::TypeTag = ::ktbind_core::TypeTag::Object;

            fn type_sig() -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed(#type_sig)
            }

            fn kotlin_type() -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed(#qualified_name)
            }

            fn native_value(
                env: &::ktbind_core::JniEnv,
                value: ::ktbind_core::JValue,
            ) -> ::ktbind_core::Result<Self> {
                #module::native_value::<Self>(env, value)
            }

            fn java_value(
                env: &::ktbind_core::JniEnv,
                value: Self,
            ) -> ::ktbind_core::Result<::ktbind_core::JValue> {
                #module::java_value::<Self>(env, value)
            }
        }
    })
}
