//! Attribute parsing for the binding derives.

use syn::{Attribute, LitStr};

/// Parsed `#[ktbind(...)]` attributes on a type.
#[derive(Debug, Default)]
pub struct TypeAttrs {
    /// Dotted managed class name, e.g. `com.example.Sample`.
    pub class: Option<LitStr>,
    /// Native classes only: allow passing by value through `Clone`.
    pub clone: bool,
}

impl TypeAttrs {
    /// Parse attributes from a list of `#[ktbind(...)]` attributes.
    pub fn from_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut result = Self::default();

        for attr in attrs {
            if !attr.path().is_ident("ktbind") {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("class") {
                    let value: LitStr = meta.value()?.parse()?;
                    result.class = Some(value);
                } else if meta.path.is_ident("clone") {
                    result.clone = true;
                } else {
                    return Err(meta.error(format!(
                        "unknown ktbind attribute: {}",
                        meta.path.get_ident().map(|i| i.to_string()).unwrap_or_default()
                    )));
                }
                Ok(())
            })?;
        }

        Ok(result)
    }
}

/// Checks that `name` is a dotted class name made of identifiers.
pub fn validate_class_name(name: &LitStr) -> syn::Result<String> {
    let value = name.value();
    let valid = !value.is_empty()
        && value.split('.').all(|segment| {
            let mut chars = segment.chars();
            chars
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        });

    if valid {
        Ok(value)
    } else {
        Err(syn::Error::new(
            name.span(),
            format!("`{}` is not a qualified class name like `com.example.Sample`", value),
        ))
    }
}

/// Converts `com.example.Name` to `com/example/Name`.
pub fn class_name_of(qualified_name: &str) -> String {
    qualified_name.replace('.', "/")
}

/// `Lpkg/Class;` for a slash-separated class name.
pub fn class_sig(class_name: &str) -> String {
    format!("L{};", class_name)
}
