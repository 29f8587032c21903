//! Process-wide binding registries.
//!
//! Function bindings are grouped by the slash-separated name of their owning
//! class; field bindings by the wire signature of their data class. Both maps
//! are ordered so listings and registration run in a deterministic order.
//!
//! # Thread Safety
//!
//! The registries are populated during the single-threaded registration phase
//! run by [`on_load`](crate::on_load) and are read-only afterwards. The locks
//! only guard against accidental misuse; concurrent registration from several
//! threads is not supported.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::sys::{NativeFn, NativeMethod};

/// A native entry point bound to a method of a managed class.
#[derive(Debug, Clone)]
pub struct FunctionBinding {
    pub name: String,
    /// Method descriptor, e.g. `(I)Ljava/lang/String;`.
    pub signature: String,
    /// Instance method (`true`) or companion `@JvmStatic` function (`false`).
    pub is_member: bool,
    pub entry: NativeFn,
    /// Kotlin member signature, e.g. `(arg0: Int): String`.
    pub kotlin_signature: String,
}

impl FunctionBinding {
    pub fn native_method(&self) -> NativeMethod {
        NativeMethod {
            name: self.name.clone(),
            signature: self.signature.clone(),
            entry: self.entry.clone(),
        }
    }
}

/// Marshals one field of a data class.
///
/// The accessor is type-erased so bindings of different data classes can share
/// one registry; [`crate::data_class`] recovers the typed accessor.
#[derive(Clone)]
pub struct FieldBinding {
    pub name: String,
    pub signature: String,
    pub kotlin_type: String,
    pub(crate) accessor: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for FieldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBinding")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("kotlin_type", &self.kotlin_type)
            .finish_non_exhaustive()
    }
}

/// The registered fields of one data class.
#[derive(Debug, Clone)]
pub struct DataClassBinding {
    pub class_name: &'static str,
    pub qualified_name: &'static str,
    pub fields: Arc<Vec<FieldBinding>>,
}

lazy_static! {
    static ref FUNCTION_BINDINGS: RwLock<BTreeMap<String, Vec<FunctionBinding>>> =
        RwLock::new(BTreeMap::new());
    static ref FIELD_BINDINGS: RwLock<BTreeMap<String, DataClassBinding>> =
        RwLock::new(BTreeMap::new());
}

/// Adds a function binding to `class_name`.
///
/// A binding with the same name and signature replaces the earlier one. Equal
/// names with different signatures coexist, which is how overloads register.
pub fn register_function(class_name: &str, binding: FunctionBinding) {
    let mut registry = FUNCTION_BINDINGS.write();
    let bindings = registry.entry(class_name.to_owned()).or_default();
    match bindings
        .iter_mut()
        .find(|b| b.name == binding.name && b.signature == binding.signature)
    {
        Some(existing) => *existing = binding,
        None => bindings.push(binding),
    }
}

/// Adds a field binding to the data class with wire signature `type_sig`.
pub fn register_field(
    type_sig: &str,
    class_name: &'static str,
    qualified_name: &'static str,
    field: FieldBinding,
) {
    let mut registry = FIELD_BINDINGS.write();
    let entry = registry
        .entry(type_sig.to_owned())
        .or_insert_with(|| DataClassBinding {
            class_name,
            qualified_name,
            fields: Arc::new(Vec::new()),
        });
    let fields = Arc::make_mut(&mut entry.fields);
    match fields.iter_mut().find(|f| f.name == field.name) {
        Some(existing) => *existing = field,
        None => fields.push(field),
    }
}

/// Registered fields of the data class with wire signature `type_sig`.
pub fn data_class_fields(type_sig: &str) -> Option<Arc<Vec<FieldBinding>>> {
    FIELD_BINDINGS
        .read()
        .get(type_sig)
        .map(|binding| Arc::clone(&binding.fields))
}

/// Snapshot of all function bindings, ordered by class name.
pub fn function_bindings() -> BTreeMap<String, Vec<FunctionBinding>> {
    FUNCTION_BINDINGS.read().clone()
}

/// Snapshot of all data class bindings, ordered by wire signature.
pub fn data_class_bindings() -> BTreeMap<String, DataClassBinding> {
    FIELD_BINDINGS.read().clone()
}

/// Empties both registries.
pub fn clear() {
    FUNCTION_BINDINGS.write().clear();
    FIELD_BINDINGS.write().clear();
}
