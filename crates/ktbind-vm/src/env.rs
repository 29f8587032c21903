//! Per-thread environments.
//!
//! [`ThreadEnv`] implements the native interface on top of the shared state.
//! The state lock is never held while a method body runs, so natives, builtins
//! and lambdas may call back into the environment freely.

use std::fmt;
use std::sync::Arc;

use ktbind_core::{
    FieldId, JArray, JClass, JNI_VERSION_1_6, JObject, JString, JThrowable, JValue, JniStatus,
    MethodId, NativeFn, NativeInterface, NativeMethod, PrimitiveKind, Region, RegionMut,
};
use parking_lot::MutexGuard;

use crate::class::{
    ClassFlags, ClassId, MethodBody, MethodDef, MethodFlags, decode_field_id, field_id,
    member_key, parameter_count,
};
use crate::error::{Throw, Thrown};
use crate::heap::{ArrayError, Body, LambdaFn, PrimArray};
use crate::refs::RefKind;
use crate::value::{ObjId, Val};
use crate::vm::{Shared, State};

/// The environment of one attached thread.
pub struct ThreadEnv {
    shared: Arc<Shared>,
    token: u64,
}

impl fmt::Debug for ThreadEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadEnv").field("token", &self.token).finish()
    }
}

/// A resolved call target.
struct Call {
    method: MethodDef,
    class: ClassId,
    this: Option<ObjId>,
    args: Vec<Val>,
}

impl ThreadEnv {
    pub(crate) fn new(shared: Arc<Shared>, token: u64) -> Self {
        Self { shared, token }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        self.shared.lock()
    }

    fn set_pending(&self, throw: Throw) {
        let mut state = self.state();
        let throwable = state.materialize(throw);
        state.thread(self.token).pending = Some(throwable);
    }

    /// Runs `f` under the lock; a thrown exception becomes pending and
    /// `fallback` is returned.
    fn with_state<T>(&self, fallback: T, f: impl FnOnce(&mut State, u64) -> Result<T, Throw>) -> T {
        let outcome = f(&mut self.state(), self.token);
        match outcome {
            Ok(value) => value,
            Err(throw) => {
                self.set_pending(throw);
                fallback
            }
        }
    }

    fn resolve_class(state: &mut State, token: u64, class: JClass) -> Result<ClassId, Throw> {
        let obj = state.resolve_non_null(token, class, "class")?;
        match state.heap.get(obj).body {
            Body::Class(id) => Ok(id),
            _ => Err(Throw::new(
                "java/lang/IllegalArgumentException",
                format!("{:?} is not a class", obj),
            )),
        }
    }

    /// Runs a resolved method body.
    pub(crate) fn run(
        &self,
        method: &MethodDef,
        class: ClassId,
        this: Option<ObjId>,
        args: &[Val],
    ) -> Result<Val, Throw> {
        let params = parameter_count(&method.signature);
        if params != Some(args.len()) {
            return Err(Throw::new(
                "java/lang/IllegalArgumentException",
                format!(
                    "{}{} called with {} argument(s)",
                    method.name,
                    method.signature,
                    args.len()
                ),
            ));
        }

        match &method.body {
            MethodBody::Builtin(body) => body(self, this, args),
            MethodBody::Native(Some(entry)) => self.run_native(entry, class, this, args),
            MethodBody::Native(None) => Err(Throw::new(
                "java/lang/UnsatisfiedLinkError",
                format!("{}.{}{}", self.state().classes.get(class).name, method.name, method.signature),
            )),
            MethodBody::Abstract => Err(Throw::new(
                "java/lang/AbstractMethodError",
                format!("{}{}", method.name, method.signature),
            )),
        }
    }

    fn run_native(
        &self,
        entry: &NativeFn,
        class: ClassId,
        this: Option<ObjId>,
        args: &[Val],
    ) -> Result<Val, Throw> {
        let token = self.token;
        let (receiver, values) = {
            let mut state = self.state();
            state.stats.native_calls += 1;
            state.push_frame(token);
            let receiver = this.unwrap_or_else(|| state.classes.get(class).object);
            let receiver = state.new_local(token, receiver);
            let values: Vec<JValue> = args.iter().map(|v| state.export(token, *v)).collect();
            (receiver, values)
        };

        let result = entry.call(self, receiver, &values);

        let mut state = self.state();
        let outcome = match state.thread(token).pending.take() {
            Some(throwable) => Err(Throw::Object(throwable)),
            None => state.import(token, result),
        };
        state.pop_frame(token);
        outcome
    }

    fn invoke(&self, call: Call) -> Result<Val, Throw> {
        self.run(&call.method, call.class, call.this, &call.args)
    }

    /// Invokes a method from managed code and reports its outcome as a value.
    fn call_returning(&self, call: Result<Call, Throw>) -> JValue {
        let call = match call {
            Ok(call) => call,
            Err(throw) => {
                self.set_pending(throw);
                return JValue::Void;
            }
        };
        let zero = Val::zero_for(call.method.return_sig());
        let outcome = self.invoke(call);
        let mut state = self.state();
        match outcome {
            Ok(value) => state.export(self.token, value),
            Err(throw) => {
                let throwable = state.materialize(throw);
                state.thread(self.token).pending = Some(throwable);
                state.export(self.token, zero)
            }
        }
    }

    fn import_args(state: &mut State, token: u64, args: &[JValue]) -> Result<Vec<Val>, Throw> {
        args.iter().map(|v| state.import(token, *v)).collect()
    }

    fn prepare_virtual(
        state: &mut State,
        token: u64,
        obj: JObject,
        method: MethodId,
        args: &[JValue],
    ) -> Result<Call, Throw> {
        let this = state.resolve_non_null(token, obj, "receiver")?;
        let class = state.class_of(this);
        let Some(method) = state.classes.dispatch(class, method.as_raw()).cloned() else {
            return Err(Throw::new(
                "java/lang/AbstractMethodError",
                format!("no implementation in {}", state.classes.get(class).name),
            ));
        };
        Ok(Call {
            method,
            class,
            this: Some(this),
            args: Self::import_args(state, token, args)?,
        })
    }

    fn prepare_static(
        state: &mut State,
        token: u64,
        class: JClass,
        method: MethodId,
        args: &[JValue],
    ) -> Result<Call, Throw> {
        let id = Self::resolve_class(state, token, class)?;
        let Some(method) = state.classes.find_method(id, method.as_raw(), true).cloned() else {
            return Err(Throw::new(
                "java/lang/NoSuchMethodError",
                format!("static method of {}", state.classes.get(id).name),
            ));
        };
        Ok(Call {
            method,
            class: id,
            this: None,
            args: Self::import_args(state, token, args)?,
        })
    }

    fn thrown(&self, throw: Throw) -> Thrown {
        let mut state = self.state();
        let object = state.materialize(throw);
        Thrown {
            class: state.class_name(object).to_owned(),
            message: state.message_of(object),
            object,
        }
    }

    fn named_class(&self, class: &str) -> Result<ClassId, Thrown> {
        let found = self.state().classes.lookup(class);
        found.ok_or_else(|| self.thrown(Throw::new("java/lang/NoClassDefFoundError", class)))
    }

    fn no_such_method(class: &str, name: &str, signature: &str) -> Throw {
        Throw::new(
            "java/lang/NoSuchMethodError",
            format!("{}.{}{}", class, name, signature),
        )
    }

    // Calls from the embedding side

    /// Calls a static method.
    pub fn invoke_static(
        &self,
        class: &str,
        name: &str,
        signature: &str,
        args: &[Val],
    ) -> Result<Val, Thrown> {
        let id = self.named_class(class)?;
        let method = self
            .state()
            .classes
            .find_method(id, member_key(name, signature), true)
            .cloned();
        let method = method.ok_or_else(|| self.thrown(Self::no_such_method(class, name, signature)))?;
        self.run(&method, id, None, args).map_err(|t| self.thrown(t))
    }

    /// Calls an instance method with virtual dispatch.
    pub fn invoke_virtual(
        &self,
        obj: ObjId,
        name: &str,
        signature: &str,
        args: &[Val],
    ) -> Result<Val, Thrown> {
        let key = member_key(name, signature);
        let (class, method) = {
            let state = self.state();
            let class = state.class_of(obj);
            let method = state.classes.dispatch(class, key).cloned();
            (class, method)
        };
        let method = method.ok_or_else(|| {
            let class_name = self.state().classes.get(class).name.clone();
            self.thrown(Self::no_such_method(&class_name, name, signature))
        })?;
        self.run(&method, class, Some(obj), args).map_err(|t| self.thrown(t))
    }

    /// Creates an instance through the constructor with `signature`.
    pub fn new_instance(&self, class: &str, signature: &str, args: &[Val]) -> Result<ObjId, Thrown> {
        let id = self.named_class(class)?;
        self.construct(id, member_key("<init>", signature), args)
            .map_err(|t| self.thrown(t))
    }

    fn construct(&self, class: ClassId, ctor: u64, args: &[Val]) -> Result<ObjId, Throw> {
        let (obj, method) = {
            let mut state = self.state();
            let def = state.classes.get(class);
            if def.flags.contains(ClassFlags::ABSTRACT) {
                return Err(Throw::new("java/lang/InstantiationException", def.name.clone()));
            }
            let method = state
                .classes
                .find_method(class, ctor, false)
                .filter(|m| m.name == "<init>")
                .cloned()
                .ok_or_else(|| {
                    Throw::new(
                        "java/lang/NoSuchMethodError",
                        format!("{}.<init>", state.classes.get(class).name),
                    )
                })?;
            (state.instantiate(class), method)
        };
        self.run(&method, class, Some(obj), args)?;
        Ok(obj)
    }

    // Object inspection and creation

    pub fn new_string(&self, value: &str) -> ObjId {
        self.state().new_string(value)
    }

    pub fn string(&self, obj: ObjId) -> Option<String> {
        self.state().string(obj).map(str::to_owned)
    }

    /// Boxes a primitive into its wrapper class.
    pub fn boxed(&self, value: Val) -> Option<ObjId> {
        let class = match value {
            Val::Boolean(_) => "java/lang/Boolean",
            Val::Byte(_) => "java/lang/Byte",
            Val::Char(_) => "java/lang/Character",
            Val::Short(_) => "java/lang/Short",
            Val::Int(_) => "java/lang/Integer",
            Val::Long(_) => "java/lang/Long",
            Val::Float(_) => "java/lang/Float",
            Val::Double(_) => "java/lang/Double",
            Val::Void | Val::Null | Val::Obj(_) => return None,
        };
        self.state().instance_of(class, Body::Boxed(value)).ok()
    }

    pub fn unbox(&self, obj: ObjId) -> Option<Val> {
        match self.state().heap.get(obj).body {
            Body::Boxed(value) => Some(value),
            _ => None,
        }
    }

    /// A new `java.util.ArrayList`.
    pub fn new_list(&self, items: &[Option<ObjId>]) -> Result<ObjId, Thrown> {
        let list = self.new_instance("java/util/ArrayList", "()V", &[])?;
        self.state().heap.get_mut(list).body = Body::List(items.to_vec());
        Ok(list)
    }

    /// A new `java.util.HashSet` (`sorted == false`) or `java.util.TreeSet`.
    pub fn new_set(&self, items: &[Option<ObjId>], sorted: bool) -> Result<ObjId, Thrown> {
        let class = if sorted { "java/util/TreeSet" } else { "java/util/HashSet" };
        let set = self.new_instance(class, "()V", &[])?;
        let mut state = self.state();
        for item in items {
            if let Err(throw) = state.heap.set_add(set, *item) {
                drop(state);
                return Err(self.thrown(throw));
            }
        }
        Ok(set)
    }

    /// A new `java.util.HashMap` (`sorted == false`) or `java.util.TreeMap`.
    pub fn new_map(
        &self,
        entries: &[(Option<ObjId>, Option<ObjId>)],
        sorted: bool,
    ) -> Result<ObjId, Thrown> {
        let class = if sorted { "java/util/TreeMap" } else { "java/util/HashMap" };
        let map = self.new_instance(class, "()V", &[])?;
        let mut state = self.state();
        for (key, value) in entries {
            if let Err(throw) = state.heap.map_put(map, *key, *value) {
                drop(state);
                return Err(self.thrown(throw));
            }
        }
        Ok(map)
    }

    /// Elements of a list or set in iteration order.
    pub fn elements(&self, obj: ObjId) -> Vec<Option<ObjId>> {
        self.state().heap.elements(obj).unwrap_or_default()
    }

    /// Entries of a map in iteration order.
    pub fn entries(&self, obj: ObjId) -> Vec<(Option<ObjId>, Option<ObjId>)> {
        self.state().heap.entries(obj).unwrap_or_default()
    }

    pub fn new_array(&self, array: PrimArray) -> ObjId {
        let mut state = self.state();
        let class = crate::builtins::array_class(array.kind());
        state.heap.alloc(class, Body::Array(array))
    }

    pub fn array(&self, obj: ObjId) -> Option<PrimArray> {
        match &self.state().heap.get(obj).body {
            Body::Array(array) => Some(array.clone()),
            _ => None,
        }
    }

    /// Creates a `kotlin.jvm.functions.FunctionN` object running `body`.
    pub fn new_lambda<F>(&self, arity: usize, body: F) -> Result<ObjId, Thrown>
    where
        F: Fn(&ThreadEnv, &[Val]) -> Result<Val, Throw> + Send + Sync + 'static,
    {
        let body: Arc<LambdaFn> = Arc::new(body);
        let class = format!("ktbind/vm/Lambda{}", arity);
        let created = self.state().instance_of(&class, Body::Lambda { arity, body });
        created.map_err(|t| self.thrown(t))
    }

    /// A throwable of `class` with `message`.
    pub fn new_throwable(&self, class: &str, message: &str) -> ObjId {
        self.state().materialize(Throw::new(class, message))
    }

    pub fn message(&self, throwable: ObjId) -> Option<String> {
        self.state().message_of(throwable)
    }

    pub fn class_name_of(&self, obj: ObjId) -> String {
        self.state().class_name(obj).to_owned()
    }

    /// Reads the instance field called `name`, whatever its type.
    pub fn field(&self, obj: ObjId, name: &str) -> Option<Val> {
        let state = self.state();
        let slot = Self::slot_named(&state, obj, name)?;
        match &state.heap.get(obj).body {
            Body::Plain(fields) => fields.get(slot).copied(),
            _ => None,
        }
    }

    /// Writes the instance field called `name`. Returns whether it exists.
    pub fn set_field_value(&self, obj: ObjId, name: &str, value: Val) -> bool {
        let mut state = self.state();
        let Some(slot) = Self::slot_named(&state, obj, name) else {
            return false;
        };
        match &mut state.heap.get_mut(obj).body {
            Body::Plain(fields) if slot < fields.len() => {
                fields[slot] = value;
                true
            }
            _ => false,
        }
    }

    fn slot_named(state: &State, obj: ObjId, name: &str) -> Option<usize> {
        state
            .classes
            .get(state.class_of(obj))
            .layout
            .iter()
            .rposition(|(n, _)| n == name)
    }

    /// A new local reference to `obj` for handing to native code.
    pub fn local(&self, obj: ObjId) -> JObject {
        self.state().new_local(self.token, obj)
    }

    /// The object behind a handle issued to this thread.
    pub fn object(&self, handle: JObject) -> Option<ObjId> {
        self.state().refs.resolve(handle, self.token).ok().flatten()
    }

    /// Takes the pending exception, if any.
    pub fn take_pending(&self) -> Option<Thrown> {
        let pending = self.state().thread(self.token).pending.take();
        pending.map(|throwable| self.thrown(Throw::Object(throwable)))
    }

    /// Appends to the text printed on `System.out`.
    pub(crate) fn print(&self, text: &str) {
        self.state().stdout.push_str(text);
    }
}

fn array_error(err: ArrayError) -> Throw {
    match err {
        ArrayError::OutOfBounds => Throw::new(
            "java/lang/ArrayIndexOutOfBoundsException",
            "array region out of bounds",
        ),
        ArrayError::KindMismatch => Throw::new(
            "java/lang/IllegalArgumentException",
            "array element kind mismatch",
        ),
    }
}

impl NativeInterface for ThreadEnv {
    fn version(&self) -> i32 {
        JNI_VERSION_1_6
    }

    fn find_class(&self, name: &str) -> JClass {
        self.with_state(JObject::NULL, |state, token| {
            let id = state
                .classes
                .lookup(name)
                .ok_or_else(|| Throw::new("java/lang/NoClassDefFoundError", name))?;
            let object = state.classes.get(id).object;
            Ok(state.new_local(token, object))
        })
    }

    fn get_object_class(&self, obj: JObject) -> JClass {
        self.with_state(JObject::NULL, |state, token| {
            let obj = state.resolve_non_null(token, obj, "object")?;
            let object = state.classes.get(state.class_of(obj)).object;
            Ok(state.new_local(token, object))
        })
    }

    fn get_method_id(&self, class: JClass, name: &str, sig: &str) -> Option<MethodId> {
        self.with_state(None, |state, token| {
            let id = Self::resolve_class(state, token, class)?;
            let key = member_key(name, sig);
            match state.classes.find_method(id, key, false) {
                Some(_) => Ok(Some(MethodId::from_raw(key))),
                None => Err(Self::no_such_method(&state.classes.get(id).name, name, sig)),
            }
        })
    }

    fn get_static_method_id(&self, class: JClass, name: &str, sig: &str) -> Option<MethodId> {
        self.with_state(None, |state, token| {
            let id = Self::resolve_class(state, token, class)?;
            let key = member_key(name, sig);
            match state.classes.find_method(id, key, true) {
                Some(_) => Ok(Some(MethodId::from_raw(key))),
                None => Err(Self::no_such_method(&state.classes.get(id).name, name, sig)),
            }
        })
    }

    fn get_field_id(&self, class: JClass, name: &str, sig: &str) -> Option<FieldId> {
        self.with_state(None, |state, token| {
            let id = Self::resolve_class(state, token, class)?;
            match state.classes.find_field(id, name, sig) {
                Some(slot) => Ok(Some(FieldId::from_raw(field_id(id, slot, false)))),
                None => Err(Throw::new(
                    "java/lang/NoSuchFieldError",
                    format!("{}.{}:{}", state.classes.get(id).name, name, sig),
                )),
            }
        })
    }

    fn get_static_field_id(&self, class: JClass, name: &str, sig: &str) -> Option<FieldId> {
        self.with_state(None, |state, token| {
            let id = Self::resolve_class(state, token, class)?;
            match state.classes.find_static_field(id, name, sig) {
                Some((owner, index)) => Ok(Some(FieldId::from_raw(field_id(owner, index, true)))),
                None => Err(Throw::new(
                    "java/lang/NoSuchFieldError",
                    format!("{}.{}:{}", state.classes.get(id).name, name, sig),
                )),
            }
        })
    }

    fn alloc_object(&self, class: JClass) -> JObject {
        self.with_state(JObject::NULL, |state, token| {
            let id = Self::resolve_class(state, token, class)?;
            let def = state.classes.get(id);
            if def.flags.contains(ClassFlags::ABSTRACT) {
                return Err(Throw::new("java/lang/InstantiationException", def.name.clone()));
            }
            let obj = state.instantiate(id);
            Ok(state.new_local(token, obj))
        })
    }

    fn new_object(&self, class: JClass, ctor: MethodId, args: &[JValue]) -> JObject {
        let prepared = {
            let mut state = self.state();
            Self::resolve_class(&mut state, self.token, class).and_then(|id| {
                Self::import_args(&mut state, self.token, args).map(|args| (id, args))
            })
        };
        let created = prepared.and_then(|(id, args)| self.construct(id, ctor.as_raw(), &args));
        match created {
            Ok(obj) => self.local(obj),
            Err(throw) => {
                self.set_pending(throw);
                JObject::NULL
            }
        }
    }

    fn call_method(&self, obj: JObject, method: MethodId, args: &[JValue]) -> JValue {
        let call = Self::prepare_virtual(&mut self.state(), self.token, obj, method, args);
        self.call_returning(call)
    }

    fn call_static_method(&self, class: JClass, method: MethodId, args: &[JValue]) -> JValue {
        let call = Self::prepare_static(&mut self.state(), self.token, class, method, args);
        self.call_returning(call)
    }

    fn get_field(&self, obj: JObject, field: FieldId) -> JValue {
        self.with_state(JValue::Void, |state, token| {
            let obj = state.resolve_non_null(token, obj, "field owner")?;
            let (_, slot, _) = decode_field_id(field.as_raw())
                .ok_or_else(|| Throw::illegal_state("invalid field id"))?;
            let value = match &state.heap.get(obj).body {
                Body::Plain(fields) => fields.get(slot).copied(),
                _ => None,
            };
            let value = value.ok_or_else(|| Throw::illegal_state("field not present on object"))?;
            Ok(state.export(token, value))
        })
    }

    fn set_field(&self, obj: JObject, field: FieldId, value: JValue) {
        self.with_state((), |state, token| {
            let obj = state.resolve_non_null(token, obj, "field owner")?;
            let (class, slot, _) = decode_field_id(field.as_raw())
                .ok_or_else(|| Throw::illegal_state("invalid field id"))?;
            let value = state.import(token, value)?;
            let signature = state
                .classes
                .get(class)
                .layout
                .get(slot)
                .map(|(_, sig)| sig.clone())
                .unwrap_or_default();
            if value.is_reference() != Val::zero_for(&signature).is_reference() {
                return Err(Throw::new(
                    "java/lang/IllegalArgumentException",
                    format!("cannot store {:?} in a field of type {}", value, signature),
                ));
            }
            match &mut state.heap.get_mut(obj).body {
                Body::Plain(fields) if slot < fields.len() => {
                    fields[slot] = value;
                    Ok(())
                }
                _ => Err(Throw::illegal_state("field not present on object")),
            }
        })
    }

    fn get_static_field(&self, class: JClass, field: FieldId) -> JValue {
        self.with_state(JValue::Void, |state, token| {
            Self::resolve_class(state, token, class)?;
            let (owner, index, _) = decode_field_id(field.as_raw())
                .filter(|(_, _, is_static)| *is_static)
                .ok_or_else(|| Throw::illegal_state("invalid static field id"))?;
            let value = state
                .classes
                .get(owner)
                .static_values
                .get(index)
                .copied()
                .ok_or_else(|| Throw::illegal_state("invalid static field id"))?;
            Ok(state.export(token, value))
        })
    }

    fn is_same_object(&self, a: JObject, b: JObject) -> bool {
        self.with_state(false, |state, token| {
            Ok(state.resolve(token, a)? == state.resolve(token, b)?)
        })
    }

    fn new_string_utf(&self, value: &str) -> JString {
        let mut state = self.state();
        let string = state.new_string(value);
        state.new_local(self.token, string)
    }

    fn get_string_utf_chars(&self, string: JString) -> Option<String> {
        self.with_state(None, |state, token| {
            let obj = state.resolve_non_null(token, string, "string")?;
            match state.string(obj) {
                Some(s) => Ok(Some(s.to_owned())),
                None => Err(Throw::new(
                    "java/lang/ClassCastException",
                    format!("{} is not a string", state.class_name(obj)),
                )),
            }
        })
    }

    fn get_array_length(&self, array: JArray) -> i32 {
        self.with_state(0, |state, token| {
            let obj = state.resolve_non_null(token, array, "array")?;
            match &state.heap.get(obj).body {
                Body::Array(array) => Ok(array.len() as i32),
                _ => Err(Throw::illegal_state("not an array")),
            }
        })
    }

    fn new_primitive_array(&self, kind: PrimitiveKind, len: i32) -> JArray {
        self.with_state(JObject::NULL, |state, token| {
            let len = usize::try_from(len).map_err(|_| {
                Throw::new("java/lang/NegativeArraySizeException", len.to_string())
            })?;
            let array = state.heap.alloc(
                crate::builtins::array_class(kind),
                Body::Array(PrimArray::new(kind, len)),
            );
            Ok(state.new_local(token, array))
        })
    }

    fn get_array_region(&self, array: JArray, start: i32, buf: RegionMut<'_>) {
        self.with_state((), |state, token| {
            let obj = state.resolve_non_null(token, array, "array")?;
            match &state.heap.get(obj).body {
                Body::Array(array) => array.read_region(start, buf).map_err(array_error),
                _ => Err(Throw::illegal_state("not an array")),
            }
        })
    }

    fn set_array_region(&self, array: JArray, start: i32, buf: Region<'_>) {
        self.with_state((), |state, token| {
            let obj = state.resolve_non_null(token, array, "array")?;
            match &mut state.heap.get_mut(obj).body {
                Body::Array(array) => array.write_region(start, buf).map_err(array_error),
                _ => Err(Throw::illegal_state("not an array")),
            }
        })
    }

    fn exception_check(&self) -> bool {
        self.state().thread(self.token).pending.is_some()
    }

    fn exception_occurred(&self) -> JThrowable {
        let mut state = self.state();
        match state.thread(self.token).pending {
            Some(throwable) => state.new_local(self.token, throwable),
            None => JObject::NULL,
        }
    }

    fn exception_clear(&self) {
        self.state().thread(self.token).pending = None;
    }

    fn throw(&self, throwable: JThrowable) -> JniStatus {
        let mut state = self.state();
        let Ok(Some(obj)) = state.resolve(self.token, throwable) else {
            return JniStatus::Err;
        };
        let is_throwable = state
            .classes
            .lookup("java/lang/Throwable")
            .is_some_and(|root| state.classes.is_subclass(state.class_of(obj), root));
        if !is_throwable {
            log::warn!("cannot throw an instance of {}", state.class_name(obj));
            return JniStatus::Err;
        }
        state.thread(self.token).pending = Some(obj);
        JniStatus::Ok
    }

    fn throw_new(&self, class: JClass, message: &str) -> JniStatus {
        let mut state = self.state();
        let Ok(id) = Self::resolve_class(&mut state, self.token, class) else {
            return JniStatus::Err;
        };
        let throwable = state.instantiate(id);
        match &mut state.heap.get_mut(throwable).body {
            Body::Throwable { message: slot } => *slot = Some(message.to_owned()),
            _ => {
                log::warn!("{} is not a throwable", state.classes.get(id).name);
                return JniStatus::Err;
            }
        }
        state.thread(self.token).pending = Some(throwable);
        JniStatus::Ok
    }

    fn new_local_ref(&self, obj: JObject) -> JObject {
        self.with_state(JObject::NULL, |state, token| {
            Ok(match state.resolve(token, obj)? {
                Some(target) => state.new_local(token, target),
                None => JObject::NULL,
            })
        })
    }

    fn delete_local_ref(&self, obj: JObject) {
        if obj.is_null() {
            return;
        }
        let mut state = self.state();
        if let Err(err) = state.refs.remove(obj, RefKind::Local(self.token)) {
            state.stats.invalid_refs += 1;
            log::error!("cannot delete local reference {:?}: {}", obj, err);
        }
    }

    fn new_global_ref(&self, obj: JObject) -> JObject {
        self.with_state(JObject::NULL, |state, token| {
            Ok(match state.resolve(token, obj)? {
                Some(target) => state.refs.insert(target, RefKind::Global),
                None => JObject::NULL,
            })
        })
    }

    fn delete_global_ref(&self, obj: JObject) {
        if obj.is_null() {
            return;
        }
        let mut state = self.state();
        if let Err(err) = state.refs.remove(obj, RefKind::Global) {
            state.stats.invalid_refs += 1;
            log::error!("cannot delete global reference {:?}: {}", obj, err);
        }
    }

    fn register_natives(&self, class: JClass, methods: &[NativeMethod]) -> JniStatus {
        let mut state = self.state();
        let id = match Self::resolve_class(&mut state, self.token, class) {
            Ok(id) => id,
            Err(throw) => {
                drop(state);
                self.set_pending(throw);
                return JniStatus::Err;
            }
        };

        let class_name = state.classes.get(id).name.clone();
        for method in methods {
            let key = member_key(&method.name, &method.signature);
            let declared = state
                .classes
                .get(id)
                .methods
                .get(&key)
                .is_some_and(|m| m.flags.contains(MethodFlags::NATIVE));
            if !declared {
                let throwable = state.materialize(Self::no_such_method(
                    &class_name,
                    &method.name,
                    &method.signature,
                ));
                state.thread(self.token).pending = Some(throwable);
                return JniStatus::Err;
            }
        }

        let target = state.classes.get_mut(id);
        for method in methods {
            let key = member_key(&method.name, &method.signature);
            if let Some(def) = target.methods.get_mut(&key) {
                def.body = MethodBody::Native(Some(method.entry.clone()));
            }
        }
        log::debug!("bound {} native method(s) of {}", methods.len(), class_name);
        JniStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassDef;
    use crate::vm::Jvm;
    use ktbind_core::JniEnv;

    fn pending_class(env: &ThreadEnv) -> Option<String> {
        env.take_pending().map(|thrown| thrown.class)
    }

    #[test]
    fn missing_lookups_leave_exceptions_pending() {
        let vm = Jvm::new();
        let env = vm.attach();

        assert!(env.find_class("com/example/Missing").is_null());
        assert_eq!(pending_class(&env).as_deref(), Some("java/lang/NoClassDefFoundError"));

        let list = env.find_class("java/util/List");
        assert!(env.get_method_id(list, "clear", "()V").is_none());
        assert_eq!(pending_class(&env).as_deref(), Some("java/lang/NoSuchMethodError"));
        assert!(env.get_method_id(list, "size", "()I").is_some());
        assert!(!env.exception_check());
    }

    #[test]
    fn interface_methods_dispatch_to_implementations() {
        let vm = Jvm::new();
        let env = vm.attach();
        let one = env.boxed(Val::Int(1));
        let two = env.boxed(Val::Int(2));
        let list = env.new_list(&[one, two]).unwrap();

        let class = env.find_class("java/util/List");
        let size = env.get_method_id(class, "size", "()I").unwrap();
        let get = env.get_method_id(class, "get", "(I)Ljava/lang/Object;").unwrap();
        let handle = env.local(list);

        assert_eq!(env.call_method(handle, size, &[]), JValue::Int(2));
        let second = env.call_method(handle, get, &[JValue::Int(1)]).l().unwrap();
        assert_eq!(env.object(second), two);

        let missing = env.call_method(handle, get, &[JValue::Int(5)]);
        assert_eq!(missing, JValue::Object(JObject::NULL));
        let thrown = env.take_pending().unwrap();
        assert_eq!(thrown.class, "java/lang/IndexOutOfBoundsException");
        assert_eq!(thrown.message.as_deref(), Some("Index 5 out of bounds for length 2"));
    }

    #[test]
    fn region_copies_check_bounds() {
        let vm = Jvm::new();
        let env = vm.attach();
        let array = env.new_primitive_array(PrimitiveKind::Int, 3);
        env.set_array_region(array, 1, Region::Int(&[7, 8]));
        assert!(!env.exception_check());

        let mut out = [0; 3];
        env.get_array_region(array, 0, RegionMut::Int(&mut out));
        assert_eq!(out, [0, 7, 8]);

        env.set_array_region(array, 2, Region::Int(&[1, 2]));
        assert_eq!(
            pending_class(&env).as_deref(),
            Some("java/lang/ArrayIndexOutOfBoundsException")
        );
        assert_eq!(env.get_array_length(array), 3);
    }

    #[test]
    fn natives_run_with_their_own_local_frame() {
        let vm = Jvm::new();
        vm.define_class(ClassDef::new("test/Native").native_static("twice", "(Ljava/lang/String;)Ljava/lang/String;"))
            .unwrap();
        let env = vm.attach();

        let entry = NativeFn::new(|env: &JniEnv, _: JObject, args: &[JValue]| {
            let text = args[0].l().ok().and_then(|s| env.get_string_utf_chars(s)).unwrap_or_default();
            JValue::Object(env.new_string_utf(&text.repeat(2)))
        });
        let class = env.find_class("test/Native");
        let status = env.register_natives(
            class,
            &[NativeMethod {
                name: "twice".into(),
                signature: "(Ljava/lang/String;)Ljava/lang/String;".into(),
                entry,
            }],
        );
        assert_eq!(status, JniStatus::Ok);

        let locals_before = vm.stats().live_locals;
        let arg = env.new_string("ab");
        let result = env
            .invoke_static("test/Native", "twice", "(Ljava/lang/String;)Ljava/lang/String;", &[Val::Obj(arg)])
            .unwrap();
        assert_eq!(env.string(result.obj().unwrap()).as_deref(), Some("abab"));
        assert_eq!(vm.stats().live_locals, locals_before);
        assert_eq!(vm.stats().native_calls, 1);
    }

    #[test]
    fn registering_undeclared_natives_fails() {
        let vm = Jvm::new();
        vm.define_class(ClassDef::new("test/Strict")).unwrap();
        let env = vm.attach();

        let class = env.find_class("test/Strict");
        let status = env.register_natives(
            class,
            &[NativeMethod {
                name: "extra".into(),
                signature: "()V".into(),
                entry: NativeFn::new(|_: &JniEnv, _: JObject, _: &[JValue]| JValue::Void),
            }],
        );
        assert_eq!(status, JniStatus::Err);
        let thrown = env.take_pending().unwrap();
        assert_eq!(thrown.class, "java/lang/NoSuchMethodError");
        assert_eq!(thrown.message.as_deref(), Some("test/Strict.extra()V"));
    }

    #[test]
    fn unbound_natives_raise_unsatisfied_link_errors() {
        let vm = Jvm::new();
        vm.define_class(ClassDef::new("test/Unbound").native_static("f", "()I"))
            .unwrap();
        let env = vm.attach();
        let err = env.invoke_static("test/Unbound", "f", "()I", &[]).unwrap_err();
        assert_eq!(err.class, "java/lang/UnsatisfiedLinkError");
    }

    #[test]
    fn deleted_handles_are_rejected() {
        let vm = Jvm::new();
        let env = vm.attach();
        let string = env.new_string_utf("gone");
        env.delete_local_ref(string);

        assert_eq!(env.get_string_utf_chars(string), None);
        assert_eq!(pending_class(&env).as_deref(), Some("java/lang/IllegalStateException"));
        assert_eq!(vm.stats().invalid_refs, 1);

        env.delete_local_ref(string);
        assert_eq!(vm.stats().invalid_refs, 2);
    }

    #[test]
    fn globals_outlive_frames_and_cross_threads() {
        let vm = Jvm::new();
        let env = vm.attach();
        let local = env.new_string_utf("shared");
        let global = env.new_global_ref(local);
        assert_eq!(vm.stats().live_globals, 1);

        let remote = std::sync::Arc::clone(&vm);
        let raw = global.as_raw();
        let text = std::thread::spawn(move || {
            let env = remote.attach();
            let text = env.get_string_utf_chars(JObject::from_raw(raw));
            let foreign = env.get_string_utf_chars(JObject::from_raw(local.as_raw()));
            assert!(foreign.is_none());
            env.exception_clear();
            remote.detach();
            text
        })
        .join()
        .unwrap();
        assert_eq!(text.as_deref(), Some("shared"));

        env.delete_global_ref(global);
        assert_eq!(vm.stats().live_globals, 0);
    }

    #[test]
    fn throw_new_sets_the_message() {
        let vm = Jvm::new();
        let env = vm.attach();
        let class = env.find_class("java/lang/IllegalArgumentException");
        assert_eq!(env.throw_new(class, "bad input"), JniStatus::Ok);

        let throwable = env.exception_occurred();
        env.exception_clear();
        let class = env.get_object_class(throwable);
        let get_message = env
            .get_method_id(class, "getMessage", "()Ljava/lang/String;")
            .unwrap();
        let message = env.call_method(throwable, get_message, &[]).l().unwrap();
        assert_eq!(env.get_string_utf_chars(message).as_deref(), Some("bad input"));

        let not_throwable = env.new_string_utf("text");
        assert_eq!(env.throw(not_throwable), JniStatus::Err);
        assert!(!env.exception_check());
    }

    #[test]
    fn abstract_classes_cannot_be_allocated() {
        let vm = Jvm::new();
        vm.define_class(ClassDef::new("test/Base").abstract_class().field("handle", "J"))
            .unwrap();
        let env = vm.attach();
        let class = env.find_class("test/Base");
        assert!(env.alloc_object(class).is_null());
        assert_eq!(pending_class(&env).as_deref(), Some("java/lang/InstantiationException"));
    }
}
