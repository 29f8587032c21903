//! Standard library classes of the runtime.
//!
//! Only the surface the binding engine and its tests touch is provided:
//! `Object`, `String`, the primitive boxes, a throwable hierarchy, the
//! collection interfaces with array, hash and tree implementations,
//! `System.out` and the Kotlin function interfaces.

use std::sync::Arc;

use ktbind_core::PrimitiveKind;
use ktbind_core::signature::erased_invoke_sig;

use crate::class::{ClassDef, ClassId};
use crate::env::ThreadEnv;
use crate::error::Throw;
use crate::heap::Body;
use crate::value::{ObjId, Val};
use crate::vm::State;

pub(crate) const OBJECT: ClassId = ClassId(0);
pub(crate) const CLASS: ClassId = ClassId(1);
pub(crate) const STRING: ClassId = ClassId(2);
pub(crate) const ERROR: ClassId = ClassId(4);
const FIRST_ARRAY: u32 = 5;

const ARRAY_CLASSES: [&str; 8] = ["[Z", "[B", "[C", "[S", "[I", "[J", "[F", "[D"];

/// Highest arity of the Kotlin function interfaces.
pub const MAX_LAMBDA_ARITY: usize = 8;

/// Class of primitive arrays of `kind`.
pub(crate) fn array_class(kind: PrimitiveKind) -> ClassId {
    let offset = match kind {
        PrimitiveKind::Boolean => 0,
        PrimitiveKind::Byte => 1,
        PrimitiveKind::Char => 2,
        PrimitiveKind::Short => 3,
        PrimitiveKind::Int => 4,
        PrimitiveKind::Long => 5,
        PrimitiveKind::Float => 6,
        PrimitiveKind::Double => 7,
    };
    ClassId(FIRST_ARRAY + offset)
}

const BOXES: [(&str, &str, &str); 8] = [
    ("java/lang/Boolean", "Z", "booleanValue"),
    ("java/lang/Byte", "B", "byteValue"),
    ("java/lang/Character", "C", "charValue"),
    ("java/lang/Short", "S", "shortValue"),
    ("java/lang/Integer", "I", "intValue"),
    ("java/lang/Long", "J", "longValue"),
    ("java/lang/Float", "F", "floatValue"),
    ("java/lang/Double", "D", "doubleValue"),
];

const EXCEPTIONS: [(&str, &str); 19] = [
    ("java/lang/Exception", "java/lang/Throwable"),
    ("java/lang/RuntimeException", "java/lang/Exception"),
    ("java/lang/InstantiationException", "java/lang/Exception"),
    ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
    ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
    ("java/lang/NullPointerException", "java/lang/RuntimeException"),
    ("java/lang/ClassCastException", "java/lang/RuntimeException"),
    ("java/lang/NegativeArraySizeException", "java/lang/RuntimeException"),
    ("java/lang/UnsupportedOperationException", "java/lang/RuntimeException"),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
    ("java/lang/ArrayIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException"),
    ("java/util/NoSuchElementException", "java/lang/RuntimeException"),
    ("java/lang/LinkageError", "java/lang/Error"),
    ("java/lang/NoClassDefFoundError", "java/lang/LinkageError"),
    ("java/lang/UnsatisfiedLinkError", "java/lang/LinkageError"),
    ("java/lang/IncompatibleClassChangeError", "java/lang/LinkageError"),
    ("java/lang/NoSuchMethodError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/NoSuchFieldError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/AbstractMethodError", "java/lang/IncompatibleClassChangeError"),
];

fn define(state: &mut State, def: ClassDef) -> ClassId {
    let name = def.name.clone();
    match state.define_class(def) {
        Ok(id) => id,
        Err(err) => {
            log::error!("cannot define builtin class {}: {}", name, err);
            OBJECT
        }
    }
}

/// Defines the standard library into a fresh state.
pub(crate) fn install(state: &mut State) {
    let object = define(state, ClassDef::new("java/lang/Object"));
    let class = define(state, ClassDef::new("java/lang/Class"));
    let string = define(state, ClassDef::new("java/lang/String").body(|| Body::Str(String::new())));
    define(state, throwable());
    let error = define(state, ClassDef::new("java/lang/Error").extends("java/lang/Throwable"));
    debug_assert_eq!(
        [object, class, string, error],
        [OBJECT, CLASS, STRING, ERROR]
    );

    for (offset, name) in ARRAY_CLASSES.into_iter().enumerate() {
        let id = define(state, ClassDef::new(name));
        debug_assert_eq!(id, ClassId(FIRST_ARRAY + offset as u32));
    }

    for (name, superclass) in EXCEPTIONS {
        define(state, ClassDef::new(name).extends(superclass));
    }
    for (name, sig, unbox) in BOXES {
        define(state, boxed_class(name, sig, unbox));
    }

    install_collections(state);
    install_output(state);

    for arity in 0..=MAX_LAMBDA_ARITY {
        let interface = format!("kotlin/jvm/functions/Function{}", arity);
        define(
            state,
            ClassDef::new(interface.clone())
                .interface()
                .abstract_method("invoke", erased_invoke_sig(arity)),
        );
        define(
            state,
            ClassDef::new(format!("ktbind/vm/Lambda{}", arity))
                .implements(interface)
                .builtin("invoke", erased_invoke_sig(arity), invoke_lambda),
        );
    }
}

fn receiver(this: Option<ObjId>) -> Result<ObjId, Throw> {
    this.ok_or_else(|| Throw::npe("receiver"))
}

fn arg_ref(args: &[Val], index: usize) -> Option<ObjId> {
    args.get(index).and_then(|v| v.obj())
}

fn string_result(env: &ThreadEnv, text: Option<String>) -> Val {
    match text {
        Some(text) => Val::Obj(env.state().new_string(&text)),
        None => Val::Null,
    }
}

fn throwable() -> ClassDef {
    ClassDef::new("java/lang/Throwable")
        .body(|| Body::Throwable { message: None })
        .builtin("<init>", "(Ljava/lang/String;)V", |env, this, args| {
            let this = receiver(this)?;
            let mut state = env.state();
            let message = arg_ref(args, 0).and_then(|s| state.string(s).map(str::to_owned));
            if let Body::Throwable { message: slot } = &mut state.heap.get_mut(this).body {
                *slot = message;
            }
            Ok(Val::Void)
        })
        .builtin("getMessage", "()Ljava/lang/String;", |env, this, _| {
            let message = env.state().message_of(receiver(this)?);
            Ok(string_result(env, message))
        })
}

fn boxed_class(name: &'static str, sig: &str, unbox: &str) -> ClassDef {
    ClassDef::new(name)
        .body(|| Body::Boxed(Val::Void))
        .static_builtin("valueOf", format!("({})L{};", sig, name), move |env, _, args| {
            let value = args.first().copied().unwrap_or_default();
            let boxed = env.state().instance_of(name, Body::Boxed(value))?;
            Ok(Val::Obj(boxed))
        })
        .builtin(unbox, format!("(){}", sig), |env, this, _| {
            match env.state().heap.get(receiver(this)?).body {
                Body::Boxed(value) => Ok(value),
                _ => Err(Throw::illegal_state("not a boxed primitive")),
            }
        })
}

fn install_collections(state: &mut State) {
    define(
        state,
        ClassDef::new("java/lang/Iterable")
            .interface()
            .abstract_method("iterator", "()Ljava/util/Iterator;"),
    );
    define(
        state,
        ClassDef::new("java/util/Collection")
            .interface()
            .implements("java/lang/Iterable")
            .abstract_method("size", "()I")
            .abstract_method("add", "(Ljava/lang/Object;)Z"),
    );
    define(
        state,
        ClassDef::new("java/util/List")
            .interface()
            .implements("java/util/Collection")
            .abstract_method("get", "(I)Ljava/lang/Object;"),
    );
    define(
        state,
        ClassDef::new("java/util/Set")
            .interface()
            .implements("java/util/Collection"),
    );
    define(
        state,
        ClassDef::new("java/util/Iterator")
            .interface()
            .abstract_method("hasNext", "()Z")
            .abstract_method("next", "()Ljava/lang/Object;"),
    );
    define(
        state,
        ClassDef::new("java/util/Map")
            .interface()
            .abstract_method("size", "()I")
            .abstract_method("get", "(Ljava/lang/Object;)Ljava/lang/Object;")
            .abstract_method("put", "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;")
            .abstract_method("entrySet", "()Ljava/util/Set;"),
    );
    define(
        state,
        ClassDef::new("java/util/Map$Entry")
            .interface()
            .abstract_method("getKey", "()Ljava/lang/Object;")
            .abstract_method("getValue", "()Ljava/lang/Object;"),
    );

    define(
        state,
        ClassDef::new("ktbind/vm/Itr")
            .implements("java/util/Iterator")
            .body(|| Body::Iter {
                items: Vec::new(),
                pos: 0,
            })
            .builtin("hasNext", "()Z", iter_has_next)
            .builtin("next", "()Ljava/lang/Object;", iter_next),
    );

    define(
        state,
        collection("java/util/ArrayList", "java/util/List", || Body::List(Vec::new()))
            .builtin("<init>", "(I)V", |_, _, _| Ok(Val::Void))
            .builtin("get", "(I)Ljava/lang/Object;", list_get),
    );
    define(
        state,
        collection("java/util/HashSet", "java/util/Set", || Body::HashSet {
            items: Vec::new(),
            index: Default::default(),
        }),
    );
    define(
        state,
        collection("java/util/TreeSet", "java/util/Set", || {
            Body::TreeSet(Default::default())
        }),
    );
    define(
        state,
        collection("ktbind/vm/EntrySet", "java/util/Set", || Body::List(Vec::new())).builtin(
            "add",
            "(Ljava/lang/Object;)Z",
            |_, _, _| {
                Err(Throw::new(
                    "java/lang/UnsupportedOperationException",
                    "entry sets are read-only",
                ))
            },
        ),
    );

    define(
        state,
        ClassDef::new("java/util/AbstractMap$SimpleEntry")
            .implements("java/util/Map$Entry")
            .body(|| Body::Entry {
                key: None,
                value: None,
            })
            .builtin("getKey", "()Ljava/lang/Object;", |env, this, _| {
                entry_part(env, this, true)
            })
            .builtin("getValue", "()Ljava/lang/Object;", |env, this, _| {
                entry_part(env, this, false)
            }),
    );
    define(
        state,
        map("java/util/HashMap", || Body::HashMap {
            entries: Vec::new(),
            index: Default::default(),
        }),
    );
    define(state, map("java/util/TreeMap", || Body::TreeMap(Default::default())));
}

fn collection(name: &str, interface: &str, body: fn() -> Body) -> ClassDef {
    ClassDef::new(name)
        .implements(interface)
        .body(body)
        .builtin("size", "()I", size)
        .builtin("add", "(Ljava/lang/Object;)Z", add)
        .builtin("iterator", "()Ljava/util/Iterator;", iterator)
}

fn map(name: &str, body: fn() -> Body) -> ClassDef {
    ClassDef::new(name)
        .implements("java/util/Map")
        .body(body)
        .builtin("size", "()I", size)
        .builtin(
            "put",
            "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;",
            |env, this, args| {
                let this = receiver(this)?;
                let previous = env
                    .state()
                    .heap
                    .map_put(this, arg_ref(args, 0), arg_ref(args, 1))?;
                Ok(Val::from_ref(previous))
            },
        )
        .builtin(
            "get",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
            |env, this, args| {
                let this = receiver(this)?;
                let value = env.state().heap.map_get(this, arg_ref(args, 0))?;
                Ok(Val::from_ref(value))
            },
        )
        .builtin("entrySet", "()Ljava/util/Set;", entry_set)
}

fn size(env: &ThreadEnv, this: Option<ObjId>, _args: &[Val]) -> Result<Val, Throw> {
    let this = receiver(this)?;
    let state = env.state();
    let len = match &state.heap.get(this).body {
        Body::List(items) | Body::HashSet { items, .. } => items.len(),
        Body::TreeSet(items) => items.len(),
        Body::HashMap { entries, .. } => entries.len(),
        Body::TreeMap(entries) => entries.len(),
        _ => return Err(Throw::illegal_state("not a collection")),
    };
    Ok(Val::Int(len as i32))
}

fn add(env: &ThreadEnv, this: Option<ObjId>, args: &[Val]) -> Result<Val, Throw> {
    let this = receiver(this)?;
    let element = arg_ref(args, 0);
    let mut state = env.state();
    if let Body::List(items) = &mut state.heap.get_mut(this).body {
        items.push(element);
        return Ok(Val::Boolean(true));
    }
    state.heap.set_add(this, element).map(Val::Boolean)
}

fn list_get(env: &ThreadEnv, this: Option<ObjId>, args: &[Val]) -> Result<Val, Throw> {
    let this = receiver(this)?;
    let index = args.first().and_then(|v| v.as_int()).unwrap_or(-1);
    let state = env.state();
    let Body::List(items) = &state.heap.get(this).body else {
        return Err(Throw::illegal_state("not a list"));
    };
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .map(|item| Val::from_ref(*item))
        .ok_or_else(|| {
            Throw::new(
                "java/lang/IndexOutOfBoundsException",
                format!("Index {} out of bounds for length {}", index, items.len()),
            )
        })
}

fn iterator(env: &ThreadEnv, this: Option<ObjId>, _args: &[Val]) -> Result<Val, Throw> {
    let this = receiver(this)?;
    let mut state = env.state();
    let items = state.heap.elements(this)?;
    let iter = state.instance_of("ktbind/vm/Itr", Body::Iter { items, pos: 0 })?;
    Ok(Val::Obj(iter))
}

fn iter_has_next(env: &ThreadEnv, this: Option<ObjId>, _args: &[Val]) -> Result<Val, Throw> {
    let this = receiver(this)?;
    match &env.state().heap.get(this).body {
        Body::Iter { items, pos } => Ok(Val::Boolean(*pos < items.len())),
        _ => Err(Throw::illegal_state("not an iterator")),
    }
}

fn iter_next(env: &ThreadEnv, this: Option<ObjId>, _args: &[Val]) -> Result<Val, Throw> {
    let this = receiver(this)?;
    match &mut env.state().heap.get_mut(this).body {
        Body::Iter { items, pos } => {
            let item = items
                .get(*pos)
                .copied()
                .ok_or_else(|| Throw::new("java/util/NoSuchElementException", "iterator exhausted"))?;
            *pos += 1;
            Ok(Val::from_ref(item))
        }
        _ => Err(Throw::illegal_state("not an iterator")),
    }
}

fn entry_set(env: &ThreadEnv, this: Option<ObjId>, _args: &[Val]) -> Result<Val, Throw> {
    let this = receiver(this)?;
    let mut state = env.state();
    let mut entries = Vec::new();
    for (key, value) in state.heap.entries(this)? {
        let entry = state.instance_of("java/util/AbstractMap$SimpleEntry", Body::Entry { key, value })?;
        entries.push(Some(entry));
    }
    let set = state.instance_of("ktbind/vm/EntrySet", Body::List(entries))?;
    Ok(Val::Obj(set))
}

fn entry_part(env: &ThreadEnv, this: Option<ObjId>, want_key: bool) -> Result<Val, Throw> {
    let this = receiver(this)?;
    match env.state().heap.get(this).body {
        Body::Entry { key, value } => Ok(Val::from_ref(if want_key { key } else { value })),
        _ => Err(Throw::illegal_state("not a map entry")),
    }
}

fn invoke_lambda(env: &ThreadEnv, this: Option<ObjId>, args: &[Val]) -> Result<Val, Throw> {
    let this = receiver(this)?;
    let body = match &env.state().heap.get(this).body {
        Body::Lambda { body, .. } => Arc::clone(body),
        _ => return Err(Throw::illegal_state("not a lambda")),
    };
    body(env, args)
}

fn install_output(state: &mut State) {
    let print = |newline: bool| {
        move |env: &ThreadEnv, _: Option<ObjId>, args: &[Val]| -> Result<Val, Throw> {
            let mut text = match arg_ref(args, 0) {
                Some(s) => env.state().string(s).unwrap_or("").to_owned(),
                None if args.is_empty() => String::new(),
                None => "null".to_owned(),
            };
            if newline {
                text.push('\n');
            }
            env.print(&text);
            Ok(Val::Void)
        }
    };

    define(
        state,
        ClassDef::new("java/io/PrintStream")
            .body(|| Body::PrintStream)
            .builtin("print", "(Ljava/lang/String;)V", print(false))
            .builtin("println", "(Ljava/lang/String;)V", print(true))
            .builtin("println", "()V", print(true))
            .builtin("flush", "()V", |_, _, _| Ok(Val::Void)),
    );

    let out = match state.instance_of("java/io/PrintStream", Body::PrintStream) {
        Ok(out) => Val::Obj(out),
        Err(_) => Val::Null,
    };
    define(
        state,
        ClassDef::new("java/lang/System").static_field("out", "Ljava/io/PrintStream;", out),
    );
}
