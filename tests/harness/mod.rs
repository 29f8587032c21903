//! Shared fixture for the integration tests.
//!
//! Boots one runtime per test binary with the managed side of the sample
//! extension declared, then loads the extension into it.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, LinkedList, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use ktbind::prelude::*;
use ktbind::{GlobalRef, JNI_VERSION_1_6, JavaVm};
use ktbind_vm::{ClassDef, Jvm, ThreadEnv, Val};
use lazy_static::lazy_static;

/// Native class under test.
#[derive(Debug, Clone, PartialEq, NativeClass)]
#[ktbind(class = "com.example.Sample", clone)]
pub struct Sample {
    pub name: String,
    pub count: i32,
}

impl Sample {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn increment(&mut self, by: i32) -> i32 {
        self.count += by;
        self.count
    }

    fn duplicate(&self) -> Sample {
        self.clone()
    }
}

/// Data class under test.
#[derive(Debug, Default, Clone, PartialEq, DataClass)]
#[ktbind(class = "com.example.Data")]
pub struct Data {
    pub b: bool,
    pub s: i16,
    pub i: i32,
    pub l: i64,
    pub f: f32,
    pub d: f64,
    pub str: String,
    pub short_arr: Vec<i16>,
    pub int_arr: Vec<i32>,
    pub long_arr: Vec<i64>,
    pub map: HashMap<String, Vec<String>>,
}

/// Static functions of `com.example.Sample` as (name, signature).
pub const SAMPLE_FUNCTIONS: &[(&str, &str)] = &[
    ("create", "(Ljava/lang/String;)Lcom/example/Sample;"),
    ("create", "(Ljava/lang/String;I)Lcom/example/Sample;"),
    ("copyName", "(Lcom/example/Sample;)Ljava/lang/String;"),
    ("add", "(II)I"),
    ("negate", "(Z)Z"),
    ("echoByte", "(B)B"),
    ("echoChar", "(C)C"),
    ("echoShort", "(S)S"),
    ("echoLong", "(J)J"),
    ("echoFloat", "(F)F"),
    ("echoDouble", "(D)D"),
    ("echoString", "(Ljava/lang/String;)Ljava/lang/String;"),
    ("echoUnsigned", "(J)J"),
    ("reverse", "(Ljava/util/List;)Ljava/util/List;"),
    ("doubled", "([I)[I"),
    ("queueToList", "(Ljava/util/List;)Ljava/util/List;"),
    ("sorted", "(Ljava/util/Set;)Ljava/util/Set;"),
    ("lengths", "(Ljava/util/Map;)Ljava/util/Map;"),
    ("unique", "(Ljava/util/List;)Ljava/util/Set;"),
    ("wordLengths", "(Ljava/util/List;)Ljava/util/Map;"),
    ("smallest", "(Ljava/util/Set;)Ljava/lang/String;"),
    ("keys", "(Ljava/util/Map;)Ljava/util/List;"),
    ("invert", "([Z)[Z"),
    ("negateBytes", "([B)[B"),
    ("incrementBytes", "([B)[B"),
    ("upper", "([C)[C"),
    ("halves", "([F)[F"),
    ("squares", "([D)[D"),
    ("identity", "(Ljava/lang/Object;)Ljava/lang/Object;"),
    ("parse", "(Ljava/lang/String;)J"),
    ("fail", "()I"),
    ("explode", "()I"),
    ("apply", "(Lkotlin/jvm/functions/Function1;I)I"),
    (
        "tryApply",
        "(Lkotlin/jvm/functions/Function1;Ljava/lang/String;)Ljava/lang/String;",
    ),
    ("rethrow", "(Lkotlin/jvm/functions/Function0;)V"),
    ("applyOnThread", "(Lkotlin/jvm/functions/Function1;I)I"),
    (
        "makeCallback",
        "(Lkotlin/jvm/functions/Function1;)Lkotlin/jvm/functions/Function1;",
    ),
    ("makeData", "()Lcom/example/Data;"),
    ("echoData", "(Lcom/example/Data;)Lcom/example/Data;"),
    ("greet", "(Ljava/lang/String;)V"),
];

/// Instance methods of `com.example.Sample` as (name, signature).
pub const SAMPLE_METHODS: &[(&str, &str)] = &[
    ("close", "()V"),
    ("name", "()Ljava/lang/String;"),
    ("increment", "(I)I"),
    ("duplicate", "()Lcom/example/Sample;"),
];

pub const DATA_FIELDS: &[(&str, &str)] = &[
    ("b", "Z"),
    ("s", "S"),
    ("i", "I"),
    ("l", "J"),
    ("f", "F"),
    ("d", "D"),
    ("str", "Ljava/lang/String;"),
    ("short_arr", "[S"),
    ("int_arr", "[I"),
    ("long_arr", "[J"),
    ("map", "Ljava/util/Map;"),
];

fn parse(text: String) -> ktbind::Result<i64> {
    text.trim()
        .parse()
        .map_err(|_| Error::native(format!("invalid number '{}'", text)))
}

fn try_apply(f: Function<fn(String) -> String>, input: String) -> String {
    match f.call(input) {
        Ok(output) => output,
        Err(Error::Java(ex)) => format!("caught: {}", ex.message()),
        Err(other) => format!("failed: {}", other),
    }
}

fn apply_on_thread(f: Function<fn(i32) -> i32>, value: i32) -> ktbind::Result<i32> {
    std::thread::spawn(move || f.call(value))
        .join()
        .map_err(|_| Error::native("callback thread panicked"))?
}

/// Registration function of the sample extension.
pub fn bindings() {
    native_class::<Sample>()
        .constructor("create", |name: String| Sample { name, count: 0 })
        .constructor("create", |name: String, count: i32| Sample { name, count })
        .function("copyName", |sample: Sample| sample.name)
        .method("name", Sample::name)
        .method("increment", Sample::increment)
        .method("duplicate", Sample::duplicate)
        .function("add", |a: i32, b: i32| a + b)
        .function("negate", |b: bool| !b)
        .function("echoByte", |v: i8| v)
        .function("echoChar", |v: u16| v)
        .function("echoShort", |v: i16| v)
        .function("echoLong", |v: i64| v)
        .function("echoFloat", |v: f32| v)
        .function("echoDouble", |v: f64| v)
        .function("echoString", |v: String| v)
        .function("echoUnsigned", |v: u64| v)
        .function("reverse", |mut items: Vec<String>| {
            items.reverse();
            items
        })
        .function("doubled", |items: Vec<i32>| {
            items.into_iter().map(|v| v * 2).collect::<Vec<i32>>()
        })
        .function("queueToList", |items: VecDeque<i64>| {
            items.into_iter().rev().collect::<LinkedList<i64>>()
        })
        .function("sorted", |items: HashSet<String>| {
            items.into_iter().collect::<BTreeSet<String>>()
        })
        .function("lengths", |words: HashMap<String, String>| {
            words
                .into_iter()
                .map(|(k, v)| (k, v.len() as i32))
                .collect::<BTreeMap<String, i32>>()
        })
        .function("unique", |items: Vec<String>| items.into_iter().collect::<HashSet<String>>())
        .function("wordLengths", |words: Vec<String>| {
            words
                .into_iter()
                .map(|w| {
                    let len = w.len() as i32;
                    (w, len)
                })
                .collect::<HashMap<String, i32>>()
        })
        .function("smallest", |items: BTreeSet<String>| {
            items.into_iter().next().unwrap_or_default()
        })
        .function("keys", |map: BTreeMap<String, i32>| map.into_keys().collect::<Vec<String>>())
        .function("invert", |flags: Vec<bool>| {
            flags.into_iter().map(|b| !b).collect::<Vec<bool>>()
        })
        .function("negateBytes", |bytes: Vec<i8>| {
            bytes.into_iter().map(i8::wrapping_neg).collect::<Vec<i8>>()
        })
        .function("incrementBytes", |bytes: Vec<u8>| {
            bytes.into_iter().map(|b| b.wrapping_add(1)).collect::<Vec<u8>>()
        })
        .function("upper", |chars: Vec<u16>| {
            chars
                .into_iter()
                .map(|c| if (b'a' as u16..=b'z' as u16).contains(&c) { c - 32 } else { c })
                .collect::<Vec<u16>>()
        })
        .function("halves", |values: Vec<f32>| {
            values.into_iter().map(|v| v / 2.0).collect::<Vec<f32>>()
        })
        .function("squares", |values: Vec<f64>| {
            values.into_iter().map(|v| v * v).collect::<Vec<f64>>()
        })
        .function("identity", |obj: GlobalRef| obj)
        .function("parse", parse)
        .function("fail", || -> anyhow::Result<i32> { Err(anyhow::anyhow!("disk on fire")) })
        .function("explode", || -> i32 { panic!("boom") })
        .function("apply", |f: Function<fn(i32) -> i32>, v: i32| f.call(v))
        .function("tryApply", try_apply)
        .function("rethrow", |f: Function<fn()>| f.call())
        .function("applyOnThread", apply_on_thread)
        .function("makeCallback", |f: Function<fn(i32) -> i32>| f)
        .function("makeData", || Data {
            b: true,
            i: 1024,
            str: "x".to_owned(),
            ..Data::default()
        })
        .function("echoData", |data: Data| data)
        .function("greet", |name: String| ktbind::java_println!("Hello, {}!", name));

    data_class::<Data>()
        .field("b", |d| &d.b, |d| &mut d.b)
        .field("s", |d| &d.s, |d| &mut d.s)
        .field("i", |d| &d.i, |d| &mut d.i)
        .field("l", |d| &d.l, |d| &mut d.l)
        .field("f", |d| &d.f, |d| &mut d.f)
        .field("d", |d| &d.d, |d| &mut d.d)
        .field("str", |d| &d.str, |d| &mut d.str)
        .field("short_arr", |d| &d.short_arr, |d| &mut d.short_arr)
        .field("int_arr", |d| &d.int_arr, |d| &mut d.int_arr)
        .field("long_arr", |d| &d.long_arr, |d| &mut d.long_arr)
        .field("map", |d| &d.map, |d| &mut d.map);
}

/// Declares the managed side of the sample extension.
pub fn define_classes(vm: &Jvm) {
    vm.define_class(
        ClassDef::new("com/example/NativeObject")
            .abstract_class()
            .field("nativePointer", "J"),
    )
    .unwrap();

    let mut sample = ClassDef::new("com/example/Sample").extends("com/example/NativeObject");
    for (name, sig) in SAMPLE_FUNCTIONS {
        sample = sample.native_static(*name, *sig);
    }
    for (name, sig) in SAMPLE_METHODS {
        sample = sample.native_method(*name, *sig);
    }
    vm.define_class(sample).unwrap();

    let mut data = ClassDef::new("com/example/Data");
    for (name, sig) in DATA_FIELDS {
        data = data.field(*name, *sig);
    }
    vm.define_class(data).unwrap();
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn boot() -> Arc<Jvm> {
    init_logging();
    let vm = Jvm::new();
    define_classes(&vm);

    let env = vm.attach();
    let handle: Arc<dyn JavaVm> = vm.clone();
    let status = ktbind::on_load(handle, bindings);
    if status != JNI_VERSION_1_6 {
        panic!("extension failed to load: {:?}", env.take_pending());
    }
    vm
}

lazy_static! {
    pub static ref VM: Arc<Jvm> = boot();
}

/// The environment of the calling test thread.
pub fn env() -> Rc<ThreadEnv> {
    VM.attach()
}

pub const SAMPLE: &str = "com/example/Sample";

/// Calls a static function of `com.example.Sample`.
pub fn call(env: &ThreadEnv, name: &str, args: &[Val]) -> Result<Val, ktbind_vm::Thrown> {
    let sig = SAMPLE_FUNCTIONS
        .iter()
        .find(|(n, s)| *n == name && param_count(s) == args.len())
        .map(|(_, s)| *s)
        .unwrap_or_else(|| panic!("no function {} taking {} argument(s)", name, args.len()));
    env.invoke_static(SAMPLE, name, sig, args)
}

/// Calls an instance method of `com.example.Sample`.
pub fn call_method(
    env: &ThreadEnv,
    this: ktbind_vm::ObjId,
    name: &str,
    args: &[Val],
) -> Result<Val, ktbind_vm::Thrown> {
    let sig = SAMPLE_METHODS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, s)| *s)
        .unwrap_or_else(|| panic!("no method {}", name));
    env.invoke_virtual(this, name, sig, args)
}

fn param_count(sig: &str) -> usize {
    let params = &sig[1..sig.find(')').unwrap()];
    let mut count = 0;
    let mut chars = params.chars();
    while let Some(c) = chars.next() {
        match c {
            '[' => continue,
            'L' => {
                chars.by_ref().find(|&c| c == ';');
            }
            _ => {}
        }
        count += 1;
    }
    count
}

pub fn string(env: &ThreadEnv, value: Val) -> Option<String> {
    value.obj().and_then(|obj| env.string(obj))
}

pub fn str_val(env: &ThreadEnv, text: &str) -> Val {
    Val::Obj(env.new_string(text))
}
