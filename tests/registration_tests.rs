//! Load-time registration against freshly started runtimes.
//!
//! The binding registry and the recorded runtime handle are process-wide, so
//! every test here runs under one lock.

mod harness;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use harness::{Data, Sample, init_logging};
use ktbind::prelude::*;
use ktbind::{JNI_EDETACHED, JNI_ERR, JNI_VERSION_1_6, JavaVm, on_load, on_unload};
use ktbind_vm::{ClassDef, Jvm, Val};
use lazy_static::lazy_static;
use parking_lot::Mutex;

lazy_static! {
    static ref SERIAL: Mutex<()> = Mutex::new(());
    static ref KEPT: Mutex<Option<Function<fn(i32) -> i32>>> = Mutex::new(None);
}

static PENDING_DROPS: AtomicUsize = AtomicUsize::new(0);

/// Native class whose managed class cannot be instantiated.
#[derive(NativeClass)]
#[ktbind(class = "com.example.Pending")]
struct Pending;

impl Drop for Pending {
    fn drop(&mut self) {
        PENDING_DROPS.fetch_add(1, Ordering::SeqCst);
    }
}

mod sample_extension {
    ktbind::extension_module!(crate::harness::bindings);
}

fn native_object(vm: &Jvm) {
    vm.define_class(
        ClassDef::new("com/example/NativeObject")
            .abstract_class()
            .field("nativePointer", "J"),
    )
    .unwrap();
}

fn load(vm: &Arc<Jvm>, initializer: impl FnOnce()) -> i32 {
    let handle: Arc<dyn JavaVm> = vm.clone();
    on_load(handle, initializer)
}

#[test]
fn missing_native_class_fails_the_load() {
    let _serial = SERIAL.lock();
    init_logging();
    let vm = Jvm::new();
    let env = vm.attach();

    let status = load(&vm, || {
        native_class::<Sample>();
    });

    assert_eq!(status, JNI_ERR);
    let pending = env.take_pending().expect("pending exception");
    assert_eq!(pending.class, "java/lang/Exception");
    assert_eq!(
        pending.message.as_deref(),
        Some("Cannot find class 'com/example/Sample' registered as a native class")
    );
}

#[test]
fn missing_data_class_fails_the_load() {
    let _serial = SERIAL.lock();
    init_logging();
    let vm = Jvm::new();
    let env = vm.attach();

    let status = load(&vm, || {
        data_class::<Data>().field("i", |d| &d.i, |d| &mut d.i);
    });

    assert_eq!(status, JNI_ERR);
    let pending = env.take_pending().expect("pending exception");
    assert_eq!(
        pending.message.as_deref(),
        Some("Cannot find class 'com/example/Data' registered as a data class")
    );
}

#[test]
fn missing_field_fails_the_load() {
    let _serial = SERIAL.lock();
    init_logging();
    let vm = Jvm::new();
    vm.define_class(ClassDef::new("com/example/Data").field("i", "I"))
        .unwrap();
    let env = vm.attach();

    let status = load(&vm, || {
        data_class::<Data>()
            .field("i", |d| &d.i, |d| &mut d.i)
            .field("map", |d| &d.map, |d| &mut d.map);
    });

    assert_eq!(status, JNI_ERR);
    let pending = env.take_pending().expect("pending exception");
    assert_eq!(
        pending.message.as_deref(),
        Some(
            "Cannot find field 'map' with type signature 'Ljava/util/Map;' \
             in registered class 'com/example/Data'"
        )
    );
}

#[test]
fn field_of_the_wrong_type_fails_the_load() {
    let _serial = SERIAL.lock();
    init_logging();
    let vm = Jvm::new();
    vm.define_class(ClassDef::new("com/example/Data").field("i", "J"))
        .unwrap();
    let env = vm.attach();

    let status = load(&vm, || {
        data_class::<Data>().field("i", |d| &d.i, |d| &mut d.i);
    });

    assert_eq!(status, JNI_ERR);
    let message = env.take_pending().and_then(|p| p.message).unwrap();
    assert!(message.contains("'i' with type signature 'I'"), "{message}");
}

#[test]
fn undeclared_native_method_fails_the_load() {
    let _serial = SERIAL.lock();
    init_logging();
    let vm = Jvm::new();
    native_object(&vm);
    vm.define_class(
        ClassDef::new("com/example/Sample")
            .extends("com/example/NativeObject")
            .native_method("close", "()V"),
    )
    .unwrap();
    let env = vm.attach();

    let status = load(&vm, || {
        native_class::<Sample>().function("add", |a: i32, b: i32| a + b);
    });

    assert_eq!(status, JNI_ERR);
    let pending = env.take_pending().expect("pending exception");
    assert_eq!(pending.class, "java/lang/NoSuchMethodError");
    assert_eq!(pending.message.as_deref(), Some("com/example/Sample.add(II)I"));
}

#[test]
fn detached_thread_reports_the_runtime_status() {
    let _serial = SERIAL.lock();
    init_logging();
    let vm = Jvm::new();
    assert!(!vm.is_attached());

    let mut ran = false;
    let status = load(&vm, || ran = true);

    assert_eq!(status, JNI_EDETACHED);
    assert!(!ran);
}

#[test]
fn panicking_initializer_fails_the_load() {
    let _serial = SERIAL.lock();
    init_logging();
    let vm = Jvm::new();
    let _env = vm.attach();

    let status = load(&vm, || panic!("bad bindings"));
    assert_eq!(status, JNI_ERR);
}

#[test]
fn full_extension_loads() {
    let _serial = SERIAL.lock();
    init_logging();
    let vm = Jvm::new();
    harness::define_classes(&vm);
    let env = vm.attach();

    assert_eq!(load(&vm, harness::bindings), JNI_VERSION_1_6);
    assert!(env.take_pending().is_none());

    let sum = env.invoke_static("com/example/Sample", "add", "(II)I", &[Val::Int(20), Val::Int(22)]);
    assert_eq!(sum, Ok(Val::Int(42)));
}

#[test]
fn unload_forgets_the_runtime() {
    let _serial = SERIAL.lock();
    init_logging();
    let vm = Jvm::new();
    native_object(&vm);
    vm.define_class(
        ClassDef::new("com/example/Sample")
            .extends("com/example/NativeObject")
            .native_method("close", "()V")
            .native_static("keep", "(Lkotlin/jvm/functions/Function1;)V"),
    )
    .unwrap();
    let env = vm.attach();

    let status = load(&vm, || {
        native_class::<Sample>().function("keep", |f: Function<fn(i32) -> i32>| {
            *KEPT.lock() = Some(f);
        });
    });
    assert_eq!(status, JNI_VERSION_1_6);

    let lambda = env
        .new_lambda(1, |env: &ktbind_vm::ThreadEnv, _: &[Val]| {
            Ok(Val::from_ref(env.boxed(Val::Int(7))))
        })
        .unwrap();
    env.invoke_static(
        "com/example/Sample",
        "keep",
        "(Lkotlin/jvm/functions/Function1;)V",
        &[Val::Obj(lambda)],
    )
    .unwrap();

    let kept = KEPT.lock().take().expect("callback kept");
    assert_eq!(kept.call(1).unwrap(), 7);
    let globals = vm.stats().live_globals;
    assert!(globals >= 1);

    let handle: Arc<dyn JavaVm> = vm.clone();
    on_unload(&handle);

    // Without a runtime the call is skipped and the reference cannot be released.
    assert_eq!(kept.call(1).unwrap(), 0);
    let skipped = ktbind::skipped_global_releases();
    drop(kept);
    assert_eq!(ktbind::skipped_global_releases(), skipped + 1);
    assert_eq!(vm.stats().live_globals, globals);
}

#[test]
fn failed_allocation_frees_the_native_object() {
    let _serial = SERIAL.lock();
    init_logging();
    let vm = Jvm::new();
    native_object(&vm);
    vm.define_class(
        ClassDef::new("com/example/Pending")
            .extends("com/example/NativeObject")
            .abstract_class(),
    )
    .unwrap();
    vm.define_class(
        ClassDef::new("com/example/Sample")
            .extends("com/example/NativeObject")
            .native_method("close", "()V")
            .native_static("pending", "()Lcom/example/Pending;"),
    )
    .unwrap();
    let env = vm.attach();

    let status = load(&vm, || {
        native_class::<Sample>().function("pending", || Pending);
    });
    assert_eq!(status, JNI_VERSION_1_6);

    let drops = PENDING_DROPS.load(Ordering::SeqCst);
    let err = env
        .invoke_static("com/example/Sample", "pending", "()Lcom/example/Pending;", &[])
        .unwrap_err();
    assert_eq!(err.class, "java/lang/InstantiationException");
    assert_eq!(PENDING_DROPS.load(Ordering::SeqCst), drops + 1);
}

#[test]
fn extension_module_defines_the_entry_points() {
    let _serial = SERIAL.lock();
    init_logging();
    let vm = Jvm::new();
    harness::define_classes(&vm);
    let env = vm.attach();

    let handle: Arc<dyn JavaVm> = vm.clone();
    assert_eq!(sample_extension::on_load(Arc::clone(&handle)), JNI_VERSION_1_6);
    let sum = env.invoke_static("com/example/Sample", "add", "(II)I", &[Val::Int(1), Val::Int(2)]);
    assert_eq!(sum, Ok(Val::Int(3)));

    sample_extension::on_unload(&handle);
}
