//! Process-wide runtime handle and per-thread environments.
//!
//! The runtime handle is recorded once by the load routine. Each thread then
//! obtains its own environment lazily. A thread that is not yet known to the
//! runtime is attached on first use and detached again when the thread exits;
//! threads that arrived already attached are never detached here.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use lazy_static::lazy_static;
use parking_lot::RwLock;

use crate::sys::{Env, JNI_VERSION_1_6, JavaVm, JniStatus};

lazy_static! {
    static ref JAVA_VM: RwLock<Option<Arc<dyn JavaVm>>> = RwLock::new(None);
}

thread_local! {
    static THIS_THREAD: RefCell<Environment> = RefCell::new(Environment::default());
}

/// Records the runtime handle. Called by the load routine.
pub fn load(vm: Arc<dyn JavaVm>) {
    let mut slot = JAVA_VM.write();
    if slot.is_some() {
        log::debug!("replacing previously loaded runtime handle");
    }
    *slot = Some(vm);
}

/// Clears the runtime handle. Called by the unload routine.
pub fn unload() {
    JAVA_VM.write().take();
}

/// The runtime handle recorded at load time.
pub fn java_vm() -> Option<Arc<dyn JavaVm>> {
    JAVA_VM.read().clone()
}

/// Binds an environment the caller already holds to the current thread.
pub fn set_env(env: Env) {
    let vm = java_vm();
    let _ = THIS_THREAD.try_with(|cell| {
        let mut this = cell.borrow_mut();
        this.env = Some(env);
        this.vm = vm;
    });
}

/// The environment of the calling thread, attaching the thread if needed.
///
/// Returns `None` when no runtime is loaded, when attaching fails, or when the
/// thread is already tearing down its thread-local state.
pub fn this_thread() -> Option<Env> {
    THIS_THREAD
        .try_with(|cell| cell.try_borrow_mut().ok()?.get_env())
        .ok()
        .flatten()
}

#[derive(Default)]
struct Environment {
    env: Option<Env>,
    vm: Option<Arc<dyn JavaVm>>,
    /// Set when this thread was attached by us and must be detached on exit.
    attached: bool,
}

impl Environment {
    fn get_env(&mut self) -> Option<Env> {
        let current = java_vm()?;

        let same_vm = self
            .vm
            .as_ref()
            .is_some_and(|vm| Arc::ptr_eq(vm, &current));
        if !same_vm {
            self.release();
            self.vm = Some(Arc::clone(&current));
        }

        if let Some(env) = &self.env {
            return Some(Rc::clone(env));
        }

        let env = match current.get_env(JNI_VERSION_1_6) {
            Ok(env) => env,
            Err(JniStatus::Detached) => match current.attach_current_thread() {
                Ok(env) => {
                    log::debug!("attached native thread {:?}", std::thread::current().id());
                    self.attached = true;
                    env
                }
                Err(status) => {
                    log::error!("failed to attach native thread: {}", status);
                    return None;
                }
            },
            Err(status) => {
                log::error!("cannot obtain a runtime environment: {}", status);
                return None;
            }
        };

        self.env = Some(Rc::clone(&env));
        Some(env)
    }

    fn release(&mut self) {
        self.env = None;
        if self.attached {
            self.attached = false;
            if let Some(vm) = self.vm.take() {
                let status = vm.detach_current_thread();
                if !status.is_ok() {
                    log::warn!("failed to detach native thread: {}", status);
                }
            }
        }
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        self.release();
    }
}
