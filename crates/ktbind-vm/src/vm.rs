//! The runtime instance and its shared state.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ktbind_core::{Env, JObject, JValue, JavaVm, JniStatus};
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use crate::builtins;
use crate::class::{ClassDef, ClassId, ClassTable};
use crate::env::ThreadEnv;
use crate::error::{Throw, VmError};
use crate::heap::{Body, Heap};
use crate::refs::{RefKind, RefTable};
use crate::value::{ObjId, Val};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static TOKEN: Cell<u64> = const { Cell::new(0) };
}

/// Identifies the calling thread for the lifetime of the process.
pub(crate) fn current_token() -> u64 {
    TOKEN.with(|token| {
        if token.get() == 0 {
            token.set(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed));
        }
        token.get()
    })
}

const SUPPORTED_VERSIONS: [i32; 4] = [0x0001_0001, 0x0001_0002, 0x0001_0004, 0x0001_0006];

/// Counters describing how the runtime has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmStats {
    pub attaches: usize,
    pub detaches: usize,
    pub attached_threads: usize,
    pub live_locals: usize,
    pub live_globals: usize,
    /// Stale, foreign or mistyped handles passed in by native code.
    pub invalid_refs: usize,
    pub native_calls: usize,
    pub objects: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ThreadState {
    pub pending: Option<ObjId>,
    /// Local references per active native frame; the first frame is the
    /// thread's own.
    pub frames: Vec<Vec<JObject>>,
}

#[derive(Default)]
pub(crate) struct State {
    pub heap: Heap,
    pub classes: ClassTable,
    pub refs: RefTable,
    pub threads: FxHashMap<u64, ThreadState>,
    pub stdout: String,
    pub stats: VmStats,
}

pub(crate) struct Shared {
    state: Mutex<State>,
}

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock()
    }
}

impl State {
    pub fn thread(&mut self, token: u64) -> &mut ThreadState {
        self.threads.entry(token).or_insert_with(|| {
            log::error!("thread {} used an environment after detaching", token);
            ThreadState {
                pending: None,
                frames: vec![Vec::new()],
            }
        })
    }

    pub fn define_class(&mut self, def: ClassDef) -> Result<ClassId, VmError> {
        let object = self
            .heap
            .alloc(builtins::CLASS, Body::Class(self.classes.next_id()));
        let name = def.name.clone();
        let id = self.classes.define(def, object)?;
        log::trace!("defined class {} as {:?}", name, id);
        Ok(id)
    }

    pub fn class_of(&self, obj: ObjId) -> ClassId {
        self.heap.get(obj).class
    }

    pub fn class_name(&self, obj: ObjId) -> &str {
        &self.classes.get(self.class_of(obj)).name
    }

    /// A new instance of `class` with default field values.
    pub fn instantiate(&mut self, class: ClassId) -> ObjId {
        let def = self.classes.get(class);
        let body = match def.body {
            Some(factory) => factory(),
            None => Body::Plain(def.layout.iter().map(|(_, sig)| Val::zero_for(sig)).collect()),
        };
        self.heap.alloc(class, body)
    }

    pub fn instance_of(&mut self, class: &str, body: Body) -> Result<ObjId, Throw> {
        let id = self
            .classes
            .lookup(class)
            .ok_or_else(|| Throw::new("java/lang/NoClassDefFoundError", class))?;
        Ok(self.heap.alloc(id, body))
    }

    pub fn new_string(&mut self, value: &str) -> ObjId {
        self.heap.alloc(builtins::STRING, Body::Str(value.to_owned()))
    }

    pub fn string(&self, obj: ObjId) -> Option<&str> {
        match &self.heap.get(obj).body {
            Body::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Turns an exception in flight into a throwable object.
    pub fn materialize(&mut self, throw: Throw) -> ObjId {
        match throw {
            Throw::Object(id) => id,
            Throw::New { class, message } => {
                let id = self.classes.lookup(&class).unwrap_or_else(|| {
                    log::warn!("unknown exception class {}; raising java/lang/Error", class);
                    builtins::ERROR
                });
                self.heap.alloc(id, Body::Throwable { message })
            }
        }
    }

    pub fn message_of(&self, throwable: ObjId) -> Option<String> {
        match &self.heap.get(throwable).body {
            Body::Throwable { message } => message.clone(),
            _ => None,
        }
    }

    pub fn new_local(&mut self, token: u64, obj: ObjId) -> JObject {
        let handle = self.refs.insert(obj, RefKind::Local(token));
        let thread = self.thread(token);
        if thread.frames.is_empty() {
            thread.frames.push(Vec::new());
        }
        if let Some(frame) = thread.frames.last_mut() {
            frame.push(handle);
        }
        handle
    }

    pub fn push_frame(&mut self, token: u64) {
        self.thread(token).frames.push(Vec::new());
    }

    /// Releases every local created since the matching `push_frame`.
    pub fn pop_frame(&mut self, token: u64) {
        let Some(frame) = self.thread(token).frames.pop() else {
            return;
        };
        for handle in frame {
            self.refs.release_local(handle, token);
        }
    }

    /// The object behind `handle`, as seen from thread `token`.
    pub fn resolve(&mut self, token: u64, handle: JObject) -> Result<Option<ObjId>, Throw> {
        self.refs.resolve(handle, token).map_err(|err| {
            self.stats.invalid_refs += 1;
            log::error!("invalid reference {:?}: {}", handle, err);
            Throw::illegal_state(format!("invalid reference {:?}: {}", handle, err))
        })
    }

    /// Like [`resolve`](State::resolve) but rejects null.
    pub fn resolve_non_null(
        &mut self,
        token: u64,
        handle: JObject,
        what: &str,
    ) -> Result<ObjId, Throw> {
        self.resolve(token, handle)?.ok_or_else(|| Throw::npe(what))
    }

    pub fn import(&mut self, token: u64, value: JValue) -> Result<Val, Throw> {
        Ok(match value {
            JValue::Void => Val::Void,
            JValue::Boolean(v) => Val::Boolean(v),
            JValue::Byte(v) => Val::Byte(v),
            JValue::Char(v) => Val::Char(v),
            JValue::Short(v) => Val::Short(v),
            JValue::Int(v) => Val::Int(v),
            JValue::Long(v) => Val::Long(v),
            JValue::Float(v) => Val::Float(v),
            JValue::Double(v) => Val::Double(v),
            JValue::Object(handle) => Val::from_ref(self.resolve(token, handle)?),
        })
    }

    pub fn export(&mut self, token: u64, value: Val) -> JValue {
        match value {
            Val::Void => JValue::Void,
            Val::Boolean(v) => JValue::Boolean(v),
            Val::Byte(v) => JValue::Byte(v),
            Val::Char(v) => JValue::Char(v),
            Val::Short(v) => JValue::Short(v),
            Val::Int(v) => JValue::Int(v),
            Val::Long(v) => JValue::Long(v),
            Val::Float(v) => JValue::Float(v),
            Val::Double(v) => JValue::Double(v),
            Val::Null => JValue::Object(JObject::NULL),
            Val::Obj(id) => JValue::Object(self.new_local(token, id)),
        }
    }

    fn attach(&mut self, token: u64) {
        if self.threads.contains_key(&token) {
            return;
        }
        self.threads.insert(
            token,
            ThreadState {
                pending: None,
                frames: vec![Vec::new()],
            },
        );
        self.stats.attaches += 1;
    }

    fn detach(&mut self, token: u64) -> bool {
        let Some(thread) = self.threads.remove(&token) else {
            return false;
        };
        for handle in thread.frames.into_iter().flatten() {
            self.refs.release_local(handle, token);
        }
        self.stats.detaches += 1;
        true
    }
}

/// An in-process managed runtime.
///
/// Implements [`JavaVm`] so it can be handed to the load routine, and hands
/// out [`ThreadEnv`] environments implementing the native interface. Objects
/// are never collected; they live as long as the runtime.
pub struct Jvm {
    shared: Arc<Shared>,
}

impl Jvm {
    /// A runtime with the standard library classes defined.
    pub fn new() -> Arc<Self> {
        let mut state = State::default();
        builtins::install(&mut state);
        log::debug!("runtime started with {} objects", state.heap.len());
        Arc::new(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
            }),
        })
    }

    /// Adds a class. Superclasses and interfaces must already be defined.
    pub fn define_class(&self, def: ClassDef) -> Result<(), VmError> {
        self.shared.lock().define_class(def).map(|_| ())
    }

    /// Attaches the calling thread, or returns its environment if attached.
    pub fn attach(&self) -> Rc<ThreadEnv> {
        let token = current_token();
        self.shared.lock().attach(token);
        Rc::new(ThreadEnv::new(Arc::clone(&self.shared), token))
    }

    /// Detaches the calling thread. Returns whether it was attached.
    pub fn detach(&self) -> bool {
        self.shared.lock().detach(current_token())
    }

    pub fn is_attached(&self) -> bool {
        self.shared.lock().threads.contains_key(&current_token())
    }

    /// Drains the text printed to `System.out`.
    pub fn take_output(&self) -> String {
        std::mem::take(&mut self.shared.lock().stdout)
    }

    pub fn stats(&self) -> VmStats {
        let state = self.shared.lock();
        VmStats {
            attached_threads: state.threads.len(),
            live_locals: state.refs.live_locals(),
            live_globals: state.refs.live_globals(),
            objects: state.heap.len(),
            ..state.stats
        }
    }
}

impl JavaVm for Jvm {
    fn get_env(&self, version: i32) -> Result<Env, JniStatus> {
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(JniStatus::Version);
        }
        if !self.is_attached() {
            return Err(JniStatus::Detached);
        }
        Ok(self.attach())
    }

    fn attach_current_thread(&self) -> Result<Env, JniStatus> {
        Ok(self.attach())
    }

    fn detach_current_thread(&self) -> JniStatus {
        if self.detach() {
            JniStatus::Ok
        } else {
            JniStatus::Detached
        }
    }
}
