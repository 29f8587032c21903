//! Object storage.
//!
//! Objects live in one arena for the lifetime of the runtime. Only the
//! reference table decides which objects native code may still reach; the
//! arena itself never frees, so an `ObjId` stays valid for tests to inspect.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ktbind_core::{PrimitiveKind, Region, RegionMut};
use rustc_hash::FxHashMap;

use crate::class::ClassId;
use crate::env::ThreadEnv;
use crate::error::Throw;
use crate::value::{Key, ObjId, Val};

/// Body of a lambda object: receives the arguments of `invoke`.
pub type LambdaFn = dyn Fn(&ThreadEnv, &[Val]) -> Result<Val, Throw> + Send + Sync;

/// Storage of a primitive array.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimArray {
    Boolean(Vec<bool>),
    Byte(Vec<i8>),
    Char(Vec<u16>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

/// Why a region copy failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayError {
    OutOfBounds,
    KindMismatch,
}

fn bounds(start: i32, count: usize, len: usize) -> Result<std::ops::Range<usize>, ArrayError> {
    let start = usize::try_from(start).map_err(|_| ArrayError::OutOfBounds)?;
    let end = start
        .checked_add(count)
        .filter(|&end| end <= len)
        .ok_or(ArrayError::OutOfBounds)?;
    Ok(start..end)
}

macro_rules! for_each_kind {
    ($mac:ident) => {
        $mac!(Boolean, Byte, Char, Short, Int, Long, Float, Double)
    };
}

impl PrimArray {
    pub fn new(kind: PrimitiveKind, len: usize) -> Self {
        match kind {
            PrimitiveKind::Boolean => PrimArray::Boolean(vec![false; len]),
            PrimitiveKind::Byte => PrimArray::Byte(vec![0; len]),
            PrimitiveKind::Char => PrimArray::Char(vec![0; len]),
            PrimitiveKind::Short => PrimArray::Short(vec![0; len]),
            PrimitiveKind::Int => PrimArray::Int(vec![0; len]),
            PrimitiveKind::Long => PrimArray::Long(vec![0; len]),
            PrimitiveKind::Float => PrimArray::Float(vec![0.0; len]),
            PrimitiveKind::Double => PrimArray::Double(vec![0.0; len]),
        }
    }

    pub fn len(&self) -> usize {
        macro_rules! len_of {
            ($($variant:ident),*) => {
                match self {
                    $(PrimArray::$variant(items) => items.len(),)*
                }
            };
        }
        for_each_kind!(len_of)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> PrimitiveKind {
        macro_rules! kind_of {
            ($($variant:ident),*) => {
                match self {
                    $(PrimArray::$variant(_) => PrimitiveKind::$variant,)*
                }
            };
        }
        for_each_kind!(kind_of)
    }

    /// Copies `buf.len()` elements starting at `start` into `buf`.
    pub fn read_region(&self, start: i32, buf: RegionMut<'_>) -> Result<(), ArrayError> {
        macro_rules! read_into {
            ($($variant:ident),*) => {
                match (self, buf) {
                    $((PrimArray::$variant(src), RegionMut::$variant(dst)) => {
                        let range = bounds(start, dst.len(), src.len())?;
                        dst.copy_from_slice(&src[range]);
                        Ok(())
                    })*
                    _ => Err(ArrayError::KindMismatch),
                }
            };
        }
        for_each_kind!(read_into)
    }

    /// Copies `buf` into the array starting at `start`.
    pub fn write_region(&mut self, start: i32, buf: Region<'_>) -> Result<(), ArrayError> {
        macro_rules! write_from {
            ($($variant:ident),*) => {
                match (self, buf) {
                    $((PrimArray::$variant(dst), Region::$variant(src)) => {
                        let range = bounds(start, src.len(), dst.len())?;
                        dst[range].copy_from_slice(src);
                        Ok(())
                    })*
                    _ => Err(ArrayError::KindMismatch),
                }
            };
        }
        for_each_kind!(write_from)
    }
}

/// Payload of an object, chosen by its class.
#[derive(Clone)]
pub enum Body {
    /// Instance fields in layout order.
    Plain(Vec<Val>),
    Str(String),
    Boxed(Val),
    Array(PrimArray),
    List(Vec<Option<ObjId>>),
    /// Hash set; iterates in insertion order.
    HashSet {
        items: Vec<Option<ObjId>>,
        index: FxHashMap<Key, usize>,
    },
    TreeSet(BTreeMap<Key, Option<ObjId>>),
    /// Hash map; iterates in insertion order.
    HashMap {
        entries: Vec<(Option<ObjId>, Option<ObjId>)>,
        index: FxHashMap<Key, usize>,
    },
    TreeMap(BTreeMap<Key, (Option<ObjId>, Option<ObjId>)>),
    Iter {
        items: Vec<Option<ObjId>>,
        pos: usize,
    },
    Entry {
        key: Option<ObjId>,
        value: Option<ObjId>,
    },
    Throwable {
        message: Option<String>,
    },
    PrintStream,
    Lambda {
        arity: usize,
        body: Arc<LambdaFn>,
    },
    Class(ClassId),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Plain(fields) => f.debug_tuple("Plain").field(fields).finish(),
            Body::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Body::Boxed(v) => f.debug_tuple("Boxed").field(v).finish(),
            Body::Array(a) => f.debug_tuple("Array").field(a).finish(),
            Body::List(items) => f.debug_tuple("List").field(items).finish(),
            Body::HashSet { items, .. } => f.debug_tuple("HashSet").field(items).finish(),
            Body::TreeSet(items) => f.debug_tuple("TreeSet").field(items).finish(),
            Body::HashMap { entries, .. } => f.debug_tuple("HashMap").field(entries).finish(),
            Body::TreeMap(entries) => f.debug_tuple("TreeMap").field(entries).finish(),
            Body::Iter { items, pos } => f
                .debug_struct("Iter")
                .field("items", items)
                .field("pos", pos)
                .finish(),
            Body::Entry { key, value } => f
                .debug_struct("Entry")
                .field("key", key)
                .field("value", value)
                .finish(),
            Body::Throwable { message } => {
                f.debug_struct("Throwable").field("message", message).finish()
            }
            Body::PrintStream => f.write_str("PrintStream"),
            Body::Lambda { arity, .. } => f.debug_struct("Lambda").field("arity", arity).finish_non_exhaustive(),
            Body::Class(id) => f.debug_tuple("Class").field(id).finish(),
        }
    }
}

#[derive(Debug)]
pub struct Object {
    pub class: ClassId,
    pub body: Body,
}

/// The object arena.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Object>,
}

impl Heap {
    pub fn alloc(&mut self, class: ClassId, body: Body) -> ObjId {
        let id = ObjId(self.objects.len() as u32);
        self.objects.push(Object { class, body });
        id
    }

    pub fn get(&self, id: ObjId) -> &Object {
        &self.objects[id.index()]
    }

    pub fn get_mut(&mut self, id: ObjId) -> &mut Object {
        &mut self.objects[id.index()]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Set and map key of a possibly null object.
    pub fn key_of(&self, obj: Option<ObjId>) -> Key {
        let Some(id) = obj else {
            return Key::Null;
        };
        match &self.get(id).body {
            Body::Str(s) => Key::Str(s.clone()),
            Body::Boxed(v) => Key::of_primitive(*v).unwrap_or(Key::Identity(id)),
            _ => Key::Identity(id),
        }
    }

    /// Adds to a set body. Returns whether the element was new.
    pub fn set_add(&mut self, set: ObjId, element: Option<ObjId>) -> Result<bool, Throw> {
        let key = self.key_of(element);
        match &mut self.get_mut(set).body {
            Body::HashSet { items, index } => {
                if index.contains_key(&key) {
                    return Ok(false);
                }
                index.insert(key, items.len());
                items.push(element);
                Ok(true)
            }
            Body::TreeSet(items) => Ok(items.insert(key, element).is_none()),
            _ => Err(Throw::illegal_state("not a set")),
        }
    }

    /// Puts into a map body. Returns the previous value.
    pub fn map_put(
        &mut self,
        map: ObjId,
        key_obj: Option<ObjId>,
        value: Option<ObjId>,
    ) -> Result<Option<ObjId>, Throw> {
        let key = self.key_of(key_obj);
        match &mut self.get_mut(map).body {
            Body::HashMap { entries, index } => match index.get(&key) {
                Some(&slot) => Ok(std::mem::replace(&mut entries[slot].1, value)),
                None => {
                    index.insert(key, entries.len());
                    entries.push((key_obj, value));
                    Ok(None)
                }
            },
            Body::TreeMap(entries) => Ok(entries.insert(key, (key_obj, value)).and_then(|(_, v)| v)),
            _ => Err(Throw::illegal_state("not a map")),
        }
    }

    /// Looks up a map body.
    pub fn map_get(&self, map: ObjId, key_obj: Option<ObjId>) -> Result<Option<ObjId>, Throw> {
        let key = self.key_of(key_obj);
        match &self.get(map).body {
            Body::HashMap { entries, index } => Ok(index.get(&key).and_then(|&slot| entries[slot].1)),
            Body::TreeMap(entries) => Ok(entries.get(&key).and_then(|(_, v)| *v)),
            _ => Err(Throw::illegal_state("not a map")),
        }
    }

    /// Elements of a list or set body in iteration order.
    pub fn elements(&self, obj: ObjId) -> Result<Vec<Option<ObjId>>, Throw> {
        match &self.get(obj).body {
            Body::List(items) | Body::HashSet { items, .. } => Ok(items.clone()),
            Body::TreeSet(items) => Ok(items.values().copied().collect()),
            _ => Err(Throw::illegal_state("not a collection")),
        }
    }

    /// Entries of a map body in iteration order.
    pub fn entries(&self, obj: ObjId) -> Result<Vec<(Option<ObjId>, Option<ObjId>)>, Throw> {
        match &self.get(obj).body {
            Body::HashMap { entries, .. } => Ok(entries.clone()),
            Body::TreeMap(entries) => Ok(entries.values().copied().collect()),
            _ => Err(Throw::illegal_state("not a map")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class() -> ClassId {
        ClassId(0)
    }

    #[test]
    fn region_copies_check_bounds_and_kind() {
        let mut array = PrimArray::new(PrimitiveKind::Int, 4);
        array.write_region(1, Region::Int(&[7, 8])).unwrap();
        let mut out = [0i32; 4];
        array.read_region(0, RegionMut::Int(&mut out)).unwrap();
        assert_eq!(out, [0, 7, 8, 0]);

        assert_eq!(
            array.write_region(3, Region::Int(&[1, 2])),
            Err(ArrayError::OutOfBounds)
        );
        assert_eq!(
            array.write_region(-1, Region::Int(&[1])),
            Err(ArrayError::OutOfBounds)
        );
        assert_eq!(
            array.write_region(0, Region::Long(&[1])),
            Err(ArrayError::KindMismatch)
        );
    }

    #[test]
    fn hash_sets_keep_insertion_order_and_dedupe_by_value() {
        let mut heap = Heap::default();
        let set = heap.alloc(
            class(),
            Body::HashSet {
                items: Vec::new(),
                index: FxHashMap::default(),
            },
        );
        let b = heap.alloc(class(), Body::Str("b".into()));
        let a = heap.alloc(class(), Body::Str("a".into()));
        let b2 = heap.alloc(class(), Body::Str("b".into()));

        assert!(heap.set_add(set, Some(b)).unwrap());
        assert!(heap.set_add(set, Some(a)).unwrap());
        assert!(!heap.set_add(set, Some(b2)).unwrap());
        assert_eq!(heap.elements(set).unwrap(), vec![Some(b), Some(a)]);
    }

    #[test]
    fn tree_maps_sort_by_key() {
        let mut heap = Heap::default();
        let map = heap.alloc(class(), Body::TreeMap(BTreeMap::new()));
        let two = heap.alloc(class(), Body::Boxed(Val::Int(2)));
        let one = heap.alloc(class(), Body::Boxed(Val::Int(1)));
        let x = heap.alloc(class(), Body::Str("x".into()));
        let y = heap.alloc(class(), Body::Str("y".into()));

        assert_eq!(heap.map_put(map, Some(two), Some(x)).unwrap(), None);
        assert_eq!(heap.map_put(map, Some(one), Some(y)).unwrap(), None);
        assert_eq!(heap.map_put(map, Some(two), Some(y)).unwrap(), Some(x));

        let keys: Vec<_> = heap.entries(map).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![Some(one), Some(two)]);
        assert_eq!(heap.map_get(map, Some(one)).unwrap(), Some(y));
    }
}
