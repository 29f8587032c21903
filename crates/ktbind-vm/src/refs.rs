//! Reference table backing boundary handles.
//!
//! Every handle given to native code is a slot in this table. A handle packs
//! the slot index and its generation; deleting a reference bumps the slot's
//! generation and pushes it on the free list, so a stale handle is detected
//! instead of silently aliasing a newer reference.

use std::fmt;

use ktbind_core::JObject;

use crate::value::ObjId;

/// Owner of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    /// Valid on the thread with this token until deleted or its frame ends.
    Local(u64),
    /// Valid on any thread until deleted.
    Global,
}

/// Why a handle could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefError {
    /// Deleted, or never issued.
    Stale,
    /// A local reference used on another thread.
    WrongThread,
    /// A global deleted as local or the reverse.
    WrongKind,
}

impl fmt::Display for RefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefError::Stale => "stale or unknown reference",
            RefError::WrongThread => "local reference used on another thread",
            RefError::WrongKind => "reference deleted with the wrong kind",
        })
    }
}

struct RefSlot {
    generation: u32,
    target: Option<(ObjId, RefKind)>,
}

#[derive(Default)]
pub struct RefTable {
    slots: Vec<RefSlot>,
    free_list: Vec<u32>,
    live_locals: usize,
    live_globals: usize,
}

fn encode(index: u32, generation: u32) -> JObject {
    JObject::from_raw((u64::from(generation) << 32) | (u64::from(index) + 1))
}

fn decode(handle: JObject) -> Option<(u32, u32)> {
    let raw = handle.as_raw();
    let index = (raw & 0xFFFF_FFFF).checked_sub(1)?;
    Some((index as u32, (raw >> 32) as u32))
}

impl RefTable {
    /// Issues a new reference to `target`.
    pub fn insert(&mut self, target: ObjId, kind: RefKind) -> JObject {
        match kind {
            RefKind::Local(_) => self.live_locals += 1,
            RefKind::Global => self.live_globals += 1,
        }

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.target = Some((target, kind));
            encode(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(RefSlot {
                generation: 0,
                target: Some((target, kind)),
            });
            encode(index, 0)
        }
    }

    fn slot(&self, handle: JObject) -> Result<(u32, ObjId, RefKind), RefError> {
        let (index, generation) = decode(handle).ok_or(RefError::Stale)?;
        let slot = self.slots.get(index as usize).ok_or(RefError::Stale)?;
        if slot.generation != generation {
            return Err(RefError::Stale);
        }
        let (target, kind) = slot.target.ok_or(RefError::Stale)?;
        Ok((index, target, kind))
    }

    /// The object behind `handle` as seen from thread `token`. Null resolves
    /// to `None`.
    pub fn resolve(&self, handle: JObject, token: u64) -> Result<Option<ObjId>, RefError> {
        if handle.is_null() {
            return Ok(None);
        }
        let (_, target, kind) = self.slot(handle)?;
        match kind {
            RefKind::Local(owner) if owner != token => Err(RefError::WrongThread),
            _ => Ok(Some(target)),
        }
    }

    /// Deletes `handle`, which must be of kind `expected`.
    pub fn remove(&mut self, handle: JObject, expected: RefKind) -> Result<(), RefError> {
        let (index, _, kind) = self.slot(handle)?;
        match (kind, expected) {
            (RefKind::Local(owner), RefKind::Local(token)) if owner != token => {
                return Err(RefError::WrongThread);
            }
            (RefKind::Local(_), RefKind::Local(_)) => self.live_locals -= 1,
            (RefKind::Global, RefKind::Global) => self.live_globals -= 1,
            _ => return Err(RefError::WrongKind),
        }

        let slot = &mut self.slots[index as usize];
        slot.target = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(index);
        Ok(())
    }

    /// Deletes `handle` if it is still a live local of thread `token`.
    pub fn release_local(&mut self, handle: JObject, token: u64) {
        let _ = self.remove(handle, RefKind::Local(token));
    }

    pub fn live_locals(&self) -> usize {
        self.live_locals
    }

    pub fn live_globals(&self) -> usize {
        self.live_globals
    }
}

impl fmt::Debug for RefTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefTable")
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .field("live_locals", &self.live_locals)
            .field("live_globals", &self.live_globals)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_never_null() {
        let mut table = RefTable::default();
        let handle = table.insert(ObjId(0), RefKind::Global);
        assert!(!handle.is_null());
        assert_eq!(table.resolve(handle, 1), Ok(Some(ObjId(0))));
        assert_eq!(table.resolve(JObject::NULL, 1), Ok(None));
    }

    #[test]
    fn deleted_handles_go_stale_even_when_the_slot_is_reused() {
        let mut table = RefTable::default();
        let first = table.insert(ObjId(3), RefKind::Local(1));
        table.remove(first, RefKind::Local(1)).unwrap();
        let second = table.insert(ObjId(4), RefKind::Local(1));

        assert_ne!(first, second);
        assert_eq!(table.resolve(first, 1), Err(RefError::Stale));
        assert_eq!(table.resolve(second, 1), Ok(Some(ObjId(4))));
        assert_eq!(table.remove(first, RefKind::Local(1)), Err(RefError::Stale));
    }

    #[test]
    fn locals_are_thread_affine() {
        let mut table = RefTable::default();
        let local = table.insert(ObjId(1), RefKind::Local(7));
        assert_eq!(table.resolve(local, 8), Err(RefError::WrongThread));
        assert_eq!(table.remove(local, RefKind::Local(8)), Err(RefError::WrongThread));
        assert_eq!(table.remove(local, RefKind::Global), Err(RefError::WrongKind));
        assert_eq!(table.live_locals(), 1);
        table.release_local(local, 7);
        assert_eq!(table.live_locals(), 0);
    }

    #[test]
    fn counts_live_references() {
        let mut table = RefTable::default();
        let a = table.insert(ObjId(1), RefKind::Global);
        let _b = table.insert(ObjId(1), RefKind::Global);
        assert_eq!(table.live_globals(), 2);
        table.remove(a, RefKind::Global).unwrap();
        assert_eq!(table.live_globals(), 1);
    }
}
