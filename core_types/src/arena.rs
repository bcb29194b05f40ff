//! Generation-checked handles into driver-owned storage
//!
//! The kernel keeps driver context (the argument of a timeout, the
//! instance of an interrupt entry) as a [`Handle`]: an index plus the
//! generation of the slot at the time the handle was issued. Once the
//! slot is freed its generation moves on, so a stale handle resolves to
//! nothing instead of to whatever reused the slot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to a value inside a [`HandleArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// A handle that never resolves
    ///
    /// Used where a callback needs no argument.
    pub const NULL: Handle = Handle {
        index: u32::MAX,
        generation: 0,
    };

    /// Builds a handle from its raw parts
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the slot index
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the generation the handle was issued for
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Returns true for [`Handle::NULL`]
    pub fn is_null(&self) -> bool {
        self.index == u32::MAX
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Handle(null)")
        } else {
            write!(f, "Handle({}#{})", self.index, self.generation)
        }
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena that resolves [`Handle`]s
///
/// Freed slots are reused; every reuse bumps the slot generation.
#[derive(Debug)]
pub struct HandleArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> HandleArena<T> {
    /// Creates an empty arena
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Stores a value and returns its handle
    pub fn insert(&mut self, value: T) -> Handle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::from_raw(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle::from_raw(index, 0)
    }

    /// Resolves a handle
    pub fn get(&self, handle: Handle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Resolves a handle mutably
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Removes the value behind a handle, invalidating the handle
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Returns whether the handle still resolves
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Returns the number of live values
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the arena holds no live values
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Default for HandleArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
