//! Generational arena backing the cell graph.
//!
//! Cells and list headers live in [`Arena`]s and refer to each other by
//! [`ArenaId`]. Nothing is reference counted; unreachable values are reclaimed
//! by the graph's collector, which frees their slots here.
//!
//! # Generations
//! Every slot carries a generation counter that is bumped when the slot is
//! freed. An `ArenaId` only resolves while its generation matches the slot's,
//! so a handle kept across a deallocation can never observe the data that
//! later reuses the slot.
//!
//! Slots are visited in index order and the most recently freed slot is the
//! next one handed out.

use std::fmt;

/// Generation-checked handle into an [`Arena`].
///
/// `ArenaId` is `Copy`, `Eq`, `Ord`, `Hash`. Ordering is by slot index, then
/// generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArenaId {
    index: u32,
    generation: u32,
}

impl ArenaId {
    /// Handle that never resolves; used as a placeholder while wiring
    /// structures that refer to each other.
    pub const DANGLING: ArenaId = ArenaId {
        index: u32::MAX,
        generation: u32::MAX,
    };

    /// Returns the slot index.
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Returns the generation this handle was issued for.
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    value: Option<T>,
    generation: u32,
    /// Next vacant slot while this one is vacant.
    next_vacant: Option<u32>,
}

/// Contiguous storage with free-list reuse and generation checks.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    vacant: Option<u32>,
    occupied: usize,
}

impl<T> Arena<T> {
    /// Empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: None,
            occupied: 0,
        }
    }

    /// Allocates a slot holding `data` and returns its handle.
    pub fn allocate(&mut self, data: T) -> ArenaId {
        self.allocate_with(|_| data)
    }

    /// Allocates a slot whose value is built from its own handle.
    ///
    /// Needed for self-referential values such as ring sentinels, whose
    /// neighbour links start out pointing at themselves.
    pub fn allocate_with(&mut self, build: impl FnOnce(ArenaId) -> T) -> ArenaId {
        let id = match self.vacant {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                self.vacant = slot.next_vacant.take();
                ArenaId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    value: None,
                    generation: 0,
                    next_vacant: None,
                });
                ArenaId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        let value = build(id);
        self.slots[id.index as usize].value = Some(value);
        self.occupied += 1;
        id
    }

    /// Frees the slot identified by `id` and returns its value.
    ///
    /// Returns `None` if the handle is stale or the slot is already free.
    pub fn deallocate(&mut self, id: ArenaId) -> Option<T> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.next_vacant = self.vacant.replace(id.index);
        self.occupied -= 1;
        Some(value)
    }

    /// Value at `id`, if the handle is live.
    pub fn get(&self, id: ArenaId) -> Option<&T> {
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.generation == id.generation => slot.value.as_ref(),
            _ => None,
        }
    }

    /// Mutable value at `id`, if the handle is live.
    pub fn get_mut(&mut self, id: ArenaId) -> Option<&mut T> {
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation => slot.value.as_mut(),
            _ => None,
        }
    }

    /// Returns `true` if `id` still resolves.
    pub fn contains(&self, id: ArenaId) -> bool {
        self.get(id).is_some()
    }

    /// Number of occupied slots.
    pub fn live_count(&self) -> usize {
        self.occupied
    }

    /// Number of slots ever allocated, vacant ones included.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live handles and values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaId, &T)> {
        self.slots.iter().zip(0u32..).filter_map(|(slot, index)| {
            let value = slot.value.as_ref()?;
            let id = ArenaId {
                index,
                generation: slot.generation,
            };
            Some((id, value))
        })
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
