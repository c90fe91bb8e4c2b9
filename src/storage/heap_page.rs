use std::sync::Arc;

use crate::common::{page_size, DbError, PageId, RecordId, Result};
use crate::tuple::{Schema, Tuple};

/// Heap page layout:
///
/// +------------------+
/// | Header Bitmap    |  ceil(N/8) bytes, bit i set <=> slot i occupied
/// +------------------+
/// | Tuple Slot 0     |  tuple_size bytes each, fixed offsets
/// | Tuple Slot 1     |
/// | ...              |
/// | Tuple Slot N-1   |
/// +------------------+
/// | Zero Padding     |
/// +------------------+
///
/// N is the largest count such that ceil(N/8) + N * tuple_size fits the
/// page. Bitmap byte i, bit j addresses slot 8*i + j. Empty slots read as
/// zero bytes, so inserting and then deleting a tuple restores the page
/// byte for byte.
pub struct HeapPage {
    pid: PageId,
    schema: Arc<Schema>,
    data: Vec<u8>,
}

/// Returns the number of tuple slots a heap page holds for tuples of the
/// given size.
pub fn slots_per_page(tuple_size: usize) -> usize {
    (page_size() * 8) / (tuple_size * 8 + 1)
}

/// Returns the size in bytes of the slot bitmap for `slots` slots.
pub fn header_size(slots: usize) -> usize {
    (slots + 7) / 8
}

impl HeapPage {
    /// Creates a view over an existing page image.
    ///
    /// # Panics
    /// Panics if `data` is not exactly one page long.
    pub fn new(pid: PageId, schema: Arc<Schema>, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), page_size(), "buffer must be page-sized");
        Self { pid, schema, data }
    }

    /// Creates a fresh, all-empty page.
    pub fn empty(pid: PageId, schema: Arc<Schema>) -> Self {
        Self {
            pid,
            schema,
            data: vec![0u8; page_size()],
        }
    }

    pub fn pid(&self) -> PageId {
        self.pid
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the view, returning the page image.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn tuple_size(&self) -> usize {
        self.schema.byte_size()
    }

    /// Returns the total number of tuple slots on this page.
    pub fn num_slots(&self) -> usize {
        slots_per_page(self.tuple_size())
    }

    /// Returns whether the slot's header bit is set.
    pub fn is_slot_used(&self, slot: usize) -> bool {
        debug_assert!(slot < self.num_slots());
        self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.data[slot / 8] |= mask;
        } else {
            self.data[slot / 8] &= !mask;
        }
    }

    fn slot_offset(&self, slot: usize) -> usize {
        header_size(self.num_slots()) + slot * self.tuple_size()
    }

    /// Returns the number of slots with cleared bits.
    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots())
            .filter(|&s| !self.is_slot_used(s))
            .count()
    }

    /// Inserts a tuple into the lowest-numbered empty slot and returns the
    /// slot index.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<u16> {
        if tuple.schema().as_ref() != self.schema.as_ref() {
            return Err(DbError::Db(
                "tuple schema does not match page schema".to_string(),
            ));
        }
        let slot = (0..self.num_slots())
            .find(|&s| !self.is_slot_used(s))
            .ok_or(DbError::PageFull(self.pid))?;

        let bytes = tuple.to_bytes();
        let offset = self.slot_offset(slot);
        self.data[offset..offset + bytes.len()].copy_from_slice(&bytes);
        self.set_slot(slot, true);
        Ok(slot as u16)
    }

    /// Clears the slot named by `rid` and zeroes its payload.
    pub fn delete_tuple(&mut self, rid: RecordId) -> Result<()> {
        if rid.page_id != self.pid {
            return Err(DbError::Db(format!(
                "record {} does not live on page {}",
                rid, self.pid
            )));
        }
        let slot = rid.slot as usize;
        if slot >= self.num_slots() || !self.is_slot_used(slot) {
            return Err(DbError::Db(format!("slot {} is not occupied", slot)));
        }
        let offset = self.slot_offset(slot);
        let size = self.tuple_size();
        self.data[offset..offset + size].fill(0);
        self.set_slot(slot, false);
        Ok(())
    }

    /// Reads the tuple in the given occupied slot, stamped with its record
    /// identity.
    pub fn tuple_at(&self, slot: usize) -> Result<Tuple> {
        if slot >= self.num_slots() || !self.is_slot_used(slot) {
            return Err(DbError::Db(format!("slot {} is not occupied", slot)));
        }
        let offset = self.slot_offset(slot);
        let mut tuple = Tuple::from_bytes(self.schema.clone(), &self.data[offset..])?;
        tuple.set_record_id(Some(RecordId::new(self.pid, slot as u16)));
        Ok(tuple)
    }

    /// Returns every tuple on the page in slot order, skipping empty slots.
    pub fn tuples(&self) -> Result<Vec<Tuple>> {
        (0..self.num_slots())
            .filter(|&s| self.is_slot_used(s))
            .map(|s| self.tuple_at(s))
            .collect()
    }
}
