//! A clustered B+ tree table file: full tuples live in the leaves, sorted
//! by one key field, with an ordered leaf chain for scans and a free list
//! for page reuse.
//!
//! All page access goes through the buffer pool, shared for descents and
//! exclusive for structural changes, so concurrent workloads serialize
//! under two-phase locking and a deadlock victim sees `Abort` and can
//! retry with a fresh transaction. Allocation state (free list, page
//! count) lives on the header page and therefore rolls back with the rest
//! of a transaction's dirty pages.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::Perm;
use crate::common::{page_size, DbError, PageId, Result, TransactionId};
use crate::database::Database;
use crate::storage::{DbFile, FileIterator};
use crate::tuple::{Field, FieldType, Schema, Tuple};

use super::btree_iterator::{BTreeFileIterator, IndexPredicate};
use super::btree_page::{
    page_kind, BTreeHeaderPage, BTreeInternalPage, BTreeLeafPage, FreePage, NodeKind, NO_PAGE,
};

/// The header page always occupies page number zero.
const HEADER_PAGE_NO: u32 = 0;

pub struct BTreeFile {
    id: u32,
    path: PathBuf,
    file: Mutex<std::fs::File>,
    schema: Arc<Schema>,
    key_field: usize,
}

impl BTreeFile {
    /// Opens (or creates) a B+ tree file keyed on `key_field`.
    pub fn open<P: AsRef<Path>>(path: P, schema: Arc<Schema>, key_field: usize) -> Result<Self> {
        assert!(key_field < schema.num_fields(), "key field out of range");
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let id = crate::storage::heap_file::table_id_for_path(&path);
        let tree = Self {
            id,
            path,
            file: Mutex::new(file),
            schema,
            key_field,
        };
        if tree.physical_pages()? == 0 {
            let header = BTreeHeaderPage::init();
            tree.write_page(PageId::new(tree.id, HEADER_PAGE_NO), &header.into_bytes())?;
        }
        Ok(tree)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key_field(&self) -> usize {
        self.key_field
    }

    fn physical_pages(&self) -> Result<u32> {
        let file = self.file.lock();
        Ok((file.metadata()?.len() / page_size() as u64) as u32)
    }

    /// Opens an ordered iterator over the tuples matching `key op operand`.
    pub fn index_iterator(
        &self,
        db: Arc<Database>,
        tid: TransactionId,
        predicate: IndexPredicate,
    ) -> Box<dyn FileIterator> {
        Box::new(BTreeFileIterator::new(
            TreeOp::new(db, tid, self.id, self.schema.clone(), self.key_field),
            Some(predicate),
        ))
    }
}

impl DbFile for BTreeFile {
    fn id(&self) -> u32 {
        self.id
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn num_pages(&self) -> Result<u32> {
        self.physical_pages()
    }

    fn read_page(&self, pid: PageId) -> Result<Vec<u8>> {
        let mut data = vec![0u8; page_size()];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(pid.page_no as u64 * page_size() as u64))?;
        let mut filled = 0;
        while filled < data.len() {
            let n = file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(data)
    }

    fn write_page(&self, pid: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), page_size(), "buffer must be page-sized");
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(pid.page_no as u64 * page_size() as u64))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    fn insert_tuple(
        &self,
        db: &Arc<Database>,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageId>> {
        if tuple.schema().as_ref() != self.schema.as_ref() {
            return Err(DbError::Db(
                "tuple schema does not match index schema".to_string(),
            ));
        }
        let mut op = TreeOp::new(db.clone(), tid, self.id, self.schema.clone(), self.key_field);
        op.insert(tuple)?;
        Ok(op.into_dirty())
    }

    fn delete_tuple(
        &self,
        db: &Arc<Database>,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageId>> {
        let rid = tuple
            .record_id()
            .ok_or_else(|| DbError::Db("cannot delete a tuple without a record id".to_string()))?;
        if rid.page_id.table != self.id {
            return Err(DbError::TableMismatch {
                expected: self.id,
                actual: rid.page_id.table,
            });
        }
        let mut op = TreeOp::new(db.clone(), tid, self.id, self.schema.clone(), self.key_field);
        op.delete(tuple, rid.page_id.page_no)?;
        Ok(op.into_dirty())
    }

    fn iterator(&self, db: Arc<Database>, tid: TransactionId) -> Box<dyn FileIterator> {
        Box::new(BTreeFileIterator::new(
            TreeOp::new(db, tid, self.id, self.schema.clone(), self.key_field),
            None,
        ))
    }
}

/// One tree operation's working state: page access on behalf of a
/// transaction plus the set of pages it has dirtied.
pub(crate) struct TreeOp {
    db: Arc<Database>,
    tid: TransactionId,
    table_id: u32,
    schema: Arc<Schema>,
    key_field: usize,
    dirty: Vec<PageId>,
}

impl TreeOp {
    pub(crate) fn new(
        db: Arc<Database>,
        tid: TransactionId,
        table_id: u32,
        schema: Arc<Schema>,
        key_field: usize,
    ) -> Self {
        Self {
            db,
            tid,
            table_id,
            schema,
            key_field,
            dirty: Vec::new(),
        }
    }

    pub(crate) fn table_id(&self) -> u32 {
        self.table_id
    }

    pub(crate) fn key_field(&self) -> usize {
        self.key_field
    }

    fn key_type(&self) -> FieldType {
        self.schema.field_type(self.key_field)
    }

    fn pid(&self, page_no: u32) -> PageId {
        PageId::new(self.table_id, page_no)
    }

    fn get(&self, page_no: u32, perm: Perm) -> Result<Vec<u8>> {
        self.db
            .buffer_pool()
            .get_page(&self.db, self.tid, self.pid(page_no), perm)
    }

    fn put(&mut self, page_no: u32, data: Vec<u8>) -> Result<()> {
        let pid = self.pid(page_no);
        self.db.buffer_pool().put_page(self.tid, pid, data)?;
        if !self.dirty.contains(&pid) {
            self.dirty.push(pid);
        }
        Ok(())
    }

    fn into_dirty(self) -> Vec<PageId> {
        self.dirty
    }

    fn header(&self, perm: Perm) -> Result<BTreeHeaderPage> {
        BTreeHeaderPage::new(self.get(HEADER_PAGE_NO, perm)?)
    }

    pub(crate) fn leaf(&self, page_no: u32, perm: Perm) -> Result<BTreeLeafPage> {
        BTreeLeafPage::new(
            page_no,
            self.schema.clone(),
            self.key_field,
            self.get(page_no, perm)?,
        )
    }

    fn internal(&self, page_no: u32, perm: Perm) -> Result<BTreeInternalPage> {
        BTreeInternalPage::new(page_no, self.key_type(), self.get(page_no, perm)?)
    }

    /// Pops a page off the free list, or extends the logical page count.
    fn alloc(&mut self) -> Result<u32> {
        let mut header = self.header(Perm::ReadWrite)?;
        let page_no = if header.free_head() != NO_PAGE {
            let page_no = header.free_head();
            let free = FreePage::new(self.get(page_no, Perm::ReadWrite)?)?;
            header.set_free_head(free.next_free());
            page_no
        } else {
            let page_no = header.num_pages();
            header.set_num_pages(page_no + 1);
            // Take the exclusive lock on the fresh page before it is
            // written; the read zero-fills past the end of the file.
            self.get(page_no, Perm::ReadWrite)?;
            page_no
        };
        self.put(HEADER_PAGE_NO, header.into_bytes())?;
        Ok(page_no)
    }

    /// Returns a page to the free list for reuse by later allocations.
    fn free(&mut self, page_no: u32) -> Result<()> {
        let mut header = self.header(Perm::ReadWrite)?;
        let free = FreePage::init(header.free_head());
        self.put(page_no, free.into_bytes())?;
        header.set_free_head(page_no);
        self.put(HEADER_PAGE_NO, header.into_bytes())?;
        Ok(())
    }

    pub(crate) fn root(&self) -> Result<u32> {
        Ok(self.header(Perm::ReadOnly)?.root())
    }

    /// Descends from the root to the leaf that may contain `key`; `None`
    /// descends to the leftmost leaf. Internal pages are read shared.
    pub(crate) fn find_leaf(&self, key: Option<&Field>) -> Result<u32> {
        let mut current = self.root()?;
        if current == NO_PAGE {
            return Ok(NO_PAGE);
        }
        loop {
            let data = self.get(current, Perm::ReadOnly)?;
            match page_kind(&data)? {
                NodeKind::Leaf => return Ok(current),
                NodeKind::Internal => {
                    let node = BTreeInternalPage::new(current, self.key_type(), data)?;
                    let index = match key {
                        Some(key) => node.child_index_for(key)?,
                        None => 0,
                    };
                    current = node.child(index);
                }
                NodeKind::Free => {
                    return Err(DbError::Db(format!(
                        "descent reached free page {current}"
                    )))
                }
            }
        }
    }

    fn set_parent_of(&mut self, page_no: u32, parent: u32) -> Result<()> {
        let data = self.get(page_no, Perm::ReadWrite)?;
        match page_kind(&data)? {
            NodeKind::Leaf => {
                let mut leaf =
                    BTreeLeafPage::new(page_no, self.schema.clone(), self.key_field, data)?;
                leaf.set_parent(parent);
                self.put(page_no, leaf.into_bytes())
            }
            NodeKind::Internal => {
                let mut node = BTreeInternalPage::new(page_no, self.key_type(), data)?;
                node.set_parent(parent);
                self.put(page_no, node.into_bytes())
            }
            NodeKind::Free => Err(DbError::Db(format!(
                "page {page_no} freed while still referenced"
            ))),
        }
    }

    fn key_of(&self, tuple: &Tuple) -> Field {
        tuple.field(self.key_field).clone()
    }

    pub(crate) fn insert(&mut self, tuple: &Tuple) -> Result<()> {
        let key = self.key_of(tuple);
        if self.root()? == NO_PAGE {
            // First tuple: the tree becomes a single root leaf.
            let leaf_no = self.alloc()?;
            let mut leaf = BTreeLeafPage::init(leaf_no, self.schema.clone(), self.key_field);
            leaf.set_tuples(std::slice::from_ref(tuple));
            self.put(leaf_no, leaf.into_bytes())?;
            let mut header = self.header(Perm::ReadWrite)?;
            header.set_root(leaf_no);
            self.put(HEADER_PAGE_NO, header.into_bytes())?;
            return Ok(());
        }

        let leaf_no = self.find_leaf(Some(&key))?;
        let leaf = self.leaf(leaf_no, Perm::ReadWrite)?;
        let mut tuples = leaf.tuples(self.table_id)?;
        // Duplicates insert after their equals, keeping order stable.
        let pos = tuples
            .iter()
            .position(|t| key < self.key_of(t))
            .unwrap_or(tuples.len());
        tuples.insert(pos, tuple.clone());

        if tuples.len() <= BTreeLeafPage::capacity(&self.schema) {
            let mut leaf = leaf;
            leaf.set_tuples(&tuples);
            self.put(leaf_no, leaf.into_bytes())?;
            return Ok(());
        }

        self.split_leaf(leaf, tuples)
    }

    fn split_leaf(&mut self, leaf: BTreeLeafPage, mut tuples: Vec<Tuple>) -> Result<()> {
        let leaf_no = leaf.page_no();
        let right_tuples = tuples.split_off(tuples.len() / 2);
        let right_no = self.alloc()?;

        let mut left = leaf;
        let old_next = left.next();
        let parent_no = left.parent();
        left.set_tuples(&tuples);
        left.set_next(right_no);
        self.put(leaf_no, left.into_bytes())?;

        let mut right = BTreeLeafPage::init(right_no, self.schema.clone(), self.key_field);
        right.set_tuples(&right_tuples);
        right.set_prev(leaf_no);
        right.set_next(old_next);
        right.set_parent(parent_no);
        self.put(right_no, right.into_bytes())?;

        if old_next != NO_PAGE {
            let mut next = self.leaf(old_next, Perm::ReadWrite)?;
            next.set_prev(right_no);
            self.put(old_next, next.into_bytes())?;
        }

        // Separator is the largest key left behind; equal keys route left.
        let separator = self.key_of(tuples.last().expect("left half is never empty"));
        self.insert_into_parent(leaf_no, separator, right_no, parent_no)
    }

    fn insert_into_parent(
        &mut self,
        left_no: u32,
        separator: Field,
        right_no: u32,
        parent_no: u32,
    ) -> Result<()> {
        if parent_no == NO_PAGE {
            // The split node was the root: grow the tree by one level.
            let root_no = self.alloc()?;
            let mut root = BTreeInternalPage::init(root_no, self.key_type());
            root.set_entries(&[separator], &[left_no, right_no]);
            self.put(root_no, root.into_bytes())?;
            self.set_parent_of(left_no, root_no)?;
            self.set_parent_of(right_no, root_no)?;
            let mut header = self.header(Perm::ReadWrite)?;
            header.set_root(root_no);
            self.put(HEADER_PAGE_NO, header.into_bytes())?;
            return Ok(());
        }

        let parent = self.internal(parent_no, Perm::ReadWrite)?;
        let mut keys = parent.keys()?;
        let mut children = parent.children();
        let index = parent.position_of_child(left_no)?;
        keys.insert(index, separator);
        children.insert(index + 1, right_no);
        self.set_parent_of(right_no, parent_no)?;

        if keys.len() <= BTreeInternalPage::capacity(self.key_type()) {
            let mut parent = parent;
            parent.set_entries(&keys, &children);
            self.put(parent_no, parent.into_bytes())?;
            return Ok(());
        }

        // Split the internal node; the middle key moves up, not across.
        let mid = keys.len() / 2;
        let promoted = keys[mid].clone();
        let right_keys = keys[mid + 1..].to_vec();
        let right_children = children[mid + 1..].to_vec();
        let left_keys = keys[..mid].to_vec();
        let left_children = children[..=mid].to_vec();

        let new_no = self.alloc()?;
        let grandparent = parent.parent();

        let mut left = parent;
        left.set_entries(&left_keys, &left_children);
        self.put(parent_no, left.into_bytes())?;

        let mut new_node = BTreeInternalPage::init(new_no, self.key_type());
        new_node.set_entries(&right_keys, &right_children);
        new_node.set_parent(grandparent);
        self.put(new_no, new_node.into_bytes())?;
        for &child in &right_children {
            self.set_parent_of(child, new_no)?;
        }

        self.insert_into_parent(parent_no, promoted, new_no, grandparent)
    }

    pub(crate) fn delete(&mut self, tuple: &Tuple, leaf_no: u32) -> Result<()> {
        let leaf = self.leaf(leaf_no, Perm::ReadWrite)?;
        let mut tuples = leaf.tuples(self.table_id)?;
        let pos = tuples
            .iter()
            .position(|t| t.fields() == tuple.fields())
            .ok_or_else(|| DbError::Db(format!("tuple not found in leaf {leaf_no}")))?;
        tuples.remove(pos);

        if !tuples.is_empty() || leaf.parent() == NO_PAGE {
            // An empty root leaf stays in place; the tree is just empty.
            let mut leaf = leaf;
            leaf.set_tuples(&tuples);
            self.put(leaf_no, leaf.into_bytes())?;
            return Ok(());
        }

        // The leaf emptied: unlink it from the sibling chain, drop it from
        // its parent and put the page up for reuse.
        let prev = leaf.prev();
        let next = leaf.next();
        let parent_no = leaf.parent();
        if prev != NO_PAGE {
            let mut prev_leaf = self.leaf(prev, Perm::ReadWrite)?;
            prev_leaf.set_next(next);
            self.put(prev, prev_leaf.into_bytes())?;
        }
        if next != NO_PAGE {
            let mut next_leaf = self.leaf(next, Perm::ReadWrite)?;
            next_leaf.set_prev(prev);
            self.put(next, next_leaf.into_bytes())?;
        }
        self.remove_from_parent(parent_no, leaf_no)?;
        self.free(leaf_no)
    }

    fn remove_from_parent(&mut self, parent_no: u32, child_no: u32) -> Result<()> {
        let parent = self.internal(parent_no, Perm::ReadWrite)?;
        let mut keys = parent.keys()?;
        let mut children = parent.children();
        let index = parent.position_of_child(child_no)?;
        children.remove(index);
        if !keys.is_empty() {
            // Dropping the last child consumes the separator to its left.
            if index < keys.len() {
                keys.remove(index);
            } else {
                keys.remove(index - 1);
            }
        }

        if children.is_empty() {
            let grandparent = parent.parent();
            if grandparent == NO_PAGE {
                let mut header = self.header(Perm::ReadWrite)?;
                header.set_root(NO_PAGE);
                self.put(HEADER_PAGE_NO, header.into_bytes())?;
            } else {
                self.remove_from_parent(grandparent, parent_no)?;
            }
            return self.free(parent_no);
        }

        if children.len() == 1 && parent.parent() == NO_PAGE {
            // A root with a single child collapses into it.
            let child = children[0];
            self.set_parent_of(child, NO_PAGE)?;
            let mut header = self.header(Perm::ReadWrite)?;
            header.set_root(child);
            self.put(HEADER_PAGE_NO, header.into_bytes())?;
            return self.free(parent_no);
        }

        let mut parent = parent;
        parent.set_entries(&keys, &children);
        self.put(parent_no, parent.into_bytes())
    }
}
