use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::Perm;
use crate::common::{page_size, DbError, PageId, Result, TransactionId};
use crate::database::Database;
use crate::tuple::{Schema, Tuple};

use super::heap_page::HeapPage;
use super::{DbFile, FileIterator};

/// An unordered table stored as a sequence of fixed-size bitmap-slotted
/// pages. The byte offset of page n is simply n * page_size; the file has
/// no header and its length is always a multiple of the page size.
pub struct HeapFile {
    id: u32,
    path: PathBuf,
    file: Mutex<File>,
    schema: Arc<Schema>,
}

/// Derives the table id from the file's absolute path, so reopening the
/// same file always yields the same id.
pub(crate) fn table_id_for_path(path: &Path) -> u32 {
    let absolute = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = DefaultHasher::new();
    absolute.hash(&mut hasher);
    hasher.finish() as u32
}

impl HeapFile {
    /// Opens (or creates) the heap file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, schema: Arc<Schema>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let id = table_id_for_path(&path);
        Ok(Self {
            id,
            path,
            file: Mutex::new(file),
            schema,
        })
    }

    /// Creates a heap file seeded with one empty page, the canonical shape
    /// of a freshly created table.
    pub fn create<P: AsRef<Path>>(path: P, schema: Arc<Schema>) -> Result<Self> {
        let heap = Self::open(path, schema)?;
        if heap.num_pages()? == 0 {
            let page = HeapPage::empty(PageId::new(heap.id, 0), heap.schema.clone());
            heap.write_page(page.pid(), page.bytes())?;
        }
        Ok(heap)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DbFile for HeapFile {
    fn id(&self) -> u32 {
        self.id
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn num_pages(&self) -> Result<u32> {
        let file = self.file.lock();
        let len = file.metadata()?.len();
        debug_assert_eq!(len % page_size() as u64, 0, "file length must be page-aligned");
        Ok((len / page_size() as u64) as u32)
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
        // Reads past the end of the file leave the remainder zeroed.
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
        let num_pages = self.num_pages()?;
        for page_no in 0..num_pages {
            let pid = PageId::new(self.id, page_no);
            let bytes = db.buffer_pool().get_page(db, tid, pid, Perm::ReadWrite)?;
            let mut page = HeapPage::new(pid, self.schema.clone(), bytes);
            if page.num_empty_slots() == 0 {
                continue;
            }
            page.insert_tuple(tuple)?;
            db.buffer_pool().put_page(tid, pid, page.into_bytes())?;
            return Ok(vec![pid]);
        }

        // Every existing page is full: extend the file with a fresh page.
        // The new page is written straight to disk and not installed in the
        // pool; the next scan reads it back through the pool.
        let pid = PageId::new(self.id, num_pages);
        let mut page = HeapPage::empty(pid, self.schema.clone());
        page.insert_tuple(tuple)?;
        self.write_page(pid, page.bytes())?;
        Ok(Vec::new())
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
        let pid = rid.page_id;
        let bytes = db.buffer_pool().get_page(db, tid, pid, Perm::ReadWrite)?;
        let mut page = HeapPage::new(pid, self.schema.clone(), bytes);
        page.delete_tuple(rid)?;
        db.buffer_pool().put_page(tid, pid, page.into_bytes())?;
        Ok(vec![pid])
    }

    fn iterator(&self, db: Arc<Database>, tid: TransactionId) -> Box<dyn FileIterator> {
        Box::new(HeapFileIterator {
            db,
            tid,
            table_id: self.id,
            schema: self.schema.clone(),
            num_pages: 0,
            next_page: 0,
            tuples: Vec::new(),
            index: 0,
            opened: false,
        })
    }
}

/// Scans a heap file in page-number order, fetching each page through the
/// buffer pool with shared access and skipping empty slots.
struct HeapFileIterator {
    db: Arc<Database>,
    tid: TransactionId,
    table_id: u32,
    schema: Arc<Schema>,
    num_pages: u32,
    next_page: u32,
    tuples: Vec<Tuple>,
    index: usize,
    opened: bool,
}

impl HeapFileIterator {
    fn load_page(&mut self, page_no: u32) -> Result<()> {
        let pid = PageId::new(self.table_id, page_no);
        let bytes = self
            .db
            .buffer_pool()
            .get_page(&self.db, self.tid, pid, Perm::ReadOnly)?;
        let page = HeapPage::new(pid, self.schema.clone(), bytes);
        self.tuples = page.tuples()?;
        self.index = 0;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        let file = self.db.catalog().file(self.table_id)?;
        self.num_pages = file.num_pages()?;
        self.next_page = 0;
        self.tuples.clear();
        self.index = 0;
        if self.num_pages > 0 {
            self.load_page(0)?;
            self.next_page = 1;
        }
        self.opened = true;
        Ok(())
    }
}

impl FileIterator for HeapFileIterator {
    fn open(&mut self) -> Result<()> {
        self.reset()
    }

    fn has_next(&mut self) -> Result<bool> {
        if !self.opened {
            return Ok(false);
        }
        while self.index >= self.tuples.len() {
            if self.next_page >= self.num_pages {
                return Ok(false);
            }
            let page_no = self.next_page;
            self.next_page += 1;
            self.load_page(page_no)?;
        }
        Ok(true)
    }

    fn next(&mut self) -> Result<Tuple> {
        if !self.has_next()? {
            return Err(DbError::NoSuchElement);
        }
        let tuple = self.tuples[self.index].clone();
        self.index += 1;
        Ok(tuple)
    }

    fn rewind(&mut self) -> Result<()> {
        self.reset()
    }

    fn close(&mut self) {
        self.opened = false;
        self.tuples.clear();
        self.index = 0;
        self.next_page = 0;
    }
}
