//! Shared-memory hash index over a memory-mapped file.
//!
//! The file starts with a two-byte magic, then a flat table of fixed-size
//! records. A key hashes to a bucket; collisions chain through `next_offset`
//! links appended right after the colliding record. Record ownership is
//! claimed by a compare-and-swap of the owner pid in the record head, so
//! cooperating processes mapping the same file can interleave inserts.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use thiserror::Error;

const MAGIC: [u8; 2] = [0x2f, 0x01];
const FREE_PID: u16 = 0;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("record with key '{0}' exists")]
    Conflict(String),
    #[error("index file has no room for a record at offset {offset}")]
    Full { offset: usize },
    #[error("index length {length} does not fit the {hash_len}-character hash")]
    IndexLength { length: usize, hash_len: usize },
    #[error("record at offset {offset} still held after {spins} attempts")]
    Busy { offset: usize, spins: u64 },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

/// Key-hash function: any stable hex digest works. The digest length fixes
/// the record size, probed once at construction.
pub type KeyHashFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

fn sha256_hex(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

pub struct IndexOptions {
    /// Leading hex digits of the digest that select the bucket; the table
    /// holds `16^index_length` buckets.
    pub index_length: usize,
    /// Give up claiming a record after this many attempts. `None` spins
    /// until the holder releases.
    pub max_spin: Option<u64>,
    pub hash: KeyHashFn,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            index_length: 2,
            max_spin: None,
            hash: Arc::new(sha256_hex),
        }
    }
}

struct MmapRegion {
    ptr: *mut u8,
    len: usize,
}

// The region is a plain byte range; synchronization is the index's job.
unsafe impl Send for MmapRegion {}
unsafe impl Sync for MmapRegion {}

impl MmapRegion {
    fn map(file: &File, len: usize) -> Result<MmapRegion, IndexError> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(MmapRegion {
            ptr: ptr as *mut u8,
            len,
        })
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

/// Ownership of one record head; the pid slot is released on drop.
struct RecordClaim<'a> {
    index: &'a SharedIndex,
    offset: usize,
}

impl Drop for RecordClaim<'_> {
    fn drop(&mut self) {
        self.index
            .pid_slot(self.offset)
            .store(FREE_PID, Ordering::Release);
    }
}

struct Record {
    pid: u16,
    filled: bool,
    hash: Vec<u8>,
    value: u32,
    next: u32,
}

/// Hash index shared through a mapped file. Insert-only for now.
pub struct SharedIndex {
    _file: File,
    map: MmapRegion,
    hash: KeyHashFn,
    hash_len: usize,
    index_length: usize,
    record_size: usize,
    table_offset: usize,
    max_spin: Option<u64>,
}

impl SharedIndex {
    pub fn create(path: &Path, options: IndexOptions) -> Result<SharedIndex, IndexError> {
        let hash_len = (options.hash)("test_length").len();
        if options.index_length == 0 || options.index_length > hash_len {
            return Err(IndexError::IndexLength {
                length: options.index_length,
                hash_len,
            });
        }
        // pid + filled + hash + value pointer + next offset, rounded up so
        // every pid slot stays 2-byte aligned for the atomic claim.
        let record_size = (2 + 1 + hash_len + 4 + 4 + 1) & !1;
        let buckets = 16usize.pow(options.index_length as u32);
        let table_size = record_size * buckets;
        let total = MAGIC.len() + table_size * buckets;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&MAGIC)?;
        file.flush()?;
        file.set_len(total as u64)?;
        let map = MmapRegion::map(&file, total)?;

        Ok(SharedIndex {
            _file: file,
            map,
            hash: options.hash,
            hash_len,
            index_length: options.index_length,
            record_size,
            table_offset: MAGIC.len(),
            max_spin: options.max_spin,
        })
    }

    pub fn file_size(&self) -> usize {
        self.map.len
    }

    /// Map a key to a data pointer. Returns the offset of the record that
    /// took the key. A key whose digest is already present conflicts.
    pub fn insert(&self, key: &str, value: u32) -> Result<usize, IndexError> {
        let digest = (self.hash)(key);
        let bucket = usize::from_str_radix(&digest[..self.index_length], 16)
            .unwrap_or(0);
        let offset = bucket * self.record_size + self.table_offset;
        self.find_and_insert(key, value, digest.as_bytes(), offset)
    }

    pub fn get(&self, _key: &str) -> Result<u32, IndexError> {
        Err(IndexError::NotImplemented("index get"))
    }

    pub fn delete(&self, _key: &str) -> Result<(), IndexError> {
        Err(IndexError::NotImplemented("index delete"))
    }

    fn find_and_insert(
        &self,
        key: &str,
        value: u32,
        key_hash: &[u8],
        offset: usize,
    ) -> Result<usize, IndexError> {
        if offset + self.record_size > self.map.len {
            return Err(IndexError::Full { offset });
        }
        let next = {
            let _claim = self.claim(offset)?;
            let rec = self.read_record(offset);

            if !rec.filled {
                self.write_record(offset, true, key_hash, value, 0);
                return Ok(offset);
            }
            if rec.hash == key_hash {
                return Err(IndexError::Conflict(key.to_string()));
            }
            if rec.next == 0 {
                let appended =
                    self.find_and_insert(key, value, key_hash, offset + self.record_size)?;
                self.write_record(offset, true, &rec.hash, rec.value, appended as u32);
                return Ok(appended);
            }
            rec.next as usize
        };
        // Chained record with a different hash: follow the link unclaimed.
        self.find_and_insert(key, value, key_hash, next)
    }

    /// Claim the record head by compare-and-swapping our pid into a free
    /// slot. The swap is atomic on the mapped memory, so it excludes other
    /// processes sharing the file, not just other threads. The claim
    /// releases on drop even when the insert fails.
    fn claim(&self, offset: usize) -> Result<RecordClaim<'_>, IndexError> {
        let pid = (std::process::id() as u16).max(1);
        let slot = self.pid_slot(offset);
        let mut spins = 0u64;
        loop {
            if slot
                .compare_exchange(FREE_PID, pid, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(RecordClaim {
                    index: self,
                    offset,
                });
            }
            spins += 1;
            if let Some(max) = self.max_spin {
                if spins >= max {
                    return Err(IndexError::Busy { offset, spins });
                }
            }
            std::hint::spin_loop();
        }
    }

    /// The record's owner-pid field viewed as an atomic. Record offsets are
    /// even (even record size after a two-byte header), so the slot is
    /// aligned.
    fn pid_slot(&self, offset: usize) -> &AtomicU16 {
        debug_assert!(offset + 2 <= self.map.len);
        debug_assert_eq!(offset % 2, 0);
        unsafe { AtomicU16::from_ptr(self.map.ptr.add(offset) as *mut u16) }
    }

    fn read_record(&self, offset: usize) -> Record {
        let hash_start = offset + 3;
        Record {
            pid: self.pid_slot(offset).load(Ordering::Acquire),
            filled: self.read_byte(offset + 2) != 0,
            hash: self.read_bytes(hash_start, self.hash_len),
            value: self.read_u32(hash_start + self.hash_len),
            next: self.read_u32(hash_start + self.hash_len + 4),
        }
    }

    /// Write the record body. The pid slot is owned by the claim and never
    /// touched here.
    fn write_record(&self, offset: usize, filled: bool, hash: &[u8], value: u32, next: u32) {
        let hash_start = offset + 3;
        self.write_byte(offset + 2, filled as u8);
        self.write_bytes(hash_start, hash);
        self.write_u32(hash_start + self.hash_len, value);
        self.write_u32(hash_start + self.hash_len + 4, next);
    }

    fn read_byte(&self, offset: usize) -> u8 {
        debug_assert!(offset < self.map.len);
        unsafe { self.map.ptr.add(offset).read() }
    }

    fn write_byte(&self, offset: usize, v: u8) {
        debug_assert!(offset < self.map.len);
        unsafe { self.map.ptr.add(offset).write(v) }
    }

    fn read_bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        (offset..offset + len).map(|o| self.read_byte(o)).collect()
    }

    fn write_bytes(&self, offset: usize, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.write_byte(offset + i, *b);
        }
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let b = self.read_bytes(offset, 4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn write_u32(&self, offset: usize, v: u32) {
        self.write_bytes(offset, &v.to_le_bytes());
    }
}
