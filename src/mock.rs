//! Scripted in-memory transport for tests and examples.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::transport::{Transport, TransportError};

#[derive(Debug, Default)]
struct Inner {
    registers: BTreeMap<u16, u16>,
    fail_reads: HashSet<u16>,
    truncate_reads: HashSet<u16>,
    fail_all: bool,
    reads: Vec<(u16, u16)>,
    writes: Vec<(u16, Vec<u16>)>,
}

/// An in-memory register bank implementing [`Transport`].
///
/// Clones share state, so a test can hand one handle to the code under test
/// and keep another to script register values and failures between polls.
/// Unseeded registers read as zero.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store consecutive words starting at `address`.
    pub fn set_words(&self, address: u16, words: &[u16]) {
        let mut inner = self.lock();
        for (i, word) in words.iter().enumerate() {
            inner.registers.insert(address + i as u16, *word);
        }
    }

    /// Make the read that starts at `address` fail.
    pub fn fail_read(&self, address: u16) {
        self.lock().fail_reads.insert(address);
    }

    /// Make every read and write fail.
    pub fn fail_all(&self) {
        self.lock().fail_all = true;
    }

    /// Make the read that starts at `address` come back one word short.
    pub fn truncate_read(&self, address: u16) {
        self.lock().truncate_reads.insert(address);
    }

    /// Clear all injected failures.
    pub fn heal(&self) {
        let mut inner = self.lock();
        inner.fail_all = false;
        inner.fail_reads.clear();
        inner.truncate_reads.clear();
    }

    /// Address and count of every read issued so far.
    pub fn reads(&self) -> Vec<(u16, u16)> {
        self.lock().reads.clone()
    }

    /// Address and words of every write issued so far.
    pub fn writes(&self) -> Vec<(u16, Vec<u16>)> {
        self.lock().writes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Transport for MockTransport {
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, TransportError> {
        let mut inner = self.lock();
        inner.reads.push((address, count));
        if inner.fail_all || inner.fail_reads.contains(&address) {
            return Err(TransportError(format!("injected failure at {address}")));
        }
        let count = if inner.truncate_reads.contains(&address) {
            count.saturating_sub(1)
        } else {
            count
        };
        Ok((0..count)
            .map(|i| inner.registers.get(&(address + i)).copied().unwrap_or(0))
            .collect())
    }

    fn write_registers(&mut self, address: u16, words: &[u16]) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if inner.fail_all {
            return Err(TransportError(format!("injected failure at {address}")));
        }
        inner.writes.push((address, words.to_vec()));
        for (i, word) in words.iter().enumerate() {
            inner.registers.insert(address + i as u16, *word);
        }
        Ok(())
    }
}
