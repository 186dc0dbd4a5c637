//! Channel registry: named byte buffers shared by cycle loops and the
//! transport server.
//!
//! Two independent namespaces, `inputs` and `outputs`, each a concurrent map
//! `name → bytes`. A device unit binds one entry in each under its symbolic
//! name when it starts and removes both when it stops.
//!
//! Every copy replaces the stored buffer wholesale; readers never observe a
//! partially written buffer. Operations are linearizable per name with no
//! ordering across names.

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use thiserror::Error;

/// Errors from channel copy operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// No buffer bound under this name.
    #[error("Channel '{0}' is not bound")]
    NotBound(String),

    /// Source length differs from the bound buffer length.
    #[error("Channel '{name}' size mismatch: bound {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Channel name
        name: String,
        /// Bound buffer length
        expected: usize,
        /// Offered length
        actual: usize,
    },
}

/// Which namespace a map serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Peer → unit.
    Input,
    /// Unit → peer.
    Output,
}

/// One namespace of the registry.
#[derive(Debug, Clone)]
pub struct ChannelMap {
    direction: Direction,
    buffers: Arc<DashMap<String, Bytes>>,
}

impl ChannelMap {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            buffers: Arc::new(DashMap::new()),
        }
    }

    /// Namespace of this map.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Create a zeroed buffer of `size` bytes if `name` is absent.
    ///
    /// Binding an existing name returns a handle to the existing buffer
    /// unchanged; a size disagreement surfaces on the next copy.
    pub fn bind(&self, name: &str, size: usize) -> ChannelHandle {
        if let Entry::Vacant(slot) = self.buffers.entry(name.to_string()) {
            slot.insert(Bytes::from(vec![0u8; size]));
        }
        ChannelHandle {
            map: self.clone(),
            name: Arc::from(name),
        }
    }

    /// Remove `name`. Returns `true` if it was bound.
    pub fn unbind(&self, name: &str) -> bool {
        self.buffers.remove(name).is_some()
    }

    /// Replace the buffer with a copy of `source`.
    ///
    /// # Errors
    /// `NotBound` if absent, `SizeMismatch` if the lengths differ (the
    /// stored buffer is left untouched).
    pub fn copy_in(&self, name: &str, source: &[u8]) -> Result<(), ChannelError> {
        let mut entry = self
            .buffers
            .get_mut(name)
            .ok_or_else(|| ChannelError::NotBound(name.to_string()))?;
        if entry.len() != source.len() {
            return Err(ChannelError::SizeMismatch {
                name: name.to_string(),
                expected: entry.len(),
                actual: source.len(),
            });
        }
        *entry = Bytes::copy_from_slice(source);
        Ok(())
    }

    /// Snapshot of the current buffer.
    pub fn copy_out(&self, name: &str) -> Option<Bytes> {
        self.buffers.get(name).map(|b| b.clone())
    }

    /// Copy the current buffer into `dest` without allocating.
    ///
    /// # Errors
    /// `NotBound` if absent, `SizeMismatch` if `dest` has a different length.
    pub fn read_into(&self, name: &str, dest: &mut [u8]) -> Result<(), ChannelError> {
        let entry = self
            .buffers
            .get(name)
            .ok_or_else(|| ChannelError::NotBound(name.to_string()))?;
        if entry.len() != dest.len() {
            return Err(ChannelError::SizeMismatch {
                name: name.to_string(),
                expected: entry.len(),
                actual: dest.len(),
            });
        }
        dest.copy_from_slice(&entry);
        Ok(())
    }

    /// Bound length of `name`.
    pub fn len_of(&self, name: &str) -> Option<usize> {
        self.buffers.get(name).map(|b| b.len())
    }

    /// `true` if `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }

    /// Currently bound names (unordered).
    pub fn names(&self) -> Vec<String> {
        self.buffers.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of bound channels.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

/// Handle to one bound channel, used by the cycle loop.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    map: ChannelMap,
    name: Arc<str>,
}

impl ChannelHandle {
    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace of the channel.
    pub fn direction(&self) -> Direction {
        self.map.direction
    }

    /// See [`ChannelMap::copy_in`].
    pub fn copy_in(&self, source: &[u8]) -> Result<(), ChannelError> {
        self.map.copy_in(&self.name, source)
    }

    /// See [`ChannelMap::copy_out`].
    pub fn copy_out(&self) -> Option<Bytes> {
        self.map.copy_out(&self.name)
    }

    /// See [`ChannelMap::read_into`].
    pub fn read_into(&self, dest: &mut [u8]) -> Result<(), ChannelError> {
        self.map.read_into(&self.name, dest)
    }
}

/// Process-wide registry passed to every collaborator. Cloning shares state.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    inputs: ChannelMap,
    outputs: ChannelMap,
}

impl ChannelRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            inputs: ChannelMap::new(Direction::Input),
            outputs: ChannelMap::new(Direction::Output),
        }
    }

    /// Peer → unit namespace.
    pub fn inputs(&self) -> &ChannelMap {
        &self.inputs
    }

    /// Unit → peer namespace.
    pub fn outputs(&self) -> &ChannelMap {
        &self.outputs
    }

    /// Bind an input channel (create-if-absent).
    pub fn bind_input(&self, name: &str, size: usize) -> ChannelHandle {
        self.inputs.bind(name, size)
    }

    /// Bind an output channel (create-if-absent).
    pub fn bind_output(&self, name: &str, size: usize) -> ChannelHandle {
        self.outputs.bind(name, size)
    }

    /// Remove `name` from both namespaces. Returns `true` if either existed.
    pub fn unbind(&self, name: &str) -> bool {
        let had_input = self.inputs.unbind(name);
        let had_output = self.outputs.unbind(name);
        had_input || had_output
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn bind_is_create_if_absent() {
        let registry = ChannelRegistry::new();
        let first = registry.bind_output("press", 4);
        first.copy_in(&[1, 2, 3, 4]).unwrap();

        let second = registry.bind_output("press", 8);
        assert_eq!(second.copy_out().unwrap().as_ref(), &[1, 2, 3, 4]);
        assert_eq!(registry.outputs().len_of("press"), Some(4));
    }

    #[test]
    fn size_mismatch_keeps_stale_buffer() {
        let registry = ChannelRegistry::new();
        let input = registry.bind_input("conveyor", 2);
        input.copy_in(&[7, 8]).unwrap();

        let err = input.copy_in(&[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            ChannelError::SizeMismatch {
                name: "conveyor".to_string(),
                expected: 2,
                actual: 3
            }
        );
        assert_eq!(input.copy_out().unwrap().as_ref(), &[7, 8]);
    }

    #[test]
    fn unbind_removes_both_namespaces() {
        let registry = ChannelRegistry::new();
        registry.bind_input("u", 1);
        registry.bind_output("u", 1);
        assert!(registry.unbind("u"));
        assert!(!registry.inputs().contains("u"));
        assert!(!registry.outputs().contains("u"));
        assert!(!registry.unbind("u"));
        assert_eq!(
            registry.outputs().copy_in("u", &[0]),
            Err(ChannelError::NotBound("u".to_string()))
        );
    }

    #[test]
    fn namespaces_are_independent() {
        let registry = ChannelRegistry::new();
        registry.bind_input("u", 1).copy_in(&[1]).unwrap();
        registry.bind_output("u", 1).copy_in(&[2]).unwrap();
        assert_eq!(registry.inputs().copy_out("u").unwrap()[0], 1);
        assert_eq!(registry.outputs().copy_out("u").unwrap()[0], 2);
        assert_eq!(registry.inputs().direction(), Direction::Input);
    }

    #[test]
    fn snapshots_are_not_affected_by_later_copies() {
        let registry = ChannelRegistry::new();
        let out = registry.bind_output("u", 2);
        out.copy_in(&[1, 1]).unwrap();
        let snapshot = out.copy_out().unwrap();
        out.copy_in(&[2, 2]).unwrap();
        assert_eq!(snapshot.as_ref(), &[1, 1]);
    }

    #[test]
    fn concurrent_writers_never_tear_buffers() {
        let registry = ChannelRegistry::new();
        let handle = registry.bind_output("shared", 64);

        let writers: Vec<_> = (0..4u8)
            .map(|id| {
                let h = handle.clone();
                thread::spawn(move || {
                    let buf = [id; 64];
                    for _ in 0..500 {
                        h.copy_in(&buf).unwrap();
                    }
                })
            })
            .collect();

        let mut dest = [0u8; 64];
        for _ in 0..500 {
            handle.read_into(&mut dest).unwrap();
            assert!(dest.iter().all(|b| *b == dest[0]));
        }
        for w in writers {
            w.join().unwrap();
        }
    }
}
