use super::{Session, SessionKey};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Bounded collection of live sessions, in display order.
///
/// One lock covers membership. Lookups are linear: the table is small,
/// and its order is meaningful to whoever displays it.
#[derive(Debug)]
pub struct SessionTable {
    sessions: Mutex<Vec<Arc<Session>>>,
    capacity: usize,
}

impl SessionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    pub fn lookup(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .iter()
            .find(|s| s.key() == *key)
            .cloned()
    }

    /// Finds the live session for `key`, or creates one with `make`.
    ///
    /// Lookup and insertion happen under a single lock hold, so two
    /// receivers racing on one key always agree on the session, and a
    /// session is only visible once `make` has fully built it. A terminated
    /// session still holding the key is joined and replaced in place. The
    /// flag is `true` when the session was created by this call.
    pub fn get_or_insert_with(
        &self,
        key: SessionKey,
        make: impl FnOnce() -> Result<Arc<Session>>,
    ) -> Result<(Arc<Session>, bool)> {
        let mut sessions = self.sessions.lock();

        let slot = match sessions.iter().position(|s| s.key() == key) {
            Some(idx) if !sessions[idx].is_terminating() => {
                return Ok((sessions[idx].clone(), false));
            },
            Some(idx) => {
                sessions[idx].join();
                Some(idx)
            },
            None if sessions.len() >= self.capacity => return Err(Error::TableFull),
            None => None,
        };

        let session = make()?;
        match slot {
            Some(idx) => sessions[idx] = session.clone(),
            None => sessions.push(session.clone()),
        }

        Ok((session, true))
    }

    /// Removes `session`, preserving the order of the rest.
    ///
    /// Matches by identity, so a replacement under the same key is left
    /// alone. Returns whether the session was present.
    pub fn remove(&self, session: &Arc<Session>) -> bool {
        let mut sessions = self.sessions.lock();

        match sessions.iter().position(|s| Arc::ptr_eq(s, session)) {
            Some(idx) => {
                sessions.remove(idx);
                true
            },
            None => false,
        }
    }

    /// Removes and returns every session.
    pub(crate) fn drain(&self) -> Vec<Arc<Session>> {
        std::mem::take(&mut *self.sessions.lock())
    }

    /// The current sessions, in display order.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().clone()
    }

    /// Stably reorders the table by a key computed once per session.
    pub fn reorder<K: Ord>(&self, key: impl FnMut(&Arc<Session>) -> K) {
        self.sessions.lock().sort_by_cached_key(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Controls;

    fn key(port: u16, ssrc: u32) -> SessionKey {
        SessionKey {
            sender: ([192, 168, 1, 10], port).into(),
            ssrc,
        }
    }

    fn make(k: SessionKey) -> impl FnOnce() -> Result<Arc<Session>> {
        move || Ok(Arc::new(Session::new(k, "test".into(), None, Controls::default())))
    }

    #[test]
    fn same_key_same_session() {
        let table = SessionTable::new(4);

        let (a, created_a) = table.get_or_insert_with(key(5004, 1), make(key(5004, 1))).unwrap();
        let (b, created_b) = table.get_or_insert_with(key(5004, 1), make(key(5004, 1))).unwrap();

        assert!(created_a);
        assert!(!created_b);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn ssrc_and_sender_both_distinguish() {
        let table = SessionTable::new(4);

        table.get_or_insert_with(key(5004, 1), make(key(5004, 1))).unwrap();
        table.get_or_insert_with(key(5004, 2), make(key(5004, 2))).unwrap();
        table.get_or_insert_with(key(5006, 1), make(key(5006, 1))).unwrap();

        assert_eq!(table.len(), 3);
        assert!(table.lookup(&key(5006, 1)).is_some());
        assert!(table.lookup(&key(5006, 2)).is_none());
    }

    #[test]
    fn full_table_rejects_new_keys_only() {
        let table = SessionTable::new(1);

        table.get_or_insert_with(key(1, 1), make(key(1, 1))).unwrap();

        assert!(matches!(
            table.get_or_insert_with(key(1, 2), make(key(1, 2))),
            Err(Error::TableFull)
        ));
        assert!(table.get_or_insert_with(key(1, 1), make(key(1, 1))).is_ok());
    }

    #[test]
    fn removal_keeps_order() {
        let table = SessionTable::new(8);
        for ssrc in 1..=4 {
            table.get_or_insert_with(key(1, ssrc), make(key(1, ssrc))).unwrap();
        }

        let gone = table.lookup(&key(1, 2)).unwrap();
        assert!(table.remove(&gone));
        assert!(!table.remove(&gone));

        let order: Vec<u32> = table.snapshot().iter().map(|s| s.ssrc()).collect();
        assert_eq!(order, vec![1, 3, 4]);
    }

    #[test]
    fn terminated_sessions_are_replaced_in_place() {
        let table = SessionTable::new(2);
        let (old, _) = table.get_or_insert_with(key(1, 1), make(key(1, 1))).unwrap();
        table.get_or_insert_with(key(1, 2), make(key(1, 2))).unwrap();

        old.terminate();
        let (new, created) = table.get_or_insert_with(key(1, 1), make(key(1, 1))).unwrap();

        assert!(created);
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(!new.is_terminating());
        assert_eq!(table.len(), 2);
        assert!(Arc::ptr_eq(&table.snapshot()[0], &new));

        assert!(!table.remove(&old));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn failed_construction_inserts_nothing() {
        let table = SessionTable::new(2);

        let failed = table.get_or_insert_with(key(1, 1), || {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no threads").into())
        });

        assert!(matches!(failed, Err(Error::Io(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn reorder_is_stable() {
        let table = SessionTable::new(8);
        for ssrc in 1..=5 {
            table.get_or_insert_with(key(1, ssrc), make(key(1, ssrc))).unwrap();
        }

        table.reorder(|s| s.ssrc() % 2);

        let order: Vec<u32> = table.snapshot().iter().map(|s| s.ssrc()).collect();
        assert_eq!(order, vec![2, 4, 1, 3, 5]);
    }
}
