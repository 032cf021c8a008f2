use crate::error::KVError;

/// What a [`KVStore::mutate`] callback decides to do with a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Leave the key as it was and roll the transaction back.
    Keep,
    /// Store a new value.
    Put(Vec<u8>),
    /// Remove the key.
    Delete,
}

/// KVStore provides a transactional key-value storage interface.
///
/// Keys follow a namespaced convention: `sites:{id}`, `pending_admins:{email}`.
/// Each method runs as one storage transaction: it either commits fully or
/// leaves the store untouched.
pub trait KVStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError>;

    /// Set a key-value pair, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), KVError>;

    /// Set several key-value pairs in a single transaction.
    fn batch_set(&self, entries: &[(&str, &[u8])]) -> Result<(), KVError>;

    /// Read-modify-write a single key in one write transaction.
    ///
    /// `f` sees the current value and returns the change to apply. Writers
    /// are serialized, so no other write to the store lands between the
    /// read and the write.
    fn mutate(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&[u8]>) -> Mutation,
    ) -> Result<(), KVError>;

    /// Scan all keys matching a prefix. Returns (key, value) pairs sorted by key.
    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError>;
}
