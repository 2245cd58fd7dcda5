use std::fmt;

/// Nibble path from the account trie root to a node.
///
/// Storage trie nodes continue the path of the account leaf owning the storage trie. Paths are
/// only used for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncPath(Vec<u8>);

impl SyncPath {
    /// Creates a path from nibbles.
    pub const fn new(nibbles: Vec<u8>) -> Self {
        Self(nibbles)
    }

    /// The empty path of a trie root.
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns a new path with `nibbles` appended.
    pub fn join(&self, nibbles: &[u8]) -> Self {
        let mut path = Vec::with_capacity(self.0.len() + nibbles.len());
        path.extend_from_slice(&self.0);
        path.extend_from_slice(nibbles);
        Self(path)
    }

    /// The nibbles of the path.
    pub fn nibbles(&self) -> &[u8] {
        &self.0
    }

    /// Number of nibbles.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the root path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SyncPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("root")
        }
        f.write_str("0x")?;
        for nibble in &self.0 {
            write!(f, "{nibble:x}")?;
        }
        Ok(())
    }
}
