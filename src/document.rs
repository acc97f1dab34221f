use std::fmt;

use bytes::Bytes;

/// The opaque payload served at `/download`.
///
/// The server never parses it. Each start captures one `Document`; the next
/// start replaces it rather than mutating it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Document(Bytes);

impl Document {
    pub fn new(bytes: Bytes) -> Document {
        Document(bytes)
    }

    /// Cheap handle to the payload; cloning `Bytes` does not copy.
    pub fn bytes(&self) -> Bytes {
        self.0
            .clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0
            .is_empty()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("len", &self.0.len())
            .finish()
    }
}

impl From<Bytes> for Document {
    fn from(bytes: Bytes) -> Self {
        Document(bytes)
    }
}

impl From<Vec<u8>> for Document {
    fn from(bytes: Vec<u8>) -> Self {
        Document(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Document {
    fn from(bytes: &'static [u8]) -> Self {
        Document(Bytes::from_static(bytes))
    }
}

impl From<String> for Document {
    fn from(text: String) -> Self {
        Document(Bytes::from(text))
    }
}
