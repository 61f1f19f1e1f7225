use bytes::Bytes;

/// A cheaply-cloneable byte buffer that can be iterated in fixed-size
/// windows without copying — used to turn one in-memory slice read into the
/// sub-chunk stream the transport body is built from.
#[derive(Debug, Clone)]
pub struct ChunkedBuffer(Bytes);

impl ChunkedBuffer {
    pub fn new<B: Into<Bytes>>(bytes: B) -> Self {
        Self(bytes.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn chunks(&self, chunk_size: usize) -> ChunkedBufferIter {
        ChunkedBufferIter::new(self.0.clone(), chunk_size)
    }
}

#[derive(Debug, Clone)]
pub struct ChunkedBufferIter {
    data: Bytes,
    chunk_size: usize,
    offset: usize,
}

impl ChunkedBufferIter {
    pub fn new(data: Bytes, chunk_size: usize) -> Self {
        Self {
            data,
            chunk_size,
            offset: 0,
        }
    }
}

impl Iterator for ChunkedBufferIter {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }

        let start = self.offset;
        let end = (self.offset + self.chunk_size).min(self.data.len());
        self.offset = end;

        Some(self.data.slice(start..end))
    }
}
