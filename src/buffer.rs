//! Views over caller-owned memory handed to the radio for the duration of one operation.

/// Bytes to transmit.
///
/// The view borrows the caller's memory immutably; the scheduler keeps it until the transmission
/// has completed, so the borrow checker prevents the caller from changing the frame on air.
#[derive(Debug, Clone, Copy)]
pub struct WriteBuffer<'a> {
    data: &'a [u8],
}

impl<'a> WriteBuffer<'a> {
    /// Creation.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of bytes to transmit.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if there is nothing to transmit.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The bytes to transmit.
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }
}

impl AsRef<[u8]> for WriteBuffer<'_> {
    fn as_ref(&self) -> &[u8] {
        self.data
    }
}

impl<'a> From<&'a [u8]> for WriteBuffer<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::new(data)
    }
}

/// Receive area supplied by the caller.
///
/// Scheduling a receive moves the view into the scheduler; it is handed back through the
/// completion callback. Prior contents are not preserved.
#[derive(Debug)]
pub struct ReadBuffer<'a> {
    data: &'a mut [u8],
}

impl<'a> ReadBuffer<'a> {
    /// Creation.
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    /// Maximum number of bytes that can be received into this buffer.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Provide the buffer without regard to received data.
    pub fn as_slice(&self) -> &[u8] {
        &*self.data
    }

    /// Provide the mutable buffer without regard to received data.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut *self.data
    }

    /// Give the underlying memory back to the caller.
    pub fn into_inner(self) -> &'a mut [u8] {
        self.data
    }
}

impl AsRef<[u8]> for ReadBuffer<'_> {
    fn as_ref(&self) -> &[u8] {
        &*self.data
    }
}

impl AsMut<[u8]> for ReadBuffer<'_> {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }
}

impl<'a> From<&'a mut [u8]> for ReadBuffer<'a> {
    fn from(data: &'a mut [u8]) -> Self {
        Self::new(data)
    }
}
