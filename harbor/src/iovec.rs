//! Scatter/gather parameter vectors for `jail_set(2)` and `jail_get(2)`.

use std::ffi::{CString, c_void};
use std::fmt;
use std::ptr::NonNull;

use crate::error::Result;
use crate::params::{ParamValue, Params, is_integer_param};

/// Capacity of a string output slot, and of the kernel's `errmsg` buffer.
pub const OUTPUT_CAPACITY: usize = 1024;

/// Size of an integer output slot. `jail_get(2)` fails with `EINVAL` unless
/// an integer parameter's buffer is exactly this long.
pub const INT_OUTPUT_LEN: usize = std::mem::size_of::<libc::c_int>();

/// Output slot size the kernel expects for `key`.
pub fn output_len(key: &str) -> usize {
    if is_integer_param(key) {
        INT_OUTPUT_LEN
    } else {
        OUTPUT_CAPACITY
    }
}

/// An owned `struct iovec` array and the buffers it describes.
///
/// Every descriptor points either into a boxed slice owned by this value or,
/// for zero-length flag values, at a non-null dangling address. Boxed slices
/// never move, so the descriptors stay valid until the vector is dropped.
pub struct ParamVector {
    /// Backing storage; `iov[i]` points into `buffers[slots[i]]` when present.
    buffers: Vec<Box<[u8]>>,
    /// Index into `buffers` per descriptor; `None` for flags.
    slots: Vec<Option<usize>>,
    /// The descriptors handed to the kernel.
    iov: Vec<libc::iovec>,
}

impl fmt::Debug for ParamVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lens: Vec<usize> = self.iov.iter().map(|d| d.iov_len).collect();
        f.debug_struct("ParamVector")
            .field("descriptors", &self.iov.len())
            .field("lengths", &lens)
            .finish()
    }
}

impl ParamVector {
    /// Marshals `params`, one descriptor per entry, preserving order.
    ///
    /// Names must sit at even positions and each must be followed by a value.
    pub fn new(params: &Params) -> Result<Self> {
        params.validate()?;

        let mut v = Self::with_capacity(params.len() + 2);
        for entry in params.entries() {
            v.push_value(entry)?;
        }
        Ok(v)
    }

    /// Returns an empty vector with room for `n` descriptors.
    fn with_capacity(n: usize) -> Self {
        Self {
            buffers: Vec::with_capacity(n),
            slots: Vec::with_capacity(n),
            iov: Vec::with_capacity(n),
        }
    }

    /// Appends one encoded entry.
    fn push_value(&mut self, value: &ParamValue) -> Result<()> {
        match value {
            ParamValue::Str(s) => {
                let c = CString::new(s.as_str())?;
                self.push_buffer(c.into_bytes_with_nul().into_boxed_slice());
            }
            ParamValue::U32(n) => self.push_buffer(Box::new(n.to_ne_bytes())),
            ParamValue::Bytes(b) => self.push_buffer(b.clone().into_boxed_slice()),
            ParamValue::Flag => {
                self.slots.push(None);
                self.iov.push(libc::iovec {
                    iov_base: NonNull::<c_void>::dangling().as_ptr(),
                    iov_len: 0,
                });
            }
        }
        Ok(())
    }

    /// Appends a descriptor covering all of `buf`.
    fn push_buffer(&mut self, mut buf: Box<[u8]>) {
        let iov = libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        };
        self.slots.push(Some(self.buffers.len()));
        self.buffers.push(buf);
        self.iov.push(iov);
    }

    /// Appends a name and a zeroed `len`-byte output slot the kernel can
    /// write into. See [`output_len`] for the size a parameter needs.
    ///
    /// Returns the descriptor index of the slot, for [`ParamVector::output`].
    pub fn push_output(&mut self, key: &str, len: usize) -> Result<usize> {
        self.push_value(&ParamValue::Str(key.to_owned()))?;
        self.push_buffer(vec![0; len].into_boxed_slice());
        Ok(self.iov.len() - 1)
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.iov.len()
    }

    /// Returns `true` if there are no descriptors.
    pub fn is_empty(&self) -> bool {
        self.iov.is_empty()
    }

    /// Returns the descriptor array.
    pub fn descriptors(&self) -> &[libc::iovec] {
        &self.iov
    }

    /// Returns the descriptor array for a syscall that may update it.
    pub fn descriptors_mut(&mut self) -> &mut [libc::iovec] {
        &mut self.iov
    }

    /// Returns the bytes descriptor `index` currently covers.
    ///
    /// For output slots this reflects the length the kernel wrote back.
    pub fn segment(&self, index: usize) -> Option<&[u8]> {
        let slot = *self.slots.get(index)?;
        let Some(slot) = slot else {
            return Some(&[]);
        };
        let buf = &self.buffers[slot];
        let len = self.iov[index].iov_len.min(buf.len());
        Some(&buf[..len])
    }

    /// Returns a writable view of the buffer behind descriptor `index`.
    pub fn segment_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let slot = (*self.slots.get(index)?)?;
        Some(&mut self.buffers[slot])
    }

    /// Returns an output slot's contents up to the first NUL.
    pub fn output(&self, index: usize) -> Option<&[u8]> {
        let seg = self.segment(index)?;
        Some(seg.iter().position(|&b| b == 0).map_or(seg, |n| &seg[..n]))
    }

    /// Returns an output slot as text, or `None` if it is empty.
    pub fn output_string(&self, index: usize) -> Option<String> {
        let out = self.output(index)?;
        (!out.is_empty()).then(|| String::from_utf8_lossy(out).into_owned())
    }
}
