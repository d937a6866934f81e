//! Destination manager writing into an [`OutputBuffer`].

use std::mem;

use mozjpeg_sys::{boolean, jpeg_compress_struct, jpeg_destination_mgr};

use crate::buffer::OutputBuffer;

/// `iface` must stay first; the engine holds a pointer to it and mutates the
/// cursor fields directly.
#[repr(C)]
pub(crate) struct DestinationHook {
    iface: jpeg_destination_mgr,
    buffer: OutputBuffer,
}

impl DestinationHook {
    pub(crate) fn new(buffer: OutputBuffer) -> Box<Self> {
        let mut hook = Box::new(Self {
            // SAFETY: a null cursor and no callbacks, filled in below
            iface: unsafe { mem::zeroed() },
            buffer,
        });
        hook.iface.init_destination = Some(init_destination);
        hook.iface.empty_output_buffer = Some(empty_output_buffer);
        hook.iface.term_destination = Some(term_destination);
        hook.rebind();
        hook
    }

    pub(crate) fn iface_ptr(&mut self) -> *mut jpeg_destination_mgr {
        &mut self.iface
    }

    /// Point the engine's cursor at the buffer's first free byte.
    fn rebind(&mut self) {
        let (next, free) = self.buffer.cursor();
        self.iface.next_output_byte = next;
        self.iface.free_in_buffer = free;
    }

    /// Pull the engine's free count back into the buffer.
    fn sync(&mut self) {
        self.buffer.sync_free(self.iface.free_in_buffer);
    }

    pub(crate) fn into_buffer(mut self: Box<Self>) -> OutputBuffer {
        self.sync();
        let hook = *self;
        hook.buffer
    }
}

/// # Safety
///
/// `cinfo.dest` must point at the `iface` of a live [`DestinationHook`].
unsafe fn hook(cinfo: &mut jpeg_compress_struct) -> &mut DestinationHook {
    &mut *cinfo.dest.cast::<DestinationHook>()
}

extern "C-unwind" fn init_destination(_cinfo: &mut jpeg_compress_struct) {}

extern "C-unwind" fn empty_output_buffer(cinfo: &mut jpeg_compress_struct) -> boolean {
    // SAFETY: installed only through DestinationHook::iface_ptr.
    let hook = unsafe { hook(cinfo) };
    hook.sync();
    hook.buffer.grow();
    hook.rebind();
    1
}

extern "C-unwind" fn term_destination(cinfo: &mut jpeg_compress_struct) {
    // SAFETY: installed only through DestinationHook::iface_ptr.
    let hook = unsafe { hook(cinfo) };
    hook.sync();
    hook.buffer.terminate();
    hook.rebind();
}
