//! Result buffer hand-off.
//!
//! A finished job hands its bytes to the host as the address of a boxed
//! `Vec<u8>`. From then on the host owns it and must call
//! [`release_result`] exactly once; a handle that is never released leaks.

use std::ptr;

/// Opaque result handle as seen by the host.
pub type ResultHandle = *mut Vec<u8>;

/// Move `bytes` to the heap and return the owning handle.
pub fn into_result_handle(bytes: Vec<u8>) -> ResultHandle {
    Box::into_raw(Box::new(bytes))
}

/// Pointer to the first byte, or null for a null handle.
///
/// # Safety
///
/// `handle` must be null or a live handle from [`into_result_handle`].
pub unsafe fn result_data(handle: ResultHandle) -> *const u8 {
    if handle.is_null() {
        return ptr::null();
    }
    (*handle).as_ptr()
}

/// Length in bytes, or `usize::MAX` for a null handle.
///
/// # Safety
///
/// `handle` must be null or a live handle from [`into_result_handle`].
pub unsafe fn result_len(handle: ResultHandle) -> usize {
    if handle.is_null() {
        return usize::MAX;
    }
    (*handle).len()
}

/// Free the buffer. Null is a no-op.
///
/// # Safety
///
/// `handle` must be null or a live handle from [`into_result_handle`] that
/// has not been released yet.
pub unsafe fn release_result(handle: ResultHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_round_trip() {
        let handle = into_result_handle(vec![1, 2, 3]);
        unsafe {
            assert_eq!(result_len(handle), 3);
            let data = std::slice::from_raw_parts(result_data(handle), result_len(handle));
            assert_eq!(data, &[1, 2, 3]);
            release_result(handle);
        }
    }

    #[test]
    fn test_null_handle() {
        unsafe {
            assert!(result_data(ptr::null_mut()).is_null());
            assert_eq!(result_len(ptr::null_mut()), usize::MAX);
            release_result(ptr::null_mut());
        }
    }
}
