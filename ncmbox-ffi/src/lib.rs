#![allow(unsafe_code)]

//! C ABI for embedding the engine in non-native hosts.
//!
//! The surface is deliberately tiny: two null-terminated strings in, one
//! null-terminated string out. An empty string means success; anything
//! else is an error message. No engine types cross the boundary.

use std::ffi::{CStr, CString, c_char};
use std::path::{Path, PathBuf};

use ncmbox::ConvertOptions;

/// Convert one NCM file.
///
/// `output_dir` may be null or empty; the decoded file then lands beside
/// the input. Cover art may be fetched over the network when the
/// container embeds none. The returned string must be released with
/// [`FreeResultString`].
///
/// # Safety
/// `input` must be a valid null-terminated C string. `output_dir` must be
/// a valid null-terminated C string or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ConvertFile(
    input: *const c_char,
    output_dir: *const c_char,
) -> *mut c_char {
    std::panic::catch_unwind(|| {
        if input.is_null() {
            return result_string("input path is null");
        }
        let Ok(input) = (unsafe { CStr::from_ptr(input) }).to_str() else {
            return result_string("input path is not valid UTF-8");
        };

        let out_dir = if output_dir.is_null() {
            None
        } else {
            match (unsafe { CStr::from_ptr(output_dir) }).to_str() {
                Ok("") => None,
                Ok(s) => Some(PathBuf::from(s)),
                Err(_) => return result_string("output directory is not valid UTF-8"),
            }
        };

        let opts = ConvertOptions {
            output_dir: out_dir,
            fetch_cover: true,
        };
        match ncmbox::convert_with_options(Path::new(input), &opts) {
            Ok(_) => result_string(""),
            Err(e) => result_string(&e.to_string()),
        }
    })
    .unwrap_or_else(|_| result_string("conversion panicked"))
}

/// Release a string returned by [`ConvertFile`].
///
/// # Safety
/// `s` must be a pointer previously returned by [`ConvertFile`], or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn FreeResultString(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

fn result_string(msg: &str) -> *mut c_char {
    // Interior NULs cannot occur in engine messages, but a C string must
    // not contain them regardless.
    let sanitized: String = msg.chars().map(|c| if c == '\0' { '?' } else { c }).collect();
    CString::new(sanitized).map_or(std::ptr::null_mut(), CString::into_raw)
}
