//! RFC 3986 dot-segment removal for request-target canonicalization.
//!
//! The rewrite happens in place over the path bytes with a read cursor and a
//! write cursor. The write cursor never passes the read cursor and never moves
//! below the buffer start, so `..` segments cannot navigate above the path
//! root.

/// Fast pre-scan for `.` / `..` segments.
///
/// Most request targets have none, in which case the rewrite is skipped
/// entirely.
pub fn contains_dot_segments(path: &[u8]) -> bool {
    if path.first() == Some(&b'.') {
        // "." / ".." / "./x" / "../x"
        match path.get(1) {
            None | Some(b'/') => return true,
            Some(b'.') => match path.get(2) {
                None | Some(b'/') => return true,
                _ => {}
            },
            _ => {}
        }
    }
    let mut i = 0;
    while i + 1 < path.len() {
        if path[i] == b'/' && path[i + 1] == b'.' {
            match path.get(i + 2) {
                None | Some(b'/') => return true,
                Some(b'.') => match path.get(i + 3) {
                    None | Some(b'/') => return true,
                    _ => {}
                },
                _ => {}
            }
        }
        i += 1;
    }
    false
}

/// Removes `.` and `..` segments per RFC 3986 §5.2.4, rewriting `path` in
/// place and returning the new logical length.
///
/// The buffer is never extended; an empty result is replaced by a single `/`.
pub fn remove_dot_segments(path: &mut [u8]) -> usize {
    if !contains_dot_segments(path) {
        return path.len();
    }

    let len = path.len();
    let mut read = 0;
    let mut write = 0;

    while read < len {
        debug_assert!(write <= read);

        let has_slash = path[read] == b'/';
        let seg_start = read;
        let mut seg_end = read + usize::from(has_slash);
        while seg_end < len && path[seg_end] != b'/' {
            seg_end += 1;
        }
        let final_segment = seg_end == len;
        let body = &path[seg_start + usize::from(has_slash)..seg_end];

        if body == b"." {
            // "/./" collapses to "/": the next segment supplies the slash.
            // A trailing "/." keeps the slash.
            if final_segment && has_slash && write < len {
                path[write] = b'/';
                write += 1;
            }
        } else if body == b".." {
            // Pop the previously emitted segment, never below the start.
            while write > 0 && path[write - 1] != b'/' {
                write -= 1;
            }
            write = write.saturating_sub(1);
            if final_segment && has_slash && write < len {
                path[write] = b'/';
                write += 1;
            }
        } else {
            path.copy_within(seg_start..seg_end, write);
            write += seg_end - seg_start;
        }

        read = seg_end;
    }

    if write == 0 && !path.is_empty() {
        path[0] = b'/';
        write = 1;
    }
    write
}
