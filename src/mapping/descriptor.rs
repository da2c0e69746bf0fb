//! JVM type descriptor rewriting.

/// Rewrite every class reference (`Lpkg/Name;`) in a field or method descriptor.
///
/// `map` returns the new internal name, or `None` to keep the original.
pub fn remap_descriptor<F>(desc: &str, mut map: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(desc.len());
    let mut rest = desc;

    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let Some(end) = tail.find(';') else {
            // Malformed, copy the tail as is
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &tail[..end];
        out.push('L');
        match map(name) {
            Some(mapped) => out.push_str(&mapped),
            None => out.push_str(name),
        }
        out.push(';');
        rest = &tail[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Class names referenced by a descriptor
pub fn referenced_classes(desc: &str) -> Vec<&str> {
    let mut classes = Vec::new();
    let mut rest = desc;
    while let Some(start) = rest.find('L') {
        let tail = &rest[start + 1..];
        match tail.find(';') {
            Some(end) => {
                classes.push(&tail[..end]);
                rest = &tail[end + 1..];
            }
            None => break,
        }
    }
    classes
}
