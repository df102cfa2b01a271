use std::{collections::BTreeMap, path::PathBuf};

use crate::config::{TracingPaths, MAX_ARGUMENTS};

/// Build the kprobe definition registering `name` on `syscall`.
///
/// The arguments are fetched from the array pointed by %si, which holds the
/// second argument of the probed function on x86_64 (e.g. argv for execve).
/// Other architectures would need a different register.
pub(super) fn make_descriptor(name: &str, syscall: &str) -> String {
    let mut descriptor = format!("p:kprobes/{name} {syscall}");
    for argn in 0..MAX_ARGUMENTS {
        descriptor.push_str(&format!(" arg{argn}=+0(+{}(%si)):string", argn * 8));
    }
    descriptor
}

/// Map the events given as "group/name" (or "name") to their enable file.
/// The key is the bare event name, as it appears in the trace lines.
pub(super) fn map_sub_events<I, S>(
    sub_events: I,
    paths: &TracingPaths,
) -> BTreeMap<String, PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    sub_events
        .into_iter()
        .map(|event| {
            let path = event.as_ref();
            let name = path.split_once('/').map_or(path, |(_, name)| name);
            (name.to_string(), paths.event_enable(path))
        })
        .collect()
}
