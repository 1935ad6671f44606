//! Translation of liveness ports into the container's internal ports.

use std::collections::BTreeSet;

use crate::error::Result;

/// Select the exposed ports whose host mapping is one of the liveness ports.
///
/// A failing lookup aborts the whole resolution: an exposed port without a
/// mapping means the container handle is malformed, and retrying will not
/// change that.
pub fn internal_ports<F>(
    liveness: &BTreeSet<u16>,
    exposed: &[u16],
    mut mapped_port: F,
) -> Result<BTreeSet<u16>>
where
    F: FnMut(u16) -> Result<u16>,
{
    let mut internal = BTreeSet::new();
    for &port in exposed {
        if liveness.contains(&mapped_port(port)?) {
            internal.insert(port);
        }
    }
    Ok(internal)
}
