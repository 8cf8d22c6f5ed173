//! Reconciliation of optimistic local goals with the server goal list.
//!
//! The server is authoritative for every id it reports. Local goals exist
//! only between creation and the first fetch that echoes them back.

use std::collections::HashSet;

use crate::types::Goal;

/// Merge the server-confirmed list with locally-created goals.
///
/// Order is stable: server goals first in server order, then local goals the
/// server has not reported, in local insertion order. Re-running with equal
/// inputs yields an identical list.
pub fn merge(local: &[Goal], server: &[Goal]) -> Vec<Goal> {
    let server_ids: HashSet<&str> = server.iter().map(|g| g.id.as_str()).collect();

    let mut merged = server.to_vec();
    merged.extend(
        local
            .iter()
            .filter(|g| !server_ids.contains(g.id.as_str()))
            .cloned(),
    );
    merged
}

/// Ids of local goals the server now reports. Their optimistic copies are
/// superseded and can be dropped.
pub fn confirmed_ids(local: &[Goal], server: &[Goal]) -> Vec<String> {
    let server_ids: HashSet<&str> = server.iter().map(|g| g.id.as_str()).collect();
    local
        .iter()
        .filter(|g| server_ids.contains(g.id.as_str()))
        .map(|g| g.id.clone())
        .collect()
}
