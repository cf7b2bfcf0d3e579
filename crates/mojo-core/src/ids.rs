//! Id generation helpers, styled on the teacher's `UserId`/`ConnId` newtypes
//! (`skynet-core::types`): UUIDv7 for persisted, time-sortable entities
//! (conversation pages, archive chunks, scheduler tasks), UUIDv4 for
//! short-lived, purely-unique handles.

use uuid::Uuid;

/// A time-sortable id for entities that are persisted and listed in
/// creation order (conversation pages, chunks, clusters, tasks).
pub fn new_sortable_id() -> String {
    Uuid::now_v7().to_string()
}

/// A random id for ephemeral handles with no ordering requirement.
pub fn new_random_id() -> String {
    Uuid::new_v4().to_string()
}
