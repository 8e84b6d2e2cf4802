//! Timestamp-sortable identifiers.
//!
//! Roles, refresh tokens and todo entities use UUIDv7 so that ids sort by
//! creation time. Users keep random v4 ids.

use uuid::Uuid;

/// Generate a new UUIDv7.
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuidv7_has_sortable_version() {
        assert_eq!(uuidv7().get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let a = uuidv7();
        let b = uuidv7();
        assert!(b >= a);
    }
}
