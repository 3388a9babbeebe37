//! Broadcast rotation state.

/// Round-robin position over the broadcast groups.
///
/// The cursor only ever grows and is reduced modulo the current group count
/// when a group is picked, so the group list may shrink or grow between
/// cycles without invalidating it. It lives in memory and starts from zero
/// on every launch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationCursor {
    position: usize,
}

impl RotationCursor {
    #[must_use]
    pub const fn new() -> Self {
        Self { position: 0 }
    }

    #[must_use]
    pub const fn starting_at(position: usize) -> Self {
        Self { position }
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Picks the group for the current position.
    #[must_use]
    pub fn select<'a, T>(&self, groups: &'a [T]) -> Option<&'a T> {
        if groups.is_empty() {
            return None;
        }
        groups.get(self.position % groups.len())
    }

    /// Moves to the next group.
    pub fn advance(&mut self) {
        self.position = self.position.wrapping_add(1);
    }
}

/// A forwarded copy waiting to be deleted again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRecord {
    pub group_id: i64,
    pub group_title: String,
    /// Id of the copy inside the group, not of the saved original.
    pub message_id: i32,
}

/// Result of one broadcast cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The target folder holds no groups or channels.
    NoGroups,

    /// Saved Messages is empty.
    NoSavedMessage,

    /// The saved message was forwarded.
    Forwarded {
        group_title: String,
        message_id: i32,
        /// Id of the forwarded copy, when Telegram reported one.
        copy_id: Option<i32>,
    },

    /// Forwarding failed and the plain text was sent instead.
    FallbackSent { group_title: String },

    /// Forwarding failed and there was no text to fall back to.
    Skipped { group_title: String },
}

impl CycleOutcome {
    /// Whether a group was picked this cycle, i.e. whether the rotation
    /// should move on.
    #[must_use]
    pub const fn used_group(&self) -> bool {
        matches!(
            self,
            Self::Forwarded { .. } | Self::FallbackSent { .. } | Self::Skipped { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cursor() {
        let cursor = RotationCursor::default();
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.select::<u8>(&[]), None);
    }

    #[test]
    fn test_select_wraps_around() {
        let groups = ["G1", "G2"];
        let mut cursor = RotationCursor::new();

        let mut picked = Vec::new();
        for _ in 0..3 {
            picked.push(*cursor.select(&groups).unwrap());
            cursor.advance();
        }
        assert_eq!(picked, ["G1", "G2", "G1"]);
    }

    #[test]
    fn test_shrinking_list_keeps_index_valid() {
        let cursor = RotationCursor::starting_at(5);
        assert_eq!(cursor.select(&["A", "B", "C"]), Some(&"C"));
        assert_eq!(cursor.select(&["A", "B"]), Some(&"B"));
        assert_eq!(cursor.select(&["A"]), Some(&"A"));
    }

    #[test]
    fn test_fair_over_full_rounds() {
        let groups = ["A", "B", "C", "D"];
        let mut cursor = RotationCursor::starting_at(2);
        let mut counts = [0usize; 4];

        for _ in 0..3 * groups.len() {
            let picked = cursor.select(&groups).unwrap();
            let idx = groups.iter().position(|g| g == picked).unwrap();
            counts[idx] += 1;
            cursor.advance();
        }
        assert_eq!(counts, [3, 3, 3, 3]);
    }

    #[test]
    fn test_used_group() {
        assert!(!CycleOutcome::NoGroups.used_group());
        assert!(!CycleOutcome::NoSavedMessage.used_group());
        assert!(
            CycleOutcome::Skipped {
                group_title: "G".to_owned()
            }
            .used_group()
        );
    }
}
