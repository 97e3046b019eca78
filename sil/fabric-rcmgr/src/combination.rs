use fabric_topology::MAX_HOST_BRIDGES;

/// Which side of the PCIe configuration window each root bridge's below-4G
/// MMIO lands on.
///
/// Bridges are indexed densely, `socket * rbs_per_socket + root_bridge`.
/// `true` means above the window. The planner enumerates, for a fixed count
/// of below-side bridges, every way of choosing which bridges those are; the
/// enumeration starts with the highest-indexed bridges below and walks the
/// below-group towards index zero, visiting each combination exactly once.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PlacementVector {
    above: [bool; MAX_HOST_BRIDGES],
    len: usize,
}

impl PlacementVector {
    /// All `len` bridges above the window.
    #[must_use]
    pub fn all_above(len: usize) -> Self {
        debug_assert!(len <= MAX_HOST_BRIDGES);
        Self { above: [true; MAX_HOST_BRIDGES], len }
    }

    /// First combination with `below` bridges on the below side: the
    /// highest-indexed `below` bridges.
    #[must_use]
    pub fn with_trailing_below(len: usize, below: usize) -> Self {
        debug_assert!(below <= len);
        let mut vector = Self::all_above(len);
        for index in (len - below)..len {
            vector.above[index] = false;
        }
        vector
    }

    /// Rebuilds a vector from persisted flags.
    #[must_use]
    pub fn from_flags(len: usize, flags: [bool; MAX_HOST_BRIDGES]) -> Self {
        debug_assert!(len <= MAX_HOST_BRIDGES);
        Self { above: flags, len }
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> [bool; MAX_HOST_BRIDGES] {
        self.above
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn is_above(&self, index: usize) -> bool {
        debug_assert!(index < self.len);
        self.above[index]
    }

    #[must_use]
    pub fn below_count(&self) -> usize {
        self.above[..self.len].iter().filter(|above| !**above).count()
    }

    /// Flips the primary bridge (and only it) to the other side.
    #[must_use]
    pub fn with_flipped(&self, index: usize) -> Self {
        let mut vector = *self;
        vector.above[index] = !vector.above[index];
        vector
    }

    /// Advances to the next combination with the same below-side count, or
    /// `None` once all have been visited.
    #[must_use]
    pub fn next_combination(&self) -> Option<Self> {
        // Count the run of below-side bridges starting at index 0. Once the
        // whole below-group sits there, every combination has been tried.
        let run = self.above[..self.len].iter().take_while(|above| !**above).count();
        if run == self.below_count() {
            return None;
        }

        // Move the first below-side bridge past the run one slot down and
        // pack the run right behind it.
        let mut moved = run + 1;
        while moved < self.len && self.above[moved] {
            moved += 1;
        }
        debug_assert!(moved < self.len);

        let mut next = *self;
        next.above[moved] = true;
        next.above[moved - 1] = false;
        for index in 0..run {
            next.above[index] = true;
        }
        for index in (moved - 1 - run)..(moved - 1) {
            next.above[index] = false;
        }
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn below_indices(vector: &PlacementVector) -> Vec<usize> {
        (0..vector.len()).filter(|index| !vector.is_above(*index)).collect()
    }

    #[test]
    fn starts_with_trailing_bridges_below() {
        let vector = PlacementVector::with_trailing_below(4, 2);
        assert_eq!(below_indices(&vector), vec![2, 3]);
    }

    #[test]
    fn zero_below_has_no_successor() {
        let vector = PlacementVector::all_above(4);
        assert!(vector.next_combination().is_none());
    }

    #[test]
    fn enumerates_all_choose_two_of_four() {
        let mut vector = PlacementVector::with_trailing_below(4, 2);
        let mut seen = vec![below_indices(&vector)];
        while let Some(next) = vector.next_combination() {
            seen.push(below_indices(&next));
            vector = next;
        }
        assert_eq!(
            seen,
            vec![
                vec![2, 3],
                vec![1, 3],
                vec![0, 3],
                vec![1, 2],
                vec![0, 2],
                vec![0, 1],
            ]
        );
    }

    #[test]
    fn flip_moves_a_single_bridge() {
        let vector = PlacementVector::all_above(4).with_flipped(1);
        assert_eq!(below_indices(&vector), vec![1]);
    }

    fn binomial(n: usize, k: usize) -> usize {
        if k > n {
            return 0;
        }
        let mut result = 1usize;
        for i in 0..k {
            result = result * (n - i) / (i + 1);
        }
        result
    }

    proptest! {
        #[test]
        fn visits_every_combination_exactly_once(
            len in 1usize..=8,
            below in 0usize..=8,
        ) {
            prop_assume!(below <= len);
            let mut vector = PlacementVector::with_trailing_below(len, below);
            let mut seen = std::collections::BTreeSet::new();
            seen.insert(below_indices(&vector));
            let mut steps = 1usize;
            while let Some(next) = vector.next_combination() {
                prop_assert_eq!(next.below_count(), below);
                prop_assert!(seen.insert(below_indices(&next)), "combination repeated");
                vector = next;
                steps += 1;
                prop_assert!(steps <= 512, "enumeration did not terminate");
            }
            prop_assert_eq!(steps, binomial(len, below));
        }
    }
}
