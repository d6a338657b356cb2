use std::fmt;

/// A set of subgroup invocation ids, laid out like a `uvec4` ballot.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Ballot([u32; 4]);

impl Ballot {
    pub const fn empty() -> Self {
        Self([0; 4])
    }

    /// Invocations `0..size`.
    pub fn first(size: u32) -> Self {
        let mut ballot = Self::empty();
        for lane in 0..size.min(128) {
            ballot.insert(lane);
        }
        ballot
    }

    pub fn words(self) -> [u32; 4] {
        self.0
    }

    pub fn insert(&mut self, lane: u32) {
        debug_assert!(lane < 128);
        self.0[(lane / 32) as usize] |= 1 << (lane % 32);
    }

    pub fn contains(self, lane: u32) -> bool {
        lane < 128 && self.0[(lane / 32) as usize] & (1 << (lane % 32)) != 0
    }

    pub fn count(self) -> u32 {
        self.0.iter().map(|w| w.count_ones()).sum()
    }

    pub fn is_empty(self) -> bool {
        self.0 == [0; 4]
    }

    /// Lowest contained id.
    pub fn lowest(self) -> Option<u32> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i as u32 * 32 + w.trailing_zeros())
    }

    /// Contained ids in ascending order.
    pub fn iter(self) -> impl Iterator<Item = u32> {
        (0..128).filter(move |&lane| self.contains(lane))
    }
}

impl FromIterator<u32> for Ballot {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut ballot = Self::empty();
        for lane in iter {
            ballot.insert(lane);
        }
        ballot
    }
}

impl fmt::Debug for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z, w] = self.0;
        write!(f, "Ballot({w:08x}_{z:08x}_{y:08x}_{x:08x})")
    }
}
