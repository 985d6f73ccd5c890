/// Largest class count a [`SubsetSet`] can encode (`2^16` subsets).
pub const MAX_CLASSES: usize = 16;

const WORD_BITS: usize = 64;

// Bits whose subset index has bit `c` clear, for the classes inside one word.
const IN_WORD_MASKS: [u64; 6] = [
    0x5555_5555_5555_5555,
    0x3333_3333_3333_3333,
    0x0F0F_0F0F_0F0F_0F0F,
    0x00FF_00FF_00FF_00FF,
    0x0000_FFFF_0000_FFFF,
    0x0000_0000_FFFF_FFFF,
];

/// Set of class subsets: bit `s` is set when the subset with mask `s` is a
/// member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetSet {
    words: Vec<u64>,
    classes: usize,
}

impl SubsetSet {
    pub fn new(classes: usize) -> Self {
        debug_assert!(classes <= MAX_CLASSES);
        let words = ((1usize << classes) / WORD_BITS).max(1);
        SubsetSet {
            words: vec![0; words],
            classes,
        }
    }

    /// The set holding only the empty subset.
    pub fn with_empty_subset(classes: usize) -> Self {
        let mut set = Self::new(classes);
        set.words[0] = 1;
        set
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    pub fn contains(&self, mask: usize) -> bool {
        self.words[mask / WORD_BITS] >> (mask % WORD_BITS) & 1 == 1
    }

    pub fn is_complete(&self) -> bool {
        self.contains((1 << self.classes) - 1)
    }

    /// Adds `class` to every member subset. No member may contain `class`
    /// yet, which makes this a plain shift by `2^class` bits.
    pub fn add_class(&mut self, class: usize) {
        debug_assert!(class < self.classes);
        if class < 6 {
            let shift = 1 << class;
            for word in &mut self.words {
                debug_assert_eq!(*word & !IN_WORD_MASKS[class], 0);
                *word <<= shift;
            }
        } else {
            let shift = 1 << (class - 6);
            for index in (0..self.words.len()).rev() {
                self.words[index] = if index & shift != 0 {
                    self.words[index - shift]
                } else {
                    0
                };
            }
        }
    }

    /// Drops every member subset that already contains `class`.
    pub fn filter_class(&mut self, class: usize) {
        if class < 6 {
            for word in &mut self.words {
                *word &= IN_WORD_MASKS[class];
            }
        } else {
            let bit = 1 << (class - 6);
            for (index, word) in self.words.iter_mut().enumerate() {
                if index & bit != 0 {
                    *word = 0;
                }
            }
        }
    }

    pub fn union(&mut self, other: &SubsetSet) {
        debug_assert_eq!(self.classes, other.classes);
        for (word, &incoming) in self.words.iter_mut().zip(&other.words) {
            *word |= incoming;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(set: &SubsetSet) -> Vec<usize> {
        (0..1usize << set.classes).filter(|&s| set.contains(s)).collect()
    }

    #[test]
    fn test_add_and_filter_small() {
        let mut set = SubsetSet::with_empty_subset(3);
        set.add_class(1);
        assert_eq!(members(&set), vec![0b010]);

        let mut other = SubsetSet::with_empty_subset(3);
        other.add_class(0);
        set.union(&other);
        assert_eq!(members(&set), vec![0b001, 0b010]);

        set.filter_class(1);
        assert_eq!(members(&set), vec![0b001]);
        set.add_class(2);
        set.add_class(1);
        assert!(set.is_complete());
        assert_eq!(members(&set), vec![0b111]);
    }

    #[test]
    fn test_word_level_classes() {
        let classes = 9;
        let mut set = SubsetSet::with_empty_subset(classes);
        set.add_class(7);
        set.add_class(2);
        assert_eq!(members(&set), vec![(1 << 7) | (1 << 2)]);

        let mut copy = set.clone();
        copy.filter_class(7);
        assert!(copy.is_empty());
        copy = set.clone();
        copy.filter_class(8);
        assert_eq!(copy, set);

        for class in [0, 1, 3, 4, 5, 6, 8] {
            set.filter_class(class);
            set.add_class(class);
        }
        assert!(set.is_complete());
    }

    #[test]
    fn test_zero_and_full_width() {
        let set = SubsetSet::with_empty_subset(0);
        assert!(set.is_complete());

        let mut wide = SubsetSet::with_empty_subset(MAX_CLASSES);
        for class in (0..MAX_CLASSES).rev() {
            wide.add_class(class);
        }
        assert!(wide.is_complete());
        assert_eq!(members(&wide).len(), 1);
    }
}
