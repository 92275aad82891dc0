//! Fixed-capacity union-find over provisional region labels.
//!
//! Union always hangs the larger root under the smaller one, so the root of a
//! region is the smallest label ever handed to it. Label 0 is background and
//! is never merged.

#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<u16>,
}

impl UnionFind {
    /// A forest of `capacity` singleton labels. Capacity is clamped to `u16` range.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(u16::MAX as usize + 1);
        let mut uf = Self {
            parent: Vec::with_capacity(capacity),
        };
        uf.parent.extend((0..capacity).map(|i| i as u16));
        uf
    }

    pub fn capacity(&self) -> usize {
        self.parent.len()
    }

    /// Makes every label its own root again.
    pub fn reset(&mut self) {
        for (i, p) in self.parent.iter_mut().enumerate() {
            *p = i as u16;
        }
    }

    /// Root of `label`, halving the path on the way.
    pub fn find(&mut self, label: u16) -> u16 {
        let mut x = label as usize;
        while self.parent[x] as usize != x {
            let grandparent = self.parent[self.parent[x] as usize];
            self.parent[x] = grandparent;
            x = grandparent as usize;
        }
        x as u16
    }

    pub fn union(&mut self, a: u16, b: u16) {
        let a = self.find(a);
        let b = self.find(b);
        if a < b {
            self.parent[b as usize] = a;
        } else if b < a {
            self.parent[a as usize] = b;
        }
    }

    /// True if `label` is currently the root of its set.
    pub fn is_root(&self, label: u16) -> bool {
        self.parent[label as usize] == label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_smallest_label() {
        let mut uf = UnionFind::with_capacity(16);
        uf.union(7, 9);
        uf.union(9, 3);
        uf.union(12, 7);
        for label in [3, 7, 9, 12] {
            assert_eq!(uf.find(label), 3);
        }
        assert!(uf.is_root(3));
        assert!(!uf.is_root(12));
        assert_eq!(uf.find(5), 5);
    }

    #[test]
    fn reset_restores_singletons() {
        let mut uf = UnionFind::with_capacity(8);
        uf.union(1, 2);
        uf.union(2, 5);
        uf.reset();
        assert!((0..8).all(|l| uf.find(l) == l));
    }

    #[test]
    fn capacity_is_clamped_to_label_range() {
        let uf = UnionFind::with_capacity(1 << 20);
        assert_eq!(uf.capacity(), u16::MAX as usize + 1);
    }
}
