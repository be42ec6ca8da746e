//! Square-image addressing and double buffering.
//!
//! Every per-node quantity lives in an image of side `ceil(sqrt(n))` and
//! node `i` sits at `(i mod side, i / side)`. Per-link quantities use a side
//! of `ceil(sqrt(2 * links))` so both adjacency directions always fit.

/// Addressing for one family of square images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureLayout {
    side: u32,
}

impl TextureLayout {
    /// Layout for per-node images.
    pub fn for_points(node_count: usize) -> Self {
        Self {
            side: ceil_sqrt(node_count),
        }
    }

    /// Layout for per-link images.
    pub fn for_links(complete_link_count: usize) -> Self {
        Self {
            side: ceil_sqrt(complete_link_count * 2),
        }
    }

    /// Layout with an explicit side.
    pub fn with_side(side: u32) -> Self {
        Self { side }
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    /// Side used when allocating; an image always has at least one texel.
    pub fn alloc_side(&self) -> u32 {
        self.side.max(1)
    }

    pub fn texel_count(&self) -> usize {
        let side = self.side as usize;
        side * side
    }

    /// Pixel coordinate of a linear index.
    pub fn coord(&self, index: usize) -> (u32, u32) {
        let side = self.alloc_side() as usize;
        ((index % side) as u32, (index / side) as u32)
    }

    /// Linear index of a pixel coordinate.
    pub fn index_of(&self, x: u32, y: u32) -> usize {
        y as usize * self.alloc_side() as usize + x as usize
    }

    /// Whether this layout can be allocated on a device with the given maximum side.
    pub fn fits(&self, max_side: u32) -> bool {
        self.side <= max_side
    }
}

/// Smallest `s` with `s * s >= n`.
fn ceil_sqrt(n: usize) -> u32 {
    if n == 0 {
        return 0;
    }
    let mut side = (n as f64).sqrt().ceil() as usize;
    while side * side < n {
        side += 1;
    }
    while side > 1 && (side - 1) * (side - 1) >= n {
        side -= 1;
    }
    side as u32
}

/// Two buffers of the same quantity that swap roles after every write.
///
/// A pass reads `previous` and writes `current`; `swap` then makes the fresh
/// result the next pass's input. Reading and writing the same buffer within
/// one pass is never possible through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPong<T> {
    current: T,
    previous: T,
}

impl<T: Copy> PingPong<T> {
    pub fn new(current: T, previous: T) -> Self {
        Self { current, previous }
    }

    /// Buffer holding the most recent result.
    pub fn current(&self) -> T {
        self.current
    }

    /// Buffer holding the result before that.
    pub fn previous(&self) -> T {
        self.previous
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.previous);
    }

    /// Both buffers, for teardown.
    pub fn both(&self) -> [T; 2] {
        [self.current, self.previous]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_side() {
        assert_eq!(TextureLayout::for_points(0).side(), 0);
        assert_eq!(TextureLayout::for_points(1).side(), 1);
        assert_eq!(TextureLayout::for_points(4).side(), 2);
        assert_eq!(TextureLayout::for_points(5).side(), 3);
        assert_eq!(TextureLayout::for_points(1_000_000).side(), 1000);
        assert_eq!(TextureLayout::for_points(1_000_001).side(), 1001);
    }

    #[test]
    fn test_links_side_doubles_capacity() {
        let layout = TextureLayout::for_links(3);
        assert_eq!(layout.side(), 3);
        assert!(layout.texel_count() >= 6);
    }

    #[test]
    fn test_coord_round_trip() {
        let layout = TextureLayout::for_points(10);
        assert_eq!(layout.side(), 4);
        assert_eq!(layout.coord(0), (0, 0));
        assert_eq!(layout.coord(5), (1, 1));
        assert_eq!(layout.index_of(1, 2), 9);
    }

    #[test]
    fn test_fits() {
        assert!(TextureLayout::for_points(16).fits(4));
        assert!(!TextureLayout::for_points(17).fits(4));
    }

    #[test]
    fn test_ping_pong_swap() {
        let mut buffers = PingPong::new(1, 2);
        assert_eq!((buffers.current(), buffers.previous()), (1, 2));
        buffers.swap();
        assert_eq!((buffers.current(), buffers.previous()), (2, 1));
    }
}
