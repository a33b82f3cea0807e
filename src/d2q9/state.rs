use super::Q;
use crate::global_variables::*;

/// One full copy of the lattice distributions, cell-major: the nine values of
/// cell `index` live at `index * Q..(index + 1) * Q`.
#[derive(Clone, Debug, PartialEq)]
pub struct Distributions {
    nx: usize,
    ny: usize,
    values: Vec<Float>,
}

impl Distributions {
    pub fn zeros(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            values: vec![0.0; nx * ny * Q],
        }
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn number_of_cells(&self) -> usize {
        self.nx * self.ny
    }

    #[inline]
    pub fn cell(&self, index: usize) -> [Float; Q] {
        let mut f = [0.0; Q];
        f.copy_from_slice(&self.values[index * Q..(index + 1) * Q]);
        f
    }

    #[inline]
    pub fn get(&self, index: usize, q: usize) -> Float {
        self.values[index * Q + q]
    }

    pub fn as_slice(&self) -> &[Float] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [Float] {
        &mut self.values
    }

    /// Sum of every value of every cell.
    pub fn total(&self) -> Float {
        self.values.iter().sum()
    }
}

/// Ping-pong pair of [`Distributions`].
///
/// A step borrows the pair through [`advance`](PingPong::advance): the read
/// buffer shared, the write buffer exclusive. The roles only change after the
/// step closure has returned, i.e. after every parallel cell update it started
/// has joined, so step `N + 1` never reads a buffer step `N` is still writing.
/// Each swap bumps the generation counter.
#[derive(Clone, Debug)]
pub struct PingPong {
    buffers: [Distributions; 2],
    current: usize,
    generation: u64,
}

impl PingPong {
    /// Both buffers start as copies of `seed`.
    pub fn new(seed: Distributions) -> Self {
        Self {
            buffers: [seed.clone(), seed],
            current: 0,
            generation: 0,
        }
    }

    /// The last fully written lattice.
    pub fn current(&self) -> &Distributions {
        &self.buffers[self.current]
    }

    /// The buffer the next step will overwrite.
    pub fn next(&self) -> &Distributions {
        &self.buffers[1 - self.current]
    }

    /// Number of completed steps.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Runs one step from the current buffer into the other one, then swaps.
    pub fn advance<F, R>(&mut self, step: F) -> R
    where
        F: FnOnce(&Distributions, &mut Distributions) -> R,
    {
        let (first, second) = self.buffers.split_at_mut(1);
        let (read, write) = if self.current == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        };
        let result = step(read, write);
        self.current = 1 - self.current;
        self.generation += 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(nx: usize, ny: usize) -> Distributions {
        let mut seed = Distributions::zeros(nx, ny);
        seed.as_mut_slice()
            .iter_mut()
            .enumerate()
            .for_each(|(k, value)| *value = k as Float);
        seed
    }

    #[test]
    fn test_cell_layout() {
        let seed = seeded(3, 2);
        assert_eq!(seed.cell(4)[0], 36.0);
        assert_eq!(seed.get(4, 8), 44.0);
        assert_eq!(seed.number_of_cells(), 6);
    }

    #[test]
    fn test_both_buffers_start_identical() {
        let pair = PingPong::new(seeded(4, 4));
        assert_eq!(pair.current(), pair.next());
        assert_eq!(pair.generation(), 0);
    }

    #[test]
    fn test_advance_swaps_roles() {
        let mut pair = PingPong::new(seeded(2, 2));
        pair.advance(|read, write| {
            assert_eq!(read.get(0, 1), 1.0);
            write.as_mut_slice().iter_mut().for_each(|value| *value = -1.0);
        });
        assert_eq!(pair.generation(), 1);
        assert_eq!(pair.current().get(0, 1), -1.0);
        assert_eq!(pair.next().get(0, 1), 1.0);

        let seen = pair.advance(|read, write| {
            write.as_mut_slice().copy_from_slice(read.as_slice());
            read.get(3, 8)
        });
        assert_eq!(seen, -1.0);
        assert_eq!(pair.generation(), 2);
        assert_eq!(pair.current(), pair.next());
    }
}
