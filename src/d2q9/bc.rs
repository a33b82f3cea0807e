use super::params::Parameters;
use super::D;
use crate::error::{CaseError, CaseResult};
use crate::global_variables::*;
use std::fmt;

/// How a wall edge treats the fluid next to it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WallPolicy {
    /// Edge cells are forced to the zero-velocity equilibrium at their own
    /// density.
    NoSlip,
    /// Values leaving through the edge come back in the opposite direction.
    BounceBack,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundaryCondition {
    /// Streaming wraps around to the opposite edge.
    Periodic,
    /// Streaming destinations are clamped into the domain.
    Clamped,
    /// Equilibrium at unit density and velocity `(sign * U0, 0)`.
    FixedVelocity { sign: Float },
    /// Equilibrium at a fixed density and velocity.
    Dirichlet {
        density: Float,
        velocity: [Float; D],
    },
    Wall(WallPolicy),
}

impl BoundaryCondition {
    /// Moments imposed on cells governed by this condition, or `None` when the
    /// condition acts on streaming only.
    pub fn imposed_moments(
        &self,
        local_density: Float,
        parameters: &Parameters,
    ) -> Option<(Float, [Float; D])> {
        match *self {
            BoundaryCondition::FixedVelocity { sign } => {
                Some((LATTICE_DENSITY, [sign * parameters.u0, 0.0]))
            }
            BoundaryCondition::Dirichlet { density, velocity } => Some((density, velocity)),
            BoundaryCondition::Wall(WallPolicy::NoSlip) => Some((local_density, [0.0; D])),
            BoundaryCondition::Periodic
            | BoundaryCondition::Clamped
            | BoundaryCondition::Wall(WallPolicy::BounceBack) => None,
        }
    }

    pub fn parse(key: &str, value: &str) -> CaseResult<Self> {
        let condition = value.split_whitespace().collect::<Vec<&str>>();
        let number = |position: usize| -> CaseResult<Float> {
            let token = condition
                .get(position)
                .ok_or_else(|| CaseError::invalid(key, value, "missing argument"))?;
            token
                .parse::<Float>()
                .map_err(|e| CaseError::invalid(key, value, e.to_string()))
        };
        match condition.first().copied() {
            Some("periodic") => Ok(BoundaryCondition::Periodic),
            Some("clamped") => Ok(BoundaryCondition::Clamped),
            Some("fixed_velocity") => {
                let sign = if condition.len() > 1 { number(1)? } else { 1.0 };
                Ok(BoundaryCondition::FixedVelocity { sign })
            }
            Some("dirichlet") => Ok(BoundaryCondition::Dirichlet {
                density: number(1)?,
                velocity: [number(2)?, number(3)?],
            }),
            Some("no_slip") => Ok(BoundaryCondition::Wall(WallPolicy::NoSlip)),
            Some("bounce_back") => Ok(BoundaryCondition::Wall(WallPolicy::BounceBack)),
            _ => Err(CaseError::invalid(key, value, "unknown boundary condition")),
        }
    }
}

impl fmt::Display for BoundaryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryCondition::Periodic => write!(f, "periodic"),
            BoundaryCondition::Clamped => write!(f, "clamped"),
            BoundaryCondition::FixedVelocity { sign } => write!(f, "fixed_velocity {sign}"),
            BoundaryCondition::Dirichlet { density, velocity } => {
                write!(f, "dirichlet {density} {} {}", velocity[0], velocity[1])
            }
            BoundaryCondition::Wall(WallPolicy::NoSlip) => write!(f, "no_slip"),
            BoundaryCondition::Wall(WallPolicy::BounceBack) => write!(f, "bounce_back"),
        }
    }
}

#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
pub enum BoundaryFace {
    West,
    East,
    South,
    North,
}

impl BoundaryFace {
    /// Faces in precedence order: a corner cell follows the first face listed
    /// here that imposes moments on it.
    pub const ALL: [BoundaryFace; 4] = [
        BoundaryFace::West,
        BoundaryFace::East,
        BoundaryFace::South,
        BoundaryFace::North,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BoundaryFace::West => "west",
            BoundaryFace::East => "east",
            BoundaryFace::South => "south",
            BoundaryFace::North => "north",
        }
    }

    pub fn opposite(&self) -> BoundaryFace {
        match self {
            BoundaryFace::West => BoundaryFace::East,
            BoundaryFace::East => BoundaryFace::West,
            BoundaryFace::South => BoundaryFace::North,
            BoundaryFace::North => BoundaryFace::South,
        }
    }

    /// Whether cell `(i, j)` lies on this face.
    pub fn contains(&self, i: usize, j: usize, nx: usize, ny: usize) -> bool {
        match self {
            BoundaryFace::West => i == 0,
            BoundaryFace::East => i == nx - 1,
            BoundaryFace::South => j == 0,
            BoundaryFace::North => j == ny - 1,
        }
    }
}

/// Where a pulled value comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Upstream {
    /// A cell inside the domain, after wrapping or clamping.
    Cell(usize),
    /// Outside the domain, through a face with this condition.
    Outside(BoundaryCondition),
}

/// Source coordinates along one axis for a pushed value landing on a cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AxisSources {
    Coordinates { values: [usize; 2], len: usize },
    /// The value was reflected by a bounce-back wall.
    Reflect,
}

impl AxisSources {
    fn single(value: usize) -> Self {
        AxisSources::Coordinates {
            values: [value, 0],
            len: 1,
        }
    }

    pub fn as_slice(&self) -> &[usize] {
        match self {
            AxisSources::Coordinates { values, len } => &values[..*len],
            AxisSources::Reflect => &[],
        }
    }
}

/// Boundary condition of each of the four domain edges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Boundaries {
    pub west: BoundaryCondition,
    pub east: BoundaryCondition,
    pub south: BoundaryCondition,
    pub north: BoundaryCondition,
}

impl Default for Boundaries {
    fn default() -> Self {
        Self::uniform(BoundaryCondition::Clamped)
    }
}

impl Boundaries {
    pub fn uniform(condition: BoundaryCondition) -> Self {
        Self {
            west: condition,
            east: condition,
            south: condition,
            north: condition,
        }
    }

    pub fn periodic() -> Self {
        Self::uniform(BoundaryCondition::Periodic)
    }

    /// Inflow on the west edge, outflow on the east edge, walls elsewhere.
    pub fn wind_tunnel(wall: WallPolicy) -> Self {
        Self {
            west: BoundaryCondition::FixedVelocity { sign: 1.0 },
            east: BoundaryCondition::FixedVelocity { sign: 1.0 },
            south: BoundaryCondition::Wall(wall),
            north: BoundaryCondition::Wall(wall),
        }
    }

    pub fn get(&self, face: BoundaryFace) -> BoundaryCondition {
        match face {
            BoundaryFace::West => self.west,
            BoundaryFace::East => self.east,
            BoundaryFace::South => self.south,
            BoundaryFace::North => self.north,
        }
    }

    pub fn with(mut self, face: BoundaryFace, condition: BoundaryCondition) -> Self {
        match face {
            BoundaryFace::West => self.west = condition,
            BoundaryFace::East => self.east = condition,
            BoundaryFace::South => self.south = condition,
            BoundaryFace::North => self.north = condition,
        }
        self
    }

    /// Periodic faces only make sense in opposite pairs.
    pub fn validate(&self) -> CaseResult<()> {
        for face in BoundaryFace::ALL {
            let opposite = face.opposite();
            if self.get(face) == BoundaryCondition::Periodic
                && self.get(opposite) != BoundaryCondition::Periodic
            {
                return Err(CaseError::InvalidBoundaryPairing {
                    face: face.name(),
                    opposite: opposite.name(),
                });
            }
        }
        Ok(())
    }

    /// Moments imposed on edge cell `(i, j)` under push streaming.
    pub fn push_override(
        &self,
        [i, j]: [usize; D],
        [nx, ny]: [usize; D],
        local_density: Float,
        parameters: &Parameters,
    ) -> Option<(Float, [Float; D])> {
        BoundaryFace::ALL
            .iter()
            .filter(|face| face.contains(i, j, nx, ny))
            .find_map(|&face| self.get(face).imposed_moments(local_density, parameters))
    }

    /// Resolves the upstream neighbour `(i, j) - c` for pull streaming. When
    /// both axes leave the domain the west/east face wins.
    pub fn pull_upstream(
        &self,
        [i, j]: [usize; D],
        [cx, cy]: [i32; D],
        [nx, ny]: [usize; D],
    ) -> Upstream {
        let x = self.pull_axis(i, cx, nx, BoundaryFace::West, BoundaryFace::East);
        let y = self.pull_axis(j, cy, ny, BoundaryFace::South, BoundaryFace::North);
        match (x, y) {
            (Err(face), _) | (_, Err(face)) => Upstream::Outside(self.get(face)),
            (Ok(x), Ok(y)) => Upstream::Cell(y * nx + x),
        }
    }

    fn pull_axis(
        &self,
        coordinate: usize,
        c: i32,
        n: usize,
        low: BoundaryFace,
        high: BoundaryFace,
    ) -> Result<usize, BoundaryFace> {
        let upstream = coordinate as i64 - c as i64;
        if (0..n as i64).contains(&upstream) {
            return Ok(upstream as usize);
        }
        let face = if upstream < 0 { low } else { high };
        match self.get(face) {
            BoundaryCondition::Periodic => Ok(upstream.rem_euclid(n as i64) as usize),
            BoundaryCondition::Clamped => Ok(upstream.clamp(0, n as i64 - 1) as usize),
            _ => Err(face),
        }
    }

    /// Cells whose pushed value along `[cx, cy]` lands on `(i, j)`, one axis
    /// at a time.
    pub fn push_sources(
        &self,
        [i, j]: [usize; D],
        [cx, cy]: [i32; D],
        [nx, ny]: [usize; D],
    ) -> [AxisSources; D] {
        [
            self.push_axis(i, cx, nx, BoundaryFace::West, BoundaryFace::East),
            self.push_axis(j, cy, ny, BoundaryFace::South, BoundaryFace::North),
        ]
    }

    fn push_axis(
        &self,
        coordinate: usize,
        c: i32,
        n: usize,
        low: BoundaryFace,
        high: BoundaryFace,
    ) -> AxisSources {
        if c == 0 {
            return AxisSources::single(coordinate);
        }
        let mut values = [0; 2];
        let mut len = 0;
        let upstream = coordinate as i64 - c as i64;
        if (0..n as i64).contains(&upstream) {
            values[len] = upstream as usize;
            len += 1;
        } else {
            let entry = if c > 0 { low } else { high };
            match self.get(entry) {
                BoundaryCondition::Periodic => {
                    values[len] = upstream.rem_euclid(n as i64) as usize;
                    len += 1;
                }
                BoundaryCondition::Wall(WallPolicy::BounceBack) => return AxisSources::Reflect,
                _ => {}
            }
        }
        let downstream = coordinate as i64 + c as i64;
        if !(0..n as i64).contains(&downstream) {
            let exit = if c > 0 { high } else { low };
            if self.get(exit) == BoundaryCondition::Clamped {
                values[len] = coordinate;
                len += 1;
            }
        }
        AxisSources::Coordinates { values, len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_boundary_conditions() {
        let parse = |value| BoundaryCondition::parse("west_boundary_condition", value).unwrap();
        assert_eq!(parse("periodic"), BoundaryCondition::Periodic);
        assert_eq!(parse("clamped"), BoundaryCondition::Clamped);
        assert_eq!(
            parse("fixed_velocity"),
            BoundaryCondition::FixedVelocity { sign: 1.0 }
        );
        assert_eq!(
            parse("fixed_velocity -1"),
            BoundaryCondition::FixedVelocity { sign: -1.0 }
        );
        assert_eq!(
            parse("dirichlet 1.0 0.05 0.0"),
            BoundaryCondition::Dirichlet {
                density: 1.0,
                velocity: [0.05, 0.0]
            }
        );
        assert_eq!(parse("no_slip"), BoundaryCondition::Wall(WallPolicy::NoSlip));
        assert_eq!(
            parse("bounce_back"),
            BoundaryCondition::Wall(WallPolicy::BounceBack)
        );
        assert!(BoundaryCondition::parse("k", "zou_he").is_err());
        assert!(BoundaryCondition::parse("k", "dirichlet 1.0 0.1").is_err());
        assert!(BoundaryCondition::parse("k", "").is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let conditions = [
            BoundaryCondition::Periodic,
            BoundaryCondition::FixedVelocity { sign: -1.0 },
            BoundaryCondition::Dirichlet {
                density: 1.02,
                velocity: [0.1, -0.01],
            },
            BoundaryCondition::Wall(WallPolicy::BounceBack),
        ];
        for condition in conditions {
            let text = condition.to_string();
            assert_eq!(BoundaryCondition::parse("k", &text).unwrap(), condition);
        }
    }

    #[test]
    fn test_unpaired_periodic_face_is_rejected() {
        assert!(Boundaries::periodic().validate().is_ok());
        let boundaries = Boundaries::periodic().with(BoundaryFace::North, BoundaryCondition::Clamped);
        match boundaries.validate() {
            Err(CaseError::InvalidBoundaryPairing { face, opposite }) => {
                assert_eq!((face, opposite), ("south", "north"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_imposed_moments() {
        let parameters = Parameters::new(0.6, 0.08);
        assert_eq!(
            BoundaryCondition::FixedVelocity { sign: -1.0 }.imposed_moments(0.9, &parameters),
            Some((1.0, [-0.08, 0.0]))
        );
        assert_eq!(
            BoundaryCondition::Wall(WallPolicy::NoSlip).imposed_moments(0.97, &parameters),
            Some((0.97, [0.0, 0.0]))
        );
        assert_eq!(
            BoundaryCondition::Wall(WallPolicy::BounceBack).imposed_moments(0.97, &parameters),
            None
        );
        assert_eq!(BoundaryCondition::Periodic.imposed_moments(1.0, &parameters), None);
    }

    #[test]
    fn test_push_override_corner_precedence() {
        let boundaries = Boundaries::wind_tunnel(WallPolicy::NoSlip);
        let parameters = Parameters::new(0.6, 0.1);
        let size = [8, 6];
        assert_eq!(
            boundaries.push_override([0, 0], size, 0.95, &parameters),
            Some((1.0, [0.1, 0.0]))
        );
        assert_eq!(
            boundaries.push_override([3, 5], size, 0.95, &parameters),
            Some((0.95, [0.0, 0.0]))
        );
        assert_eq!(boundaries.push_override([3, 3], size, 0.95, &parameters), None);
        let bounce = Boundaries::wind_tunnel(WallPolicy::BounceBack);
        assert_eq!(bounce.push_override([4, 0], size, 0.95, &parameters), None);
    }

    #[test]
    fn test_pull_upstream() {
        let size = [5, 4];
        let periodic = Boundaries::periodic();
        assert_eq!(periodic.pull_upstream([2, 2], [1, 0], size), Upstream::Cell(2 * 5 + 1));
        assert_eq!(periodic.pull_upstream([0, 0], [1, 1], size), Upstream::Cell(3 * 5 + 4));

        let clamped = Boundaries::default();
        assert_eq!(clamped.pull_upstream([0, 2], [1, 0], size), Upstream::Cell(2 * 5));

        let tunnel = Boundaries::wind_tunnel(WallPolicy::NoSlip);
        assert_eq!(
            tunnel.pull_upstream([0, 0], [1, 1], size),
            Upstream::Outside(BoundaryCondition::FixedVelocity { sign: 1.0 })
        );
        assert_eq!(
            tunnel.pull_upstream([2, 3], [0, -1], size),
            Upstream::Outside(BoundaryCondition::Wall(WallPolicy::NoSlip))
        );
    }

    #[test]
    fn test_push_sources() {
        let size = [5, 4];
        let periodic = Boundaries::periodic();
        let [x, y] = periodic.push_sources([0, 3], [1, -1], size);
        assert_eq!(x.as_slice(), &[4]);
        assert_eq!(y.as_slice(), &[0]);

        let clamped = Boundaries::default();
        let [x, _] = clamped.push_sources([4, 1], [1, 0], size);
        assert_eq!(x.as_slice(), &[3, 4]);
        let [x, _] = clamped.push_sources([0, 1], [1, 0], size);
        assert!(x.as_slice().is_empty());

        let walls = Boundaries::uniform(BoundaryCondition::Wall(WallPolicy::BounceBack));
        let [_, y] = walls.push_sources([2, 0], [1, 1], size);
        assert_eq!(y, AxisSources::Reflect);

        let tunnel = Boundaries::wind_tunnel(WallPolicy::NoSlip);
        let [x, _] = tunnel.push_sources([0, 2], [1, 0], size);
        assert!(x.as_slice().is_empty());
    }
}
