//! Geometry, region and clock helpers shared by every backend

mod clock;
mod geometry;
mod region;

pub use self::clock::{Clock, ClockSource, Monotonic, Time};
pub use self::geometry::{Buffer, Coordinate, Logical, Physical, Point, Rectangle, Scale, Size, Transform};
pub use self::region::{Coverage, Region};
