//! Tile grid - fixed-size occupancy map for placed entities

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::world::EntityId;

/// Grid coordinate. Signed so that clicks left of or above the map survive
/// translation and can be rejected as out of bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub col: i32,
    pub row: i32,
}

impl Cell {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    pub fn step(self, direction: Direction) -> Self {
        let (dc, dr) = direction.delta();
        Self::new(self.col + dc, self.row + dr)
    }

    /// Manhattan distance between two cells
    pub fn distance(self, other: Cell) -> u32 {
        self.col.abs_diff(other.col) + self.row.abs_diff(other.row)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    West,
    East,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::West,
        Direction::East,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
            Direction::East => (1, 0),
        }
    }
}

/// Axis-aligned block of cells anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub col: i32,
    pub row: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(col: i32, row: i32, width: u32, height: u32) -> Self {
        Self {
            col,
            row,
            width,
            height,
        }
    }

    pub fn at(anchor: Cell, width: u32, height: u32) -> Self {
        Self::new(anchor.col, anchor.row, width, height)
    }

    pub fn anchor(&self) -> Cell {
        Cell::new(self.col, self.row)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.col >= self.col
            && cell.row >= self.row
            && i64::from(cell.col) < i64::from(self.col) + i64::from(self.width)
            && i64::from(cell.row) < i64::from(self.row) + i64::from(self.height)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let (a_right, a_bottom) = self.far_corner();
        let (b_right, b_bottom) = other.far_corner();
        i64::from(self.col) < b_right
            && i64::from(other.col) < a_right
            && i64::from(self.row) < b_bottom
            && i64::from(other.row) < a_bottom
    }

    /// The rectangle shrunk by one cell on every side, or `None` when nothing
    /// would remain.
    pub fn inset(&self) -> Option<Rect> {
        if self.width < 3 || self.height < 3 {
            return None;
        }
        Some(Rect::new(
            self.col.checked_add(1)?,
            self.row.checked_add(1)?,
            self.width - 2,
            self.height - 2,
        ))
    }

    /// Whether every cell of `other` lies inside this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        let (right, bottom) = self.far_corner();
        let (other_right, other_bottom) = other.far_corner();
        other.col >= self.col
            && other.row >= self.row
            && other_right <= right
            && other_bottom <= bottom
    }

    /// Row-major cells covered by the rectangle.
    /// Coordinates past `i32::MAX` saturate, so an oversized rectangle still
    /// yields cells that fail the bounds check.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        let width = i32::try_from(self.width).unwrap_or(i32::MAX);
        let height = i32::try_from(self.height).unwrap_or(i32::MAX);
        (0..height).flat_map(move |dr| {
            (0..width).map(move |dc| {
                Cell::new(self.col.saturating_add(dc), self.row.saturating_add(dr))
            })
        })
    }

    /// Cells on the outer ring of the rectangle.
    pub fn border(&self) -> Vec<Cell> {
        let last_col = i64::from(self.width) - 1;
        let last_row = i64::from(self.height) - 1;
        self.cells()
            .filter(|cell| {
                let dc = i64::from(cell.col) - i64::from(self.col);
                let dr = i64::from(cell.row) - i64::from(self.row);
                dc == 0 || dr == 0 || dc == last_col || dr == last_row
            })
            .collect()
    }

    fn far_corner(&self) -> (i64, i64) {
        (
            i64::from(self.col) + i64::from(self.width),
            i64::from(self.row) + i64::from(self.height),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainKind {
    #[default]
    Grass,
    Meadow,
    Water,
}

impl TerrainKind {
    pub fn is_buildable(self) -> bool {
        !matches!(self, TerrainKind::Water)
    }
}

/// What the render and HUD collaborators see for a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellState {
    pub occupant: Option<EntityId>,
    pub buildable: bool,
    pub terrain: TerrainKind,
    pub interior_of: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
pub enum GridError {
    #[error("cell {0} lies outside the grid")]
    OutOfBounds(Cell),
    #[error("cell {cell} is already occupied by entity {occupant}")]
    Occupied { cell: Cell, occupant: EntityId },
    #[error("cell {0} cannot be built on")]
    NotBuildable(Cell),
    #[error("cell {0} is not occupied")]
    NotOccupied(Cell),
    #[error("cell {cell} belongs to entity {found}, not {expected}")]
    ForeignOwner {
        cell: Cell,
        expected: EntityId,
        found: EntityId,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GridCell {
    terrain: TerrainKind,
    occupant: Option<EntityId>,
    interior_of: Option<EntityId>,
}

impl GridCell {
    fn buildable(&self) -> bool {
        self.terrain.is_buildable() && self.interior_of.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    cells: Vec<GridCell>,
}

impl TileGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![GridCell::default(); width as usize * height as usize],
        }
    }

    /// Builds a grid from row-major terrain. Returns `None` if the terrain does
    /// not cover the grid exactly.
    pub fn with_terrain(width: u32, height: u32, terrain: &[TerrainKind]) -> Option<Self> {
        if terrain.len() != width as usize * height as usize {
            return None;
        }
        let cells = terrain
            .iter()
            .map(|&terrain| GridCell {
                terrain,
                ..GridCell::default()
            })
            .collect();
        Some(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub fn in_bounds(&self, cell: Cell) -> bool {
        self.bounds().contains(cell)
    }

    fn index(&self, cell: Cell) -> Option<usize> {
        if self.in_bounds(cell) {
            Some(cell.row as usize * self.width as usize + cell.col as usize)
        } else {
            None
        }
    }

    fn cell_at(&self, index: usize) -> Cell {
        let width = self.width as usize;
        Cell::new((index % width) as i32, (index / width) as i32)
    }

    pub fn query(&self, cell: Cell) -> Option<CellState> {
        let index = self.index(cell)?;
        let record = &self.cells[index];
        Some(CellState {
            occupant: record.occupant,
            buildable: record.buildable(),
            terrain: record.terrain,
            interior_of: record.interior_of,
        })
    }

    pub fn occupant(&self, cell: Cell) -> Option<EntityId> {
        self.index(cell).and_then(|index| self.cells[index].occupant)
    }

    pub fn interior_of(&self, cell: Cell) -> Option<EntityId> {
        self.index(cell).and_then(|index| self.cells[index].interior_of)
    }

    pub fn terrain(&self) -> Vec<TerrainKind> {
        self.cells.iter().map(|cell| cell.terrain).collect()
    }

    pub fn set_terrain(&mut self, cell: Cell, terrain: TerrainKind) -> bool {
        match self.index(cell) {
            Some(index) => {
                self.cells[index].terrain = terrain;
                true
            }
            None => false,
        }
    }

    /// Checks that every cell could be reserved right now without touching the
    /// grid.
    pub fn check_reservable(&self, cells: &[Cell]) -> Result<(), GridError> {
        for &cell in cells {
            let index = self.index(cell).ok_or(GridError::OutOfBounds(cell))?;
            let record = &self.cells[index];
            if let Some(occupant) = record.occupant {
                return Err(GridError::Occupied { cell, occupant });
            }
            if !record.buildable() {
                return Err(GridError::NotBuildable(cell));
            }
        }
        Ok(())
    }

    /// Claims every cell for `id`, or none of them.
    pub fn reserve(&mut self, cells: &[Cell], id: EntityId) -> Result<(), GridError> {
        self.check_reservable(cells)?;
        for &cell in cells {
            if let Some(index) = self.index(cell) {
                self.cells[index].occupant = Some(id);
            }
        }
        Ok(())
    }

    /// Frees every cell held by `owner`. Fails without changes if any cell is
    /// empty or held by someone else.
    pub fn release(&mut self, cells: &[Cell], owner: EntityId) -> Result<(), GridError> {
        for &cell in cells {
            let index = self.index(cell).ok_or(GridError::OutOfBounds(cell))?;
            match self.cells[index].occupant {
                None => return Err(GridError::NotOccupied(cell)),
                Some(found) if found != owner => {
                    return Err(GridError::ForeignOwner {
                        cell,
                        expected: owner,
                        found,
                    })
                }
                Some(_) => {}
            }
        }
        for &cell in cells {
            if let Some(index) = self.index(cell) {
                self.cells[index].occupant = None;
            }
        }
        Ok(())
    }

    pub fn tag_interior(&mut self, area: Rect, enclosure: EntityId) {
        for cell in area.cells() {
            if let Some(index) = self.index(cell) {
                self.cells[index].interior_of = Some(enclosure);
            }
        }
    }

    pub fn clear_interior(&mut self, area: Rect, enclosure: EntityId) {
        for cell in area.cells() {
            if let Some(index) = self.index(cell) {
                if self.cells[index].interior_of == Some(enclosure) {
                    self.cells[index].interior_of = None;
                }
            }
        }
    }

    /// In-bounds neighbours (4-connectivity)
    pub fn neighbors(&self, cell: Cell) -> Vec<Cell> {
        Direction::ALL
            .iter()
            .map(|&direction| cell.step(direction))
            .filter(|&next| self.in_bounds(next))
            .collect()
    }

    pub fn iter_occupied(&self) -> impl Iterator<Item = (Cell, EntityId)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(index, record)| record.occupant.map(|id| (self.cell_at(index), id)))
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.occupant.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> EntityId {
        EntityId::from_raw(raw)
    }

    #[test]
    fn test_rect_border_and_inset() {
        let rect = Rect::new(5, 5, 5, 5);
        assert_eq!(rect.border().len(), 16);
        let inner = rect.inset().unwrap();
        assert_eq!(inner, Rect::new(6, 6, 3, 3));
        assert!(inner.contains(Cell::new(8, 8)));
        assert!(!inner.contains(Cell::new(9, 8)));
        assert!(Rect::new(0, 0, 2, 5).inset().is_none());
    }

    #[test]
    fn test_rect_near_coordinate_limits() {
        assert!(Rect::new(i32::MAX, 0, 5, 5).inset().is_none());

        let edge = Rect::new(i32::MAX - 1, 0, 3, 1);
        let cells: Vec<Cell> = edge.cells().collect();
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[2], Cell::new(i32::MAX, 0));

        let wide = Rect::new(0, 0, 3_000_000_000, 1);
        assert_eq!(wide.cells().nth(20), Some(Cell::new(20, 0)));

        let grid = TileGrid::new(10, 10);
        assert!(grid.bounds().contains_rect(&Rect::new(5, 5, 5, 5)));
        assert!(!grid.bounds().contains_rect(&Rect::new(6, 5, 5, 5)));
        assert!(!grid.bounds().contains_rect(&Rect::new(i32::MAX, 0, 5, 5)));
    }

    #[test]
    fn test_rect_intersects() {
        let a = Rect::new(0, 0, 3, 3);
        assert!(a.intersects(&Rect::new(2, 2, 3, 3)));
        assert!(!a.intersects(&Rect::new(3, 0, 3, 3)));
        assert!(!a.intersects(&Rect::new(0, 0, 0, 3)));
    }

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let mut grid = TileGrid::new(4, 4);
        grid.reserve(&[Cell::new(1, 1)], id(1)).unwrap();

        let err = grid
            .reserve(&[Cell::new(0, 0), Cell::new(1, 1)], id(2))
            .unwrap_err();
        assert_eq!(
            err,
            GridError::Occupied {
                cell: Cell::new(1, 1),
                occupant: id(1)
            }
        );
        assert_eq!(grid.occupant(Cell::new(0, 0)), None);

        let err = grid
            .reserve(&[Cell::new(3, 3), Cell::new(4, 3)], id(2))
            .unwrap_err();
        assert_eq!(err, GridError::OutOfBounds(Cell::new(4, 3)));
        assert_eq!(grid.occupant(Cell::new(3, 3)), None);
        assert_eq!(grid.occupied_count(), 1);
    }

    #[test]
    fn test_reserve_rejects_water_and_interiors() {
        let mut grid = TileGrid::new(6, 6);
        grid.set_terrain(Cell::new(0, 0), TerrainKind::Water);
        assert_eq!(
            grid.reserve(&[Cell::new(0, 0)], id(1)),
            Err(GridError::NotBuildable(Cell::new(0, 0)))
        );

        grid.tag_interior(Rect::new(2, 2, 2, 2), id(7));
        assert_eq!(
            grid.reserve(&[Cell::new(3, 3)], id(1)),
            Err(GridError::NotBuildable(Cell::new(3, 3)))
        );
        grid.clear_interior(Rect::new(2, 2, 2, 2), id(7));
        assert!(grid.reserve(&[Cell::new(3, 3)], id(1)).is_ok());
    }

    #[test]
    fn test_release_guards_against_double_free() {
        let mut grid = TileGrid::new(4, 4);
        let cells = [Cell::new(0, 0), Cell::new(1, 0)];
        grid.reserve(&cells, id(1)).unwrap();
        grid.reserve(&[Cell::new(2, 0)], id(2)).unwrap();

        assert_eq!(
            grid.release(&[Cell::new(1, 0), Cell::new(2, 0)], id(1)),
            Err(GridError::ForeignOwner {
                cell: Cell::new(2, 0),
                expected: id(1),
                found: id(2)
            })
        );
        assert_eq!(grid.occupant(Cell::new(1, 0)), Some(id(1)));

        grid.release(&cells, id(1)).unwrap();
        assert_eq!(
            grid.release(&cells, id(1)),
            Err(GridError::NotOccupied(Cell::new(0, 0)))
        );
    }

    #[test]
    fn test_neighbors() {
        let grid = TileGrid::new(10, 5);
        assert_eq!(grid.neighbors(Cell::new(0, 0)).len(), 2);
        assert_eq!(grid.neighbors(Cell::new(5, 2)).len(), 4);
    }

    #[test]
    fn test_iter_occupied_reports_cells() {
        let mut grid = TileGrid::new(3, 3);
        grid.reserve(&[Cell::new(2, 1)], id(4)).unwrap();
        let occupied: Vec<_> = grid.iter_occupied().collect();
        assert_eq!(occupied, vec![(Cell::new(2, 1), id(4))]);
    }
}
