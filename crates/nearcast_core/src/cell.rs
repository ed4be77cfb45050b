use crate::config::Config;
use crate::location::Location;
use s2::cap::Cap;
use s2::cell::Cell as S2Cell;
use s2::cellid::CellID;
use s2::latlng::LatLng;
use s2::region::RegionCoverer;

/// The cell a client currently occupies plus the covering of its
/// neighborhood at the configured level.
///
/// Created empty (cell id 0) and populated on the first location update.
/// Cloned by value whenever a snapshot has to outlive further updates.
#[derive(Debug, Clone)]
pub struct Cell {
    cell_id: u64,
    cell_group: Vec<u64>,
    config: Config,
}

impl Cell {
    /// A cell with the sentinel id; any real location update counts as a
    /// boundary crossing.
    pub fn new(config: Config) -> Self {
        Cell {
            cell_id: 0,
            cell_group: Vec::with_capacity(9),
            config,
        }
    }

    /// Force the cell id and recompute the neighborhood covering.
    pub fn update(&mut self, cell_id: u64) {
        self.cell_id = cell_id;
        self.recompute_covering();
    }

    /// Fold a location in: if it maps to a different cell at the configured
    /// level, adopt it, recompute the covering and report the crossing.
    pub fn changed(&mut self, loc: &Location) -> bool {
        let cell_id = cell_id_at(loc.lat, loc.lng, self.config.topology_level);
        if cell_id == self.cell_id {
            return false;
        }
        self.cell_id = cell_id;
        self.recompute_covering();
        true
    }

    pub fn cell_id(&self) -> u64 {
        self.cell_id
    }

    /// The covering of the neighborhood cap: the occupied cell and its
    /// surroundings, all at the configured level.
    pub fn cell_group(&self) -> &[u64] {
        &self.cell_group
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn recompute_covering(&mut self) {
        // Cap of height h centered on the occupied cell's center; covering
        // restricted to exactly the topology level so the channel set is
        // stable for a given position.
        let center = S2Cell::from(&CellID(self.cell_id)).center();
        let cap = Cap::from_center_height(&center, self.config.height);
        let coverer = RegionCoverer {
            min_level: self.config.topology_level,
            max_level: self.config.topology_level,
            level_mod: 1,
            max_cells: 9,
        };
        self.cell_group.clear();
        self.cell_group
            .extend(coverer.covering(&cap).0.iter().map(|cid| cid.0));
    }
}

/// The id of the cell containing (lat, lng) at the given level.
pub fn cell_id_at(lat: f64, lng: f64, level: u8) -> u64 {
    CellID::from(LatLng::from_degrees(lat, lng))
        .parent(level as u64)
        .0
}

/// The level encoded in a cell id.
pub fn cell_level(cell_id: u64) -> u8 {
    CellID(cell_id).level() as u8
}

/// The location of a cell's center (altitude, heading and timestamp zeroed).
pub fn center_location(cell_id: u64) -> Location {
    let center = LatLng::from(S2Cell::from(&CellID(cell_id)).center());
    Location::new(center.lat.deg(), center.lng.deg(), 0.0, 0.0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADELAIDE: (f64, f64) = (-34.9287, 138.5999);

    fn test_config() -> Config {
        Config::new(250.0, 15)
    }

    #[test]
    fn first_update_is_a_crossing() {
        let mut cell = Cell::new(test_config());
        let loc = Location::new(ADELAIDE.0, ADELAIDE.1, 86.45, 0.0, 0);
        assert!(cell.changed(&loc));
        assert_ne!(cell.cell_id(), 0);
    }

    #[test]
    fn covering_contains_own_cell_at_level() {
        let mut cell = Cell::new(test_config());
        cell.changed(&Location::new(ADELAIDE.0, ADELAIDE.1, 0.0, 0.0, 0));

        assert!(cell.cell_group().contains(&cell.cell_id()));
        assert!((1..=9).contains(&cell.cell_group().len()));
        for id in cell.cell_group() {
            assert_eq!(cell_level(*id), 15);
        }
    }

    #[test]
    fn covering_is_stable_for_repeated_coordinates() {
        let mut cell = Cell::new(test_config());
        let loc = Location::new(ADELAIDE.0, ADELAIDE.1, 0.0, 0.0, 0);

        assert!(cell.changed(&loc));
        let first = cell.cell_group().to_vec();
        assert!(!cell.changed(&loc));
        assert_eq!(cell.cell_group(), first.as_slice());
    }

    #[test]
    fn nearby_clients_share_a_neighborhood() {
        let mut a = Cell::new(test_config());
        let mut b = Cell::new(test_config());
        a.changed(&Location::new(-34.9287, 138.5999, 86.45, 0.0, 0));
        b.changed(&Location::new(-34.9297, 138.5998, 86.56, 0.0, 0));

        // ~110 m apart: same cell or an adjacent one, and each inside the
        // other's covering.
        assert!(a.cell_group().contains(&b.cell_id()));
        assert!(b.cell_group().contains(&a.cell_id()));
    }

    #[test]
    fn crossing_to_the_antipodes_replaces_the_covering() {
        let mut cell = Cell::new(test_config());
        cell.changed(&Location::new(ADELAIDE.0, ADELAIDE.1, 0.0, 0.0, 0));
        let before = cell.cell_group().to_vec();

        assert!(cell.changed(&Location::new(0.0, 0.0, 0.0, 0.0, 0)));
        for id in cell.cell_group() {
            assert!(!before.contains(id));
        }
    }

    #[test]
    fn forced_update_recomputes_covering() {
        let mut seed = Cell::new(test_config());
        seed.changed(&Location::new(ADELAIDE.0, ADELAIDE.1, 0.0, 0.0, 0));

        let mut cell = Cell::new(test_config());
        cell.update(seed.cell_id());
        assert_eq!(cell.cell_group(), seed.cell_group());
    }

    #[test]
    fn center_location_stays_in_the_cell() {
        let id = cell_id_at(ADELAIDE.0, ADELAIDE.1, 15);
        let center = center_location(id);
        // level 15 cells are ~300 m across; the center is within a few
        // thousandths of a degree of any point in the cell
        assert!((center.lat - ADELAIDE.0).abs() < 0.01);
        assert!((center.lng - ADELAIDE.1).abs() < 0.01);
        assert_eq!(cell_id_at(center.lat, center.lng, 15), id);
    }
}
