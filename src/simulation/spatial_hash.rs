/*!
Uniform spatial hash grid used as the broad phase of the collision handling.

Cells of edge length `spacing` are hashed into a fixed number of buckets. The
grid is rebuilt from scratch with a counting sort every time positions change,
queries return every particle stored in the buckets overlapped by an
axis-aligned box. Hash collisions and the box shape mean that queries return a
superset of the true neighbors, callers always have to check the distance.
*/

use std::ops::Range;

use crate::{floating_type_mod::FT, ParticleId, V3, V3I};

const HASH_PRIME_X: i32 = 92837111;
const HASH_PRIME_Y: i32 = 689287499;
const HASH_PRIME_Z: i32 = 283923481;

/// Number of hash buckets per particle of capacity.
pub const BUCKETS_PER_PARTICLE: usize = 3;

pub struct SpatialHashGrid {
    spacing: FT,
    max_num_objects: usize,
    table_size: usize,

    // After a build `cell_start[b]` is the offset of bucket `b` in `bucketed_ids`.
    // `cell_start[table_size]` is reset to 0, the end of the last bucket is `num_particles`.
    cell_start: Vec<usize>,
    bucketed_ids: Vec<ParticleId>,
    num_particles: usize,

    query_ids: Vec<ParticleId>,
}

impl SpatialHashGrid {
    pub fn new(spacing: FT, max_num_objects: usize) -> SpatialHashGrid {
        assert!(spacing > 0., "grid spacing has to be positive");
        let table_size = BUCKETS_PER_PARTICLE * max_num_objects.max(1);

        SpatialHashGrid {
            spacing,
            max_num_objects,
            table_size,
            cell_start: vec![0; table_size + 1],
            bucketed_ids: Vec::with_capacity(max_num_objects),
            num_particles: 0,
            query_ids: Vec::with_capacity(max_num_objects),
        }
    }

    pub fn spacing(&self) -> FT {
        self.spacing
    }

    pub fn table_size(&self) -> usize {
        self.table_size
    }

    pub fn capacity(&self) -> usize {
        self.max_num_objects
    }

    /// Number of particles indexed by the last build.
    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    pub fn cell_start(&self) -> &[usize] {
        &self.cell_start
    }

    pub fn bucketed_ids(&self) -> &[ParticleId] {
        &self.bucketed_ids
    }

    /// Reallocates all buffers for a new particle capacity.
    ///
    /// The grid is empty afterwards and has to be rebuilt before it answers queries again.
    pub fn resize(&mut self, max_num_objects: usize) {
        self.max_num_objects = max_num_objects;
        self.table_size = BUCKETS_PER_PARTICLE * max_num_objects.max(1);
        self.cell_start = vec![0; self.table_size + 1];
        self.bucketed_ids = Vec::with_capacity(max_num_objects);
        self.query_ids = Vec::with_capacity(max_num_objects);
        self.num_particles = 0;
    }

    /// Changes the cell size. Like `resize`, this invalidates the current contents.
    pub fn set_spacing(&mut self, spacing: FT) {
        assert!(spacing > 0., "grid spacing has to be positive");
        self.spacing = spacing;
        self.clear();
    }

    fn clear(&mut self) {
        self.cell_start.iter_mut().for_each(|c| *c = 0);
        self.bucketed_ids.clear();
        self.query_ids.clear();
        self.num_particles = 0;
    }

    #[inline(always)]
    pub fn int_coord(&self, coord: FT) -> i32 {
        (coord / self.spacing).floor() as i32
    }

    #[inline(always)]
    pub fn cell_coords(&self, pos: &V3) -> V3I {
        pos.map(|c| self.int_coord(c))
    }

    #[inline(always)]
    pub fn hash_coords(&self, xi: i32, yi: i32, zi: i32) -> usize {
        let h = xi.wrapping_mul(HASH_PRIME_X) ^ yi.wrapping_mul(HASH_PRIME_Y) ^ zi.wrapping_mul(HASH_PRIME_Z);
        h.unsigned_abs() as usize % self.table_size
    }

    #[inline(always)]
    pub fn hash_pos(&self, pos: &V3) -> usize {
        let cell = self.cell_coords(pos);
        self.hash_coords(cell.x, cell.y, cell.z)
    }

    /// Sorts all particle ids into their buckets.
    pub fn build(&mut self, positions: &[V3]) {
        let buckets: Vec<usize> = positions.iter().map(|p| self.hash_pos(p)).collect();
        self.build_from_buckets(&buckets);
    }

    /// Counting sort over precomputed buckets (`buckets[i]` is the bucket of particle `i`).
    ///
    /// Inside a bucket the ids end up in reverse insertion order.
    pub fn build_from_buckets(&mut self, buckets: &[usize]) {
        let num_particles = buckets.len();
        assert!(
            num_particles <= self.max_num_objects,
            "spatial hash grid holds at most {} particles but {} were given, resize the grid first",
            self.max_num_objects,
            num_particles
        );

        self.cell_start.iter_mut().for_each(|c| *c = 0);
        for &b in buckets {
            self.cell_start[b] += 1;
        }

        // inclusive prefix sums: every entry points to the end of its bucket
        let mut start = 0;
        for c in &mut self.cell_start[..self.table_size] {
            start += *c;
            *c = start;
        }
        self.cell_start[self.table_size] = 0;

        // walking the ends down turns them into bucket starts
        self.bucketed_ids.clear();
        self.bucketed_ids.resize(num_particles, 0);
        for (id, &b) in buckets.iter().enumerate() {
            self.cell_start[b] -= 1;
            self.bucketed_ids[self.cell_start[b]] = id;
        }

        self.num_particles = num_particles;
    }

    /// Index range of bucket `bucket` inside `bucketed_ids`.
    #[inline(always)]
    pub fn bucket_range(&self, bucket: usize) -> Range<usize> {
        let start = self.cell_start[bucket];
        let end = if bucket + 1 == self.table_size {
            self.num_particles
        } else {
            self.cell_start[bucket + 1]
        };
        start..end
    }

    /// Calls `f` for every particle id stored in a bucket overlapped by the box
    /// `center ± max_dist`. Ids may repeat if several cells of the box share a bucket.
    #[inline(always)]
    pub fn for_each_candidate(&self, center: &V3, max_dist: FT, mut f: impl FnMut(ParticleId)) {
        if self.num_particles == 0 {
            return;
        }

        let min = center.map(|c| self.int_coord(c - max_dist));
        let max = center.map(|c| self.int_coord(c + max_dist));

        for xi in min.x..=max.x {
            for yi in min.y..=max.y {
                for zi in min.z..=max.z {
                    let h = self.hash_coords(xi, yi, zi);
                    for &id in &self.bucketed_ids[self.bucket_range(h)] {
                        f(id);
                    }
                }
            }
        }
    }

    /// Collects the candidates of a box query into the reusable query buffer.
    ///
    /// The buffer is overwritten on every call.
    pub fn query(&mut self, center: &V3, max_dist: FT) -> &[ParticleId] {
        let mut query_ids = std::mem::take(&mut self.query_ids);
        query_ids.clear();
        self.for_each_candidate(center, max_dist, |id| query_ids.push(id));
        self.query_ids = query_ids;
        &self.query_ids
    }

    /// Result of the last `query` call.
    pub fn query_ids(&self) -> &[ParticleId] {
        &self.query_ids
    }

    pub fn query_count(&self) -> usize {
        self.query_ids.len()
    }

    /// Writes the ids of all other particles closer than `max_dist` to particle `i` into `out`,
    /// without duplicates.
    pub fn neighbors_of(&self, positions: &[V3], i: ParticleId, max_dist: FT, out: &mut Vec<ParticleId>) {
        out.clear();
        let max_dist_sq = max_dist * max_dist;
        let pos = positions[i];

        // several cells of one query box can hash into the same bucket
        self.for_each_candidate(&pos, max_dist, |j| {
            if j != i && (positions[j] - pos).norm_squared() < max_dist_sq && !out.contains(&j) {
                out.push(j);
            }
        });
    }

    /// Fills `neighbors` with all other particles closer than `max_dist` for every particle.
    ///
    /// `positions` may have moved since the last build. Particles that left
    /// their stored cell are then only found from one side, the lists are
    /// symmetrized afterwards so that every pair shows up in both lists.
    pub fn query_all(&self, positions: &[V3], max_dist: FT, neighbors: &mut NeighborLists) {
        let lists = (0..positions.len())
            .map(|i| {
                let mut list = Vec::new();
                self.neighbors_of(positions, i, max_dist, &mut list);
                list
            })
            .collect();
        neighbors.set_symmetric(lists);
    }
}

/// Compressed adjacency lists: the neighbors of particle `i` are
/// `adj_ids[first_adj_id[i]..first_adj_id[i + 1]]`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NeighborLists {
    first_adj_id: Vec<usize>,
    adj_ids: Vec<ParticleId>,
}

impl NeighborLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.first_adj_id.clear();
        self.adj_ids.clear();
    }

    /// Replaces the contents by `lists` (one list per particle). If `j` is in
    /// the list of `i` but `i` is missing from the list of `j`, it is appended there.
    pub fn set_symmetric(&mut self, mut lists: Vec<Vec<ParticleId>>) {
        let mut missing = Vec::new();
        for (i, list) in lists.iter().enumerate() {
            for &j in list {
                if !lists[j].contains(&i) {
                    missing.push((j, i));
                }
            }
        }
        for (j, i) in missing {
            lists[j].push(i);
        }

        self.clear();
        self.first_adj_id.push(0);
        for list in &lists {
            self.adj_ids.extend_from_slice(list);
            self.first_adj_id.push(self.adj_ids.len());
        }
    }

    pub fn num_particles(&self) -> usize {
        self.first_adj_id.len().saturating_sub(1)
    }

    pub fn neighbors(&self, i: usize) -> &[ParticleId] {
        &self.adj_ids[self.first_adj_id[i]..self.first_adj_id[i + 1]]
    }

    /// Sum of all list lengths, every pair is counted twice.
    pub fn total_neighbor_count(&self) -> usize {
        self.adj_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3f;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_positions(rng: &mut StdRng, n: usize, extent: FT) -> Vec<V3> {
        (0..n)
            .map(|_| {
                vec3f(
                    rng.gen_range(-extent..extent),
                    rng.gen_range(-extent..extent),
                    rng.gen_range(-extent..extent),
                )
            })
            .collect()
    }

    #[test]
    fn hash_is_deterministic_and_in_range() {
        let grid = SpatialHashGrid::new(0.2, 100);
        assert_eq!(grid.table_size(), 300);

        for (x, y, z) in [(0, 0, 0), (-1, 5, 3), (i32::MAX, i32::MIN, -7), (1000, -1000, 1)] {
            let h = grid.hash_coords(x, y, z);
            assert!(h < grid.table_size());
            assert_eq!(h, grid.hash_coords(x, y, z));
        }

        // negative coordinates round towards negative infinity
        assert_eq!(grid.int_coord(-0.01), -1);
        assert_eq!(grid.int_coord(0.19), 0);
        assert_eq!(grid.int_coord(0.41), 2);
    }

    #[test]
    fn cell_start_keeps_sentinel_and_partitions_ids() {
        let mut rng = StdRng::seed_from_u64(7);
        let positions = random_positions(&mut rng, 200, 2.0);
        let mut grid = SpatialHashGrid::new(0.2, 200);
        grid.build(&positions);

        assert_eq!(grid.cell_start().len(), grid.table_size() + 1);
        assert_eq!(grid.cell_start()[grid.table_size()], 0);

        let mut seen = vec![false; positions.len()];
        for b in 0..grid.table_size() {
            for &id in &grid.bucketed_ids()[grid.bucket_range(b)] {
                assert_eq!(grid.hash_pos(&positions[id]), b);
                assert!(!seen[id], "particle {} stored twice", id);
                seen[id] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn build_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(11);
        let positions = random_positions(&mut rng, 500, 3.0);
        let mut grid = SpatialHashGrid::new(0.2, 500);

        grid.build(&positions);
        let cell_start = grid.cell_start().to_vec();
        let bucketed_ids = grid.bucketed_ids().to_vec();

        grid.build(&positions);
        assert_eq!(grid.cell_start(), &cell_start[..]);
        assert_eq!(grid.bucketed_ids(), &bucketed_ids[..]);
    }

    #[test]
    fn ids_inside_a_bucket_are_in_reverse_insertion_order() {
        let positions = vec![
            vec3f(0.01, 0.01, 0.01),
            vec3f(0.05, 0.02, 0.03),
            vec3f(0.15, 0.12, 0.11),
        ];
        let mut grid = SpatialHashGrid::new(0.2, 10);
        grid.build(&positions);

        assert_eq!(grid.bucketed_ids(), &[2, 1, 0]);
        assert_eq!(grid.query(&vec3f(0.1, 0.1, 0.1), 0.05), &[2, 1, 0]);
    }

    #[test]
    fn query_returns_superset_of_true_neighbors() {
        let mut rng = StdRng::seed_from_u64(3);
        let positions = random_positions(&mut rng, 1000, 2.5);
        let mut grid = SpatialHashGrid::new(0.2, 1000);
        grid.build(&positions);

        for _ in 0..200 {
            let center = random_positions(&mut rng, 1, 2.5)[0];
            let max_dist = rng.gen_range(0.05..0.6);

            let candidates = grid.query(&center, max_dist).to_vec();
            assert_eq!(grid.query_count(), candidates.len());

            for (id, p) in positions.iter().enumerate() {
                if (p - center).norm() <= max_dist {
                    assert!(candidates.contains(&id), "missed neighbor {} of {:?}", id, center);
                }
            }
        }
    }

    #[test]
    fn query_agrees_with_rtree_oracle() {
        use rstar::RTree;

        let mut rng = StdRng::seed_from_u64(5);
        let positions = random_positions(&mut rng, 800, 2.0);
        let mut grid = SpatialHashGrid::new(0.1, 800);
        grid.build(&positions);

        let points: Vec<[FT; 3]> = positions.iter().map(|p| [p.x, p.y, p.z]).collect();
        let rtree = RTree::bulk_load(points);

        for i in (0..positions.len()).step_by(7) {
            let p = positions[i];
            let max_dist = 0.2;
            let candidates = grid.query(&p, max_dist).to_vec();

            for q in rtree.locate_within_distance([p.x, p.y, p.z], max_dist * max_dist) {
                let j = positions
                    .iter()
                    .position(|x| x.x == q[0] && x.y == q[1] && x.z == q[2])
                    .unwrap();
                assert!(candidates.contains(&j));
            }
        }
    }

    #[test]
    fn last_bucket_is_reachable() {
        let mut grid = SpatialHashGrid::new(1.0, 4);
        let last = grid.table_size() - 1;

        let mut cell = None;
        'search: for x in -50..50 {
            for y in -50..50 {
                if grid.hash_coords(x, y, 0) == last {
                    cell = Some((x, y));
                    break 'search;
                }
            }
        }
        let (x, y) = cell.expect("no cell hashes into the last bucket");

        let positions = vec![vec3f(x as FT + 0.5, y as FT + 0.5, 0.5)];
        grid.build(&positions);

        assert_eq!(grid.cell_start()[grid.table_size()], 0);
        assert_eq!(grid.query(&positions[0], 0.1), &[0]);
    }

    #[test]
    fn queries_are_empty_before_first_build_and_after_resize() {
        let mut grid = SpatialHashGrid::new(0.2, 10);
        assert!(grid.query(&V3::zeros(), 1.0).is_empty());

        grid.build(&[V3::zeros(), vec3f(0.05, 0., 0.)]);
        assert_eq!(grid.query(&V3::zeros(), 0.1).len(), 2);

        grid.resize(40);
        assert_eq!(grid.table_size(), 120);
        assert_eq!(grid.capacity(), 40);
        assert!(grid.query(&V3::zeros(), 1.0).is_empty());
        assert_eq!(grid.query_count(), 0);
    }

    #[test]
    #[should_panic]
    fn build_beyond_capacity_panics() {
        let mut grid = SpatialHashGrid::new(0.2, 2);
        grid.build(&[V3::zeros(), V3::zeros(), V3::zeros()]);
    }

    #[test]
    fn query_all_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(13);
        let positions = random_positions(&mut rng, 300, 1.5);
        let mut grid = SpatialHashGrid::new(0.2, 300);
        grid.build(&positions);

        let mut neighbors = NeighborLists::new();
        grid.query_all(&positions, 0.2, &mut neighbors);
        assert_eq!(neighbors.num_particles(), positions.len());

        for i in 0..positions.len() {
            let mut expected: Vec<usize> = (0..positions.len())
                .filter(|&j| j != i && (positions[j] - positions[i]).norm_squared() < 0.2 * 0.2)
                .collect();
            let mut found = neighbors.neighbors(i).to_vec();
            expected.sort_unstable();
            found.sort_unstable();
            assert_eq!(found, expected);
        }
    }

    #[test]
    fn neighbor_lists_stay_symmetric_after_particles_moved() {
        let built = vec![vec3f(0.01, 0.01, 0.01), vec3f(0.55, 0.01, 0.01)];
        // no cell around particle 1 shares a bucket with the origin cell at this table size
        let mut grid = SpatialHashGrid::new(0.2, 100);
        grid.build(&built);

        // particle 0 left its stored cell, only a query around it finds particle 1
        let moved = vec![vec3f(0.45, 0.01, 0.01), built[1]];
        let mut list = Vec::new();
        grid.neighbors_of(&moved, 1, 0.2, &mut list);
        assert!(list.is_empty());

        let mut neighbors = NeighborLists::new();
        grid.query_all(&moved, 0.2, &mut neighbors);
        assert_eq!(neighbors.neighbors(0), &[1]);
        assert_eq!(neighbors.neighbors(1), &[0]);
        assert_eq!(neighbors.total_neighbor_count(), 2);
    }
}
