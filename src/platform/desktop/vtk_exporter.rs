use std::{
    fs::{create_dir_all, File},
    io::Write,
    path::PathBuf,
};

use log::debug;
use vtkio::model::*;

use crate::{
    error::SimulationError,
    floating_type_mod::{FT, TAU},
    particles::ParticleStore,
    simulation_parameters::SimulationParams,
    vec3f, V3,
};

// segments per great circle of the container outline
const CONTAINER_OUTLINE_SEGMENTS: usize = 64;

fn to_vec3d(v: &V3) -> [FT; 3] {
    [v[0], v[1], v[2]]
}

/// Writes one legacy VTK file per snapshot plus a `.vtk.series` index that
/// ParaView reads as a time series.
pub(crate) struct VtkExporter {
    /// something like './data/particles' which will get expanded to './data/particles-00001.vtk' and './data/particles.vtk.series'
    folder: PathBuf,
    basename: String,
    snapshot_number: usize,
    series_file: File,
}

impl VtkExporter {
    pub(crate) fn new(folder: impl Into<PathBuf>, basename: impl Into<String>) -> Result<VtkExporter, SimulationError> {
        let folder: PathBuf = folder.into();
        let basename: String = basename.into();

        create_dir_all(&folder)?;

        let mut series_file = File::create(folder.join(format!("{}.vtk.series", basename)))?;
        let series_prelude_str = "{\n\"file-series-version\": \"1.0\",\n\"files\": [";
        series_file.write_all(series_prelude_str.as_bytes())?;

        Ok(VtkExporter {
            series_file,
            folder,
            basename,
            snapshot_number: 1,
        })
    }

    pub(crate) fn num_snapshots(&self) -> usize {
        self.snapshot_number - 1
    }

    pub(crate) fn add_snapshot(
        &mut self,
        time: FT,
        particles: &ParticleStore,
        simulation_params: SimulationParams,
    ) -> Result<(), SimulationError> {
        let vtk_filename = format!("{}-{:05}.vtk", self.basename, self.snapshot_number);
        Self::write_vtk_file(self.folder.join(&vtk_filename), particles, simulation_params)?;

        if self.snapshot_number > 1 {
            self.series_file.write_all(",".as_bytes())?;
        }
        write!(
            self.series_file,
            "\n{{ \"name\": \"{}\", \"time\": {} }}",
            vtk_filename, time
        )?;

        debug!("wrote snapshot {} at time {}", vtk_filename, time);
        self.snapshot_number += 1;
        Ok(())
    }

    fn write_vtk_file<P: Into<PathBuf>>(
        path: P,
        particles: &ParticleStore,
        simulation_params: SimulationParams,
    ) -> Result<(), SimulationError> {
        let data_ft: Vec<(String, Vec<FT>)> = vec![
            ("radius".into(), particles.radius.clone()),
            ("speed".into(), particles.velocity.iter().map(|v| v.norm()).collect()),
        ];
        let data_vec: Vec<(String, Vec<V3>)> = vec![("velocity".into(), particles.velocity.clone())];

        let lines = container_outline(simulation_params.container_radius, CONTAINER_OUTLINE_SEGMENTS);

        write_vtk_file2(path, particles.position.clone(), data_ft, data_vec, lines)
    }
}

impl Drop for VtkExporter {
    fn drop(&mut self) {
        let series_end_str = "\n]\n}";
        if let Err(e) = self.series_file.write_all(series_end_str.as_bytes()) {
            log::error!("failed to finish vtk series file: {}", e);
        }
    }
}

/// Three great circles of the container sphere in the xy, xz and yz planes.
pub fn container_outline(radius: FT, segments: usize) -> Vec<(V3, V3)> {
    let point = |plane: usize, k: usize| {
        let angle = TAU * (k % segments) as FT / segments as FT;
        let (s, c) = (radius * angle.sin(), radius * angle.cos());
        match plane {
            0 => vec3f(c, s, 0.),
            1 => vec3f(c, 0., s),
            _ => vec3f(0., c, s),
        }
    };

    (0..3)
        .flat_map(|plane| (0..segments).map(move |k| (point(plane, k), point(plane, k + 1))))
        .collect()
}

/// Writes points as vertex cells and `lines` as additional line cells. Point
/// data of the line end points is padded with zeros.
pub fn write_vtk_file2<P: Into<PathBuf>>(
    path: P,
    mut positions: Vec<V3>,
    data_ft: Vec<(String, Vec<FT>)>,
    data_vec: Vec<(String, Vec<V3>)>,
    lines: Vec<(V3, V3)>,
) -> Result<(), SimulationError> {
    let mut data_arrays: Vec<DataArray> = Vec::new();
    let num_lines = lines.len();

    for (name, mut arr) in data_ft {
        let mut data_array = DataArray::scalars(name, 1);
        arr.resize(arr.len() + 2 * num_lines, 0.);
        data_array.data = arr.into();
        data_arrays.push(data_array);
    }

    for (name, mut arr) in data_vec {
        let mut data_array = DataArray::scalars(name, 3);
        arr.resize(arr.len() + 2 * num_lines, V3::zeros());
        data_array.data = arr.iter().flat_map(to_vec3d).collect::<Vec<_>>().into();
        data_arrays.push(data_array);
    }

    let path = path.into();

    let num_particles = positions.len();
    let vtk_verts: Vec<u32> = (0..num_particles).flat_map(|i| [1, i as u32]).collect();

    let mut vtk_line_indices: Vec<u32> = Vec::with_capacity(3 * num_lines);
    for (a, b) in lines {
        let a_idx = positions.len();
        positions.push(a);

        let b_idx = positions.len();
        positions.push(b);

        vtk_line_indices.extend_from_slice(&[2, a_idx as u32, b_idx as u32]);
    }

    let vtk_points: Vec<FT> = positions.iter().flat_map(to_vec3d).collect();

    let vtk = Vtk {
        version: Version::new((4, 2)),
        byte_order: ByteOrder::BigEndian,
        title: String::from("Sphere Particles 1.0"),
        file_path: Some(path.clone()),
        data: DataSet::PolyData {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(PolyDataPiece {
                points: vtk_points.into(),
                verts: VertexNumbers::Legacy {
                    num_cells: num_particles as u32,
                    vertices: vtk_verts,
                }
                .into(),
                lines: VertexNumbers::Legacy {
                    num_cells: num_lines as u32,
                    vertices: vtk_line_indices,
                }
                .into(),
                data: Attributes {
                    cell: Vec::new(),
                    point: data_arrays.into_iter().map(Attribute::DataArray).collect(),
                },
                ..Default::default()
            }))],
        },
    };
    vtk.export(path)?;

    Ok(())
}
