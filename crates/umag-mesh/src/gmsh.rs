//! Gmsh mesh file reader.
//!
//! Reads MSH format version 2.2 (ASCII): `$PhysicalNames` provides the
//! region naming (dimension 2 for boundary triangles, dimension 3 for
//! tetrahedra), `$Nodes` the coordinates, `$Elements` the connectivity.
//! Only element types 2 (3-node triangle) and 4 (4-node tetrahedron) are
//! kept; points, lines and higher-order elements are skipped.
//!
//! Node coordinates are multiplied by a caller-supplied scaling factor so
//! meshes drawn in convenient units (nanometers, typically) become meters.
//! Connectivity stays one-based; see [`crate::mesh`].

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use nalgebra::Vector3;

use crate::error::{MeshError, Result};
use crate::mesh::{Mesh, SurfaceCell, VolumeCell};
use crate::node::Node;

const TRIANGLE: usize = 2;
const TETRAHEDRON: usize = 4;

/// Nodes-per-element for the Gmsh element types we do not keep but must
/// still step over. From the MSH 2.2 documentation.
fn nodes_of_type(t: usize) -> Option<usize> {
    match t {
        1 => Some(2),   // line
        2 => Some(3),   // triangle
        3 => Some(4),   // quadrangle
        4 => Some(4),   // tetrahedron
        5 => Some(8),   // hexahedron
        6 => Some(6),   // prism
        7 => Some(5),   // pyramid
        8 => Some(3),   // second-order line
        9 => Some(6),   // second-order triangle
        11 => Some(10), // second-order tetrahedron
        15 => Some(1),  // point
        _ => None,
    }
}

/// Read a Gmsh 2.2 mesh file, scaling node coordinates by `scale`.
pub fn read_msh(path: &Path, scale: f64) -> Result<Mesh> {
    let file = File::open(path)?;
    parse_msh(BufReader::new(file), scale)
}

/// Parse MSH 2.2 content from any reader. Exposed for tests and for
/// callers that already hold the bytes.
pub fn parse_msh<R: Read>(reader: BufReader<R>, scale: f64) -> Result<Mesh> {
    let mut lines = LineReader::new(reader);
    let mut mesh = Mesh::default();
    let mut saw_nodes = false;
    let mut saw_elements = false;

    while let Some(line) = lines.next_line()? {
        let section = line.trim();
        match section {
            "$MeshFormat" => parse_format(&mut lines)?,
            "$PhysicalNames" => parse_physical_names(&mut lines, &mut mesh)?,
            "$Nodes" => {
                parse_nodes(&mut lines, &mut mesh, scale)?;
                saw_nodes = true;
            }
            "$Elements" => {
                parse_elements(&mut lines, &mut mesh)?;
                saw_elements = true;
            }
            s if s.starts_with('$') && !s.starts_with("$End") => {
                skip_section(&mut lines, s)?;
            }
            _ => {}
        }
    }

    if !saw_nodes {
        return Err(MeshError::MissingSection("Nodes".into()));
    }
    if !saw_elements {
        return Err(MeshError::MissingSection("Elements".into()));
    }
    mesh.check_connectivity()?;
    Ok(mesh)
}

/// Buffered line reader that tracks the current line number for error
/// reporting.
struct LineReader<R: Read> {
    inner: std::io::Lines<BufReader<R>>,
    line: usize,
}

impl<R: Read> LineReader<R> {
    fn new(reader: BufReader<R>) -> Self {
        LineReader {
            inner: reader.lines(),
            line: 0,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        match self.inner.next() {
            None => Ok(None),
            Some(r) => {
                self.line += 1;
                Ok(Some(r?))
            }
        }
    }

    fn expect_line(&mut self, what: &str) -> Result<String> {
        match self.next_line()? {
            Some(l) => Ok(l),
            None => Err(MeshError::parse(
                self.line,
                format!("unexpected end of file while reading {what}"),
            )),
        }
    }
}

fn parse_format<R: Read>(lines: &mut LineReader<R>) -> Result<()> {
    let line = lines.expect_line("$MeshFormat")?;
    let mut it = line.split_whitespace();
    let version = it
        .next()
        .ok_or_else(|| MeshError::parse(lines.line, "empty $MeshFormat line"))?;
    if !version.starts_with("2.2") {
        return Err(MeshError::UnsupportedVersion(version.to_string()));
    }
    let file_type = it
        .next()
        .ok_or_else(|| MeshError::parse(lines.line, "missing file-type field"))?;
    if file_type != "0" {
        return Err(MeshError::parse(
            lines.line,
            "binary MSH files are not supported",
        ));
    }
    expect_end(lines, "$EndMeshFormat")
}

fn parse_physical_names<R: Read>(lines: &mut LineReader<R>, mesh: &mut Mesh) -> Result<()> {
    let count: usize = parse_count(lines, "$PhysicalNames")?;
    for _ in 0..count {
        let line = lines.expect_line("$PhysicalNames")?;
        let mut it = line.split_whitespace();
        let dim: usize = next_field(&mut it, lines.line, "dimension")?;
        let id: usize = next_field(&mut it, lines.line, "region id")?;
        // The name is double-quoted and may contain spaces.
        let name = line
            .splitn(2, '"')
            .nth(1)
            .and_then(|s| s.rsplitn(2, '"').nth(1))
            .ok_or_else(|| MeshError::parse(lines.line, "missing quoted region name"))?
            .to_string();
        match dim {
            2 => {
                mesh.surface_regions.insert(id, name);
            }
            3 => {
                mesh.volume_regions.insert(id, name);
            }
            _ => {} // lower-dimensional groups have no use here
        }
    }
    expect_end(lines, "$EndPhysicalNames")
}

fn parse_nodes<R: Read>(lines: &mut LineReader<R>, mesh: &mut Mesh, scale: f64) -> Result<()> {
    let count: usize = parse_count(lines, "$Nodes")?;
    mesh.nodes = vec![Node::new(Vector3::zeros()); count];
    let mut seen = vec![false; count];
    for _ in 0..count {
        let line = lines.expect_line("$Nodes")?;
        let mut it = line.split_whitespace();
        let id: usize = next_field(&mut it, lines.line, "node id")?;
        if id == 0 || id > count {
            return Err(MeshError::NodeIndexOutOfRange { index: id, count });
        }
        let x: f64 = next_field(&mut it, lines.line, "x coordinate")?;
        let y: f64 = next_field(&mut it, lines.line, "y coordinate")?;
        let z: f64 = next_field(&mut it, lines.line, "z coordinate")?;
        mesh.nodes[id - 1] = Node::new(scale * Vector3::new(x, y, z));
        seen[id - 1] = true;
    }
    if let Some(missing) = seen.iter().position(|&s| !s) {
        return Err(MeshError::parse(
            lines.line,
            format!("node id {} never defined", missing + 1),
        ));
    }
    expect_end(lines, "$EndNodes")
}

fn parse_elements<R: Read>(lines: &mut LineReader<R>, mesh: &mut Mesh) -> Result<()> {
    let count: usize = parse_count(lines, "$Elements")?;
    for _ in 0..count {
        let line = lines.expect_line("$Elements")?;
        let mut it = line.split_whitespace();
        let _id: usize = next_field(&mut it, lines.line, "element id")?;
        let etype: usize = next_field(&mut it, lines.line, "element type")?;
        let ntags: usize = next_field(&mut it, lines.line, "tag count")?;
        let mut region = 0usize;
        for t in 0..ntags {
            let tag: usize = next_field(&mut it, lines.line, "tag")?;
            if t == 0 {
                region = tag; // first tag is the physical region
            }
        }
        let rest: Vec<usize> = it
            .map(|tok| {
                tok.parse::<usize>()
                    .map_err(|_| MeshError::parse(lines.line, format!("bad node index `{tok}`")))
            })
            .collect::<Result<_>>()?;

        match etype {
            TRIANGLE => {
                let ind: [usize; 3] =
                    rest.as_slice()
                        .try_into()
                        .map_err(|_| MeshError::InvalidIndexCount {
                            line: lines.line,
                            expected: 3,
                            found: rest.len(),
                        })?;
                mesh.surfaces.push(SurfaceCell { ind, region });
            }
            TETRAHEDRON => {
                let ind: [usize; 4] =
                    rest.as_slice()
                        .try_into()
                        .map_err(|_| MeshError::InvalidIndexCount {
                            line: lines.line,
                            expected: 4,
                            found: rest.len(),
                        })?;
                mesh.volumes.push(VolumeCell { ind, region });
            }
            other => {
                // Anything else is skipped, but a known type must still
                // carry the right number of indices to be a parseable line.
                if let Some(n) = nodes_of_type(other) {
                    if rest.len() != n {
                        return Err(MeshError::parse(
                            lines.line,
                            format!("element type {other} with {} indices", rest.len()),
                        ));
                    }
                }
            }
        }
    }
    expect_end(lines, "$EndElements")
}

fn skip_section<R: Read>(lines: &mut LineReader<R>, name: &str) -> Result<()> {
    let end = format!("$End{}", &name[1..]);
    loop {
        let line = lines.expect_line(name)?;
        if line.trim() == end {
            return Ok(());
        }
    }
}

fn parse_count<R: Read>(lines: &mut LineReader<R>, section: &str) -> Result<usize> {
    let line = lines.expect_line(section)?;
    line.trim()
        .parse()
        .map_err(|_| MeshError::parse(lines.line, format!("bad count in {section}")))
}

fn next_field<'a, T: std::str::FromStr>(
    it: &mut impl Iterator<Item = &'a str>,
    line: usize,
    what: &str,
) -> Result<T> {
    it.next()
        .ok_or_else(|| MeshError::parse(line, format!("missing {what}")))?
        .parse()
        .map_err(|_| MeshError::parse(line, format!("bad {what}")))
}

fn expect_end<R: Read>(lines: &mut LineReader<R>, end: &str) -> Result<()> {
    loop {
        let line = lines.expect_line(end)?;
        let t = line.trim();
        if t == end {
            return Ok(());
        }
        if !t.is_empty() {
            return Err(MeshError::parse(lines.line, format!("expected {end}")));
        }
    }
}
